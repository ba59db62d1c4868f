/// Patch extraction (im2col) + tiled contraction convolution.
///
/// The patch matrix has one row per output position, ordered
/// (batch, out_row, out_col), and one column per receptive-field element,
/// ordered (kernel_row, kernel_col, channel). That column order matches an
/// HWIO kernel read as a `(kr*kc*ci, co)` matrix, and the row order matches
/// an NHWC output read as `(n*oh*ow, co)`, so neither operand is copied or
/// permuted around the contraction.

use log::trace;

use crate::device::{Device, SingleThreaded};
use crate::error::Result;
use crate::params::{ConvParams, SpatialAxis};
use crate::scalar::Scalar;
use crate::tensor::{TensorView, TensorViewMut};

/// Patch rows (output positions) per tile.
const TILE: usize = 32;

/// Geometry consumed by the patch extractor.
///
/// The extractor is row-major native: the row axis is the outer spatial
/// axis and the column axis the inner one, same as the caller's NHWC
/// layout. Both axes are built whole from [`ConvParams`], so extents,
/// strides, padding and dilations always travel together.
#[derive(Debug, Clone, Copy)]
struct PatchGeometry {
    rows: SpatialAxis,
    cols: SpatialAxis,
    channels: usize,
}

impl PatchGeometry {
    fn new(params: &ConvParams) -> Self {
        PatchGeometry {
            rows: params.rows_axis(),
            cols: params.cols_axis(),
            channels: params.kernel_channels,
        }
    }

    fn patch_len(&self) -> usize {
        self.rows.kernel * self.cols.kernel * self.channels
    }
}

/// Fill `patches` with the receptive fields of consecutive output positions
/// starting at `first`. Padding, dilation holes and kernel channels past the
/// input's channel extent are written as zero.
fn extract_image_patches<T: Scalar>(
    geometry: &PatchGeometry,
    input: &TensorView<'_, T>,
    first: usize,
    patches: &mut [T],
) {
    let k = geometry.patch_len();
    if k == 0 {
        return;
    }
    let channels = geometry.channels;
    let copied = channels.min(input.dims()[3]);
    let out_cols = geometry.cols.output;
    let out_rows = geometry.rows.output;
    let data = input.as_slice();

    for (r, patch) in patches.chunks_mut(k).enumerate() {
        let pos = first + r;
        let ow = pos % out_cols;
        let oh = (pos / out_cols) % out_rows;
        let n = pos / (out_cols * out_rows);

        for (kh, patch_row) in patch.chunks_mut(geometry.cols.kernel * channels).enumerate() {
            let Some(ih) = geometry.rows.source(oh, kh) else {
                patch_row.fill(T::zero());
                continue;
            };
            for (kw, taps) in patch_row.chunks_mut(channels).enumerate() {
                match geometry.cols.source(ow, kw) {
                    Some(iw) => {
                        let src = input.offset([n, ih, iw, 0]);
                        let (present, missing) = taps.split_at_mut(copied);
                        present.copy_from_slice(&data[src..src + copied]);
                        missing.fill(T::zero());
                    }
                    None => taps.fill(T::zero()),
                }
            }
        }
    }
}

/// Tiled matrix multiply: C = A * B.
///
/// A: m x k, B: k x n, C: m x n, all row-major.
fn contract<T: Scalar>(a: &[T], b: &[T], m: usize, n: usize, k: usize, c: &mut [T]) {
    c[..m * n].fill(T::zero());

    let mut pp = 0;
    while pp < k {
        let p_end = (pp + TILE).min(k);
        let mut jj = 0;
        while jj < n {
            let j_end = (jj + TILE).min(n);
            for i in 0..m {
                let c_row = i * n;
                let a_row = i * k;
                for p in pp..p_end {
                    let a_val = a[a_row + p];
                    let b_row = p * n;
                    T::axpy(&mut c[c_row + jj..c_row + j_end], &b[b_row + jj..b_row + j_end], a_val);
                }
            }
            jj += TILE;
        }
        pp += TILE;
    }
}

/// Convolution as patch extraction followed by a single contraction.
///
/// Works for any [`Scalar`]; the [`Device`] decides whether output tiles
/// run in parallel. The call is synchronous either way.
#[derive(Debug, Default)]
pub struct PatchContractConv<D = SingleThreaded> {
    device: D,
}

impl<D: Device> PatchContractConv<D> {
    pub fn new(device: D) -> Self {
        PatchContractConv { device }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Convolve flat NHWC `input` with HWIO `kernel` into NHWC `output`.
    ///
    /// Only buffer lengths are checked. Extents or factors in `params` that
    /// fail [`ConvParams::validate`] produce meaningless output, never a
    /// panic.
    pub fn conv2d<T: Scalar>(
        &self,
        params: &ConvParams,
        input: &[T],
        kernel: &[T],
        output: &mut [T],
    ) -> Result<()> {
        let input = TensorView::new("input", input, params.input_dims())?;
        let kernel = TensorView::new("kernel", kernel, params.kernel_dims())?;
        let output = TensorViewMut::new("output", output, params.output_dims())?;
        self.run(params, input, kernel, output);
        Ok(())
    }

    /// Same as [`conv2d`](Self::conv2d) on already validated views.
    pub fn run<T: Scalar>(
        &self,
        params: &ConvParams,
        input: TensorView<'_, T>,
        kernel: TensorView<'_, T>,
        mut output: TensorViewMut<'_, T>,
    ) {
        let geometry = PatchGeometry::new(params);
        let k = geometry.patch_len();
        let n = params.kernel_filters;
        let m = params.input_batch * params.output_rows * params.output_cols;
        if m == 0 || n == 0 {
            return;
        }
        trace!(
            "patch contraction: patches {}x{}, kernel {}x{}, {} threads",
            m,
            k,
            k,
            n,
            self.device.num_threads()
        );

        let weights = kernel.as_slice();
        self.device.for_each_chunk(output.as_mut_slice(), TILE * n, |tile, chunk| {
            let rows = chunk.len() / n;
            let mut patches = vec![T::zero(); rows * k];
            extract_image_patches(&geometry, &input, tile * TILE, &mut patches);
            contract(&patches, weights, rows, n, k, chunk);
        });
    }
}

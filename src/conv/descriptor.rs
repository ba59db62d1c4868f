//! Convolution through the descriptor-driven engine.
//!
//! User buffers are declared channel-last (`Nhwc` activations, `Hwio`
//! weights). The engine picks its own layouts, and every mismatch becomes
//! an explicit reorder: weights go to a dedicated weights queue, activations
//! to the main queue. Weight reorders are rebuilt on every call.

use log::debug;

use crate::engine::{
    Algorithm, ConvolutionForwardDesc, ConvolutionForwardPrimitiveDesc, DataType, Engine,
    EngineError, Format, MemoryArena, MemoryDesc, PaddingKind, Primitive, PropKind, Stream,
};
use crate::error::{ConvError, Result};
use crate::params::ConvParams;
use crate::tensor::{TensorView, TensorViewMut};

/// Converts a one-based dilation factor (1 = dense) into the engine's
/// zero-based convention (0 = dense).
pub fn zero_based_dilation(factor: usize) -> Result<usize> {
    factor
        .checked_sub(1)
        .ok_or(ConvError::ZeroFactor("kernel dilation"))
}

/// Single-precision, inference-only convolution on an [`Engine`].
#[derive(Debug, Clone, Copy)]
pub struct DescriptorConv {
    engine: Engine,
}

impl DescriptorConv {
    pub fn new(engine: Engine) -> Self {
        DescriptorConv { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Convolve flat NHWC `input` with HWIO `kernel` into NHWC `output`.
    ///
    /// Engine construction failures (unsupported dilation, inconsistent
    /// extents, ...) are returned unchanged as [`ConvError::Engine`].
    pub fn conv2d(
        &self,
        params: &ConvParams,
        input: &[f32],
        kernel: &[f32],
        output: &mut [f32],
    ) -> Result<()> {
        let input = TensorView::new("input", input, params.input_dims())?;
        let kernel = TensorView::new("kernel", kernel, params.kernel_dims())?;
        let output = TensorViewMut::new("output", output, params.output_dims())?;
        self.run(params, input, kernel, output)
    }

    pub fn run(
        &self,
        params: &ConvParams,
        input: TensorView<'_, f32>,
        kernel: TensorView<'_, f32>,
        mut output: TensorViewMut<'_, f32>,
    ) -> Result<()> {
        if params.input_row_dilation != 1 || params.input_col_dilation != 1 {
            return Err(EngineError::Unimplemented("input (base) dilation").into());
        }

        let src_dims = [
            params.input_batch,
            params.input_channels,
            params.input_rows,
            params.input_cols,
        ];
        let weights_dims = [
            params.kernel_filters,
            params.kernel_channels,
            params.kernel_rows,
            params.kernel_cols,
        ];
        let dst_dims = [
            params.input_batch,
            params.kernel_filters,
            params.output_rows,
            params.output_cols,
        ];

        let mut arena = MemoryArena::new();
        let user_src = arena.user_input(
            MemoryDesc::new(src_dims, DataType::F32, Format::Nhwc),
            input.as_slice(),
        )?;
        let user_weights = arena.user_input(
            MemoryDesc::new(weights_dims, DataType::F32, Format::Hwio),
            kernel.as_slice(),
        )?;
        let user_dst = arena.user_output(
            MemoryDesc::new(dst_dims, DataType::F32, Format::Nhwc),
            output.as_mut_slice(),
        )?;

        let desc = ConvolutionForwardDesc {
            prop_kind: PropKind::ForwardInference,
            algorithm: Algorithm::Direct,
            src: MemoryDesc::new(src_dims, DataType::F32, Format::Any),
            weights: MemoryDesc::new(weights_dims, DataType::F32, Format::Any),
            dst: MemoryDesc::new(dst_dims, DataType::F32, Format::Any),
            strides: [params.row_stride, params.col_stride],
            dilates: [
                zero_based_dilation(params.kernel_row_dilation)?,
                zero_based_dilation(params.kernel_col_dilation)?,
            ],
            padding_l: [params.padding.top, params.padding.left],
            padding_r: [params.padding.bottom, params.padding.right],
            padding_kind: PaddingKind::Zero,
        };
        let pd = ConvolutionForwardPrimitiveDesc::new(&desc, &self.engine)?;

        let mut net = Vec::new();
        let mut net_weights = Vec::new();

        let src = if pd.src_desc() != user_src.desc() {
            let reordered = arena.scratch(pd.src_desc())?;
            net.push(Primitive::reorder(user_src, reordered)?);
            debug!("src reorder {:?} -> {:?}", Format::Nhwc, pd.src_desc().format());
            reordered
        } else {
            user_src
        };

        let weights = if pd.weights_desc() != user_weights.desc() {
            let reordered = arena.scratch(pd.weights_desc())?;
            net_weights.push(Primitive::reorder(user_weights, reordered)?);
            debug!("weights reorder {:?} -> {:?}", Format::Hwio, pd.weights_desc().format());
            reordered
        } else {
            user_weights
        };

        let needs_output_reorder = pd.dst_desc() != user_dst.desc();
        let dst = if needs_output_reorder {
            arena.scratch(pd.dst_desc())?
        } else {
            user_dst
        };

        net.push(Primitive::convolution_forward(&pd, src, weights, dst)?);
        if needs_output_reorder {
            debug!("dst reorder {:?} -> {:?}", pd.dst_desc().format(), Format::Nhwc);
            net.push(Primitive::reorder(dst, user_dst)?);
        }

        Stream::eager().submit(&net_weights).wait(&mut arena)?;
        Stream::eager().submit(&net).wait(&mut arena)?;
        Ok(())
    }
}

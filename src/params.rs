//! Convolution parameters and per-axis index arithmetic.
//!
//! Extents follow the channel-last convention used throughout the crate:
//! activations are `(batch, rows, cols, channels)` and kernels are
//! `(rows, cols, in_channels, out_channels)`.

use crate::error::{ConvError, Result};

/// Four-sided zero padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Padding {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl Padding {
    pub fn new(top: usize, bottom: usize, left: usize, right: usize) -> Self {
        Padding { top, bottom, left, right }
    }

    pub fn uniform(pad: usize) -> Self {
        Padding::new(pad, pad, pad, pad)
    }
}

/// Output extent along one spatial axis.
///
/// The input is first dilated (`input_dilation - 1` holes between samples),
/// then padded, and the dilated kernel slides over it with `stride`. Returns
/// zero when the kernel does not fit or `stride` is zero.
pub fn conv_output_size(
    input: usize,
    kernel: usize,
    stride: usize,
    pad_lo: usize,
    pad_hi: usize,
    input_dilation: usize,
    kernel_dilation: usize,
) -> usize {
    if input == 0 || kernel == 0 {
        return 0;
    }
    let dilated_input = (input - 1) * input_dilation + 1;
    let dilated_kernel = (kernel - 1) * kernel_dilation + 1;
    let padded = dilated_input + pad_lo + pad_hi;
    if padded < dilated_kernel {
        return 0;
    }
    (padded - dilated_kernel)
        .checked_div(stride)
        .map_or(0, |steps| steps + 1)
}

/// Geometry of one spatial axis of a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialAxis {
    pub input: usize,
    pub kernel: usize,
    pub output: usize,
    pub stride: usize,
    pub pad_lo: usize,
    pub pad_hi: usize,
    pub input_dilation: usize,
    pub kernel_dilation: usize,
}

impl SpatialAxis {
    /// Input index sampled by kernel tap `tap` at output position `out`.
    ///
    /// `None` means the tap lands on padding or on a hole introduced by
    /// input dilation, i.e. it contributes zero. A zero input dilation makes
    /// every tap a hole.
    #[inline]
    pub fn source(&self, out: usize, tap: usize) -> Option<usize> {
        let pos = (out * self.stride + tap * self.kernel_dilation).checked_sub(self.pad_lo)?;
        if pos.checked_rem(self.input_dilation)? != 0 {
            return None;
        }
        let idx = pos / self.input_dilation;
        (idx < self.input).then_some(idx)
    }

    pub fn expected_output(&self) -> usize {
        conv_output_size(
            self.input,
            self.kernel,
            self.stride,
            self.pad_lo,
            self.pad_hi,
            self.input_dilation,
            self.kernel_dilation,
        )
    }
}

/// Fully resolved description of one 2D convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParams {
    pub input_batch: usize,
    pub input_rows: usize,
    pub input_cols: usize,
    pub input_channels: usize,
    pub kernel_rows: usize,
    pub kernel_cols: usize,
    pub kernel_channels: usize,
    pub kernel_filters: usize,
    pub output_rows: usize,
    pub output_cols: usize,
    pub row_stride: usize,
    pub col_stride: usize,
    pub padding: Padding,
    pub input_row_dilation: usize,
    pub input_col_dilation: usize,
    pub kernel_row_dilation: usize,
    pub kernel_col_dilation: usize,
}

impl ConvParams {
    /// Starts a builder from input extents `(batch, rows, cols, channels)`
    /// and kernel extents `(rows, cols, in_channels, out_channels)`.
    pub fn builder(input: [usize; 4], kernel: [usize; 4]) -> ConvParamsBuilder {
        ConvParamsBuilder::new(input, kernel)
    }

    pub fn input_dims(&self) -> [usize; 4] {
        [self.input_batch, self.input_rows, self.input_cols, self.input_channels]
    }

    pub fn kernel_dims(&self) -> [usize; 4] {
        [self.kernel_rows, self.kernel_cols, self.kernel_channels, self.kernel_filters]
    }

    pub fn output_dims(&self) -> [usize; 4] {
        [self.input_batch, self.output_rows, self.output_cols, self.kernel_filters]
    }

    pub fn output_len(&self) -> usize {
        self.output_dims().iter().product()
    }

    /// Length of one flattened receptive field (`kr * kc * ci`).
    pub fn patch_len(&self) -> usize {
        self.kernel_rows * self.kernel_cols * self.kernel_channels
    }

    pub fn rows_axis(&self) -> SpatialAxis {
        SpatialAxis {
            input: self.input_rows,
            kernel: self.kernel_rows,
            output: self.output_rows,
            stride: self.row_stride,
            pad_lo: self.padding.top,
            pad_hi: self.padding.bottom,
            input_dilation: self.input_row_dilation,
            kernel_dilation: self.kernel_row_dilation,
        }
    }

    pub fn cols_axis(&self) -> SpatialAxis {
        SpatialAxis {
            input: self.input_cols,
            kernel: self.kernel_cols,
            output: self.output_cols,
            stride: self.col_stride,
            pad_lo: self.padding.left,
            pad_hi: self.padding.right,
            input_dilation: self.input_col_dilation,
            kernel_dilation: self.kernel_col_dilation,
        }
    }

    /// Checks that the extents and factors describe one real convolution.
    ///
    /// The patch backend never calls this: on parameters that fail it, it
    /// still returns without panicking, but the output values are
    /// meaningless.
    pub fn validate(&self) -> Result<()> {
        let factors = [
            ("row stride", self.row_stride),
            ("column stride", self.col_stride),
            ("input row dilation", self.input_row_dilation),
            ("input column dilation", self.input_col_dilation),
            ("kernel row dilation", self.kernel_row_dilation),
            ("kernel column dilation", self.kernel_col_dilation),
        ];
        for (name, value) in factors {
            if value == 0 {
                return Err(ConvError::ZeroFactor(name));
            }
        }
        if self.kernel_channels != self.input_channels {
            return Err(ConvError::ChannelMismatch {
                input: self.input_channels,
                kernel: self.kernel_channels,
            });
        }
        for (axis, geometry) in [("row", self.rows_axis()), ("column", self.cols_axis())] {
            let expected = geometry.expected_output();
            if geometry.output != expected {
                return Err(ConvError::OutputMismatch {
                    axis,
                    actual: geometry.output,
                    expected,
                });
            }
        }
        Ok(())
    }
}

/// Builder for [`ConvParams`]. Strides and dilations default to 1, padding
/// to 0, and output extents to the output-size formula.
#[derive(Debug, Clone)]
pub struct ConvParamsBuilder {
    params: ConvParams,
    output: Option<(usize, usize)>,
}

impl ConvParamsBuilder {
    fn new(input: [usize; 4], kernel: [usize; 4]) -> Self {
        let [input_batch, input_rows, input_cols, input_channels] = input;
        let [kernel_rows, kernel_cols, kernel_channels, kernel_filters] = kernel;
        ConvParamsBuilder {
            params: ConvParams {
                input_batch,
                input_rows,
                input_cols,
                input_channels,
                kernel_rows,
                kernel_cols,
                kernel_channels,
                kernel_filters,
                output_rows: 0,
                output_cols: 0,
                row_stride: 1,
                col_stride: 1,
                padding: Padding::default(),
                input_row_dilation: 1,
                input_col_dilation: 1,
                kernel_row_dilation: 1,
                kernel_col_dilation: 1,
            },
            output: None,
        }
    }

    pub fn stride(mut self, rows: usize, cols: usize) -> Self {
        self.params.row_stride = rows;
        self.params.col_stride = cols;
        self
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.params.padding = padding;
        self
    }

    pub fn input_dilation(mut self, rows: usize, cols: usize) -> Self {
        self.params.input_row_dilation = rows;
        self.params.input_col_dilation = cols;
        self
    }

    pub fn kernel_dilation(mut self, rows: usize, cols: usize) -> Self {
        self.params.kernel_row_dilation = rows;
        self.params.kernel_col_dilation = cols;
        self
    }

    /// Overrides the computed output extents.
    pub fn output(mut self, rows: usize, cols: usize) -> Self {
        self.output = Some((rows, cols));
        self
    }

    pub fn build(self) -> ConvParams {
        let mut params = self.params;
        let (rows, cols) = self.output.unwrap_or_else(|| {
            (
                params.rows_axis().expected_output(),
                params.cols_axis().expected_output(),
            )
        });
        params.output_rows = rows;
        params.output_cols = cols;
        params
    }
}

use crate::error::Result;
use crate::params::ConvParams;
use crate::scalar::Scalar;
use crate::tensor::{TensorView, TensorViewMut};

/// Naive nested-loop convolution (reference implementation).
///
/// Input is NHWC, kernel is HWIO, output is NHWC. Honors stride, padding and
/// both dilations exactly like the optimized backends, accumulating in `T`
/// in the same (row, col, channel) tap order as the patch contraction.
pub fn conv2d_naive<T: Scalar>(
    params: &ConvParams,
    input: &[T],
    kernel: &[T],
    output: &mut [T],
) -> Result<()> {
    let input = TensorView::new("input", input, params.input_dims())?;
    let kernel = TensorView::new("kernel", kernel, params.kernel_dims())?;
    let mut output = TensorViewMut::new("output", output, params.output_dims())?;

    let rows = params.rows_axis();
    let cols = params.cols_axis();
    let channels = params.kernel_channels.min(params.input_channels);

    for n in 0..params.input_batch {
        for oh in 0..params.output_rows {
            for ow in 0..params.output_cols {
                for oc in 0..params.kernel_filters {
                    let mut sum = T::zero();
                    for kh in 0..params.kernel_rows {
                        let Some(ih) = rows.source(oh, kh) else {
                            continue;
                        };
                        for kw in 0..params.kernel_cols {
                            let Some(iw) = cols.source(ow, kw) else {
                                continue;
                            };
                            for ic in 0..channels {
                                sum = sum + input.get([n, ih, iw, ic]) * kernel.get([kh, kw, ic, oc]);
                            }
                        }
                    }
                    output.set([n, oh, ow, oc], sum);
                }
            }
        }
    }
    Ok(())
}

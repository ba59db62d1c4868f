/// Tests for the patch-extraction + contraction backend.

use half::{bf16, f16};
use microconv::conv::{conv2d_naive, PatchContractConv};
use microconv::device::{SingleThreaded, ThreadPool};
use microconv::params::{ConvParams, Padding};
use microconv::ConvError;

fn int_data(len: usize, modulus: i64, offset: i64) -> Vec<i64> {
    (0..len as i64).map(|i| (i * 7 + 3) % modulus - offset).collect()
}

fn full_params() -> ConvParams {
    ConvParams::builder([2, 7, 6, 3], [3, 2, 3, 5])
        .stride(2, 1)
        .padding(Padding::new(1, 2, 0, 1))
        .kernel_dilation(1, 2)
        .build()
}

#[test]
fn integer_scalars_match_reference_exactly() {
    let params = full_params();
    params.validate().unwrap();
    let input = int_data(params.input_dims().iter().product(), 11, 5);
    let kernel = int_data(params.kernel_dims().iter().product(), 5, 2);

    let mut expected = vec![0i64; params.output_len()];
    conv2d_naive(&params, &input, &kernel, &mut expected).unwrap();

    let mut out = vec![0i64; params.output_len()];
    PatchContractConv::new(SingleThreaded)
        .conv2d(&params, &input, &kernel, &mut out)
        .unwrap();
    assert_eq!(out, expected);
}

#[test]
fn input_dilation_matches_reference() {
    let params = ConvParams::builder([1, 4, 5, 2], [2, 3, 2, 3])
        .input_dilation(2, 3)
        .padding(Padding::new(1, 1, 2, 0))
        .stride(1, 2)
        .build();
    params.validate().unwrap();
    let input: Vec<i32> = (0..40).map(|v| v % 9 - 4).collect();
    let kernel: Vec<i32> = (0..36).map(|v| v % 5 - 2).collect();

    let mut expected = vec![0i32; params.output_len()];
    conv2d_naive(&params, &input, &kernel, &mut expected).unwrap();

    let mut out = vec![0i32; params.output_len()];
    PatchContractConv::new(SingleThreaded)
        .conv2d(&params, &input, &kernel, &mut out)
        .unwrap();
    assert_eq!(out, expected);
    assert!(out.iter().any(|&v| v != 0));
}

#[test]
fn input_dilation_inserts_holes() {
    // 1x2 input dilated by 3 is [a, 0, 0, b]; a 1x1 kernel copies it through
    let params = ConvParams::builder([1, 1, 2, 1], [1, 1, 1, 1]).input_dilation(1, 3).build();
    assert_eq!(params.output_cols, 4);
    let mut out = vec![9.0f64; 4];
    PatchContractConv::new(SingleThreaded)
        .conv2d(&params, &[5.0, 6.0], &[2.0], &mut out)
        .unwrap();
    assert_eq!(out, vec![10.0, 0.0, 0.0, 12.0]);
}

#[test]
fn thread_pool_matches_single_threaded_bitwise() {
    // enough output positions for several tiles
    let params = ConvParams::builder([3, 12, 11, 4], [3, 3, 4, 6])
        .padding(Padding::uniform(1))
        .build();
    let input: Vec<f32> = (0..params.input_dims().iter().product::<usize>())
        .map(|i| (i as f32 * 0.013).sin())
        .collect();
    let kernel: Vec<f32> = (0..params.kernel_dims().iter().product::<usize>())
        .map(|i| (i as f32 * 0.17).cos())
        .collect();

    let mut single = vec![0.0f32; params.output_len()];
    PatchContractConv::new(SingleThreaded)
        .conv2d(&params, &input, &kernel, &mut single)
        .unwrap();

    let pool = PatchContractConv::new(ThreadPool::new(4).unwrap());
    let mut threaded = vec![0.0f32; params.output_len()];
    pool.conv2d(&params, &input, &kernel, &mut threaded).unwrap();

    let single: Vec<u32> = single.iter().map(|v| v.to_bits()).collect();
    let threaded: Vec<u32> = threaded.iter().map(|v| v.to_bits()).collect();
    assert_eq!(single, threaded);
}

#[test]
fn reduced_precision_scalars() {
    let params = ConvParams::builder([1, 3, 3, 2], [2, 2, 2, 1]).build();
    let input: Vec<f32> = (0..18).map(|v| (v % 4) as f32 * 0.5).collect();
    let kernel: Vec<f32> = (0..8).map(|v| (v % 3) as f32 - 1.0).collect();

    let mut reference = vec![0.0f32; params.output_len()];
    conv2d_naive(&params, &input, &kernel, &mut reference).unwrap();

    let conv = PatchContractConv::new(SingleThreaded);

    let input_h: Vec<f16> = input.iter().map(|&v| f16::from_f32(v)).collect();
    let kernel_h: Vec<f16> = kernel.iter().map(|&v| f16::from_f32(v)).collect();
    let mut out_h = vec![f16::ZERO; params.output_len()];
    conv.conv2d(&params, &input_h, &kernel_h, &mut out_h).unwrap();

    let input_b: Vec<bf16> = input.iter().map(|&v| bf16::from_f32(v)).collect();
    let kernel_b: Vec<bf16> = kernel.iter().map(|&v| bf16::from_f32(v)).collect();
    let mut out_b = vec![bf16::ZERO; params.output_len()];
    conv.conv2d(&params, &input_b, &kernel_b, &mut out_b).unwrap();

    // small multiples of 0.5 are exact in both formats
    for i in 0..reference.len() {
        assert_eq!(out_h[i].to_f32(), reference[i]);
        assert_eq!(out_b[i].to_f32(), reference[i]);
    }
}

#[test]
fn empty_batch_writes_nothing() {
    let params = ConvParams::builder([0, 4, 4, 1], [2, 2, 1, 1]).build();
    let mut out: Vec<f32> = Vec::new();
    PatchContractConv::new(SingleThreaded)
        .conv2d(&params, &[], &[1.0; 4], &mut out)
        .unwrap();
    assert!(out.is_empty());
}

#[test]
fn short_kernel_is_reported() {
    let params = ConvParams::builder([1, 4, 4, 1], [2, 2, 1, 2]).build();
    let mut out = vec![0.0f32; params.output_len()];
    let err = PatchContractConv::new(SingleThreaded)
        .conv2d(&params, &[0.0; 16], &[1.0; 4], &mut out)
        .unwrap_err();
    assert!(matches!(
        err,
        ConvError::BufferTooSmall { what: "kernel", len: 4, required: 8 }
    ));
}

#[test]
fn extra_kernel_channels_contribute_zero() {
    // kernel expects 2 input channels, input only has 1
    let params = ConvParams::builder([1, 2, 2, 1], [1, 1, 2, 1]).build();
    assert!(matches!(params.validate(), Err(ConvError::ChannelMismatch { input: 1, kernel: 2 })));
    let input = [1.0f32, 2.0, 3.0, 4.0];
    let kernel = [3.0f32, 100.0];

    let mut out = vec![0.0f32; params.output_len()];
    PatchContractConv::new(SingleThreaded)
        .conv2d(&params, &input, &kernel, &mut out)
        .unwrap();
    assert_eq!(out, vec![3.0, 6.0, 9.0, 12.0]);

    let mut expected = vec![0.0f32; params.output_len()];
    conv2d_naive(&params, &input, &kernel, &mut expected).unwrap();
    assert_eq!(out, expected);
}

#[test]
fn zero_input_dilation_does_not_panic() {
    let params = ConvParams::builder([1, 3, 3, 1], [2, 2, 1, 1])
        .input_dilation(0, 1)
        .output(2, 2)
        .build();
    assert!(matches!(params.validate(), Err(ConvError::ZeroFactor("input row dilation"))));

    let mut out = vec![7.0f32; params.output_len()];
    PatchContractConv::new(ThreadPool::global())
        .conv2d(&params, &[1.0; 9], &[1.0; 4], &mut out)
        .unwrap();
    assert_eq!(out, vec![0.0; 4]);
}

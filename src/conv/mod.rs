/// Convolution backends and backend selection.
///
/// Two interchangeable backends compute the same NHWC x HWIO -> NHWC
/// convolution: patch extraction + contraction (any scalar, any device) and
/// the descriptor-driven engine (f32 only). A naive reference is kept for
/// verification.

mod descriptor;
mod im2col;
mod naive;
pub(crate) mod simd;

pub use descriptor::{zero_based_dilation, DescriptorConv};
pub use im2col::PatchContractConv;
pub use naive::conv2d_naive;

use log::debug;

use crate::device::{Device, ThreadPool};
use crate::engine::Engine;
use crate::error::Result;
use crate::params::ConvParams;
use crate::scalar::Scalar;

/// Common interface of the convolution backends.
pub trait Conv2d<T> {
    fn conv2d(&self, params: &ConvParams, input: &[T], kernel: &[T], output: &mut [T]) -> Result<()>;
}

impl<T: Scalar, D: Device> Conv2d<T> for PatchContractConv<D> {
    fn conv2d(&self, params: &ConvParams, input: &[T], kernel: &[T], output: &mut [T]) -> Result<()> {
        PatchContractConv::conv2d(self, params, input, kernel, output)
    }
}

impl Conv2d<f32> for DescriptorConv {
    fn conv2d(&self, params: &ConvParams, input: &[f32], kernel: &[f32], output: &mut [f32]) -> Result<()> {
        DescriptorConv::conv2d(self, params, input, kernel, output)
    }
}

/// Hardware capabilities relevant to backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub descriptor_engine: bool,
}

impl Capabilities {
    /// Capabilities compiled into this build (the `descriptor` feature).
    pub fn from_build() -> Self {
        Capabilities {
            descriptor_engine: cfg!(feature = "descriptor"),
        }
    }
}

/// Selects which convolution backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvBackend {
    /// Patch extraction + contraction.
    PatchContract,
    /// Descriptor-driven engine primitive.
    Descriptor,
}

impl ConvBackend {
    pub fn select(caps: Capabilities) -> Self {
        if caps.descriptor_engine {
            ConvBackend::Descriptor
        } else {
            ConvBackend::PatchContract
        }
    }
}

/// Dispatch an f32 convolution to the selected backend.
///
/// Uses rayon's global pool for the patch backend and CPU engine 0 for the
/// descriptor backend. Build the backends directly to supply your own.
pub fn conv2d(
    backend: ConvBackend,
    params: &ConvParams,
    input: &[f32],
    kernel: &[f32],
    output: &mut [f32],
) -> Result<()> {
    debug!(
        "conv2d {:?} * {:?} -> {:?} via {:?}",
        params.input_dims(),
        params.kernel_dims(),
        params.output_dims(),
        backend
    );
    match backend {
        ConvBackend::PatchContract => {
            PatchContractConv::new(ThreadPool::global()).conv2d(params, input, kernel, output)
        }
        ConvBackend::Descriptor => {
            DescriptorConv::new(Engine::cpu(0)).conv2d(params, input, kernel, output)
        }
    }
}

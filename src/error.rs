use thiserror::Error;

use crate::engine::EngineError;

/// Errors reported by the convolution entry points.
///
/// Shape consistency between input, kernel and output extents is a caller
/// contract and is not reported here; only buffer lengths and engine
/// construction failures are.
#[derive(Debug, Error)]
pub enum ConvError {
    #[error("{what} buffer holds {len} elements but its extents need {required}")]
    BufferTooSmall {
        what: &'static str,
        len: usize,
        required: usize,
    },
    #[error("{0} must be at least 1")]
    ZeroFactor(&'static str),
    #[error("kernel expects {kernel} input channels but input has {input}")]
    ChannelMismatch { input: usize, kernel: usize },
    #[error("output {axis} extent is {actual}, expected {expected}")]
    OutputMismatch {
        axis: &'static str,
        actual: usize,
        expected: usize,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, ConvError>;

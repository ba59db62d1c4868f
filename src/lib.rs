//! 2D convolution as a leaf numeric routine for compiled-kernel runtimes.
//!
//! Two interchangeable backends compute the same strided, padded, dilated
//! cross-correlation over channel-last buffers: a patch-extraction +
//! contraction path generic over the scalar type and the execution device,
//! and a descriptor-driven engine path for `f32` that lets the engine pick
//! its internal layouts.
//!
//! # Example
//!
//! ```
//! use microconv::conv::{conv2d, Capabilities, ConvBackend};
//! use microconv::params::{ConvParams, Padding};
//!
//! let params = ConvParams::builder([1, 4, 4, 1], [3, 3, 1, 1])
//!     .padding(Padding::uniform(1))
//!     .build();
//! let input = vec![1.0f32; 16];
//! let kernel = vec![1.0f32; 9];
//! let mut output = vec![0.0f32; params.output_len()];
//!
//! let backend = ConvBackend::select(Capabilities::from_build());
//! conv2d(backend, &params, &input, &kernel, &mut output).unwrap();
//! assert_eq!(output[0], 4.0);
//! assert_eq!(output[5], 9.0);
//! ```

/// Convolution backends, reference implementation and backend selection.
pub mod conv;
/// Execution devices for the patch-contraction backend.
pub mod device;
/// Descriptor-driven compute engine used by the descriptor backend.
pub mod engine;
/// Crate error type.
pub mod error;
/// Convolution parameters and output-size arithmetic.
pub mod params;
/// Scalar types accepted by the generic backend.
pub mod scalar;
/// Non-owning 4D tensor views.
pub mod tensor;

pub use error::{ConvError, Result};

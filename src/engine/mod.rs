//! Descriptor-driven compute engine.
//!
//! Callers describe tensors with [`MemoryDesc`]s, optionally leaving the
//! layout as [`Format::Any`], and let a primitive descriptor pick the
//! layout it computes in. Layout changes are explicit [`Primitive::Reorder`]
//! operations submitted to a [`Stream`] next to the compute primitives.

mod convolution;
mod memory;
mod stream;

pub use convolution::{
    Algorithm, ConvolutionForward, ConvolutionForwardDesc, ConvolutionForwardPrimitiveDesc,
    PaddingKind, PropKind,
};
pub use memory::{DataType, Format, Memory, MemoryArena, MemoryDesc};
pub use stream::{Primitive, Reorder, Stream, StreamKind};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unimplemented: {0}")]
    Unimplemented(&'static str),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("unsupported data type {0:?}")]
    UnsupportedDataType(DataType),
    #[error("buffer of {len} elements is smaller than the memory size {required}")]
    BufferTooSmall { len: usize, required: usize },
    #[error("memory {0} is read-only")]
    ReadOnly(usize),
    #[error("memory {0} is being written by the executing primitive")]
    Busy(usize),
    #[error("memory {0} is not registered")]
    UnknownMemory(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Cpu,
}

/// Which layouts the engine asks for when a descriptor says [`Format::Any`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayoutPolicy {
    /// 8-channel blocked layouts where the channel counts allow, plain otherwise.
    #[default]
    Blocked,
    /// `Nchw` activations and `Oihw` weights.
    Plain,
    /// `Nhwc` activations and `Hwio` weights.
    ChannelsLast,
}

/// Handle to a processing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engine {
    kind: EngineKind,
    index: usize,
    policy: LayoutPolicy,
}

impl Engine {
    pub fn cpu(index: usize) -> Self {
        Engine {
            kind: EngineKind::Cpu,
            index,
            policy: LayoutPolicy::default(),
        }
    }

    pub fn with_layout_policy(mut self, policy: LayoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn layout_policy(&self) -> LayoutPolicy {
        self.policy
    }

    pub(crate) fn preferred_activation_format(&self, desc: &MemoryDesc) -> Format {
        match self.policy {
            LayoutPolicy::Blocked if desc.supports(Format::NChw8c) => Format::NChw8c,
            LayoutPolicy::Blocked | LayoutPolicy::Plain => Format::Nchw,
            LayoutPolicy::ChannelsLast => Format::Nhwc,
        }
    }

    pub(crate) fn preferred_weights_format(&self, desc: &MemoryDesc) -> Format {
        match self.policy {
            LayoutPolicy::Blocked if desc.supports(Format::OIhw8i8o) => Format::OIhw8i8o,
            LayoutPolicy::Blocked | LayoutPolicy::Plain => Format::Oihw,
            LayoutPolicy::ChannelsLast => Format::Hwio,
        }
    }
}

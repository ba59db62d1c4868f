use log::debug;

use super::{DataType, Engine, EngineError, Format, Memory, MemoryArena, MemoryDesc};
use crate::params::conv_output_size;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    ForwardTraining,
    ForwardInference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Direct,
    Winograd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingKind {
    Zero,
}

/// Operation descriptor for a forward convolution.
///
/// Dims are canonical: src and dst `(N, C, H, W)`, weights `(O, I, H, W)`.
/// Spatial pairs are `[rows, cols]`. `dilates` is zero-based: 0 means
/// adjacent kernel taps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvolutionForwardDesc {
    pub prop_kind: PropKind,
    pub algorithm: Algorithm,
    pub src: MemoryDesc,
    pub weights: MemoryDesc,
    pub dst: MemoryDesc,
    pub strides: [usize; 2],
    pub dilates: [usize; 2],
    pub padding_l: [usize; 2],
    pub padding_r: [usize; 2],
    pub padding_kind: PaddingKind,
}

/// A validated convolution with every layout resolved for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvolutionForwardPrimitiveDesc {
    prop_kind: PropKind,
    src: MemoryDesc,
    weights: MemoryDesc,
    dst: MemoryDesc,
    strides: [usize; 2],
    dilates: [usize; 2],
    padding_l: [usize; 2],
}

fn invalid(msg: String) -> EngineError {
    EngineError::InvalidArguments(msg)
}

impl ConvolutionForwardPrimitiveDesc {
    pub fn new(desc: &ConvolutionForwardDesc, engine: &Engine) -> Result<Self, EngineError> {
        if desc.algorithm != Algorithm::Direct {
            return Err(EngineError::Unimplemented("winograd convolution"));
        }
        if desc.prop_kind != PropKind::ForwardInference {
            return Err(EngineError::Unimplemented("forward training"));
        }
        for md in [&desc.src, &desc.weights, &desc.dst] {
            if md.data_type() != DataType::F32 {
                return Err(EngineError::UnsupportedDataType(md.data_type()));
            }
        }
        if desc.strides.contains(&0) {
            return Err(invalid(format!("strides {:?} must be positive", desc.strides)));
        }

        let [n, c, h, w] = desc.src.dims();
        let [o, i, kh, kw] = desc.weights.dims();
        let [dn, dc, oh, ow] = desc.dst.dims();
        if n != dn {
            return Err(invalid(format!("src batch {} differs from dst batch {}", n, dn)));
        }
        if c != i {
            return Err(invalid(format!("src has {} channels, weights expect {}", c, i)));
        }
        if o != dc {
            return Err(invalid(format!("weights produce {} channels, dst holds {}", o, dc)));
        }
        for (axis, input, kernel, output) in [(0, h, kh, oh), (1, w, kw, ow)] {
            let expected = conv_output_size(
                input,
                kernel,
                desc.strides[axis],
                desc.padding_l[axis],
                desc.padding_r[axis],
                1,
                desc.dilates[axis] + 1,
            );
            if output != expected {
                return Err(invalid(format!(
                    "dst spatial extent {} on axis {} does not match the expected {}",
                    output, axis, expected
                )));
            }
        }

        let resolve = |md: &MemoryDesc, preferred: Format| {
            if md.format() == Format::Any {
                md.with_format(preferred)
            } else {
                *md
            }
        };
        let src = resolve(&desc.src, engine.preferred_activation_format(&desc.src));
        let weights = resolve(&desc.weights, engine.preferred_weights_format(&desc.weights));
        let dst = resolve(&desc.dst, engine.preferred_activation_format(&desc.dst));
        for md in [&src, &weights, &dst] {
            if !md.supports(md.format()) {
                return Err(invalid(format!(
                    "dims {:?} do not fit format {:?}",
                    md.dims(),
                    md.format()
                )));
            }
        }
        debug!(
            "convolution on {:?} engine {}: src {:?}, weights {:?}, dst {:?}",
            engine.kind(),
            engine.index(),
            src.format(),
            weights.format(),
            dst.format()
        );

        Ok(ConvolutionForwardPrimitiveDesc {
            prop_kind: desc.prop_kind,
            src,
            weights,
            dst,
            strides: desc.strides,
            dilates: desc.dilates,
            padding_l: desc.padding_l,
        })
    }

    pub fn prop_kind(&self) -> PropKind {
        self.prop_kind
    }

    pub fn src_desc(&self) -> MemoryDesc {
        self.src
    }

    pub fn weights_desc(&self) -> MemoryDesc {
        self.weights
    }

    pub fn dst_desc(&self) -> MemoryDesc {
        self.dst
    }

    /// Input coordinate read by kernel tap `k` at output coordinate `out`.
    #[inline]
    fn tap(&self, axis: usize, out: usize, k: usize, extent: usize) -> Option<usize> {
        let pos = (out * self.strides[axis] + k * (self.dilates[axis] + 1))
            .checked_sub(self.padding_l[axis])?;
        (pos < extent).then_some(pos)
    }

    fn compute(&self, src: &[f32], weights: &[f32], dst: &mut [f32]) {
        let [_, channels, height, width] = self.src.dims();
        let [_, _, kernel_h, kernel_w] = self.weights.dims();
        let [batch, filters, out_h, out_w] = self.dst.dims();

        for n in 0..batch {
            for o in 0..filters {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        let mut acc = 0.0f32;
                        for kh in 0..kernel_h {
                            let Some(ih) = self.tap(0, oh, kh, height) else {
                                continue;
                            };
                            for kw in 0..kernel_w {
                                let Some(iw) = self.tap(1, ow, kw, width) else {
                                    continue;
                                };
                                for c in 0..channels {
                                    acc += src[self.src.offset([n, c, ih, iw])]
                                        * weights[self.weights.offset([o, c, kh, kw])];
                                }
                            }
                        }
                        dst[self.dst.offset([n, o, oh, ow])] = acc;
                    }
                }
            }
        }
    }
}

/// Forward convolution bound to concrete memories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvolutionForward {
    pd: ConvolutionForwardPrimitiveDesc,
    src: Memory,
    weights: Memory,
    dst: Memory,
}

impl ConvolutionForward {
    pub fn new(
        pd: &ConvolutionForwardPrimitiveDesc,
        src: Memory,
        weights: Memory,
        dst: Memory,
    ) -> Result<Self, EngineError> {
        for (role, memory, expected) in [
            ("src", &src, pd.src),
            ("weights", &weights, pd.weights),
            ("dst", &dst, pd.dst),
        ] {
            if memory.desc() != expected {
                return Err(invalid(format!(
                    "{} memory {:?} does not match the primitive's {:?}",
                    role,
                    memory.desc(),
                    expected
                )));
            }
        }
        Ok(ConvolutionForward { pd: *pd, src, weights, dst })
    }

    pub(crate) fn execute(&self, arena: &mut MemoryArena<'_>) -> Result<(), EngineError> {
        arena.with_output(self.dst, |arena, dst| {
            let src = arena.read(self.src)?;
            let weights = arena.read(self.weights)?;
            self.pd.compute(src, weights, dst);
            Ok(())
        })
    }
}

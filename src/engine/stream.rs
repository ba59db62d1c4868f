use log::trace;

use super::{ConvolutionForward, ConvolutionForwardPrimitiveDesc, EngineError, Memory, MemoryArena};

/// Copies a memory into another with the same dims but a different layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reorder {
    from: Memory,
    to: Memory,
}

impl Reorder {
    pub fn new(from: Memory, to: Memory) -> Result<Self, EngineError> {
        let (src, dst) = (from.desc(), to.desc());
        if src.dims() != dst.dims() || src.data_type() != dst.data_type() {
            return Err(EngineError::InvalidArguments(format!(
                "cannot reorder {:?} into {:?}",
                src, dst
            )));
        }
        Ok(Reorder { from, to })
    }

    fn execute(&self, arena: &mut MemoryArena<'_>) -> Result<(), EngineError> {
        let (src_md, dst_md) = (self.from.desc(), self.to.desc());
        arena.with_output(self.to, |arena, dst| {
            let src = arena.read(self.from)?;
            src_md.for_each_index(|idx| dst[dst_md.offset(idx)] = src[src_md.offset(idx)]);
            Ok(())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    Reorder(Reorder),
    ConvolutionForward(ConvolutionForward),
}

impl Primitive {
    pub fn reorder(from: Memory, to: Memory) -> Result<Self, EngineError> {
        Reorder::new(from, to).map(Primitive::Reorder)
    }

    pub fn convolution_forward(
        pd: &ConvolutionForwardPrimitiveDesc,
        src: Memory,
        weights: Memory,
        dst: Memory,
    ) -> Result<Self, EngineError> {
        ConvolutionForward::new(pd, src, weights, dst).map(Primitive::ConvolutionForward)
    }

    pub fn execute(&self, arena: &mut MemoryArena<'_>) -> Result<(), EngineError> {
        match self {
            Primitive::Reorder(reorder) => reorder.execute(arena),
            Primitive::ConvolutionForward(conv) => conv.execute(arena),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Eager,
}

/// Ordered queue of primitives. [`wait`](Stream::wait) runs everything
/// submitted so far, in order, and returns when it is done.
#[derive(Debug)]
pub struct Stream<'p> {
    kind: StreamKind,
    queue: Vec<&'p Primitive>,
}

impl<'p> Stream<'p> {
    pub fn new(kind: StreamKind) -> Self {
        Stream { kind, queue: Vec::new() }
    }

    pub fn eager() -> Self {
        Stream::new(StreamKind::Eager)
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn submit(&mut self, net: &'p [Primitive]) -> &mut Self {
        self.queue.extend(net);
        self
    }

    pub fn wait(&mut self, arena: &mut MemoryArena<'_>) -> Result<(), EngineError> {
        trace!("stream {:?}: executing {} primitives", self.kind, self.queue.len());
        for primitive in self.queue.drain(..) {
            primitive.execute(arena)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DataType, Format, MemoryDesc};

    #[test]
    fn reorder_round_trips_through_blocked_layout() {
        let nhwc = MemoryDesc::new([1, 8, 2, 3], DataType::F32, Format::Nhwc);
        let data: Vec<f32> = (0..nhwc.size()).map(|i| i as f32).collect();
        let mut back = vec![0.0f32; nhwc.size()];

        let mut arena = MemoryArena::new();
        let user = arena.user_input(nhwc, &data).unwrap();
        let blocked = arena.scratch(nhwc.with_format(Format::NChw8c)).unwrap();
        let out = arena.user_output(nhwc, &mut back).unwrap();
        let net = vec![
            Primitive::reorder(user, blocked).unwrap(),
            Primitive::reorder(blocked, out).unwrap(),
        ];
        Stream::eager().submit(&net).wait(&mut arena).unwrap();

        // NHWC with 8 channels matches nChw8c element for element per pixel
        let blocked_data = arena.read(blocked).unwrap().to_vec();
        drop(arena);
        assert_eq!(back, data);
        assert_eq!(blocked_data[1], data[1]);
        assert_eq!(blocked_data[8], data[8]);
    }

    #[test]
    fn reorder_rejects_shape_change() {
        let mut arena = MemoryArena::new();
        let a = arena
            .scratch(MemoryDesc::new([1, 2, 2, 2], DataType::F32, Format::Nchw))
            .unwrap();
        let b = arena
            .scratch(MemoryDesc::new([1, 2, 4, 1], DataType::F32, Format::Nhwc))
            .unwrap();
        assert!(matches!(Reorder::new(a, b), Err(EngineError::InvalidArguments(_))));
    }

    #[test]
    fn wait_drains_queue() {
        let mut arena = MemoryArena::new();
        let desc = MemoryDesc::new([1, 1, 1, 2], DataType::F32, Format::Nchw);
        let a = arena.scratch(desc).unwrap();
        let b = arena.scratch(desc.with_format(Format::Nhwc)).unwrap();
        let net = [Primitive::reorder(a, b).unwrap()];
        let mut stream = Stream::eager();
        stream.submit(&net).submit(&net);
        stream.wait(&mut arena).unwrap();
        assert!(stream.wait(&mut arena).is_ok());
        assert_eq!(stream.kind(), StreamKind::Eager);
    }
}

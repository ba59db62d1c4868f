use std::mem;

use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    F32,
    S8,
}

/// Physical layout of a 4D tensor.
///
/// Activation formats index canonical dims `(N, C, H, W)`, weight formats
/// index `(O, I, H, W)`. Blocked formats keep 8 channels innermost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Left for the primitive to choose. Laid out like `Nchw` if ever read.
    Any,
    Nchw,
    Nhwc,
    NChw8c,
    Oihw,
    Hwio,
    OIhw8i8o,
}

const BLOCK: usize = 8;

/// Shape, element type and layout of a memory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryDesc {
    dims: [usize; 4],
    data_type: DataType,
    format: Format,
}

impl MemoryDesc {
    pub fn new(dims: [usize; 4], data_type: DataType, format: Format) -> Self {
        MemoryDesc { dims, data_type, format }
    }

    pub fn dims(&self) -> [usize; 4] {
        self.dims
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn with_format(self, format: Format) -> Self {
        MemoryDesc { format, ..self }
    }

    /// Number of elements the layout occupies.
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Buffer offset of the canonical index `[a, b, h, w]`.
    #[inline]
    pub fn offset(&self, idx: [usize; 4]) -> usize {
        let [a_dim, b_dim, h_dim, w_dim] = self.dims;
        let [a, b, h, w] = idx;
        match self.format {
            Format::Any | Format::Nchw | Format::Oihw => ((a * b_dim + b) * h_dim + h) * w_dim + w,
            Format::Nhwc => ((a * h_dim + h) * w_dim + w) * b_dim + b,
            Format::Hwio => ((h * w_dim + w) * b_dim + b) * a_dim + a,
            Format::NChw8c => {
                let blocks = b_dim / BLOCK;
                (((a * blocks + b / BLOCK) * h_dim + h) * w_dim + w) * BLOCK + b % BLOCK
            }
            Format::OIhw8i8o => {
                let in_blocks = b_dim / BLOCK;
                let block = (((a / BLOCK) * in_blocks + b / BLOCK) * h_dim + h) * w_dim + w;
                block * BLOCK * BLOCK + (b % BLOCK) * BLOCK + a % BLOCK
            }
        }
    }

    /// Whether `format` can describe these dims without padding.
    pub fn supports(&self, format: Format) -> bool {
        let [a, b, _, _] = self.dims;
        match format {
            Format::NChw8c => b % BLOCK == 0,
            Format::OIhw8i8o => a % BLOCK == 0 && b % BLOCK == 0,
            _ => true,
        }
    }

    /// Visits every canonical index in row-major order.
    pub(crate) fn for_each_index(&self, mut f: impl FnMut([usize; 4])) {
        let [a_dim, b_dim, h_dim, w_dim] = self.dims;
        for a in 0..a_dim {
            for b in 0..b_dim {
                for h in 0..h_dim {
                    for w in 0..w_dim {
                        f([a, b, h, w]);
                    }
                }
            }
        }
    }
}

/// Handle to a memory object registered in a [`MemoryArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Memory {
    id: usize,
    desc: MemoryDesc,
}

impl Memory {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn desc(&self) -> MemoryDesc {
        self.desc
    }
}

enum Slot<'a> {
    Input(&'a [f32]),
    Output(&'a mut [f32]),
    Scratch(Vec<f32>),
    Vacant,
}

/// Storage behind [`Memory`] handles: borrowed user buffers and
/// engine-owned scratch buffers. Lives for one convolution call.
#[derive(Default)]
pub struct MemoryArena<'a> {
    slots: Vec<Slot<'a>>,
}

impl<'a> MemoryArena<'a> {
    pub fn new() -> Self {
        MemoryArena { slots: Vec::new() }
    }

    fn register(&mut self, desc: MemoryDesc, len: usize, slot: Slot<'a>) -> Result<Memory, EngineError> {
        if desc.format == Format::Any {
            return Err(EngineError::InvalidArguments(
                "memory cannot be created with format Any".to_string(),
            ));
        }
        if desc.data_type != DataType::F32 {
            return Err(EngineError::UnsupportedDataType(desc.data_type));
        }
        if !desc.supports(desc.format) {
            return Err(EngineError::InvalidArguments(format!(
                "dims {:?} do not fit format {:?}",
                desc.dims, desc.format
            )));
        }
        if len < desc.size() {
            return Err(EngineError::BufferTooSmall { len, required: desc.size() });
        }
        self.slots.push(slot);
        Ok(Memory { id: self.slots.len() - 1, desc })
    }

    /// Read-only user buffer.
    pub fn user_input(&mut self, desc: MemoryDesc, data: &'a [f32]) -> Result<Memory, EngineError> {
        self.register(desc, data.len(), Slot::Input(data))
    }

    /// Writable user buffer.
    pub fn user_output(&mut self, desc: MemoryDesc, data: &'a mut [f32]) -> Result<Memory, EngineError> {
        self.register(desc, data.len(), Slot::Output(data))
    }

    /// Zero-initialized buffer owned by the arena.
    pub fn scratch(&mut self, desc: MemoryDesc) -> Result<Memory, EngineError> {
        let size = desc.size();
        self.register(desc, size, Slot::Scratch(vec![0.0; size]))
    }

    pub fn read(&self, memory: Memory) -> Result<&[f32], EngineError> {
        match self.slots.get(memory.id) {
            Some(Slot::Input(data)) => Ok(&data[..]),
            Some(Slot::Output(data)) => Ok(&data[..]),
            Some(Slot::Scratch(data)) => Ok(&data[..]),
            Some(Slot::Vacant) => Err(EngineError::Busy(memory.id)),
            None => Err(EngineError::UnknownMemory(memory.id)),
        }
    }

    /// Runs `f` with `memory` writable and every other memory readable.
    pub(crate) fn with_output<R>(
        &mut self,
        memory: Memory,
        f: impl FnOnce(&Self, &mut [f32]) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let slot = self
            .slots
            .get_mut(memory.id)
            .ok_or(EngineError::UnknownMemory(memory.id))?;
        let mut taken = mem::replace(slot, Slot::Vacant);
        let result = match &mut taken {
            Slot::Output(data) => f(self, &mut data[..]),
            Slot::Scratch(data) => f(self, &mut data[..]),
            Slot::Input(_) => Err(EngineError::ReadOnly(memory.id)),
            Slot::Vacant => Err(EngineError::Busy(memory.id)),
        };
        self.slots[memory.id] = taken;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_channels_last_offsets() {
        let nchw = MemoryDesc::new([2, 3, 4, 5], DataType::F32, Format::Nchw);
        let nhwc = nchw.with_format(Format::Nhwc);
        assert_eq!(nchw.offset([1, 2, 3, 4]), 119);
        assert_eq!(nhwc.offset([1, 2, 3, 4]), 119);
        assert_eq!(nchw.offset([0, 1, 0, 0]), 20);
        assert_eq!(nhwc.offset([0, 1, 0, 0]), 1);
        assert_eq!(nhwc.offset([0, 0, 0, 1]), 3);
    }

    #[test]
    fn hwio_offsets() {
        // dims are (O, I, H, W) = (4, 2, 3, 3)
        let hwio = MemoryDesc::new([4, 2, 3, 3], DataType::F32, Format::Hwio);
        assert_eq!(hwio.offset([1, 0, 0, 0]), 1);
        assert_eq!(hwio.offset([0, 1, 0, 0]), 4);
        assert_eq!(hwio.offset([0, 0, 0, 1]), 8);
        assert_eq!(hwio.offset([0, 0, 1, 0]), 24);
    }

    #[test]
    fn blocked_offsets_are_a_permutation() {
        for desc in [
            MemoryDesc::new([2, 16, 3, 2], DataType::F32, Format::NChw8c),
            MemoryDesc::new([16, 8, 2, 3], DataType::F32, Format::OIhw8i8o),
        ] {
            let mut seen = vec![false; desc.size()];
            desc.for_each_index(|idx| {
                let off = desc.offset(idx);
                assert!(!seen[off], "{:?} maps twice to {}", desc.format(), off);
                seen[off] = true;
            });
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn blocked_formats_need_divisible_channels() {
        let desc = MemoryDesc::new([1, 6, 2, 2], DataType::F32, Format::Nchw);
        assert!(!desc.supports(Format::NChw8c));
        assert!(desc.supports(Format::Nhwc));
        let mut arena = MemoryArena::new();
        assert!(matches!(
            arena.scratch(desc.with_format(Format::NChw8c)),
            Err(EngineError::InvalidArguments(_))
        ));
    }

    #[test]
    fn arena_rejects_short_and_untyped_memory() {
        let data = [0.0f32; 3];
        let mut arena = MemoryArena::new();
        let desc = MemoryDesc::new([1, 1, 2, 2], DataType::F32, Format::Nchw);
        assert!(matches!(
            arena.user_input(desc, &data),
            Err(EngineError::BufferTooSmall { len: 3, required: 4 })
        ));
        assert!(matches!(
            arena.scratch(desc.with_format(Format::Any)),
            Err(EngineError::InvalidArguments(_))
        ));
    }

    #[test]
    fn inputs_are_read_only() {
        let data = [1.0f32; 4];
        let mut arena = MemoryArena::new();
        let desc = MemoryDesc::new([1, 1, 2, 2], DataType::F32, Format::Nchw);
        let input = arena.user_input(desc, &data).unwrap();
        let result = arena.with_output(input, |_, _| Ok(()));
        assert_eq!(result, Err(EngineError::ReadOnly(input.id())));
        // the slot is restored after the failed write
        assert_eq!(arena.read(input).unwrap(), &data);
    }

    #[test]
    fn output_is_busy_while_written() {
        let mut out = [0.0f32; 4];
        let mut arena = MemoryArena::new();
        let desc = MemoryDesc::new([1, 1, 2, 2], DataType::F32, Format::Nchw);
        let dst = arena.user_output(desc, &mut out).unwrap();
        arena
            .with_output(dst, |arena, buf| {
                assert_eq!(arena.read(dst), Err(EngineError::Busy(dst.id())));
                buf.fill(2.0);
                Ok(())
            })
            .unwrap();
        drop(arena);
        assert_eq!(out, [2.0; 4]);
    }
}

use std::fmt;

use crate::error::{ConvError, Result};

#[inline]
fn row_major_offset(dims: &[usize; 4], idx: [usize; 4]) -> usize {
    ((idx[0] * dims[1] + idx[1]) * dims[2] + idx[2]) * dims[3] + idx[3]
}

fn check_len(what: &'static str, len: usize, dims: &[usize; 4]) -> Result<()> {
    let required = dims.iter().product();
    if len < required {
        return Err(ConvError::BufferTooSmall { what, len, required });
    }
    Ok(())
}

/// Read-only 4D view over a caller-owned flat buffer.
///
/// Row-major, fastest axis last. The view may be shorter than the slice;
/// trailing elements are never touched.
#[derive(Clone, Copy)]
pub struct TensorView<'a, T> {
    dims: [usize; 4],
    data: &'a [T],
}

impl<'a, T: Copy> TensorView<'a, T> {
    pub fn new(what: &'static str, data: &'a [T], dims: [usize; 4]) -> Result<Self> {
        check_len(what, data.len(), &dims)?;
        let len = dims.iter().product();
        Ok(TensorView { dims, data: &data[..len] })
    }

    pub fn dims(&self) -> [usize; 4] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    #[inline]
    pub fn offset(&self, idx: [usize; 4]) -> usize {
        row_major_offset(&self.dims, idx)
    }

    #[inline]
    pub fn get(&self, idx: [usize; 4]) -> T {
        self.data[self.offset(idx)]
    }
}

impl<T> fmt::Debug for TensorView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.dims;
        write!(f, "TensorView({}x{}x{}x{})", a, b, c, d)
    }
}

/// Mutable counterpart of [`TensorView`], used for the output buffer.
pub struct TensorViewMut<'a, T> {
    dims: [usize; 4],
    data: &'a mut [T],
}

impl<'a, T: Copy> TensorViewMut<'a, T> {
    pub fn new(what: &'static str, data: &'a mut [T], dims: [usize; 4]) -> Result<Self> {
        check_len(what, data.len(), &dims)?;
        let len = dims.iter().product();
        Ok(TensorViewMut { dims, data: &mut data[..len] })
    }

    pub fn dims(&self) -> [usize; 4] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &*self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut *self.data
    }

    #[inline]
    pub fn offset(&self, idx: [usize; 4]) -> usize {
        row_major_offset(&self.dims, idx)
    }

    #[inline]
    pub fn get(&self, idx: [usize; 4]) -> T {
        self.data[self.offset(idx)]
    }

    #[inline]
    pub fn set(&mut self, idx: [usize; 4], val: T) {
        let off = self.offset(idx);
        self.data[off] = val;
    }
}

impl<T> fmt::Debug for TensorViewMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.dims;
        write!(f, "TensorViewMut({}x{}x{}x{})", a, b, c, d)
    }
}

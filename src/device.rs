//! Execution devices for the patch-contraction backend.
//!
//! A device decides how disjoint output chunks are scheduled. The routine
//! itself stays synchronous: every method returns once all chunks are done.

use rayon::prelude::*;

use crate::error::Result;

pub trait Device: Sync {
    /// Calls `f(index, chunk)` for each consecutive `chunk_len`-sized chunk
    /// of `out` (the last one may be shorter).
    fn for_each_chunk<T, F>(&self, out: &mut [T], chunk_len: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Send + Sync;

    fn num_threads(&self) -> usize;
}

/// Runs every chunk on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleThreaded;

impl Device for SingleThreaded {
    fn for_each_chunk<T, F>(&self, out: &mut [T], chunk_len: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        if chunk_len == 0 {
            return;
        }
        out.chunks_mut(chunk_len)
            .enumerate()
            .for_each(|(i, chunk)| f(i, chunk));
    }

    fn num_threads(&self) -> usize {
        1
    }
}

/// Spreads chunks over a rayon pool, either a dedicated one or the global one.
#[derive(Debug)]
pub struct ThreadPool {
    pool: Option<rayon::ThreadPool>,
}

impl ThreadPool {
    /// Dedicated pool with `num_threads` workers (0 lets rayon decide).
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("microconv-{}", i))
            .build()?;
        Ok(ThreadPool { pool: Some(pool) })
    }

    /// Uses rayon's global pool.
    pub fn global() -> Self {
        ThreadPool { pool: None }
    }
}

impl Device for ThreadPool {
    fn for_each_chunk<T, F>(&self, out: &mut [T], chunk_len: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        if chunk_len == 0 {
            return;
        }
        let mut run = || {
            out.par_chunks_mut(chunk_len)
                .enumerate()
                .for_each(|(i, chunk)| f(i, chunk));
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

//! Parallel slice adapters that degrade to their serial `std` equivalents
//! when the `parallel` feature is disabled. Callers write against
//! `par_chunks_mut` unconditionally; the feature decides whether rayon is
//! behind it.

#[cfg(not(feature = "parallel"))]
use std::slice::ChunksMut;

#[cfg(feature = "parallel")]
pub use rayon::prelude::{IndexedParallelIterator, ParallelIterator};
#[cfg(feature = "parallel")]
use rayon::slice::{ChunksMut as ParChunksMut, ParallelSliceMut};

#[cfg(feature = "parallel")]
pub trait MaybeParChunksMut<T: Send> {
    fn par_chunks_mut(&mut self, chunk_size: usize) -> ParChunksMut<'_, T>;
}

#[cfg(not(feature = "parallel"))]
pub trait MaybeParChunksMut<T: Send> {
    fn par_chunks_mut(&mut self, chunk_size: usize) -> ChunksMut<'_, T>;
}

#[cfg(feature = "parallel")]
impl<T: ?Sized + ParallelSliceMut<U>, U: Send> MaybeParChunksMut<U> for T {
    fn par_chunks_mut(&mut self, chunk_size: usize) -> ParChunksMut<'_, U> {
        self.par_chunks_mut(chunk_size)
    }
}

#[cfg(not(feature = "parallel"))]
impl<T: Send> MaybeParChunksMut<T> for [T] {
    fn par_chunks_mut(&mut self, chunk_size: usize) -> ChunksMut<'_, T> {
        self.chunks_mut(chunk_size)
    }
}

/// The number of workers a parallel region will fan out to: the size of
/// the current rayon pool, or 1 without the `parallel` feature.
#[cfg(feature = "parallel")]
pub fn num_workers() -> usize {
    rayon::current_num_threads()
}

#[cfg(not(feature = "parallel"))]
pub fn num_workers() -> usize {
    1
}

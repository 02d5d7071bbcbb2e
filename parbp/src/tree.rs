use core::fmt;

use anyhow::Result;
use log::debug;
use parbp_maybe_rayon::*;
use parbp_util::{ceil_div_usize, heap_left_child, heap_level_start, log2_ceil};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

use crate::bitseq::BitSequence;

/// Number of bits summarised by one leaf of the tree.
pub const CHUNK_SIZE: usize = 256;

/// Arity of the tree. The implicit-heap arithmetic is binary.
pub const ARITY: usize = 2;

// The byte-granular query fast path needs chunk boundaries on byte
// boundaries, and the heap helpers assume a binary tree.
const_assert!(CHUNK_SIZE % 8 == 0);
const_assert!(ARITY == 2);

/// The input is no longer than one chunk, so there is nothing to build a
/// tree over.
#[derive(Debug)]
pub struct InputTooSmall {
    pub len: usize,
    pub chunk_size: usize,
}

impl fmt::Display for InputTooSmall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input of {} bits is not larger than the chunk size {}",
            self.len, self.chunk_size
        )
    }
}

impl std::error::Error for InputTooSmall {}

/// A range min-max tree over the excess function of a parenthesis
/// sequence.
///
/// Nodes live in a 0-based implicit binary heap: leaves summarising
/// `CHUNK_SIZE`-bit chunks occupy `offset..offset + num_chunks`, internal
/// nodes fill `0..offset`, where `offset = 2^height - 1`. The sequence
/// itself is not owned; queries borrow it again. All arrays are immutable
/// once construction returns, so queries may run from any number of
/// threads.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RangeMinMaxTree {
    num_chunks: usize,
    height: usize,
    pub(crate) offset: usize,
    /// Absolute prefix excess through the end of each chunk (leaves only).
    pub(crate) excess: Vec<i16>,
    /// Minimum absolute excess within each node's chunk range; `i16::MAX`
    /// on internal nodes with no chunks beneath them.
    pub(crate) min: Vec<i16>,
    /// Maximum absolute excess within each node's chunk range; `i16::MIN`
    /// on internal nodes with no chunks beneath them.
    pub(crate) max: Vec<i16>,
    /// Number of positions (leaves) or children (internal nodes)
    /// attaining the node minimum.
    pub(crate) num_mins: Vec<i16>,
}

impl RangeMinMaxTree {
    /// Builds the index over `b`, partitioning construction across the
    /// current worker pool.
    pub fn new(b: &BitSequence) -> Result<Self> {
        Self::with_workers(b, num_workers())
    }

    /// Builds the index with the chunk-partitioning arithmetic pinned to
    /// `workers` contiguous ranges. The resulting arrays are identical
    /// for every worker count; only construction time varies.
    pub fn with_workers(b: &BitSequence, workers: usize) -> Result<Self> {
        let n = b.len();
        if n <= CHUNK_SIZE {
            return Err(InputTooSmall {
                len: n,
                chunk_size: CHUNK_SIZE,
            }
            .into());
        }

        let num_chunks = ceil_div_usize(n, CHUNK_SIZE);
        let workers = workers.clamp(1, num_chunks);
        let cpt = ceil_div_usize(num_chunks, workers);
        let height = log2_ceil(num_chunks);
        let offset = heap_level_start(height);

        debug!(
            "building range min-max tree: n={n} num_chunks={num_chunks} height={height} \
             workers={workers} chunks_per_worker={cpt}"
        );

        let mut tree = Self {
            num_chunks,
            height,
            offset,
            excess: vec![0; num_chunks],
            min: vec![i16::MAX; num_chunks + offset],
            max: vec![i16::MIN; num_chunks + offset],
            num_mins: vec![0; num_chunks + offset],
        };

        tree.summarise_chunks(b, cpt);
        tree.shift_to_absolute(cpt);
        tree.fill_internal_nodes(workers);

        Ok(tree)
    }

    /// One parallel pass over the bits: each worker owns `cpt` consecutive
    /// chunks and carries a running excess from its own first bit. Per
    /// chunk it records the running excess at the chunk end and the
    /// min/max/multiplicity of the running excess, all still relative to
    /// the worker's start; `shift_to_absolute` turns them global.
    fn summarise_chunks(&mut self, b: &BitSequence, cpt: usize) {
        let n = b.len();
        let (_, min_leaves) = self.min.split_at_mut(self.offset);
        let (_, max_leaves) = self.max.split_at_mut(self.offset);
        let (_, num_min_leaves) = self.num_mins.split_at_mut(self.offset);

        self.excess
            .par_chunks_mut(cpt)
            .zip(min_leaves.par_chunks_mut(cpt))
            .zip(max_leaves.par_chunks_mut(cpt))
            .zip(num_min_leaves.par_chunks_mut(cpt))
            .enumerate()
            .for_each(|(worker, (((excess, min), max), num_mins))| {
                let mut partial_excess = 0i16;
                for chunk in 0..excess.len() {
                    let llimit = (worker * cpt + chunk) * CHUNK_SIZE;
                    let ulimit = (llimit + CHUNK_SIZE).min(n);

                    let mut chunk_min = i16::MAX;
                    let mut chunk_max = i16::MIN;
                    let mut mins = 0i16;
                    for pos in llimit..ulimit {
                        partial_excess += if b.get(pos) { 1 } else { -1 };
                        if partial_excess < chunk_min {
                            chunk_min = partial_excess;
                            mins = 1;
                        } else if partial_excess == chunk_min {
                            mins += 1;
                        }
                        if partial_excess > chunk_max {
                            chunk_max = partial_excess;
                        }
                    }

                    excess[chunk] = partial_excess;
                    min[chunk] = chunk_min;
                    max[chunk] = chunk_max;
                    num_mins[chunk] = mins;
                }
            });
    }

    /// Two-phase prefix fixup. Phase A serially accumulates each
    /// non-final range's trailing excess entry into the next range's,
    /// making every range boundary a global prefix total. Phase B shifts
    /// the remaining excess entries and the min/max leaves of each range
    /// by the total preceding it, in parallel. Afterwards every entry is
    /// an absolute excess; worker 0's entries already were.
    fn shift_to_absolute(&mut self, cpt: usize) {
        let num_ranges = ceil_div_usize(self.num_chunks, cpt);
        if num_ranges == 1 {
            return;
        }

        // Phase A, O(num_ranges).
        for w in 1..num_ranges - 1 {
            self.excess[(w + 1) * cpt - 1] += self.excess[w * cpt - 1];
        }

        let bases: Vec<i16> = (0..num_ranges)
            .map(|w| if w == 0 { 0 } else { self.excess[w * cpt - 1] })
            .collect();

        // Phase B. Non-final ranges skip their own last entry, fixed by
        // Phase A already; the final range (possibly short) shifts all.
        let (_, min_leaves) = self.min.split_at_mut(self.offset);
        let (_, max_leaves) = self.max.split_at_mut(self.offset);
        self.excess
            .par_chunks_mut(cpt)
            .zip(min_leaves.par_chunks_mut(cpt))
            .zip(max_leaves.par_chunks_mut(cpt))
            .enumerate()
            .for_each(|(w, ((excess, min), max))| {
                if w == 0 {
                    return;
                }
                let base = bases[w];
                let skip_last = w < num_ranges - 1;
                let last = excess.len() - 1;
                for (c, e) in excess.iter_mut().enumerate() {
                    if !(skip_last && c == last) {
                        *e += base;
                    }
                }
                for m in min.iter_mut() {
                    *m += base;
                }
                for m in max.iter_mut() {
                    *m += base;
                }
            });
    }

    /// Fills internal nodes bottom-up. Each level is cut into one
    /// contiguous span of nodes per subtree rooted at `p_level`, processed
    /// in parallel; levels above `p_level` are a single serial span.
    fn fill_internal_nodes(&mut self, workers: usize) {
        let p_level = log2_ceil(workers).min(self.height);

        for lvl in (0..self.height).rev() {
            let span = if lvl >= p_level {
                1 << (lvl - p_level)
            } else {
                1 << lvl
            };
            self.fill_level(lvl, span);
        }
    }

    fn fill_level(&mut self, lvl: usize, span: usize) {
        let level_start = heap_level_start(lvl);
        let level_end = heap_level_start(lvl + 1);
        let total = self.num_chunks + self.offset;

        let (min_head, min_tail) = self.min.split_at_mut(level_end);
        let (max_head, max_tail) = self.max.split_at_mut(level_end);
        let (num_head, num_tail) = self.num_mins.split_at_mut(level_end);

        min_head[level_start..]
            .par_chunks_mut(span)
            .zip(max_head[level_start..].par_chunks_mut(span))
            .zip(num_head[level_start..].par_chunks_mut(span))
            .enumerate()
            .for_each(|(subtree, ((min, max), num_mins))| {
                for node in 0..min.len() {
                    let pos = level_start + subtree * span + node;
                    let (m, mx, nm) =
                        aggregate_children(min_tail, max_tail, num_tail, level_end, pos, total);
                    min[node] = m;
                    max[node] = mx;
                    num_mins[node] = nm;
                }
            });
    }

    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of internal nodes; the first leaf lives at this heap index.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Absolute prefix excess through the end of chunk `c`.
    pub fn chunk_excess(&self, c: usize) -> i16 {
        self.excess[c]
    }

    /// Minimum absolute excess under node `p` (heap index).
    pub fn node_min(&self, p: usize) -> i16 {
        self.min[p]
    }

    /// Maximum absolute excess under node `p` (heap index).
    pub fn node_max(&self, p: usize) -> i16 {
        self.max[p]
    }

    /// Multiplicity of the minimum at node `p` (heap index).
    pub fn node_num_mins(&self, p: usize) -> i16 {
        self.num_mins[p]
    }
}

/// Aggregates the children of `pos` into one `(min, max, num_mins)`
/// triple. `children` slices start at array index `base`; children at or
/// past `total` do not exist and are skipped. A node whose children all
/// fall past `total` keeps the never-covering sentinels.
fn aggregate_children(
    min: &[i16],
    max: &[i16],
    num_mins: &[i16],
    base: usize,
    pos: usize,
    total: usize,
) -> (i16, i16, i16) {
    let lchild = heap_left_child(pos);
    let mut m = i16::MAX;
    let mut mx = i16::MIN;
    let mut nm = 0i16;

    for child in lchild..lchild + ARITY {
        if child >= total {
            break;
        }
        let c = child - base;
        if child == lchild {
            m = min[c];
            mx = max[c];
            nm = num_mins[c];
        } else {
            if min[c] < m {
                m = min[c];
                nm = 1;
            } else if min[c] == m {
                nm += 1;
            }
            if max[c] > mx {
                mx = max[c];
            }
        }
    }

    (m, mx, nm)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    /// A uniformly random balanced sequence of `n` bits (n even).
    fn random_balanced(rng: &mut ChaCha8Rng, n: usize) -> BitSequence {
        assert_eq!(n % 2, 0);
        let mut opens_left = n / 2;
        let mut closes_left = n / 2;
        let mut excess = 0i64;
        BitSequence::from_bits((0..n).map(|_| {
            let open = if excess == 0 {
                true
            } else if opens_left == 0 {
                false
            } else {
                rng.gen_range(0..opens_left + closes_left) < opens_left
            };
            if open {
                opens_left -= 1;
                excess += 1;
            } else {
                closes_left -= 1;
                excess -= 1;
            }
            open
        }))
    }

    /// Per-chunk (min, max, multiplicity) of the absolute prefix excess,
    /// recomputed with no cleverness at all.
    fn naive_chunk_stats(b: &BitSequence) -> Vec<(i16, i16, i16, i16)> {
        let mut stats = Vec::new();
        let mut excess = 0i16;
        for start in (0..b.len()).step_by(CHUNK_SIZE) {
            let end = (start + CHUNK_SIZE).min(b.len());
            let mut min = i16::MAX;
            let mut max = i16::MIN;
            let mut mins = 0;
            for pos in start..end {
                excess += if b.get(pos) { 1 } else { -1 };
                if excess < min {
                    min = excess;
                    mins = 1;
                } else if excess == min {
                    mins += 1;
                }
                if excess > max {
                    max = excess;
                }
            }
            stats.push((excess, min, max, mins));
        }
        stats
    }

    #[test]
    fn test_rejects_input_not_larger_than_a_chunk() {
        let b = BitSequence::from_bits((0..CHUNK_SIZE).map(|i| i % 2 == 0));
        let err = RangeMinMaxTree::new(&b).unwrap_err();
        assert!(err.downcast_ref::<InputTooSmall>().is_some());
    }

    #[test]
    fn test_smallest_legal_input() -> Result<()> {
        // One bit more than a chunk: two leaves, one internal level.
        let mut bits = vec![true];
        bits.extend((0..CHUNK_SIZE).map(|i| i % 2 == 0));
        let b = BitSequence::from_bits(bits);
        let tree = RangeMinMaxTree::new(&b)?;
        assert_eq!(tree.num_chunks(), 2);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.offset, 1);
        Ok(())
    }

    #[test]
    fn test_leaves_match_naive_recomputation() -> Result<()> {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let b = random_balanced(&mut rng, 5000);
        let tree = RangeMinMaxTree::with_workers(&b, 3)?;

        for (c, &(excess, min, max, mins)) in naive_chunk_stats(&b).iter().enumerate() {
            assert_eq!(tree.excess[c], excess, "chunk {c} excess");
            assert_eq!(tree.min[tree.offset + c], min, "chunk {c} min");
            assert_eq!(tree.max[tree.offset + c], max, "chunk {c} max");
            assert_eq!(tree.num_mins[tree.offset + c], mins, "chunk {c} num_mins");
        }
        Ok(())
    }

    #[test]
    fn test_last_chunk_excess_is_the_global_total() -> Result<()> {
        // Balanced input: the absolute excess through the last chunk is 0
        // no matter how many workers contributed partial sums.
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let b = random_balanced(&mut rng, 4096);
        for workers in [1, 2, 3, 5, 8] {
            let tree = RangeMinMaxTree::with_workers(&b, workers)?;
            assert_eq!(tree.excess[tree.num_chunks() - 1], 0, "workers={workers}");
        }
        Ok(())
    }

    #[test]
    fn test_internal_nodes_satisfy_the_recurrence() -> Result<()> {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let b = random_balanced(&mut rng, 3000); // 12 chunks: a ragged tree
        let tree = RangeMinMaxTree::with_workers(&b, 4)?;
        let total = tree.num_chunks() + tree.offset;

        for pos in (0..tree.offset).rev() {
            let children: Vec<usize> = (heap_left_child(pos)..heap_left_child(pos) + ARITY)
                .filter(|&c| c < total)
                .collect();
            if children.is_empty() {
                assert_eq!(tree.min[pos], i16::MAX);
                assert_eq!(tree.max[pos], i16::MIN);
                continue;
            }
            let min = children.iter().map(|&c| tree.min[c]).min().unwrap();
            let max = children.iter().map(|&c| tree.max[c]).max().unwrap();
            assert_eq!(tree.min[pos], min, "node {pos} min");
            assert_eq!(tree.max[pos], max, "node {pos} max");

            // Multiplicity per the per-child rule: the first child's count
            // carries over unless a later child improves or ties the min.
            let mut nm = tree.num_mins[children[0]];
            let mut m = tree.min[children[0]];
            for &c in &children[1..] {
                if tree.min[c] < m {
                    m = tree.min[c];
                    nm = 1;
                } else if tree.min[c] == m {
                    nm += 1;
                }
            }
            assert_eq!(tree.num_mins[pos], nm, "node {pos} num_mins");
        }
        Ok(())
    }

    #[test]
    fn test_internal_nodes_respect_node_count_bound() -> Result<()> {
        // 5 chunks: num_chunks + offset = 12 node slots while n = 1200
        // bits, so a child bound keyed to the bit count would walk far out
        // of the node arrays. The last level-2 node has no children at all
        // and must keep its sentinels.
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let b = random_balanced(&mut rng, 1200);
        let tree = RangeMinMaxTree::with_workers(&b, 2)?;
        assert_eq!(tree.num_chunks(), 5);
        assert_eq!(tree.offset, 7);
        assert_eq!(tree.min[6], i16::MAX);
        assert_eq!(tree.max[6], i16::MIN);
        Ok(())
    }

    #[test]
    fn test_arrays_are_independent_of_worker_count() -> Result<()> {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for n in [600, 4096, 10000] {
            let b = random_balanced(&mut rng, n);
            let reference = RangeMinMaxTree::with_workers(&b, 1)?;
            for workers in [2, 4, 8, 16] {
                let tree = RangeMinMaxTree::with_workers(&b, workers)?;
                assert_eq!(tree, reference, "n={n} workers={workers}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_short_tail_range() -> Result<()> {
        // 9 chunks over 4 workers: ranges of 3, 3, 3 and an empty tail
        // collapse to 3 ranges; 9 chunks over 2 workers: 5 + 4.
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let b = random_balanced(&mut rng, 9 * CHUNK_SIZE);
        let reference = RangeMinMaxTree::with_workers(&b, 1)?;
        for workers in [2, 4, 7, 9, 16] {
            assert_eq!(RangeMinMaxTree::with_workers(&b, workers)?, reference);
        }
        Ok(())
    }
}

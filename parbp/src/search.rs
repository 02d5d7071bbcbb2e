use core::fmt;

use anyhow::Result;
use parbp_util::{
    ceil_div_usize, heap_is_left_child, heap_is_root, heap_left_child, heap_parent,
    heap_right_sibling,
};

use crate::bitseq::BitSequence;
use crate::lookup::{tables, MAX_TABLE_EXCESS, NO_POS};
use crate::tree::{RangeMinMaxTree, ARITY, CHUNK_SIZE};

/// Neither child of an internal node covers the target excess during
/// descent: the sequence is not balanced, or it is not the one the index
/// was built over.
#[derive(Debug)]
pub struct DescentInconsistency {
    pub node: usize,
    pub target: i32,
}

impl fmt::Display for DescentInconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no child of node {} covers target excess {}; the sequence is malformed",
            self.node, self.target
        )
    }
}

impl std::error::Error for DescentInconsistency {}

impl RangeMinMaxTree {
    /// The matching closing parenthesis of the opening at `i`, or `None`
    /// if it never closes.
    pub fn find_close(&self, b: &BitSequence, i: usize) -> Result<Option<usize>> {
        debug_assert!(b.get(i), "find_close asked about a closing parenthesis");
        self.fwd_search(b, i, -1)
    }

    /// The smallest `j > i` whose prefix excess exceeds the prefix excess
    /// of `i` by exactly `d`, or `None` if no such position exists.
    ///
    /// The scan tracks `need = excess(j) - excess(i) - d` and reports the
    /// first position taking it to zero.
    pub fn fwd_search(&self, b: &BitSequence, i: usize, d: i32) -> Result<Option<usize>> {
        debug_assert!(i < b.len());
        let chunk = i / CHUNK_SIZE;

        // Case 1: the match lies in the rest of i's own chunk.
        if let Some(j) = self.scan_chunk(b, chunk, i + 1, -d) {
            return Ok(Some(j));
        }

        // From here on the search works in absolute excess: the target is
        // the absolute excess of i, shifted by d.
        let mut excess_i = if chunk == 0 {
            0
        } else {
            self.chunk_excess(chunk - 1) as i32
        };
        for pos in chunk * CHUNK_SIZE..=i {
            excess_i += if b.get(pos) { 1 } else { -1 };
        }
        let target = excess_i + d;

        // Case 2: right siblings of i's chunk under the same tree node.
        let first_sibling = chunk - chunk % ARITY;
        for slot in chunk % ARITY + 1..ARITY {
            let sibling = first_sibling + slot;
            if sibling >= self.num_chunks() {
                break;
            }
            if self.covers(self.offset + sibling, target) {
                if let Some(j) = self.scan_whole_chunk(b, sibling, target) {
                    return Ok(Some(j));
                }
            }
        }

        // Case 3: climb until some right sibling covers the target, then
        // descend to the leftmost covering leaf.
        let mut node = self.offset + chunk;
        loop {
            if heap_is_root(node) {
                return Ok(None);
            }
            if heap_is_left_child(node) {
                let sibling = heap_right_sibling(node);
                if self.covers(sibling, target) {
                    node = sibling;
                    break;
                }
            }
            node = heap_parent(node);
        }

        while node < self.offset {
            let left = heap_left_child(node);
            if self.covers(left, target) {
                node = left;
            } else {
                let right = heap_right_sibling(left);
                if !self.covers(right, target) {
                    return Err(DescentInconsistency { node, target }.into());
                }
                node = right;
            }
        }

        Ok(self.scan_whole_chunk(b, node - self.offset, target))
    }

    /// Whether node `p` exists and its `[min, max]` range contains
    /// `target`. Nodes past the array end and internal nodes with no
    /// chunks beneath them never cover anything.
    fn covers(&self, p: usize, target: i32) -> bool {
        p < self.num_chunks() + self.offset
            && self.node_min(p) as i32 <= target
            && target <= self.node_max(p) as i32
    }

    /// Scans all of `chunk` for the leftmost position whose absolute
    /// prefix excess is `target`.
    fn scan_whole_chunk(&self, b: &BitSequence, chunk: usize, target: i32) -> Option<usize> {
        debug_assert!(chunk > 0);
        let need = self.chunk_excess(chunk - 1) as i32 - target;
        self.scan_chunk(b, chunk, chunk * CHUNK_SIZE, need)
    }

    /// Scans positions `[start, end)` of `chunk`, where `end` is the
    /// chunk boundary clamped to the sequence length. `need` is the
    /// running excess owed immediately before `start`; the first position
    /// taking it to zero is the match. Head and tail bits are scanned
    /// individually; byte-aligned stretches go through the lookup tables.
    fn scan_chunk(
        &self,
        b: &BitSequence,
        chunk: usize,
        start: usize,
        mut need: i32,
    ) -> Option<usize> {
        let t = tables();
        let end = ((chunk + 1) * CHUNK_SIZE).min(b.len());
        if start >= end {
            return None;
        }
        let llimit = (ceil_div_usize(start, 8) * 8).min(end);
        let rlimit = (end / 8 * 8).max(llimit);

        for j in start..llimit {
            need += if b.get(j) { 1 } else { -1 };
            if need == 0 {
                return Some(j);
            }
        }

        for j in (llimit..rlimit).step_by(8) {
            let byte = b.byte(j / 8);
            if need >= 0 {
                if need <= MAX_TABLE_EXCESS {
                    let x = t.near_fwd_pos[(need as usize) << 8 | byte as usize];
                    if x < NO_POS {
                        return Some(j + x as usize);
                    }
                }
                need += t.word_sum[byte as usize] as i32;
            } else {
                // An ascending target: the tables only cover descending
                // excess, so take the byte bit by bit.
                for x in 0..8 {
                    need += if byte >> x & 1 == 1 { 1 } else { -1 };
                    if need == 0 {
                        return Some(j + x);
                    }
                }
            }
        }

        for j in rlimit..end {
            need += if b.get(j) { 1 } else { -1 };
            if need == 0 {
                return Some(j);
            }
        }

        None
    }
}

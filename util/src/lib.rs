/// Rounding-up division: how many size-`b` blocks it takes to cover `a`.
pub const fn ceil_div_usize(a: usize, b: usize) -> usize {
    a / b + (a % b != 0) as usize
}

/// The smallest `k` with `2^k >= n`.
pub fn log2_ceil(n: usize) -> usize {
    n.next_power_of_two().trailing_zeros() as usize
}

/* Index arithmetic for a 0-based implicit binary heap: the root is 0 and
   the children of node `p` are `2p + 1` and `2p + 2`. No tree nodes are
   ever allocated; a node is just its index into flat arrays. */

pub const fn heap_parent(i: usize) -> usize {
    (i - 1) / 2
}

pub const fn heap_left_child(i: usize) -> usize {
    2 * i + 1
}

pub const fn heap_right_sibling(i: usize) -> usize {
    i + 1
}

pub const fn heap_is_root(i: usize) -> bool {
    i == 0
}

/// Whether `i` is the left child of its parent. The root is neither child.
pub const fn heap_is_left_child(i: usize) -> bool {
    i % 2 == 1
}

/// The index of the first node at depth `lvl`.
pub const fn heap_level_start(lvl: usize) -> usize {
    (1 << lvl) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_div_usize() {
        assert_eq!(ceil_div_usize(0, 7), 0);
        assert_eq!(ceil_div_usize(1, 7), 1);
        assert_eq!(ceil_div_usize(7, 7), 1);
        assert_eq!(ceil_div_usize(8, 7), 2);
        assert_eq!(ceil_div_usize(400, 256), 2);
    }

    #[test]
    fn test_log2_ceil() {
        assert_eq!(log2_ceil(0), 0);
        assert_eq!(log2_ceil(1), 0);
        assert_eq!(log2_ceil(2), 1);
        assert_eq!(log2_ceil(3), 2);
        assert_eq!(log2_ceil(4), 2);
        assert_eq!(log2_ceil(5), 3);
        assert_eq!(log2_ceil(1 << 20), 20);
        assert_eq!(log2_ceil((1 << 20) + 1), 21);
    }

    #[test]
    fn test_heap_arithmetic() {
        // Walk the first few levels explicitly.
        assert!(heap_is_root(0));
        assert!(!heap_is_root(1));
        assert_eq!(heap_left_child(0), 1);
        assert_eq!(heap_right_sibling(1), 2);
        assert_eq!(heap_parent(1), 0);
        assert_eq!(heap_parent(2), 0);
        assert_eq!(heap_parent(9), 4);
        assert_eq!(heap_parent(10), 4);
        assert!(heap_is_left_child(9));
        assert!(!heap_is_left_child(10));

        assert_eq!(heap_level_start(0), 0);
        assert_eq!(heap_level_start(1), 1);
        assert_eq!(heap_level_start(2), 3);
        assert_eq!(heap_level_start(3), 7);
    }

    #[test]
    fn test_heap_parent_child_round_trip() {
        for i in 0..1000 {
            let l = heap_left_child(i);
            assert_eq!(heap_parent(l), i);
            assert_eq!(heap_parent(heap_right_sibling(l)), i);
            assert!(heap_is_left_child(l));
            assert!(!heap_is_left_child(heap_right_sibling(l)));
        }
    }
}

use once_cell::sync::Lazy;

/// Largest running excess the byte-granular tables are indexed by.
pub const MAX_TABLE_EXCESS: i32 = 16;

/// Sentinel stored in `near_fwd_pos` when no position within the byte
/// takes the running excess to zero.
pub const NO_POS: u8 = 8;

/// Byte-granular tables backing the forward-search fast path. Built once
/// per process, immutable afterwards.
pub struct LookupTables {
    /// Excess contribution of each byte value: `#ones - #zeros` over its
    /// 8 bits.
    pub word_sum: [i8; 256],
    /// Indexed by `(e << 8) | b` for `e` in `0..=MAX_TABLE_EXCESS`: the
    /// first bit position of `b` (LSB first) at which a running excess
    /// started at `e` and updated `+1` per 1-bit, `-1` per 0-bit reaches
    /// zero, or `NO_POS` if it never does.
    pub near_fwd_pos: [u8; (MAX_TABLE_EXCESS as usize + 1) * 256],
}

impl LookupTables {
    fn build() -> Self {
        let mut word_sum = [0i8; 256];
        for b in 0..256usize {
            word_sum[b] = 2 * b.count_ones() as i8 - 8;
        }

        let mut near_fwd_pos = [NO_POS; (MAX_TABLE_EXCESS as usize + 1) * 256];
        for e in 0..=MAX_TABLE_EXCESS {
            for b in 0..256usize {
                let mut excess = e;
                for x in 0..8 {
                    excess += if b >> x & 1 == 1 { 1 } else { -1 };
                    if excess == 0 {
                        near_fwd_pos[(e as usize) << 8 | b] = x;
                        break;
                    }
                }
            }
        }

        Self {
            word_sum,
            near_fwd_pos,
        }
    }
}

static TABLES: Lazy<LookupTables> = Lazy::new(LookupTables::build);

/// The process-wide tables, built on first use.
pub fn tables() -> &'static LookupTables {
    &TABLES
}

//! Rolling checksum over a 64-byte window.
//!
//! The checksum follows the bup/librsync family: two running sums updated
//! in O(1) per byte as the window slides. A boundary is signalled whenever
//! the low `blob_bits` bits of the second sum are all set, which happens on
//! average once every `2^blob_bits` bytes.

/// Number of bytes in the sliding window
pub const WINDOW_SIZE: usize = 64;

/// Added to every byte so an all-zero window still has a non-zero sum
pub const CHAR_OFFSET: u32 = 31;

/// Default boundary width: one candidate cut every ~8 KiB
pub const DEFAULT_BLOB_BITS: u32 = 13;

#[derive(Clone)]
pub struct RollSum {
    s1: u32,
    s2: u32,
    window: [u8; WINDOW_SIZE],
    wofs: usize,
    mask: u32,
}

impl RollSum {
    pub fn new() -> Self {
        Self::with_blob_bits(DEFAULT_BLOB_BITS)
    }

    /// `blob_bits` must be in `1..=31`; callers validate through
    /// [`ChunkerConfig::validate`](crate::config::ChunkerConfig::validate).
    pub fn with_blob_bits(blob_bits: u32) -> Self {
        debug_assert!((1..=31).contains(&blob_bits));
        let window = WINDOW_SIZE as u32;
        Self {
            s1: window * CHAR_OFFSET,
            s2: window * (window - 1) * CHAR_OFFSET,
            window: [0; WINDOW_SIZE],
            wofs: 0,
            mask: (1u32 << blob_bits) - 1,
        }
    }

    /// Slide one byte into the window. Returns true on a boundary.
    #[inline]
    pub fn roll(&mut self, add: u8) -> bool {
        let drop = self.window[self.wofs] as u32;
        self.s1 = self.s1.wrapping_add(add as u32).wrapping_sub(drop);
        self.s2 = self
            .s2
            .wrapping_add(self.s1)
            .wrapping_sub((WINDOW_SIZE as u32).wrapping_mul(drop + CHAR_OFFSET));
        self.window[self.wofs] = add;
        self.wofs = (self.wofs + 1) % WINDOW_SIZE;
        self.on_split()
    }

    /// Whether the current window sits on a boundary
    #[inline]
    pub fn on_split(&self) -> bool {
        self.s2 & self.mask == self.mask
    }

    /// Current 32-bit digest of the window
    pub fn digest(&self) -> u32 {
        (self.s1 << 16) | (self.s2 & 0xffff)
    }
}

impl Default for RollSum {
    fn default() -> Self {
        Self::new()
    }
}

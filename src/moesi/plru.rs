//! Tree pseudo-LRU over the 8 ways of every line index.
//!
//! Each line index owns a 7-bit code describing a three level binary tree:
//!
//! ```text
//!                    bit 6
//!             /                \
//!          bit 5              bit 4
//!         /     \            /     \
//!      bit 3   bit 2      bit 1   bit 0
//!      /  \    /  \       /  \    /  \
//!     0    1  2    3     4    5  6    7
//! ```
//!
//! A set bit sends the victim walk to the right child, a cleared bit to the
//! left one. Touching a way flips every bit on its path to point away from it.

use super::common::{CACHE_LINES, CACHE_SETS};

const LEVELS: usize = 3;
const ROOT_BIT: usize = 6;

#[derive(Clone, Debug)]
pub struct ReplacementIndex {
    codes: [u8; CACHE_LINES],
}

impl Default for ReplacementIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplacementIndex {
    pub fn new() -> Self {
        Self { codes: [0; CACHE_LINES] }
    }

    /// make `way` the most recently used way of `line_index`
    pub fn touch(&mut self, line_index: usize, way: usize) {
        assert!(way < CACHE_SETS, "way {} out of range", way);
        let code = &mut self.codes[line_index];
        let mut node = 0;
        for level in 0..LEVELS {
            let go_right = (way >> (LEVELS - 1 - level)) & 1 == 1;
            let bit = 1u8 << (ROOT_BIT - node);
            // point away from the touched subtree
            if go_right { *code &= !bit; } else { *code |= bit; }
            node = 2 * node + 1 + go_right as usize;
        }
    }

    /// the way the tree currently points at
    pub fn victim(&self, line_index: usize) -> usize {
        let code = self.codes[line_index];
        let mut node = 0;
        let mut way = 0;
        for _ in 0..LEVELS {
            let right = (code >> (ROOT_BIT - node)) & 1;
            way = (way << 1) | right as usize;
            node = 2 * node + 1 + right as usize;
        }
        way
    }

    /// raw code of `line_index`, only the low 7 bits are used
    pub fn code(&self, line_index: usize) -> u8 {
        self.codes[line_index]
    }
}

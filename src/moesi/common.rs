/// number of ways per line index
pub const CACHE_SETS: usize = 8;
/// number of line indices (rows) per way
pub const CACHE_LINES: usize = 128;
/// words per cache line
pub const LINE_WORDS: usize = 8;

pub type CacheId = usize;
pub type Word = i32;
pub type LineData = [Word; LINE_WORDS];

#[derive(Clone, Copy, Debug)]
pub struct SystemSpec {         // unit         reasonable defaults
    pub num_caches: usize,      // caches       4
    pub mem_beat_lat: u64,      // cycles       100
}

impl Default for SystemSpec {
    fn default() -> Self {
        SystemSpec {
            num_caches: 4,
            mem_beat_lat: 100,
        }
    }
}

pub mod timing {
    use super::{SystemSpec, LINE_WORDS};
    /// one word per beat, a full line per fill
    pub fn mem_fetch(spec: &SystemSpec) -> u64 {
        spec.mem_beat_lat * LINE_WORDS as u64
    }
    pub fn write_back(spec: &SystemSpec) -> u64 {
        spec.mem_beat_lat * LINE_WORDS as u64
    }
}

/// Position of an address inside the cache geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decoded {
    pub tag: u32,
    pub line_index: usize,
    pub word_index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(pub u32);

impl Addr {
    const WORD_MASK: u32 = 0x0000_001C;
    const INDEX_MASK: u32 = 0x0000_0FE0;
    const WORD_SHIFT: u32 = 2;
    const INDEX_SHIFT: u32 = 5;
    const TAG_SHIFT: u32 = 12;

    /// get tag, line index and word index of this address
    pub fn decode(&self) -> Decoded {
        Decoded {
            tag: self.0 >> Self::TAG_SHIFT,
            line_index: ((self.0 & Self::INDEX_MASK) >> Self::INDEX_SHIFT) as usize,
            word_index: ((self.0 & Self::WORD_MASK) >> Self::WORD_SHIFT) as usize,
        }
    }
    pub fn from_parts(tag: u32, line_index: usize, word_index: usize) -> Addr {
        assert!(line_index < CACHE_LINES, "line index {} out of range", line_index);
        assert!(word_index < LINE_WORDS, "word index {} out of range", word_index);
        Addr((tag << Self::TAG_SHIFT)
            | ((line_index as u32) << Self::INDEX_SHIFT)
            | ((word_index as u32) << Self::WORD_SHIFT))
    }
    /// address of the first word of the line holding this address
    pub fn line_base(&self) -> Addr {
        Addr(self.0 & !(Self::WORD_MASK | 0b11))
    }
}

impl std::fmt::Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instr {
    Read(Addr),
    Write(Addr, Word),
    /// one cycle of non-memory work
    Nop,
    /// non-memory work taking the given number of cycles
    Other(u32),
}

pub type Program = Vec<Instr>;

// MESSAGE TYPES

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcRequest {
    Read(Addr),
    Write(Addr, Word),
}

impl ProcRequest {
    pub fn addr(&self) -> Addr {
        match self {
            ProcRequest::Read(addr) | ProcRequest::Write(addr, _) => *addr,
        }
    }
}

/// completion of a processor request; `word` is set for reads
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheResponse {
    pub hit: bool,
    pub word: Option<Word>,
}

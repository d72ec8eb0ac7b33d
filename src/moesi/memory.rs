use std::collections::HashMap;

use super::common::*;

/// Backing memory, always available. Lines never written read as zeros.
#[derive(Default, Debug)]
pub struct Memory {
    lines: HashMap<Addr, LineData>,
    pub line_reads: u64,
    pub line_writes: u64,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn read_line(&mut self, addr: Addr) -> LineData {
        self.line_reads += 1;
        self.peek_line(addr)
    }
    pub fn write_line(&mut self, addr: Addr, words: LineData) {
        self.line_writes += 1;
        self.lines.insert(addr.line_base(), words);
    }
    /// read without counting an access
    pub fn peek_line(&self, addr: Addr) -> LineData {
        self.lines.get(&addr.line_base()).copied().unwrap_or([0; LINE_WORDS])
    }
    /// preload a single word, e.g. to seed a test
    pub fn poke(&mut self, addr: Addr, word: Word) {
        let line = self.lines.entry(addr.line_base()).or_insert([0; LINE_WORDS]);
        line[addr.decode().word_index] = word;
    }
}

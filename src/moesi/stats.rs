use std::fmt;

use super::bus::BusCounters;
use super::common::CacheId;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
    pub read_hits: u64,
    pub read_misses: u64,
    pub write_hits: u64,
    pub write_misses: u64,
    /// snooped BusRd
    pub probe_reads: u64,
    /// snooped BusRdX / BusUpgr
    pub probe_writes: u64,
    pub write_backs: u64,
    /// misses served by another cache's flush instead of memory
    pub flushes_received: u64,
}

impl CacheStats {
    pub fn reads(&self) -> u64 { self.read_hits + self.read_misses }
    pub fn writes(&self) -> u64 { self.write_hits + self.write_misses }
    pub fn hit_rate(&self) -> f64 {
        let total = self.reads() + self.writes();
        if total == 0 { return 0.0; }
        (self.read_hits + self.write_hits) as f64 / total as f64 * 100.0
    }
}

/// Counters owned by the environment, handed to the caches by `&mut`.
#[derive(Clone, Debug)]
pub struct Stats {
    caches: Vec<CacheStats>,
}

impl Stats {
    pub fn new(num_caches: usize) -> Self {
        Self { caches: vec![CacheStats::default(); num_caches] }
    }
    pub fn record_read_hit(&mut self, id: CacheId) { self.caches[id].read_hits += 1; }
    pub fn record_read_miss(&mut self, id: CacheId) { self.caches[id].read_misses += 1; }
    pub fn record_write_hit(&mut self, id: CacheId) { self.caches[id].write_hits += 1; }
    pub fn record_write_miss(&mut self, id: CacheId) { self.caches[id].write_misses += 1; }
    pub fn record_probe_read(&mut self, id: CacheId) { self.caches[id].probe_reads += 1; }
    pub fn record_probe_write(&mut self, id: CacheId) { self.caches[id].probe_writes += 1; }
    pub fn record_write_back(&mut self, id: CacheId) { self.caches[id].write_backs += 1; }
    pub fn record_flush_received(&mut self, id: CacheId) { self.caches[id].flushes_received += 1; }

    pub fn cache(&self, id: CacheId) -> &CacheStats {
        &self.caches[id]
    }
    pub fn caches(&self) -> &[CacheStats] {
        &self.caches
    }
}

/// Everything printed at the end of a run.
#[derive(Clone, Debug)]
pub struct Report {
    pub cycles: u64,
    pub stats: Stats,
    pub bus: BusCounters,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CPU\tReads\tRHit\tRMiss\tWrites\tWHit\tWMiss\tHitrate")?;
        for (i, s) in self.stats.caches().iter().enumerate() {
            writeln!(f, "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.2}",
                i, s.reads(), s.read_hits, s.read_misses,
                s.writes(), s.write_hits, s.write_misses, s.hit_rate())?;
        }
        writeln!(f)?;
        writeln!(f, "CPU\tProbeReads\tProbeWrites\tWriteBacks\tFlushesRecv")?;
        for (i, s) in self.stats.caches().iter().enumerate() {
            writeln!(f, "{}\t{}\t{}\t{}\t{}",
                i, s.probe_reads, s.probe_writes, s.write_backs, s.flushes_received)?;
        }
        writeln!(f)?;
        let b = &self.bus;
        writeln!(f, "waits\treads\twrites\tupgrades\tflushes\twait_per_access")?;
        writeln!(f, "{}\t{}\t{}\t{}\t{}\t{:.4}",
            b.waits, b.reads, b.writes, b.upgrades, b.flushes, b.wait_per_access())?;
        write!(f, "finished simulation in {} cycles", self.cycles)
    }
}

use std::collections::BTreeMap;

use super::bus::{Bus, Snooper};
use super::cache::Cache;
use super::common::*;
use super::error::{CacheError, CoherenceError};
use super::memory::Memory;
use super::protocol::CoherenceState;
use super::stats::{Report, Stats};

/// Caches, bus and memory of one multiprocessor, advanced one clock cycle at a
/// time.
///
/// Caches and bus are plain structs, not separate simulation models. Within a
/// cycle the order matters: a pending flush must reach the bus before any new
/// request, and every snooper must see a transaction in the cycle it is
/// broadcast. `tick` runs these phases in a fixed order instead of relying on
/// mailbox delivery order. Latencies are countdowns in the cache's request
/// state rather than scheduled events.
pub struct System {
    specs: SystemSpec,
    caches: Vec<Cache>,
    bus: Bus,
    memory: Memory,
    stats: Stats,
    cycle: u64,
}

impl System {
    pub fn new(specs: SystemSpec) -> Self {
        info!("system with {} caches, {} cycles per memory beat", specs.num_caches, specs.mem_beat_lat);
        System {
            specs,
            caches: (0..specs.num_caches).map(|i| Cache::new(i, specs)).collect(),
            bus: Bus::new(),
            memory: Memory::new(),
            stats: Stats::new(specs.num_caches),
            cycle: 0,
        }
    }

    fn check_id(&self, id: CacheId) -> Result<(), CacheError> {
        if id < self.caches.len() {
            Ok(())
        } else {
            Err(CacheError::UnknownCache { id, num_caches: self.caches.len() })
        }
    }

    pub fn submit(&mut self, id: CacheId, req: ProcRequest) -> Result<(), CacheError> {
        self.check_id(id)?;
        self.caches[id].submit(req)
    }

    pub fn take_response(&mut self, id: CacheId) -> Result<Option<CacheResponse>, CacheError> {
        self.check_id(id)?;
        Ok(self.caches[id].take_response())
    }

    /// Submit a request and tick until it completes.
    pub fn access(&mut self, id: CacheId, req: ProcRequest) -> Result<CacheResponse, CacheError> {
        self.submit(id, req)?;
        loop {
            self.tick();
            if let Some(resp) = self.caches[id].take_response() {
                return Ok(resp);
            }
        }
    }

    /// Run one clock cycle.
    pub fn tick(&mut self) {
        let System { caches, bus, memory, stats, cycle, .. } = self;

        // snoop phase: flushes go first
        for id in 0..caches.len() {
            let Some(flush) = caches[id].take_flush() else { continue };
            if bus.try_acquire(id) {
                bus.broadcast(flush, caches.iter_mut(), stats);
            } else {
                caches[id].requeue_flush(flush);
            }
        }

        // local phase
        for cache in caches.iter_mut() {
            cache.on_tick(memory, stats);
        }

        // request phase, lowest id wins
        for id in 0..caches.len() {
            if caches[id].bus_request().is_none() { continue; }
            if !bus.try_acquire(id) { continue; }
            let Some(sig) = caches[id].on_bus_locked() else { continue };
            let reply = bus.broadcast(sig, caches.iter_mut(), stats);
            caches[id].on_bus_done(reply, memory);
        }

        // falling edge
        bus.on_post_tick();
        *cycle += 1;
    }

    /// No line may have two of {M, O, E}, and an M or E line must be the only
    /// valid copy.
    pub fn check_coherence(&self) -> Result<(), CoherenceError> {
        for line_index in 0..CACHE_LINES {
            let mut holders: BTreeMap<u32, Vec<(CacheId, CoherenceState)>> = BTreeMap::new();
            for cache in &self.caches {
                for (_, line) in cache.lines_at(line_index).filter(|(_, l)| l.state.is_valid()) {
                    holders.entry(line.tag).or_default().push((cache.id(), line.state));
                }
            }
            for (tag, holders) in holders {
                let addr = Addr::from_parts(tag, line_index, 0);
                let owners = holders.iter()
                    .filter(|(_, s)| s.is_dirty() || *s == CoherenceState::Exclusive)
                    .copied()
                    .collect::<Vec<_>>();
                if owners.len() > 1 {
                    return Err(CoherenceError::MultipleOwners { addr, holders });
                }
                if let Some(&(owner, state)) = owners.first() {
                    if state != CoherenceState::Owned && holders.len() > 1 {
                        return Err(CoherenceError::NotExclusive { addr, owner, holders });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn report(&self) -> Report {
        Report {
            cycles: self.cycle,
            stats: self.stats.clone(),
            bus: *self.bus.counters(),
        }
    }

    /// true if no request is in flight and no flush is pending
    pub fn is_quiet(&self) -> bool {
        self.caches.iter().all(|c| c.is_idle() && !c.flush_pending())
    }

    pub fn specs(&self) -> &SystemSpec {
        &self.specs
    }
    pub fn cycle(&self) -> u64 {
        self.cycle
    }
    pub fn cache(&self, id: CacheId) -> &Cache {
        &self.caches[id]
    }
    pub fn num_caches(&self) -> usize {
        self.caches.len()
    }
    pub fn bus(&self) -> &Bus {
        &self.bus
    }
    pub fn stats(&self) -> &Stats {
        &self.stats
    }
    pub fn memory(&self) -> &Memory {
        &self.memory
    }
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }
}

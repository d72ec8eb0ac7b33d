use std::ops::BitOrAssign;

use super::common::*;
use super::stats::Stats;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusOp {
    Read,
    ReadExclusive,
    Upgrade,
    Flush,
}

/// the fields a transaction publishes on the bus for one cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub op: BusOp,
    pub addr: Addr,
    pub requester: CacheId,
    /// only set for flushes
    pub receiver: Option<CacheId>,
    pub data: Option<LineData>,
}

impl Transaction {
    pub fn read(requester: CacheId, addr: Addr) -> Self {
        Self { op: BusOp::Read, addr, requester, receiver: None, data: None }
    }
    pub fn read_exclusive(requester: CacheId, addr: Addr) -> Self {
        Self { op: BusOp::ReadExclusive, addr, requester, receiver: None, data: None }
    }
    pub fn upgrade(requester: CacheId, addr: Addr) -> Self {
        Self { op: BusOp::Upgrade, addr, requester, receiver: None, data: None }
    }
    pub fn flush(requester: CacheId, receiver: CacheId, addr: Addr, data: LineData) -> Self {
        Self { op: BusOp::Flush, addr, requester, receiver: Some(receiver), data: Some(data) }
    }
}

/// Wired-OR lines every snooper drives during the broadcast cycle.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnoopReply {
    /// some other cache holds a valid copy
    pub shared: bool,
    /// some other cache queued a flush to the requester
    pub supplying: bool,
}

impl BitOrAssign for SnoopReply {
    fn bitor_assign(&mut self, rhs: Self) {
        self.shared |= rhs.shared;
        self.supplying |= rhs.supplying;
    }
}

/// The interface of a cache as seen by the bus.
pub trait Snooper {
    fn id(&self) -> CacheId;
    fn on_bus_sig(&mut self, sig: &Transaction, stats: &mut Stats) -> SnoopReply;
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusCounters {
    pub waits: u64,
    pub reads: u64,
    /// BusRdX
    pub writes: u64,
    pub upgrades: u64,
    pub flushes: u64,
}

impl BusCounters {
    pub fn wait_per_access(&self) -> f64 {
        let accesses = self.reads + self.writes + self.upgrades;
        if accesses == 0 { return 0.0; }
        self.waits as f64 / accesses as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusState {
    Unlocked,
    Locked(CacheId),
    FreeNext,
}

/// Shared snooping bus. One transaction per cycle: the winner of the
/// arbitration publishes its fields, every other cache snoops them in the same
/// cycle, and the bus is released on the falling clock edge.
#[derive(Debug)]
pub struct Bus {
    state: BusState,
    signal: Option<Transaction>,
    counters: BusCounters,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Bus {
            state: BusState::Unlocked,
            signal: None,
            counters: BusCounters::default(),
        }
    }

    /// Take the bus lock for this cycle. A loser counts a wait and is expected
    /// to retry on the next cycle; there is no queue.
    pub fn try_acquire(&mut self, id: CacheId) -> bool {
        match self.state {
            BusState::Unlocked => {
                self.state = BusState::Locked(id);
                true
            },
            _ => {
                self.counters.waits += 1;
                trace!("cache {} waits for the bus ({:?})", id, self.state);
                false
            },
        }
    }

    /// Publish `sig` and let every snooper except the requester observe it.
    /// The caller must hold the lock.
    pub fn broadcast<'a, S, I>(&mut self, sig: Transaction, snoopers: I, stats: &mut Stats) -> SnoopReply
    where
        S: Snooper + 'a,
        I: IntoIterator<Item = &'a mut S>,
    {
        debug_assert_eq!(self.state, BusState::Locked(sig.requester), "broadcast without holding the bus");
        match sig.op {
            BusOp::Read => self.counters.reads += 1,
            BusOp::ReadExclusive => self.counters.writes += 1,
            BusOp::Upgrade => self.counters.upgrades += 1,
            BusOp::Flush => self.counters.flushes += 1,
        }
        debug!("bus: {:?} {} from cache {}", sig.op, sig.addr, sig.requester);

        let mut reply = SnoopReply::default();
        for snooper in snoopers.into_iter().filter(|s| s.id() != sig.requester) {
            reply |= snooper.on_bus_sig(&sig, stats);
        }
        self.signal = Some(sig);
        self.state = BusState::FreeNext;
        reply
    }

    /// falling clock edge
    pub fn on_post_tick(&mut self) {
        match self.state {
            BusState::FreeNext => {
                self.signal = None;
                self.state = BusState::Unlocked;
            },
            BusState::Locked(id) => {
                // acquired but nothing published; hand the bus back
                warn!("cache {} held the bus without publishing", id);
                self.state = BusState::Unlocked;
            },
            BusState::Unlocked => (),
        }
    }

    pub fn state(&self) -> BusState {
        self.state
    }
    /// fields on the bus this cycle, `None` when idle
    pub fn signal(&self) -> Option<&Transaction> {
        self.signal.as_ref()
    }
    pub fn counters(&self) -> &BusCounters {
        &self.counters
    }
}

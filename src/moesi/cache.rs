use std::mem;

use super::bus::{BusOp, SnoopReply, Snooper, Transaction};
use super::common::*;
use super::error::CacheError;
use super::memory::Memory;
use super::plru::ReplacementIndex;
use super::protocol::*;
use super::stats::Stats;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheLine {
    pub state: CoherenceState,
    pub tag: u32,
    pub words: LineData,
}

/// line data handed over by a flush addressed to this cache
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FlushDelivery {
    addr: Addr,
    words: LineData,
}

// request activity

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RequestState {
    Idle,
    Received(ProcRequest),
    /// dirty victim going back to memory before the way is reused
    WritingBack { req: ProcRequest, way: usize, remaining: u64 },
    WaitingForBus { req: ProcRequest, way: usize, op: BusOp },
    /// transaction is out; another cache announced a flush
    AwaitingFlush { req: ProcRequest, way: usize },
    /// response is known, latency still running
    Stalled { resp: CacheResponse, remaining: u64 },
    Done(CacheResponse),
}

pub struct Cache {
    id: CacheId,
    specs: SystemSpec,
    lines: Vec<CacheLine>,          // way-major: way * CACHE_LINES + line_index
    plru: ReplacementIndex,
    state: RequestState,
    hit: bool,                      // outcome of the lookup of the request in flight
    outbox: Option<Transaction>,    // flush queued by the snoop activity
    delivery: Option<FlushDelivery>,
}

impl Cache {
    pub fn new(id: CacheId, specs: SystemSpec) -> Self {
        Self {
            id,
            specs,
            lines: vec![CacheLine::default(); CACHE_SETS * CACHE_LINES],
            plru: ReplacementIndex::new(),
            state: RequestState::Idle,
            hit: false,
            outbox: None,
            delivery: None,
        }
    }

    // helper functions

    fn slot(way: usize, line_index: usize) -> usize {
        assert!(way < CACHE_SETS && line_index < CACHE_LINES, "way {} / line {} out of range", way, line_index);
        way * CACHE_LINES + line_index
    }
    fn line(&self, way: usize, line_index: usize) -> &CacheLine {
        &self.lines[Self::slot(way, line_index)]
    }
    fn line_mut(&mut self, way: usize, line_index: usize) -> &mut CacheLine {
        &mut self.lines[Self::slot(way, line_index)]
    }
    /// way holding a valid copy of `addr`
    fn find(&self, addr: Addr) -> Option<usize> {
        let d = addr.decode();
        (0..CACHE_SETS).find(|&way| {
            let line = self.line(way, d.line_index);
            line.state.is_valid() && line.tag == d.tag
        })
    }
    fn first_free(&self, line_index: usize) -> Option<usize> {
        (0..CACHE_SETS).find(|&way| !self.line(way, line_index).state.is_valid())
    }
    fn access(line: &mut CacheLine, req: ProcRequest) -> Option<Word> {
        let word_index = req.addr().decode().word_index;
        match req {
            ProcRequest::Read(_) => Some(line.words[word_index]),
            ProcRequest::Write(_, word) => {
                line.words[word_index] = word;
                None
            },
        }
    }
    fn trigger(req: &ProcRequest) -> Trigger {
        match req {
            ProcRequest::Read(_) => Trigger::ProcessorRead,
            ProcRequest::Write(..) => Trigger::ProcessorWrite,
        }
    }
    /// BusRd or BusRdX, as the table has it for an Invalid line
    fn miss_op(req: &ProcRequest) -> BusOp {
        match transition(CoherenceState::Invalid, Self::trigger(req)).bus {
            BusAction::BusRd => BusOp::Read,
            _ => BusOp::ReadExclusive,
        }
    }
    fn respond(&self, word: Option<Word>, latency: u64) -> RequestState {
        let resp = CacheResponse { hit: self.hit, word };
        if latency > 0 {
            RequestState::Stalled { resp, remaining: latency }
        } else {
            RequestState::Done(resp)
        }
    }

    // public accessors

    pub fn state_of(&self, addr: Addr) -> CoherenceState {
        self.find(addr)
            .map(|way| self.line(way, addr.decode().line_index).state)
            .unwrap_or(CoherenceState::Invalid)
    }
    /// the cached word, `None` if the line is not valid here
    pub fn peek(&self, addr: Addr) -> Option<Word> {
        let d = addr.decode();
        self.find(addr).map(|way| self.line(way, d.line_index).words[d.word_index])
    }
    /// `(way, line)` pairs stored at `line_index`
    pub fn lines_at(&self, line_index: usize) -> impl Iterator<Item = (usize, &CacheLine)> + '_ {
        (0..CACHE_SETS).map(move |way| (way, self.line(way, line_index)))
    }
    pub fn replacement(&self) -> &ReplacementIndex {
        &self.plru
    }
    pub fn is_idle(&self) -> bool {
        self.state == RequestState::Idle
    }
    pub fn flush_pending(&self) -> bool {
        self.outbox.is_some()
    }

    // processor side

    /// Hand a processor request to the cache. It is looked up on the next
    /// rising clock edge. Only one request may be in flight.
    pub fn submit(&mut self, req: ProcRequest) -> Result<(), CacheError> {
        match self.state {
            RequestState::Idle => {
                debug!("cache {} received {:?}", self.id, req);
                self.state = RequestState::Received(req);
                Ok(())
            },
            _ => Err(CacheError::Busy { id: self.id }),
        }
    }
    /// completion signal; yields the response once
    pub fn take_response(&mut self) -> Option<CacheResponse> {
        match self.state {
            RequestState::Done(resp) => {
                self.state = RequestState::Idle;
                Some(resp)
            },
            _ => None,
        }
    }

    /// Advance the request activity by one cycle. Never touches the bus; a
    /// request that needs it shows up in `bus_request` afterwards.
    pub fn on_tick(&mut self, memory: &mut Memory, stats: &mut Stats) {
        self.state = match mem::replace(&mut self.state, RequestState::Idle) {
            RequestState::Received(req) => self.lookup(req, memory, stats),
            RequestState::WritingBack { req, way, remaining } => {
                if remaining > 1 {
                    RequestState::WritingBack { req, way, remaining: remaining - 1 }
                } else {
                    RequestState::WaitingForBus { req, way, op: Self::miss_op(&req) }
                }
            },
            RequestState::AwaitingFlush { req, way } => self.take_delivery(req, way, stats),
            RequestState::Stalled { resp, remaining } => {
                if remaining > 1 {
                    RequestState::Stalled { resp, remaining: remaining - 1 }
                } else {
                    RequestState::Done(resp)
                }
            },
            other => other,
        };
    }

    fn lookup(&mut self, req: ProcRequest, memory: &mut Memory, stats: &mut Stats) -> RequestState {
        let addr = req.addr();
        let d = addr.decode();
        let is_read = matches!(req, ProcRequest::Read(_));

        if let Some(way) = self.find(addr) {
            self.hit = true;
            if is_read { stats.record_read_hit(self.id) } else { stats.record_write_hit(self.id) }
            self.plru.touch(d.line_index, way);

            let id = self.id;
            let line = self.line_mut(way, d.line_index);
            let t = transition(line.state, Self::trigger(&req));
            let word = match (t.bus, t.data) {
                // the access happens once the upgrade is on the bus
                (BusAction::BusUpgr, DataAction::Access) => {
                    trace!("cache {} write hit on {:?} {}, upgrading", id, line.state, addr);
                    return RequestState::WaitingForBus { req, way, op: BusOp::Upgrade };
                },
                (BusAction::None, DataAction::Access) => {
                    line.state = t.next.resolve(line.state, false);
                    Self::access(line, req)
                },
                (bus, data) => {
                    error!("cache {}: hit produced {:?} / {:?}", id, bus, data);
                    debug_assert!(false, "hit produced {:?} / {:?}", bus, data);
                    None
                },
            };
            trace!("cache {} hit {} -> {:?}", id, addr, line.state);
            return self.respond(word, 0);
        }

        self.hit = false;
        if is_read { stats.record_read_miss(self.id) } else { stats.record_write_miss(self.id) }

        let (way, write_back) = match self.first_free(d.line_index) {
            Some(way) => (way, false),
            None => {
                let way = self.plru.victim(d.line_index);
                let victim = *self.line(way, d.line_index);
                debug!("cache {} evicts way {} tag {:#x} ({:?}) at line {}",
                    self.id, way, victim.tag, victim.state, d.line_index);
                if victim.state.is_dirty() {
                    memory.write_line(Addr::from_parts(victim.tag, d.line_index, 0), victim.words);
                    stats.record_write_back(self.id);
                }
                self.line_mut(way, d.line_index).state = CoherenceState::Invalid;
                (way, victim.state.is_dirty())
            },
        };

        if write_back {
            return RequestState::WritingBack { req, way, remaining: timing::write_back(&self.specs) };
        }
        RequestState::WaitingForBus { req, way, op: Self::miss_op(&req) }
    }

    /// the bus operation this cache is waiting to issue, if any
    pub fn bus_request(&self) -> Option<BusOp> {
        match self.state {
            RequestState::WaitingForBus { op, .. } => Some(op),
            _ => None,
        }
    }

    /// The bus was granted to the request activity; build the transaction.
    /// An upgrade whose line was invalidated while waiting turns into a read
    /// exclusive.
    pub fn on_bus_locked(&mut self) -> Option<Transaction> {
        let (req, way, op) = match self.state {
            RequestState::WaitingForBus { req, way, op } => (req, way, op),
            _ => {
                error!("cache {} granted the bus while not waiting for it", self.id);
                return None;
            },
        };
        let addr = req.addr();
        let op = match op {
            BusOp::Upgrade if !self.line(way, addr.decode().line_index).state.is_valid() => {
                debug!("cache {} lost {} while waiting to upgrade", self.id, addr);
                self.state = RequestState::WaitingForBus { req, way, op: BusOp::ReadExclusive };
                BusOp::ReadExclusive
            },
            op => op,
        };
        Some(match op {
            BusOp::Read => Transaction::read(self.id, addr),
            BusOp::ReadExclusive => Transaction::read_exclusive(self.id, addr),
            BusOp::Upgrade => Transaction::upgrade(self.id, addr),
            BusOp::Flush => {
                error!("cache {}: flushes are issued by the snoop activity", self.id);
                return None;
            },
        })
    }

    /// All other caches have seen our transaction in this cycle.
    pub fn on_bus_done(&mut self, reply: SnoopReply, memory: &mut Memory) {
        let (req, way, op) = match self.state {
            RequestState::WaitingForBus { req, way, op } => (req, way, op),
            _ => return,
        };
        let d = req.addr().decode();

        if op == BusOp::Upgrade {
            let line = self.line_mut(way, d.line_index);
            let t = transition(line.state, Self::trigger(&req));
            line.state = t.next.resolve(line.state, false);
            let word = match t.data {
                DataAction::Access => Self::access(line, req),
                _ => None,
            };
            // the write is visible once the upgrade has gone round the bus
            self.state = self.respond(word, 1);
            return;
        }

        // the line takes its place in the coherence order now
        let t = transition(CoherenceState::Invalid, Self::trigger(&req));
        let state = t.next.resolve(CoherenceState::Invalid, reply.shared || reply.supplying);
        let line = self.line_mut(way, d.line_index);
        line.tag = d.tag;
        line.state = state;
        trace!("cache {} allocates {} in way {} as {:?}", self.id, req.addr(), way, state);

        self.state = match t.data {
            DataAction::Fill if reply.supplying => RequestState::AwaitingFlush { req, way },
            DataAction::Fill => {
                let words = memory.read_line(req.addr());
                self.install(req, way, words, timing::mem_fetch(&self.specs))
            },
            other => {
                error!("cache {}: miss on {} produced {:?}", self.id, req.addr(), other);
                debug_assert!(false, "miss produced {:?}", other);
                self.respond(None, 0)
            },
        };
    }

    fn install(&mut self, req: ProcRequest, way: usize, words: LineData, latency: u64) -> RequestState {
        let d = req.addr().decode();
        self.plru.touch(d.line_index, way);
        let line = self.line_mut(way, d.line_index);
        line.words = words;
        let word = Self::access(line, req);
        self.respond(word, latency)
    }

    fn take_delivery(&mut self, req: ProcRequest, way: usize, stats: &mut Stats) -> RequestState {
        let addr = req.addr();
        match self.delivery.take() {
            Some(delivery) if delivery.addr == addr.line_base() => {
                stats.record_flush_received(self.id);
                debug!("cache {} filled {} from a flush", self.id, addr);
                self.install(req, way, delivery.words, 0)
            },
            Some(delivery) => {
                error!("cache {} got a flush for {} while waiting for {}", self.id, delivery.addr, addr);
                debug_assert!(false, "flush delivered for the wrong address");
                RequestState::AwaitingFlush { req, way }
            },
            None => RequestState::AwaitingFlush { req, way },
        }
    }

    // snoop side

    /// flush queued by the snoop activity, to be put on the bus
    pub fn take_flush(&mut self) -> Option<Transaction> {
        self.outbox.take()
    }
    /// put a flush back after losing the arbitration
    pub fn requeue_flush(&mut self, flush: Transaction) {
        self.outbox = Some(flush);
    }

    fn snoop(&mut self, sig: &Transaction, stats: &mut Stats) -> SnoopReply {
        let trigger = match sig.op {
            BusOp::Read => {
                stats.record_probe_read(self.id);
                Trigger::SnoopedBusRd
            },
            BusOp::ReadExclusive => {
                stats.record_probe_write(self.id);
                Trigger::SnoopedBusRdX
            },
            BusOp::Upgrade => {
                stats.record_probe_write(self.id);
                Trigger::SnoopedBusUpgr
            },
            BusOp::Flush => {
                if sig.receiver == Some(self.id) {
                    match sig.data {
                        Some(words) => self.delivery = Some(FlushDelivery { addr: sig.addr.line_base(), words }),
                        None => warn!("cache {}: flush from {} without data", self.id, sig.requester),
                    }
                }
                return SnoopReply::default();
            },
        };

        let d = sig.addr.decode();
        let Some(way) = self.find(sig.addr) else {
            return SnoopReply::default();
        };
        let CacheLine { state: before, words, .. } = *self.line(way, d.line_index);
        let t = transition(before, trigger);
        let mut reply = SnoopReply { shared: true, supplying: false };
        if t.data == DataAction::Supply {
            self.outbox = Some(Transaction::flush(self.id, sig.requester, sig.addr.line_base(), words));
            reply.supplying = true;
        }
        let after = t.next.resolve(before, false);
        self.line_mut(way, d.line_index).state = after;
        if !t.is_noop() {
            debug!("cache {} snooped {:?} {}: {:?} -> {:?}", self.id, sig.op, sig.addr, before, after);
        }
        reply
    }
}

impl Snooper for Cache {
    fn id(&self) -> CacheId {
        self.id
    }
    fn on_bus_sig(&mut self, sig: &Transaction, stats: &mut Stats) -> SnoopReply {
        if sig.requester == self.id {
            error!("cache {} snooped its own {:?}", self.id, sig.op);
            debug_assert!(false, "transaction echoed back to its requester");
            return SnoopReply::default();
        }
        self.snoop(sig, stats)
    }
}

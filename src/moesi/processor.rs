use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use asynchronix::model::{Model, Output};

use super::common::*;

#[derive(Default, Debug, PartialEq, Eq)]
pub enum ProcState {
    #[default]
    Idle,
    WaitingForCache,
    /// cycles of other work left, including the current one
    ExecutingOther(u32),
    ContinueNext,
    Done,
}

/// Walks a program, one instruction at a time, blocking on every memory access.
pub struct Processor {
    pub id: CacheId,
    pub state: ProcState,
    pub o_cache_req: Output<(CacheId, ProcRequest)>,
    program: VecDeque<Instr>,
    done: Arc<AtomicBool>,
}

impl Processor {
    pub fn new(id: CacheId, program: Program, done: Arc<AtomicBool>) -> Self {
        Processor {
            id,
            state: ProcState::Idle,
            o_cache_req: Output::new(),
            program: program.into(),
            done,
        }
    }
    async fn send_cache_req(&mut self, req: ProcRequest) {
        trace!("cpu {} issues {:?}", self.id, req);
        self.o_cache_req.send((self.id, req)).await;
        self.state = ProcState::WaitingForCache;
    }
    pub async fn on_tick(&mut self) {
        if self.state != ProcState::Idle { return; }
        match self.program.pop_front() {
            Some(Instr::Read(addr)) => self.send_cache_req(ProcRequest::Read(addr)).await,
            Some(Instr::Write(addr, word)) => self.send_cache_req(ProcRequest::Write(addr, word)).await,
            Some(Instr::Nop) => self.state = ProcState::ContinueNext,
            Some(Instr::Other(cycles)) => {
                trace!("cpu {} busy for {} cycles", self.id, cycles);
                self.state = ProcState::ExecutingOther(cycles.max(1));
            },
            None => {
                info!("cpu {} finished its program", self.id);
                self.done.store(true, Ordering::Relaxed);
                self.state = ProcState::Done;
            },
        }
    }
    pub async fn on_post_tick(&mut self) {
        match self.state {
            ProcState::ContinueNext | ProcState::ExecutingOther(1) => self.state = ProcState::Idle,
            ProcState::ExecutingOther(n) => self.state = ProcState::ExecutingOther(n - 1),
            _ => (),
        }
    }
    pub async fn on_cache_resp(&mut self, resp: CacheResponse) {
        match resp.word {
            Some(word) => debug!("cpu {} read {} ({})", self.id, word, if resp.hit { "hit" } else { "miss" }),
            None => debug!("cpu {} write done ({})", self.id, if resp.hit { "hit" } else { "miss" }),
        }
        self.state = ProcState::ContinueNext;
    }
}

impl Model for Processor {}

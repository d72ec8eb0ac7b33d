use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use asynchronix::model::{Model, Output};
use asynchronix::simulation::{Mailbox, SimInit};
use asynchronix::time::MonotonicTime;

use super::common::*;
use super::error::{CoherenceError, SimError};
use super::processor::Processor;
use super::stats::Report;
use super::system::System;

/// Caches, bus and memory as a single simulation model. Processor requests
/// come in through `on_proc_req`, completions leave through `o_proc_resp`.
pub struct MemorySystem {
    system: System,
    pub o_proc_resp: Vec<Output<CacheResponse>>,
    violation: Option<CoherenceError>,
}

impl MemorySystem {
    pub fn new(specs: SystemSpec) -> Self {
        MemorySystem {
            system: System::new(specs),
            o_proc_resp: (0..specs.num_caches).map(|_| Output::new()).collect(),
            violation: None,
        }
    }
    pub async fn on_proc_req(&mut self, (id, req): (CacheId, ProcRequest)) {
        if let Err(e) = self.system.submit(id, req) {
            error!("dropping request {:?}: {}", req, e);
        }
    }
    pub async fn on_tick(&mut self) {
        self.system.tick();
        if self.violation.is_none() {
            if let Err(e) = self.system.check_coherence() {
                error!("cycle {}: {}", self.system.cycle(), e);
                self.violation = Some(e);
            }
        }
        for id in 0..self.system.num_caches() {
            if let Ok(Some(resp)) = self.system.take_response(id) {
                self.o_proc_resp[id].send(resp).await;
            }
        }
    }
    pub async fn finish(&mut self) -> Result<Report, CoherenceError> {
        match self.violation.take() {
            Some(e) => Err(e),
            None => Ok(self.system.report()),
        }
    }
}

impl Model for MemorySystem {}

/// Run one program per processor to completion.
pub fn simulate(specs: SystemSpec, mut programs: Vec<Program>, max_cycles: u64) -> Result<Report, SimError> {
    if programs.len() != specs.num_caches {
        return Err(SimError::ProgramCount { programs: programs.len(), caches: specs.num_caches });
    }
    let n = specs.num_caches;

    let done = (0..n).map(|_| Arc::new(AtomicBool::new(false))).collect::<Vec<_>>();

    // create models
    let mut procs = (0..n).map(|i| {
        Processor::new(i, programs.remove(0), done[i].clone())
    }).collect::<Vec<_>>();
    let mut mem = MemorySystem::new(specs);

    // create mailboxes
    let mut procs_mbox = (0..n).map(|_| Mailbox::<Processor>::new()).collect::<Vec<_>>();
    let mem_mbox = Mailbox::<MemorySystem>::new();

    // addresses
    let tick_addr_procs = procs_mbox.iter().map(|mb| mb.address()).collect::<Vec<_>>();
    let tick_addr_mem = mem_mbox.address();

    // connect models
    for i in 0..n {
        procs[i].o_cache_req.connect(MemorySystem::on_proc_req, &mem_mbox);
        mem.o_proc_resp[i].connect(Processor::on_cache_resp, &procs_mbox[i]);
    }

    // initialize simulation
    let mut simi = SimInit::new().add_model(mem, mem_mbox);
    for _ in 0..n {
        simi = simi.add_model(procs.remove(0), procs_mbox.remove(0));
    }
    let mut sim = simi.init(MonotonicTime::EPOCH);

    // run simulation
    let all_done = || done.iter().all(|d| d.load(Ordering::Relaxed));
    let mut cycles = 0;
    while !all_done() {
        if cycles == max_cycles {
            return Err(SimError::CycleLimit(max_cycles));
        }

        // tick
        for addr in &tick_addr_procs {
            sim.send_event(Processor::on_tick, (), addr);
        }
        sim.send_event(MemorySystem::on_tick, (), &tick_addr_mem);

        sim.step_by(Duration::from_secs(1));

        // post-tick
        for addr in &tick_addr_procs {
            sim.send_event(Processor::on_post_tick, (), addr);
        }
        cycles += 1;
    }

    let report = sim.send_query(MemorySystem::finish, (), &tick_addr_mem)
        .map_err(|_| SimError::Query("finish"))??;
    info!("finished simulation in {} cycles", report.cycles);
    Ok(report)
}

use std::process::ExitCode;

use cachesim_moesi::moesi::*;
use env_logger::Env;

#[macro_use]
extern crate log;

const MAX_CYCLES: u64 = 10_000_000;

/// four cpus hammering a few lines, enough to walk through every MOESI state
fn demo_programs(num_caches: usize) -> Vec<Program> {
    let hot = Addr(0x0000_1040);
    let cold = |i: usize| Addr(0x0001_0000 * (i as u32 + 1) + 0x40);
    (0..num_caches).map(|i| {
        let mut p = vec![
            Instr::Read(hot),
            Instr::Nop,
            Instr::Write(hot, i as Word),
            Instr::Read(cold(i)),
        ];
        // conflict misses on line 2 evict the hot line again
        p.extend((0..CACHE_SETS as u32 + 1).map(|t| Instr::Write(Addr::from_parts(t + 1, 2, i % LINE_WORDS), t as Word)));
        p.push(Instr::Read(hot));
        p
    }).collect()
}

fn main() -> ExitCode {
    // logging
    let env = Env::default()
        .filter_or("CACHESIM_LOG", "info")
        .write_style_or("CACHESIM_LOG_STYLE", "auto");
    env_logger::init_from_env(env);

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut specs = SystemSpec::default();
    if let Some(lat) = args.get(2) {
        match lat.parse() {
            Ok(lat) => specs.mem_beat_lat = lat,
            Err(e) => {
                error!("invalid memory latency {:?}: {}", lat, e);
                return ExitCode::FAILURE;
            },
        }
    }

    // load instructions
    let programs = match (args.first(), args.get(1)) {
        (Some(dir), Some(name)) => match trace::load(dir, name) {
            Ok(programs) => programs,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            },
        },
        (None, _) => demo_programs(specs.num_caches),
        (Some(_), None) => {
            error!("usage: cachesim-moesi [trace-dir trace-name [mem-beat-latency]]");
            return ExitCode::FAILURE;
        },
    };
    specs.num_caches = programs.len();
    info!("running {} programs", programs.len());

    match simulate(specs, programs, MAX_CYCLES) {
        Ok(report) => {
            println!("{}", report);
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        },
    }
}

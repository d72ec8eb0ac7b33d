use cachesim_moesi::moesi::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const SPECS: SystemSpec = SystemSpec { num_caches: 2, mem_beat_lat: 1 };

#[test]
fn test_simulate_traces() {
    init_logging();
    let programs = trace::load(concat!(env!("CARGO_MANIFEST_DIR"), "/datasets"), "pingpong").unwrap();
    let report = simulate(SPECS, programs, 10_000).unwrap();

    let cpu0 = report.stats.cache(0);
    let cpu1 = report.stats.cache(1);
    assert_eq!((cpu0.reads(), cpu0.writes()), (2, 2));
    assert_eq!((cpu1.reads(), cpu1.writes()), (3, 1));
    assert!(report.bus.reads + report.bus.writes + report.bus.upgrades > 0);
    assert!(report.cycles > 0);

    let printed = report.to_string();
    assert!(printed.contains("Hitrate"));
    assert!(printed.ends_with(&format!("finished simulation in {} cycles", report.cycles)));
}

#[test]
fn test_simulate_sharing() {
    init_logging();
    let a = Addr(0x0000_3000);
    let programs = vec![
        vec![Instr::Write(a, 1), Instr::Nop, Instr::Read(a)],
        vec![Instr::Nop, Instr::Nop, Instr::Read(a), Instr::Write(a, 2)],
        vec![],
    ];
    let specs = SystemSpec { num_caches: 3, ..SPECS };
    let report = simulate(specs, programs, 10_000).unwrap();
    assert_eq!(report.stats.caches().len(), 3);
    assert_eq!(report.stats.cache(2).reads() + report.stats.cache(2).writes(), 0);
    // cpu 2 still snooped every transaction
    let bus = report.bus;
    assert_eq!(
        report.stats.cache(2).probe_reads + report.stats.cache(2).probe_writes,
        bus.reads + bus.writes + bus.upgrades
    );
}

#[test]
fn test_other_work_delays_cpu() {
    init_logging();
    let cycles = |program: Program| {
        simulate(SPECS, vec![program, vec![]], 1_000).unwrap().cycles
    };
    let idle = cycles(vec![]);
    assert_eq!(cycles(vec![Instr::Nop]), idle + 1);
    assert_eq!(cycles(vec![Instr::Other(1)]), idle + 1);
    assert_eq!(cycles(vec![Instr::Other(7)]), idle + 7);
    assert_eq!(cycles(vec![Instr::Other(3), Instr::Nop, Instr::Other(2)]), idle + 6);
}

#[test]
fn test_simulate_errors() {
    init_logging();
    let err = simulate(SPECS, vec![vec![]], 100).unwrap_err();
    assert!(matches!(err, SimError::ProgramCount { programs: 1, caches: 2 }));

    // a single miss takes longer than this
    let slow = SystemSpec { mem_beat_lat: 100, ..SPECS };
    let programs = vec![vec![Instr::Read(Addr(0x40))], vec![]];
    let err = simulate(slow, programs, 5).unwrap_err();
    assert!(matches!(err, SimError::CycleLimit(5)));
}

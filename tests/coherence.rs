use std::collections::HashMap;

use cachesim_moesi::moesi::*;
use cachesim_moesi::moesi::CoherenceState::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn system(num_caches: usize) -> System {
    init_logging();
    System::new(SystemSpec { num_caches, mem_beat_lat: 2 })
}

fn read(sys: &mut System, id: CacheId, addr: Addr) -> CacheResponse {
    sys.access(id, ProcRequest::Read(addr)).unwrap()
}

fn write(sys: &mut System, id: CacheId, addr: Addr, word: Word) -> CacheResponse {
    sys.access(id, ProcRequest::Write(addr, word)).unwrap()
}

/// tick until every listed cache has answered, checking coherence on the way
fn drain(sys: &mut System, ids: &[CacheId]) -> Vec<CacheResponse> {
    let mut out = vec![None; ids.len()];
    for _ in 0..10_000 {
        sys.tick();
        sys.check_coherence().unwrap();
        for (slot, &id) in out.iter_mut().zip(ids) {
            if let Some(resp) = sys.take_response(id).unwrap() {
                *slot = Some(resp);
            }
        }
        if out.iter().all(|r| r.is_some()) {
            return out.into_iter().flatten().collect();
        }
    }
    panic!("requests did not complete");
}

const A: Addr = Addr(0x0000_1044);

#[test]
fn test_cold_read_then_hit() {
    let mut sys = system(2);
    sys.memory_mut().poke(A, 0x1234);

    let resp = read(&mut sys, 0, A);
    assert_eq!(resp, CacheResponse { hit: false, word: Some(0x1234) });
    assert_eq!(sys.cache(0).state_of(A), Exclusive);
    // the miss paid for the fill
    assert!(sys.cycle() >= timing::mem_fetch(sys.specs()));

    let bus_before = *sys.bus().counters();
    let resp = read(&mut sys, 0, A);
    assert_eq!(resp, CacheResponse { hit: true, word: Some(0x1234) });
    assert_eq!(*sys.bus().counters(), bus_before);
    assert_eq!(sys.cache(0).state_of(A), Exclusive);

    let s = sys.stats().cache(0);
    assert_eq!((s.read_hits, s.read_misses), (1, 1));
    assert_eq!(sys.stats().cache(1).probe_reads, 1);
}

#[test]
fn test_read_served_by_flush() {
    let mut sys = system(2);
    sys.memory_mut().poke(A, 1);

    write(&mut sys, 0, A, 42);
    assert_eq!(sys.cache(0).state_of(A), Modified);

    let mem_reads = sys.memory().line_reads;
    let resp = read(&mut sys, 1, A);
    assert_eq!(resp, CacheResponse { hit: false, word: Some(42) });
    assert_eq!(sys.cache(0).state_of(A), Owned);
    assert_eq!(sys.cache(1).state_of(A), Shared);
    // no fill from memory, which still holds the stale value
    assert_eq!(sys.memory().line_reads, mem_reads);
    assert_eq!(sys.memory().peek_line(A)[1], 1);
    assert_eq!(sys.stats().cache(1).flushes_received, 1);
    assert_eq!(sys.bus().counters().flushes, 1);
    sys.check_coherence().unwrap();

    // upgrade from Shared invalidates the owner
    let resp = write(&mut sys, 1, A, 43);
    assert!(resp.hit);
    assert_eq!(sys.cache(0).state_of(A), Invalid);
    assert_eq!(sys.cache(1).state_of(A), Modified);
    assert_eq!(sys.bus().counters().upgrades, 1);
    assert_eq!(sys.cache(1).peek(A), Some(43));
    sys.check_coherence().unwrap();

    // and the value travels back
    let resp = read(&mut sys, 0, A);
    assert_eq!(resp.word, Some(43));
    assert_eq!(sys.cache(0).state_of(A), Shared);
    assert_eq!(sys.cache(1).state_of(A), Owned);
}

#[test]
fn test_shared_without_owner() {
    let mut sys = system(3);
    sys.memory_mut().poke(A, 9);

    read(&mut sys, 0, A);
    read(&mut sys, 1, A);
    assert_eq!(sys.cache(0).state_of(A), Owned);
    assert_eq!(sys.cache(1).state_of(A), Shared);

    // evict the owner's copy: the line goes back to memory
    let line_index = A.decode().line_index;
    for tag in 100..100 + CACHE_SETS as u32 {
        read(&mut sys, 0, Addr::from_parts(tag, line_index, 0));
    }
    assert_eq!(sys.cache(0).state_of(A), Invalid);
    assert_eq!(sys.stats().cache(0).write_backs, 1);

    // only a sharer is left; the new reader must not become Exclusive
    let resp = read(&mut sys, 2, A);
    assert_eq!(resp.word, Some(9));
    assert_eq!(sys.cache(2).state_of(A), Shared);
    assert_eq!(sys.cache(1).state_of(A), Shared);
    sys.check_coherence().unwrap();
}

#[test]
fn test_replacement_follows_plru() {
    let mut sys = system(1);
    let line_index = 5;
    let addr = |tag: u32| Addr::from_parts(tag, line_index, 0);

    for tag in 1..=CACHE_SETS as u32 {
        read(&mut sys, 0, addr(tag));
    }
    for (way, line) in sys.cache(0).lines_at(line_index) {
        assert_eq!(line.state, Exclusive);
        assert_eq!(line.tag, way as u32 + 1);
    }
    assert_eq!(sys.cache(0).replacement().victim(line_index), 0);

    // make way 0 recent, the tree now points at way 4
    assert!(read(&mut sys, 0, addr(1)).hit);
    assert_eq!(sys.cache(0).replacement().victim(line_index), 4);

    let resp = read(&mut sys, 0, addr(9));
    assert!(!resp.hit);
    assert_eq!(sys.cache(0).state_of(addr(5)), Invalid);
    assert_eq!(sys.cache(0).state_of(addr(1)), Exclusive);
    let (way, _) = sys.cache(0).lines_at(line_index)
        .find(|(_, l)| l.tag == 9)
        .unwrap();
    assert_eq!(way, 4);
    // clean victim, nothing written back
    assert_eq!(sys.stats().cache(0).write_backs, 0);
    assert_eq!(sys.memory().line_writes, 0);
}

#[test]
fn test_write_read_round_trip() {
    let mut sys = system(2);
    let line_index = A.decode().line_index;

    write(&mut sys, 0, A, -7);
    assert_eq!(read(&mut sys, 0, A).word, Some(-7));

    // push the dirty line out and read it back from memory
    for tag in 200..200 + CACHE_SETS as u32 {
        write(&mut sys, 0, Addr::from_parts(tag, line_index, 3), tag as Word);
    }
    assert_eq!(sys.cache(0).state_of(A), Invalid);
    assert_eq!(sys.memory().peek_line(A)[A.decode().word_index], -7);
    let resp = read(&mut sys, 0, A);
    assert_eq!(resp, CacheResponse { hit: false, word: Some(-7) });

    // another cache sees the same value
    assert_eq!(read(&mut sys, 1, A).word, Some(-7));
}

#[test]
fn test_repeated_reads_are_stable() {
    let mut sys = system(2);
    sys.memory_mut().poke(A, 5);
    write(&mut sys, 1, Addr(A.0 + 4), 6);

    let first = read(&mut sys, 0, A);
    let states = (sys.cache(0).state_of(A), sys.cache(1).state_of(A));
    let second = read(&mut sys, 0, A);
    assert_eq!(first.word, second.word);
    assert!(second.hit);
    assert_eq!((sys.cache(0).state_of(A), sys.cache(1).state_of(A)), states);
}

#[test]
fn test_busy_cache_and_unknown_id() {
    let mut sys = system(2);
    sys.submit(0, ProcRequest::Read(A)).unwrap();
    assert_eq!(sys.submit(0, ProcRequest::Read(A)), Err(CacheError::Busy { id: 0 }));
    assert_eq!(
        sys.submit(2, ProcRequest::Read(A)),
        Err(CacheError::UnknownCache { id: 2, num_caches: 2 })
    );
    drain(&mut sys, &[0]);
    assert!(sys.submit(0, ProcRequest::Read(A)).is_ok());
}

#[test]
fn test_contention_counts_waits() {
    let mut sys = system(2);
    sys.submit(0, ProcRequest::Read(Addr(0x1000))).unwrap();
    sys.submit(1, ProcRequest::Read(Addr(0x2000))).unwrap();

    sys.tick();
    // cache 0 won the first cycle
    assert_eq!(sys.bus().counters().reads, 1);
    assert_eq!(sys.bus().counters().waits, 1);

    drain(&mut sys, &[0, 1]);
    assert_eq!(sys.bus().counters().reads, 2);
    assert_eq!(sys.bus().counters().waits, 1);
}

#[test]
fn test_lost_upgrade_becomes_read_exclusive() {
    let mut sys = system(2);
    read(&mut sys, 0, A);
    read(&mut sys, 1, A);
    assert_eq!(sys.cache(0).state_of(A), Owned);
    assert_eq!(sys.cache(1).state_of(A), Shared);

    // both write the same line in the same cycle, on different words
    let other = Addr(A.0 + 4);
    sys.submit(0, ProcRequest::Write(A, 10)).unwrap();
    sys.submit(1, ProcRequest::Write(other, 11)).unwrap();
    drain(&mut sys, &[0, 1]);

    assert_eq!(sys.cache(0).state_of(A), Invalid);
    assert_eq!(sys.cache(1).state_of(A), Modified);
    assert_eq!(sys.cache(1).peek(A), Some(10));
    assert_eq!(sys.cache(1).peek(other), Some(11));
    assert_eq!(sys.bus().counters().upgrades, 1);
    assert_eq!(sys.bus().counters().writes, 1);
    assert!(sys.is_quiet());
}

#[test]
fn test_mixed_workload_stays_coherent() {
    let mut sys = system(4);
    let mut x = 0x9e37_79b9u32;
    let mut next = move || {
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        x
    };
    let mut pending = [false; 4];
    let mut done = 0;

    while done < 2000 {
        for id in 0..4 {
            if pending[id] { continue; }
            let r = next();
            // a handful of tags on two line indices keeps contention and eviction high
            let addr = Addr::from_parts(r % 12, ((r >> 4) % 2) as usize, ((r >> 8) % 8) as usize);
            let req = if (r >> 20) & 1 == 0 {
                ProcRequest::Read(addr)
            } else {
                ProcRequest::Write(addr, (r >> 12) as Word)
            };
            sys.submit(id, req).unwrap();
            pending[id] = true;
        }
        sys.tick();
        sys.check_coherence().unwrap();
        for id in 0..4 {
            if sys.take_response(id).unwrap().is_some() {
                pending[id] = false;
                done += 1;
            }
        }
    }

    let report = sys.report();
    assert!(report.bus.flushes > 0);
    assert!(report.bus.upgrades > 0);
    assert!(report.stats.caches().iter().any(|s| s.write_backs > 0));
}

#[test]
fn test_reads_see_last_write() {
    let mut sys = system(4);
    let mut expected: HashMap<Addr, Word> = HashMap::new();
    let mut x = 0x1234_5677u32;
    let mut next = move || {
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        x
    };

    for _ in 0..3000 {
        let r = next();
        let id = (r % 4) as CacheId;
        // 12 tags over 2 line indices, so lines move between caches and get evicted
        let addr = Addr::from_parts((r >> 2) % 12, ((r >> 6) % 2) as usize, ((r >> 8) % 8) as usize);
        if (r >> 20) & 3 == 0 {
            let word = (r >> 11) as Word;
            write(&mut sys, id, addr, word);
            expected.insert(addr, word);
        } else {
            let resp = read(&mut sys, id, addr);
            assert_eq!(resp.word, Some(expected.get(&addr).copied().unwrap_or(0)), "cache {} read {}", id, addr);
        }
        sys.check_coherence().unwrap();
    }
    assert!(sys.bus().counters().flushes > 0);
}

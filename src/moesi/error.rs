use std::path::PathBuf;

use thiserror::Error;

use super::common::{Addr, CacheId};
use super::protocol::CoherenceState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache {id} already has a request in flight")]
    Busy { id: CacheId },
    #[error("no cache with id {id} (system has {num_caches})")]
    UnknownCache { id: CacheId, num_caches: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoherenceError {
    #[error("line {addr} has more than one owner: {holders:?}")]
    MultipleOwners { addr: Addr, holders: Vec<(CacheId, CoherenceState)> },
    #[error("line {addr} is held exclusively by cache {owner} but also by {holders:?}")]
    NotExclusive { addr: Addr, owner: CacheId, holders: Vec<(CacheId, CoherenceState)> },
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("could not read {path:?}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("{path:?}:{line}: {msg}")]
    Parse { path: PathBuf, line: usize, msg: String },
    #[error("no trace files matching {name}*.data in {dir:?}")]
    NotFound { dir: PathBuf, name: String },
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("{programs} programs for {caches} caches")]
    ProgramCount { programs: usize, caches: usize },
    #[error("simulation did not finish within {0} cycles")]
    CycleLimit(u64),
    #[error("memory system did not answer the {0} query")]
    Query(&'static str),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Coherence(#[from] CoherenceError),
}

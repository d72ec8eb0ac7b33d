//! Per-processor instruction traces.
//!
//! A trace is a set of files `<name>*.data` in one directory, one file per
//! processor, taken in file name order. Each line is `<op> <hex> [data]`:
//!
//! * `0 <addr>` read
//! * `1 <addr> [data]` write; without data the word written is the line number
//! * `2 <count>` other work taking `count` cycles
//!
//! Empty lines and lines starting with `#` are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use super::common::*;
use super::error::TraceError;

pub fn load(dir: impl AsRef<Path>, name: &str) -> Result<Vec<Program>, TraceError> {
    let dir = dir.as_ref();
    let io_err = |source| TraceError::Io { path: dir.to_path_buf(), source };

    let mut paths = fs::read_dir(dir).map_err(io_err)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.file_name()
                .and_then(|f| f.to_str())
                .map_or(false, |f| f.starts_with(name) && f.ends_with(".data"))
        })
        .collect::<Vec<_>>();
    if paths.is_empty() {
        return Err(TraceError::NotFound { dir: dir.to_path_buf(), name: name.to_string() });
    }
    paths.sort();

    paths.into_iter().map(|p| {
        debug!("reading trace file {:?}", p);
        let text = fs::read_to_string(&p).map_err(|source| TraceError::Io { path: p.clone(), source })?;
        parse(&p, &text)
    }).collect()
}

fn parse_hex(s: &str) -> Option<u32> {
    u32::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

/// parse the contents of a single trace file
pub fn parse(path: &Path, text: &str) -> Result<Program, TraceError> {
    let mut program = Program::new();
    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') { continue; }
        let err = |msg: String| TraceError::Parse { path: PathBuf::from(path), line: line_no, msg };

        let mut parts = line.split_whitespace();
        let op = parts.next().unwrap_or_default();
        let val = parts.next()
            .ok_or_else(|| err("missing operand".into()))?;
        let val = parse_hex(val).ok_or_else(|| err(format!("bad hex value {:?}", val)))?;

        match op {
            "0" => program.push(Instr::Read(Addr(val))),
            "1" => {
                let word = match parts.next() {
                    Some(d) => d.parse::<Word>().map_err(|e| err(format!("bad data {:?}: {}", d, e)))?,
                    None => line_no as Word,
                };
                program.push(Instr::Write(Addr(val), word));
            },
            "2" => program.push(Instr::Other(val)),
            other => return Err(err(format!("invalid instruction {:?}", other))),
        }
    }
    Ok(program)
}

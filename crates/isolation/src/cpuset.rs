// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CPU core masks as closed ranges (`0-3,7`).

use crate::error::IsolationError;
use std::collections::BTreeSet;

/// Parse a cpu list in cgroup cpuset syntax into the set of core indexes.
///
/// Accepts comma-separated single cores and closed ranges: `0-3,7`.
pub fn parse_cpu_list(input: &str) -> Result<BTreeSet<u32>, IsolationError> {
    let invalid = || IsolationError::InvalidCpuList(input.to_string());

    if input.trim().is_empty() {
        return Err(invalid());
    }

    let mut cores = BTreeSet::new();
    for part in input.split(',') {
        let part = part.trim();
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = lo.trim().parse().map_err(|_| invalid())?;
                let hi: u32 = hi.trim().parse().map_err(|_| invalid())?;
                if lo > hi {
                    return Err(invalid());
                }
                cores.extend(lo..=hi);
            }
            None => {
                let core: u32 = part.parse().map_err(|_| invalid())?;
                cores.insert(core);
            }
        }
    }
    Ok(cores)
}

/// Format a set of core indexes back into closed-range syntax.
///
/// Adjacent cores collapse into ranges: `{0,1,2,3,7}` → `0-3,7`.
pub fn format_cpu_list(cores: &BTreeSet<u32>) -> String {
    let mut out = String::new();
    let mut iter = cores.iter().copied();

    let Some(first) = iter.next() else {
        return out;
    };
    let mut start = first;
    let mut end = first;

    let mut flush = |out: &mut String, start: u32, end: u32| {
        if !out.is_empty() {
            out.push(',');
        }
        if start == end {
            out.push_str(&start.to_string());
        } else {
            out.push_str(&format!("{start}-{end}"));
        }
    };

    for core in iter {
        if core == end + 1 {
            end = core;
        } else {
            flush(&mut out, start, end);
            start = core;
            end = core;
        }
    }
    flush(&mut out, start, end);
    out
}

#[cfg(test)]
#[path = "cpuset_tests.rs"]
mod tests;

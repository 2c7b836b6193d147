//! What the host program made visible in global memory.
//!
//! Visibility is tracked per byte range of each buffer. Global bytes the
//! kernel has not written yet take their shadow from the visibility of
//! their range.
use std::{collections::BTreeMap, fmt, ops::BitOr};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Written by the host; contents are defined.
    Defined,
    /// Never written by the host, or handed to the device write-only.
    Undefined,
}

/// Flags of a host mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MapFlags(u32);

impl MapFlags {
    pub const READ: Self = Self(1);
    pub const WRITE: Self = Self(2);
    pub const WRITE_INVALIDATE_REGION: Self = Self(4);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MapFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for MapFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        for (flag, name) in [
            (Self::READ, "read"),
            (Self::WRITE, "write"),
            (Self::WRITE_INVALIDATE_REGION, "write_invalidate_region"),
        ] {
            if self.contains(flag) {
                names.push(name);
            }
        }
        if names.is_empty() {
            "none".fmt(f)
        } else {
            names.join("|").fmt(f)
        }
    }
}

/// Offsets of one buffer the host has written, kept as disjoint sorted
/// `start..end` runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinedRanges {
    runs: BTreeMap<u64, u64>,
}

impl DefinedRanges {
    pub fn contains(&self, offset: u64) -> bool {
        self.runs
            .range(..=offset)
            .next_back()
            .is_some_and(|(_, &end)| offset < end)
    }

    pub fn define(&mut self, offset: u64, len: u64) {
        if len == 0 {
            return;
        }
        let mut start = offset;
        let mut end = offset.saturating_add(len);
        if let Some((&prev, &prev_end)) = self.runs.range(..=start).next_back() {
            if prev_end >= start {
                start = prev;
                end = end.max(prev_end);
            }
        }
        let absorbed: Vec<u64> = self.runs.range(start..=end).map(|(&s, _)| s).collect();
        for run in absorbed {
            if let Some(run_end) = self.runs.remove(&run) {
                end = end.max(run_end);
            }
        }
        self.runs.insert(start, end);
    }

    pub fn undefine(&mut self, offset: u64, len: u64) {
        let end = offset.saturating_add(len);
        let cut: Vec<(u64, u64)> = self
            .runs
            .range(..end)
            .filter(|&(_, &run_end)| run_end > offset)
            .map(|(&start, &run_end)| (start, run_end))
            .collect();
        for (start, run_end) in cut {
            self.runs.remove(&start);
            if start < offset {
                self.runs.insert(start, offset);
            }
            if run_end > end {
                self.runs.insert(end, run_end);
            }
        }
    }

    /// Number of defined bytes.
    pub fn len(&self) -> u64 {
        self.runs.iter().map(|(start, end)| end - start).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn runs(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.runs.iter().map(|(&start, &end)| (start, end))
    }
}

impl fmt::Display for DefinedRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return "undefined".fmt(f);
        }
        for (idx, (start, end)) in self.runs().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{start:#x}..{end:#x}")?;
        }
        Ok(())
    }
}

/// Defined byte ranges of every buffer the host announced. Offsets are
/// relative to the buffer start.
#[derive(Debug, Default)]
pub struct HostRegistry {
    buffers: DashMap<u64, DefinedRanges, FxBuildHasher>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visibility of byte `offset` of `buffer`, or `None` for an unknown
    /// buffer.
    pub fn visibility(&self, buffer: u64, offset: u64) -> Option<Visibility> {
        self.buffers.get(&buffer).map(|ranges| {
            if ranges.contains(offset) {
                Visibility::Defined
            } else {
                Visibility::Undefined
            }
        })
    }

    pub fn defined_ranges(&self, buffer: u64) -> Option<DefinedRanges> {
        self.buffers.get(&buffer).map(|ranges| ranges.clone())
    }

    /// Makes `buffer` known, all undefined unless it already is known.
    pub fn register(&self, buffer: u64) {
        self.buffers.entry(buffer).or_default();
    }

    /// Forgets everything the host wrote to `buffer`, keeping it known.
    pub fn reset(&self, buffer: u64) {
        self.buffers.insert(buffer, DefinedRanges::default());
    }

    pub fn define(&self, buffer: u64, offset: u64, len: u64) {
        self.buffers.entry(buffer).or_default().define(offset, len);
    }

    pub fn undefine(&self, buffer: u64, offset: u64, len: u64) {
        self.buffers
            .entry(buffer)
            .or_default()
            .undefine(offset, len);
    }

    pub fn forget(&self, buffer: u64) -> Option<DefinedRanges> {
        self.buffers.remove(&buffer).map(|(_, ranges)| ranges)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

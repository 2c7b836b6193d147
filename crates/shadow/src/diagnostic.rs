//! Defects found in the guest program.
//!
//! A defect never stops the run and never changes a shadow: it is logged
//! through `tracing` and kept in the [`DefectLog`] for the driver.
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
};

use kshadow_ir::{AddressSpace, SourceLoc, WorkGroupId, WorkItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefectKind {
    /// A branch or switch condition.
    UninitializedCondition,
    /// The address of a load, store or atomic.
    UninitializedAddress { space: AddressSpace },
    /// An index of an address computation or vector access.
    UninitializedIndex,
    /// A store of undefined data to memory other items can see.
    UninitializedWrite { space: AddressSpace, address: u64 },
}

impl DefectKind {
    pub const fn code(self) -> u16 {
        match self {
            Self::UninitializedCondition => 1,
            Self::UninitializedAddress { .. } => 2,
            Self::UninitializedIndex => 3,
            Self::UninitializedWrite { .. } => 4,
        }
    }
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UninitializedCondition => {
                write!(f, "control flow depends on uninitialized value")
            }
            Self::UninitializedAddress { space } => write!(
                f,
                "uninitialized address used to read from/write to {space} memory"
            ),
            Self::UninitializedIndex => {
                write!(f, "instruction depends on an uninitialized index value")
            }
            Self::UninitializedWrite { space, address } => write!(
                f,
                "uninitialized value written to {space} memory address {address:#x}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defect {
    pub kind: DefectKind,
    pub kernel: String,
    pub item: WorkItemId,
    pub group: WorkGroupId,
    pub loc: Option<SourceLoc>,
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SH{:04}: {}\n  kernel `{}`, {} in {}",
            self.kind.code(),
            self.kind,
            self.kernel,
            self.item,
            self.group
        )?;
        if let Some(loc) = &self.loc {
            write!(f, "\n  at {loc}")?;
        }
        Ok(())
    }
}

/// Defects of a run, shared by every worker thread.
#[derive(Debug)]
pub struct DefectLog {
    max: usize,
    defects: Mutex<Vec<Defect>>,
    dropped: AtomicUsize,
}

impl DefectLog {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            defects: Mutex::new(Vec::new()),
            dropped: AtomicUsize::new(0),
        }
    }

    pub fn record(&self, defect: Defect) {
        tracing::warn!(
            code = defect.kind.code(),
            kernel = %defect.kernel,
            item = %defect.item,
            group = %defect.group,
            loc = ?defect.loc.as_ref().map(ToString::to_string),
            "{}",
            defect.kind
        );

        let mut defects = self.defects.lock().unwrap_or_else(PoisonError::into_inner);
        if defects.len() < self.max {
            defects.push(defect);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> Vec<Defect> {
        self.defects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Defects seen after the log was full.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.defects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defect(kind: DefectKind) -> Defect {
        Defect {
            kind,
            kernel: "vecadd".to_string(),
            item: WorkItemId(3),
            group: WorkGroupId(1),
            loc: Some(SourceLoc::new("vecadd.cl", 12, 9)),
        }
    }

    #[test]
    fn display_defect() {
        let defect = defect(DefectKind::UninitializedWrite {
            space: AddressSpace::Global,
            address: 0x8000,
        });
        insta::assert_snapshot!(defect.to_string(), @r"
        SH0004: uninitialized value written to global memory address 0x8000
          kernel `vecadd`, item3 in group1
          at vecadd.cl:12:9
        ");
    }

    #[test]
    fn log_is_capped() {
        let log = DefectLog::new(2);
        for _ in 0..5 {
            log.record(defect(DefectKind::UninitializedCondition));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.dropped(), 3);
        assert_eq!(
            log.snapshot()[0].kind.to_string(),
            "control flow depends on uninitialized value"
        );
    }
}

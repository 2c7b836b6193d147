use std::fmt;

use kshadow_ir::{
    AddressSpace, Opcode, UnsupportedAddressSpace, ValueId, WorkGroupId, WorkItemId,
};

pub type Result<T> = std::result::Result<T, ShadowError>;

/// An unrecoverable error. Any of these aborts the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShadowError {
    #[error("unsupported address space {0}")]
    UnsupportedAddressSpace(u32),

    #[error("invalid {space} memory address {address:#x}")]
    InvalidAddress { space: AddressSpace, address: u64 },

    #[error("{0} memory has no shadow storage")]
    NoShadowStorage(AddressSpace),

    #[error("call frame stack is empty")]
    EmptyCallStack,

    #[error("`{0}` already owns a global shadow")]
    GlobalRebind(ValueId),

    #[error("`{0}` is already bound in the active frame")]
    Rebind(ValueId),

    #[error("`{0}` has no shadow")]
    UnboundValue(ValueId),

    #[error("the interpreter holds no concrete value for `{0}`")]
    MissingConcrete(ValueId),

    #[error("no local address for `{value}` in {group}")]
    MissingLocalAddress { value: ValueId, group: WorkGroupId },

    #[error("unimplemented opcode: `{0}`")]
    UnimplementedOpcode(Opcode),

    #[error("malformed `{0}` instruction")]
    MalformedInstruction(Opcode),

    #[error("unsupported intrinsic: `{0}`")]
    UnsupportedIntrinsic(String),

    #[error("encountered unreachable code")]
    Unreachable,

    #[error("phi has no incoming value for the previous block")]
    MissingIncoming,

    #[error("no live shadow for {0}")]
    UnknownWorkItem(WorkItemId),

    #[error("no live shadow for {0}")]
    UnknownWorkGroup(WorkGroupId),

    #[error("{0} already has a live shadow")]
    DuplicateWorkItem(WorkItemId),

    #[error("{0} already has a live shadow")]
    DuplicateWorkGroup(WorkGroupId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("analysis disagrees with execution: {0}")]
    Inconsistent(Inconsistency),
}

impl ShadowError {
    /// Whether the error points at a bug in the analysis itself rather than
    /// at the driver or the guest program.
    pub fn is_analysis_bug(&self) -> bool {
        matches!(self, Self::Inconsistent(_))
    }
}

impl From<UnsupportedAddressSpace> for ShadowError {
    fn from(err: UnsupportedAddressSpace) -> Self {
        Self::UnsupportedAddressSpace(err.0)
    }
}

/// A shadow that does not describe the concrete result it mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inconsistency {
    pub opcode: Opcode,
    pub message: String,
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`: {}", self.opcode, self.message)
    }
}

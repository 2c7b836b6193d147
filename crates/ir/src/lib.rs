//! Driver-facing model of the kernel interpreter: value identities, types,
//! concrete values, decoded instructions and dispatch descriptors.
pub mod inst;
pub mod kernel;
pub mod state;
pub mod types;
pub mod value;

pub use inst::{
    AtomicOp, BinaryOp, BlockId, CallArg, CastOp, FloatPredicate, FuncRef, Inst, InstData,
    IntPredicate, Intrinsic, Opcode, SourceLoc, UnaryOp,
};
pub use kernel::{KernelInvocation, KernelValue, KernelValueKind};
pub use state::{GroupState, ItemState, WorkGroupId, WorkItemId};
pub use types::{AddressSpace, ScalarType, Type, UnsupportedAddressSpace};
pub use value::{Operand, Scalar, TypedValue, ValueId};

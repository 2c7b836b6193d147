//! This module contains the views the driving interpreter exposes to the
//! shadow engine.
use cranelift_entity::entity_impl;

use crate::{inst::BlockId, value::TypedValue, ValueId};

/// An opaque reference to a work-item.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkItemId(pub u32);
entity_impl!(WorkItemId, "item");

/// An opaque reference to a work-group.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkGroupId(pub u32);
entity_impl!(WorkGroupId, "group");

/// The interpreter state of one work-item, as seen after an instruction
/// retired.
pub trait ItemState {
    fn item(&self) -> WorkItemId;

    fn group(&self) -> WorkGroupId;

    /// Retrieves the concrete value currently bound to `value`.
    ///
    /// NOTE: Returns `None` if the interpreter holds no value for `value`;
    /// the engine treats this as a fatal error whenever it needs the value.
    fn lookup_val(&self, value: ValueId) -> Option<TypedValue>;

    /// Returns the basic block executed immediately before the current
    /// block, used to resolve phi nodes.
    fn prev_block(&self) -> Option<BlockId>;
}

/// The interpreter state of one work-group.
pub trait GroupState {
    fn group(&self) -> WorkGroupId;

    /// Address of the local-memory storage backing `value` in this group.
    fn local_address(&self, value: ValueId) -> Option<u64>;
}

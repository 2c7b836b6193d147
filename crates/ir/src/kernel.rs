//! This module contains the description of a kernel dispatch.
use crate::{types::Type, value::TypedValue, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelValueKind {
    /// A kernel argument. `byval` arguments are passed through a pointer
    /// to a per-item private copy.
    Argument { byval: bool },
    /// A module-scope variable.
    Variable,
}

/// A kernel argument or module-scope variable bound for one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelValue {
    pub id: ValueId,
    pub ty: Type,
    /// Type of the pointed-to storage; `Void` for non-pointers.
    pub pointee: Type,
    pub kind: KernelValueKind,
    /// The concrete value bound at dispatch. Scalars carry the value itself,
    /// global pointers their address, and byval arguments and variables the
    /// contents of their storage.
    pub value: TypedValue,
}

impl KernelValue {
    pub fn argument(id: ValueId, value: TypedValue) -> Self {
        Self {
            id,
            ty: value.ty(),
            pointee: Type::Void,
            kind: KernelValueKind::Argument { byval: false },
            value,
        }
    }

    pub fn pointer_argument(id: ValueId, ty: Type, pointee: Type, value: TypedValue) -> Self {
        Self {
            id,
            ty,
            pointee,
            kind: KernelValueKind::Argument { byval: false },
            value,
        }
    }

    pub fn byval_argument(id: ValueId, ty: Type, contents: TypedValue) -> Self {
        Self {
            id,
            ty,
            pointee: contents.ty(),
            kind: KernelValueKind::Argument { byval: true },
            value: contents,
        }
    }

    pub fn variable(id: ValueId, ty: Type, contents: TypedValue) -> Self {
        Self {
            id,
            ty,
            pointee: contents.ty(),
            kind: KernelValueKind::Variable,
            value: contents,
        }
    }

    pub fn is_argument(&self) -> bool {
        matches!(self.kind, KernelValueKind::Argument { .. })
    }

    pub fn is_byval(&self) -> bool {
        matches!(self.kind, KernelValueKind::Argument { byval: true })
    }
}

/// Everything the engine learns about a dispatch at kernel begin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelInvocation {
    pub name: String,
    pub values: Vec<KernelValue>,
}

impl KernelInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: KernelValue) -> Self {
        self.values.push(value);
        self
    }
}

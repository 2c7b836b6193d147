//! This module contains the types of values observed by the shadow engine.
use std::fmt;

/// A named memory region class with its own visibility and lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressSpace {
    /// Exclusive to one work-item.
    Private,
    /// Shared by every work-item of the run.
    Global,
    /// Read-only, always defined.
    Constant,
    /// Shared by the work-items of one work-group.
    Local,
}

impl AddressSpace {
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Private => 0,
            Self::Global => 1,
            Self::Constant => 2,
            Self::Local => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Global => "global",
            Self::Constant => "constant",
            Self::Local => "local",
        }
    }
}

impl TryFrom<u32> for AddressSpace {
    type Error = UnsupportedAddressSpace;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Private),
            1 => Ok(Self::Global),
            2 => Ok(Self::Constant),
            3 => Ok(Self::Local),
            _ => Err(UnsupportedAddressSpace(value)),
        }
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unsupported address space {0}")]
pub struct UnsupportedAddressSpace(pub u32);

/// The type of a single lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    I1,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Ptr(AddressSpace),
}

impl ScalarType {
    pub const fn bits(self) -> u32 {
        match self {
            Self::I1 => 1,
            Self::I8 => 8,
            Self::I16 => 16,
            Self::I32 | Self::F32 => 32,
            Self::I64 | Self::F64 | Self::Ptr(_) => 64,
        }
    }

    /// Size of the lane in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::I1 | Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 | Self::Ptr(_) => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::I1 | Self::I8 | Self::I16 | Self::I32 | Self::I64
        )
    }

    pub const fn pointer_space(self) -> Option<AddressSpace> {
        match self {
            Self::Ptr(space) => Some(space),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I1 => "i1".fmt(f),
            Self::I8 => "i8".fmt(f),
            Self::I16 => "i16".fmt(f),
            Self::I32 => "i32".fmt(f),
            Self::I64 => "i64".fmt(f),
            Self::F32 => "f32".fmt(f),
            Self::F64 => "f64".fmt(f),
            Self::Ptr(space) => write!(f, "*{space}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Scalar(ScalarType),
    Vector { elem: ScalarType, lanes: u32 },
    /// A struct or array, tracked as one opaque lane of `size` bytes.
    Aggregate { size: u32 },
}

impl Type {
    pub const I1: Self = Self::Scalar(ScalarType::I1);
    pub const I8: Self = Self::Scalar(ScalarType::I8);
    pub const I16: Self = Self::Scalar(ScalarType::I16);
    pub const I32: Self = Self::Scalar(ScalarType::I32);
    pub const I64: Self = Self::Scalar(ScalarType::I64);
    pub const F32: Self = Self::Scalar(ScalarType::F32);
    pub const F64: Self = Self::Scalar(ScalarType::F64);

    pub const fn ptr(space: AddressSpace) -> Self {
        Self::Scalar(ScalarType::Ptr(space))
    }

    pub const fn vector(elem: ScalarType, lanes: u32) -> Self {
        Self::Vector { elem, lanes }
    }

    /// Number of shadow lanes a value of this type carries.
    pub const fn lanes(self) -> usize {
        match self {
            Self::Void => 0,
            Self::Scalar(_) | Self::Aggregate { .. } => 1,
            Self::Vector { lanes, .. } => lanes as usize,
        }
    }

    /// The type of each lane. Aggregates are viewed as bytes.
    pub const fn lane_type(self) -> ScalarType {
        match self {
            Self::Scalar(ty) | Self::Vector { elem: ty, .. } => ty,
            Self::Void | Self::Aggregate { .. } => ScalarType::I8,
        }
    }

    /// Size of the value in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Void => 0,
            Self::Scalar(ty) => ty.size(),
            Self::Vector { elem, lanes } => elem.size() * lanes as usize,
            Self::Aggregate { size } => size as usize,
        }
    }

    pub const fn is_sized(self) -> bool {
        !matches!(self, Self::Void)
    }

    pub const fn pointer_space(self) -> Option<AddressSpace> {
        match self {
            Self::Scalar(ty) => ty.pointer_space(),
            _ => None,
        }
    }

    pub const fn is_pointer(self) -> bool {
        self.pointer_space().is_some()
    }
}

impl From<ScalarType> for Type {
    fn from(ty: ScalarType) -> Self {
        Self::Scalar(ty)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => "void".fmt(f),
            Self::Scalar(ty) => ty.fmt(f),
            Self::Vector { elem, lanes } => write!(f, "<{lanes} x {elem}>"),
            Self::Aggregate { size } => write!(f, "[{size} x i8]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_space_numbering() {
        for space in [
            AddressSpace::Private,
            AddressSpace::Global,
            AddressSpace::Constant,
            AddressSpace::Local,
        ] {
            assert_eq!(AddressSpace::try_from(space.as_u32()), Ok(space));
        }
        assert_eq!(AddressSpace::try_from(7), Err(UnsupportedAddressSpace(7)));
    }

    #[test]
    fn lanes_and_sizes() {
        let v4 = Type::vector(ScalarType::F32, 4);
        assert_eq!(v4.lanes(), 4);
        assert_eq!(v4.size(), 16);
        assert_eq!(Type::Void.lanes(), 0);
        assert!(!Type::Void.is_sized());
        assert_eq!(Type::Aggregate { size: 24 }.lanes(), 1);
        assert_eq!(
            Type::ptr(AddressSpace::Local).pointer_space(),
            Some(AddressSpace::Local)
        );
        assert_eq!(v4.to_string(), "<4 x f32>");
    }
}

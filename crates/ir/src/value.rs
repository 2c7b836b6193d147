//! This module contains value identities and concrete values.
use std::fmt;

use cranelift_entity::entity_impl;
use smallvec::SmallVec;

use crate::types::{AddressSpace, ScalarType, Type};

/// An opaque reference to a program value: an instruction result, an
/// argument or a module-scope variable.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct ValueId(pub u32);
entity_impl!(ValueId, "v");

/// One concrete lane: its type and raw little-endian bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scalar {
    ty: ScalarType,
    bits: u64,
}

impl Scalar {
    pub fn new(ty: ScalarType, bits: u64) -> Self {
        Self {
            ty,
            bits: bits & width_mask(ty.bits()),
        }
    }

    pub fn from_bool(value: bool) -> Self {
        Self::new(ScalarType::I1, value as u64)
    }

    pub fn from_i64(ty: ScalarType, value: i64) -> Self {
        Self::new(ty, value as u64)
    }

    pub fn from_f32(value: f32) -> Self {
        Self::new(ScalarType::F32, value.to_bits() as u64)
    }

    pub fn from_f64(value: f64) -> Self {
        Self::new(ScalarType::F64, value.to_bits())
    }

    pub fn from_address(space: AddressSpace, address: u64) -> Self {
        Self::new(ScalarType::Ptr(space), address)
    }

    pub fn ty(self) -> ScalarType {
        self.ty
    }

    pub fn raw(self) -> u64 {
        self.bits
    }

    pub fn as_bool(self) -> bool {
        self.bits != 0
    }

    pub fn as_uint(self) -> u64 {
        self.bits
    }

    /// Sign-extends the lane to 64 bits. `i1` is read as `0` or `1`.
    pub fn as_sint(self) -> i64 {
        let bits = self.ty.bits();
        if bits == 1 || bits == 64 {
            return self.bits as i64;
        }
        let shift = 64 - bits;
        ((self.bits << shift) as i64) >> shift
    }

    pub fn as_address(self) -> u64 {
        self.bits
    }

    /// The numeric value of the lane. Integers are read signed, pointers
    /// unsigned.
    pub fn as_f64(self) -> f64 {
        match self.ty {
            ScalarType::F32 => f32::from_bits(self.bits as u32) as f64,
            ScalarType::F64 => f64::from_bits(self.bits),
            ScalarType::Ptr(_) => self.bits as f64,
            _ => self.as_sint() as f64,
        }
    }

    pub fn is_nan(self) -> bool {
        self.ty.is_float() && self.as_f64().is_nan()
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            ScalarType::F32 | ScalarType::F64 => write!(f, "{}.{}", self.as_f64(), self.ty),
            ScalarType::Ptr(_) => write!(f, "{:#x}.{}", self.bits, self.ty),
            _ => write!(f, "{}.{}", self.as_sint(), self.ty),
        }
    }
}

fn width_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// A concrete value as computed by the interpreter: its type and its
/// little-endian byte representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedValue {
    ty: Type,
    data: SmallVec<[u8; 16]>,
}

impl TypedValue {
    /// Builds a value from raw bytes. Missing bytes are zero, extra bytes
    /// are dropped.
    pub fn from_bytes(ty: Type, bytes: &[u8]) -> Self {
        let mut data: SmallVec<[u8; 16]> = bytes.iter().copied().take(ty.size()).collect();
        data.resize(ty.size(), 0);
        Self { ty, data }
    }

    pub fn zeroed(ty: Type) -> Self {
        Self::from_bytes(ty, &[])
    }

    pub fn from_scalars(ty: Type, lanes: impl IntoIterator<Item = Scalar>) -> Self {
        let elem = ty.lane_type().size();
        let mut value = Self::zeroed(ty);
        for (i, lane) in lanes.into_iter().enumerate().take(ty.lanes()) {
            let start = i * elem;
            let end = (start + elem).min(value.data.len());
            let bytes = lane.raw().to_le_bytes();
            value.data[start..end].copy_from_slice(&bytes[..end - start]);
        }
        value
    }

    pub fn scalar(lane: Scalar) -> Self {
        Self::from_scalars(Type::Scalar(lane.ty()), [lane])
    }

    pub fn bool(value: bool) -> Self {
        Self::scalar(Scalar::from_bool(value))
    }

    pub fn i32(value: i32) -> Self {
        Self::scalar(Scalar::from_i64(ScalarType::I32, value as i64))
    }

    pub fn i64(value: i64) -> Self {
        Self::scalar(Scalar::from_i64(ScalarType::I64, value))
    }

    pub fn f32(value: f32) -> Self {
        Self::scalar(Scalar::from_f32(value))
    }

    pub fn f64(value: f64) -> Self {
        Self::scalar(Scalar::from_f64(value))
    }

    pub fn pointer(space: AddressSpace, address: u64) -> Self {
        Self::scalar(Scalar::from_address(space, address))
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn lanes(&self) -> usize {
        self.ty.lanes()
    }

    /// Reads lane `idx`; lanes past the end read as zero.
    pub fn lane(&self, idx: usize) -> Scalar {
        let elem = self.ty.lane_type();
        let size = elem.size();
        let start = idx * size;
        let mut bytes = [0u8; 8];
        if let Some(src) = self.data.get(start..start + size) {
            bytes[..size].copy_from_slice(src);
        }
        Scalar::new(elem, u64::from_le_bytes(bytes))
    }

    pub fn first(&self) -> Scalar {
        self.lane(0)
    }

    pub fn iter_lanes(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.lanes()).map(|idx| self.lane(idx))
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Type::Void => "void".fmt(f),
            Type::Aggregate { size } => write!(f, "<{size} bytes>"),
            Type::Scalar(_) => self.first().fmt(f),
            Type::Vector { .. } => {
                write!(f, "<")?;
                for (i, lane) in self.iter_lanes().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    lane.fmt(f)?;
                }
                write!(f, ">")
            }
        }
    }
}

/// An instruction operand as decoded by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A value with an identity: instruction result, argument or global.
    Value { id: ValueId, ty: Type },
    /// A literal constant.
    Const(TypedValue),
    /// An unresolved placeholder.
    Undef(Type),
}

impl Operand {
    pub fn value(id: ValueId, ty: Type) -> Self {
        Self::Value { id, ty }
    }

    pub fn ty(&self) -> Type {
        match self {
            Self::Value { ty, .. } | Self::Undef(ty) => *ty,
            Self::Const(value) => value.ty(),
        }
    }

    pub fn value_id(&self) -> Option<ValueId> {
        match self {
            Self::Value { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl From<TypedValue> for Operand {
    fn from(value: TypedValue) -> Self {
        Self::Const(value)
    }
}

//! Shadow domains and the per-lane payload they share.
//!
//! A [`ShadowValue`] mirrors one concrete value lane by lane. What a lane
//! records, and how each instruction kind transforms lanes, is decided by a
//! [`Domain`]. The engine itself only moves lanes around.
use std::fmt;

use kshadow_ir::{
    AtomicOp, BinaryOp, CastOp, FloatPredicate, IntPredicate, Opcode, Scalar, ScalarType, Type,
    TypedValue, UnaryOp,
};
use smallvec::SmallVec;

use crate::{Inconsistency, Result, ShadowError};

pub mod interval;
pub mod taint;

pub use interval::Interval;
pub use taint::Taint;

/// The lane type of a shadow analysis and its transfer rules.
///
/// Every hook receives the concrete lane computed by the interpreter, so a
/// domain can always fall back to describing the observed result exactly.
/// Hooks that are not overridden treat the output as depending on all
/// inputs through [`Domain::derived`].
pub trait Domain: Copy + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Lane for a value nothing is known about.
    fn pessimistic(ty: ScalarType) -> Self;

    /// Lane mirroring a concrete literal.
    fn exact(lane: Scalar) -> Self;

    /// Lane for defined data whose concrete value is not observed.
    fn opaque(ty: ScalarType) -> Self;

    /// Merge rule.
    fn combine(self, other: Self) -> Self;

    /// Whether the lane may steer control flow, addressing or indexing
    /// without a defect being reported.
    fn is_defined(self) -> bool;

    /// A lane computed from `inputs` by an operation the domain does not
    /// model precisely.
    fn derived(inputs: &[Self], result: Scalar) -> Self {
        inputs
            .iter()
            .copied()
            .reduce(Self::combine)
            .unwrap_or_else(|| Self::exact(result))
    }

    fn unary(_op: UnaryOp, arg: Self, result: Scalar) -> Self {
        Self::derived(&[arg], result)
    }

    fn binary(_op: BinaryOp, lhs: Self, rhs: Self, result: Scalar) -> Self {
        Self::derived(&[lhs, rhs], result)
    }

    /// `a * b + c`.
    fn mul_add(a: Self, b: Self, c: Self, result: Scalar) -> Self {
        Self::derived(&[a, b, c], result)
    }

    fn icmp(
        _pred: IntPredicate,
        lhs: Self,
        rhs: Self,
        result: Scalar,
        _audit: &mut Audit,
    ) -> Self {
        Self::derived(&[lhs, rhs], result)
    }

    fn fcmp(
        _pred: FloatPredicate,
        lhs: Self,
        rhs: Self,
        result: Scalar,
        _audit: &mut Audit,
    ) -> Self {
        Self::derived(&[lhs, rhs], result)
    }

    fn cast(
        _op: CastOp,
        arg: Self,
        _from: ScalarType,
        _result: Scalar,
        _audit: &mut Audit,
    ) -> Self {
        arg
    }

    /// New memory contents of an atomic update. `operand` is `None` for
    /// `Inc`/`Dec`.
    fn atomic(op: AtomicOp, old: Self, operand: Option<Self>, _ty: ScalarType) -> Self {
        match (op, operand) {
            (AtomicOp::Xchg, Some(operand)) => operand,
            (_, Some(operand)) => old.combine(operand),
            (_, None) => old,
        }
    }

    /// A lane selected by a condition whose shadow is `cond`.
    fn depend_on(self, cond: Self) -> Self {
        self.combine(cond)
    }

    /// Memory contents after a fill with a byte whose shadow is `byte`.
    fn fill(byte: Self) -> Self {
        byte
    }

    /// A `ty` lane read from bytes that were written as parts of other
    /// lanes. `bytes` holds the lane of each byte, in address order.
    fn from_bytes(bytes: &[Self], ty: ScalarType) -> Self {
        bytes
            .iter()
            .copied()
            .reduce(Self::combine)
            .unwrap_or_else(|| Self::pessimistic(ty))
    }
}

/// A value-semantic shadow: one lane per concrete lane.
///
/// A `ShadowValue` is owned by exactly one table entry; moving it between
/// entries always goes through `clone`. Memory keeps its lanes per byte.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowValue<D: Domain> {
    lanes: SmallVec<[D; 4]>,
}

impl<D: Domain> ShadowValue<D> {
    pub fn from_lanes(lanes: impl IntoIterator<Item = D>) -> Self {
        Self {
            lanes: lanes.into_iter().collect(),
        }
    }

    pub fn splat(lane: D, count: usize) -> Self {
        Self::from_lanes(std::iter::repeat(lane).take(count))
    }

    /// The domain default for a value of type `ty`.
    pub fn pessimistic(ty: Type) -> Self {
        Self::splat(D::pessimistic(ty.lane_type()), ty.lanes())
    }

    /// The shadow of a literal.
    pub fn exact(value: &TypedValue) -> Self {
        Self::from_lanes(value.iter_lanes().map(D::exact))
    }

    pub fn opaque(ty: Type) -> Self {
        Self::splat(D::opaque(ty.lane_type()), ty.lanes())
    }

    pub fn lanes(&self) -> &[D] {
        &self.lanes
    }

    pub fn num_lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Lane `idx`; a single-lane shadow broadcasts to every index.
    pub fn lane(&self, idx: usize) -> Option<D> {
        if self.lanes.len() == 1 {
            Some(self.lanes[0])
        } else {
            self.lanes.get(idx).copied()
        }
    }

    /// Lane `idx`, or the pessimistic lane of `ty` if there is none.
    pub fn lane_or_default(&self, idx: usize, ty: ScalarType) -> D {
        self.lane(idx).unwrap_or_else(|| D::pessimistic(ty))
    }

    pub fn set_lane(&mut self, idx: usize, lane: D) {
        if let Some(slot) = self.lanes.get_mut(idx) {
            *slot = lane;
        }
    }

    pub fn is_defined(&self) -> bool {
        self.lanes.iter().all(|lane| lane.is_defined())
    }

    /// All lanes merged into one.
    pub fn collapse(&self) -> Option<D> {
        self.lanes.iter().copied().reduce(D::combine)
    }

    /// Lane-wise `combine`, broadcasting single-lane operands.
    pub fn combine(&self, other: &Self) -> Self {
        let count = self.lanes.len().max(other.lanes.len());
        Self::from_lanes((0..count).filter_map(|idx| match (self.lane(idx), other.lane(idx)) {
            (Some(lhs), Some(rhs)) => Some(lhs.combine(rhs)),
            (lane, None) | (None, lane) => lane,
        }))
    }

    pub fn map(&self, f: impl FnMut(D) -> D) -> Self {
        Self::from_lanes(self.lanes.iter().copied().map(f))
    }

    /// Reshapes the shadow to `ty`: matching shapes are kept, a single lane
    /// is broadcast and anything else is collapsed and broadcast.
    pub fn normalize(self, ty: Type) -> Self {
        let count = ty.lanes();
        if self.lanes.len() == count {
            return self;
        }
        match self.collapse() {
            Some(lane) => Self::splat(lane, count),
            None => Self::pessimistic(ty),
        }
    }
}

impl<D: Domain> fmt::Display for ShadowValue<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, lane) in self.lanes.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{lane:?}")?;
        }
        write!(f, "]")
    }
}

/// Collects disagreements between shadows and the concrete results they
/// mirror while one instruction is transferred.
#[derive(Debug)]
pub struct Audit {
    opcode: Opcode,
    enabled: bool,
    failures: Vec<Inconsistency>,
}

impl Audit {
    pub fn new(opcode: Opcode, enabled: bool) -> Self {
        Self {
            opcode,
            enabled,
            failures: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records a failure unless `holds`. The message is only built on failure.
    pub fn check(&mut self, holds: bool, message: impl FnOnce() -> String) {
        if self.enabled && !holds {
            self.failures.push(Inconsistency {
                opcode: self.opcode,
                message: message(),
            });
        }
    }

    pub fn finish(self) -> Result<()> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(ShadowError::Inconsistent(failure)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_combine() {
        let vector: ShadowValue<Taint> =
            ShadowValue::from_lanes([Taint::Clean, Taint::Poisoned, Taint::Clean]);
        let scalar = ShadowValue::splat(Taint::Clean, 1);
        assert_eq!(vector.combine(&scalar), vector);

        let poisoned = ShadowValue::splat(Taint::Poisoned, 1);
        assert_eq!(
            vector.combine(&poisoned),
            ShadowValue::splat(Taint::Poisoned, 3)
        );
    }

    #[test]
    fn normalize_reshapes() {
        let shadow: ShadowValue<Taint> = ShadowValue::from_lanes([Taint::Clean, Taint::Poisoned]);
        let scalar = shadow.clone().normalize(Type::I64);
        assert_eq!(scalar.lanes(), &[Taint::Poisoned]);

        let widened = ShadowValue::splat(Taint::Clean, 1)
            .normalize(Type::vector(ScalarType::I8, 4));
        assert_eq!(widened.num_lanes(), 4);
        assert!(widened.is_defined());
    }

    #[test]
    fn audit_reports_first_failure() {
        let mut audit = Audit::new(Opcode::FCmp, true);
        audit.check(true, || unreachable!());
        audit.check(false, || "first".to_string());
        audit.check(false, || "second".to_string());
        let err = audit.finish().unwrap_err();
        assert_eq!(err.to_string(), "analysis disagrees with execution: `fcmp`: first");
        assert!(err.is_analysis_bug());

        let mut disabled = Audit::new(Opcode::FCmp, false);
        disabled.check(false, || unreachable!());
        assert!(disabled.finish().is_ok());
    }
}

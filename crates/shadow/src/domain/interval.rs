//! Bound tracking: every lane carries a closed interval that contains the
//! concrete value, plus a flag telling whether the value may be NaN.
//!
//! Arithmetic is rounded outward so that an interval computed from input
//! intervals contains every result the concrete operation can produce for
//! inputs drawn from them. Comparisons and casts cross-check the concrete
//! result against the intervals through an [`Audit`].
use std::fmt;

use kshadow_ir::{
    AtomicOp, BinaryOp, CastOp, FloatPredicate, IntPredicate, Scalar, ScalarType, UnaryOp,
};

use super::{Audit, Domain};

const INF: f64 = f64::INFINITY;
const NEG_INF: f64 = f64::NEG_INFINITY;

/// Below this magnitude error terms may underflow and are not trusted.
const TINY: f64 = 1e-280;

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    lo: f64,
    hi: f64,
    nan: bool,
}

impl Interval {
    /// Any value, NaN included.
    pub const UNBOUNDED: Self = Self {
        lo: NEG_INF,
        hi: INF,
        nan: true,
    };

    pub fn new(lo: f64, hi: f64) -> Self {
        Self::with_nan(lo, hi, false)
    }

    /// NaN bounds turn into the NaN flag and an open side.
    fn with_nan(lo: f64, hi: f64, nan: bool) -> Self {
        let (mut lo, mut hi, mut nan) = (lo, hi, nan);
        if lo.is_nan() {
            lo = NEG_INF;
            nan = true;
        }
        if hi.is_nan() {
            hi = INF;
            nan = true;
        }
        Self {
            lo: lo.min(hi),
            hi: hi.max(lo),
            nan,
        }
    }

    pub fn point(value: f64) -> Self {
        if value.is_nan() {
            Self::UNBOUNDED
        } else {
            Self::new(value, value)
        }
    }

    pub fn from_i64(value: i64) -> Self {
        let approx = value as f64;
        if approx as i128 == value as i128 {
            Self::point(approx)
        } else {
            Self::new(next_down(approx), next_up(approx))
        }
    }

    pub fn from_u64(value: u64) -> Self {
        let approx = value as f64;
        if approx as u128 == value as u128 {
            Self::point(approx)
        } else {
            Self::new(next_down(approx), next_up(approx))
        }
    }

    pub fn lo(self) -> f64 {
        self.lo
    }

    pub fn hi(self) -> f64 {
        self.hi
    }

    pub fn may_be_nan(self) -> bool {
        self.nan
    }

    pub fn is_point(self) -> bool {
        !self.nan && self.lo == self.hi
    }

    pub fn is_unbounded(self) -> bool {
        self.lo == NEG_INF && self.hi == INF
    }

    pub fn contains(self, value: f64) -> bool {
        if value.is_nan() {
            self.nan
        } else {
            self.lo <= value && value <= self.hi
        }
    }

    fn straddles_zero(self) -> bool {
        self.lo <= 0.0 && 0.0 <= self.hi
    }

    fn touches_infinity(self) -> bool {
        self.lo == NEG_INF || self.hi == INF
    }

    pub fn hull(self, other: Self) -> Self {
        Self {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
            nan: self.nan || other.nan,
        }
    }

    pub fn neg(self) -> Self {
        Self {
            lo: -self.hi,
            hi: -self.lo,
            nan: self.nan,
        }
    }

    pub fn add(self, rhs: Self) -> Self {
        let (lo, _) = add_bounds(self.lo, rhs.lo);
        let (_, hi) = add_bounds(self.hi, rhs.hi);
        // inf + -inf
        let nan = self.nan
            || rhs.nan
            || (self.lo == NEG_INF && rhs.hi == INF)
            || (self.hi == INF && rhs.lo == NEG_INF);
        Self::with_nan(lo, hi, nan)
    }

    pub fn sub(self, rhs: Self) -> Self {
        self.add(rhs.neg())
    }

    pub fn mul(self, rhs: Self) -> Self {
        let mut nan = self.nan
            || rhs.nan
            || (self.straddles_zero() && rhs.touches_infinity())
            || (rhs.straddles_zero() && self.touches_infinity());
        let (mut lo, mut hi) = (INF, NEG_INF);
        for (a, b) in self.corners(rhs) {
            let (down, up) = mul_bounds(a, b);
            if down.is_nan() {
                // 0 * inf: finite neighbours of the corner yield zero.
                nan = true;
                lo = lo.min(0.0);
                hi = hi.max(0.0);
                continue;
            }
            lo = lo.min(down);
            hi = hi.max(up);
        }
        Self::with_nan(lo, hi, nan)
    }

    pub fn div(self, rhs: Self) -> Self {
        if rhs.straddles_zero() || (rhs.lo == NEG_INF && rhs.hi == INF) {
            return Self::UNBOUNDED;
        }
        let mut nan =
            self.nan || rhs.nan || (self.touches_infinity() && rhs.touches_infinity());
        let (mut lo, mut hi) = (INF, NEG_INF);
        for (a, b) in self.corners(rhs) {
            let (down, up) = div_bounds(a, b);
            if down.is_nan() {
                nan = true;
                continue;
            }
            lo = lo.min(down);
            hi = hi.max(up);
        }
        if lo > hi {
            return Self::UNBOUNDED;
        }
        Self::with_nan(lo, hi, nan)
    }

    fn corners(self, rhs: Self) -> [(f64, f64); 4] {
        [
            (self.lo, rhs.lo),
            (self.lo, rhs.hi),
            (self.hi, rhs.lo),
            (self.hi, rhs.hi),
        ]
    }

    /// Widens the bounds to values representable in `ty`.
    pub fn round_to(self, ty: ScalarType) -> Self {
        match ty {
            ScalarType::F32 => Self {
                lo: down_to_f32(self.lo),
                hi: up_to_f32(self.hi),
                nan: self.nan,
            },
            _ => self,
        }
    }

    /// The interval itself if it fits the signed range of `ty`, the whole
    /// range otherwise (the concrete operation wrapped).
    pub fn clamp_int(self, ty: ScalarType) -> Self {
        match int_limits(ty) {
            Some(limits) if !self.nan && self.lo >= limits.min && self.hi <= limits.fits => self,
            Some(limits) => Self::new(limits.min, limits.max),
            None => self,
        }
    }

    fn settle(self, ty: ScalarType) -> Self {
        if ty.is_float() {
            self.round_to(ty)
        } else {
            self.clamp_int(ty)
        }
    }

    /// `Some(b)` if every pair of values drawn from the intervals compares
    /// `<` as `b`. NaN is not considered.
    pub fn compare_lt(self, rhs: Self) -> Option<bool> {
        if self.hi < rhs.lo {
            Some(true)
        } else if self.lo >= rhs.hi {
            Some(false)
        } else {
            None
        }
    }

    pub fn compare_le(self, rhs: Self) -> Option<bool> {
        if self.hi <= rhs.lo {
            Some(true)
        } else if self.lo > rhs.hi {
            Some(false)
        } else {
            None
        }
    }

    pub fn compare_eq(self, rhs: Self) -> Option<bool> {
        if self.lo == self.hi && rhs.lo == rhs.hi && self.lo == rhs.lo {
            Some(true)
        } else if self.hi < rhs.lo || rhs.hi < self.lo {
            Some(false)
        } else {
            None
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)?;
        if self.nan {
            write!(f, "?nan")?;
        }
        Ok(())
    }
}

impl Domain for Interval {
    fn pessimistic(_: ScalarType) -> Self {
        Self::UNBOUNDED
    }

    fn exact(lane: Scalar) -> Self {
        match lane.ty() {
            ScalarType::F32 | ScalarType::F64 => Self::point(lane.as_f64()),
            ScalarType::Ptr(_) => Self::from_u64(lane.as_uint()),
            _ => Self::from_i64(lane.as_sint()),
        }
    }

    fn opaque(_: ScalarType) -> Self {
        Self::UNBOUNDED
    }

    fn combine(self, other: Self) -> Self {
        self.hull(other)
    }

    /// Bounds never make a value undefined.
    fn is_defined(self) -> bool {
        true
    }

    fn derived(inputs: &[Self], result: Scalar) -> Self {
        if inputs.iter().all(|lane| lane.is_point()) {
            Self::exact(result)
        } else {
            Self::UNBOUNDED
        }
    }

    fn unary(op: UnaryOp, arg: Self, _: Scalar) -> Self {
        match op {
            UnaryOp::FNeg => arg.neg(),
        }
    }

    fn binary(op: BinaryOp, lhs: Self, rhs: Self, result: Scalar) -> Self {
        let ty = result.ty();
        match op {
            BinaryOp::FAdd | BinaryOp::Add => lhs.add(rhs).settle(ty),
            BinaryOp::FSub | BinaryOp::Sub => lhs.sub(rhs).settle(ty),
            BinaryOp::FMul | BinaryOp::Mul => lhs.mul(rhs).settle(ty),
            BinaryOp::FDiv => lhs.div(rhs).round_to(ty),
            _ => Self::derived(&[lhs, rhs], result),
        }
    }

    /// The interpreter may or may not round the product before the add.
    fn mul_add(a: Self, b: Self, c: Self, result: Scalar) -> Self {
        let ty = result.ty();
        let product = a.mul(b);
        let fused = product.add(c);
        let split = product.round_to(ty).add(c);
        fused.hull(split).round_to(ty)
    }

    fn icmp(pred: IntPredicate, lhs: Self, rhs: Self, result: Scalar, audit: &mut Audit) -> Self {
        let comparable = !lhs.nan
            && !rhs.nan
            && (!pred.is_unsigned() || (lhs.lo >= 0.0 && rhs.lo >= 0.0));
        let expected = if !comparable {
            None
        } else {
            match pred {
                IntPredicate::Eq => lhs.compare_eq(rhs),
                IntPredicate::Ne => lhs.compare_eq(rhs).map(|eq| !eq),
                IntPredicate::Slt | IntPredicate::Ult => lhs.compare_lt(rhs),
                IntPredicate::Sle | IntPredicate::Ule => lhs.compare_le(rhs),
                IntPredicate::Sgt | IntPredicate::Ugt => rhs.compare_lt(lhs),
                IntPredicate::Sge | IntPredicate::Uge => rhs.compare_le(lhs),
            }
        };
        verify_comparison(expected, result, audit, || format!("{pred:?} of {lhs} and {rhs}"))
    }

    fn fcmp(
        pred: FloatPredicate,
        lhs: Self,
        rhs: Self,
        result: Scalar,
        audit: &mut Audit,
    ) -> Self {
        let maybe_nan = lhs.nan || rhs.nan;
        let expected = match pred {
            FloatPredicate::False => Some(false),
            FloatPredicate::True => Some(true),
            FloatPredicate::Ord => (!maybe_nan).then_some(true),
            FloatPredicate::Uno => (!maybe_nan).then_some(false),
            // A NaN operand decides the result on its own.
            _ if maybe_nan => None,
            FloatPredicate::Oeq | FloatPredicate::Ueq => lhs.compare_eq(rhs),
            FloatPredicate::One | FloatPredicate::Une => lhs.compare_eq(rhs).map(|eq| !eq),
            FloatPredicate::Olt | FloatPredicate::Ult => lhs.compare_lt(rhs),
            FloatPredicate::Ole | FloatPredicate::Ule => lhs.compare_le(rhs),
            FloatPredicate::Ogt | FloatPredicate::Ugt => rhs.compare_lt(lhs),
            FloatPredicate::Oge | FloatPredicate::Uge => rhs.compare_le(lhs),
        };
        verify_comparison(expected, result, audit, || format!("{pred:?} of {lhs} and {rhs}"))
    }

    fn cast(op: CastOp, arg: Self, from: ScalarType, result: Scalar, audit: &mut Audit) -> Self {
        let to = result.ty();
        let out = match op {
            CastOp::FPToSI | CastOp::FPToUI => {
                let full = int_full_range(to);
                if arg.nan || arg.touches_infinity() {
                    return full;
                }
                let truncated = Self::new(arg.lo.trunc(), arg.hi.trunc());
                let (min, max) = match int_limits(to) {
                    Some(limits) => (limits.min, limits.fits),
                    None => return full,
                };
                let min = if op == CastOp::FPToUI { 0.0 } else { min };
                if truncated.lo < min {
                    // Out of range: the concrete result is unspecified.
                    return full;
                }
                if truncated.hi > max {
                    if op == CastOp::FPToUI && truncated.hi <= unsigned_max(to) {
                        // Only the unsigned reading of the result is meaningful.
                        audit.check(truncated.contains(result.as_uint() as f64), || {
                            format!("{op:?} of {arg} produced {result}")
                        });
                    }
                    return full;
                }
                truncated
            }
            CastOp::SIToFP => arg.round_to(to),
            CastOp::UIToFP => {
                let unsigned = if arg.nan || arg.lo < 0.0 {
                    Self::new(0.0, unsigned_max(from))
                } else {
                    arg
                };
                unsigned.round_to(to)
            }
            CastOp::FPExt => arg,
            CastOp::FPTrunc => arg.round_to(to),
            CastOp::SExt => arg,
            CastOp::ZExt => {
                if !arg.nan && arg.lo >= 0.0 {
                    arg
                } else {
                    Self::new(0.0, unsigned_max(from))
                }
            }
            CastOp::Trunc => arg.clamp_int(to),
            CastOp::PtrToInt | CastOp::IntToPtr | CastOp::BitCast | CastOp::AddrSpaceCast => {
                return Self::derived(&[arg], result);
            }
        };

        audit.check(out.contains(result.as_f64()), || {
            format!("{op:?} of {arg} produced {result}, outside {out}")
        });
        out
    }

    fn atomic(op: AtomicOp, old: Self, operand: Option<Self>, ty: ScalarType) -> Self {
        let one = Self::point(1.0);
        match (op, operand) {
            (AtomicOp::Inc, _) => old.add(one).settle(ty),
            (AtomicOp::Dec, _) => old.sub(one).settle(ty),
            (AtomicOp::Add, Some(x)) => old.add(x).settle(ty),
            (AtomicOp::Sub, Some(x)) => old.sub(x).settle(ty),
            (AtomicOp::Xchg, Some(x)) => x,
            (AtomicOp::Min, Some(x)) => {
                Self::with_nan(old.lo.min(x.lo), old.hi.min(x.hi), old.nan || x.nan)
            }
            (AtomicOp::Max, Some(x)) => {
                Self::with_nan(old.lo.max(x.lo), old.hi.max(x.hi), old.nan || x.nan)
            }
            (_, Some(_)) => int_full_range(ty),
            (_, None) => old,
        }
    }

    /// The concrete path is followed, so the chosen lane stays as it is.
    fn depend_on(self, _: Self) -> Self {
        self
    }

    fn fill(byte: Self) -> Self {
        if byte.is_point() && byte.lo == 0.0 {
            Self::point(0.0)
        } else {
            Self::UNBOUNDED
        }
    }

    /// Only all-zero bytes keep a meaning across shapes.
    fn from_bytes(bytes: &[Self], ty: ScalarType) -> Self {
        let zero = |byte: &Self| byte.is_point() && byte.lo.to_bits() == 0;
        if !bytes.is_empty() && bytes.iter().all(zero) {
            Self::point(0.0)
        } else {
            int_full_range(ty)
        }
    }
}

fn verify_comparison(
    expected: Option<bool>,
    result: Scalar,
    audit: &mut Audit,
    describe: impl FnOnce() -> String,
) -> Interval {
    let actual = result.as_bool();
    match expected {
        Some(expected) => {
            audit.check(expected == actual, || {
                format!("{} evaluated to {actual}, bounds imply {expected}", describe())
            });
            Interval::exact(result)
        }
        None => Interval::new(0.0, 1.0),
    }
}

/// Signed range of an integer type. `i1` is read as `0..=1`.
#[derive(Debug, Clone, Copy)]
struct IntLimits {
    min: f64,
    /// Largest `f64` not above the maximum.
    fits: f64,
    /// Smallest `f64` not below the maximum.
    max: f64,
}

fn int_limits(ty: ScalarType) -> Option<IntLimits> {
    let exact = |min: f64, max: f64| IntLimits { min, fits: max, max };
    match ty {
        ScalarType::I1 => Some(exact(0.0, 1.0)),
        ScalarType::I8 => Some(exact(i8::MIN as f64, i8::MAX as f64)),
        ScalarType::I16 => Some(exact(i16::MIN as f64, i16::MAX as f64)),
        ScalarType::I32 => Some(exact(i32::MIN as f64, i32::MAX as f64)),
        // `i64::MAX` sits between two doubles.
        ScalarType::I64 => Some(IntLimits {
            min: i64::MIN as f64,
            fits: next_down(TWO_POW_63),
            max: TWO_POW_63,
        }),
        _ => None,
    }
}

fn int_full_range(ty: ScalarType) -> Interval {
    match int_limits(ty) {
        Some(limits) => Interval::new(limits.min, limits.max),
        None => Interval::UNBOUNDED,
    }
}

fn unsigned_max(ty: ScalarType) -> f64 {
    match ty.bits() {
        64 => 18_446_744_073_709_551_616.0,
        bits => ((1u64 << bits) - 1) as f64,
    }
}

fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == INF {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    f64::from_bits(if x > 0.0 { bits + 1 } else { bits - 1 })
}

fn next_down(x: f64) -> f64 {
    -next_up(-x)
}

fn next_up_f32(x: f32) -> f32 {
    if x.is_nan() || x == f32::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f32::from_bits(1);
    }
    let bits = x.to_bits();
    f32::from_bits(if x > 0.0 { bits + 1 } else { bits - 1 })
}

fn next_down_f32(x: f32) -> f32 {
    -next_up_f32(-x)
}

fn down_to_f32(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let narrowed = x as f32;
    if narrowed as f64 > x {
        next_down_f32(narrowed) as f64
    } else {
        narrowed as f64
    }
}

fn up_to_f32(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let narrowed = x as f32;
    if (narrowed as f64) < x {
        next_up_f32(narrowed) as f64
    } else {
        narrowed as f64
    }
}

/// Bounds of the exact value `rounded + err`.
fn bracket(rounded: f64, err: f64) -> (f64, f64) {
    if !err.is_finite() {
        (next_down(rounded), next_up(rounded))
    } else if err > 0.0 {
        (rounded, next_up(rounded))
    } else if err < 0.0 {
        (next_down(rounded), rounded)
    } else {
        (rounded, rounded)
    }
}

/// Bounds of a finite result that overflowed to infinity.
fn overflowed(rounded: f64) -> (f64, f64) {
    if rounded > 0.0 {
        (f64::MAX, INF)
    } else {
        (NEG_INF, -f64::MAX)
    }
}

/// Lower and upper bound of the exact sum `a + b`. NaN if undefined.
fn add_bounds(a: f64, b: f64) -> (f64, f64) {
    let sum = a + b;
    if a.is_infinite() || b.is_infinite() || sum.is_nan() {
        return (sum, sum);
    }
    if sum.is_infinite() {
        return overflowed(sum);
    }
    // TwoSum recovers the rounding error exactly.
    let b_virtual = sum - a;
    let err = (a - (sum - b_virtual)) + (b - b_virtual);
    bracket(sum, err)
}

fn mul_bounds(a: f64, b: f64) -> (f64, f64) {
    let product = a * b;
    if a.is_infinite() || b.is_infinite() || product.is_nan() || a == 0.0 || b == 0.0 {
        return (product, product);
    }
    if product.is_infinite() {
        return overflowed(product);
    }
    if product.abs() < TINY {
        return (next_down(product), next_up(product));
    }
    bracket(product, a.mul_add(b, -product))
}

fn div_bounds(a: f64, b: f64) -> (f64, f64) {
    let quotient = a / b;
    if a.is_infinite() || b.is_infinite() || quotient.is_nan() || a == 0.0 {
        return (quotient, quotient);
    }
    if quotient.is_infinite() {
        return overflowed(quotient);
    }
    if quotient.abs() < TINY || a.abs() < TINY {
        return (next_down(quotient), next_up(quotient));
    }
    // a / b - q == -(q * b - a) / b
    let residual = quotient.mul_add(b, -a);
    bracket(quotient, if b > 0.0 { -residual } else { residual })
}

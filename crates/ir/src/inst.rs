//! This module contains decoded instruction descriptors.
use std::fmt;

use cranelift_entity::entity_impl;
use smallvec::SmallVec;

use crate::{
    types::{AddressSpace, Type},
    value::{Operand, ValueId},
};

/// An opaque reference to a basic block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);
entity_impl!(BlockId, "block");

/// An opaque reference to a function.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncRef(pub u32);
entity_impl!(FuncRef, "func");

/// Source position of an instruction, if the program carries debug info.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLoc {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// One retired instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    /// Identity of the produced value, if any.
    pub result: Option<ValueId>,
    /// Type of the produced value, `Void` if none.
    pub ty: Type,
    pub data: InstData,
    pub loc: Option<SourceLoc>,
}

impl Inst {
    pub fn new(result: Option<ValueId>, ty: Type, data: InstData) -> Self {
        Self {
            result,
            ty,
            data,
            loc: None,
        }
    }

    /// An instruction without a result.
    pub fn effect(data: InstData) -> Self {
        Self::new(None, Type::Void, data)
    }

    pub fn with_loc(mut self, loc: SourceLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.data.opcode()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstData {
    Binary {
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    },
    Unary {
        op: UnaryOp,
        arg: Operand,
    },
    ICmp {
        pred: IntPredicate,
        lhs: Operand,
        rhs: Operand,
    },
    FCmp {
        pred: FloatPredicate,
        lhs: Operand,
        rhs: Operand,
    },
    Cast {
        op: CastOp,
        arg: Operand,
    },
    Alloca {
        allocated: Type,
    },
    Load {
        addr: Operand,
        space: AddressSpace,
        atomic: bool,
    },
    Store {
        addr: Operand,
        value: Operand,
        space: AddressSpace,
        atomic: bool,
    },
    Gep {
        base: Operand,
        indices: SmallVec<[Operand; 2]>,
        space: AddressSpace,
        /// Type of the addressed element.
        pointee: Type,
    },
    Phi {
        incoming: SmallVec<[(BlockId, Operand); 2]>,
    },
    Select {
        cond: Operand,
        on_true: Operand,
        on_false: Operand,
    },
    Br {
        cond: Option<Operand>,
    },
    Switch {
        cond: Operand,
    },
    Ret {
        value: Option<Operand>,
    },
    Call {
        callee: FuncRef,
        args: Vec<CallArg>,
        /// Parameters of the callee, in argument order.
        params: Vec<ValueId>,
        /// The callee has no body; no frame is pushed.
        external: bool,
    },
    Intrinsic {
        kind: Intrinsic,
        args: SmallVec<[Operand; 4]>,
    },
    Atomic {
        op: AtomicOp,
        addr: Operand,
        space: AddressSpace,
        /// The operand of the update; `[cmp, new]` for `CmpXchg`, empty for
        /// `Inc`/`Dec`.
        args: SmallVec<[Operand; 2]>,
    },
    ExtractElement {
        vector: Operand,
        index: Operand,
    },
    InsertElement {
        vector: Operand,
        element: Operand,
        index: Operand,
    },
    ShuffleVector {
        lhs: Operand,
        rhs: Operand,
        mask: Operand,
    },
    ExtractValue {
        aggregate: Operand,
        indices: SmallVec<[u32; 2]>,
    },
    InsertValue {
        aggregate: Operand,
        element: Operand,
        indices: SmallVec<[u32; 2]>,
    },
    VaArg {
        list: Operand,
    },
    Fence,
    Unreachable,
}

impl InstData {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Binary { op, .. } => Opcode::Binary(*op),
            Self::Unary { op, .. } => Opcode::Unary(*op),
            Self::ICmp { .. } => Opcode::ICmp,
            Self::FCmp { .. } => Opcode::FCmp,
            Self::Cast { op, .. } => Opcode::Cast(*op),
            Self::Alloca { .. } => Opcode::Alloca,
            Self::Load { .. } => Opcode::Load,
            Self::Store { .. } => Opcode::Store,
            Self::Gep { .. } => Opcode::Gep,
            Self::Phi { .. } => Opcode::Phi,
            Self::Select { .. } => Opcode::Select,
            Self::Br { .. } => Opcode::Br,
            Self::Switch { .. } => Opcode::Switch,
            Self::Ret { .. } => Opcode::Ret,
            Self::Call { .. } => Opcode::Call,
            Self::Intrinsic { .. } => Opcode::Intrinsic,
            Self::Atomic { op, .. } => Opcode::Atomic(*op),
            Self::ExtractElement { .. } => Opcode::ExtractElement,
            Self::InsertElement { .. } => Opcode::InsertElement,
            Self::ShuffleVector { .. } => Opcode::ShuffleVector,
            Self::ExtractValue { .. } => Opcode::ExtractValue,
            Self::InsertValue { .. } => Opcode::InsertValue,
            Self::VaArg { .. } => Opcode::VaArg,
            Self::Fence => Opcode::Fence,
            Self::Unreachable => Opcode::Unreachable,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    pub operand: Operand,
    /// For arguments passed through a hidden pointer to a caller-owned
    /// copy, the type of the pointee.
    pub byval: Option<Type>,
}

impl CallArg {
    pub fn by_value(operand: Operand) -> Self {
        Self {
            operand,
            byval: None,
        }
    }

    pub fn by_pointer(operand: Operand, pointee: Type) -> Self {
        Self {
            operand,
            byval: Some(pointee),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl BinaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::SDiv => "sdiv",
            Self::UDiv => "udiv",
            Self::SRem => "srem",
            Self::URem => "urem",
            Self::Shl => "shl",
            Self::LShr => "lshr",
            Self::AShr => "ashr",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::FAdd => "fadd",
            Self::FSub => "fsub",
            Self::FMul => "fmul",
            Self::FDiv => "fdiv",
            Self::FRem => "frem",
        }
    }

    pub const fn is_shift(self) -> bool {
        matches!(self, Self::Shl | Self::LShr | Self::AShr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    FNeg,
}

impl UnaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FNeg => "fneg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

impl IntPredicate {
    pub const fn is_unsigned(self) -> bool {
        matches!(self, Self::Ugt | Self::Uge | Self::Ult | Self::Ule)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatPredicate {
    False,
    Oeq,
    Ogt,
    Oge,
    Olt,
    Ole,
    One,
    Ord,
    Uno,
    Ueq,
    Ugt,
    Uge,
    Ult,
    Ule,
    Une,
    True,
}

impl FloatPredicate {
    /// Predicates that are false whenever an operand is NaN.
    pub const fn is_ordered(self) -> bool {
        matches!(
            self,
            Self::Oeq | Self::Ogt | Self::Oge | Self::Olt | Self::Ole | Self::One | Self::Ord
        )
    }

    /// Predicates that are true whenever an operand is NaN.
    pub const fn is_unordered(self) -> bool {
        matches!(
            self,
            Self::Ueq | Self::Ugt | Self::Uge | Self::Ult | Self::Ule | Self::Une | Self::Uno
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    FPTrunc,
    FPExt,
    FPToUI,
    FPToSI,
    UIToFP,
    SIToFP,
    PtrToInt,
    IntToPtr,
    BitCast,
    AddrSpaceCast,
}

impl CastOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trunc => "trunc",
            Self::ZExt => "zext",
            Self::SExt => "sext",
            Self::FPTrunc => "fptrunc",
            Self::FPExt => "fpext",
            Self::FPToUI => "fptoui",
            Self::FPToSI => "fptosi",
            Self::UIToFP => "uitofp",
            Self::SIToFP => "sitofp",
            Self::PtrToInt => "ptrtoint",
            Self::IntToPtr => "inttoptr",
            Self::BitCast => "bitcast",
            Self::AddrSpaceCast => "addrspacecast",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicOp {
    Add,
    Sub,
    Xchg,
    Inc,
    Dec,
    Min,
    Max,
    UMin,
    UMax,
    And,
    Or,
    Xor,
    CmpXchg,
}

impl AtomicOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Xchg => "xchg",
            Self::Inc => "inc",
            Self::Dec => "dec",
            Self::Min => "min",
            Self::Max => "max",
            Self::UMin => "umin",
            Self::UMax => "umax",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::CmpXchg => "cmpxchg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    DbgDeclare,
    DbgValue,
    LifetimeStart,
    LifetimeEnd,
    /// `a * b + c`, args `[a, b, c]`.
    FMulAdd,
    /// args `[dst, src, len]`.
    Memcpy,
    /// args `[dst, byte, len]`.
    Memset,
    Other(String),
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DbgDeclare => "llvm.dbg.declare".fmt(f),
            Self::DbgValue => "llvm.dbg.value".fmt(f),
            Self::LifetimeStart => "llvm.lifetime.start".fmt(f),
            Self::LifetimeEnd => "llvm.lifetime.end".fmt(f),
            Self::FMulAdd => "llvm.fmuladd".fmt(f),
            Self::Memcpy => "llvm.memcpy".fmt(f),
            Self::Memset => "llvm.memset".fmt(f),
            Self::Other(name) => name.fmt(f),
        }
    }
}

/// Names an instruction kind for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Binary(BinaryOp),
    Unary(UnaryOp),
    ICmp,
    FCmp,
    Cast(CastOp),
    Alloca,
    Load,
    Store,
    Gep,
    Phi,
    Select,
    Br,
    Switch,
    Ret,
    Call,
    Intrinsic,
    Atomic(AtomicOp),
    ExtractElement,
    InsertElement,
    ShuffleVector,
    ExtractValue,
    InsertValue,
    VaArg,
    Fence,
    Unreachable,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary(op) => op.as_str().fmt(f),
            Self::Unary(op) => op.as_str().fmt(f),
            Self::ICmp => "icmp".fmt(f),
            Self::FCmp => "fcmp".fmt(f),
            Self::Cast(op) => op.as_str().fmt(f),
            Self::Alloca => "alloca".fmt(f),
            Self::Load => "load".fmt(f),
            Self::Store => "store".fmt(f),
            Self::Gep => "getelementptr".fmt(f),
            Self::Phi => "phi".fmt(f),
            Self::Select => "select".fmt(f),
            Self::Br => "br".fmt(f),
            Self::Switch => "switch".fmt(f),
            Self::Ret => "ret".fmt(f),
            Self::Call => "call".fmt(f),
            Self::Intrinsic => "intrinsic".fmt(f),
            Self::Atomic(op) => write!(f, "atomic.{}", op.as_str()),
            Self::ExtractElement => "extractelement".fmt(f),
            Self::InsertElement => "insertelement".fmt(f),
            Self::ShuffleVector => "shufflevector".fmt(f),
            Self::ExtractValue => "extractvalue".fmt(f),
            Self::InsertValue => "insertvalue".fmt(f),
            Self::VaArg => "va_arg".fmt(f),
            Self::Fence => "fence".fmt(f),
            Self::Unreachable => "unreachable".fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypedValue;

    #[test]
    fn opcode_names() {
        let inst = Inst::new(
            Some(ValueId(3)),
            Type::F32,
            InstData::Binary {
                op: BinaryOp::FAdd,
                lhs: TypedValue::f32(1.0).into(),
                rhs: TypedValue::f32(2.0).into(),
            },
        );
        assert_eq!(inst.opcode().to_string(), "fadd");
        assert_eq!(Opcode::Atomic(AtomicOp::CmpXchg).to_string(), "atomic.cmpxchg");
        assert_eq!(
            InstData::ExtractValue {
                aggregate: Operand::Undef(Type::Aggregate { size: 8 }),
                indices: SmallVec::new(),
            }
            .opcode()
            .to_string(),
            "extractvalue"
        );
    }

    #[test]
    fn predicate_classes() {
        assert!(FloatPredicate::Olt.is_ordered());
        assert!(FloatPredicate::Ult.is_unordered());
        assert!(!FloatPredicate::True.is_ordered());
        assert!(!FloatPredicate::False.is_unordered());
        assert!(IntPredicate::Ule.is_unsigned());
    }
}

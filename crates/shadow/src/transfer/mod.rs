//! Per-instruction shadow propagation.
//!
//! A [`Transfer`] runs once per retired instruction: it reads the operand
//! shadows of the executing item, applies the domain rules for the opcode and
//! writes the result shadow back.
use kshadow_ir::{AddressSpace, Inst, InstData, ItemState, Operand, Scalar, Type, TypedValue};

use crate::{
    context::ShadowContext,
    diagnostic::{Defect, DefectKind},
    domain::{Audit, Domain},
    memory::ShadowMemory,
    scope::{GroupShadow, ItemShadow},
    Result, ShadowError, ShadowValue,
};

mod arith;
mod atomic;
mod cast;
mod cmp;
mod control_flow;
mod data;
mod intrinsic;
mod vector;

pub(crate) struct Transfer<'a, D: Domain> {
    ctx: &'a ShadowContext<D>,
    item: &'a mut ItemShadow<D>,
    group: Option<&'a mut GroupShadow<D>>,
    state: &'a dyn ItemState,
    inst: &'a Inst,
    /// The concrete result of `inst`.
    result: &'a TypedValue,
    audit: Audit,
}

impl<'a, D: Domain> Transfer<'a, D> {
    pub(crate) fn new(
        ctx: &'a ShadowContext<D>,
        item: &'a mut ItemShadow<D>,
        group: Option<&'a mut GroupShadow<D>>,
        state: &'a dyn ItemState,
        inst: &'a Inst,
        result: &'a TypedValue,
    ) -> Self {
        let audit = Audit::new(inst.opcode(), ctx.config().should_check_consistency());
        Self {
            ctx,
            item,
            group,
            state,
            inst,
            result,
            audit,
        }
    }

    pub(crate) fn run(mut self) -> Result<()> {
        let inst = self.inst;
        match &inst.data {
            InstData::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs)?,
            InstData::Unary { op, arg } => self.unary(*op, arg)?,
            InstData::ICmp { pred, lhs, rhs } => self.icmp(*pred, lhs, rhs)?,
            InstData::FCmp { pred, lhs, rhs } => self.fcmp(*pred, lhs, rhs)?,
            InstData::Cast { op, arg } => self.cast(*op, arg)?,

            InstData::Alloca { allocated } => self.alloca(*allocated)?,
            InstData::Load {
                addr,
                space,
                atomic,
            } => self.load(addr, *space, *atomic)?,
            InstData::Store {
                addr,
                value,
                space,
                atomic,
            } => self.store(addr, value, *space, *atomic)?,
            InstData::Gep { base, indices, .. } => self.gep(base, indices)?,

            InstData::Phi { incoming } => self.phi(incoming)?,
            InstData::Select {
                cond,
                on_true,
                on_false,
            } => self.select(cond, on_true, on_false)?,
            InstData::Br { cond } => {
                if let Some(cond) = cond {
                    self.branch(cond)?;
                }
            }
            InstData::Switch { cond } => self.branch(cond)?,
            InstData::Call {
                callee,
                args,
                params,
                external,
            } => self.call(*callee, args, params, *external)?,
            InstData::Ret { value } => self.ret(value.as_ref())?,

            InstData::Intrinsic { kind, args } => self.intrinsic(kind, args)?,
            InstData::Atomic {
                op,
                addr,
                space,
                args,
            } => self.atomic(*op, addr, *space, args)?,

            InstData::ExtractElement { vector, index } => self.extract_element(vector, index)?,
            InstData::InsertElement {
                vector,
                element,
                index,
            } => self.insert_element(vector, element, index)?,
            InstData::ShuffleVector { lhs, rhs, mask } => self.shuffle_vector(lhs, rhs, mask)?,

            InstData::Fence => {}
            InstData::Unreachable => return Err(ShadowError::Unreachable),

            _ => return Err(ShadowError::UnimplementedOpcode(inst.opcode())),
        }

        self.audit.finish()
    }

    /// The shadow of `operand` as seen by the active frame.
    fn value(&self, operand: &Operand) -> Result<ShadowValue<D>> {
        match operand {
            Operand::Value { id, .. } => {
                if let Some(shadow) = self.item.frames.top()?.values.get(*id) {
                    return Ok(shadow.clone());
                }
                self.ctx
                    .globals()
                    .get(*id)
                    .cloned()
                    .ok_or(ShadowError::UnboundValue(*id))
            }
            Operand::Const(value) => Ok(ShadowValue::exact(value)),
            Operand::Undef(ty) => Ok(ShadowValue::pessimistic(*ty)),
        }
    }

    fn concrete(&self, operand: &Operand) -> Result<TypedValue> {
        match operand {
            Operand::Value { id, .. } => self
                .state
                .lookup_val(*id)
                .ok_or(ShadowError::MissingConcrete(*id)),
            Operand::Const(value) => Ok(value.clone()),
            Operand::Undef(ty) => Ok(TypedValue::zeroed(*ty)),
        }
    }

    fn address(&self, operand: &Operand) -> Result<u64> {
        Ok(self.concrete(operand)?.first().as_address())
    }

    fn set_result(&mut self, shadow: ShadowValue<D>) -> Result<()> {
        if let Some(id) = self.inst.result {
            let shadow = shadow.normalize(self.inst.ty);
            self.item.frames.top_mut()?.values.set(id, shadow);
        }
        Ok(())
    }

    /// Result lanes built from the concrete result lanes.
    fn result_lanes(&self, mut lane: impl FnMut(usize, Scalar) -> D) -> ShadowValue<D> {
        ShadowValue::from_lanes(
            self.result
                .iter_lanes()
                .enumerate()
                .map(|(idx, result)| lane(idx, result)),
        )
    }

    fn report(&self, kind: DefectKind) {
        self.ctx.report(Defect {
            kind,
            kernel: self.ctx.kernel_name().to_string(),
            item: self.item.id,
            group: self.item.group,
            loc: self.inst.loc.clone(),
        });
    }

    /// Reports `kind` unless `shadow` is fully defined.
    fn require_defined(&self, shadow: &ShadowValue<D>, kind: DefectKind) {
        if !shadow.is_defined() {
            self.report(kind);
        }
    }

    fn memory(&self, space: AddressSpace) -> Result<&ShadowMemory<D>> {
        match space {
            AddressSpace::Private => Ok(&self.item.private),
            AddressSpace::Local => self
                .group
                .as_deref()
                .map(|group| &group.local)
                .ok_or(ShadowError::UnknownWorkGroup(self.item.group)),
            AddressSpace::Global => Ok(self.ctx.global_memory()),
            AddressSpace::Constant => Err(ShadowError::NoShadowStorage(space)),
        }
    }

    /// Reads a `ty` value at `address`. `concrete` is what the
    /// interpreter read there, if known.
    fn load_shadow(
        &self,
        space: AddressSpace,
        address: u64,
        ty: Type,
        concrete: Option<&TypedValue>,
    ) -> Result<ShadowValue<D>> {
        let shadow = match space {
            AddressSpace::Constant => match concrete {
                Some(value) => ShadowValue::exact(value),
                None => ShadowValue::opaque(ty),
            },
            AddressSpace::Global => self.ctx.load_global(address, ty, concrete)?,
            _ => self.memory(space)?.load(address, ty)?,
        };
        Ok(shadow.normalize(ty))
    }

    fn store_shadow(
        &self,
        space: AddressSpace,
        address: u64,
        ty: Type,
        shadow: ShadowValue<D>,
    ) -> Result<()> {
        match space {
            AddressSpace::Constant => Ok(()),
            AddressSpace::Global => self.ctx.store_global(address, ty, shadow),
            _ => self.memory(space)?.store(address, ty, shadow),
        }
    }
}

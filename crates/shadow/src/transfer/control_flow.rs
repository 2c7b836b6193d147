use kshadow_ir::{AddressSpace, BlockId, CallArg, FuncRef, Operand, ScalarType, Type, ValueId};

use super::Transfer;
use crate::{
    diagnostic::DefectKind, domain::Domain, Result, ShadowError, ShadowValue,
};

impl<D: Domain> Transfer<'_, D> {
    /// Conditional branches and switches only check their condition.
    pub(super) fn branch(&mut self, cond: &Operand) -> Result<()> {
        let shadow = self.value(cond)?;
        self.require_defined(&shadow, DefectKind::UninitializedCondition);
        Ok(())
    }

    pub(super) fn phi(&mut self, incoming: &[(BlockId, Operand)]) -> Result<()> {
        let prev = self.state.prev_block().ok_or(ShadowError::MissingIncoming)?;
        let (_, value) = incoming
            .iter()
            .find(|(block, _)| *block == prev)
            .ok_or(ShadowError::MissingIncoming)?;
        let shadow = self.value(value)?;
        self.set_result(shadow)
    }

    pub(super) fn select(
        &mut self,
        cond: &Operand,
        on_true: &Operand,
        on_false: &Operand,
    ) -> Result<()> {
        let lane_ty = self.inst.ty.lane_type();
        let cond_shadow = self.value(cond)?;
        let cond_value = self.concrete(cond)?;
        let on_true = self.value(on_true)?;
        let on_false = self.value(on_false)?;

        let shadow = self.result_lanes(|idx, _| {
            let cond_idx = if cond_value.lanes() == 1 { 0 } else { idx };
            let chosen = if cond_value.lane(cond_idx).as_bool() {
                on_true.lane_or_default(idx, lane_ty)
            } else {
                on_false.lane_or_default(idx, lane_ty)
            };
            chosen.depend_on(cond_shadow.lane_or_default(cond_idx, ScalarType::I1))
        });
        self.set_result(shadow)
    }

    pub(super) fn call(
        &mut self,
        callee: FuncRef,
        args: &[CallArg],
        params: &[ValueId],
        external: bool,
    ) -> Result<()> {
        if external {
            let mut inputs = Vec::with_capacity(args.len());
            for arg in args.iter().filter(|arg| arg.operand.ty().is_sized()) {
                inputs.extend(self.value(&arg.operand)?.collapse());
            }
            let shadow = self.result_lanes(|_, result| D::derived(&inputs, result));
            return self.set_result(shadow);
        }

        // Read everything from the caller frame before the callee frame
        // shadows it.
        let mut bindings = Vec::with_capacity(params.len());
        for (arg, &param) in args.iter().zip(params) {
            if !arg.operand.ty().is_sized() {
                continue;
            }

            if let Some(pointee) = arg.byval {
                let src = self.address(&arg.operand)?;
                let space = arg.operand.ty().pointer_space().unwrap_or(AddressSpace::Private);
                let copy = self
                    .state
                    .lookup_val(param)
                    .ok_or(ShadowError::MissingConcrete(param))?;
                self.clone_byval(space, src, copy.first().as_address(), pointee)?;
                // The hidden pointer itself is always defined.
                bindings.push((param, ShadowValue::exact(&copy)));
            } else {
                bindings.push((param, self.value(&arg.operand)?));
            }
        }

        let frame = self.item.frames.push(self.inst.result, Some(callee));
        for (param, shadow) in bindings {
            frame.values.bind(param, shadow)?;
        }
        tracing::trace!(%callee, depth = self.item.frames.depth(), "enter call");
        Ok(())
    }

    pub(super) fn ret(&mut self, value: Option<&Operand>) -> Result<()> {
        let shadow = value
            .map(|value| Ok::<_, ShadowError>(self.value(value)?.normalize(value.ty())))
            .transpose()?;

        // Returning from the kernel entry point ends the item; its frame
        // goes away with the item.
        if self.item.frames.depth() <= 1 {
            return Ok(());
        }

        let frame = self.item.frames.pop()?;
        if let (Some(call_site), Some(shadow)) = (frame.call_site, shadow) {
            self.item.frames.top_mut()?.values.set(call_site, shadow);
        }
        tracing::trace!(callee = ?frame.callee, depth = self.item.frames.depth(), "return");
        Ok(())
    }

    /// Shadows the callee's private copy at `dst` of the `pointee` at `src`,
    /// byte for byte.
    fn clone_byval(&self, space: AddressSpace, src: u64, dst: u64, pointee: Type) -> Result<()> {
        let len = pointee.size() as u64;
        let private = &self.item.private;
        private.allocate(dst, pointee);
        let copied = match space {
            AddressSpace::Constant => {
                private.fill_range(dst, len, D::opaque(ScalarType::I8));
                len as usize
            }
            AddressSpace::Global => {
                let ctx = self.ctx;
                private.fill_with(dst, len, |offset| {
                    ctx.global_background(src.wrapping_add(offset))
                })?;
                private.copy_from(ctx.global_memory(), src, dst, len)
            }
            _ => private.copy_from(self.memory(space)?, src, dst, len),
        };
        tracing::trace!(
            src = format_args!("{src:#x}"),
            dst = format_args!("{dst:#x}"),
            len,
            copied,
            "byval copy"
        );
        Ok(())
    }
}

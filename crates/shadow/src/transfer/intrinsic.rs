use kshadow_ir::{AddressSpace, Intrinsic, Operand, ScalarType};

use super::Transfer;
use crate::{
    diagnostic::DefectKind, domain::Domain, memory::ShadowMemory, Result, ShadowError,
};

impl<D: Domain> Transfer<'_, D> {
    pub(super) fn intrinsic(&mut self, kind: &Intrinsic, args: &[Operand]) -> Result<()> {
        match (kind, args) {
            (
                Intrinsic::DbgDeclare
                | Intrinsic::DbgValue
                | Intrinsic::LifetimeStart
                | Intrinsic::LifetimeEnd,
                _,
            ) => Ok(()),
            (Intrinsic::FMulAdd, [a, b, c]) => self.fmuladd(a, b, c),
            (Intrinsic::Memcpy, [dst, src, len]) => self.memcpy(dst, src, len),
            (Intrinsic::Memset, [dst, byte, len]) => self.memset(dst, byte, len),
            (Intrinsic::Other(name), _) => Err(ShadowError::UnsupportedIntrinsic(name.clone())),
            _ => Err(ShadowError::MalformedInstruction(self.inst.opcode())),
        }
    }

    fn fmuladd(&mut self, a: &Operand, b: &Operand, c: &Operand) -> Result<()> {
        let ty = a.ty().lane_type();
        let a = self.value(a)?;
        let b = self.value(b)?;
        let c = self.value(c)?;

        let shadow = self.result_lanes(|idx, result| {
            D::mul_add(
                a.lane_or_default(idx, ty),
                b.lane_or_default(idx, ty),
                c.lane_or_default(idx, ty),
                result,
            )
        });
        self.set_result(shadow)
    }

    fn memcpy(&mut self, dst: &Operand, src: &Operand, len: &Operand) -> Result<()> {
        let dst_space = self.pointer_space(dst)?;
        let src_space = self.pointer_space(src)?;
        let dst_addr = self.checked_address(dst, dst_space)?;
        let src_addr = self.checked_address(src, src_space)?;
        let len = self.concrete(len)?.first().as_uint();

        let Some(target) = self.writable(dst_space, dst_addr)? else {
            return Ok(());
        };

        // Bytes the source never shadowed take its background, the rest
        // are copied byte for byte.
        let ctx = self.ctx;
        match src_space {
            AddressSpace::Constant => target.fill_range(dst_addr, len, D::opaque(ScalarType::I8)),
            AddressSpace::Global => target.fill_with(dst_addr, len, |offset| {
                ctx.global_background(src_addr.wrapping_add(offset))
            })?,
            AddressSpace::Private | AddressSpace::Local => {
                target.fill_range(dst_addr, len, D::pessimistic(ScalarType::I8))
            }
        }
        if src_space != AddressSpace::Constant {
            let copied = target.copy_from(self.memory(src_space)?, src_addr, dst_addr, len);
            tracing::trace!(len, copied, "memcpy");
        }
        Ok(())
    }

    fn memset(&mut self, dst: &Operand, byte: &Operand, len: &Operand) -> Result<()> {
        let dst_space = self.pointer_space(dst)?;
        let dst_addr = self.checked_address(dst, dst_space)?;
        let byte = self
            .value(byte)?
            .collapse()
            .unwrap_or_else(|| D::pessimistic(ScalarType::I8));
        let len = self.concrete(len)?.first().as_uint();

        if let Some(target) = self.writable(dst_space, dst_addr)? {
            target.fill_range(dst_addr, len, D::fill(byte));
        }
        Ok(())
    }

    fn pointer_space(&self, pointer: &Operand) -> Result<AddressSpace> {
        pointer
            .ty()
            .pointer_space()
            .ok_or(ShadowError::MalformedInstruction(self.inst.opcode()))
    }

    fn checked_address(&self, pointer: &Operand, space: AddressSpace) -> Result<u64> {
        let shadow = self.value(pointer)?;
        self.require_defined(&shadow, DefectKind::UninitializedAddress { space });
        self.address(pointer)
    }

    /// The memory a bulk write to `address` lands in. `None` for constant
    /// memory, which is never written.
    fn writable(&self, space: AddressSpace, address: u64) -> Result<Option<&ShadowMemory<D>>> {
        match space {
            AddressSpace::Constant => Ok(None),
            AddressSpace::Global => {
                // Writes outside any host buffer are invalid.
                self.ctx.global_background(address)?;
                Ok(Some(self.ctx.global_memory()))
            }
            _ => self.memory(space).map(Some),
        }
    }
}

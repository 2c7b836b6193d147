use kshadow_ir::{AddressSpace, AtomicOp, Operand};

use super::Transfer;
use crate::{diagnostic::DefectKind, domain::Domain, Result, ShadowError, ShadowValue};

impl<D: Domain> Transfer<'_, D> {
    /// Read-modify-write. The result is the old memory contents.
    pub(super) fn atomic(
        &mut self,
        op: AtomicOp,
        addr: &Operand,
        space: AddressSpace,
        args: &[Operand],
    ) -> Result<()> {
        let addr_shadow = self.value(addr)?;
        self.require_defined(&addr_shadow, DefectKind::UninitializedAddress { space });
        let address = self.address(addr)?;
        let ty = self.inst.ty;
        let lane_ty = ty.lane_type();

        // Held across the read and the write so that updates of one address
        // never interleave.
        let ctx = self.ctx;
        let guard = (space == AddressSpace::Global).then(|| ctx.global_memory().lock(address));

        let old = self.load_shadow(space, address, ty, Some(self.result))?;
        let mut swapped = true;
        let new = match (op, args) {
            (AtomicOp::CmpXchg, [cmp, new]) => {
                swapped = self.concrete(cmp)?.first().raw() == self.result.first().raw();
                if swapped {
                    self.value(new)?.normalize(ty)
                } else {
                    old.clone()
                }
            }
            (AtomicOp::CmpXchg, _) => {
                return Err(ShadowError::MalformedInstruction(self.inst.opcode()));
            }
            (AtomicOp::Inc | AtomicOp::Dec, _) => old.map(|lane| D::atomic(op, lane, None, lane_ty)),
            (_, [operand]) => {
                let operand = self.value(operand)?;
                ShadowValue::from_lanes(old.lanes().iter().enumerate().map(|(idx, &lane)| {
                    D::atomic(op, lane, Some(operand.lane_or_default(idx, lane_ty)), lane_ty)
                }))
            }
            _ => return Err(ShadowError::MalformedInstruction(self.inst.opcode())),
        };

        // A failed exchange writes nothing.
        if swapped && space != AddressSpace::Private {
            self.require_defined(&new, DefectKind::UninitializedWrite { space, address });
        }
        self.store_shadow(space, address, ty, new)?;
        drop(guard);

        self.set_result(old)
    }
}

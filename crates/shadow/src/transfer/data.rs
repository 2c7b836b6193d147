use kshadow_ir::{AddressSpace, Operand, Type};

use super::Transfer;
use crate::{diagnostic::DefectKind, domain::Domain, Result, ShadowValue};

impl<D: Domain> Transfer<'_, D> {
    pub(super) fn alloca(&mut self, allocated: Type) -> Result<()> {
        let address = self.result.first().as_address();
        self.item.private.allocate(address, allocated);
        tracing::trace!(address = format_args!("{address:#x}"), %allocated, "alloca");
        let pointer = ShadowValue::exact(self.result);
        self.set_result(pointer)
    }

    pub(super) fn load(&mut self, addr: &Operand, space: AddressSpace, atomic: bool) -> Result<()> {
        let addr_shadow = self.value(addr)?;
        self.require_defined(&addr_shadow, DefectKind::UninitializedAddress { space });
        let address = self.address(addr)?;

        let ctx = self.ctx;
        let guard = (atomic && space == AddressSpace::Global)
            .then(|| ctx.global_memory().lock(address));
        let shadow = self.load_shadow(space, address, self.inst.ty, Some(self.result))?;
        drop(guard);

        self.set_result(shadow)
    }

    pub(super) fn store(
        &mut self,
        addr: &Operand,
        value: &Operand,
        space: AddressSpace,
        atomic: bool,
    ) -> Result<()> {
        let addr_shadow = self.value(addr)?;
        self.require_defined(&addr_shadow, DefectKind::UninitializedAddress { space });
        let address = self.address(addr)?;

        let shadow = self.value(value)?.normalize(value.ty());
        if space != AddressSpace::Private {
            self.require_defined(&shadow, DefectKind::UninitializedWrite { space, address });
        }

        let ctx = self.ctx;
        let _guard = (atomic && space == AddressSpace::Global)
            .then(|| ctx.global_memory().lock(address));
        self.store_shadow(space, address, value.ty(), shadow)
    }

    /// Address arithmetic only. Element storage is part of the allocation
    /// the base points into.
    pub(super) fn gep(&mut self, base: &Operand, indices: &[Operand]) -> Result<()> {
        let base_ty = base.ty().lane_type();
        let base = self.value(base)?;

        let mut index_shadows = Vec::with_capacity(indices.len());
        for index in indices {
            let shadow = self.value(index)?;
            self.require_defined(&shadow, DefectKind::UninitializedIndex);
            index_shadows.push((index.ty().lane_type(), shadow));
        }

        let shadow = self.result_lanes(|idx, result| {
            let mut inputs = Vec::with_capacity(index_shadows.len() + 1);
            inputs.push(base.lane_or_default(idx, base_ty));
            inputs.extend(
                index_shadows
                    .iter()
                    .map(|(ty, shadow)| shadow.lane_or_default(idx, *ty)),
            );
            D::derived(&inputs, result)
        });

        self.set_result(shadow)
    }
}

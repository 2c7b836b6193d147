use kshadow_ir::Operand;

use super::Transfer;
use crate::{diagnostic::DefectKind, domain::Domain, Result, ShadowValue};

impl<D: Domain> Transfer<'_, D> {
    pub(super) fn extract_element(&mut self, vector: &Operand, index: &Operand) -> Result<()> {
        let lane_ty = vector.ty().lane_type();
        let index = self.checked_index(index)?;
        let lane = self.value(vector)?.lane_or_default(index, lane_ty);
        self.set_result(ShadowValue::splat(lane, 1))
    }

    pub(super) fn insert_element(
        &mut self,
        vector: &Operand,
        element: &Operand,
        index: &Operand,
    ) -> Result<()> {
        let vector_ty = vector.ty();
        let index = self.checked_index(index)?;
        let element = self
            .value(element)?
            .lane_or_default(0, vector_ty.lane_type());

        let mut shadow = self.value(vector)?.normalize(vector_ty);
        shadow.set_lane(index, element);
        self.set_result(shadow)
    }

    pub(super) fn shuffle_vector(
        &mut self,
        lhs: &Operand,
        rhs: &Operand,
        mask: &Operand,
    ) -> Result<()> {
        let lane_ty = self.inst.ty.lane_type();
        let split = lhs.ty().lanes();
        let lhs = self.value(lhs)?;
        let rhs = self.value(rhs)?;
        // An undef mask selects nothing in particular.
        let mask = match mask {
            Operand::Undef(_) => None,
            _ => Some(self.concrete(mask)?),
        };

        let shadow = self.result_lanes(|idx, _| {
            let selector = mask.as_ref().map_or(-1, |mask| mask.lane(idx).as_sint());
            match usize::try_from(selector) {
                Err(_) => D::pessimistic(lane_ty),
                Ok(pick) if pick < split => lhs.lane_or_default(pick, lane_ty),
                Ok(pick) => rhs.lane_or_default(pick - split, lane_ty),
            }
        });
        self.set_result(shadow)
    }

    /// The concrete index of a vector access, reporting an undefined one.
    fn checked_index(&self, index: &Operand) -> Result<usize> {
        let shadow = self.value(index)?;
        self.require_defined(&shadow, DefectKind::UninitializedIndex);
        Ok(self.concrete(index)?.first().as_uint() as usize)
    }
}

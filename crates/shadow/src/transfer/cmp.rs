use kshadow_ir::{FloatPredicate, IntPredicate, Operand};

use super::Transfer;
use crate::{domain::Domain, Result, ShadowValue};

impl<D: Domain> Transfer<'_, D> {
    pub(super) fn icmp(&mut self, pred: IntPredicate, lhs: &Operand, rhs: &Operand) -> Result<()> {
        let ty = lhs.ty().lane_type();
        let lhs = self.value(lhs)?;
        let rhs = self.value(rhs)?;

        let result = self.result;
        let mut lanes = Vec::with_capacity(result.lanes());
        for (idx, lane) in result.iter_lanes().enumerate() {
            lanes.push(D::icmp(
                pred,
                lhs.lane_or_default(idx, ty),
                rhs.lane_or_default(idx, ty),
                lane,
                &mut self.audit,
            ));
        }
        self.set_result(ShadowValue::from_lanes(lanes))
    }

    pub(super) fn fcmp(
        &mut self,
        pred: FloatPredicate,
        lhs: &Operand,
        rhs: &Operand,
    ) -> Result<()> {
        let ty = lhs.ty().lane_type();
        let lhs = self.value(lhs)?;
        let rhs = self.value(rhs)?;

        let result = self.result;
        let mut lanes = Vec::with_capacity(result.lanes());
        for (idx, lane) in result.iter_lanes().enumerate() {
            lanes.push(D::fcmp(
                pred,
                lhs.lane_or_default(idx, ty),
                rhs.lane_or_default(idx, ty),
                lane,
                &mut self.audit,
            ));
        }
        self.set_result(ShadowValue::from_lanes(lanes))
    }
}

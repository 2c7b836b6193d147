use kshadow_ir::{CastOp, Operand};

use super::Transfer;
use crate::{domain::Domain, Result, ShadowValue};

impl<D: Domain> Transfer<'_, D> {
    pub(super) fn cast(&mut self, op: CastOp, arg: &Operand) -> Result<()> {
        let from = arg.ty().lane_type();
        let arg = self.value(arg)?;

        let result = self.result;
        // A bitcast between vector shapes mixes bytes of several lanes.
        let arg = if arg.num_lanes() == result.lanes() {
            arg
        } else {
            let lane = arg.collapse().unwrap_or_else(|| D::pessimistic(from));
            ShadowValue::splat(lane, result.lanes())
        };

        let mut lanes = Vec::with_capacity(result.lanes());
        for (idx, lane) in result.iter_lanes().enumerate() {
            lanes.push(D::cast(
                op,
                arg.lane_or_default(idx, from),
                from,
                lane,
                &mut self.audit,
            ));
        }
        self.set_result(ShadowValue::from_lanes(lanes))
    }
}

use kshadow_ir::{BinaryOp, Operand, UnaryOp};

use super::Transfer;
use crate::{domain::Domain, Result};

impl<D: Domain> Transfer<'_, D> {
    pub(super) fn binary(&mut self, op: BinaryOp, lhs: &Operand, rhs: &Operand) -> Result<()> {
        let lhs_ty = lhs.ty().lane_type();
        let rhs_ty = rhs.ty().lane_type();
        let lhs = self.value(lhs)?;
        let rhs = self.value(rhs)?;

        let shadow = self.result_lanes(|idx, result| {
            D::binary(
                op,
                lhs.lane_or_default(idx, lhs_ty),
                rhs.lane_or_default(idx, rhs_ty),
                result,
            )
        });
        self.set_result(shadow)
    }

    pub(super) fn unary(&mut self, op: UnaryOp, arg: &Operand) -> Result<()> {
        let arg_ty = arg.ty().lane_type();
        let arg = self.value(arg)?;

        let shadow =
            self.result_lanes(|idx, result| D::unary(op, arg.lane_or_default(idx, arg_ty), result));
        self.set_result(shadow)
    }
}

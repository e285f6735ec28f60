//! Per-instruction capability/extension/version gating.

use super::RuleCx;
use crate::diag::Diag;
use crate::spv;

pub(super) fn check_inst(cx: &RuleCx<'_>, _idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    cx.gate.check_inst(inst)?;

    if inst.opcode == cx.wk.op.OpCapability {
        if let Some(cap) = inst.imm_operand(0) {
            cx.gate.check_capability_allowed_by_env(cap)?;
        }
    }
    Ok(())
}

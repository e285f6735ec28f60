//! `OpControlBarrier` and `OpMemoryBarrier`.

use super::memory_semantics::check_memory_semantics;
use super::scopes::{check_execution_scope, check_memory_scope};
use super::RuleCx;
use crate::diag::Diag;
use crate::spv::{self, Version};
use itertools::Itertools;

pub(super) fn check_inst(cx: &RuleCx<'_>, idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let op = inst.opcode;

    if op == wk.op.OpControlBarrier {
        check_memory_semantics(cx, inst, cx.id_operand(inst, 2)?)?;
        check_execution_scope(cx, idx, inst, cx.id_operand(inst, 0)?)?;
        check_memory_scope(cx, inst, cx.id_operand(inst, 1)?)?;
        check_control_barrier_models(cx, idx)
    } else if op == wk.op.OpMemoryBarrier {
        check_memory_semantics(cx, inst, cx.id_operand(inst, 1)?)?;
        check_memory_scope(cx, inst, cx.id_operand(inst, 0)?)
    } else {
        Ok(())
    }
}

/// Before SPIR-V 1.3, `OpControlBarrier` was limited to a few execution models.
fn check_control_barrier_models(cx: &RuleCx<'_>, idx: usize) -> Result<(), Diag> {
    let wk = cx.wk;
    if cx.env_version() >= Version::new(1, 3) {
        return Ok(());
    }

    let allowed = [wk.em.TessellationControl, wk.em.GLCompute, wk.em.Kernel];
    let disallowed =
        cx.module.entry_models_of_inst(idx).iter().filter(|model| !allowed.contains(model));
    let disallowed = disallowed
        .map(|&model| wk.kind.ExecutionModel.enumerant_name(model).unwrap_or("unknown"))
        .join(", ");
    if !disallowed.is_empty() {
        return Err(Diag::invalid_data(format!(
            "OpControlBarrier requires one of the following Execution Models: \
             TessellationControl, GLCompute or Kernel (used by {disallowed})"
        )));
    }
    Ok(())
}

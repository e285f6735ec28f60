//! Control flow: terminators, merge instructions, `OpPhi` and nesting depth.

use super::RuleCx;
use crate::diag::{Diag, ErrorKind};
use crate::module::{Block, Function, IdKind, TypeDef};
use crate::spv::{self, Id};

pub(super) fn check_inst(cx: &RuleCx<'_>, idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let op = inst.opcode;

    let Some(func) = cx.module.function_of_inst(idx) else {
        return Ok(());
    };

    if op == wk.op.OpFunction {
        check_entry_block(cx, func)?;
        trace_unreachable_blocks(cx, func);
        check_nesting_depth(cx, func)
    } else if op == wk.op.OpBranch {
        check_target(cx, func, inst, cx.id_operand(inst, 0)?)
    } else if op == wk.op.OpBranchConditional {
        check_branch_conditional(cx, func, inst)
    } else if op == wk.op.OpSwitch {
        check_switch(cx, func, inst)
    } else if op == wk.op.OpSelectionMerge || op == wk.op.OpLoopMerge {
        check_merge(cx, func, idx, inst)
    } else if op == wk.op.OpReturn {
        if cx.module.type_def(func.result_type) != Some(&TypeDef::Void) {
            return Err(Diag::invalid_data(format!(
                "OpReturn can only be called from a function with void return type, but {} \
                 returns {}.",
                cx.name(func.id),
                cx.name(func.result_type)
            )));
        }
        Ok(())
    } else if op == wk.op.OpReturnValue {
        check_return_value(cx, func, inst)
    } else if op == wk.op.OpPhi {
        check_phi(cx, func, idx, inst)
    } else {
        Ok(())
    }
}

fn block_of(func: &Function, idx: usize) -> Option<&Block> {
    let i = func.blocks.partition_point(|b| b.insts.end <= idx);
    func.blocks.get(i).filter(|b| b.label_inst <= idx)
}

fn check_entry_block(cx: &RuleCx<'_>, func: &Function) -> Result<(), Diag> {
    let Some(entry) = func.entry_block() else { return Ok(()) };
    if let Some(&pred) = entry.preds.first() {
        return Err(Diag::invalid_data(format!(
            "First block {} of function {} is targeted by block {}",
            cx.name(entry.label),
            cx.name(func.id),
            cx.name(pred)
        ))
        .with_id(entry.label));
    }
    Ok(())
}

/// Unreachable blocks are still checked like any other, only noted here.
fn trace_unreachable_blocks(cx: &RuleCx<'_>, func: &Function) {
    let reachable = func.reachable_blocks();
    for block in func.blocks.iter().filter(|b| !reachable.contains(&b.label)) {
        tracing::debug!(
            function = %cx.name(func.id),
            block = %cx.name(block.label),
            "unreachable block"
        );
    }
}

/// Structured control flow nests constructs in layout order, with every
/// construct ending at its merge block.
fn check_nesting_depth(cx: &RuleCx<'_>, func: &Function) -> Result<(), Diag> {
    let limit = cx.options.universal_limits.max_control_flow_nesting_depth;
    let mut open_merges: Vec<Id> = vec![];

    for block in &func.blocks {
        while open_merges.last() == Some(&block.label) {
            open_merges.pop();
        }
        if let Some(merge) = block.merge_inst(&cx.module.insts) {
            if let Some(merge_block) = cx.module.insts[merge].id_operand(0) {
                open_merges.push(merge_block);
            }
        }
        if open_merges.len() > limit as usize {
            return Err(Diag::new(
                ErrorKind::OutOfResources,
                format!(
                    "Maximum Control Flow nesting depth exceeded in function {} (limit is {limit}).",
                    cx.name(func.id)
                ),
            )
            .with_id(block.label));
        }
    }
    Ok(())
}

fn check_target(cx: &RuleCx<'_>, func: &Function, inst: &spv::Inst, target: Id) -> Result<(), Diag> {
    let is_label = matches!(cx.module.ids.get(&target), Some(info) if info.kind == IdKind::Label);
    if !is_label {
        return Err(Diag::invalid_id(format!(
            "{} target {} must be the ID of an OpLabel instruction",
            inst.opcode.name(),
            cx.name(target)
        ))
        .with_id(target));
    }
    if func.block(target).is_none() {
        return Err(Diag::invalid_data(format!(
            "Block {} is referenced by {} but is not a block of function {}",
            cx.name(target),
            inst.opcode.name(),
            cx.name(func.id)
        ))
        .with_id(target));
    }
    Ok(())
}

fn check_branch_conditional(cx: &RuleCx<'_>, func: &Function, inst: &spv::Inst) -> Result<(), Diag> {
    let condition = cx.id_operand(inst, 0)?;
    let cond_ty = cx.type_of(inst, condition)?;
    if cx.module.type_def(cond_ty) != Some(&TypeDef::Bool) {
        return Err(Diag::invalid_id(
            "Condition operand for OpBranchConditional must be of boolean type",
        )
        .with_id(condition));
    }

    check_target(cx, func, inst, cx.id_operand(inst, 1)?)?;
    check_target(cx, func, inst, cx.id_operand(inst, 2)?)?;

    // Branch weights are either absent, or given for both targets.
    let num_weights = inst.num_logical_operands().saturating_sub(3);
    if num_weights != 0 && num_weights != 2 {
        return Err(Diag::invalid_data(
            "OpBranchConditional requires either 3 or 5 parameters",
        ));
    }
    Ok(())
}

fn check_switch(cx: &RuleCx<'_>, func: &Function, inst: &spv::Inst) -> Result<(), Diag> {
    let limit = cx.options.universal_limits.max_switch_branches;
    let selector = cx.id_operand(inst, 0)?;
    let selector_ty = cx.type_of(inst, selector)?;
    if !cx.module.is_int_scalar_type(selector_ty) {
        return Err(Diag::invalid_id("Selector type must be OpTypeInt").with_id(selector));
    }

    let num_cases = inst.num_logical_operands().saturating_sub(2) / 2;
    if num_cases > limit as usize {
        return Err(Diag::new(
            ErrorKind::OutOfResources,
            format!(
                "Number of (literal, label) pairs in OpSwitch ({num_cases}) exceeds the limit ({limit})."
            ),
        ));
    }

    for target in crate::module::branch_targets(inst) {
        check_target(cx, func, inst, target)?;
    }
    Ok(())
}

fn check_merge(cx: &RuleCx<'_>, func: &Function, idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let is_loop = inst.opcode == wk.op.OpLoopMerge;

    let allowed_terminators = if is_loop {
        [wk.op.OpBranch, wk.op.OpBranchConditional]
    } else {
        [wk.op.OpBranchConditional, wk.op.OpSwitch]
    };
    let precedes_terminator = block_of(func, idx).is_some_and(|block| {
        idx + 1 == block.terminator()
            && allowed_terminators.contains(&cx.module.insts[block.terminator()].opcode)
    });
    if !precedes_terminator {
        let msg = if is_loop {
            "OpLoopMerge must immediately precede either an OpBranch or OpBranchConditional \
             instruction. OpLoopMerge must be the second-to-last instruction in its block."
        } else {
            "OpSelectionMerge must immediately precede either an OpBranchConditional or OpSwitch \
             instruction. OpSelectionMerge must be the second-to-last instruction in its block."
        };
        return Err(Diag::invalid_data(msg));
    }

    check_target(cx, func, inst, cx.id_operand(inst, 0)?)?;
    if is_loop {
        check_target(cx, func, inst, cx.id_operand(inst, 1)?)?;
    }
    Ok(())
}

fn check_return_value(cx: &RuleCx<'_>, func: &Function, inst: &spv::Inst) -> Result<(), Diag> {
    let value = cx.id_operand(inst, 0)?;
    let value_ty = cx.type_of(inst, value)?;

    if cx.module.type_def(func.result_type) == Some(&TypeDef::Void) {
        return Err(Diag::invalid_data(format!(
            "OpReturnValue can only be called from a function with non-void return type, but \
             {} returns void.",
            cx.name(func.id)
        )));
    }
    if value_ty != func.result_type {
        return Err(Diag::invalid_id(format!(
            "OpReturnValue Value {}'s type does not match OpFunction's return type.",
            cx.name(value)
        ))
        .with_id(value));
    }
    Ok(())
}

fn check_phi(cx: &RuleCx<'_>, func: &Function, idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let insts = &cx.module.insts;

    let Some(block) = block_of(func, idx) else { return Ok(()) };
    let is_entry = func.entry_block().is_some_and(|entry| entry.label == block.label);
    let only_phis_before = insts[block.insts.start..idx]
        .iter()
        .all(|i| [wk.op.OpPhi, wk.op.OpLine, wk.op.OpNoLine].contains(&i.opcode));
    if is_entry || !only_phis_before {
        return Err(Diag::invalid_id(
            "OpPhi must appear within a non-entry block before all non-OpPhi instructions \
             (except for OpLine, which can be mixed with OpPhi).",
        ));
    }

    let result_ty = inst.result_type_id;
    let num_incoming = inst.num_logical_operands() / 2;
    if num_incoming != block.preds.len() {
        return Err(Diag::invalid_id(format!(
            "OpPhi's number of incoming blocks ({num_incoming}) does not match block's \
             predecessor count ({}).",
            block.preds.len()
        )));
    }

    for pair in 0..num_incoming {
        let value = cx.id_operand(inst, pair * 2)?;
        let parent = cx.id_operand(inst, pair * 2 + 1)?;

        if !block.preds.contains(&parent) {
            return Err(Diag::invalid_id(format!(
                "OpPhi's incoming basic block {} is not a predecessor of {}.",
                cx.name(parent),
                cx.name(block.label)
            ))
            .with_id(parent));
        }

        // Forward references can only be checked once they're defined.
        if let (Some(result_ty), Some(value_ty)) = (result_ty, cx.module.type_of(value)) {
            if value_ty != result_ty {
                return Err(Diag::invalid_id(format!(
                    "OpPhi's result type {} does not match incoming value {} type {}.",
                    cx.name(result_ty),
                    cx.name(value),
                    cx.name(value_ty)
                ))
                .with_id(value));
            }
        }
    }
    Ok(())
}

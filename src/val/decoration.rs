//! Decoration targets.

use super::RuleCx;
use crate::diag::Diag;
use crate::module::TypeDef;
use crate::spv::{self, Id};

pub(super) fn check_inst(cx: &RuleCx<'_>, _idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let op = inst.opcode;

    if op == wk.op.OpDecorate {
        let target = cx.id_operand(inst, 0)?;
        let decoration = inst.imm_operand(1).unwrap_or(u32::MAX);
        check_decoration_target(cx, target, decoration)
    } else if op == wk.op.OpMemberDecorate {
        let target = cx.id_operand(inst, 0)?;
        let member = inst.imm_operand(1).unwrap_or(0);
        check_member_index(cx, inst, target, member)
    } else if op == wk.op.OpGroupMemberDecorate {
        // `(struct, member)` pairs after the group.
        for i in (1..inst.num_logical_operands()).step_by(2) {
            let target = cx.id_operand(inst, i)?;
            let member = inst.imm_operand(i + 1).unwrap_or(0);
            check_member_index(cx, inst, target, member)?;
        }
        Ok(())
    } else {
        Ok(())
    }
}

fn check_member_index(cx: &RuleCx<'_>, inst: &spv::Inst, target: Id, member: u32) -> Result<(), Diag> {
    let Some(TypeDef::Struct { members }) = cx.module.type_def(target) else {
        return Err(Diag::invalid_id(format!(
            "{} Structure type {} is not a struct type.",
            inst.opcode.name(),
            cx.name(target)
        ))
        .with_id(target));
    };
    if member as usize >= members.len() {
        return Err(Diag::invalid_id(format!(
            "Index {member} provided in {} for struct <id> {} is out of bounds. The structure \
             has {} members. Largest valid index is {}.",
            inst.opcode.name(),
            cx.name(target),
            members.len(),
            members.len().saturating_sub(1)
        ))
        .with_id(target));
    }
    Ok(())
}

fn check_decoration_target(cx: &RuleCx<'_>, target: Id, decoration: u32) -> Result<(), Diag> {
    let wk = cx.wk;
    let def = cx.module.type_def(target);

    // Group decorations are checked on the members they are applied to.
    if cx.module.def_opcode(target) == Some(wk.op.OpDecorationGroup) {
        return Ok(());
    }

    if [wk.deco.Block, wk.deco.BufferBlock].contains(&decoration)
        && !matches!(def, Some(TypeDef::Struct { .. }))
    {
        let name = wk.kind.Decoration.enumerant_name(decoration).unwrap_or("Block");
        return Err(Diag::invalid_id(format!(
            "{name} decoration on a non-struct type {}.",
            cx.name(target)
        ))
        .with_id(target));
    }

    if decoration == wk.deco.ArrayStride
        && !matches!(
            def,
            Some(TypeDef::Array { .. } | TypeDef::RuntimeArray { .. } | TypeDef::Pointer { .. })
        )
    {
        return Err(Diag::invalid_id(format!(
            "ArrayStride decoration on {}, which is not an array or pointer type.",
            cx.name(target)
        ))
        .with_id(target));
    }

    Ok(())
}

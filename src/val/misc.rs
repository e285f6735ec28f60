//! `OpUndef`, `OpSizeOf`, and entry point declarations.

use super::RuleCx;
use crate::diag::Diag;
use crate::module::TypeDef;
use crate::spv;

pub(super) fn check_inst(cx: &RuleCx<'_>, idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let op = inst.opcode;

    if op == wk.op.OpUndef {
        check_undef(cx, inst)
    } else if op == wk.op.OpSizeOf {
        check_size_of(cx, inst)
    } else if op == wk.op.OpEntryPoint {
        check_entry_point(cx, idx, inst)
    } else if op == wk.op.OpExecutionMode || op == wk.op.OpExecutionModeId {
        let target = cx.id_operand(inst, 0)?;
        if !cx.module.entry_points.iter().any(|ep| ep.function == target) {
            return Err(Diag::invalid_id(format!(
                "{} Entry Point {} is not the Entry Point operand of an OpEntryPoint.",
                op.name(),
                cx.name(target)
            ))
            .with_id(target));
        }
        Ok(())
    } else {
        Ok(())
    }
}

fn check_undef(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let m = cx.module;
    let Some(ty) = inst.result_type_id else { return Ok(()) };

    if m.type_def(ty) == Some(&TypeDef::Void) {
        return Err(Diag::invalid_id("Cannot create undefined values with void type").with_id(ty));
    }

    // Pointers to small types are fine, only the values themselves are restricted.
    let is_pointer = m.pointer_type(ty).is_some();
    if !is_pointer && (m.contains_width(ty, 8) || m.contains_width(ty, 16)) {
        return Err(
            Diag::invalid_id("Cannot create undefined values with 8- or 16-bit types").with_id(ty)
        );
    }
    Ok(())
}

fn check_size_of(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let m = cx.module;

    if !cx.has_capability(wk.cap.Kernel) {
        return Err(Diag::invalid_capability("OpSizeOf requires the Kernel capability"));
    }

    let pointer = cx.id_operand(inst, 0)?;
    if m.type_of(pointer).and_then(|ty| m.pointer_type(ty)).is_none() {
        return Err(Diag::invalid_id(format!(
            "OpSizeOf Pointer operand {} must be a pointer",
            cx.name(pointer)
        ))
        .with_id(pointer));
    }

    let result_is_u32 = inst
        .result_type_id
        .is_some_and(|ty| m.is_int_scalar_type(ty) && m.bit_width(ty) == Some(32));
    if !result_is_u32 {
        return Err(Diag::invalid_data("OpSizeOf Result Type must be a 32-bit integer scalar type"));
    }
    Ok(())
}

fn check_entry_point(cx: &RuleCx<'_>, idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let m = cx.module;
    let function_id = cx.id_operand(inst, 1)?;

    let Some(func) = m.function(function_id) else {
        return Err(Diag::invalid_id(format!(
            "OpEntryPoint Entry Point {} is not a function.",
            cx.name(function_id)
        ))
        .with_id(function_id));
    };

    if m.type_def(func.result_type) != Some(&TypeDef::Void) {
        return Err(Diag::invalid_data(format!(
            "OpEntryPoint Entry Point {}s function return type is not void.",
            cx.name(function_id)
        ))
        .with_id(function_id));
    }
    if !func.params.is_empty() {
        return Err(Diag::invalid_data(format!(
            "OpEntryPoint Entry Point {}s function parameter count is not zero.",
            cx.name(function_id)
        ))
        .with_id(function_id));
    }

    // The same name can't be reused for the same execution model.
    let this = m.entry_points.iter().find(|ep| ep.inst_idx == idx);
    if let Some(this) = this {
        let duplicate = m.entry_points.iter().any(|ep| {
            ep.inst_idx < idx && ep.execution_model == this.execution_model && ep.name == this.name
        });
        if duplicate {
            return Err(Diag::invalid_binary(format!(
                "2 Entry points cannot share the same name and ExecutionMode ({}).",
                this.name
            )));
        }
    }
    Ok(())
}

/// Modules without entry points are only meaningful for linking.
pub(super) fn check_module(cx: &RuleCx<'_>) -> Result<(), Diag> {
    if cx.module.entry_points.is_empty() && !cx.has_capability(cx.wk.cap.Linkage) {
        return Err(Diag::invalid_binary(
            "No OpEntryPoint instruction was found. This is only allowed if the Linkage \
             capability is being used.",
        ));
    }
    Ok(())
}

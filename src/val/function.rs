//! Function declarations, parameters and calls.

use super::RuleCx;
use crate::diag::Diag;
use crate::module::{Function, TypeDef};
use crate::spv::{self, Id};

pub(super) fn check_inst(cx: &RuleCx<'_>, idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let op = inst.opcode;

    if op == wk.op.OpFunction {
        match cx.module.function_of_inst(idx) {
            Some(func) => check_function(cx, func),
            None => Ok(()),
        }
    } else if op == wk.op.OpFunctionParameter {
        check_parameter(cx, idx, inst)
    } else if op == wk.op.OpFunctionCall {
        check_call(cx, inst)
    } else {
        Ok(())
    }
}

fn function_type<'a>(cx: &RuleCx<'a>, ty: Id) -> Option<(Id, &'a [Id])> {
    match cx.module.type_def(ty)? {
        TypeDef::Function { ret, params } => Some((*ret, &params[..])),
        _ => None,
    }
}

fn check_function(cx: &RuleCx<'_>, func: &Function) -> Result<(), Diag> {
    let Some((ret, params)) = function_type(cx, func.function_type) else {
        return Err(Diag::invalid_id(format!(
            "OpFunction Function Type {} is not a function type.",
            cx.name(func.function_type)
        ))
        .with_id(func.function_type));
    };

    if ret != func.result_type {
        return Err(Diag::invalid_id(format!(
            "OpFunction Result Type {} does not match the Function Type's return type {}.",
            cx.name(func.result_type),
            cx.name(ret)
        ))
        .with_id(func.id));
    }

    if params.len() != func.params.len() {
        return Err(Diag::invalid_id(format!(
            "Function {} has {} OpFunctionParameter instructions, but its type {} declares {} \
             parameters.",
            cx.name(func.id),
            func.params.len(),
            cx.name(func.function_type),
            params.len()
        ))
        .with_id(func.id));
    }

    let is_import = cx
        .module
        .decoration(func.id, cx.wk.deco.LinkageAttributes)
        .and_then(|deco| deco.params.last())
        .is_some_and(|linkage_type| linkage_type.word() == cx.wk.linkage.Import);
    match (func.blocks.is_empty(), is_import) {
        (true, false) => Err(Diag::invalid_data(format!(
            "Function declaration (id {}) must have a LinkageAttributes decoration with the \
             Import Linkage type.",
            cx.name(func.id)
        ))
        .with_id(func.id)),
        (false, true) => Err(Diag::invalid_data(format!(
            "Function definition (id {}) may not be decorated with Import Linkage type.",
            cx.name(func.id)
        ))
        .with_id(func.id)),
        _ => Ok(()),
    }
}

fn check_parameter(cx: &RuleCx<'_>, idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let Some(func) = cx.module.function_of_inst(idx) else { return Ok(()) };
    let Some((_, params)) = function_type(cx, func.function_type) else { return Ok(()) };
    let Some(position) = func.params.iter().position(|&p| p == idx) else { return Ok(()) };

    // Count mismatches are reported on the `OpFunction`.
    let (Some(&expected), Some(actual)) = (params.get(position), inst.result_type_id) else {
        return Ok(());
    };
    if expected != actual {
        return Err(Diag::invalid_id(format!(
            "OpFunctionParameter Result Type {} does not match the OpTypeFunction parameter type \
             of the same index.",
            cx.name(actual)
        ))
        .with_id(actual));
    }
    Ok(())
}

fn check_call(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let m = cx.module;
    let callee_id = cx.id_operand(inst, 0)?;

    let Some(callee) = m.function(callee_id) else {
        return Err(Diag::invalid_id(format!(
            "OpFunctionCall Function {} is not a function.",
            cx.name(callee_id)
        ))
        .with_id(callee_id));
    };
    let Some((ret, params)) = function_type(cx, callee.function_type) else {
        return Ok(());
    };

    if inst.result_type_id != Some(ret) {
        return Err(Diag::invalid_id(format!(
            "OpFunctionCall Result Type {}s type does not match Function {}s return type.",
            inst.result_type_id.map_or_else(String::new, |ty| cx.name(ty)),
            cx.name(callee_id)
        )));
    }

    let args: Vec<Id> = (1..inst.num_logical_operands()).filter_map(|i| inst.id_operand(i)).collect();
    if args.len() != params.len() {
        return Err(Diag::invalid_id(format!(
            "OpFunctionCall Function {}s parameter count does not match the argument count.",
            cx.name(callee_id)
        ))
        .with_id(callee_id));
    }

    for (&arg, &param_ty) in args.iter().zip(params) {
        let arg_ty = cx.type_of(inst, arg)?;

        if arg_ty != param_ty {
            let pointers_match = cx.options.relax_logical_pointer
                && match (m.pointer_type(arg_ty), m.pointer_type(param_ty)) {
                    (Some((arg_sc, arg_pointee)), Some((param_sc, param_pointee))) => {
                        arg_sc == param_sc
                            && logically_match(cx, arg_pointee, param_pointee, 0)
                    }
                    _ => false,
                };
            if !pointers_match {
                return Err(Diag::invalid_id(format!(
                    "OpFunctionCall Argument {}s type does not match Function {}s parameter type.",
                    cx.name(arg),
                    cx.name(callee_id)
                ))
                .with_id(arg));
            }
        }

        if m.addressing_model == wk.am.Logical && !cx.options.relax_logical_pointer {
            if let Some((sc, _)) = m.pointer_type(param_ty) {
                check_pointer_argument(cx, arg, sc)?;
            }
        }
    }
    Ok(())
}

/// Logical addressing restricts which pointers can be passed to functions.
fn check_pointer_argument(cx: &RuleCx<'_>, arg: Id, sc: u32) -> Result<(), Diag> {
    let wk = cx.wk;
    let variable_pointers = cx.has_capability(wk.cap.VariablePointers)
        || cx.has_capability(wk.cap.VariablePointersStorageBuffer);

    let always_allowed = [
        wk.sc.UniformConstant,
        wk.sc.Function,
        wk.sc.Private,
        wk.sc.Workgroup,
        wk.sc.AtomicCounter,
    ];
    if sc == wk.sc.StorageBuffer {
        if !variable_pointers {
            return Err(Diag::invalid_id(format!(
                "StorageBuffer pointer operand {} requires a variable pointers capability",
                cx.name(arg)
            ))
            .with_id(arg));
        }
    } else if !always_allowed.contains(&sc) {
        return Err(Diag::invalid_id(format!(
            "Invalid storage class for pointer operand {}",
            cx.name(arg)
        ))
        .with_id(arg));
    }

    let is_memory_object =
        [Some(wk.op.OpVariable), Some(wk.op.OpFunctionParameter)].contains(&cx.module.def_opcode(arg));
    if !is_memory_object {
        let ssbo_vptr = variable_pointers && sc == wk.sc.StorageBuffer;
        let wg_vptr = cx.has_capability(wk.cap.VariablePointers) && sc == wk.sc.Workgroup;
        let uc_ptr = sc == wk.sc.UniformConstant;
        if !(ssbo_vptr || wg_vptr || uc_ptr) {
            return Err(Diag::invalid_id(format!(
                "Pointer operand {} must be a memory object declaration",
                cx.name(arg)
            ))
            .with_id(arg));
        }
    }
    Ok(())
}

/// Whether two (distinct) types have the same logical structure and explicit layout.
fn logically_match(cx: &RuleCx<'_>, a: Id, b: Id, depth: u32) -> bool {
    if a == b {
        return true;
    }
    if depth > cx.options.universal_limits.max_struct_depth || !same_layout_decorations(cx, a, b) {
        return false;
    }
    let m = cx.module;
    match (m.type_def(a), m.type_def(b)) {
        (
            Some(&TypeDef::Array { element: ea, length: la }),
            Some(&TypeDef::Array { element: eb, length: lb }),
        ) => {
            let same_length = la == lb || m.const_int(la).is_some_and(|l| m.const_int(lb) == Some(l));
            same_length && logically_match(cx, ea, eb, depth + 1)
        }
        (Some(TypeDef::RuntimeArray { element: ea }), Some(TypeDef::RuntimeArray { element: eb })) => {
            logically_match(cx, *ea, *eb, depth + 1)
        }
        (Some(TypeDef::Struct { members: ma }), Some(TypeDef::Struct { members: mb })) => {
            ma.len() == mb.len()
                && (0..ma.len() as u32).all(|i| same_member_layout(cx, a, b, i))
                && ma.iter().zip(mb).all(|(&x, &y)| logically_match(cx, x, y, depth + 1))
        }
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn same_layout_decorations(cx: &RuleCx<'_>, a: Id, b: Id) -> bool {
    let deco = cx.wk.deco.ArrayStride;
    let stride = |ty| cx.module.decoration(ty, deco).and_then(|d| d.literal(0));
    stride(a) == stride(b)
}

fn same_member_layout(cx: &RuleCx<'_>, a: Id, b: Id, member: u32) -> bool {
    let wk = cx.wk;
    [wk.deco.Offset, wk.deco.MatrixStride, wk.deco.RowMajor, wk.deco.ColMajor].iter().all(|&deco| {
        let of = |ty| cx.module.member_decoration(ty, member, deco).map(|d| d.literal(0));
        of(a) == of(b)
    })
}

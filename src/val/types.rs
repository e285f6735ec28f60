//! Type declarations and (non-tensor) constants.

use super::RuleCx;
use crate::diag::{Diag, ErrorKind};
use crate::module::{ConstValue, TypeDef};
use crate::spv::{self, Id};

pub(super) fn check_inst(cx: &RuleCx<'_>, _idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let op = inst.opcode;
    let wk = cx.wk;

    if op == wk.op.OpTypeInt {
        check_int_type(cx, inst)
    } else if op == wk.op.OpTypeFloat {
        check_float_type(cx, inst)
    } else if op == wk.op.OpTypeVector {
        check_vector_type(cx, inst)
    } else if op == wk.op.OpTypeMatrix {
        check_matrix_type(cx, inst)
    } else if op == wk.op.OpTypeArray {
        check_array_type(cx, inst)
    } else if op == wk.op.OpTypeRuntimeArray {
        check_element_not_void(cx, inst, cx.id_operand(inst, 0)?)
    } else if op == wk.op.OpTypeStruct {
        check_struct_type(cx, inst)
    } else if op == wk.op.OpTypePointer {
        let pointee = cx.id_operand(inst, 1)?;
        if !cx.module.is_type(pointee) && !cx.module.forward_pointers.contains(&pointee) {
            return Err(Diag::invalid_id(format!(
                "OpTypePointer Type {} is not a type.",
                cx.name(pointee)
            ))
            .with_id(pointee));
        }
        Ok(())
    } else if op == wk.op.OpTypeFunction {
        check_function_type(cx, inst)
    } else if [wk.op.OpConstantTrue, wk.op.OpConstantFalse, wk.op.OpSpecConstantTrue, wk.op.OpSpecConstantFalse]
        .contains(&op)
    {
        let ty = result_type(inst)?;
        if cx.module.type_def(ty) != Some(&TypeDef::Bool) {
            return Err(Diag::invalid_id(format!(
                "{} Result Type {} is not a boolean type.",
                op.name(),
                cx.name(ty)
            ))
            .with_id(ty));
        }
        Ok(())
    } else if [wk.op.OpConstant, wk.op.OpSpecConstant].contains(&op) {
        let ty = result_type(inst)?;
        if !(cx.module.is_int_scalar_type(ty) || cx.module.is_float_scalar_type(ty)) {
            return Err(Diag::invalid_id(format!(
                "{} Result Type {} is not a scalar integer or floating point type.",
                op.name(),
                cx.name(ty)
            ))
            .with_id(ty));
        }
        Ok(())
    } else if [wk.op.OpConstantComposite, wk.op.OpSpecConstantComposite].contains(&op) {
        check_constant_composite(cx, inst)
    } else if op == wk.op.OpConstantNull {
        check_constant_null(cx, inst)
    } else {
        Ok(())
    }
}

fn result_type(inst: &spv::Inst) -> Result<Id, Diag> {
    inst.result_type_id.ok_or_else(|| {
        Diag::invalid_binary(format!("{}: missing Result Type", inst.opcode.short_name()))
    })
}

fn check_int_type(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let width = inst.imm_operand(0).unwrap_or(0);
    let signedness = inst.imm_operand(1).unwrap_or(0);
    let has = |cap| cx.has_capability(cap);

    match width {
        8 => {
            let enabled = [
                wk.cap.Int8,
                wk.cap.StorageBuffer8BitAccess,
                wk.cap.UniformAndStorageBuffer8BitAccess,
                wk.cap.StoragePushConstant8,
            ]
            .into_iter()
            .any(has);
            if !enabled {
                return Err(Diag::invalid_data(
                    "Using an 8-bit integer type requires the Int8 capability, or an extension \
                     that explicitly enables 8-bit integers.",
                ));
            }
        }
        16 => {
            let enabled = [
                wk.cap.Int16,
                wk.cap.StorageBuffer16BitAccess,
                wk.cap.UniformAndStorageBuffer16BitAccess,
                wk.cap.StoragePushConstant16,
                wk.cap.StorageInputOutput16,
            ]
            .into_iter()
            .any(has);
            if !enabled {
                return Err(Diag::invalid_data(
                    "Using a 16-bit integer type requires the Int16 capability, or an extension \
                     that explicitly enables 16-bit integers.",
                ));
            }
        }
        32 => {}
        64 => {
            if !has(wk.cap.Int64) {
                return Err(Diag::invalid_data(
                    "Using a 64-bit integer type requires the Int64 capability.",
                ));
            }
        }
        _ => {
            return Err(Diag::invalid_data(format!(
                "Invalid number of bits ({width}) used for OpTypeInt."
            )));
        }
    }

    if signedness > 1 {
        return Err(Diag::invalid_data(format!(
            "OpTypeInt has invalid signedness: {signedness}"
        )));
    }
    if signedness != 0 && has(wk.cap.Kernel) {
        return Err(Diag::invalid_binary(
            "The Signedness in OpTypeInt must always be 0 when Kernel capability is used.",
        ));
    }
    Ok(())
}

fn check_float_type(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let has = |cap| cx.has_capability(cap);

    match inst.imm_operand(0).unwrap_or(0) {
        16 => {
            let enabled = [
                wk.cap.Float16,
                wk.cap.Float16Buffer,
                wk.cap.StorageBuffer16BitAccess,
                wk.cap.UniformAndStorageBuffer16BitAccess,
                wk.cap.StoragePushConstant16,
                wk.cap.StorageInputOutput16,
            ]
            .into_iter()
            .any(has);
            if !enabled {
                return Err(Diag::invalid_data(
                    "Using a 16-bit floating point type requires the Float16 or Float16Buffer \
                     capability, or an extension that explicitly enables 16-bit floating point.",
                ));
            }
        }
        32 => {}
        64 => {
            if !has(wk.cap.Float64) {
                return Err(Diag::invalid_data(
                    "Using a 64-bit floating point type requires the Float64 capability.",
                ));
            }
        }
        width => {
            return Err(Diag::invalid_data(format!(
                "Invalid number of bits ({width}) used for OpTypeFloat."
            )));
        }
    }
    Ok(())
}

fn check_vector_type(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let component = cx.id_operand(inst, 0)?;
    if !cx.module.type_def(component).is_some_and(TypeDef::is_scalar) {
        return Err(Diag::invalid_id(format!(
            "OpTypeVector Component Type {} is not a scalar type.",
            cx.name(component)
        ))
        .with_id(component));
    }

    let count = inst.imm_operand(1).unwrap_or(0);
    let valid = match count {
        2..=4 => true,
        8 | 16 => cx.has_capability(cx.wk.cap.Vector16),
        _ => false,
    };
    if !valid {
        return Err(Diag::invalid_data(format!(
            "Illegal number of components ({count}) for TypeVector\nVector components number \
             must be 2, 3, or 4 (or 8 and 16 with the Vector16 capability)."
        )));
    }
    Ok(())
}

fn check_matrix_type(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let column = cx.id_operand(inst, 0)?;
    let Some(&TypeDef::Vector { component, .. }) = cx.module.type_def(column) else {
        return Err(Diag::invalid_id("Columns in a matrix must be of type vector.").with_id(column));
    };
    if !cx.module.is_float_scalar_type(component) {
        return Err(Diag::invalid_data(
            "Matrix types can only be parameterized with floating-point types.",
        ));
    }
    let count = inst.imm_operand(1).unwrap_or(0);
    if !(2..=4).contains(&count) {
        return Err(Diag::invalid_data(
            "Matrix types can only be parameterized as having only 2, 3, or 4 columns.",
        ));
    }
    Ok(())
}

fn check_element_not_void(cx: &RuleCx<'_>, inst: &spv::Inst, element: Id) -> Result<(), Diag> {
    match cx.module.type_def(element) {
        None => Err(Diag::invalid_id(format!(
            "{} Element Type {} is not a type.",
            inst.opcode.name(),
            cx.name(element)
        ))
        .with_id(element)),
        Some(TypeDef::Void) => Err(Diag::invalid_id(format!(
            "{} Element Type {} is a void type.",
            inst.opcode.name(),
            cx.name(element)
        ))
        .with_id(element)),
        Some(_) => Ok(()),
    }
}

fn check_array_type(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    check_element_not_void(cx, inst, cx.id_operand(inst, 0)?)?;

    let length = cx.id_operand(inst, 1)?;
    let length_is_int_constant = cx.module.is_constant(length)
        && cx.module.type_of(length).is_some_and(|ty| cx.module.is_int_scalar_type(ty));
    if !length_is_int_constant {
        return Err(Diag::invalid_id(format!(
            "OpTypeArray Length {} is not a scalar constant type.",
            cx.name(length)
        ))
        .with_id(length));
    }

    // Specialization constants may be overridden, only check actual values.
    if let Some(value) = cx.module.const_int_signed(length) {
        if value < 1 {
            return Err(Diag::invalid_id(format!(
                "OpTypeArray Length {} default value must be at least 1: found {value}",
                cx.name(length)
            ))
            .with_id(length));
        }
    }
    Ok(())
}

fn check_struct_type(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let m = cx.module;
    let limits = &cx.options.universal_limits;
    let Some(struct_id) = inst.result_id else { return Ok(()) };

    let members: Vec<Id> = inst.id_operands().map(|(_, id)| id).collect();
    if members.len() > limits.max_struct_members as usize {
        return Err(Diag::new(
            ErrorKind::OutOfResources,
            format!(
                "Number of OpTypeStruct members ({}) has exceeded the limit ({}).",
                members.len(),
                limits.max_struct_members
            ),
        )
        .with_id(struct_id));
    }

    for &member in &members {
        match m.type_def(member) {
            None if m.forward_pointers.contains(&member) => {}
            None => {
                return Err(Diag::invalid_id(format!(
                    "Structure {} contains non-type member {}.",
                    cx.name(struct_id),
                    cx.name(member)
                ))
                .with_id(member));
            }
            Some(TypeDef::Void) => {
                return Err(Diag::invalid_id(format!(
                    "Structures cannot contain a void type, but {} does.",
                    cx.name(struct_id)
                ))
                .with_id(struct_id));
            }
            Some(_) => {}
        }
    }

    let depth = m.struct_depth(struct_id);
    if depth > limits.max_struct_depth {
        return Err(Diag::new(
            ErrorKind::OutOfResources,
            format!(
                "Structure Nesting Depth may not be larger than {}. Found {depth}.",
                limits.max_struct_depth
            ),
        )
        .with_id(struct_id));
    }
    Ok(())
}

fn check_function_type(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let m = cx.module;
    let limits = &cx.options.universal_limits;
    let Some(Some(TypeDef::Function { ret, params })) = inst.result_id.map(|id| m.type_def(id))
    else {
        return Ok(());
    };

    if !m.is_type(*ret) {
        return Err(Diag::invalid_id(format!(
            "OpTypeFunction Return Type {} is not a type.",
            cx.name(*ret)
        ))
        .with_id(*ret));
    }

    if params.len() > limits.max_function_args as usize {
        return Err(Diag::new(
            ErrorKind::OutOfResources,
            format!(
                "OpTypeFunction may not take more than {} arguments. OpTypeFunction <id> {} has \
                 {} arguments.",
                limits.max_function_args,
                inst.result_id.map_or_else(String::new, |id| cx.name(id)),
                params.len()
            ),
        ));
    }

    for (i, &param) in params.iter().enumerate() {
        match m.type_def(param) {
            None => {
                return Err(Diag::invalid_id(format!(
                    "OpTypeFunction Parameter Type {} (parameter {i}) is not a type.",
                    cx.name(param)
                ))
                .with_id(param));
            }
            Some(TypeDef::Void) => {
                return Err(Diag::invalid_id(format!(
                    "OpTypeFunction Parameter Type {} cannot be OpTypeVoid.",
                    cx.name(param)
                ))
                .with_id(param));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn check_constant_composite(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let m = cx.module;
    let op_name = inst.opcode.name();
    let ty = result_type(inst)?;
    let constituents: Vec<Id> = inst.id_operands().map(|(_, id)| id).collect();

    for &c in &constituents {
        let is_constant_like = m.is_constant(c) || m.def_opcode(c) == Some(cx.wk.op.OpUndef);
        if !is_constant_like {
            return Err(Diag::invalid_id(format!(
                "{op_name} Constituent {} is not a constant or undef.",
                cx.name(c)
            ))
            .with_id(c));
        }
    }

    // Expected constituent count (if known), and either the one type shared by
    // every constituent, or the struct member types.
    let mut members: &[Id] = &[];
    let (count, uniform) = match m.type_def(ty) {
        Some(&TypeDef::Vector { component, count }) => (Some(u64::from(count)), Some(component)),
        Some(&TypeDef::Matrix { column, count }) => (Some(u64::from(count)), Some(column)),
        // Spec-constant lengths can't be checked against the constituent count.
        Some(&TypeDef::Array { element, length }) => (m.const_int(length), Some(element)),
        Some(TypeDef::Struct { members: struct_members }) => {
            members = struct_members;
            (Some(members.len() as u64), None)
        }
        // Tensor constants have their own rules.
        Some(TypeDef::Tensor { .. }) => return Ok(()),
        _ => {
            return Err(Diag::invalid_id(format!(
                "{op_name} Result Type {} is not a composite type.",
                cx.name(ty)
            ))
            .with_id(ty));
        }
    };

    if let Some(count) = count {
        if constituents.len() as u64 != count {
            return Err(Diag::invalid_id(format!(
                "{op_name} Constituent count ({}) does not match Result Type {}'s member count \
                 ({count}).",
                constituents.len(),
                cx.name(ty)
            ))
            .with_id(ty));
        }
    }
    let expected = |i: usize| uniform.or_else(|| members.get(i).copied());
    check_constituent_types(cx, inst, ty, &constituents, expected)
}

fn check_constituent_types(
    cx: &RuleCx<'_>,
    inst: &spv::Inst,
    ty: Id,
    constituents: &[Id],
    expected: impl Fn(usize) -> Option<Id>,
) -> Result<(), Diag> {
    for (i, &c) in constituents.iter().enumerate() {
        let (Some(expected), Some(actual)) = (expected(i), cx.module.type_of(c)) else {
            continue;
        };
        if expected != actual {
            return Err(Diag::invalid_id(format!(
                "{} Constituent {} type does not match the Result Type {}'s member type.",
                inst.opcode.name(),
                cx.name(c),
                cx.name(ty)
            ))
            .with_id(c));
        }
    }
    Ok(())
}

fn check_constant_null(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let ty = result_type(inst)?;
    if is_nullable(cx, ty, 0) {
        return Ok(());
    }
    // Tensor types have their own (more specific) error.
    if matches!(cx.module.type_def(ty), Some(TypeDef::Tensor { .. })) {
        return Ok(());
    }
    Err(Diag::invalid_id(format!(
        "OpConstantNull Result Type {} cannot have a null value.",
        cx.name(ty)
    ))
    .with_id(ty))
}

fn is_nullable(cx: &RuleCx<'_>, ty: Id, depth: u32) -> bool {
    if depth > cx.options.universal_limits.max_struct_depth {
        return false;
    }
    match cx.module.type_def(ty) {
        Some(
            TypeDef::Bool
            | TypeDef::Int { .. }
            | TypeDef::Float { .. }
            | TypeDef::Pointer { .. }
            | TypeDef::Event,
        ) => true,
        Some(
            &TypeDef::Vector { component: inner, .. }
            | &TypeDef::Matrix { column: inner, .. }
            | &TypeDef::Array { element: inner, .. },
        ) => is_nullable(cx, inner, depth + 1),
        Some(TypeDef::Struct { members }) => {
            members.iter().all(|&member| is_nullable(cx, member, depth + 1))
        }
        Some(TypeDef::Tensor { .. }) => tensor_has_full_shape(cx, ty),
        _ => false,
    }
}

/// Whether a tensor type has both `Rank` and `Shape` (`OpConstantNull` needs both).
pub(super) fn tensor_has_full_shape(cx: &RuleCx<'_>, ty: Id) -> bool {
    matches!(cx.module.type_def(ty), Some(TypeDef::Tensor { rank: Some(_), shape: Some(_), .. }))
}

/// Whether `c` is a null constant (kept here for composite/shape evaluation).
pub(super) fn is_null_constant(cx: &RuleCx<'_>, c: Id) -> bool {
    cx.module.const_def(c).is_some_and(|def| def.value == ConstValue::Null)
}

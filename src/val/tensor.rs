//! `OpTypeTensorARM`, tensor constants, and the tensor access instructions.

use super::scopes::check_memory_scope;
use super::types::{is_null_constant, tensor_has_full_shape};
use super::RuleCx;
use crate::diag::Diag;
use crate::module::{ConstValue, TypeDef};
use crate::spv::{self, Id};
use smallvec::SmallVec;

pub(super) fn check_inst(cx: &RuleCx<'_>, _idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let op = inst.opcode;

    if op == wk.op.OpTypeTensorARM {
        check_tensor_type(cx, inst)
    } else if op == wk.op.OpConstantNull {
        match inst.result_type_id {
            Some(ty) if is_tensor(cx, ty) && !tensor_has_full_shape(cx, ty) => {
                Err(Diag::invalid_id(format!(
                    "OpConstantNull Result Type {} must be a tensor type with both Rank and \
                     Shape specified.",
                    cx.name(ty)
                ))
                .with_id(ty))
            }
            _ => Ok(()),
        }
    } else if op == wk.op.OpConstantComposite || op == wk.op.OpSpecConstantComposite {
        match inst.result_type_id {
            Some(ty) if is_tensor(cx, ty) => check_tensor_composite(cx, inst, ty),
            _ => Ok(()),
        }
    } else if op == wk.op.OpTensorReadARM || op == wk.op.OpTensorWriteARM {
        check_tensor_access(cx, inst)
    } else if op == wk.op.OpTensorQuerySizeARM {
        check_query_size(cx, inst)
    } else {
        Ok(())
    }
}

fn is_tensor(cx: &RuleCx<'_>, ty: Id) -> bool {
    matches!(cx.module.type_def(ty), Some(TypeDef::Tensor { .. }))
}

/// The (default) value of an integer constant, including specialization
/// constants, which tensor ranks and shapes may be. Signed types are sign-extended.
fn int_constant_value(cx: &RuleCx<'_>, id: Id) -> Option<i64> {
    let m = cx.module;
    let &TypeDef::Int { width, signed } = m.type_def(m.type_of(id)?)? else {
        return None;
    };
    let bits = match &m.const_def(id)?.value {
        ConstValue::Scalar(words) => {
            let lo = u64::from(*words.first()?);
            let hi = u64::from(words.get(1).copied().unwrap_or(0));
            lo | (hi << 32)
        }
        ConstValue::Null => 0,
        _ => return None,
    };
    Some(match width {
        1..=63 if signed => {
            let shift = 64 - width;
            ((bits << shift) as i64) >> shift
        }
        _ => bits as i64,
    })
}

/// Rank and (if fully known) shape of a tensor type.
struct TensorShape {
    element: Id,
    rank: Option<i64>,
    shape: Option<SmallVec<[i64; 4]>>,
}

fn tensor_shape(cx: &RuleCx<'_>, ty: Id) -> Option<TensorShape> {
    let &TypeDef::Tensor { element, rank, shape } = cx.module.type_def(ty)? else {
        return None;
    };
    Some(TensorShape {
        element,
        rank: rank.and_then(|r| int_constant_value(cx, r)),
        shape: shape.and_then(|s| shape_values(cx, s)),
    })
}

/// Values of a shape constant (an array of integer constants).
///
/// A null shape has no usable values, `OpTypeTensorARM` already rejects it.
fn shape_values(cx: &RuleCx<'_>, shape: Id) -> Option<SmallVec<[i64; 4]>> {
    match &cx.module.const_def(shape)?.value {
        ConstValue::Composite(constituents) => {
            constituents.iter().map(|&c| int_constant_value(cx, c)).collect()
        }
        _ => None,
    }
}

fn check_tensor_type(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let m = cx.module;
    let element = cx.id_operand(inst, 0)?;
    if !m.type_def(element).is_some_and(TypeDef::is_scalar) {
        return Err(Diag::invalid_data(format!(
            "OpTypeTensorARM Element Type {} is not a scalar type.",
            cx.name(element)
        ))
        .with_id(element));
    }

    let Some(rank) = inst.id_operand(1) else { return Ok(()) };
    let rank_is_int_constant =
        m.is_constant(rank) && m.type_of(rank).is_some_and(|ty| m.is_int_scalar_type(ty));
    if !rank_is_int_constant {
        return Err(Diag::invalid_data(format!(
            "OpTypeTensorARM Rank {} must be a constant instruction with scalar integer type.",
            cx.name(rank)
        ))
        .with_id(rank));
    }
    let rank_value = int_constant_value(cx, rank);
    if rank_value.is_some_and(|rank| rank <= 0) {
        return Err(Diag::invalid_data(format!(
            "OpTypeTensorARM Rank {} must define a value greater than 0.",
            cx.name(rank)
        ))
        .with_id(rank));
    }

    let Some(shape) = inst.id_operand(2) else { return Ok(()) };
    let shape_array = m.type_of(shape).and_then(|ty| match *m.type_def(ty)? {
        TypeDef::Array { element, length } if m.is_int_scalar_type(element) => Some(length),
        _ => None,
    });
    let Some(shape_length) = shape_array.filter(|_| m.is_constant(shape)) else {
        return Err(Diag::invalid_data(format!(
            "OpTypeTensorARM Shape {} must be a constant instruction defining an array of \
             integer scalars.",
            cx.name(shape)
        ))
        .with_id(shape));
    };

    let shape_length = int_constant_value(cx, shape_length);
    if let (Some(len), Some(rank)) = (shape_length, rank_value) {
        if len != rank {
            return Err(Diag::invalid_data(format!(
                "OpTypeTensorARM Shape {} must have a length ({len}) equal to the Rank ({rank}).",
                cx.name(shape)
            ))
            .with_id(shape));
        }
    }

    // Every element of a null shape is 0.
    if is_null_constant(cx, shape) {
        return Err(Diag::invalid_data(
            "OpTypeTensorARM Shape constituent 0 is not greater than 0.",
        )
        .with_id(shape));
    }

    // Non-evaluable constituents (e.g. `OpSpecConstantOp`) are left alone.
    let Some(ConstValue::Composite(constituents)) = m.const_def(shape).map(|def| &def.value) else {
        return Ok(());
    };
    for (i, &c) in constituents.iter().enumerate() {
        if int_constant_value(cx, c).is_some_and(|value| value <= 0) {
            return Err(Diag::invalid_data(format!(
                "OpTypeTensorARM Shape constituent {i} is not greater than 0."
            ))
            .with_id(shape));
        }
    }
    Ok(())
}

fn check_tensor_composite(cx: &RuleCx<'_>, inst: &spv::Inst, ty: Id) -> Result<(), Diag> {
    let m = cx.module;
    let op_name = inst.opcode.name();
    let Some(TensorShape { element, rank: Some(rank), shape: Some(shape) }) = tensor_shape(cx, ty)
    else {
        return Err(Diag::invalid_data(format!(
            "{op_name} Result Type {} must be a tensor type with both Rank and Shape specified.",
            cx.name(ty)
        ))
        .with_id(ty));
    };

    let constituents: SmallVec<[Id; 4]> = inst.id_operands().map(|(_, id)| id).collect();
    let outer = shape.first().copied().unwrap_or(0);
    if constituents.len() as i64 != outer {
        return Err(Diag::invalid_data(format!(
            "{op_name} Constituent count ({}) does not match the outermost dimension of Result \
             Type {} ({outer}).",
            constituents.len(),
            cx.name(ty)
        ))
        .with_id(ty));
    }

    for &constituent in &constituents {
        let constituent_ty = m.type_of(constituent);
        let matches = if rank == 1 {
            constituent_ty == Some(element)
        } else {
            constituent_ty.and_then(|t| tensor_shape(cx, t)).is_some_and(|inner| {
                inner.element == element
                    && inner.rank == Some(rank - 1)
                    && inner.shape.as_deref() == Some(&shape[1..])
            })
        };
        if !matches {
            let expected = if rank == 1 {
                format!("the Element Type {}", cx.name(element))
            } else {
                format!("a tensor of Rank {} with the same Element Type and inner Shape", rank - 1)
            };
            return Err(Diag::invalid_data(format!(
                "{op_name} Constituent {} must have {expected}.",
                cx.name(constituent)
            ))
            .with_id(constituent));
        }
    }
    Ok(())
}

fn check_tensor_access(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let m = cx.module;
    let is_read = inst.opcode == wk.op.OpTensorReadARM;
    let op_name = inst.opcode.name();

    let tensor = cx.id_operand(inst, 0)?;
    let tensor_ty = cx.type_of(inst, tensor)?;
    let Some(TensorShape { element, rank: Some(rank), .. }) = tensor_shape(cx, tensor_ty) else {
        return Err(Diag::invalid_data(format!(
            "{op_name} Tensor {} must be a ranked tensor.",
            cx.name(tensor)
        ))
        .with_id(tensor));
    };

    let coords = cx.id_operand(inst, 1)?;
    let coords_len = m.type_of(coords).and_then(|ty| match *m.type_def(ty)? {
        TypeDef::Array { element, length } if m.is_int_scalar_type(element) => {
            int_constant_value(cx, length)
        }
        _ => None,
    });
    if coords_len != Some(rank) {
        return Err(Diag::invalid_data(format!(
            "{op_name} Coordinates {} must be an array of integer scalars with a length equal \
             to the Rank of Tensor ({rank}).",
            cx.name(coords)
        ))
        .with_id(coords));
    }

    let (value_ty, what) = if is_read {
        (inst.result_type_id, "Result Type")
    } else {
        (Some(cx.type_of(inst, cx.id_operand(inst, 2)?)?), "Object type")
    };
    let value_ok = value_ty.is_some_and(|ty| {
        ty == element
            || matches!(m.type_def(ty), Some(&TypeDef::Array { element: e, .. }) if e == element)
    });
    if !value_ok {
        return Err(Diag::invalid_data(format!(
            "{op_name} {what} must be the Element Type of Tensor, or an array of it."
        )));
    }

    let operands_idx = if is_read { 2 } else { 3 };
    check_tensor_operands(cx, inst, operands_idx, element)
}

fn check_tensor_operands(
    cx: &RuleCx<'_>,
    inst: &spv::Inst,
    idx: usize,
    element: Id,
) -> Result<(), Diag> {
    let wk = cx.wk;
    let ops = &wk.tensor_op;
    let op_name = inst.opcode.name();
    let is_read = inst.opcode == wk.op.OpTensorReadARM;
    let Some(mask) = inst.imm_operand(idx) else { return Ok(()) };

    if is_read && mask & ops.MakeElementAvailableARM != 0 {
        return Err(Diag::invalid_data(format!(
            "{op_name}: MakeElementAvailableARM cannot be used with a read."
        )));
    }
    if !is_read {
        for (bit, name) in [
            (ops.MakeElementVisibleARM, "MakeElementVisibleARM"),
            (ops.OutOfBoundsValueARM, "OutOfBoundsValueARM"),
        ] {
            if mask & bit != 0 {
                return Err(Diag::invalid_data(format!(
                    "{op_name}: {name} cannot be used with a write."
                )));
            }
        }
    }

    for (bit, name) in [
        (ops.MakeElementAvailableARM, "MakeElementAvailableARM"),
        (ops.MakeElementVisibleARM, "MakeElementVisibleARM"),
    ] {
        if mask & bit == 0 {
            continue;
        }
        if mask & ops.NonPrivateElementARM == 0 {
            return Err(Diag::invalid_data(format!(
                "{op_name}: NonPrivateElementARM must be specified if {name} is specified."
            )));
        }
        if let Some(scope) = inst.mask_param(idx, bit).and_then(|p| p.first()?.as_id()) {
            check_memory_scope(cx, inst, scope)?;
        }
    }

    if mask & ops.OutOfBoundsValueARM != 0 {
        let value = inst.mask_param(idx, ops.OutOfBoundsValueARM).and_then(|p| p.first()?.as_id());
        let value_ty = value.and_then(|v| cx.module.type_of(v));
        if value_ty != Some(element) {
            return Err(Diag::invalid_data(format!(
                "{op_name}: OutOfBoundsValueARM operand must have the Element Type of Tensor."
            )));
        }
    }
    Ok(())
}

fn check_query_size(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let m = cx.module;
    let op_name = inst.opcode.name();

    let tensor = cx.id_operand(inst, 0)?;
    let tensor_ty = cx.type_of(inst, tensor)?;
    let Some(TensorShape { rank: Some(rank), .. }) = tensor_shape(cx, tensor_ty) else {
        return Err(Diag::invalid_data(format!(
            "{op_name} Tensor {} must be a ranked tensor.",
            cx.name(tensor)
        ))
        .with_id(tensor));
    };

    let dimension = cx.id_operand(inst, 1)?;
    let dim = (!m.is_spec_constant(dimension)).then(|| int_constant_value(cx, dimension));
    let Some(dim) = dim.flatten() else {
        return Err(Diag::invalid_data(format!(
            "{op_name} Dimension {} must be a constant scalar integer.",
            cx.name(dimension)
        ))
        .with_id(dimension));
    };
    if dim < 0 || dim >= rank {
        return Err(Diag::invalid_data(format!(
            "{op_name} Dimension ({dim}) must be less than the Rank of Tensor ({rank})."
        ))
        .with_id(dimension));
    }

    if !inst.result_type_id.is_some_and(|ty| m.is_int_scalar_type(ty)) {
        return Err(Diag::invalid_data(format!(
            "{op_name} Result Type must be an integer scalar type."
        )));
    }
    Ok(())
}

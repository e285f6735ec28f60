//! Atomic instructions.

use super::memory_semantics::check_memory_semantics;
use super::scopes::check_memory_scope;
use super::RuleCx;
use crate::diag::Diag;
use crate::module::TypeDef;
use crate::spv::{self, spec, Id};

pub(super) fn is_atomic_opcode(wk: &spec::WellKnown, opcode: spec::Opcode) -> bool {
    [
        wk.op.OpAtomicLoad,
        wk.op.OpAtomicStore,
        wk.op.OpAtomicExchange,
        wk.op.OpAtomicCompareExchange,
        wk.op.OpAtomicCompareExchangeWeak,
        wk.op.OpAtomicIIncrement,
        wk.op.OpAtomicIDecrement,
        wk.op.OpAtomicIAdd,
        wk.op.OpAtomicISub,
        wk.op.OpAtomicSMin,
        wk.op.OpAtomicUMin,
        wk.op.OpAtomicSMax,
        wk.op.OpAtomicUMax,
        wk.op.OpAtomicAnd,
        wk.op.OpAtomicOr,
        wk.op.OpAtomicXor,
        wk.op.OpAtomicFlagTestAndSet,
        wk.op.OpAtomicFlagClear,
        wk.op.OpAtomicFAddEXT,
        wk.op.OpAtomicFMinEXT,
        wk.op.OpAtomicFMaxEXT,
    ]
    .contains(&opcode)
}

/// What kind of scalar an atomic operates on.
#[derive(Copy, Clone, PartialEq, Eq)]
enum DataKind {
    IntOrFloat,
    Int,
    Float,
    Bool,
    /// `OpAtomicFlagClear` has no data operand, only a 32-bit integer pointee.
    None,
}

pub(super) fn check_inst(cx: &RuleCx<'_>, _idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let op = inst.opcode;
    if !is_atomic_opcode(wk, op) {
        return Ok(());
    }

    let is_compare_exchange =
        [wk.op.OpAtomicCompareExchange, wk.op.OpAtomicCompareExchangeWeak].contains(&op);
    let data_kind = if [wk.op.OpAtomicLoad, wk.op.OpAtomicStore, wk.op.OpAtomicExchange].contains(&op) {
        DataKind::IntOrFloat
    } else if [wk.op.OpAtomicFAddEXT, wk.op.OpAtomicFMinEXT, wk.op.OpAtomicFMaxEXT].contains(&op) {
        DataKind::Float
    } else if op == wk.op.OpAtomicFlagTestAndSet {
        DataKind::Bool
    } else if op == wk.op.OpAtomicFlagClear {
        DataKind::None
    } else {
        DataKind::Int
    };

    // `OpAtomicStore`'s data type is that of its `Value`, every other data type is the result's.
    let data_type = if op == wk.op.OpAtomicStore {
        Some(cx.type_of(inst, cx.id_operand(inst, 3)?)?)
    } else {
        inst.result_type_id
    };

    if let Some(data_type) = data_type {
        check_data_type(cx, inst, data_kind, data_type)?;
    }

    let pointer = cx.id_operand(inst, 0)?;
    check_pointer(cx, inst, pointer, data_kind, data_type)?;

    // Value (and Comparator) operands must match the data type.
    let value_operands: &[(usize, &str)] = if is_compare_exchange {
        &[(4, "Value"), (5, "Comparator")]
    } else if data_kind == DataKind::Bool
        || data_kind == DataKind::None
        || [wk.op.OpAtomicLoad, wk.op.OpAtomicStore, wk.op.OpAtomicIIncrement, wk.op.OpAtomicIDecrement]
            .contains(&op)
    {
        &[]
    } else {
        &[(3, "Value")]
    };
    for &(i, what) in value_operands {
        let value = cx.id_operand(inst, i)?;
        if Some(cx.type_of(inst, value)?) != data_type {
            return Err(Diag::invalid_data(format!(
                "{}: expected {what} to be of type Result Type",
                op.short_name()
            ))
            .with_id(value));
        }
    }

    // Memory semantics before scope, the former having the more specific errors.
    check_memory_semantics(cx, inst, cx.id_operand(inst, 2)?)?;
    if is_compare_exchange {
        let unequal = cx.id_operand(inst, 3)?;
        check_memory_semantics(cx, inst, unequal)?;
        if let Some(value) = cx.module.const_u32(unequal) {
            if value & (wk.sem.Release | wk.sem.AcquireRelease) != 0 {
                return Err(Diag::invalid_data(format!(
                    "{}: Memory Semantics Release and AcquireRelease cannot be used for operand \
                     Unequal",
                    op.short_name()
                ))
                .with_id(unequal));
            }
        }
    }
    check_memory_scope(cx, inst, cx.id_operand(inst, 1)?)
}

fn check_data_type(
    cx: &RuleCx<'_>,
    inst: &spv::Inst,
    data_kind: DataKind,
    data_type: Id,
) -> Result<(), Diag> {
    let wk = cx.wk;
    let op = inst.opcode;
    let op_name = op.short_name();
    let what = if op == wk.op.OpAtomicStore { "Value type" } else { "Result Type" };

    let def = cx.module.type_def(data_type);
    let (ok, expected) = match data_kind {
        DataKind::IntOrFloat => (
            matches!(def, Some(TypeDef::Int { .. } | TypeDef::Float { .. })),
            "integer or float scalar type",
        ),
        DataKind::Int => (matches!(def, Some(TypeDef::Int { .. })), "integer scalar type"),
        DataKind::Float => (matches!(def, Some(TypeDef::Float { .. })), "float scalar type"),
        DataKind::Bool => (matches!(def, Some(TypeDef::Bool)), "bool scalar type"),
        DataKind::None => (true, ""),
    };
    if !ok {
        return Err(Diag::invalid_data(format!("{op_name}: expected {what} to be {expected}")));
    }

    match def {
        Some(&TypeDef::Int { width, .. }) if width != 32 && width != 64 => {
            Err(Diag::invalid_data(format!(
                "{op_name}: expected {what} to be 32- or 64-bit integer scalar type, found \
                 {width}-bit"
            )))
        }
        Some(TypeDef::Int { width: 64, .. }) if !cx.has_capability(wk.cap.Int64Atomics) => {
            Err(Diag::invalid_data(format!(
                "{op_name}: 64-bit atomics require the Int64Atomics capability"
            )))
        }
        Some(&TypeDef::Float { width }) if data_kind == DataKind::Float => {
            let (caps, kind) = if op == wk.op.OpAtomicFAddEXT {
                (
                    [wk.cap.AtomicFloat16AddEXT, wk.cap.AtomicFloat32AddEXT, wk.cap.AtomicFloat64AddEXT],
                    "add",
                )
            } else {
                (
                    [
                        wk.cap.AtomicFloat16MinMaxEXT,
                        wk.cap.AtomicFloat32MinMaxEXT,
                        wk.cap.AtomicFloat64MinMaxEXT,
                    ],
                    "min/max",
                )
            };
            let required = match width {
                16 => caps[0],
                32 => caps[1],
                _ => caps[2],
            };
            if cx.has_capability(required) {
                Ok(())
            } else {
                Err(Diag::invalid_data(format!(
                    "{op_name}: float {kind} atomics require the {} capability",
                    spec::Spec::get().capability_name(required)
                )))
            }
        }
        // Loads, stores and exchanges of 16-bit floats come with 16-bit float atomics.
        Some(TypeDef::Float { width: 16 })
            if ![wk.cap.AtomicFloat16AddEXT, wk.cap.AtomicFloat16MinMaxEXT]
                .into_iter()
                .any(|cap| cx.has_capability(cap)) =>
        {
            Err(Diag::invalid_data(format!(
                "{op_name}: 16-bit float atomics require the AtomicFloat16AddEXT or \
                 AtomicFloat16MinMaxEXT capability"
            )))
        }
        _ => Ok(()),
    }
}

fn check_pointer(
    cx: &RuleCx<'_>,
    inst: &spv::Inst,
    pointer: Id,
    data_kind: DataKind,
    data_type: Option<Id>,
) -> Result<(), Diag> {
    let wk = cx.wk;
    let m = cx.module;
    let op = inst.opcode;
    let op_name = op.short_name();

    let Some((storage_class, pointee)) = m.type_of(pointer).and_then(|ty| m.pointer_type(ty)) else {
        return Err(Diag::invalid_data(format!(
            "{op_name}: expected Pointer to be of type OpTypePointer"
        ))
        .with_id(pointer));
    };

    match data_kind {
        DataKind::Bool | DataKind::None => {
            let is_u32 = m.is_int_scalar_type(pointee) && m.bit_width(pointee) == Some(32);
            if !is_u32 {
                return Err(Diag::invalid_data(format!(
                    "{op_name}: expected Pointer to point to a value of 32-bit integer type"
                ))
                .with_id(pointer));
            }
        }
        _ if Some(pointee) != data_type => {
            let msg = if op == wk.op.OpAtomicStore {
                format!(
                    "{op_name}: expected Value type and the type pointed to by Pointer to be the same"
                )
            } else {
                format!("{op_name}: expected Pointer to point to a value of type Result Type")
            };
            return Err(Diag::invalid_data(msg).with_id(pointer));
        }
        _ => {}
    }

    if cx.is_vulkan() {
        let task_payload = wk.kind.StorageClass.enumerant_value("TaskPayloadWorkgroupEXT");
        let allowed = [
            wk.sc.Uniform,
            wk.sc.Workgroup,
            wk.sc.Image,
            wk.sc.StorageBuffer,
            wk.sc.PhysicalStorageBuffer,
        ];
        if !allowed.contains(&storage_class) && Some(storage_class) != task_payload {
            return Err(Diag::invalid_data(format!(
                "{op_name}: Vulkan spec only allows storage classes for atomic to be: Uniform, \
                 Workgroup, Image, StorageBuffer, PhysicalStorageBuffer or TaskPayloadWorkgroupEXT."
            ))
            .with_id(pointer)
            .with_vuid("VUID-StandaloneSpirv-None-04686"));
        }
    }
    Ok(())
}

//! Variables, memory accesses and access chains.

use super::scopes::check_memory_scope;
use super::RuleCx;
use crate::diag::{Diag, ErrorKind};
use crate::module::TypeDef;
use crate::spv::{self, Id, Version};

pub(super) fn check_inst(cx: &RuleCx<'_>, _idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let op = inst.opcode;

    if op == wk.op.OpVariable {
        check_variable(cx, inst)
    } else if op == wk.op.OpTypeStruct && cx.is_vulkan() {
        check_vulkan_struct_runtime_arrays(cx, inst)
    } else if (op == wk.op.OpTypeArray || op == wk.op.OpTypeRuntimeArray) && cx.is_vulkan() {
        let element = cx.id_operand(inst, 0)?;
        if matches!(cx.module.type_def(element), Some(TypeDef::RuntimeArray { .. })) {
            return Err(Diag::invalid_id(format!(
                "{} Element Type {} is not valid in Vulkan environments.",
                op.name(),
                cx.name(element)
            ))
            .with_id(element)
            .with_vuid("VUID-StandaloneSpirv-OpTypeRuntimeArray-04680"));
        }
        Ok(())
    } else if op == wk.op.OpLoad {
        check_load(cx, inst)
    } else if op == wk.op.OpStore {
        check_store(cx, inst)
    } else if op == wk.op.OpCopyMemory || op == wk.op.OpCopyMemorySized {
        check_copy_memory(cx, inst)
    } else if [wk.op.OpAccessChain, wk.op.OpInBoundsAccessChain, wk.op.OpPtrAccessChain]
        .contains(&op)
    {
        check_access_chain(cx, inst)
    } else {
        Ok(())
    }
}

fn storage_class_name(cx: &RuleCx<'_>, sc: u32) -> &'static str {
    cx.wk.kind.StorageClass.enumerant_name(sc).unwrap_or("unknown")
}

fn check_variable(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let m = cx.module;
    let Some(ty) = inst.result_type_id else { return Ok(()) };
    let var = inst.result_id;

    let Some((ptr_sc, pointee)) = m.pointer_type(ty) else {
        return Err(Diag::invalid_id(format!(
            "OpVariable Result Type {} is not a pointer type.",
            cx.name(ty)
        ))
        .with_id(ty));
    };
    let sc = inst.imm_operand(0).unwrap_or(ptr_sc);
    if sc != ptr_sc {
        return Err(Diag::invalid_id(
            "From SPIR-V spec, section 3.32.8 on OpVariable:\nIts Storage Class operand must be \
             the same as the Storage Class operand of the result type.",
        ));
    }

    if let Some(init) = inst.id_operand(1) {
        let is_global_var = m.def_opcode(init) == Some(wk.op.OpVariable)
            && m.ids.get(&init).is_some_and(|info| info.function.is_none());
        if !m.is_constant(init) && !is_global_var {
            return Err(Diag::invalid_id(format!(
                "OpVariable Initializer {} is not a constant or module-scope variable.",
                cx.name(init)
            ))
            .with_id(init));
        }
        if m.type_of(init) != Some(pointee) {
            return Err(Diag::invalid_id(format!(
                "Initializer type must match the type pointed to by the Result Type {}",
                cx.name(ty)
            ))
            .with_id(init));
        }
    }

    if cx.is_vulkan() {
        check_vulkan_variable(cx, var, sc, pointee)?;
    }
    check_small_storage_types(cx, var, sc, pointee)
}

fn check_vulkan_variable(cx: &RuleCx<'_>, var: Option<Id>, sc: u32, pointee: Id) -> Result<(), Diag> {
    let wk = cx.wk;
    let m = cx.module;
    let var_name = var.map_or_else(String::new, |v| cx.name(v));
    let with_var = |diag: Diag| match var {
        Some(v) => diag.with_id(v),
        None => diag,
    };

    let element = m.strip_arrays(pointee);
    let element_def = m.type_def(element);

    if sc == wk.sc.UniformConstant && !element_def.is_some_and(TypeDef::is_opaque_resource) {
        return Err(with_var(Diag::invalid_id(format!(
            "From Vulkan spec:\nVariables identified with the UniformConstant storage class are \
             used only as handles to refer to opaque resources. Such variables must be typed as \
             OpTypeImage, OpTypeSampler, OpTypeSampledImage, OpTypeAccelerationStructureKHR, or \
             an array of one of these types.\n{var_name}"
        )))
        .with_vuid("VUID-StandaloneSpirv-UniformConstant-04655"));
    }

    for buffer_sc in [wk.sc.Uniform, wk.sc.StorageBuffer] {
        if sc == buffer_sc && !matches!(element_def, Some(TypeDef::Struct { .. })) {
            return Err(with_var(Diag::invalid_id(format!(
                "From Vulkan spec:\nVariables identified with the {} storage class are used to \
                 access transparent buffer backed resources. Such variables must be typed as \
                 OpTypeStruct, or an array of this type\n{var_name}",
                storage_class_name(cx, sc)
            )))
            .with_vuid("VUID-StandaloneSpirv-Uniform-06807"));
        }
    }

    // Runtime arrays as the variable's own type (i.e. descriptor arrays).
    let descriptor_sc = [wk.sc.StorageBuffer, wk.sc.Uniform, wk.sc.UniformConstant];
    if let Some(TypeDef::RuntimeArray { .. }) = m.type_def(pointee) {
        let allowed = cx.has_capability(wk.cap.RuntimeDescriptorArray) && descriptor_sc.contains(&sc);
        if !allowed {
            return Err(with_var(Diag::invalid_id(format!(
                "OpVariable, <id> {var_name}, is attempting to create memory for an illegal \
                 type, OpTypeRuntimeArray.\nFor Vulkan OpTypeRuntimeArray can only appear as \
                 the final member of an OpTypeStruct, thus cannot be instantiated via OpVariable \
                 (unless RuntimeDescriptorArrayEXT is used with a StorageBuffer, Uniform or \
                 UniformConstant storage class)"
            )))
            .with_vuid("VUID-StandaloneSpirv-OpTypeRuntimeArray-04680"));
        }
    }

    // Structs ending in a runtime array.
    if let Some(TypeDef::Struct { members }) = element_def {
        let trailing_runtime_array = members
            .last()
            .is_some_and(|&last| matches!(m.type_def(last), Some(TypeDef::RuntimeArray { .. })));
        if trailing_runtime_array {
            let vuid = "VUID-StandaloneSpirv-OpTypeRuntimeArray-04680";
            if sc == wk.sc.StorageBuffer && !m.has_decoration(element, wk.deco.Block) {
                return Err(with_var(Diag::invalid_id(
                    "For Vulkan, an OpTypeStruct variable containing an OpTypeRuntimeArray must \
                     be decorated with Block if it has storage class StorageBuffer.",
                ))
                .with_vuid(vuid));
            }
            if sc == wk.sc.Uniform && !m.has_decoration(element, wk.deco.BufferBlock) {
                return Err(with_var(Diag::invalid_id(
                    "For Vulkan, an OpTypeStruct variable containing an OpTypeRuntimeArray must \
                     be decorated with BufferBlock if it has storage class Uniform.",
                ))
                .with_vuid(vuid));
            }
            if ![wk.sc.StorageBuffer, wk.sc.Uniform, wk.sc.PhysicalStorageBuffer].contains(&sc) {
                return Err(with_var(Diag::invalid_id(
                    "For Vulkan, OpTypeStruct variables containing OpTypeRuntimeArray must have \
                     storage class of StorageBuffer, PhysicalStorageBuffer, or Uniform.",
                ))
                .with_vuid(vuid));
            }
        }
    }
    Ok(())
}

fn check_vulkan_struct_runtime_arrays(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let members: Vec<Id> = inst.id_operands().map(|(_, id)| id).collect();
    let Some((_, init)) = members.split_last() else { return Ok(()) };
    for (i, &member) in init.iter().enumerate() {
        if matches!(cx.module.type_def(member), Some(TypeDef::RuntimeArray { .. })) {
            return Err(Diag::invalid_id(format!(
                "In Vulkan, OpTypeRuntimeArray must only be used for the last member of an \
                 OpTypeStruct, but member {i} of {} is one.",
                inst.result_id.map_or_else(String::new, |id| cx.name(id))
            ))
            .with_id(member)
            .with_vuid("VUID-StandaloneSpirv-OpTypeRuntimeArray-04680"));
        }
    }
    Ok(())
}

/// 8-/16-bit types in memory need either the full `Int8`/`Int16`/`Float16`
/// capability, or the storage-class-specific access capability.
fn check_small_storage_types(cx: &RuleCx<'_>, var: Option<Id>, sc: u32, pointee: Id) -> Result<(), Diag> {
    let wk = cx.wk;
    let m = cx.module;
    let has = |cap| cx.has_capability(cap);

    let has_int = |width| {
        m.contains_type(pointee, &mut |_, def| matches!(*def, TypeDef::Int { width: w, .. } if w == width))
    };
    let has_float16 = m.contains_type(pointee, &mut |_, def| matches!(*def, TypeDef::Float { width: 16 }));

    let needs_16 = (has_int(16) && !has(wk.cap.Int16))
        || (has_float16 && !has(wk.cap.Float16) && !has(wk.cap.Float16Buffer));
    if needs_16 {
        let buffer_block = m.has_decoration(m.strip_arrays(pointee), wk.deco.BufferBlock);
        let allowed = if sc == wk.sc.StorageBuffer || sc == wk.sc.PhysicalStorageBuffer {
            has(wk.cap.StorageBuffer16BitAccess)
        } else if sc == wk.sc.Uniform {
            has(wk.cap.UniformAndStorageBuffer16BitAccess)
                || (buffer_block && has(wk.cap.StorageBuffer16BitAccess))
        } else if sc == wk.sc.PushConstant {
            has(wk.cap.StoragePushConstant16)
        } else if sc == wk.sc.Input || sc == wk.sc.Output {
            has(wk.cap.StorageInputOutput16)
        } else {
            false
        };
        if !allowed {
            return Err(small_type_error(cx, var, sc, 16));
        }
    }

    if has_int(8) && !has(wk.cap.Int8) {
        let buffer_block = m.has_decoration(m.strip_arrays(pointee), wk.deco.BufferBlock);
        let allowed = if sc == wk.sc.StorageBuffer || sc == wk.sc.PhysicalStorageBuffer {
            has(wk.cap.StorageBuffer8BitAccess)
        } else if sc == wk.sc.Uniform {
            has(wk.cap.UniformAndStorageBuffer8BitAccess)
                || (buffer_block && has(wk.cap.StorageBuffer8BitAccess))
        } else if sc == wk.sc.PushConstant {
            has(wk.cap.StoragePushConstant8)
        } else {
            false
        };
        if !allowed {
            return Err(small_type_error(cx, var, sc, 8));
        }
    }
    Ok(())
}

fn small_type_error(cx: &RuleCx<'_>, var: Option<Id>, sc: u32, width: u32) -> Diag {
    let diag = Diag::invalid_id(format!(
        "Allocating a variable containing a {width}-bit element in {} storage class requires an \
         additional capability",
        storage_class_name(cx, sc)
    ));
    match var {
        Some(var) => diag.with_id(var),
        None => diag,
    }
}

/// Storage class and pointee type of a pointer-typed operand.
fn pointer_operand(cx: &RuleCx<'_>, inst: &spv::Inst, idx: usize, what: &str) -> Result<(Id, u32, Id), Diag> {
    let pointer = cx.id_operand(inst, idx)?;
    let m = cx.module;
    match m.type_of(pointer).and_then(|ty| m.pointer_type(ty)) {
        Some((sc, pointee)) => Ok((pointer, sc, pointee)),
        None => Err(Diag::invalid_id(format!(
            "{} {what} {} is not a logical pointer.",
            inst.opcode.name(),
            cx.name(pointer)
        ))
        .with_id(pointer)),
    }
}

fn check_load(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let (pointer, sc, pointee) = pointer_operand(cx, inst, 0, "Pointer")?;
    if inst.result_type_id != Some(pointee) {
        return Err(Diag::invalid_id(format!(
            "OpLoad Result Type {} does not match Pointer {}s type.",
            inst.result_type_id.map_or_else(String::new, |ty| cx.name(ty)),
            cx.name(pointer)
        ))
        .with_id(pointer));
    }
    check_memory_access(cx, inst, 1, &[sc], AccessKind::Load)
}

fn check_store(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let (pointer, sc, pointee) = pointer_operand(cx, inst, 0, "Pointer")?;
    let object = cx.id_operand(inst, 1)?;

    if cx.type_of(inst, object)? != pointee {
        return Err(Diag::invalid_id(format!(
            "OpStore Pointer {}s type does not match Object {}s type.",
            cx.name(pointer),
            cx.name(object)
        ))
        .with_id(object));
    }

    if [wk.sc.Input, wk.sc.UniformConstant, wk.sc.PushConstant].contains(&sc) {
        return Err(Diag::invalid_id(format!(
            "OpStore Pointer {} storage class is read-only",
            cx.name(pointer)
        ))
        .with_id(pointer));
    }

    check_memory_access(cx, inst, 2, &[sc], AccessKind::Store)
}

fn check_copy_memory(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let m = cx.module;
    let sized = inst.opcode == wk.op.OpCopyMemorySized;

    let (target, target_sc, target_pointee) = pointer_operand(cx, inst, 0, "Target")?;
    let (source, source_sc, source_pointee) = pointer_operand(cx, inst, 1, "Source")?;

    if !sized && target_pointee != source_pointee {
        return Err(Diag::invalid_id(format!(
            "Target {}s type does not match Source {}s type.",
            cx.name(target),
            cx.name(source)
        ))
        .with_id(target));
    }
    if sized {
        let size = cx.id_operand(inst, 2)?;
        let size_ty = cx.type_of(inst, size)?;
        if !m.is_int_scalar_type(size_ty) {
            return Err(Diag::invalid_id(format!(
                "Size {}s type must be an integer scalar.",
                cx.name(size)
            ))
            .with_id(size));
        }
        if m.const_int(size) == Some(0) {
            return Err(Diag::invalid_id(format!("Size {} cannot be a constant zero.", cx.name(size)))
                .with_id(size));
        }
    }

    let first_access = if sized { 3 } else { 2 };
    let has_second_access = inst.num_logical_operands() > first_access + 1;
    if !has_second_access {
        return check_memory_access(cx, inst, first_access, &[target_sc, source_sc], AccessKind::Copy);
    }

    if cx.env_version() < Version::new(1, 4) {
        return Err(Diag::wrong_version(format!(
            "{} with two memory access operands requires SPIR-V 1.4 or later",
            inst.opcode.short_name()
        )));
    }
    check_memory_access(cx, inst, first_access, &[target_sc], AccessKind::CopyTarget)?;
    check_memory_access(cx, inst, first_access + 1, &[source_sc], AccessKind::CopySource)
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum AccessKind {
    Load,
    Store,
    /// A single memory access mask, applying to both copy operands.
    Copy,
    CopyTarget,
    CopySource,
}

/// Check the `MemoryAccess` mask at logical operand `idx` (if any), for
/// accesses through pointers of the given storage classes.
fn check_memory_access(
    cx: &RuleCx<'_>,
    inst: &spv::Inst,
    idx: usize,
    storage_classes: &[u32],
    kind: AccessKind,
) -> Result<(), Diag> {
    let wk = cx.wk;
    let ma = &wk.ma;
    let mask = inst.imm_operand(idx).unwrap_or(0);

    if storage_classes.contains(&wk.sc.PhysicalStorageBuffer) && mask & ma.Aligned == 0 {
        return Err(Diag::invalid_id("Memory accesses with PhysicalStorageBuffer must use Aligned.")
            .with_vuid("VUID-StandaloneSpirv-PhysicalStorageBuffer64-06314"));
    }

    if mask & ma.MakePointerAvailable != 0 {
        if kind == AccessKind::Load {
            return Err(Diag::invalid_id("MakePointerAvailableKHR cannot be used with OpLoad."));
        }
        if kind == AccessKind::CopySource {
            return Err(Diag::invalid_id(
                "Source memory access must not include MakePointerAvailableKHR",
            ));
        }
        if mask & ma.NonPrivatePointer == 0 {
            return Err(Diag::invalid_id(
                "NonPrivatePointerKHR must be specified if MakePointerAvailableKHR is specified.",
            ));
        }
        if let Some(scope) = inst.mask_param(idx, ma.MakePointerAvailable).and_then(|p| p.first()?.as_id()) {
            check_memory_scope(cx, inst, scope)?;
        }
    }

    if mask & ma.MakePointerVisible != 0 {
        if kind == AccessKind::Store {
            return Err(Diag::invalid_id("MakePointerVisibleKHR cannot be used with OpStore."));
        }
        if kind == AccessKind::CopyTarget {
            return Err(Diag::invalid_id("Target memory access must not include MakePointerVisibleKHR"));
        }
        if mask & ma.NonPrivatePointer == 0 {
            return Err(Diag::invalid_id(
                "NonPrivatePointerKHR must be specified if MakePointerVisibleKHR is specified.",
            ));
        }
        if let Some(scope) = inst.mask_param(idx, ma.MakePointerVisible).and_then(|p| p.first()?.as_id()) {
            check_memory_scope(cx, inst, scope)?;
        }
    }

    if mask & ma.NonPrivatePointer != 0 {
        let allowed = [
            wk.sc.Uniform,
            wk.sc.Workgroup,
            wk.sc.CrossWorkgroup,
            wk.sc.Generic,
            wk.sc.Image,
            wk.sc.StorageBuffer,
            wk.sc.PhysicalStorageBuffer,
        ];
        if !storage_classes.iter().all(|sc| allowed.contains(sc)) {
            return Err(Diag::invalid_id(
                "NonPrivatePointerKHR requires a pointer in Uniform, Workgroup, CrossWorkgroup, \
                 Generic, Image or StorageBuffer storage classes.",
            ));
        }
    }
    Ok(())
}

fn check_access_chain(cx: &RuleCx<'_>, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let m = cx.module;
    let op_name = inst.opcode.name();
    let limit = cx.options.universal_limits.max_access_chain_indexes;

    let Some(result_ty) = inst.result_type_id else { return Ok(()) };
    let Some((result_sc, result_pointee)) = m.pointer_type(result_ty) else {
        return Err(Diag::invalid_id(format!(
            "The Result Type of {op_name} <id> {} must be OpTypePointer.",
            inst.result_id.map_or_else(String::new, |id| cx.name(id))
        ))
        .with_id(result_ty));
    };

    let base = cx.id_operand(inst, 0)?;
    let Some((base_sc, base_pointee)) = m.type_of(base).and_then(|ty| m.pointer_type(ty)) else {
        return Err(Diag::invalid_id(format!(
            "The Base {} in {op_name} instruction must be a pointer.",
            cx.name(base)
        ))
        .with_id(base));
    };
    if base_sc != result_sc {
        return Err(Diag::invalid_id(format!(
            "The result pointer storage class and base pointer storage class in {op_name} do not \
             match."
        )));
    }

    // `OpPtrAccessChain`'s `Element` operand indexes the base pointer itself.
    let first_index = if inst.opcode == wk.op.OpPtrAccessChain { 2 } else { 1 };
    let indexes: Vec<Id> =
        (first_index..inst.num_logical_operands()).filter_map(|i| inst.id_operand(i)).collect();
    if indexes.len() > limit as usize {
        return Err(Diag::new(
            ErrorKind::OutOfResources,
            format!(
                "The number of indexes in {op_name} may not exceed {limit}. Found {} indexes.",
                indexes.len()
            ),
        ));
    }

    let mut current = base_pointee;
    for &index in &indexes {
        let index_ty = cx.type_of(inst, index)?;
        if !m.is_int_scalar_type(index_ty) {
            return Err(Diag::invalid_id(format!(
                "Indexes passed to {op_name} must be of type integer."
            ))
            .with_id(index));
        }
        current = match m.type_def(current) {
            Some(
                &TypeDef::Vector { component: inner, .. }
                | &TypeDef::Matrix { column: inner, .. }
                | &TypeDef::Array { element: inner, .. }
                | &TypeDef::RuntimeArray { element: inner },
            ) => inner,
            Some(TypeDef::Struct { members }) => {
                let Some(member) = m.const_int(index) else {
                    return Err(Diag::invalid_id(format!(
                        "The <id> passed to {op_name} to index into a structure must be an \
                         OpConstant."
                    ))
                    .with_id(index));
                };
                match usize::try_from(member).ok().and_then(|i| members.get(i)) {
                    Some(&member_ty) => member_ty,
                    None => {
                        return Err(Diag::invalid_id(format!(
                            "Index is out of bounds: {op_name} can not find index {member} into \
                             the structure <id> {}. This structure has {} members. Largest \
                             valid index is {}.",
                            cx.name(current),
                            members.len(),
                            members.len().saturating_sub(1)
                        ))
                        .with_id(index));
                    }
                }
            }
            _ => {
                return Err(Diag::invalid_id(format!(
                    "{op_name} reached non-composite type while indexes still remain to be \
                     traversed."
                ))
                .with_id(index));
            }
        };
    }

    if current != result_pointee {
        return Err(Diag::invalid_id(format!(
            "{op_name} result type {} does not match the type that results from indexing into \
             the base <id> {}.",
            cx.name(result_pointee),
            cx.name(current)
        ))
        .with_id(result_ty));
    }
    Ok(())
}

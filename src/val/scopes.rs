//! `Scope` operands (given as IDs of integer constants).

use super::{RelaxedRule, RuleCx};
use crate::diag::Diag;
use crate::spv::{self, Id};

/// The value of a scope (or memory semantics) ID operand, after checking its
/// type and constness. `None` means a specialization constant (or, with
/// `CooperativeMatrixNV`, a non-constant), whose value can't be checked.
pub(super) fn constant_operand_value(
    cx: &RuleCx<'_>,
    inst: &spv::Inst,
    id: Id,
    what: &str,
) -> Result<Option<u32>, Diag> {
    let wk = cx.wk;
    let m = cx.module;
    let op = inst.opcode.short_name();

    let is_u32 = m.type_of(id).is_some_and(|ty| m.is_int_scalar_type(ty) && m.bit_width(ty) == Some(32));
    if !is_u32 {
        return Err(Diag::invalid_data(format!("{op}: expected {what} to be a 32-bit int"))
            .with_id(id));
    }

    if m.def_opcode(id) != Some(wk.op.OpConstant) {
        let is_shader = cx.has_capability(wk.cap.Shader);
        let coop_matrix = cx.has_capability(wk.cap.CooperativeMatrixNV);
        if is_shader && !coop_matrix {
            return Err(Diag::invalid_data(format!(
                "{what} ids must be OpConstant when Shader capability is present"
            ))
            .with_id(id));
        }
        if is_shader && coop_matrix && !m.is_constant(id) {
            return Err(Diag::invalid_data(format!(
                "{what} ids must be constant or specialization constant when CooperativeMatrixNV \
                 capability is present"
            ))
            .with_id(id));
        }
        return Ok(None);
    }
    Ok(m.const_u32(id))
}

fn scope_value(cx: &RuleCx<'_>, inst: &spv::Inst, scope: Id, what: &str) -> Result<Option<u32>, Diag> {
    let Some(value) = constant_operand_value(cx, inst, scope, "Scope")? else {
        return Ok(None);
    };
    if cx.wk.kind.Scope.enumerant(value).is_none() {
        return Err(Diag::invalid_data(format!(
            "{}: Invalid {what} value:\n{value}",
            inst.opcode.short_name()
        ))
        .with_id(scope));
    }
    Ok(Some(value))
}

fn scope_name(cx: &RuleCx<'_>, value: u32) -> &'static str {
    cx.wk.kind.Scope.enumerant_name(value).unwrap_or("unknown")
}

pub(super) fn check_execution_scope(
    cx: &RuleCx<'_>,
    idx: usize,
    inst: &spv::Inst,
    scope: Id,
) -> Result<(), Diag> {
    let wk = cx.wk;
    let op = inst.opcode.short_name();
    let Some(value) = scope_value(cx, inst, scope, "Execution Scope")? else {
        return Ok(());
    };

    if cx.is_vulkan() {
        if ![wk.scope.Workgroup, wk.scope.Subgroup].contains(&value) {
            return Err(Diag::invalid_data(format!(
                "{op}: in Vulkan environment Execution scope is limited to Workgroup and \
                 Subgroup, but found {}",
                scope_name(cx, value)
            ))
            .with_id(scope)
            .with_vuid("VUID-StandaloneSpirv-None-04636"));
        }

        let non_compute_models = [
            wk.em.Fragment,
            wk.em.Vertex,
            wk.em.Geometry,
            wk.em.TessellationEvaluation,
        ];
        if inst.opcode == wk.op.OpControlBarrier
            && value != wk.scope.Subgroup
            && cx.module.entry_models_of_inst(idx).iter().any(|m| non_compute_models.contains(m))
        {
            return Err(Diag::invalid_data(format!(
                "{op}: in Vulkan environment, OpControlBarrier execution scope must be Subgroup \
                 for Fragment, Vertex, Geometry and TessellationEvaluation execution models"
            ))
            .with_id(scope)
            .with_vuid("VUID-StandaloneSpirv-None-04637"));
        }
    }
    Ok(())
}

pub(super) fn check_memory_scope(cx: &RuleCx<'_>, inst: &spv::Inst, scope: Id) -> Result<(), Diag> {
    let wk = cx.wk;
    let op = inst.opcode.short_name();
    let Some(value) = scope_value(cx, inst, scope, "Memory Scope")? else {
        return Ok(());
    };

    if value == wk.scope.QueueFamily && !cx.has_capability(wk.cap.VulkanMemoryModel) {
        return Err(Diag::invalid_data(format!(
            "{op}: Memory Scope QueueFamilyKHR requires capability VulkanMemoryModelKHR"
        ))
        .with_id(scope));
    }

    if value == wk.scope.Device
        && cx.uses_vulkan_memory_model()
        && !cx.has_capability(wk.cap.VulkanMemoryModelDeviceScope)
    {
        return Err(Diag::invalid_data(format!(
            "{op}: Use of device scope with VulkanKHR memory model requires the \
             VulkanMemoryModelDeviceScopeKHR capability"
        ))
        .with_id(scope));
    }

    if cx.is_vulkan() {
        if value == wk.scope.CrossDevice {
            return Err(Diag::invalid_data(format!(
                "{op}: in Vulkan environment, Memory Scope cannot be CrossDevice"
            ))
            .with_id(scope)
            .with_vuid("VUID-StandaloneSpirv-None-04638"));
        }

        let vulkan_1_0 = cx.env().vulkan_version() == Some((1, 0));
        let allowed_1_0 = [wk.scope.Device, wk.scope.Workgroup, wk.scope.Invocation];
        if vulkan_1_0 && !allowed_1_0.contains(&value) {
            let relaxed = value == wk.scope.Subgroup
                && super::atomics::is_atomic_opcode(wk, inst.opcode)
                && RelaxedRule::VulkanSubgroupAtomicScope.is_relaxed();
            if !relaxed {
                return Err(Diag::invalid_data(format!(
                    "{op}: in Vulkan 1.0 environment Memory Scope is limited to Device, \
                     Workgroup and Invocation"
                ))
                .with_id(scope)
                .with_vuid("VUID-StandaloneSpirv-None-04638"));
            }
        }

        // `ShaderCallKHR` is only for ray tracing execution models, none of which are accepted.
        let allowed = [
            wk.scope.Device,
            wk.scope.Workgroup,
            wk.scope.Subgroup,
            wk.scope.Invocation,
            wk.scope.QueueFamily,
        ];
        if !allowed.contains(&value) {
            return Err(Diag::invalid_data(format!(
                "{op}: in Vulkan environment Memory Scope is limited to Device, Workgroup, \
                 Subgroup, Invocation and QueueFamily, but found {}",
                scope_name(cx, value)
            ))
            .with_id(scope)
            .with_vuid("VUID-StandaloneSpirv-None-04640"));
        }
    }
    Ok(())
}

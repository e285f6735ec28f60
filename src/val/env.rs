//! Client API (Vulkan/WebGPU/OpenCL) structural restrictions.

use super::RuleCx;
use crate::diag::Diag;
use crate::env::ClientApi;
use crate::module::IdKind;
use crate::spv;

pub(super) fn check_module(cx: &RuleCx<'_>) -> Result<(), Diag> {
    let wk = cx.wk;
    let m = cx.module;
    let (am, mm) = (m.addressing_model, m.memory_model);

    let diag = |msg: &str| {
        let diag = Diag::invalid_data(msg);
        match m.memory_model_inst {
            Some(idx) => diag.at_inst(idx),
            None => diag,
        }
    };

    match cx.env().client_api() {
        ClientApi::Universal => {}
        ClientApi::Vulkan => {
            if ![wk.am.Logical, wk.am.PhysicalStorageBuffer64].contains(&am) {
                return Err(diag(
                    "Addressing model must be Logical or PhysicalStorageBuffer64 in the Vulkan environment.",
                )
                .with_vuid("VUID-StandaloneSpirv-None-04635"));
            }
            if ![wk.mm.GLSL450, wk.mm.Vulkan].contains(&mm) {
                return Err(diag("Memory model must be VulkanKHR or GLSL450 in the Vulkan environment."));
            }
        }
        ClientApi::WebGpu => {
            if am != wk.am.Logical {
                return Err(diag("Addressing model must be Logical for WebGPU environment."));
            }
            if mm != wk.mm.Vulkan {
                return Err(diag("Memory model must be VulkanKHR for WebGPU environment."));
            }
        }
        ClientApi::OpenCl => {
            if ![wk.am.Physical32, wk.am.Physical64].contains(&am) {
                return Err(diag(
                    "Addressing model must be Physical32 or Physical64 in the OpenCL environment.",
                ));
            }
            if mm != wk.mm.OpenCL {
                return Err(diag("Memory model must be OpenCL in the OpenCL environment."));
            }
        }
    }
    Ok(())
}

pub(super) fn check_inst(cx: &RuleCx<'_>, idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;

    if cx.env().is_webgpu() && inst.opcode == wk.op.OpUndef {
        return Err(Diag::invalid_data("OpUndef is disallowed"));
    }

    if cx.is_vulkan() && cx.module.function_of_inst(idx).is_some() {
        check_vulkan_workgroup_use(cx, idx, inst)?;
    }
    Ok(())
}

/// `Workgroup` variables are only usable from compute-like entry points.
fn check_vulkan_workgroup_use(cx: &RuleCx<'_>, idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
    let wk = cx.wk;
    let m = cx.module;

    for (_, id) in inst.id_operands() {
        let Some(info) = m.ids.get(&id) else { continue };
        if info.kind != (IdKind::Variable { storage_class: wk.sc.Workgroup }) {
            continue;
        }
        if let Some(&model) = m.entry_models_of_inst(idx).iter().find(|&&model| model != wk.em.GLCompute)
        {
            let model_name = wk.kind.ExecutionModel.enumerant_name(model).unwrap_or("unknown");
            return Err(Diag::invalid_data(format!(
                "Workgroup Storage Class is limited to MeshNV, TaskNV, and GLCompute execution model, \
                 but {} is used by an entry point with the {model_name} execution model",
                cx.name(id)
            ))
            .with_id(id)
            .with_vuid("VUID-StandaloneSpirv-None-04645"));
        }
    }
    Ok(())
}

//! `MemorySemantics` operands, shared by atomics and barriers.

use super::scopes::constant_operand_value;
use super::{RelaxedRule, RuleCx};
use crate::diag::Diag;
use crate::spv::{self, Id};

pub(super) fn check_memory_semantics(
    cx: &RuleCx<'_>,
    inst: &spv::Inst,
    semantics: Id,
) -> Result<(), Diag> {
    let wk = cx.wk;
    let sem = &wk.sem;
    let op = inst.opcode;
    let op_name = op.short_name();

    let Some(value) = constant_operand_value(cx, inst, semantics, "Memory Semantics")? else {
        return Ok(());
    };
    let err = |msg: String| Err(Diag::invalid_data(msg).with_id(semantics));

    let ordering_bits = sem.Acquire | sem.Release | sem.AcquireRelease | sem.SequentiallyConsistent;
    let storage_class_bits = sem.UniformMemory
        | sem.WorkgroupMemory
        | sem.ImageMemory
        | sem.OutputMemory
        | sem.CrossWorkgroupMemory
        | sem.AtomicCounterMemory
        | sem.SubgroupMemory;

    if (value & ordering_bits).count_ones() > 1 {
        return err(format!(
            "{op_name}: Memory Semantics can have at most one of the following bits set: \
             Acquire, Release, AcquireRelease or SequentiallyConsistent"
        ));
    }

    if value & sem.SequentiallyConsistent != 0 && cx.uses_vulkan_memory_model() {
        return err(format!(
            "{op_name}: SequentiallyConsistent memory semantics cannot be used with the \
             VulkanKHR memory model."
        ));
    }

    let has_vulkan_memory_model = cx.has_capability(wk.cap.VulkanMemoryModel);
    if value & sem.MakeAvailable != 0 {
        if !has_vulkan_memory_model {
            return err(format!(
                "{op_name}: Memory Semantics MakeAvailableKHR requires capability \
                 VulkanMemoryModelKHR"
            ));
        }
        if value & (sem.Release | sem.AcquireRelease) == 0 {
            return err(format!(
                "{op_name}: MakeAvailableKHR Memory Semantics also requires either Release or \
                 AcquireRelease Memory Semantics"
            ));
        }
    }
    if value & sem.MakeVisible != 0 {
        if !has_vulkan_memory_model {
            return err(format!(
                "{op_name}: Memory Semantics MakeVisibleKHR requires capability \
                 VulkanMemoryModelKHR"
            ));
        }
        if value & (sem.Acquire | sem.AcquireRelease) == 0 {
            return err(format!(
                "{op_name}: MakeVisibleKHR Memory Semantics also requires either Acquire or \
                 AcquireRelease Memory Semantics"
            ));
        }
    }
    if value & (sem.MakeAvailable | sem.MakeVisible) != 0 && value & storage_class_bits == 0 {
        return err(format!("{op_name}: expected Memory Semantics to include a storage class"));
    }

    if value & sem.OutputMemory != 0 && !has_vulkan_memory_model {
        return err(format!(
            "{op_name}: Memory Semantics OutputMemoryKHR requires capability VulkanMemoryModelKHR"
        ));
    }
    if value & sem.Volatile != 0 {
        if !has_vulkan_memory_model {
            return err(format!(
                "{op_name}: Memory Semantics Volatile requires capability VulkanMemoryModelKHR"
            ));
        }
        if !super::atomics::is_atomic_opcode(wk, op) {
            return err(format!(
                "{op_name}: Memory Semantics Volatile can only be used with atomic instructions"
            ));
        }
    }
    if value & sem.UniformMemory != 0 && !cx.has_capability(wk.cap.Shader) {
        return err(format!("{op_name}: Memory Semantics UniformMemory requires capability Shader"));
    }

    if cx.is_vulkan() {
        check_vulkan_semantics(cx, inst, semantics, value, ordering_bits, storage_class_bits)?;
    }
    Ok(())
}

fn check_vulkan_semantics(
    cx: &RuleCx<'_>,
    inst: &spv::Inst,
    semantics: Id,
    value: u32,
    ordering_bits: u32,
    storage_class_bits: u32,
) -> Result<(), Diag> {
    let wk = cx.wk;
    let sem = &wk.sem;
    let op = inst.opcode;
    let op_name = op.short_name();
    let err = |vuid, msg: String| Err(Diag::invalid_data(msg).with_id(semantics).with_vuid(vuid));

    if op == wk.op.OpMemoryBarrier && value & ordering_bits == 0 {
        return err(
            "VUID-StandaloneSpirv-OpMemoryBarrier-04732",
            format!(
                "{op_name}: Vulkan specification requires Memory Semantics to have one of the \
                 following bits set: Acquire, Release, AcquireRelease or SequentiallyConsistent"
            ),
        );
    }

    let is_barrier = [wk.op.OpMemoryBarrier, wk.op.OpControlBarrier].contains(&op);
    if is_barrier
        && value & ordering_bits != 0
        && value & storage_class_bits == 0
        && !RelaxedRule::VulkanBarrierStorageClassSemantics.is_relaxed()
    {
        return err(
            "VUID-StandaloneSpirv-OpMemoryBarrier-04733",
            format!(
                "{op_name}: expected Memory Semantics to include a Vulkan-supported storage \
                 class if Memory Semantics is not None"
            ),
        );
    }

    if op == wk.op.OpAtomicLoad
        && value & (sem.Release | sem.AcquireRelease | sem.SequentiallyConsistent) != 0
    {
        return err(
            "VUID-StandaloneSpirv-OpAtomicLoad-04731",
            "Vulkan spec disallows OpAtomicLoad with Memory Semantics Release, AcquireRelease \
             and SequentiallyConsistent"
                .to_string(),
        );
    }
    if op == wk.op.OpAtomicStore
        && value & (sem.Acquire | sem.AcquireRelease | sem.SequentiallyConsistent) != 0
    {
        return err(
            "VUID-StandaloneSpirv-OpAtomicStore-04730",
            "Vulkan spec disallows OpAtomicStore with Memory Semantics Acquire, AcquireRelease \
             and SequentiallyConsistent"
                .to_string(),
        );
    }
    Ok(())
}

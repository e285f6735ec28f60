mod common;

use common::*;
use spirv_val::{ErrorKind, TargetEnv};

const WORKGROUP_VARS: &str = "
%ptr_wg_u32 = OpTypePointer Workgroup %u32
%u32_var = OpVariable %ptr_wg_u32 Workgroup
%ptr_wg_f32 = OpTypePointer Workgroup %f32
%f32_var = OpVariable %ptr_wg_f32 Workgroup
%f32_1 = OpConstant %f32 1.0
";

fn atomics(body: &str) -> String {
    compute_shader("", WORKGROUP_VARS, body)
}

#[test]
fn integer_atomics_are_valid() {
    let src = atomics(
        "%a = OpAtomicIAdd %u32 %u32_var %device %acquire_release_workgroup %u32_1
%b = OpAtomicLoad %u32 %u32_var %workgroup %acquire
OpAtomicStore %u32_var %workgroup %release %u32_1
%c = OpAtomicCompareExchange %u32 %u32_var %workgroup %acquire_release_workgroup %acquire %u32_1 %u32_0
%d = OpAtomicIIncrement %u32 %u32_var %workgroup %none",
    );
    for env in [universal(1, 0), TargetEnv::Vulkan1_0, TargetEnv::Vulkan1_1, TargetEnv::Vulkan1_2] {
        assert_valid(&src, env);
    }
}

#[test]
fn float_load_store_exchange_are_valid() {
    let src = atomics(
        "%a = OpAtomicLoad %f32 %f32_var %workgroup %none
OpAtomicStore %f32_var %workgroup %none %f32_1
%b = OpAtomicExchange %f32 %f32_var %workgroup %none %f32_1",
    );
    assert_valid(&src, universal(1, 0));
}

#[test]
fn integer_only_atomic_on_float() {
    let src = atomics("%a = OpAtomicIAdd %f32 %f32_var %workgroup %none %f32_1");
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "AtomicIAdd: expected Result Type to be integer scalar type",
    );
}

#[test]
fn pointer_must_point_to_result_type() {
    let src = atomics("%a = OpAtomicLoad %f32 %u32_var %workgroup %none");
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "AtomicLoad: expected Pointer to point to a value of type Result Type",
    );
}

#[test]
fn store_value_must_match_pointee() {
    let src = atomics("OpAtomicStore %u32_var %workgroup %none %f32_1");
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "AtomicStore: expected Value type and the type pointed to by Pointer to be the same",
    );
}

#[test]
fn atomic_64_bit_needs_int64_atomics() {
    let decls = "%u64 = OpTypeInt 64 0
%u64_1 = OpConstant %u64 1
%ptr_wg_u64 = OpTypePointer Workgroup %u64
%u64_var = OpVariable %ptr_wg_u64 Workgroup";
    let body = "%a = OpAtomicIAdd %u64 %u64_var %workgroup %none %u64_1";

    let without = compute_shader("OpCapability Int64", decls, body);
    assert_invalid(
        &without,
        universal(1, 0),
        ErrorKind::InvalidData,
        "64-bit atomics require the Int64Atomics capability",
    );

    let with = compute_shader("OpCapability Int64Atomics", decls, body);
    assert_valid(&with, universal(1, 0));
}

#[test]
fn vulkan_atomic_store_acquire() {
    let src = atomics("OpAtomicStore %u32_var %workgroup %acquire %u32_1");
    let diag = assert_invalid(
        &src,
        TargetEnv::Vulkan1_1,
        ErrorKind::InvalidData,
        "Vulkan spec disallows OpAtomicStore with Memory Semantics Acquire, AcquireRelease and \
         SequentiallyConsistent",
    );
    assert_eq!(diag.vuid, Some("VUID-StandaloneSpirv-OpAtomicStore-04730"));
}

#[test]
fn vulkan_atomic_storage_classes() {
    let src = compute_shader(
        "",
        "%ptr_priv_u32 = OpTypePointer Private %u32
%priv = OpVariable %ptr_priv_u32 Private",
        "%a = OpAtomicIAdd %u32 %priv %workgroup %none %u32_1",
    );
    let diag = assert_invalid(
        &src,
        TargetEnv::Vulkan1_1,
        ErrorKind::InvalidData,
        "Vulkan spec only allows storage classes for atomic to be",
    );
    assert_eq!(diag.vuid, Some("VUID-StandaloneSpirv-None-04686"));
    assert_valid(&src, universal(1, 0));
}

#[test]
fn vulkan_1_0_subgroup_scope_atomics_are_accepted() {
    let src = atomics("%a = OpAtomicLoad %u32 %u32_var %subgroup %none");
    assert_valid(&src, TargetEnv::Vulkan1_0);
}

#[test]
fn vulkan_cross_device_memory_scope() {
    let src = atomics("%a = OpAtomicLoad %u32 %u32_var %cross_device %none");
    let diag = assert_invalid(
        &src,
        TargetEnv::Vulkan1_1,
        ErrorKind::InvalidData,
        "in Vulkan environment, Memory Scope cannot be CrossDevice",
    );
    assert_eq!(diag.vuid, Some("VUID-StandaloneSpirv-None-04638"));
}

#[test]
fn queue_family_scope_needs_vulkan_memory_model() {
    let src = atomics("%a = OpAtomicLoad %u32 %u32_var %queue_family %none");
    assert_invalid(
        &src,
        universal(1, 3),
        ErrorKind::InvalidData,
        "Memory Scope QueueFamilyKHR requires capability VulkanMemoryModelKHR",
    );
}

#[test]
fn compare_exchange_unequal_release() {
    let src = atomics(
        "%a = OpAtomicCompareExchange %u32 %u32_var %workgroup %acquire_release_workgroup %release %u32_1 %u32_0",
    );
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "Memory Semantics Release and AcquireRelease cannot be used for operand Unequal",
    );
}

#[test]
fn make_available_needs_vulkan_memory_model() {
    // MakeAvailable | WorkgroupMemory | Release
    let src = compute_shader(
        "",
        &format!("{WORKGROUP_VARS}\n%make_available = OpConstant %u32 8452"),
        "OpAtomicStore %u32_var %workgroup %make_available %u32_1",
    );
    assert_invalid(
        &src,
        universal(1, 3),
        ErrorKind::InvalidData,
        "Memory Semantics MakeAvailableKHR requires capability VulkanMemoryModelKHR",
    );
}

#[test]
fn semantics_must_be_constant_with_shader() {
    let src = atomics(
        "%sem = OpIAdd %u32 %u32_0 %u32_0
%a = OpAtomicLoad %u32 %u32_var %workgroup %sem",
    );
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "Memory Semantics ids must be OpConstant when Shader capability is present",
    );
}

#[test]
fn scope_must_be_32_bit_int() {
    let src = atomics("%a = OpAtomicLoad %u32 %u32_var %f32_1 %none");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, "AtomicLoad: expected Scope to be a 32-bit int");
}

#[test]
fn atomic_integers_must_be_32_or_64_bit() {
    let decls = "%u16 = OpTypeInt 16 0
%u16_1 = OpConstant %u16 1
%ptr_wg_u16 = OpTypePointer Workgroup %u16
%u16_var = OpVariable %ptr_wg_u16 Workgroup";
    let src = compute_shader(
        "OpCapability Int16",
        decls,
        "%a = OpAtomicIAdd %u16 %u16_var %workgroup %none %u16_1",
    );
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "AtomicIAdd: expected Result Type to be 32- or 64-bit integer scalar type, found 16-bit",
    );
}

#[test]
fn half_float_atomics_need_float16_atomic_capability() {
    let decls = "%f16 = OpTypeFloat 16
%ptr_wg_f16 = OpTypePointer Workgroup %f16
%f16_var = OpVariable %ptr_wg_f16 Workgroup";
    let body = "%a = OpAtomicLoad %f16 %f16_var %workgroup %none";

    let without = compute_shader("OpCapability Float16", decls, body);
    assert_invalid(
        &without,
        universal(1, 0),
        ErrorKind::InvalidData,
        "AtomicLoad: 16-bit float atomics require the AtomicFloat16AddEXT or AtomicFloat16MinMaxEXT \
         capability",
    );

    let with = compute_shader(
        "OpCapability Float16
OpCapability AtomicFloat16AddEXT
OpExtension \"SPV_EXT_shader_atomic_float16_add\"",
        decls,
        body,
    );
    assert_valid(&with, universal(1, 0));
}

#[test]
fn vulkan_shader_call_memory_scope() {
    let src = compute_shader(
        "",
        &format!("{WORKGROUP_VARS}\n%shader_call = OpConstant %u32 6"),
        "%a = OpAtomicLoad %u32 %u32_var %shader_call %none",
    );
    let diag = assert_invalid(
        &src,
        TargetEnv::Vulkan1_1,
        ErrorKind::InvalidData,
        "in Vulkan environment Memory Scope is limited to Device, Workgroup, Subgroup, Invocation \
         and QueueFamily, but found ShaderCallKHR",
    );
    assert_eq!(diag.vuid, Some("VUID-StandaloneSpirv-None-04640"));
    assert_valid(&src, universal(1, 0));
}

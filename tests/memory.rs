mod common;

use common::*;
use spirv_val::options::UniversalLimits;
use spirv_val::{ErrorKind, TargetEnv, ValidatorOptions};

const ARRAYS: &str = "
%arr = OpTypeArray %u32 %u32_4
%arr2 = OpTypeArray %arr %u32_4
%struct = OpTypeStruct %u32 %f32
%ptr_fn_u32 = OpTypePointer Function %u32
%ptr_fn_f32 = OpTypePointer Function %f32
%ptr_fn_arr2 = OpTypePointer Function %arr2
%ptr_fn_struct = OpTypePointer Function %struct
";

fn with_locals(body: &str) -> String {
    compute_shader(
        "",
        ARRAYS,
        &format!(
            "%u32_var = OpVariable %ptr_fn_u32 Function
%arr2_var = OpVariable %ptr_fn_arr2 Function
%struct_var = OpVariable %ptr_fn_struct Function
{body}"
        ),
    )
}

#[test]
fn loads_stores_and_access_chains_are_valid() {
    let src = with_locals(
        "%x = OpLoad %u32 %u32_var
OpStore %u32_var %x
%elem = OpAccessChain %ptr_fn_u32 %arr2_var %u32_1 %x
%member = OpInBoundsAccessChain %ptr_fn_f32 %struct_var %u32_1
OpCopyMemory %elem %u32_var",
    );
    assert_valid(&src, universal(1, 0));
    assert_valid(&src, TargetEnv::Vulkan1_1);
}

#[test]
fn variable_type_must_be_pointer() {
    let src = compute_shader("", "%v = OpVariable %u32 Private", "");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidId, "is not a pointer type.");
}

#[test]
fn variable_initializer_type() {
    let src = compute_shader(
        "",
        "%ptr_priv_u32 = OpTypePointer Private %u32
%f32_1 = OpConstant %f32 1.0
%v = OpVariable %ptr_priv_u32 Private %f32_1",
        "",
    );
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidId,
        "Initializer type must match the type pointed to by the Result Type",
    );
}

#[test]
fn load_type_mismatch() {
    let src = with_locals("%x = OpLoad %f32 %u32_var");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidId, "OpLoad Result Type");
}

#[test]
fn load_from_non_pointer() {
    let src = with_locals("%x = OpLoad %u32 %u32_1");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidId, "is not a logical pointer.");
}

#[test]
fn store_to_input_is_read_only() {
    let src = compute_shader(
        "",
        "%ptr_in_u32 = OpTypePointer Input %u32
%in = OpVariable %ptr_in_u32 Input",
        "OpStore %in %u32_1",
    );
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidId, "storage class is read-only");
}

#[test]
fn copy_memory_type_mismatch() {
    let src = with_locals("%f = OpAccessChain %ptr_fn_f32 %struct_var %u32_1\nOpCopyMemory %u32_var %f");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidId, "s type does not match Source");
}

#[test]
fn copy_memory_sized_zero() {
    let src = compute_shader(
        "OpCapability Addresses",
        "%ptr_fn_u32 = OpTypePointer Function %u32",
        "%a = OpVariable %ptr_fn_u32 Function
%b = OpVariable %ptr_fn_u32 Function
OpCopyMemorySized %a %b %u32_0",
    );
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidId, "cannot be a constant zero.");
}

#[test]
fn make_pointer_available_on_load() {
    let src = compute_shader(
        "OpCapability VulkanMemoryModel\nOpExtension \"SPV_KHR_vulkan_memory_model\"",
        "%ptr_wg_u32 = OpTypePointer Workgroup %u32
%wg = OpVariable %ptr_wg_u32 Workgroup",
        "%x = OpLoad %u32 %wg MakePointerAvailable|NonPrivatePointer %workgroup",
    );
    assert_invalid(
        &src,
        universal(1, 3),
        ErrorKind::InvalidId,
        "MakePointerAvailableKHR cannot be used with OpLoad.",
    );
}

#[test]
fn make_pointer_visible_needs_non_private_pointer() {
    let preamble = "OpCapability VulkanMemoryModel\nOpExtension \"SPV_KHR_vulkan_memory_model\"";
    let decls = "%ptr_wg_u32 = OpTypePointer Workgroup %u32
%wg = OpVariable %ptr_wg_u32 Workgroup";

    let src = compute_shader(preamble, decls, "%x = OpLoad %u32 %wg MakePointerVisible %workgroup");
    assert_invalid(
        &src,
        universal(1, 3),
        ErrorKind::InvalidId,
        "NonPrivatePointerKHR must be specified if MakePointerVisibleKHR is specified.",
    );

    let src = compute_shader(preamble, decls, "%x = OpLoad %u32 %wg MakePointerVisible|NonPrivatePointer %workgroup");
    assert_valid(&src, universal(1, 3));
}

#[test]
fn struct_index_must_be_constant() {
    let src = with_locals(
        "%i = OpIAdd %u32 %u32_0 %u32_1
%member = OpAccessChain %ptr_fn_f32 %struct_var %i",
    );
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidId,
        "to index into a structure must be an OpConstant.",
    );
}

#[test]
fn struct_index_out_of_bounds() {
    let src = with_locals("%member = OpAccessChain %ptr_fn_f32 %struct_var %u32_4");
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidId,
        "This structure has 2 members. Largest valid index is 1.",
    );
}

#[test]
fn access_chain_result_type_mismatch() {
    let src = with_locals("%elem = OpAccessChain %ptr_fn_f32 %arr2_var %u32_1 %u32_1");
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidId,
        "does not match the type that results from indexing into the base <id>",
    );
}

#[test]
fn access_chain_index_limit() {
    let src = with_locals("%elem = OpAccessChain %ptr_fn_u32 %arr2_var %u32_1 %u32_1");
    let options = ValidatorOptions::default()
        .universal_limits(UniversalLimits { max_access_chain_indexes: 1, ..Default::default() });

    let diag = validate_with(&src, universal(1, 0), &options).unwrap_err();
    assert_eq!(diag.kind, ErrorKind::OutOfResources);
    assert_eq!(diag.message, "The number of indexes in OpAccessChain may not exceed 1. Found 2 indexes.");

    assert_valid(&src, universal(1, 0));
}

#[test]
fn vulkan_uniform_variable_must_be_struct() {
    let src = compute_shader(
        "",
        "%ptr_uniform_u32 = OpTypePointer Uniform %u32
%u = OpVariable %ptr_uniform_u32 Uniform",
        "",
    );
    let diag = assert_invalid(
        &src,
        TargetEnv::Vulkan1_1,
        ErrorKind::InvalidId,
        "Such variables must be typed as OpTypeStruct, or an array of this type",
    );
    assert_eq!(diag.vuid, Some("VUID-StandaloneSpirv-Uniform-06807"));
    assert_valid(&src, universal(1, 0));
}

#[test]
fn vulkan_runtime_array_must_be_last_member() {
    let src = compute_shader(
        "",
        "%rta = OpTypeRuntimeArray %u32
%bad = OpTypeStruct %rta %u32",
        "",
    );
    let diag = assert_invalid(
        &src,
        TargetEnv::Vulkan1_1,
        ErrorKind::InvalidId,
        "OpTypeRuntimeArray must only be used for the last member of an OpTypeStruct, but member 0",
    );
    assert_eq!(diag.vuid, Some("VUID-StandaloneSpirv-OpTypeRuntimeArray-04680"));
}

#[test]
fn small_types_need_storage_capability() {
    let preamble = "OpCapability UniformAndStorageBuffer16BitAccess\nOpExtension \"SPV_KHR_16bit_storage\"";

    let uniform = compute_shader(
        preamble,
        "%u16 = OpTypeInt 16 0
%ptr_uniform_u16 = OpTypePointer Uniform %u16
%u = OpVariable %ptr_uniform_u16 Uniform",
        "",
    );
    assert_valid(&uniform, universal(1, 0));

    let private = compute_shader(
        preamble,
        "%u16 = OpTypeInt 16 0
%ptr_priv_u16 = OpTypePointer Private %u16
%p = OpVariable %ptr_priv_u16 Private",
        "",
    );
    assert_invalid(
        &private,
        universal(1, 0),
        ErrorKind::InvalidId,
        "Allocating a variable containing a 16-bit element in Private storage class requires an \
         additional capability",
    );

    let with_int16 = compute_shader(
        "OpCapability Int16",
        "%u16 = OpTypeInt 16 0
%ptr_priv_u16 = OpTypePointer Private %u16
%p = OpVariable %ptr_priv_u16 Private",
        "",
    );
    assert_valid(&with_int16, universal(1, 0));
}

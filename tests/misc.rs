mod common;

use common::*;
use spirv_val::spv::Version;
use spirv_val::{Diag, ErrorKind, ValidatorOptions};

/// An OpenCL-style kernel, with `body` in `%main` after a `Function` variable `%var`.
fn kernel(preamble: &str, decls: &str, body: &str) -> String {
    format!(
        "OpCapability Addresses
OpCapability Kernel
{preamble}
OpMemoryModel Physical32 OpenCL
OpEntryPoint Kernel %main \"main\"
%void = OpTypeVoid
%fn_void = OpTypeFunction %void
%u32 = OpTypeInt 32 0
%u32_1 = OpConstant %u32 1
%ptr_fn_u32 = OpTypePointer Function %u32
{decls}
%main = OpFunction %void None %fn_void
%entry = OpLabel
%var = OpVariable %ptr_fn_u32 Function
{body}
OpReturn
OpFunctionEnd
"
    )
}

fn validate_kernel(src: &str, version: Version) -> Result<(), Diag> {
    init_tracing();
    let words = assemble_with_version(src, version);
    spirv_val::validate(&words, universal(version.major, version.minor), &ValidatorOptions::default())
}

#[test]
fn size_of_pointer() {
    let v1_1 = Version::new(1, 1);
    assert_eq!(validate_kernel(&kernel("", "", "%size = OpSizeOf %u32 %var"), v1_1), Ok(()));

    let diag = validate_kernel(&kernel("", "", "%size = OpSizeOf %u32 %u32_1"), v1_1).unwrap_err();
    assert_eq!(diag.kind, ErrorKind::InvalidId);
    assert!(diag.message.ends_with("must be a pointer"), "{diag}");

    let src = kernel("OpCapability Int64", "%u64 = OpTypeInt 64 0", "%size = OpSizeOf %u64 %var");
    let diag = validate_kernel(&src, v1_1).unwrap_err();
    assert_eq!(diag.kind, ErrorKind::InvalidData);
    assert_eq!(diag.message, "OpSizeOf Result Type must be a 32-bit integer scalar type");

    let src = kernel("", "", "%size = OpSizeOf %u32 %var");
    let diag = validate_kernel(&src, Version::new(1, 0)).unwrap_err();
    assert_eq!(diag.kind, ErrorKind::WrongVersion);
    assert!(diag.message.ends_with("requires SPIR-V version 1.1 or later"), "{diag}");
}

#[test]
fn entry_point_function_signature() {
    let src = format!(
        "OpCapability Shader
OpMemoryModel Logical GLSL450
OpEntryPoint GLCompute %main \"main\"
OpExecutionMode %main LocalSize 1 1 1
{COMMON_TYPES}
%fn_u32 = OpTypeFunction %u32
%main = OpFunction %u32 None %fn_u32
%entry = OpLabel
OpReturnValue %u32_1
OpFunctionEnd
"
    );
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, "function return type is not void.");
}

#[test]
fn entry_point_names_are_unique_per_model() {
    let src = compute_shader("", "", "").replacen(
        "OpEntryPoint GLCompute %main \"main\"",
        "OpEntryPoint GLCompute %main \"main\"\nOpEntryPoint GLCompute %main \"main\"",
        1,
    );
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidBinary,
        "2 Entry points cannot share the same name and ExecutionMode (main).",
    );

    let src = compute_shader("", "", "").replacen(
        "OpEntryPoint GLCompute %main \"main\"",
        "OpEntryPoint GLCompute %main \"main\"\nOpEntryPoint GLCompute %main \"other\"",
        1,
    );
    assert_valid(&src, universal(1, 0));
}

#[test]
fn execution_mode_needs_entry_point() {
    let decls = "%helper = OpFunction %void None %fn_void
%helper_entry = OpLabel
OpReturn
OpFunctionEnd";
    let src = compute_shader("", decls, "").replacen(
        "OpExecutionMode %main LocalSize 1 1 1",
        "OpExecutionMode %main LocalSize 1 1 1\nOpExecutionMode %helper LocalSize 1 1 1",
        1,
    );
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidId,
        "is not the Entry Point operand of an OpEntryPoint.",
    );
}

#[test]
fn entry_points_need_linkage_to_be_omitted() {
    let src = "OpCapability Shader\nOpMemoryModel Logical GLSL450";
    assert_invalid(
        src,
        universal(1, 0),
        ErrorKind::InvalidBinary,
        "No OpEntryPoint instruction was found.",
    );
}

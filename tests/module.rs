//! Module table building: layout order, ID definitions, functions and limits.

mod common;

use common::*;
use spirv_val::module::Module;
use spirv_val::options::UniversalLimits;
use spirv_val::spv::{read, spec};
use spirv_val::{Diag, ErrorKind, Report, TargetEnv, Validator, ValidatorOptions};

fn build(src: &str) -> Result<Module, Diag> {
    let words = assemble(src);
    let (header, words) = read::decode_header(words.into())?;
    let insts = read::decode_instructions(&words[spec::HEADER_LEN..])?;
    Module::build(header, insts, &UniversalLimits::default())
}

fn validate_with_limits(src: &str, limits: UniversalLimits) -> Result<(), Diag> {
    validate_with(src, universal(1, 0), &ValidatorOptions::default().universal_limits(limits))
}

#[test]
fn minimal_module_is_valid() {
    let src = "OpCapability Shader\nOpCapability Linkage\nOpMemoryModel Logical GLSL450";
    assert_valid(src, universal(1, 0));

    let words = assemble(src);
    let report: Report =
        Validator::new(universal(1, 0), ValidatorOptions::default()).validate_words(&words);
    assert_eq!(report.status(), ErrorKind::Success);
    assert!(report.diags.is_empty());

    for env in [universal(1, 0), TargetEnv::Vulkan1_0, TargetEnv::Vulkan1_1] {
        assert_valid(&compute_shader("", "", ""), env);
    }
}

#[test]
fn tables_are_built() {
    let decls = "%ptr_wg_u32 = OpTypePointer Workgroup %u32\n%var = OpVariable %ptr_wg_u32 Workgroup";
    let module = build(&compute_shader("", decls, "")).unwrap();
    assert_eq!(module.entry_points.len(), 1);
    assert_eq!(module.functions.len(), 1);
    assert_eq!(module.global_variables.len(), 1);

    let main = &module.functions[0];
    assert_eq!(module.entry_points[0].function, main.id);
    assert_eq!(main.blocks.len(), 1);
    assert!(main.entry_block().is_some_and(|b| b.preds.is_empty() && b.succs.is_empty()));
}

#[test]
fn reachability_follows_branches() {
    let src = compute_shader(
        "",
        "",
        "OpBranch %next
%dead = OpLabel
OpBranch %next
%next = OpLabel",
    );
    let module = build(&src).unwrap();
    let main = &module.functions[0];
    assert_eq!(main.blocks.len(), 3);

    let reachable = main.reachable_blocks();
    assert_eq!(reachable.len(), 2);
    let dead = &main.blocks[1];
    assert!(!reachable.contains(&dead.label));
    assert_eq!(main.blocks[2].preds.len(), 2);
}

#[test]
fn duplicate_definition() {
    let src = compute_shader("", "%u32 = OpTypeInt 32 0", "");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidId, "has already been defined");
}

#[test]
fn undefined_ids() {
    let src = compute_shader("", "", "%x = OpIAdd %u32 %missing %u32_1");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidId, "has not been defined");

    // Forward references from annotations must still be defined eventually.
    let src = format!(
        "OpCapability Shader
{COMPUTE_HEADER}
OpDecorate %ghost RelaxedPrecision
{COMMON_TYPES}
%main = OpFunction %void None %fn_void
%entry = OpLabel
OpReturn
OpFunctionEnd"
    );
    let diag = build(&src).err().unwrap();
    assert_eq!(diag.kind, ErrorKind::InvalidId);
    assert!(diag.message.ends_with("has not been defined"), "{diag}");
    assert_eq!(diag.inst_idx, Some(4));
}

#[test]
fn logical_layout_order() {
    let src = format!("OpMemoryModel Logical GLSL450\nOpCapability Shader\n{COMPUTE_HEADER}");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, "Capability is out of order");

    let types_last = compute_shader("", "", "").replace("%f32 = OpTypeFloat 32\n", "");
    let src = types_last + "%f32 = OpTypeFloat 32\n";
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, "is out of order");
}

#[test]
fn missing_required_instructions() {
    let src = compute_shader("", "", "");
    let truncated = src.trim_end().trim_end_matches("OpFunctionEnd");
    assert_invalid(
        truncated,
        universal(1, 0),
        ErrorKind::InvalidData,
        "Missing OpFunctionEnd at end of module.",
    );

    let src = "OpCapability Shader\nOpCapability Linkage";
    assert_invalid(
        src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "Missing required OpMemoryModel instruction.",
    );
}

#[test]
fn function_body_structure() {
    let src = compute_shader(
        "",
        "%ptr_fn_u32 = OpTypePointer Function %u32",
        "%x = OpIAdd %u32 %u32_1 %u32_1\n%v = OpVariable %ptr_fn_u32 Function",
    );
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "All OpVariable instructions in a function must be the first instructions in the first \
         block.",
    );

    let src = compute_shader(
        "",
        "%ptr_wg_u32 = OpTypePointer Workgroup %u32",
        "%v = OpVariable %ptr_wg_u32 Workgroup",
    );
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "Variables must have a function[7] storage class inside of a function",
    );
}

#[test]
fn variable_limits() {
    let src = compute_shader(
        "",
        "%ptr_fn_u32 = OpTypePointer Function %u32",
        "%a = OpVariable %ptr_fn_u32 Function\n%b = OpVariable %ptr_fn_u32 Function",
    );
    assert_eq!(validate(&src, universal(1, 0)), Ok(()));
    let limits = UniversalLimits { max_local_variables: 1, ..UniversalLimits::default() };
    let diag = validate_with_limits(&src, limits).unwrap_err();
    assert_eq!(diag.kind, ErrorKind::OutOfResources);
    assert!(diag.message.starts_with("Number of local variables ('Function' Storage Class)"), "{diag}");

    let src = compute_shader(
        "",
        "%ptr_wg_u32 = OpTypePointer Workgroup %u32
%a = OpVariable %ptr_wg_u32 Workgroup
%b = OpVariable %ptr_wg_u32 Workgroup",
        "",
    );
    assert_eq!(validate(&src, universal(1, 0)), Ok(()));
    let limits = UniversalLimits { max_global_variables: 1, ..UniversalLimits::default() };
    let diag = validate_with_limits(&src, limits).unwrap_err();
    assert_eq!(diag.kind, ErrorKind::OutOfResources);
    assert!(diag.message.ends_with("exceeded the valid limit (1)."), "{diag}");
}

#[test]
fn id_bound() {
    let src = compute_shader("", "", "");
    let limits = UniversalLimits { max_id_bound: 4, ..UniversalLimits::default() };
    let diag = validate_with_limits(&src, limits).unwrap_err();
    assert_eq!(diag.kind, ErrorKind::OutOfResources);
    assert_eq!(diag.message, "Invalid SPIR-V.  The id bound is larger than the max id bound 4.");

    // Result IDs must stay below the bound declared in the header.
    let mut words = assemble(&src);
    words[3] = 2;
    let diag = spirv_val::validate(&words, universal(1, 0), &ValidatorOptions::default()).unwrap_err();
    assert_eq!(diag.kind, ErrorKind::InvalidId);
    assert!(diag.message.ends_with("is out of bounds, the ID bound is 2"), "{diag}");
}

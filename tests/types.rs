mod common;

use common::*;
use spirv_val::options::UniversalLimits;
use spirv_val::{ErrorKind, ValidatorOptions};

fn with_decls(preamble: &str, decls: &str) -> String {
    compute_shader(preamble, decls, "")
}

#[test]
fn int_widths_need_capabilities() {
    let u8_decl = "%u8 = OpTypeInt 8 0";
    assert_invalid(
        &with_decls("", u8_decl),
        universal(1, 0),
        ErrorKind::InvalidData,
        "Using an 8-bit integer type requires the Int8 capability",
    );
    assert_valid(&with_decls("OpCapability Int8", u8_decl), universal(1, 0));

    let u16_decl = "%u16 = OpTypeInt 16 0";
    assert_invalid(
        &with_decls("", u16_decl),
        universal(1, 0),
        ErrorKind::InvalidData,
        "Using a 16-bit integer type requires the Int16 capability",
    );
    assert_valid(&with_decls("OpCapability Int16", u16_decl), universal(1, 0));

    assert_invalid(
        &with_decls("", "%u64 = OpTypeInt 64 0"),
        universal(1, 0),
        ErrorKind::InvalidData,
        "Using a 64-bit integer type requires the Int64 capability.",
    );
    assert_invalid(
        &with_decls("", "%u7 = OpTypeInt 7 0"),
        universal(1, 0),
        ErrorKind::InvalidData,
        "Invalid number of bits (7) used for OpTypeInt.",
    );
    assert_invalid(
        &with_decls("", "%odd = OpTypeInt 32 2"),
        universal(1, 0),
        ErrorKind::InvalidData,
        "OpTypeInt has invalid signedness: 2",
    );
}

#[test]
fn float_widths_need_capabilities() {
    assert_invalid(
        &with_decls("", "%f16 = OpTypeFloat 16"),
        universal(1, 0),
        ErrorKind::InvalidData,
        "Using a 16-bit floating point type requires the Float16 or Float16Buffer capability",
    );
    assert_valid(&with_decls("OpCapability Float16", "%f16 = OpTypeFloat 16"), universal(1, 0));

    assert_invalid(
        &with_decls("", "%f64 = OpTypeFloat 64"),
        universal(1, 0),
        ErrorKind::InvalidData,
        "Using a 64-bit floating point type requires the Float64 capability.",
    );
    assert_valid(&with_decls("OpCapability Float64", "%f64 = OpTypeFloat 64"), universal(1, 0));

    assert_invalid(
        &with_decls("", "%f24 = OpTypeFloat 24"),
        universal(1, 0),
        ErrorKind::InvalidData,
        "Invalid number of bits (24) used for OpTypeFloat.",
    );
}

#[test]
fn vector_component_count() {
    assert_valid(&with_decls("", "%v4 = OpTypeVector %f32 4"), universal(1, 0));

    for count in [1, 5, 8] {
        let src = with_decls("", &format!("%v = OpTypeVector %f32 {count}"));
        assert_invalid(
            &src,
            universal(1, 0),
            ErrorKind::InvalidData,
            &format!("Illegal number of components ({count}) for TypeVector"),
        );
    }

    assert_invalid(
        &with_decls("", "%v = OpTypeVector %void 2"),
        universal(1, 0),
        ErrorKind::InvalidId,
        "is not a scalar type.",
    );
}

#[test]
fn matrix_columns() {
    let decls = "%v4 = OpTypeVector %f32 4\n%mat = OpTypeMatrix %v4 4";
    assert_valid(&with_decls("", decls), universal(1, 0));

    assert_invalid(
        &with_decls("", "%mat = OpTypeMatrix %f32 4"),
        universal(1, 0),
        ErrorKind::InvalidId,
        "Columns in a matrix must be of type vector.",
    );
    assert_invalid(
        &with_decls("", "%uv4 = OpTypeVector %u32 4\n%mat = OpTypeMatrix %uv4 4"),
        universal(1, 0),
        ErrorKind::InvalidData,
        "Matrix types can only be parameterized with floating-point types.",
    );
    assert_invalid(
        &with_decls("", "%v4 = OpTypeVector %f32 4\n%mat = OpTypeMatrix %v4 5"),
        universal(1, 0),
        ErrorKind::InvalidData,
        "Matrix types can only be parameterized as having only 2, 3, or 4 columns.",
    );
}

#[test]
fn array_length_must_be_positive() {
    assert_valid(&with_decls("", "%arr = OpTypeArray %u32 %u32_4"), universal(1, 0));

    assert_invalid(
        &with_decls("", "%arr = OpTypeArray %u32 %u32_0"),
        universal(1, 0),
        ErrorKind::InvalidId,
        "default value must be at least 1: found 0",
    );

    // Signed lengths are sign-extended, `-1` isn't a huge unsigned length.
    let decls = "%minus_one = OpConstant %s32 -1\n%arr = OpTypeArray %u32 %minus_one";
    assert_invalid(
        &with_decls("", decls),
        universal(1, 0),
        ErrorKind::InvalidId,
        "default value must be at least 1: found -1",
    );

    let decls = "%f32_4 = OpConstant %f32 4.0\n%arr = OpTypeArray %u32 %f32_4";
    assert_invalid(
        &with_decls("", decls),
        universal(1, 0),
        ErrorKind::InvalidId,
        "is not a scalar constant type.",
    );

    assert_invalid(
        &with_decls("", "%arr = OpTypeArray %void %u32_4"),
        universal(1, 0),
        ErrorKind::InvalidId,
        "is a void type.",
    );
}

#[test]
fn struct_member_and_depth_limits() {
    let decls = "%inner = OpTypeStruct %u32 %f32\n%outer = OpTypeStruct %inner";
    assert_valid(&with_decls("", decls), universal(1, 0));

    let limits = UniversalLimits { max_struct_members: 1, ..UniversalLimits::default() };
    let options = ValidatorOptions::default().universal_limits(limits);
    let diag = validate_with(&with_decls("", decls), universal(1, 0), &options).unwrap_err();
    assert_eq!(diag.kind, ErrorKind::OutOfResources);
    assert_eq!(diag.message, "Number of OpTypeStruct members (2) has exceeded the limit (1).");

    let limits = UniversalLimits { max_struct_depth: 1, ..UniversalLimits::default() };
    let options = ValidatorOptions::default().universal_limits(limits);
    let diag = validate_with(&with_decls("", decls), universal(1, 0), &options).unwrap_err();
    assert_eq!(diag.kind, ErrorKind::OutOfResources);
    assert_eq!(diag.message, "Structure Nesting Depth may not be larger than 1. Found 2.");

    assert_invalid(
        &with_decls("", "%st = OpTypeStruct %u32 %void"),
        universal(1, 0),
        ErrorKind::InvalidId,
        "Structures cannot contain a void type",
    );
}

#[test]
fn function_type_parameters() {
    let decls = "%fn_two = OpTypeFunction %void %u32 %f32";
    assert_valid(&with_decls("", decls), universal(1, 0));

    let limits = UniversalLimits { max_function_args: 1, ..UniversalLimits::default() };
    let options = ValidatorOptions::default().universal_limits(limits);
    let diag = validate_with(&with_decls("", decls), universal(1, 0), &options).unwrap_err();
    assert_eq!(diag.kind, ErrorKind::OutOfResources);
    assert!(diag.message.starts_with("OpTypeFunction may not take more than 1 arguments."), "{diag}");
    assert!(diag.message.ends_with("has 2 arguments."), "{diag}");

    assert_invalid(
        &with_decls("", "%fn_bad = OpTypeFunction %void %void"),
        universal(1, 0),
        ErrorKind::InvalidId,
        "cannot be OpTypeVoid.",
    );
}

#[test]
fn scalar_constant_types() {
    assert_invalid(
        &with_decls("", "%t = OpConstantTrue %u32"),
        universal(1, 0),
        ErrorKind::InvalidId,
        "is not a boolean type.",
    );
    assert_invalid(
        &with_decls("", "%null = OpConstantNull %void"),
        universal(1, 0),
        ErrorKind::InvalidId,
        "cannot have a null value.",
    );
}

#[test]
fn composite_constituent_count_and_types() {
    let decls = "%f32_1 = OpConstant %f32 1.0
%v2 = OpTypeVector %u32 2
%st = OpTypeStruct %u32 %f32
%arr = OpTypeArray %u32 %u32_4";
    let with = |composite: &str| with_decls("", &format!("{decls}\n{composite}"));

    assert_valid(&with("%c = OpConstantComposite %v2 %u32_0 %u32_1"), universal(1, 0));
    assert_valid(&with("%c = OpConstantComposite %st %u32_1 %f32_1"), universal(1, 0));
    assert_valid(&with("%c = OpConstantComposite %arr %u32_0 %u32_1 %u32_0 %u32_1"), universal(1, 0));

    assert_invalid(
        &with("%c = OpConstantComposite %v2 %u32_1"),
        universal(1, 0),
        ErrorKind::InvalidId,
        "Constituent count (1) does not match Result Type",
    );
    assert_invalid(
        &with("%c = OpConstantComposite %st %f32_1 %u32_1"),
        universal(1, 0),
        ErrorKind::InvalidId,
        "type does not match the Result Type",
    );
    assert_invalid(
        &with("%c = OpConstantComposite %arr %u32_0 %u32_1 %u32_0 %f32_1"),
        universal(1, 0),
        ErrorKind::InvalidId,
        "type does not match the Result Type",
    );
    assert_invalid(
        &with("%c = OpConstantComposite %u32 %u32_1"),
        universal(1, 0),
        ErrorKind::InvalidId,
        "is not a composite type.",
    );
}

#[test]
fn composite_of_huge_array_is_rejected() {
    let decls = "%u64 = OpTypeInt 64 0
%huge = OpConstant %u64 4611686018427387904
%arr = OpTypeArray %u32 %huge
%c = OpConstantComposite %arr %u32_0";
    let diag = assert_invalid(
        &with_decls("OpCapability Int64", decls),
        universal(1, 0),
        ErrorKind::InvalidId,
        "Constituent count (1) does not match Result Type",
    );
    assert!(diag.message.contains("(4611686018427387904)"), "{diag}");
}

mod common;

use common::*;
use spirv_val::ErrorKind;

const TENSOR_PREAMBLE: &str = "OpCapability TensorsARM\nOpExtension \"SPV_ARM_tensors\"";

/// A 2x4 tensor of `%u32`, loaded into `%t`, with `%coords` indexing it.
const TENSOR_DECLS: &str = "
%u32_2 = OpConstant %u32 2
%f32_0 = OpConstant %f32 0.0
%arr1 = OpTypeArray %u32 %u32_1
%arr2 = OpTypeArray %u32 %u32_2
%arr4 = OpTypeArray %u32 %u32_4
%shape = OpConstantComposite %arr2 %u32_2 %u32_4
%tensor = OpTypeTensorARM %u32 %u32_2 %shape
%ptr_uc_tensor = OpTypePointer UniformConstant %tensor
%tensor_var = OpVariable %ptr_uc_tensor UniformConstant
%coords = OpConstantComposite %arr2 %u32_1 %u32_1
%coords4 = OpConstantComposite %arr4 %u32_1 %u32_1 %u32_1 %u32_1
%unranked = OpTypeTensorARM %u32
%ptr_uc_unranked = OpTypePointer UniformConstant %unranked
%unranked_var = OpVariable %ptr_uc_unranked UniformConstant
";

fn tensor_shader(decls: &str, body: &str) -> String {
    compute_shader(
        TENSOR_PREAMBLE,
        &format!("{TENSOR_DECLS}\n{decls}"),
        &format!("%t = OpLoad %tensor %tensor_var\n{body}"),
    )
}

#[test]
fn read_write_and_query_are_valid() {
    let src = tensor_shader(
        "",
        "%x = OpTensorReadARM %u32 %t %coords
%y = OpTensorReadARM %u32 %t %coords OutOfBoundsValueARM|NontemporalARM %u32_0
OpTensorWriteARM %t %coords %x
OpTensorWriteARM %t %coords %y NontemporalARM
%n = OpTensorQuerySizeARM %u32 %t %u32_1",
    );
    assert_valid(&src, universal(1, 0));
}

#[test]
fn null_tensor_needs_full_shape() {
    let src = tensor_shader("%null = OpConstantNull %unranked", "");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidId, "must be a tensor type with both Rank and Shape specified.");

    let src = tensor_shader("%null = OpConstantNull %tensor", "");
    assert_valid(&src, universal(1, 0));
}

#[test]
fn rank_must_be_positive() {
    let src = tensor_shader("%bad = OpTypeTensorARM %u32 %u32_0", "");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, "must define a value greater than 0.");
}

#[test]
fn element_must_be_scalar() {
    let src = tensor_shader("%bad = OpTypeTensorARM %arr2", "");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, "is not a scalar type.");
}

#[test]
fn composite_constituents() {
    let decls = "%shape1 = OpConstantComposite %arr1 %u32_2
%tensor1 = OpTypeTensorARM %u32 %u32_1 %shape1";

    let src = tensor_shader(&format!("{decls}\n%c = OpConstantComposite %tensor1 %u32_1 %u32_0"), "");
    assert_valid(&src, universal(1, 0));

    let src = tensor_shader(&format!("{decls}\n%c = OpConstantComposite %tensor1 %u32_1 %u32_0 %u32_1"), "");
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "Constituent count (3) does not match the outermost dimension",
    );

    let src = tensor_shader(&format!("{decls}\n%c = OpConstantComposite %tensor1 %u32_1 %f32_0"), "");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, "must have the Element Type");
}

#[test]
fn access_needs_ranked_tensor() {
    let src = tensor_shader("", "%u = OpLoad %unranked %unranked_var\n%x = OpTensorReadARM %u32 %u %coords");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, "must be a ranked tensor.");
}

#[test]
fn coordinates_length_must_equal_rank() {
    let src = tensor_shader("", "%x = OpTensorReadARM %u32 %t %coords4");
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "must be an array of integer scalars with a length equal to the Rank of Tensor (2).",
    );
}

#[test]
fn read_result_must_be_element_type() {
    let src = tensor_shader("", "%x = OpTensorReadARM %f32 %t %coords");
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "OpTensorReadARM Result Type must be the Element Type of Tensor, or an array of it.",
    );
}

#[test]
fn read_operand_restrictions() {
    let cases = [
        ("MakeElementAvailableARM|NonPrivateElementARM %workgroup", "MakeElementAvailableARM cannot be used with a read."),
        ("MakeElementVisibleARM %workgroup", "NonPrivateElementARM must be specified if MakeElementVisibleARM is specified."),
        ("OutOfBoundsValueARM %f32_0", "OutOfBoundsValueARM operand must have the Element Type of Tensor."),
    ];
    for (operands, message) in cases {
        let src = tensor_shader("", &format!("%x = OpTensorReadARM %u32 %t %coords {operands}"));
        assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, message);
    }

    let src = tensor_shader(
        "",
        "%x = OpTensorReadARM %u32 %t %coords MakeElementVisibleARM|NonPrivateElementARM %workgroup",
    );
    assert_valid(&src, universal(1, 0));
}

#[test]
fn write_operand_restrictions() {
    for (operands, message) in [
        ("MakeElementVisibleARM|NonPrivateElementARM %workgroup", "MakeElementVisibleARM cannot be used with a write."),
        ("OutOfBoundsValueARM %u32_0", "OutOfBoundsValueARM cannot be used with a write."),
    ] {
        let src = tensor_shader("", &format!("OpTensorWriteARM %t %coords %u32_1 {operands}"));
        assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, message);
    }
}

#[test]
fn query_size_dimension_must_be_in_range() {
    let src = tensor_shader("", "%n = OpTensorQuerySizeARM %u32 %t %u32_2");
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "OpTensorQuerySizeARM Dimension (2) must be less than the Rank of Tensor (2).",
    );

    let src = tensor_shader("", "%n = OpTensorQuerySizeARM %f32 %t %u32_0");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, "Result Type must be an integer scalar type.");
}

#[test]
fn signed_shape_rank_and_dimension_values() {
    let signed = "%minus_one = OpConstant %s32 -1
%s32_4 = OpConstant %s32 4
%sarr2 = OpTypeArray %s32 %u32_2";

    let src = tensor_shader(
        &format!("{signed}\n%shape_s = OpConstantComposite %sarr2 %s32_4 %s32_4\n%ok = OpTypeTensorARM %u32 %u32_2 %shape_s"),
        "",
    );
    assert_valid(&src, universal(1, 0));

    let src = tensor_shader(
        &format!("{signed}\n%shape_s = OpConstantComposite %sarr2 %minus_one %s32_4\n%bad = OpTypeTensorARM %u32 %u32_2 %shape_s"),
        "",
    );
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, "Shape constituent 0 is not greater than 0.");

    let src = tensor_shader(&format!("{signed}\n%bad = OpTypeTensorARM %u32 %minus_one"), "");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, "must define a value greater than 0.");

    let src = tensor_shader(signed, "%n = OpTensorQuerySizeARM %u32 %t %minus_one");
    assert_invalid(
        &src,
        universal(1, 0),
        ErrorKind::InvalidData,
        "OpTensorQuerySizeARM Dimension (-1) must be less than the Rank of Tensor (2).",
    );
}

#[test]
fn null_shape_is_rejected() {
    let src = tensor_shader("%null_shape = OpConstantNull %arr2\n%bad = OpTypeTensorARM %u32 %u32_2 %null_shape", "");
    assert_invalid(&src, universal(1, 0), ErrorKind::InvalidData, "Shape constituent 0 is not greater than 0.");
}

//! Shared helpers: a tiny assembler for the textual SPIR-V form used in tests,
//! driven by the same grammar tables as the validator.
//!
//! Syntax is that of `spirv-dis` output: `%name = OpFoo %type operands...`,
//! with enumerants by name, bit-masks as `A|B`, and strings in quotes. IDs
//! are numbered in order of first appearance.
#![allow(dead_code)]

use spirv_val::spv::spec::{self, OperandKindDef, OperandMode};
use spirv_val::spv::Version;
use spirv_val::{Diag, ErrorKind, TargetEnv, ValidatorOptions};
use std::collections::HashMap;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct Assembler {
    ids: HashMap<String, u32>,
    /// Bit-widths of `OpTypeInt`/`OpTypeFloat` results.
    widths: HashMap<u32, u32>,
    /// Result types of every typed result.
    types: HashMap<u32, u32>,
    words: Vec<u32>,
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = vec![];
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == ';' {
            break;
        } else if c == '"' {
            chars.next();
            let mut s = String::from('"');
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                s.push(c);
            }
            tokens.push(s);
        } else {
            let mut s = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                s.push(c);
                chars.next();
            }
            tokens.push(s);
        }
    }
    tokens
}

fn parse_int(token: &str) -> u64 {
    let parsed = if let Some(hex) = token.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else if let Some(neg) = token.strip_prefix('-') {
        neg.parse::<i64>().ok().map(|x| (-x) as u64)
    } else {
        token.parse().ok()
    };
    parsed.unwrap_or_else(|| panic!("expected integer literal, found `{token}`"))
}

impl Assembler {
    fn id(&mut self, token: &str) -> u32 {
        let name = token.strip_prefix('%').unwrap_or_else(|| panic!("expected ID, found `{token}`"));
        let next = self.ids.len() as u32 + 1;
        *self.ids.entry(name.to_string()).or_insert(next)
    }

    fn line(&mut self, line: &str) {
        let mut tokens = tokenize(line).into_iter().peekable();
        let Some(first) = tokens.next() else { return };

        let (result_id, opcode_name) = if first.starts_with('%') {
            assert_eq!(tokens.next().as_deref(), Some("="), "in `{line}`");
            (Some(self.id(&first)), tokens.next().expect("missing opcode"))
        } else {
            (None, first)
        };

        let spec = spec::Spec::get();
        let opcode = spec
            .instructions
            .lookup(&opcode_name)
            .unwrap_or_else(|| panic!("unknown opcode `{opcode_name}`"));
        let def = opcode.def();

        let mut operands = vec![];
        let mut result_type = None;
        if def.has_result_type_id {
            let ty = self.id(&tokens.next().expect("missing result type"));
            result_type = Some(ty);
            operands.push(ty);
        }
        if def.has_result_id {
            operands.push(result_id.expect("missing result ID"));
        }
        if let (Some(result), Some(ty)) = (result_id, result_type) {
            self.types.insert(result, ty);
        }

        let mut first_id_operand = None;
        let tokens: Vec<String> = tokens.collect();
        let mut tokens = tokens.iter().map(|s| s.as_str()).peekable();
        for (mode, kind) in def.all_operands() {
            if tokens.peek().is_none() {
                assert!(mode == OperandMode::Optional, "missing operand in `{line}`");
                break;
            }
            let contextual_type = if opcode == spec.well_known.op.OpSwitch {
                first_id_operand.and_then(|selector| self.types.get(&selector).copied())
            } else {
                result_type
            };
            self.operand(kind, &mut tokens, contextual_type, &mut operands, &mut first_id_operand);
        }
        assert!(tokens.peek().is_none(), "too many operands in `{line}`");

        if [spec.well_known.op.OpTypeInt, spec.well_known.op.OpTypeFloat].contains(&opcode) {
            self.widths.insert(result_id.unwrap(), operands[1]);
        }

        let word_count = operands.len() as u32 + 1;
        self.words.push((word_count << 16) | u32::from(opcode.as_u16()));
        self.words.extend(operands);
    }

    fn operand<'t>(
        &mut self,
        kind: spec::OperandKind,
        tokens: &mut std::iter::Peekable<impl Iterator<Item = &'t str>>,
        contextual_type: Option<u32>,
        out: &mut Vec<u32>,
        first_id_operand: &mut Option<u32>,
    ) {
        let token = tokens.next().unwrap();
        let params: Vec<&'static spec::Enumerant> = match kind.def() {
            OperandKindDef::Id => {
                let id = self.id(token);
                first_id_operand.get_or_insert(id);
                out.push(id);
                vec![]
            }
            OperandKindDef::Literal { size: spec::LiteralSize::Word } => {
                out.push(parse_int(token) as u32);
                vec![]
            }
            OperandKindDef::Literal { size: spec::LiteralSize::NulTerminated } => {
                let s = token.strip_prefix('"').unwrap_or(token);
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                while bytes.len() % 4 != 0 {
                    bytes.push(0);
                }
                out.extend(bytes.chunks(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])));
                vec![]
            }
            OperandKindDef::Literal { size: spec::LiteralSize::FromContextualType } => {
                let width = contextual_type.and_then(|ty| self.widths.get(&ty)).copied().unwrap_or(32);
                let value = if token.contains('.') {
                    match width {
                        64 => token.parse::<f64>().unwrap().to_bits(),
                        _ => u64::from(token.parse::<f32>().unwrap().to_bits()),
                    }
                } else {
                    parse_int(token)
                };
                out.push(value as u32);
                if width > 32 {
                    out.push((value >> 32) as u32);
                }
                vec![]
            }
            OperandKindDef::ValueEnum { .. } => {
                let value = kind
                    .enumerant_value(token)
                    .unwrap_or_else(|| parse_int(token) as u32);
                out.push(value);
                kind.enumerant(value).map(|(_, e)| e).into_iter().collect()
            }
            OperandKindDef::BitEnum { .. } => {
                let value = token
                    .split('|')
                    .map(|name| kind.enumerant_value(name).unwrap_or_else(|| parse_int(name) as u32))
                    .fold(0, |a, b| a | b);
                out.push(value);
                spec::BitIdx::of_all_set_bits(value)
                    .filter_map(|spec::BitIdx(i)| kind.enumerant(1 << i).map(|(_, e)| e))
                    .collect()
            }
        };

        for enumerant in params {
            for (mode, param_kind) in enumerant.all_params() {
                if tokens.peek().is_none() {
                    assert!(mode == OperandMode::Optional, "missing enumerant parameter");
                    break;
                }
                self.operand(param_kind, tokens, contextual_type, out, first_id_operand);
            }
        }
    }
}

/// Assemble `src` into a module with the given header version.
pub fn assemble_with_version(src: &str, version: Version) -> Vec<u32> {
    let mut asm = Assembler::default();
    for line in src.lines() {
        asm.line(line);
    }
    let bound = asm.ids.len() as u32 + 1;
    let mut words = vec![0x07230203, version.to_header_word(), 0, bound, 0];
    words.extend(asm.words);
    words
}

/// Assemble `src` into a SPIR-V 1.0 module.
pub fn assemble(src: &str) -> Vec<u32> {
    assemble_with_version(src, Version::new(1, 0))
}

pub fn validate_with(src: &str, env: TargetEnv, options: &ValidatorOptions) -> Result<(), Diag> {
    init_tracing();
    spirv_val::validate(&assemble(src), env, options)
}

pub fn validate(src: &str, env: TargetEnv) -> Result<(), Diag> {
    validate_with(src, env, &ValidatorOptions::default())
}

pub fn universal(major: u8, minor: u8) -> TargetEnv {
    TargetEnv::Universal(Version::new(major, minor))
}

#[track_caller]
pub fn assert_valid(src: &str, env: TargetEnv) {
    if let Err(diag) = validate(src, env) {
        panic!("expected valid module under {env}, got {:?}: {diag}", diag.kind);
    }
}

#[track_caller]
pub fn assert_invalid(src: &str, env: TargetEnv, kind: ErrorKind, message: &str) -> Diag {
    let diag = validate(src, env).expect_err("expected an error");
    assert_eq!(diag.kind, kind, "unexpected status for: {diag}");
    assert!(
        diag.message.contains(message),
        "expected message containing {message:?}, got {:?}",
        diag.message
    );
    diag
}

/// Memory model and entry point of a compute shader (`%main` must be defined by the caller).
pub const COMPUTE_HEADER: &str = "
OpMemoryModel Logical GLSL450
OpEntryPoint GLCompute %main \"main\"
OpExecutionMode %main LocalSize 1 1 1
";

/// Common types and constants, following [`COMPUTE_HEADER`].
pub const COMMON_TYPES: &str = "
%void = OpTypeVoid
%fn_void = OpTypeFunction %void
%bool = OpTypeBool
%u32 = OpTypeInt 32 0
%s32 = OpTypeInt 32 1
%f32 = OpTypeFloat 32
%u32_0 = OpConstant %u32 0
%u32_1 = OpConstant %u32 1
%u32_4 = OpConstant %u32 4
%cross_device = OpConstant %u32 0
%device = OpConstant %u32 1
%workgroup = OpConstant %u32 2
%subgroup = OpConstant %u32 3
%invocation = OpConstant %u32 4
%queue_family = OpConstant %u32 5
%none = OpConstant %u32 0
%acquire = OpConstant %u32 2
%release = OpConstant %u32 4
%acquire_release = OpConstant %u32 8
%sequentially_consistent = OpConstant %u32 16
%acquire_release_workgroup = OpConstant %u32 264
%acquire_and_release = OpConstant %u32 6
";

/// Wrap `body` (instructions of `%main`'s single block) into a `Shader`
/// compute shader, with `preamble` (extra capabilities and extensions) first,
/// and `decls` (extra module-scope declarations) after [`COMMON_TYPES`].
pub fn compute_shader(preamble: &str, decls: &str, body: &str) -> String {
    format!(
        "OpCapability Shader\n{preamble}\n{COMPUTE_HEADER}\n{COMMON_TYPES}\n{decls}
%main = OpFunction %void None %fn_void
%entry = OpLabel
{body}
OpReturn
OpFunctionEnd
"
    )
}

//! Low-level decoding of SPIR-V binary form (header and instructions).

use crate::diag::Diag;
use crate::spv::{self, spec};
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::{iter, slice};

/// Defining instruction of an ID.
///
/// Used currently only to help parsing `LiteralContextDependentNumber`.
enum KnownIdDef {
    TypeIntOrFloat(u32),
    Uncategorized { opcode: spec::Opcode, result_type_id: Option<spv::Id> },
}

impl KnownIdDef {
    fn result_type_id(&self) -> Option<spv::Id> {
        match *self {
            Self::TypeIntOrFloat(_) => None,
            Self::Uncategorized { result_type_id, .. } => result_type_id,
        }
    }
}

struct InstParser<'a> {
    wk: &'static spec::WellKnown,

    /// IDs defined so far in the module.
    known_ids: &'a FxHashMap<spv::Id, KnownIdDef>,

    /// Input words of an instruction.
    words: iter::Copied<slice::Iter<'a, u32>>,

    /// Output instruction, being parsed.
    inst: spv::Inst,
}

#[derive(Debug, thiserror::Error)]
enum InstParseError {
    #[error("truncated instruction")]
    NotEnoughWords,

    #[error("overlong instruction")]
    TooManyWords,

    #[error("ID 0 is illegal")]
    IdZero,

    #[error("{}", unsupported_enumerand_message(*.0, *.1))]
    UnsupportedEnumerand(spec::OperandKind, u32),

    #[error("missing type for literal")]
    MissingContextSensitiveLiteralType,

    #[error("{} is not a supported literal type", .type_opcode.name())]
    UnsupportedContextSensitiveLiteralType { type_opcode: spec::Opcode },

    #[error("{0} is not a supported opcode (for `OpSpecConstantOp`)")]
    UnsupportedSpecConstantOpOpcode(u32),

    #[error("literal string is missing its NUL terminator")]
    UnterminatedString,

    #[error("literal string is not valid UTF-8")]
    InvalidUtf8,
}

fn unsupported_enumerand_message(kind: spec::OperandKind, word: u32) -> String {
    let (name, def) = kind.name_and_def();
    match def {
        spec::OperandKindDef::BitEnum { bits, .. } => {
            let unsupported = spec::BitIdx::of_all_set_bits(word)
                .filter(|&bit_idx| bits.get(bit_idx).is_none())
                .fold(0u32, |x, i| x | (1 << i.0));
            format!("invalid {name} bit-pattern 0x{unsupported:08x}")
        }
        _ => format!("invalid {name} operand: {word}"),
    }
}

impl InstParser<'_> {
    fn is_exhausted(&self) -> bool {
        self.words.len() == 0
    }

    fn push(&mut self, operand: spv::Operand) {
        self.inst.operands.push(operand);
    }

    fn enumerant_params(&mut self, enumerant: &spec::Enumerant) -> Result<(), InstParseError> {
        for (mode, kind) in enumerant.all_params() {
            if mode == spec::OperandMode::Optional && self.is_exhausted() {
                break;
            }
            self.operand(kind)?;
        }

        Ok(())
    }

    fn operand(&mut self, kind: spec::OperandKind) -> Result<(), InstParseError> {
        use spv::{Imm, Operand};
        use InstParseError as Error;

        let word = self.words.next().ok_or(Error::NotEnoughWords)?;
        match kind.def() {
            spec::OperandKindDef::BitEnum { bits, .. } => {
                self.push(Operand::Imm(Imm::Short(kind, word)));

                for bit_idx in spec::BitIdx::of_all_set_bits(word) {
                    let bit_def =
                        bits.get(bit_idx).ok_or(Error::UnsupportedEnumerand(kind, word))?;
                    self.enumerant_params(bit_def)?;
                }
            }

            spec::OperandKindDef::ValueEnum { variants } => {
                self.push(Operand::Imm(Imm::Short(kind, word)));

                let variant_def = u16::try_from(word)
                    .ok()
                    .and_then(|v| variants.get(v))
                    .ok_or(Error::UnsupportedEnumerand(kind, word))?;
                self.enumerant_params(variant_def)?;
            }

            spec::OperandKindDef::Id => {
                let id = word.try_into().ok().ok_or(Error::IdZero)?;
                self.push(Operand::Id(kind, id));
            }

            spec::OperandKindDef::Literal { size: spec::LiteralSize::Word } => {
                self.push(Operand::Imm(Imm::Short(kind, word)));
            }
            spec::OperandKindDef::Literal { size: spec::LiteralSize::NulTerminated } => {
                let has_nul = |word: u32| word.to_le_bytes().contains(&0);
                let mut bytes = word.to_le_bytes().to_vec();
                if has_nul(word) {
                    self.push(Operand::Imm(Imm::Short(kind, word)));
                } else {
                    self.push(Operand::Imm(Imm::LongStart(kind, word)));
                    loop {
                        let word = self.words.next().ok_or(Error::UnterminatedString)?;
                        self.push(Operand::Imm(Imm::LongCont(kind, word)));
                        bytes.extend(word.to_le_bytes());
                        if has_nul(word) {
                            break;
                        }
                    }
                }
                let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                std::str::from_utf8(&bytes[..len]).map_err(|_| Error::InvalidUtf8)?;
            }
            spec::OperandKindDef::Literal { size: spec::LiteralSize::FromContextualType } => {
                let contextual_type = self
                    .inst
                    .result_type_id
                    .or_else(|| {
                        // `OpSwitch` takes its literal type from the first operand.
                        let id = self.inst.operands.first()?.as_id()?;
                        self.known_ids.get(&id)?.result_type_id()
                    })
                    .and_then(|id| self.known_ids.get(&id))
                    .ok_or(Error::MissingContextSensitiveLiteralType)?;

                let word_count = match *contextual_type {
                    KnownIdDef::TypeIntOrFloat(width) => width.div_ceil(32),
                    KnownIdDef::Uncategorized { opcode, .. } => {
                        return Err(Error::UnsupportedContextSensitiveLiteralType {
                            type_opcode: opcode,
                        });
                    }
                };

                if word_count == 1 {
                    self.push(Operand::Imm(Imm::Short(kind, word)));
                } else {
                    self.push(Operand::Imm(Imm::LongStart(kind, word)));
                    for _ in 1..word_count {
                        let word = self.words.next().ok_or(Error::NotEnoughWords)?;
                        self.push(Operand::Imm(Imm::LongCont(kind, word)));
                    }
                }
            }
        }

        Ok(())
    }

    /// Parse one operand of the instruction definition (as a new logical operand).
    fn logical_operand(&mut self, kind: spec::OperandKind) -> Result<(), InstParseError> {
        // Instructions are at most 65535 words long, so this never truncates.
        self.inst.logical_starts.push(self.inst.operands.len() as u16);
        self.operand(kind)
    }

    fn inst(mut self, def: &spec::InstructionDef) -> Result<spv::Inst, InstParseError> {
        use InstParseError as Error;

        {
            let mut id = || {
                self.words.next().ok_or(Error::NotEnoughWords)?.try_into().ok().ok_or(Error::IdZero)
            };
            self.inst.result_type_id = def.has_result_type_id.then(&mut id).transpose()?;
            self.inst.result_id = def.has_result_id.then(&mut id).transpose()?;
        }

        for (mode, kind) in def.all_operands() {
            if mode == spec::OperandMode::Optional && self.is_exhausted() {
                break;
            }
            self.logical_operand(kind)?;

            // HACK this isn't cleanly uniform because it's an odd special case.
            if kind == self.wk.kind.LiteralSpecConstantOpInteger {
                let word = self.inst.operands.last().map_or(0, |o| o.word());
                let (_, _, inner_def) = u16::try_from(word)
                    .ok()
                    .and_then(spec::Opcode::try_from_u16_with_name_and_def)
                    .ok_or(Error::UnsupportedSpecConstantOpOpcode(word))?;

                // The inner instruction's result type/ID are those of `OpSpecConstantOp`.
                for (inner_mode, inner_kind) in inner_def.all_operands() {
                    if inner_mode == spec::OperandMode::Optional && self.is_exhausted() {
                        break;
                    }
                    self.logical_operand(inner_kind)?;
                }
            }
        }

        // The instruction must consume its entire word count.
        if !self.is_exhausted() {
            return Err(Error::TooManyWords);
        }

        Ok(self.inst)
    }
}

/// Convert raw bytes to words (the header's magic is used to detect endianness later).
pub fn words_from_bytes(bytes: &[u8]) -> Result<Cow<'_, [u32]>, Diag> {
    if bytes.len() % 4 != 0 {
        return Err(Diag::invalid_binary(format!(
            "Invalid SPIR-V binary: size {} is not a multiple of 4 bytes",
            bytes.len()
        )));
    }
    Ok(match bytemuck::try_cast_slice::<u8, u32>(bytes) {
        Ok(words) => Cow::Borrowed(words),
        // Unaligned input, copy it out word by word.
        Err(_) => Cow::Owned(
            bytes.chunks_exact(4).map(|w| u32::from_ne_bytes([w[0], w[1], w[2], w[3]])).collect(),
        ),
    })
}

/// Check the magic number (normalizing endianness if needed), and decode the header.
///
/// The returned words are the whole module (header included), in native order.
pub fn decode_header(words: Cow<'_, [u32]>) -> Result<(spv::Header, Cow<'_, [u32]>), Diag> {
    let spv_spec = spec::Spec::get();

    if words.len() < spec::HEADER_LEN {
        return Err(Diag::invalid_binary(format!(
            "Module has incomplete header: only {} words",
            words.len()
        )));
    }

    // Check the magic, and swap endianness of all words if we have to.
    let magic = words[0];
    let words = if magic == spv_spec.magic {
        words
    } else if magic.swap_bytes() == spv_spec.magic {
        Cow::Owned(words.iter().map(|w| w.swap_bytes()).collect())
    } else {
        return Err(Diag::invalid_binary("Invalid SPIR-V magic number."));
    };

    let version = spv::Version::from_header_word(words[1]).ok_or_else(|| {
        Diag::invalid_binary(format!("Invalid SPIR-V version word 0x{:08x}", words[1]))
    })?;
    let header = spv::Header { version, generator: words[2], bound: words[3], schema: words[4] };

    if header.bound == 0 {
        return Err(Diag::invalid_binary("Invalid SPIR-V header: ID bound must be non-zero"));
    }
    if header.schema != 0 {
        return Err(Diag::invalid_binary(format!(
            "Invalid SPIR-V header: schema {} must be 0",
            header.schema
        )));
    }

    Ok((header, words))
}

/// Iterator over the instructions following the header.
pub struct InstDecoder<'a> {
    words: &'a [u32],

    /// Next (instructions') word position in `words`.
    next_word: usize,

    /// Number of instructions decoded so far.
    next_inst_idx: usize,

    /// IDs defined so far in the module.
    known_ids: FxHashMap<spv::Id, KnownIdDef>,
}

impl<'a> InstDecoder<'a> {
    pub fn new(words_after_header: &'a [u32]) -> Self {
        Self {
            words: words_after_header,
            next_word: 0,
            next_inst_idx: 0,
            known_ids: FxHashMap::default(),
        }
    }

    fn decode_next(&mut self) -> Result<spv::Inst, Diag> {
        let words = &self.words[self.next_word..];
        let first = words[0];
        let inst_idx = self.next_inst_idx;

        let (inst_len, opcode) = ((first >> 16) as usize, first as u16);

        if inst_len == 0 {
            return Err(Diag::invalid_binary("Invalid instruction word count: 0").at_inst(inst_idx));
        }

        let (opcode, _, def) = spec::Opcode::try_from_u16_with_name_and_def(opcode).ok_or_else(
            || Diag::invalid_binary(format!("Invalid opcode: {opcode}")).at_inst(inst_idx),
        )?;

        let invalid = |e: InstParseError| {
            Diag::invalid_binary(format!("{}: {e}", opcode.short_name())).at_inst(inst_idx)
        };

        if words.len() < inst_len {
            return Err(invalid(InstParseError::NotEnoughWords));
        }

        let parser = InstParser {
            wk: &spec::Spec::get().well_known,
            known_ids: &self.known_ids,
            words: words[1..inst_len].iter().copied(),
            inst: spv::Inst::new(opcode),
        };
        let inst = parser.inst(def).map_err(invalid)?;

        // NOTE: duplicate definitions are diagnosed when building the module
        // tables, only the first definition is kept here.
        if let Some(id) = inst.result_id {
            let known_id_def = match inst.int_or_float_type_bit_width() {
                Some(w) if w > 0 => KnownIdDef::TypeIntOrFloat(w),
                _ => KnownIdDef::Uncategorized { opcode, result_type_id: inst.result_type_id },
            };
            self.known_ids.entry(id).or_insert(known_id_def);
        }

        self.next_word += inst_len;
        self.next_inst_idx += 1;

        Ok(inst)
    }
}

impl Iterator for InstDecoder<'_> {
    type Item = Result<spv::Inst, Diag>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.next_word >= self.words.len() {
            return None;
        }
        let result = self.decode_next();
        if result.is_err() {
            // Nothing past a malformed instruction can be decoded reliably.
            self.next_word = self.words.len();
        }
        Some(result)
    }
}

/// Decode the whole instruction stream, stopping at the first malformed instruction.
pub fn decode_instructions(words_after_header: &[u32]) -> Result<Vec<spv::Inst>, Diag> {
    InstDecoder::new(words_after_header).collect()
}

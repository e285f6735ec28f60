//! SPIR-V binary form: grammar tables ([`spec`]) and instruction decoding ([`read`]).

// NOTE all the modules are declared here, but they're documented "inside"
// (i.e. using inner doc comments).
pub mod read;
pub mod spec;

use smallvec::SmallVec;
use std::fmt;
use std::num::NonZeroU32;

/// SPIR-V ID.
pub type Id = NonZeroU32;

/// SPIR-V version (as encoded in the module header, i.e. `0x00MMmm00`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Decode a header version word, which must have its high and low bytes zeroed.
    pub fn from_header_word(word: u32) -> Option<Self> {
        let [lo, minor, major, hi] = word.to_le_bytes();
        (lo == 0 && hi == 0).then_some(Self { major, minor })
    }

    pub fn to_header_word(self) -> u32 {
        u32::from_le_bytes([0, self.minor, self.major, 0])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The 5-word header preceding all instructions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: Version,
    pub generator: u32,

    /// All result IDs must be strictly less than this.
    pub bound: u32,

    pub schema: u32,
}

/// SPIR-V immediate (one word, longer immediates are a sequence of multiple [`Imm`]s).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Imm {
    Short(spec::OperandKind, u32),
    LongStart(spec::OperandKind, u32),
    LongCont(spec::OperandKind, u32),
}

/// One word of an instruction's operands (after the result type/ID, if any).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Id(spec::OperandKind, Id),
    Imm(Imm),
}

impl Operand {
    pub fn kind(self) -> spec::OperandKind {
        match self {
            Self::Id(kind, _)
            | Self::Imm(Imm::Short(kind, _) | Imm::LongStart(kind, _) | Imm::LongCont(kind, _)) => {
                kind
            }
        }
    }

    pub fn word(self) -> u32 {
        match self {
            Self::Id(_, id) => id.get(),
            Self::Imm(Imm::Short(_, word) | Imm::LongStart(_, word) | Imm::LongCont(_, word)) => {
                word
            }
        }
    }

    pub fn as_id(self) -> Option<Id> {
        match self {
            Self::Id(_, id) => Some(id),
            Self::Imm(_) => None,
        }
    }

    /// Whether this word begins a new operand (as opposed to continuing a long literal).
    fn starts_operand(self) -> bool {
        !matches!(self, Self::Imm(Imm::LongCont(..)))
    }
}

/// A decoded SPIR-V instruction.
///
/// The operand words are kept flat (and in their original order), with the
/// starting position of each *logical* operand (i.e. one per operand of the
/// grammar's instruction definition, including any enumerant parameters and
/// every word of a long literal) recorded separately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inst {
    pub opcode: spec::Opcode,

    pub result_type_id: Option<Id>,
    pub result_id: Option<Id>,

    // FIXME: change the inline size of this to fit most instructions.
    pub operands: SmallVec<[Operand; 4]>,

    /// Index into `operands` where each logical operand starts.
    pub logical_starts: SmallVec<[u16; 4]>,
}

impl Inst {
    pub fn new(opcode: spec::Opcode) -> Self {
        Self {
            opcode,
            result_type_id: None,
            result_id: None,
            operands: SmallVec::new(),
            logical_starts: SmallVec::new(),
        }
    }

    pub fn num_logical_operands(&self) -> usize {
        self.logical_starts.len()
    }

    /// All the words making up logical operand `idx` (if present).
    pub fn logical_operand(&self, idx: usize) -> Option<&[Operand]> {
        let start = usize::from(*self.logical_starts.get(idx)?);
        let end = self
            .logical_starts
            .get(idx + 1)
            .map_or(self.operands.len(), |&end| usize::from(end));
        Some(&self.operands[start..end])
    }

    /// The ID in logical operand `idx`, if that operand exists and is an ID.
    pub fn id_operand(&self, idx: usize) -> Option<Id> {
        self.logical_operand(idx)?.first()?.as_id()
    }

    /// The first word of logical operand `idx`, if it's an immediate (a literal,
    /// an enumerant value or a bit-mask, without its parameters).
    pub fn imm_operand(&self, idx: usize) -> Option<u32> {
        match *self.logical_operand(idx)?.first()? {
            Operand::Imm(imm) => Some(Operand::Imm(imm).word()),
            Operand::Id(..) => None,
        }
    }

    /// Decode logical operand `idx` as a `LiteralString`.
    pub fn literal_string(&self, idx: usize) -> Option<String> {
        let words = self.logical_operand(idx)?;
        let wk = &spec::Spec::get().well_known;
        if words.first()?.kind() != wk.kind.LiteralString {
            return None;
        }
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.word().to_le_bytes()).collect();
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Some(String::from_utf8_lossy(&bytes[..len]).into_owned())
    }

    /// All ID operands (including those nested in enumerant parameters).
    pub fn id_operands(&self) -> impl Iterator<Item = (spec::OperandKind, Id)> + '_ {
        self.operands.iter().filter_map(|&operand| match operand {
            Operand::Id(kind, id) => Some((kind, id)),
            Operand::Imm(_) => None,
        })
    }

    /// The 1-based operand number (as SPIR-V disassemblers count them, starting
    /// with the result type/ID) of the operand that `operands[operand_idx]` is part of.
    pub fn operand_number(&self, operand_idx: usize) -> usize {
        let preceding = self.operands[..=operand_idx].iter().filter(|o| o.starts_operand()).count();
        usize::from(self.result_type_id.is_some())
            + usize::from(self.result_id.is_some())
            + preceding
    }

    /// Split the parameters following a bit-mask (i.e. `logical_operand(idx)[1..]`),
    /// into the (single-bit) enumerants they belong to, in increasing bit order.
    pub fn mask_params(&self, idx: usize) -> SmallVec<[(u32, &[Operand]); 2]> {
        let mut out = SmallVec::new();
        let Some(words) = self.logical_operand(idx) else {
            return out;
        };
        let Some((&mask_word, mut params)) = words.split_first() else {
            return out;
        };
        let kind = mask_word.kind();
        for bit_idx in spec::BitIdx::of_all_set_bits(mask_word.word()) {
            let bit = 1 << bit_idx.0;
            let Some((_, enumerant)) = kind.enumerant(bit) else {
                continue;
            };
            let mut len = 0;
            for _ in &enumerant.req_params {
                len += 1;
                while params.get(len).is_some_and(|o| !o.starts_operand()) {
                    len += 1;
                }
            }
            let len = len.min(params.len());
            out.push((bit, &params[..len]));
            params = &params[len..];
        }
        out
    }

    /// The parameters of a single bit (if set) in the mask at logical operand `idx`.
    pub fn mask_param(&self, idx: usize, bit: u32) -> Option<&[Operand]> {
        self.mask_params(idx).into_iter().find(|&(b, _)| b == bit).map(|(_, params)| params)
    }

    /// Bit-width of an `OpTypeInt`/`OpTypeFloat` definition.
    pub fn int_or_float_type_bit_width(&self) -> Option<u32> {
        let wk = &spec::Spec::get().well_known;
        if [wk.op.OpTypeInt, wk.op.OpTypeFloat].contains(&self.opcode) {
            self.imm_operand(0)
        } else {
            None
        }
    }
}

//! SPIR-V grammar parsing/indexing (opcodes, operand kinds and their requirements).

use crate::spv::Version;
use arrayvec::ArrayVec;
use lazy_static::lazy_static;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::{fmt, iter};

use self::indexed::FlatIdx as _;

pub const HEADER_LEN: usize = 5;

pub struct Spec {
    pub magic: u32,

    /// Pre-cached indices/values for "well-known" names.
    pub well_known: WellKnown,

    pub instructions: indexed::NamedIdxMap<Opcode, InstructionDef, indexed::Sparse>,

    pub operand_kinds: indexed::NamedIdxMap<OperandKind, OperandKindDef, indexed::Flat>,
}

macro_rules! def_well_known {
    ($($group:ident: $group_ty:ident<$ty:ty> = [$($entry:ident),+ $(,)?]),+ $(,)?) => {
        pub struct WellKnown {
            $(pub $group: $group_ty,)+
        }

        $(
            #[allow(non_snake_case)]
            pub struct $group_ty {
                $(pub $entry: $ty,)+
            }

            impl $group_ty {
                fn lookup_with(lookup: impl Fn(&'static str) -> $ty) -> Self {
                    Self {
                        $($entry: lookup(stringify!($entry)),)+
                    }
                }
            }
        )+
    };
}

// NOTE: groups are namespaced (e.g. `wk.sc.Workgroup` vs `wk.scope.Workgroup`),
// as many enumerant names are shared between operand kinds.
def_well_known! {
    op: WellKnownOpcodes<Opcode> = [
        OpNop,
        OpUndef,
        OpSourceContinued,
        OpSource,
        OpSourceExtension,
        OpName,
        OpMemberName,
        OpString,
        OpLine,
        OpNoLine,
        OpModuleProcessed,

        OpExtension,
        OpExtInstImport,
        OpExtInst,
        OpMemoryModel,
        OpEntryPoint,
        OpExecutionMode,
        OpExecutionModeId,
        OpCapability,

        OpDecorate,
        OpMemberDecorate,
        OpDecorationGroup,
        OpGroupDecorate,
        OpGroupMemberDecorate,
        OpDecorateId,
        OpDecorateString,
        OpMemberDecorateString,

        OpTypeVoid,
        OpTypeBool,
        OpTypeInt,
        OpTypeFloat,
        OpTypeVector,
        OpTypeMatrix,
        OpTypeImage,
        OpTypeSampler,
        OpTypeSampledImage,
        OpTypeArray,
        OpTypeRuntimeArray,
        OpTypeStruct,
        OpTypeOpaque,
        OpTypePointer,
        OpTypeFunction,
        OpTypeEvent,
        OpTypeForwardPointer,
        OpTypeTensorARM,
        OpTypeRayQueryKHR,
        OpTypeAccelerationStructureKHR,

        OpConstantTrue,
        OpConstantFalse,
        OpConstant,
        OpConstantComposite,
        OpConstantNull,
        OpSpecConstantTrue,
        OpSpecConstantFalse,
        OpSpecConstant,
        OpSpecConstantComposite,
        OpSpecConstantOp,

        OpFunction,
        OpFunctionParameter,
        OpFunctionEnd,
        OpFunctionCall,

        OpVariable,
        OpLoad,
        OpStore,
        OpCopyMemory,
        OpCopyMemorySized,
        OpAccessChain,
        OpInBoundsAccessChain,
        OpPtrAccessChain,
        OpArrayLength,
        OpConvertUToPtr,
        OpCopyObject,
        OpSizeOf,

        OpPhi,
        OpLoopMerge,
        OpSelectionMerge,
        OpLabel,
        OpBranch,
        OpBranchConditional,
        OpSwitch,
        OpKill,
        OpReturn,
        OpReturnValue,
        OpUnreachable,
        OpTerminateInvocation,

        OpControlBarrier,
        OpMemoryBarrier,

        OpAtomicLoad,
        OpAtomicStore,
        OpAtomicExchange,
        OpAtomicCompareExchange,
        OpAtomicCompareExchangeWeak,
        OpAtomicIIncrement,
        OpAtomicIDecrement,
        OpAtomicIAdd,
        OpAtomicISub,
        OpAtomicSMin,
        OpAtomicUMin,
        OpAtomicSMax,
        OpAtomicUMax,
        OpAtomicAnd,
        OpAtomicOr,
        OpAtomicXor,
        OpAtomicFlagTestAndSet,
        OpAtomicFlagClear,
        OpAtomicFAddEXT,
        OpAtomicFMinEXT,
        OpAtomicFMaxEXT,

        OpTensorReadARM,
        OpTensorWriteARM,
        OpTensorQuerySizeARM,
    ],
    kind: WellKnownOperandKinds<OperandKind> = [
        Capability,
        AddressingModel,
        MemoryModel,
        ExecutionModel,
        ExecutionMode,
        StorageClass,
        FunctionControl,
        Decoration,
        BuiltIn,
        Scope,
        MemorySemantics,
        MemoryAccess,
        TensorOperands,

        IdRef,
        IdScope,
        IdMemorySemantics,

        LiteralInteger,
        LiteralString,
        LiteralContextDependentNumber,
        LiteralSpecConstantOpInteger,
    ],
    cap: WellKnownCapabilities<u32> = [
        Matrix,
        Shader,
        Addresses,
        Linkage,
        Kernel,
        Vector16,
        Float16Buffer,
        Float16,
        Float64,
        Int64,
        Int64Atomics,
        Int16,
        Int8,
        GenericPointer,
        StorageBuffer16BitAccess,
        UniformAndStorageBuffer16BitAccess,
        StoragePushConstant16,
        StorageInputOutput16,
        StorageBuffer8BitAccess,
        UniformAndStorageBuffer8BitAccess,
        StoragePushConstant8,
        VariablePointersStorageBuffer,
        VariablePointers,
        RuntimeDescriptorArray,
        VulkanMemoryModel,
        VulkanMemoryModelDeviceScope,
        PhysicalStorageBufferAddresses,
        CooperativeMatrixNV,
        TensorsARM,
        AtomicFloat16AddEXT,
        AtomicFloat32AddEXT,
        AtomicFloat64AddEXT,
        AtomicFloat16MinMaxEXT,
        AtomicFloat32MinMaxEXT,
        AtomicFloat64MinMaxEXT,
    ],
    am: WellKnownAddressingModels<u32> = [
        Logical,
        Physical32,
        Physical64,
        PhysicalStorageBuffer64,
    ],
    mm: WellKnownMemoryModels<u32> = [
        Simple,
        GLSL450,
        OpenCL,
        Vulkan,
    ],
    em: WellKnownExecutionModels<u32> = [
        Vertex,
        TessellationControl,
        TessellationEvaluation,
        Geometry,
        Fragment,
        GLCompute,
        Kernel,
    ],
    sc: WellKnownStorageClasses<u32> = [
        UniformConstant,
        Input,
        Uniform,
        Output,
        Workgroup,
        CrossWorkgroup,
        Private,
        Function,
        Generic,
        PushConstant,
        AtomicCounter,
        Image,
        StorageBuffer,
        PhysicalStorageBuffer,
    ],
    deco: WellKnownDecorations<u32> = [
        Block,
        BufferBlock,
        RowMajor,
        ColMajor,
        ArrayStride,
        MatrixStride,
        BuiltIn,
        Offset,
        Binding,
        DescriptorSet,
        LinkageAttributes,
        SpecId,
        AliasedPointer,
        RestrictPointer,
    ],
    scope: WellKnownScopes<u32> = [
        CrossDevice,
        Device,
        Workgroup,
        Subgroup,
        Invocation,
        QueueFamily,
        ShaderCallKHR,
    ],
    sem: WellKnownMemorySemantics<u32> = [
        Acquire,
        Release,
        AcquireRelease,
        SequentiallyConsistent,
        UniformMemory,
        SubgroupMemory,
        WorkgroupMemory,
        CrossWorkgroupMemory,
        AtomicCounterMemory,
        ImageMemory,
        OutputMemory,
        MakeAvailable,
        MakeVisible,
        Volatile,
    ],
    ma: WellKnownMemoryAccess<u32> = [
        Volatile,
        Aligned,
        Nontemporal,
        MakePointerAvailable,
        MakePointerVisible,
        NonPrivatePointer,
    ],
    linkage: WellKnownLinkageTypes<u32> = [
        Import,
    ],
    tensor_op: WellKnownTensorOperands<u32> = [
        NontemporalARM,
        OutOfBoundsValueARM,
        MakeElementAvailableARM,
        MakeElementVisibleARM,
        NonPrivateElementARM,
    ],
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Opcode(u16);

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Spec::get().instructions.get_named(*self) {
            Some((name, _)) => f.write_str(name),
            None => write!(f, "Opcode({})", self.0),
        }
    }
}

impl Opcode {
    /// Lookup the name & definition for `opcode` in the lazily-loaded [`Spec`],
    /// returning `None` if it's not a known opcode.
    pub fn try_from_u16_with_name_and_def(
        opcode: u16,
    ) -> Option<(Self, &'static str, &'static InstructionDef)> {
        let opcode = Self(opcode);
        let (name, def) = Spec::get().instructions.get_named(opcode)?;
        Some((opcode, name, def))
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn name_and_def(self) -> (&'static str, &'static InstructionDef) {
        Spec::get().instructions.get_named(self).unwrap()
    }

    /// Full grammar name (e.g. `OpAtomicLoad`).
    #[inline]
    pub fn name(self) -> &'static str {
        self.name_and_def().0
    }

    /// Grammar name without the `Op` prefix (e.g. `AtomicLoad`), the form
    /// used when prefixing diagnostics.
    pub fn short_name(self) -> &'static str {
        let name = self.name();
        name.strip_prefix("Op").unwrap_or(name)
    }

    #[inline]
    pub fn def(self) -> &'static InstructionDef {
        self.name_and_def().1
    }
}

/// What a module must declare (or which version it must target) before it is
/// allowed to use an instruction or an enumerant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Requirements {
    /// Any one of these capabilities enables the use (empty means "always").
    pub capabilities: SmallVec<[u32; 2]>,

    /// Any one of these extensions enables the use, regardless of version.
    pub extensions: SmallVec<[&'static str; 1]>,

    /// First SPIR-V version including this in the core, or `None` if it's only
    /// ever available through `extensions`.
    pub min_version: Option<Version>,

    /// Last SPIR-V version still including this (e.g. removed instructions).
    pub last_version: Option<Version>,
}

#[derive(PartialEq, Eq)]
pub struct InstructionDef {
    pub category: InstructionCategory,

    pub has_result_type_id: bool,
    pub has_result_id: bool,

    pub req_operands: ArrayVec<OperandDef, 8>,
    pub opt_operands: ArrayVec<OperandDef, 2>,
    pub rest_operands: Option<RestOperandsUnit>,

    pub reqs: Requirements,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InstructionCategory {
    Type,
    Const,
    ControlFlow,
    Other,
}

/// Operand kind, along with its (sanitized) name from the grammar, if any.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OperandDef {
    pub kind: OperandKind,
    pub name: &'static str,
}

/// Whether the trailing `*` "operand" (i.e. repeated arbitrarily many times),
/// consists of just one operand, or two per repeat (used by e.g. `OpPhi`).
#[derive(PartialEq, Eq)]
pub enum RestOperandsUnit {
    One(OperandKind),
    Two([OperandKind; 2]),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandMode {
    Required,
    Optional,
}

impl InstructionDef {
    /// Return a (potentially infinite) iterator of [`OperandKind`]s, along with
    /// the [`OperandMode`] indicating whether an operand is expected (`Required`),
    /// or that an operand's absence signals the end of operands (`Optional`),
    /// which is also the exit signal for the "rest operands" infinite iterators.
    pub fn all_operands(&self) -> impl Iterator<Item = (OperandMode, OperandKind)> + '_ {
        let fixed = self
            .req_operands
            .iter()
            .map(|o| (OperandMode::Required, o.kind))
            .chain(self.opt_operands.iter().map(|o| (OperandMode::Optional, o.kind)));

        // For pairs, only the first half is optional (i.e. only whole pairs can be absent).
        let rest = self.rest_operands.iter().flat_map(|rest_unit| {
            let (opt_a, req_b) = match *rest_unit {
                RestOperandsUnit::One(kind) => (kind, None),
                RestOperandsUnit::Two([a, b]) => (a, Some(b)),
            };
            iter::repeat(
                iter::once((OperandMode::Optional, opt_a))
                    .chain(req_b.map(|b| (OperandMode::Required, b))),
            )
            .flatten()
        });

        fixed.chain(rest)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperandKind(u8);

impl indexed::FlatIdx for OperandKind {
    fn to_usize(self) -> usize {
        self.0.into()
    }
}

impl fmt::Debug for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperandKind({} => {:?})", self.0, self.name())
    }
}

impl OperandKind {
    #[inline]
    pub fn name_and_def(self) -> (&'static str, &'static OperandKindDef) {
        Spec::get().operand_kinds.get_named(self).unwrap()
    }

    #[inline]
    pub fn name(self) -> &'static str {
        self.name_and_def().0
    }

    #[inline]
    pub fn def(self) -> &'static OperandKindDef {
        self.name_and_def().1
    }

    /// Lookup the definition of a single enumerant `value` of this operand kind
    /// (for `BitEnum`s, `value` must have exactly one bit set).
    pub fn enumerant(self, value: u32) -> Option<(&'static str, &'static Enumerant)> {
        match self.def() {
            OperandKindDef::BitEnum { bits, .. } => {
                bits.get_named(BitIdx::of_single_set_bit(value)?)
            }
            OperandKindDef::ValueEnum { variants } => {
                variants.get_named(u16::try_from(value).ok()?)
            }
            OperandKindDef::Id | OperandKindDef::Literal { .. } => None,
        }
    }

    /// Name of a single enumerant `value`, if known (see also [`OperandKind::enumerant`]).
    pub fn enumerant_name(self, value: u32) -> Option<&'static str> {
        match self.def() {
            OperandKindDef::BitEnum { empty_name, .. } if value == 0 => Some(empty_name),
            _ => Some(self.enumerant(value)?.0),
        }
    }

    /// Lookup an enumerant value by its name (or one of its aliases).
    pub fn enumerant_value(self, name: &str) -> Option<u32> {
        match self.def() {
            OperandKindDef::BitEnum { empty_name, empty_aliases, bits } => {
                if name == *empty_name || empty_aliases.iter().any(|&alias| alias == name) {
                    return Some(0);
                }
                bits.lookup(name).map(|BitIdx(i)| 1 << i)
            }
            OperandKindDef::ValueEnum { variants } => variants.lookup(name).map(u32::from),
            OperandKindDef::Id | OperandKindDef::Literal { .. } => None,
        }
    }
}

pub enum OperandKindDef {
    BitEnum {
        empty_name: &'static str,
        empty_aliases: SmallVec<[&'static str; 1]>,
        bits: indexed::NamedIdxMap<BitIdx, Enumerant, indexed::FlatWithHoles>,
    },

    ValueEnum {
        variants: indexed::NamedIdxMap<u16, Enumerant, indexed::Sparse>,
    },

    Id,
    Literal {
        size: LiteralSize,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BitIdx(pub u8);

impl BitIdx {
    /// Returns `Some(BitIdx(i))` if and only if `x == (1 << i)`.
    pub fn of_single_set_bit(x: u32) -> Option<Self> {
        x.is_power_of_two().then(|| Self(x.trailing_zeros() as u8))
    }

    /// Returns an iterator of [`BitIdx`]s, in increasing order, from which `x`
    /// can be reconstructed by OR-ing together `1 << i` for every `BitIdx(i)`.
    pub fn of_all_set_bits(x: u32) -> impl Iterator<Item = Self> {
        (0..32).filter(move |i| x & (1 << i) != 0).map(Self)
    }
}

impl indexed::FlatIdx for BitIdx {
    fn to_usize(self) -> usize {
        self.0.into()
    }
}

#[derive(PartialEq, Eq)]
pub struct Enumerant {
    pub req_params: ArrayVec<OperandDef, 3>,
    pub rest_params: Option<OperandKind>,

    pub reqs: Requirements,
}

impl Enumerant {
    /// Like [`InstructionDef::all_operands`], but for the extra operands that
    /// follow an enumerant (e.g. the alignment literal after `Aligned`).
    pub fn all_params(&self) -> impl Iterator<Item = (OperandMode, OperandKind)> + '_ {
        self.req_params
            .iter()
            .map(|p| (OperandMode::Required, p.kind))
            .chain(self.rest_params.into_iter().flat_map(|kind| {
                iter::repeat((OperandMode::Optional, kind))
            }))
    }
}

pub enum LiteralSize {
    /// The literal is always one word (but may occupy only part of it).
    Word,

    /// The literal is a word-encoded byte array, that ends with a `0` byte.
    NulTerminated,

    /// The literal uses as many words as required by its type, which is known
    /// contextually (`OpConstant`'s result type or `OpSwitch`'s selector type).
    FromContextualType,
}

/// Strip the grammar's `'...'` quoting from operand names, keeping only names
/// that look like identifiers (possibly with spaces).
fn sanitize_operand_name(name: &Option<raw::CowStr<'static>>) -> &'static str {
    match name {
        Some(raw::CowStr::Borrowed(s)) => s
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .filter(|s| {
                s.starts_with(|c: char| c.is_ascii_alphabetic())
                    && s.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ')
            })
            .unwrap_or(""),
        _ => "",
    }
}

fn parse_version(s: &str) -> Option<Version> {
    let (major, minor) = s.split_once('.')?;
    Some(Version { major: major.parse().ok()?, minor: minor.parse().ok()? })
}

impl Spec {
    /// Return a lazily-loaded [`Spec`] (only does significant work for the first call).
    #[inline(always)]
    #[must_use]
    pub fn get() -> &'static Spec {
        lazy_static! {
            static ref SPEC: Spec = {
                mod khr_spv_grammar_jsons {
                    include!(concat!(env!("OUT_DIR"), "/khr_spv_grammar_jsons.rs"));
                }

                let raw_core_grammar: raw::CoreGrammar<'static> =
                    serde_json::from_str(khr_spv_grammar_jsons::SPIRV_CORE_GRAMMAR).unwrap();

                Spec::from_raw(raw_core_grammar)
            };
        }
        &SPEC
    }

    /// Implementation detail of [`Spec::get`], indexes the raw data to produce a [`Spec`].
    fn from_raw(raw_core_grammar: raw::CoreGrammar<'static>) -> Self {
        // Requirements refer to capabilities by name, so those must be known
        // before any other enumerant (or instruction) can be indexed.
        let capability_by_name: FxHashMap<&'static str, u32> = raw_core_grammar
            .operand_kinds
            .iter()
            .filter(|o| o.kind == "Capability")
            .flat_map(|o| o.enumerants.iter().flatten())
            .flat_map(|e| iter::once(e.enumerant).chain(e.aliases.iter().copied()).map(|n| (n, e.value)))
            .collect();

        let reqs_from_raw = |capabilities: &[&'static str],
                             extensions: &[&'static str],
                             version: Option<&str>,
                             last_version: Option<&str>| {
            Requirements {
                capabilities: capabilities
                    .iter()
                    .map(|name| {
                        *capability_by_name
                            .get(name)
                            .unwrap_or_else(|| panic!("unknown capability `{name}` in grammar"))
                    })
                    .collect(),
                extensions: extensions.iter().copied().collect(),
                min_version: match version {
                    None => Some(Version { major: 1, minor: 0 }),
                    Some("None") => None,
                    Some(v) => Some(parse_version(v).unwrap()),
                },
                last_version: last_version.map(|v| parse_version(v).unwrap()),
            }
        };

        let operand_kind_by_name: FxHashMap<_, _> = raw_core_grammar
            .operand_kinds
            .iter()
            .filter(|o| !matches!(o.category, raw::OperandKindCategory::Composite))
            .enumerate()
            .map(|(i, o)| (o.kind, OperandKind(i.try_into().unwrap())))
            .collect();

        let operand_defs = raw_core_grammar
            .operand_kinds
            .iter()
            .filter(|o| !matches!(o.category, raw::OperandKindCategory::Composite))
            .map(|o| {
                let enumerant_from_raw = |e: &raw::OperandKindEnumerant<'static>| {
                    let mut req_params = ArrayVec::new();
                    let mut rest_params = None;
                    for p in &e.parameters {
                        let kind = operand_kind_by_name[p.kind];
                        match p.quantifier {
                            None => req_params
                                .try_push(OperandDef { kind, name: sanitize_operand_name(&p.name) })
                                .unwrap_or_else(|err| panic!("{}/{}: {err}", o.kind, e.enumerant)),
                            Some(raw::Quantifier::Rest) => rest_params = Some(kind),
                            Some(raw::Quantifier::Optional) => {
                                unreachable!("{}/{}: optional parameter", o.kind, e.enumerant)
                            }
                        }
                    }
                    Enumerant {
                        req_params,
                        rest_params,
                        reqs: reqs_from_raw(
                            &e.capabilities,
                            &e.extensions,
                            e.version,
                            e.last_version,
                        ),
                    }
                };

                let all_names = |e: &raw::OperandKindEnumerant<'static>| {
                    iter::once(e.enumerant).chain(e.aliases.clone())
                };

                let def = match o.category {
                    raw::OperandKindCategory::BitEnum => {
                        let enumerants = o.enumerants.as_deref().unwrap_or_default();
                        let mut empty_name = "None";
                        let mut empty_aliases = SmallVec::new();
                        let mut idx_by_name = FxHashMap::default();
                        let mut storage = vec![];
                        for e in enumerants {
                            if e.value == 0 {
                                assert!(e.parameters.is_empty());
                                empty_name = e.enumerant;
                                empty_aliases = e.aliases.clone();
                                continue;
                            }
                            let bit_idx = BitIdx::of_single_set_bit(e.value).unwrap_or_else(|| {
                                panic!("{}/{}: not a single bit", o.kind, e.enumerant)
                            });
                            let i = bit_idx.to_usize();
                            if i >= storage.len() {
                                storage.resize_with(i + 1, || None);
                            }
                            assert!(storage[i].is_none(), "{}: duplicate bit {i}", o.kind);
                            storage[i] = Some((e.enumerant, enumerant_from_raw(e)));
                            idx_by_name.extend(all_names(e).map(|name| (name, bit_idx)));
                        }
                        OperandKindDef::BitEnum {
                            empty_name,
                            empty_aliases,
                            bits: indexed::NamedIdxMap { idx_by_name, storage },
                        }
                    }
                    raw::OperandKindCategory::ValueEnum => {
                        let enumerants = o.enumerants.as_deref().unwrap_or_default();
                        let mut idx_by_name = FxHashMap::default();
                        let mut storage = FxHashMap::default();
                        for e in enumerants {
                            let value = u16::try_from(e.value).unwrap();
                            let prev = storage.insert(value, (e.enumerant, enumerant_from_raw(e)));
                            assert!(prev.is_none(), "{}: duplicate value {value}", o.kind);
                            idx_by_name.extend(all_names(e).map(|name| (name, value)));
                        }
                        OperandKindDef::ValueEnum {
                            variants: indexed::NamedIdxMap { idx_by_name, storage },
                        }
                    }
                    raw::OperandKindCategory::Id => {
                        assert!(o.enumerants.is_none() && o.bases.is_none());
                        OperandKindDef::Id
                    }
                    raw::OperandKindCategory::Literal => {
                        assert!(o.enumerants.is_none() && o.bases.is_none());
                        let size = match o.kind {
                            "LiteralInteger"
                            | "LiteralExtInstInteger"
                            | "LiteralSpecConstantOpInteger"
                            | "LiteralFloat" => LiteralSize::Word,
                            "LiteralString" => LiteralSize::NulTerminated,
                            "LiteralContextDependentNumber" => LiteralSize::FromContextualType,
                            _ => unreachable!("unknown literal kind `{}`", o.kind),
                        };
                        OperandKindDef::Literal { size }
                    }
                    raw::OperandKindCategory::Composite => unreachable!(),
                };
                (o.kind, def)
            })
            .collect();
        let operand_kinds =
            indexed::NamedIdxMap { idx_by_name: operand_kind_by_name, storage: operand_defs };

        let operand_kind_pairs_by_name: FxHashMap<_, _> = raw_core_grammar
            .operand_kinds
            .iter()
            .filter(|o| matches!(o.category, raw::OperandKindCategory::Composite))
            .map(|o| {
                let bases: [_; 2] = o.bases.as_deref().unwrap()[..].try_into().unwrap();
                let mut pair = bases.map(|base| operand_kinds.lookup(base).unwrap());

                // `OpSwitch` case literals are sized by the selector's type.
                if o.kind == "PairLiteralIntegerIdRef" {
                    pair[0] = operand_kinds.lookup("LiteralContextDependentNumber").unwrap();
                }

                (o.kind, pair)
            })
            .collect();

        let id_result_type = operand_kinds.lookup("IdResultType").unwrap();
        let id_result = operand_kinds.lookup("IdResult").unwrap();

        let mut instructions: indexed::NamedIdxMap<Opcode, InstructionDef, indexed::Sparse> =
            indexed::NamedIdxMap { idx_by_name: FxHashMap::default(), storage: FxHashMap::default() };
        for inst in &raw_core_grammar.instructions {
            let category = match inst.class {
                "Type-Declaration" => InstructionCategory::Type,
                "Constant-Creation" => InstructionCategory::Const,
                "Control-Flow" => InstructionCategory::ControlFlow,
                _ => InstructionCategory::Other,
            };

            let mut def = InstructionDef {
                category,
                has_result_type_id: false,
                has_result_id: false,
                req_operands: ArrayVec::new(),
                opt_operands: ArrayVec::new(),
                rest_operands: None,
                reqs: reqs_from_raw(
                    &inst.capabilities,
                    &inst.extensions,
                    inst.version,
                    inst.last_version,
                ),
            };

            for o in &inst.operands {
                let single = operand_kinds.lookup(o.kind);
                let operand_def =
                    || OperandDef { kind: single.unwrap(), name: sanitize_operand_name(&o.name) };
                match o.quantifier {
                    _ if single == Some(id_result_type) => def.has_result_type_id = true,
                    _ if single == Some(id_result) => def.has_result_id = true,
                    None => {
                        assert!(def.opt_operands.is_empty() && def.rest_operands.is_none());
                        def.req_operands
                            .try_push(operand_def())
                            .unwrap_or_else(|err| panic!("{}: {err}", inst.opname));
                    }
                    Some(raw::Quantifier::Optional) => {
                        assert!(def.rest_operands.is_none());
                        def.opt_operands
                            .try_push(operand_def())
                            .unwrap_or_else(|err| panic!("{}: {err}", inst.opname));
                    }
                    Some(raw::Quantifier::Rest) => {
                        def.rest_operands = Some(match single {
                            Some(kind) => RestOperandsUnit::One(kind),
                            None => RestOperandsUnit::Two(operand_kind_pairs_by_name[o.kind]),
                        });
                    }
                }
            }

            // `IdResultType` without `IdResult` is impossible.
            if def.has_result_type_id {
                assert!(def.has_result_id, "{}", inst.opname);
            }

            let opcode = Opcode(inst.opcode);
            let prev = instructions.storage.insert(opcode, (inst.opname, def));
            assert!(prev.is_none(), "{}: duplicate opcode {}", inst.opname, inst.opcode);
            instructions
                .idx_by_name
                .extend(iter::once(inst.opname).chain(inst.aliases.iter().copied()).map(|n| (n, opcode)));
        }

        let enumerant_in = |kind_name: &'static str| {
            let kind = operand_kinds.lookup(kind_name).unwrap();
            let operand_kinds = &operand_kinds;
            move |name: &'static str| match &operand_kinds[kind] {
                OperandKindDef::BitEnum { bits, .. } => {
                    1 << bits.lookup(name).unwrap_or_else(|| panic!("{kind_name}.{name}")).0
                }
                OperandKindDef::ValueEnum { variants } => {
                    variants.lookup(name).unwrap_or_else(|| panic!("{kind_name}.{name}")).into()
                }
                _ => unreachable!(),
            }
        };

        let well_known = WellKnown {
            op: WellKnownOpcodes::lookup_with(|name| instructions.lookup(name).unwrap()),
            kind: WellKnownOperandKinds::lookup_with(|name| operand_kinds.lookup(name).unwrap()),
            cap: WellKnownCapabilities::lookup_with(enumerant_in("Capability")),
            am: WellKnownAddressingModels::lookup_with(enumerant_in("AddressingModel")),
            mm: WellKnownMemoryModels::lookup_with(enumerant_in("MemoryModel")),
            em: WellKnownExecutionModels::lookup_with(enumerant_in("ExecutionModel")),
            sc: WellKnownStorageClasses::lookup_with(enumerant_in("StorageClass")),
            deco: WellKnownDecorations::lookup_with(enumerant_in("Decoration")),
            scope: WellKnownScopes::lookup_with(enumerant_in("Scope")),
            sem: WellKnownMemorySemantics::lookup_with(enumerant_in("MemorySemantics")),
            ma: WellKnownMemoryAccess::lookup_with(enumerant_in("MemoryAccess")),
            linkage: WellKnownLinkageTypes::lookup_with(enumerant_in("LinkageType")),
            tensor_op: WellKnownTensorOperands::lookup_with(enumerant_in("TensorOperands")),
        };

        Self { magic: raw_core_grammar.magic_number, well_known, instructions, operand_kinds }
    }

    /// Name of a `Capability` value, falling back to the number if unknown.
    pub fn capability_name(&self, cap: u32) -> std::borrow::Cow<'static, str> {
        match self.well_known.kind.Capability.enumerant_name(cap) {
            Some(name) => name.into(),
            None => cap.to_string().into(),
        }
    }
}

/// Deserialization for the `.grammar.json` files, without any post-processing.
pub mod raw {
    use serde::Deserialize;
    use smallvec::SmallVec;

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct CoreGrammar<'a> {
        #[serde(borrow)]
        pub copyright: Vec<CowStr<'a>>,

        #[serde(deserialize_with = "dew_u32_maybe_hex")]
        pub magic_number: u32,

        pub major_version: u8,
        pub minor_version: u8,
        pub revision: u8,

        pub instructions: Vec<Instruction<'a>>,
        pub operand_kinds: Vec<OperandKind<'a>>,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct Instruction<'a> {
        pub opname: &'a str,
        #[serde(default)]
        pub aliases: SmallVec<[&'a str; 1]>,
        #[serde(default)]
        pub class: &'a str,
        pub opcode: u16,
        #[serde(default)]
        pub operands: Vec<Operand<'a>>,

        #[serde(default)]
        pub extensions: SmallVec<[&'a str; 1]>,
        #[serde(default)]
        pub capabilities: SmallVec<[&'a str; 1]>,

        pub version: Option<&'a str>,
        #[serde(rename = "lastVersion")]
        pub last_version: Option<&'a str>,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct Operand<'a> {
        pub kind: &'a str,
        pub quantifier: Option<Quantifier>,
        #[serde(borrow)]
        pub name: Option<CowStr<'a>>,
    }

    #[derive(Deserialize)]
    pub enum Quantifier {
        #[serde(rename = "?")]
        Optional,

        #[serde(rename = "*")]
        Rest,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct OperandKind<'a> {
        pub category: OperandKindCategory,
        pub kind: &'a str,
        pub doc: Option<&'a str>,

        pub enumerants: Option<Vec<OperandKindEnumerant<'a>>>,

        pub bases: Option<Vec<&'a str>>,
    }

    #[derive(Deserialize)]
    pub enum OperandKindCategory {
        BitEnum,
        ValueEnum,

        Id,
        Literal,
        Composite,
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct OperandKindEnumerant<'a> {
        pub enumerant: &'a str,
        #[serde(default)]
        pub aliases: SmallVec<[&'a str; 1]>,

        #[serde(deserialize_with = "dew_u32_maybe_hex")]
        pub value: u32,

        #[serde(default)]
        pub parameters: Vec<Operand<'a>>,

        #[serde(default)]
        pub extensions: SmallVec<[&'a str; 1]>,
        #[serde(default)]
        pub capabilities: SmallVec<[&'a str; 1]>,

        pub version: Option<&'a str>,
        #[serde(rename = "lastVersion")]
        pub last_version: Option<&'a str>,
    }

    // HACK `Cow<'a, str>` that works w/ zero-copy deserialization, even
    // when nested (`serde` only special-cases `Cow` used directly as a field type).
    #[derive(Deserialize, Debug)]
    #[serde(untagged)]
    pub enum CowStr<'a> {
        Borrowed(&'a str),
        Owned(String),
    }

    fn dew_u32_maybe_hex<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let x: DecOrHex<'_> = Deserialize::deserialize(deserializer)?;
        x.to_u32().map_err(serde::de::Error::custom)
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub enum DecOrHex<'a> {
        Dec(u32),
        MaybeHex(&'a str),
    }

    impl DecOrHex<'_> {
        fn to_u32(&self) -> Result<u32, String> {
            match *self {
                DecOrHex::Dec(x) => Ok(x),
                // HACK some decimal numbers are kept as strings.
                DecOrHex::MaybeHex(s) => s.parse().or_else(|_| {
                    let hex = s
                        .strip_prefix("0x")
                        .ok_or_else(|| format!("DecOrHex string form doesn't start with 0x: {s:?}"))?;
                    u32::from_str_radix(hex, 16).map_err(|e| format!("DecOrHex {s:?}: {e}"))
                }),
            }
        }
    }
}

/// Utilities for indexing data in a variety of ways (names, compact indices, etc.).
pub mod indexed {
    use rustc_hash::FxHashMap;
    use std::hash::Hash;

    pub trait StorageShape<I, T> {
        type Storage;
        fn get_by_idx(storage: &Self::Storage, idx: I) -> Option<&T>;
    }

    pub trait FlatIdx: Copy {
        fn to_usize(self) -> usize;
    }

    /// Flat array ([`Vec`]) storage, likely used with compact indices.
    pub enum Flat {}

    impl<I: FlatIdx, T> StorageShape<I, T> for Flat {
        type Storage = Vec<T>;
        fn get_by_idx(storage: &Self::Storage, idx: I) -> Option<&T> {
            storage.get(idx.to_usize())
        }
    }

    /// Like [`Flat`], but the [`Vec`] elements are wrapped in [`Option`].
    pub enum FlatWithHoles {}

    impl<I: FlatIdx, T> StorageShape<I, T> for FlatWithHoles {
        type Storage = Vec<Option<T>>;
        fn get_by_idx(storage: &Self::Storage, idx: I) -> Option<&T> {
            storage.get(idx.to_usize())?.as_ref()
        }
    }

    /// Hashed storage, for index spaces with large gaps (opcodes and `ValueEnum`s
    /// are allocated in vendor/extension-specific blocks far above the core range).
    pub enum Sparse {}

    impl<I: Copy + Eq + Hash, T> StorageShape<I, T> for Sparse {
        type Storage = FxHashMap<I, T>;
        fn get_by_idx(storage: &Self::Storage, idx: I) -> Option<&T> {
            storage.get(&idx)
        }
    }

    pub struct NamedIdxMap<I, T, S: StorageShape<I, (&'static str, T)>> {
        pub(super) idx_by_name: FxHashMap<&'static str, I>,
        pub(super) storage: S::Storage,
    }

    impl<I, T, S: StorageShape<I, (&'static str, T)>> NamedIdxMap<I, T, S> {
        /// Get an index from a name (or alias).
        pub fn lookup(&self, name: &str) -> Option<I>
        where
            I: Copy,
        {
            self.idx_by_name.get(name).copied()
        }

        pub fn get_named(&self, idx: I) -> Option<(&'static str, &T)> {
            let (name, value) = S::get_by_idx(&self.storage, idx)?;
            Some((name, value))
        }

        pub fn get(&self, idx: I) -> Option<&T> {
            let (_name, value) = self.get_named(idx)?;
            Some(value)
        }
    }

    impl<I, T, S: StorageShape<I, (&'static str, T)>> std::ops::Index<I> for NamedIdxMap<I, T, S> {
        type Output = T;
        fn index(&self, idx: I) -> &T {
            self.get(idx).unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // HACK make sure parsing JSON doesn't start failing randomly.
    #[test]
    fn get_spec() {
        let spec = Spec::get();
        assert_eq!(spec.magic, 0x0723_0203);

        let wk = &spec.well_known;
        assert_eq!(wk.op.OpCopyMemory.as_u16(), 63);
        assert_eq!(wk.op.OpCopyMemory.short_name(), "CopyMemory");
        assert_eq!(wk.sc.StorageBuffer, 12);
        assert_eq!(wk.sem.SequentiallyConsistent, 0x10);
        assert_eq!(wk.ma.Aligned, 0x2);
    }

    #[test]
    fn aliases_resolve_to_the_same_enumerant() {
        let wk = &Spec::get().well_known;
        assert_eq!(
            wk.kind.Capability.enumerant_value("VulkanMemoryModelKHR"),
            Some(wk.cap.VulkanMemoryModel)
        );
        assert_eq!(wk.kind.MemorySemantics.enumerant_value("Relaxed"), Some(0));
        assert_eq!(wk.kind.MemoryModel.enumerant_name(wk.mm.Vulkan), Some("Vulkan"));
    }

    #[test]
    fn requirements_are_indexed() {
        let wk = &Spec::get().well_known;

        let weak = wk.op.OpAtomicCompareExchangeWeak.def();
        assert_eq!(weak.reqs.last_version, Some(Version { major: 1, minor: 3 }));
        assert_eq!(&weak.reqs.capabilities[..], [wk.cap.Kernel]);

        let (_, tensors) = wk.kind.Capability.enumerant(wk.cap.TensorsARM).unwrap();
        assert_eq!(tensors.reqs.min_version, None);
        assert_eq!(&tensors.reqs.extensions[..], ["SPV_ARM_tensors"]);

        let (_, aligned) = wk.kind.MemoryAccess.enumerant(wk.ma.Aligned).unwrap();
        assert_eq!(aligned.req_params.len(), 1);
        assert_eq!(aligned.req_params[0].kind, wk.kind.LiteralInteger);
    }

    #[test]
    fn bit_indices() {
        assert_eq!(BitIdx::of_single_set_bit(0x10), Some(BitIdx(4)));
        assert_eq!(BitIdx::of_single_set_bit(0x18), None);
        let bits: Vec<_> = BitIdx::of_all_set_bits(0x8005).collect();
        assert_eq!(bits, [BitIdx(0), BitIdx(2), BitIdx(15)]);
    }
}

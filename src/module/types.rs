//! Type and constant definitions, and the queries rules make about them.

use super::{IdKind, Module};
use crate::spv::{self, spec, Id};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeDef {
    Void,
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { component: Id, count: u32 },
    Matrix { column: Id, count: u32 },
    Image { sampled_type: Id },
    Sampler,
    SampledImage { image: Id },
    Array { element: Id, length: Id },
    RuntimeArray { element: Id },
    Struct { members: SmallVec<[Id; 4]> },
    Opaque,
    Pointer { storage_class: u32, pointee: Id },
    Function { ret: Id, params: SmallVec<[Id; 4]> },
    Event,
    Tensor { element: Id, rank: Option<Id>, shape: Option<Id> },
    RayQuery,
    AccelerationStructure,
}

impl TypeDef {
    /// Interpret a type-declaring instruction (`None` for unknown type opcodes,
    /// or a missing operand, which the reader rules out for known opcodes).
    pub fn from_inst(inst: &spv::Inst) -> Option<Self> {
        let wk = &spec::Spec::get().well_known;
        let op = inst.opcode;
        let id = |i| inst.id_operand(i);
        let imm = |i| inst.imm_operand(i);

        Some(if op == wk.op.OpTypeVoid {
            Self::Void
        } else if op == wk.op.OpTypeBool {
            Self::Bool
        } else if op == wk.op.OpTypeInt {
            Self::Int { width: imm(0)?, signed: imm(1)? != 0 }
        } else if op == wk.op.OpTypeFloat {
            Self::Float { width: imm(0)? }
        } else if op == wk.op.OpTypeVector {
            Self::Vector { component: id(0)?, count: imm(1)? }
        } else if op == wk.op.OpTypeMatrix {
            Self::Matrix { column: id(0)?, count: imm(1)? }
        } else if op == wk.op.OpTypeImage {
            Self::Image { sampled_type: id(0)? }
        } else if op == wk.op.OpTypeSampler {
            Self::Sampler
        } else if op == wk.op.OpTypeSampledImage {
            Self::SampledImage { image: id(0)? }
        } else if op == wk.op.OpTypeArray {
            Self::Array { element: id(0)?, length: id(1)? }
        } else if op == wk.op.OpTypeRuntimeArray {
            Self::RuntimeArray { element: id(0)? }
        } else if op == wk.op.OpTypeStruct {
            Self::Struct { members: inst.id_operands().map(|(_, id)| id).collect() }
        } else if op == wk.op.OpTypeOpaque {
            Self::Opaque
        } else if op == wk.op.OpTypePointer {
            Self::Pointer { storage_class: imm(0)?, pointee: id(1)? }
        } else if op == wk.op.OpTypeFunction {
            let mut ids = inst.id_operands().map(|(_, id)| id);
            Self::Function { ret: ids.next()?, params: ids.collect() }
        } else if op == wk.op.OpTypeEvent {
            Self::Event
        } else if op == wk.op.OpTypeTensorARM {
            Self::Tensor { element: id(0)?, rank: id(1), shape: id(2) }
        } else if op == wk.op.OpTypeRayQueryKHR {
            Self::RayQuery
        } else if op == wk.op.OpTypeAccelerationStructureKHR {
            Self::AccelerationStructure
        } else {
            return None;
        })
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Bool | Self::Int { .. } | Self::Float { .. })
    }

    pub fn is_opaque_resource(&self) -> bool {
        matches!(
            self,
            Self::Image { .. }
                | Self::Sampler
                | Self::SampledImage { .. }
                | Self::AccelerationStructure
                | Self::RayQuery
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstValue {
    Bool(bool),

    /// Scalar literal words (low-order word first).
    Scalar(SmallVec<[u32; 2]>),

    Composite(SmallVec<[Id; 4]>),

    Null,

    /// `OpSpecConstantOp` with the given opcode.
    SpecOp(u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstDef {
    /// Specialization constants can be overridden, so their value is only a default.
    pub spec: bool,
    pub value: ConstValue,
}

impl ConstDef {
    pub fn from_inst(inst: &spv::Inst) -> Option<Self> {
        let wk = &spec::Spec::get().well_known;
        let op = inst.opcode;

        let spec = [
            wk.op.OpSpecConstantTrue,
            wk.op.OpSpecConstantFalse,
            wk.op.OpSpecConstant,
            wk.op.OpSpecConstantComposite,
            wk.op.OpSpecConstantOp,
        ]
        .contains(&op);

        let value = if [wk.op.OpConstantTrue, wk.op.OpSpecConstantTrue].contains(&op) {
            ConstValue::Bool(true)
        } else if [wk.op.OpConstantFalse, wk.op.OpSpecConstantFalse].contains(&op) {
            ConstValue::Bool(false)
        } else if [wk.op.OpConstant, wk.op.OpSpecConstant].contains(&op) {
            ConstValue::Scalar(inst.logical_operand(0)?.iter().map(|o| o.word()).collect())
        } else if [wk.op.OpConstantComposite, wk.op.OpSpecConstantComposite].contains(&op) {
            ConstValue::Composite(inst.id_operands().map(|(_, id)| id).collect())
        } else if op == wk.op.OpConstantNull {
            ConstValue::Null
        } else if op == wk.op.OpSpecConstantOp {
            ConstValue::SpecOp(inst.imm_operand(0)?)
        } else {
            return None;
        };
        Some(Self { spec, value })
    }
}

impl Module {
    pub fn type_def(&self, id: Id) -> Option<&TypeDef> {
        match &self.ids.get(&id)?.kind {
            IdKind::Type(def) => Some(def),
            _ => None,
        }
    }

    pub fn const_def(&self, id: Id) -> Option<&ConstDef> {
        match &self.ids.get(&id)?.kind {
            IdKind::Constant(def) => Some(def),
            _ => None,
        }
    }

    /// Result type of the value (or constant, variable, etc.) `id`.
    pub fn type_of(&self, id: Id) -> Option<Id> {
        self.ids.get(&id)?.type_id
    }

    pub fn is_type(&self, id: Id) -> bool {
        self.type_def(id).is_some()
    }

    /// Scalar type itself, or the component type of a vector.
    pub fn scalar_or_component_type(&self, ty: Id) -> Option<Id> {
        match self.type_def(ty)? {
            TypeDef::Vector { component, .. } => Some(*component),
            def if def.is_scalar() => Some(ty),
            _ => None,
        }
    }

    /// Bit-width of an integer/float scalar, or of a vector's components.
    pub fn bit_width(&self, ty: Id) -> Option<u32> {
        match self.type_def(self.scalar_or_component_type(ty)?)? {
            TypeDef::Int { width, .. } | TypeDef::Float { width } => Some(*width),
            TypeDef::Bool => Some(1),
            _ => None,
        }
    }

    pub fn is_int_scalar_type(&self, ty: Id) -> bool {
        matches!(self.type_def(ty), Some(TypeDef::Int { .. }))
    }

    pub fn is_float_scalar_type(&self, ty: Id) -> bool {
        matches!(self.type_def(ty), Some(TypeDef::Float { .. }))
    }

    /// Storage class and pointee type of a pointer type.
    pub fn pointer_type(&self, ty: Id) -> Option<(u32, Id)> {
        match *self.type_def(ty)? {
            TypeDef::Pointer { storage_class, pointee } => Some((storage_class, pointee)),
            _ => None,
        }
    }

    /// Value of a (non-specialization) integer constant, zero-extended.
    ///
    /// `OpConstantNull` of an integer type evaluates to `0`.
    pub fn const_int(&self, id: Id) -> Option<u64> {
        let def = self.const_def(id)?;
        if def.spec || !self.is_int_scalar_type(self.type_of(id)?) {
            return None;
        }
        match &def.value {
            ConstValue::Scalar(words) => {
                let lo = u64::from(*words.first()?);
                let hi = u64::from(words.get(1).copied().unwrap_or(0));
                Some(lo | (hi << 32))
            }
            ConstValue::Null => Some(0),
            _ => None,
        }
    }

    /// Like [`Module::const_int`], but sign-extending signed integer types.
    pub fn const_int_signed(&self, id: Id) -> Option<i64> {
        let value = self.const_int(id)?;
        let ty = self.type_of(id)?;
        match *self.type_def(ty)? {
            TypeDef::Int { width, signed: true } if width < 64 => {
                let shift = 64 - width;
                Some(((value << shift) as i64) >> shift)
            }
            _ => Some(value as i64),
        }
    }

    pub fn const_u32(&self, id: Id) -> Option<u32> {
        u32::try_from(self.const_int(id)?).ok()
    }

    /// Whether `id` is defined by any constant-creating instruction
    /// (including specialization constants).
    pub fn is_constant(&self, id: Id) -> bool {
        self.const_def(id).is_some()
    }

    pub fn is_spec_constant(&self, id: Id) -> bool {
        self.const_def(id).is_some_and(|def| def.spec)
    }

    /// Whether `ty` is, or (transitively, not through pointers) contains, a
    /// type for which `pred` holds.
    pub fn contains_type(&self, ty: Id, pred: &mut dyn FnMut(Id, &TypeDef) -> bool) -> bool {
        let mut visited = FxHashSet::default();
        self.contains_type_inner(ty, pred, &mut visited)
    }

    fn contains_type_inner(
        &self,
        ty: Id,
        pred: &mut dyn FnMut(Id, &TypeDef) -> bool,
        visited: &mut FxHashSet<Id>,
    ) -> bool {
        if !visited.insert(ty) {
            return false;
        }
        let Some(def) = self.type_def(ty) else {
            return false;
        };
        if pred(ty, def) {
            return true;
        }
        match def {
            TypeDef::Vector { component: inner, .. }
            | TypeDef::Matrix { column: inner, .. }
            | TypeDef::Array { element: inner, .. }
            | TypeDef::RuntimeArray { element: inner } => {
                self.contains_type_inner(*inner, pred, visited)
            }
            TypeDef::Struct { members } => {
                members.iter().any(|&m| self.contains_type_inner(m, pred, visited))
            }
            _ => false,
        }
    }

    /// Whether `ty` contains 8-bit (`width == 8`) or 16-bit integer/float scalars.
    pub fn contains_width(&self, ty: Id, width: u32) -> bool {
        self.contains_type(ty, &mut |_, def| {
            matches!(*def, TypeDef::Int { width: w, .. } | TypeDef::Float { width: w } if w == width)
        })
    }

    /// Strip (runtime) arrays, returning the innermost element type.
    pub fn strip_arrays(&self, mut ty: Id) -> Id {
        let mut steps = 0;
        while let Some(TypeDef::Array { element, .. } | TypeDef::RuntimeArray { element }) =
            self.type_def(ty)
        {
            ty = *element;
            steps += 1;
            if steps > self.ids.len() {
                break;
            }
        }
        ty
    }

    /// Nesting depth of structs within `ty` (`1` for a struct of scalars).
    pub fn struct_depth(&self, ty: Id) -> u32 {
        fn depth(m: &Module, ty: Id, max_depth: u32) -> u32 {
            if max_depth == 0 {
                return 0;
            }
            match m.type_def(ty) {
                Some(TypeDef::Struct { members }) => {
                    1 + members.iter().map(|&t| depth(m, t, max_depth - 1)).max().unwrap_or(0)
                }
                Some(
                    TypeDef::Array { element, .. }
                    | TypeDef::RuntimeArray { element }
                    | TypeDef::Matrix { column: element, .. },
                ) => depth(m, *element, max_depth - 1),
                _ => 0,
            }
        }
        depth(self, ty, 1024)
    }

    /// Derived ("friendly") name for a type or constant, used when there is no `OpName`.
    pub(super) fn derived_name(&self, id: Id, kind: &IdKind, type_id: Option<Id>) -> Option<String> {
        let name_of = |id: Id| self.names.get(&id).cloned().unwrap_or_else(|| id.to_string());
        let wk = &spec::Spec::get().well_known;

        Some(match kind {
            IdKind::Type(def) => match def {
                TypeDef::Void => "void".into(),
                TypeDef::Bool => "bool".into(),
                &TypeDef::Int { width, signed } => {
                    let base = match width {
                        8 => "char".to_string(),
                        16 => "short".to_string(),
                        32 => "int".to_string(),
                        64 => "long".to_string(),
                        _ => format!("int{width}"),
                    };
                    if signed {
                        base
                    } else {
                        format!("u{base}")
                    }
                }
                &TypeDef::Float { width } => match width {
                    16 => "half".into(),
                    32 => "float".into(),
                    64 => "double".into(),
                    _ => format!("fp{width}"),
                },
                &TypeDef::Vector { component, count } => format!("v{count}{}", name_of(component)),
                &TypeDef::Matrix { column, count } => format!("mat{count}{}", name_of(column)),
                &TypeDef::Array { element, length } => {
                    format!("_arr_{}_{}", name_of(element), name_of(length))
                }
                &TypeDef::RuntimeArray { element } => format!("_runtimearr_{}", name_of(element)),
                &TypeDef::Pointer { storage_class, pointee } => {
                    let sc = wk.kind.StorageClass.enumerant_name(storage_class).unwrap_or("sc");
                    format!("_ptr_{sc}_{}", name_of(pointee))
                }
                TypeDef::Struct { .. } => format!("_struct_{id}"),
                TypeDef::Function { .. } => format!("_fn_{id}"),
                TypeDef::Image { .. } => "type_image".into(),
                TypeDef::Sampler => "type_sampler".into(),
                TypeDef::SampledImage { .. } => "type_sampled_image".into(),
                TypeDef::Opaque => format!("_opaque_{id}"),
                TypeDef::Event => "Event".into(),
                &TypeDef::Tensor { element, .. } => format!("_tensor_{}", name_of(element)),
                TypeDef::RayQuery => "rayQueryKHR".into(),
                TypeDef::AccelerationStructure => "accelerationStructureKHR".into(),
            },
            IdKind::Constant(ConstDef { value: ConstValue::Bool(b), .. }) => b.to_string(),
            IdKind::Constant(ConstDef { value: ConstValue::Scalar(words), .. }) => {
                let ty = type_id?;
                let literal = match *self.type_def(ty)? {
                    TypeDef::Int { width, signed } => {
                        let lo = u64::from(*words.first()?);
                        let value = lo | (u64::from(words.get(1).copied().unwrap_or(0)) << 32);
                        if signed && width <= 64 && width > 0 {
                            let shift = 64 - width;
                            let value = ((value << shift) as i64) >> shift;
                            if value < 0 {
                                format!("n{}", value.unsigned_abs())
                            } else {
                                value.to_string()
                            }
                        } else {
                            value.to_string()
                        }
                    }
                    TypeDef::Float { width: 32 } => {
                        format_float(f64::from(f32::from_bits(*words.first()?)))
                    }
                    TypeDef::Float { width: 64 } => {
                        let bits = u64::from(*words.first()?) | (u64::from(*words.get(1)?) << 32);
                        format_float(f64::from_bits(bits))
                    }
                    _ => return None,
                };
                format!("{}_{literal}", name_of(ty))
            }
            _ => return None,
        })
    }
}

fn format_float(x: f64) -> String {
    x.to_string().replace('-', "n").replace('.', "p")
}

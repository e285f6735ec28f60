//! Module tables, built in a single forward pass over the decoded instructions.
//!
//! Everything rules need to look up (ID definitions, types, constants,
//! decorations, entry points, functions and their blocks) is indexed here,
//! and the structural rules that must hold for the tables to be meaningful
//! at all (logical layout, ID definition before use, function/block nesting)
//! are enforced while building them.

// NOTE: all the modules are declared here, but they're documented "inside"
// (i.e. using inner doc comments).
mod func;
mod types;

pub use self::func::{branch_targets, Block, Function};
pub use self::types::{ConstDef, ConstValue, TypeDef};

use crate::diag::{Diag, ErrorKind};
use crate::options::UniversalLimits;
use crate::spv::{self, spec, Id};
use crate::{FxIndexMap, FxIndexSet};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

pub struct EntryPoint {
    pub inst_idx: usize,
    pub execution_model: u32,
    pub function: Id,
    pub name: String,
    pub interface: Vec<Id>,
}

pub struct ExecutionMode {
    pub inst_idx: usize,
    pub mode: u32,
}

/// One decoration applied to an ID (or to a member of a struct type).
#[derive(Clone, Debug)]
pub struct Decoration {
    pub inst_idx: usize,
    pub member: Option<u32>,
    pub decoration: u32,

    /// Operands following the decoration (e.g. the `Offset` literal).
    pub params: SmallVec<[spv::Operand; 2]>,
}

impl Decoration {
    pub fn literal(&self, idx: usize) -> Option<u32> {
        match *self.params.get(idx)? {
            spv::Operand::Imm(imm) => Some(spv::Operand::Imm(imm).word()),
            spv::Operand::Id(..) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdKind {
    Type(TypeDef),
    Constant(ConstDef),
    Variable { storage_class: u32 },
    Function,
    FunctionParameter,
    Label,
    ExtInstImport,
    String,
    DecorationGroup,

    /// Any other instruction result (including `OpUndef`).
    Value,
}

#[derive(Clone, Debug)]
pub struct IdInfo {
    /// Index of the defining instruction.
    pub def_inst: usize,
    pub kind: IdKind,
    pub type_id: Option<Id>,

    /// Index (into [`Module::functions`]) of the enclosing function, if any.
    pub function: Option<usize>,
}

pub struct Module {
    pub header: spv::Header,
    pub insts: Vec<spv::Inst>,

    /// Capabilities declared with `OpCapability` (not including implied ones).
    pub capabilities: FxIndexSet<u32>,
    pub extensions: FxIndexSet<String>,
    pub ext_inst_imports: FxHashMap<Id, String>,

    pub addressing_model: u32,
    pub memory_model: u32,
    pub memory_model_inst: Option<usize>,

    pub entry_points: Vec<EntryPoint>,
    /// Execution modes, keyed by the entry point function.
    pub execution_modes: FxIndexMap<Id, Vec<ExecutionMode>>,

    pub ids: FxHashMap<Id, IdInfo>,

    /// Friendly names (from `OpName`, or derived from types/constants).
    pub names: FxHashMap<Id, String>,

    pub decorations: FxHashMap<Id, Vec<Decoration>>,

    /// Non-`Function` storage class variables, in definition order.
    pub global_variables: Vec<Id>,
    pub forward_pointers: FxHashSet<Id>,

    pub functions: Vec<Function>,
    pub function_by_id: FxHashMap<Id, usize>,

    /// Execution models of all entry points (transitively) calling each function.
    pub entry_models: FxHashMap<Id, SmallVec<[u32; 2]>>,
}

impl Module {
    fn empty(header: spv::Header) -> Self {
        Self {
            header,
            insts: vec![],
            capabilities: FxIndexSet::default(),
            extensions: FxIndexSet::default(),
            ext_inst_imports: FxHashMap::default(),
            addressing_model: 0,
            memory_model: 0,
            memory_model_inst: None,
            entry_points: vec![],
            execution_modes: FxIndexMap::default(),
            ids: FxHashMap::default(),
            names: FxHashMap::default(),
            decorations: FxHashMap::default(),
            global_variables: vec![],
            forward_pointers: FxHashSet::default(),
            functions: vec![],
            function_by_id: FxHashMap::default(),
            entry_models: FxHashMap::default(),
        }
    }

    /// Build all the tables for `insts`, failing on the first structural error.
    pub fn build(
        header: spv::Header,
        insts: Vec<spv::Inst>,
        limits: &UniversalLimits,
    ) -> Result<Self, Diag> {
        let _span = tracing::debug_span!("build_module", insts = insts.len()).entered();

        if header.bound > limits.max_id_bound {
            return Err(Diag::new(
                ErrorKind::OutOfResources,
                format!(
                    "Invalid SPIR-V.  The id bound is larger than the max id bound {}.",
                    limits.max_id_bound
                ),
            ));
        }

        let mut builder = Builder {
            wk: &spec::Spec::get().well_known,
            limits,
            module: Module::empty(header),
            seq: None,
            current_func: None,
            current_block: None,
            only_variables_so_far: false,
            local_variables: 0,
            forward_refs: FxIndexMap::default(),
            used_names: FxHashSet::default(),
        };
        for (idx, inst) in insts.iter().enumerate() {
            builder.inst(idx, inst).map_err(|diag| diag.at_inst(idx))?;
        }
        let mut module = builder.finish(&insts)?;
        module.insts = insts;

        tracing::debug!(
            ids = module.ids.len(),
            functions = module.functions.len(),
            entry_points = module.entry_points.len(),
            "module tables built"
        );
        Ok(module)
    }

    /// `'<id>[%<name>]'`, the form IDs take in diagnostics.
    pub fn id_name(&self, id: Id) -> String {
        match self.names.get(&id) {
            Some(name) => format!("'{id}[%{name}]'"),
            None => format!("'{id}[%{id}]'"),
        }
    }

    pub fn def_inst(&self, id: Id) -> Option<&spv::Inst> {
        self.insts.get(self.ids.get(&id)?.def_inst)
    }

    pub fn def_opcode(&self, id: Id) -> Option<spec::Opcode> {
        self.def_inst(id).map(|inst| inst.opcode)
    }

    pub fn decorations_of(&self, id: Id) -> &[Decoration] {
        self.decorations.get(&id).map_or(&[], |decos| &decos[..])
    }

    /// A (non-member) decoration of `id`.
    pub fn decoration(&self, id: Id, decoration: u32) -> Option<&Decoration> {
        self.decorations_of(id).iter().find(|d| d.member.is_none() && d.decoration == decoration)
    }

    pub fn has_decoration(&self, id: Id, decoration: u32) -> bool {
        self.decoration(id, decoration).is_some()
    }

    pub fn member_decoration(&self, id: Id, member: u32, decoration: u32) -> Option<&Decoration> {
        self.decorations_of(id)
            .iter()
            .find(|d| d.member == Some(member) && d.decoration == decoration)
    }

    pub fn function(&self, id: Id) -> Option<&Function> {
        self.functions.get(*self.function_by_id.get(&id)?)
    }

    /// The function whose body contains instruction `inst_idx`.
    pub fn function_of_inst(&self, inst_idx: usize) -> Option<&Function> {
        let i = self.functions.partition_point(|f| f.end_inst_idx < inst_idx);
        self.functions.get(i).filter(|f| f.inst_idx <= inst_idx)
    }

    /// Execution models of the entry points that can reach instruction `inst_idx`.
    pub fn entry_models_of_inst(&self, inst_idx: usize) -> &[u32] {
        self.function_of_inst(inst_idx)
            .and_then(|f| self.entry_models.get(&f.id))
            .map_or(&[], |models| &models[..])
    }

    fn compute_entry_models(&mut self) {
        for entry in &self.entry_points {
            let mut visited = FxHashSet::default();
            let mut queue = vec![entry.function];
            while let Some(func_id) = queue.pop() {
                if !visited.insert(func_id) {
                    continue;
                }
                let models = self.entry_models.entry(func_id).or_default();
                if !models.contains(&entry.execution_model) {
                    models.push(entry.execution_model);
                }
                if let Some(&i) = self.function_by_id.get(&func_id) {
                    queue.extend(self.functions[i].callees.iter().copied());
                }
            }
        }
    }
}

/// Logical layout sections, in the order they must appear in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Seq {
    Capability,
    Extension,
    ExtInstImport,
    MemoryModel,
    EntryPoint,
    ExecutionMode,
    DebugStringAndSource,
    DebugName,
    DebugModuleProcessed,
    Decoration,

    // NOTE: not its own section, but only a "checkpoint", forcing
    // instructions following `OpLine`/`OpNoLine` into later sections.
    DebugLine,

    Globals,
    Functions,
}

struct Builder<'a> {
    wk: &'static spec::WellKnown,
    limits: &'a UniversalLimits,

    module: Module,

    seq: Option<Seq>,

    current_func: Option<Function>,
    /// Label and `OpLabel` index of the block being built, if any.
    current_block: Option<(Id, usize)>,
    /// Whether the current block is an entry block without non-`OpVariable`
    /// instructions (so far).
    only_variables_so_far: bool,
    local_variables: u32,

    /// IDs used before their definition (where allowed), along with the first use.
    forward_refs: FxIndexMap<Id, usize>,

    used_names: FxHashSet<String>,
}

fn malformed(inst: &spv::Inst) -> Diag {
    Diag::invalid_binary(format!("{}: malformed instruction", inst.opcode.short_name()))
}

impl Builder<'_> {
    fn not_defined(&self, id: Id) -> Diag {
        Diag::invalid_id(format!("ID {} has not been defined", self.module.id_name(id))).with_id(id)
    }

    fn is_terminator(&self, opcode: spec::Opcode) -> bool {
        let wk = self.wk;
        [
            wk.op.OpBranch,
            wk.op.OpBranchConditional,
            wk.op.OpSwitch,
            wk.op.OpKill,
            wk.op.OpReturn,
            wk.op.OpReturnValue,
            wk.op.OpUnreachable,
            wk.op.OpTerminateInvocation,
        ]
        .contains(&opcode)
    }

    fn forward_ref_allowed(&self, inst: &spv::Inst, logical_idx: usize, id: Id) -> bool {
        let wk = self.wk;
        let op = inst.opcode;

        if self.module.forward_pointers.contains(&id) {
            return true;
        }

        let annotation_like = [
            wk.op.OpName,
            wk.op.OpMemberName,
            wk.op.OpDecorate,
            wk.op.OpMemberDecorate,
            wk.op.OpDecorateId,
            wk.op.OpDecorateString,
            wk.op.OpMemberDecorateString,
            wk.op.OpGroupDecorate,
            wk.op.OpGroupMemberDecorate,
            wk.op.OpEntryPoint,
            wk.op.OpExecutionMode,
            wk.op.OpExecutionModeId,
            wk.op.OpPhi,
            wk.op.OpTypeForwardPointer,
            wk.op.OpSelectionMerge,
            wk.op.OpLoopMerge,
        ];
        annotation_like.contains(&op)
            || (op == wk.op.OpFunctionCall && logical_idx == 0)
            || ([wk.op.OpBranch, wk.op.OpBranchConditional, wk.op.OpSwitch].contains(&op)
                && branch_targets(inst).contains(&id))
    }

    fn check_id_uses(&mut self, idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
        if let Some(ty) = inst.result_type_id {
            match self.module.ids.get(&ty) {
                None => return Err(self.not_defined(ty)),
                Some(info) if !matches!(info.kind, IdKind::Type(_)) => {
                    return Err(Diag::invalid_id(format!(
                        "ID {} is not a type id",
                        self.module.id_name(ty)
                    ))
                    .with_id(ty));
                }
                Some(_) => {}
            }
        }

        for i in 0..inst.num_logical_operands() {
            for operand in inst.logical_operand(i).unwrap_or_default() {
                let Some(id) = operand.as_id() else {
                    continue;
                };
                if self.module.ids.contains_key(&id) {
                    continue;
                }
                if !self.forward_ref_allowed(inst, i, id) {
                    return Err(self.not_defined(id));
                }
                self.forward_refs.entry(id).or_insert(idx);
            }
        }
        Ok(())
    }

    fn check_result_id(&self, id: Id) -> Result<(), Diag> {
        let bound = self.module.header.bound;
        if id.get() >= bound {
            return Err(Diag::invalid_id(format!(
                "Result <id> {} is out of bounds, the ID bound is {bound}",
                self.module.id_name(id)
            ))
            .with_id(id));
        }
        if self.module.ids.contains_key(&id) {
            return Err(Diag::invalid_id(format!(
                "ID {} has already been defined",
                self.module.id_name(id)
            ))
            .with_id(id));
        }
        Ok(())
    }

    fn assign_name(&mut self, id: Id, name: &str) {
        let mut base: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' { c } else { '_' })
            .collect();
        if base.is_empty() {
            base.push('_');
        }
        let mut candidate = base.clone();
        let mut suffix = 0;
        while !self.used_names.insert(candidate.clone()) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.module.names.insert(id, candidate);
    }

    fn id_kind(&self, inst: &spv::Inst) -> Result<IdKind, Diag> {
        let wk = self.wk;
        let op = inst.opcode;
        Ok(match op.def().category {
            spec::InstructionCategory::Type => {
                IdKind::Type(TypeDef::from_inst(inst).ok_or_else(|| malformed(inst))?)
            }
            spec::InstructionCategory::Const => {
                IdKind::Constant(ConstDef::from_inst(inst).ok_or_else(|| malformed(inst))?)
            }
            _ if op == wk.op.OpVariable => IdKind::Variable {
                storage_class: inst.imm_operand(0).ok_or_else(|| malformed(inst))?,
            },
            _ if op == wk.op.OpFunction => IdKind::Function,
            _ if op == wk.op.OpFunctionParameter => IdKind::FunctionParameter,
            _ if op == wk.op.OpLabel => IdKind::Label,
            _ if op == wk.op.OpExtInstImport => IdKind::ExtInstImport,
            _ if op == wk.op.OpString => IdKind::String,
            _ if op == wk.op.OpDecorationGroup => IdKind::DecorationGroup,
            _ => IdKind::Value,
        })
    }

    fn decorate(&mut self, target: Id, deco: Decoration) {
        self.module.decorations.entry(target).or_default().push(deco);
    }

    /// Record decorations and annotation-like instructions, returning `false`
    /// if `inst` isn't one of them.
    fn annotation(&mut self, idx: usize, inst: &spv::Inst) -> Result<bool, Diag> {
        let wk = self.wk;
        let op = inst.opcode;
        let id = |i| inst.id_operand(i).ok_or_else(|| malformed(inst));
        let imm = |i| inst.imm_operand(i).ok_or_else(|| malformed(inst));
        let params = |i| -> SmallVec<[spv::Operand; 2]> {
            inst.logical_operand(i).map_or_else(SmallVec::new, |words| words[1..].into())
        };

        if [wk.op.OpDecorate, wk.op.OpDecorateId, wk.op.OpDecorateString].contains(&op) {
            let deco = Decoration { inst_idx: idx, member: None, decoration: imm(1)?, params: params(1) };
            self.decorate(id(0)?, deco);
        } else if [wk.op.OpMemberDecorate, wk.op.OpMemberDecorateString].contains(&op) {
            let deco = Decoration {
                inst_idx: idx,
                member: Some(imm(1)?),
                decoration: imm(2)?,
                params: params(2),
            };
            self.decorate(id(0)?, deco);
        } else if op == wk.op.OpGroupDecorate {
            let group_decos: Vec<_> = self.module.decorations_of(id(0)?).to_vec();
            for i in 1..inst.num_logical_operands() {
                let target = id(i)?;
                for deco in &group_decos {
                    self.decorate(target, Decoration { inst_idx: idx, ..deco.clone() });
                }
            }
        } else if op == wk.op.OpGroupMemberDecorate {
            let group_decos: Vec<_> = self.module.decorations_of(id(0)?).to_vec();
            for i in (1..inst.num_logical_operands()).step_by(2) {
                let (target, member) = (id(i)?, imm(i + 1)?);
                for deco in &group_decos {
                    let deco = Decoration { inst_idx: idx, member: Some(member), ..deco.clone() };
                    self.decorate(target, deco);
                }
            }
        } else if op == wk.op.OpDecorationGroup {
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    fn inst(&mut self, idx: usize, inst: &spv::Inst) -> Result<(), Diag> {
        let wk = self.wk;
        let op = inst.opcode;
        let name = op.short_name();
        let id = |i| inst.id_operand(i).ok_or_else(|| malformed(inst));
        let imm = |i| inst.imm_operand(i).ok_or_else(|| malformed(inst));

        self.check_id_uses(idx, inst)?;
        if let Some(result_id) = inst.result_id {
            self.check_result_id(result_id)?;
        }

        // Line debuginfo doesn't have its own section, but rather can go
        // almost anywhere among globals and functions.
        if [wk.op.OpLine, wk.op.OpNoLine].contains(&op) {
            self.seq = self.seq.max(Some(Seq::DebugLine));
            return Ok(());
        }

        let next_seq = if op == wk.op.OpCapability {
            self.module.capabilities.insert(imm(0)?);
            Seq::Capability
        } else if op == wk.op.OpExtension {
            let ext = inst.literal_string(0).ok_or_else(|| malformed(inst))?;
            self.module.extensions.insert(ext);
            Seq::Extension
        } else if op == wk.op.OpExtInstImport {
            let set = inst.literal_string(0).ok_or_else(|| malformed(inst))?;
            self.module.ext_inst_imports.insert(inst.result_id.ok_or_else(|| malformed(inst))?, set);
            Seq::ExtInstImport
        } else if op == wk.op.OpMemoryModel {
            if self.module.memory_model_inst.is_some() {
                return Err(Diag::invalid_data("OpMemoryModel should only be provided once."));
            }
            self.module.addressing_model = imm(0)?;
            self.module.memory_model = imm(1)?;
            self.module.memory_model_inst = Some(idx);
            Seq::MemoryModel
        } else if op == wk.op.OpEntryPoint {
            self.module.entry_points.push(EntryPoint {
                inst_idx: idx,
                execution_model: imm(0)?,
                function: id(1)?,
                name: inst.literal_string(2).ok_or_else(|| malformed(inst))?,
                interface: (3..inst.num_logical_operands()).filter_map(|i| inst.id_operand(i)).collect(),
            });
            Seq::EntryPoint
        } else if [wk.op.OpExecutionMode, wk.op.OpExecutionModeId].contains(&op) {
            let mode = ExecutionMode { inst_idx: idx, mode: imm(1)? };
            self.module.execution_modes.entry(id(0)?).or_default().push(mode);
            Seq::ExecutionMode
        } else if [wk.op.OpString, wk.op.OpSource, wk.op.OpSourceContinued, wk.op.OpSourceExtension]
            .contains(&op)
        {
            Seq::DebugStringAndSource
        } else if op == wk.op.OpName {
            let target = id(0)?;
            if !self.module.names.contains_key(&target) {
                let name = inst.literal_string(1).ok_or_else(|| malformed(inst))?;
                self.assign_name(target, &name);
            }
            Seq::DebugName
        } else if op == wk.op.OpMemberName {
            Seq::DebugName
        } else if op == wk.op.OpModuleProcessed {
            Seq::DebugModuleProcessed
        } else if self.annotation(idx, inst)? {
            Seq::Decoration
        } else if op == wk.op.OpTypeForwardPointer {
            self.module.forward_pointers.insert(id(0)?);
            Seq::Globals
        } else if op == wk.op.OpFunction {
            if self.current_func.is_some() {
                return Err(Diag::invalid_data("Cannot declare a function in a function body"));
            }
            self.current_func = Some(Function {
                id: inst.result_id.ok_or_else(|| malformed(inst))?,
                inst_idx: idx,
                end_inst_idx: idx,
                result_type: inst.result_type_id.ok_or_else(|| malformed(inst))?,
                function_type: id(1)?,
                control: imm(0)?,
                params: vec![],
                blocks: vec![],
                block_by_label: FxHashMap::default(),
                callees: SmallVec::new(),
            });
            self.local_variables = 0;
            Seq::Functions
        } else if op == wk.op.OpFunctionParameter {
            let func = self.current_func.as_mut().ok_or_else(|| {
                Diag::invalid_data("Function parameter instructions must be in a function body")
            })?;
            if self.current_block.is_some() || !func.blocks.is_empty() {
                return Err(Diag::invalid_data(
                    "Function parameters must only appear immediately after the function definition",
                ));
            }
            func.params.push(idx);
            Seq::Functions
        } else if op == wk.op.OpLabel {
            let func = self
                .current_func
                .as_ref()
                .ok_or_else(|| Diag::invalid_data("Label instructions must be in a function body"))?;
            if self.current_block.is_some() {
                return Err(Diag::invalid_data("A block must end with a branch instruction."));
            }
            self.only_variables_so_far = func.blocks.is_empty();
            self.current_block = Some((inst.result_id.ok_or_else(|| malformed(inst))?, idx));
            Seq::Functions
        } else if op == wk.op.OpFunctionEnd {
            if self.current_block.is_some() {
                return Err(Diag::invalid_data("A block must end with a branch instruction."));
            }
            let mut func = self.current_func.take().ok_or_else(|| {
                Diag::invalid_data("FunctionEnd must be preceded by a matching OpFunction")
            })?;
            func.end_inst_idx = idx;
            self.module.function_by_id.insert(func.id, self.module.functions.len());
            self.module.functions.push(func);
            Seq::Functions
        } else if op == wk.op.OpVariable {
            let storage_class = imm(0)?;
            if storage_class == wk.sc.Function {
                if self.current_func.is_none() {
                    return Err(Diag::invalid_data(
                        "Variables can not have a function[7] storage class outside of a function",
                    ));
                }
                if self.current_block.is_none() || !self.only_variables_so_far {
                    return Err(Diag::invalid_data(
                        "All OpVariable instructions in a function must be the first \
                         instructions in the first block.",
                    ));
                }
                self.local_variables += 1;
                if self.local_variables > self.limits.max_local_variables {
                    return Err(Diag::new(
                        ErrorKind::OutOfResources,
                        format!(
                            "Number of local variables ('Function' Storage Class) exceeded \
                             the valid limit ({}).",
                            self.limits.max_local_variables
                        ),
                    ));
                }
                Seq::Functions
            } else {
                if self.current_func.is_some() {
                    return Err(Diag::invalid_data(
                        "Variables must have a function[7] storage class inside of a function",
                    ));
                }
                self.module.global_variables.push(inst.result_id.ok_or_else(|| malformed(inst))?);
                if self.module.global_variables.len() > self.limits.max_global_variables as usize {
                    return Err(Diag::new(
                        ErrorKind::OutOfResources,
                        format!(
                            "Number of Global Variables (Storage Class other than 'Function') \
                             exceeded the valid limit ({}).",
                            self.limits.max_global_variables
                        ),
                    ));
                }
                Seq::Globals
            }
        } else if self.is_terminator(op) {
            let (label, label_inst) = self
                .current_block
                .take()
                .ok_or_else(|| Diag::invalid_data(format!("{name} must appear in a block")))?;
            let func = self.current_func.as_mut().ok_or_else(|| malformed(inst))?;
            func.block_by_label.insert(label, func.blocks.len());
            func.blocks.push(Block {
                label,
                label_inst,
                insts: label_inst + 1..idx + 1,
                succs: SmallVec::new(),
                preds: SmallVec::new(),
            });
            Seq::Functions
        } else {
            match op.def().category {
                spec::InstructionCategory::Type | spec::InstructionCategory::Const => Seq::Globals,

                // `OpUndef` (and non-semantic `OpExtInst`) can appear either among
                // globals, or in a function, so at most advance `seq` to globals.
                _ if [wk.op.OpUndef, wk.op.OpExtInst].contains(&op) => {
                    self.seq.max(Some(Seq::Globals)).unwrap_or(Seq::Globals)
                }

                _ => Seq::Functions,
            }
        };

        if let Some(seq) = self.seq {
            if seq > next_seq {
                return Err(Diag::invalid_data(format!(
                    "{name} is out of order: {next_seq:?} instructions must precede \
                     {seq:?} instructions"
                )));
            }
        }
        self.seq = Some(next_seq);

        // Everything in a function body (past its parameters) must be in a block.
        let structural = [wk.op.OpFunction, wk.op.OpFunctionParameter, wk.op.OpLabel, wk.op.OpFunctionEnd];
        if next_seq == Seq::Functions && !structural.contains(&op) && !self.is_terminator(op) {
            if self.current_block.is_none() {
                return Err(Diag::invalid_data(format!("{name} must appear in a block")));
            }
            if op != wk.op.OpVariable {
                self.only_variables_so_far = false;
            }
            if op == wk.op.OpFunctionCall {
                let callee = id(0)?;
                if let Some(func) = &mut self.current_func {
                    if !func.callees.contains(&callee) {
                        func.callees.push(callee);
                    }
                }
            }
        }

        if let Some(result_id) = inst.result_id {
            self.forward_refs.shift_remove(&result_id);
            let info = IdInfo {
                def_inst: idx,
                kind: self.id_kind(inst)?,
                type_id: inst.result_type_id,
                function: self.current_func.as_ref().map(|_| self.module.functions.len()),
            };
            if !self.module.names.contains_key(&result_id) {
                if let Some(name) = self.module.derived_name(result_id, &info.kind, info.type_id) {
                    self.assign_name(result_id, &name);
                }
            }
            self.module.ids.insert(result_id, info);
        }

        Ok(())
    }

    fn finish(mut self, insts: &[spv::Inst]) -> Result<Module, Diag> {
        if let Some(func) = &self.current_func {
            return Err(Diag::invalid_data("Missing OpFunctionEnd at end of module.")
                .at_inst(func.inst_idx));
        }
        if self.module.memory_model_inst.is_none() {
            return Err(Diag::invalid_data("Missing required OpMemoryModel instruction."));
        }
        if let Some((&id, &idx)) = self.forward_refs.first() {
            return Err(self.not_defined(id).at_inst(idx));
        }

        for func in &mut self.module.functions {
            func.compute_edges(insts);
        }
        self.module.compute_entry_models();

        Ok(self.module)
    }
}

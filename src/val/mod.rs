//! Rule groups, each checking one area of the SPIR-V (and client API) rules.
//!
//! Rules are plain functions, run over every instruction in module order
//! (and optionally once per module), with the first failure of each rule
//! invocation reported into a [`DiagSink`].

use crate::diag::{Diag, DiagSink};
use crate::env::TargetEnv;
use crate::gate::Gate;
use crate::module::Module;
use crate::options::ValidatorOptions;
use crate::spv::{self, spec, Id, Version};
use std::ops::ControlFlow;

mod atomics;
mod barriers;
mod cfg;
mod decoration;
mod env;
mod function;
mod instruction;
mod layout;
mod memory;
mod memory_semantics;
mod misc;
mod scopes;
mod tensor;
mod types;

/// Everything a rule can look at.
pub struct RuleCx<'a> {
    pub module: &'a Module,
    pub gate: &'a Gate<'a>,
    pub options: &'a ValidatorOptions,
    pub wk: &'static spec::WellKnown,
}

impl<'a> RuleCx<'a> {
    pub fn new(module: &'a Module, gate: &'a Gate<'a>, options: &'a ValidatorOptions) -> Self {
        Self { module, gate, options, wk: &spec::Spec::get().well_known }
    }

    pub fn env(&self) -> TargetEnv {
        self.gate.env()
    }

    /// The SPIR-V version the target environment is defined against (as
    /// opposed to [`Gate::version`], which is the module's own).
    pub fn env_version(&self) -> Version {
        self.env().spirv_version()
    }

    pub fn is_vulkan(&self) -> bool {
        self.env().is_vulkan()
    }

    pub fn has_capability(&self, cap: u32) -> bool {
        self.gate.has_capability(cap)
    }

    pub fn uses_vulkan_memory_model(&self) -> bool {
        self.module.memory_model == self.wk.mm.Vulkan
    }

    pub fn name(&self, id: Id) -> String {
        self.module.id_name(id)
    }

    /// The type of `id`, or an error naming the operand as untyped.
    pub fn type_of(&self, inst: &spv::Inst, id: Id) -> Result<Id, Diag> {
        self.module.type_of(id).ok_or_else(|| {
            Diag::invalid_id(format!(
                "{}: {} does not have a type",
                inst.opcode.short_name(),
                self.name(id)
            ))
            .with_id(id)
        })
    }

    /// ID operand `idx` of `inst` (the reader guarantees required ones exist).
    pub fn id_operand(&self, inst: &spv::Inst, idx: usize) -> Result<Id, Diag> {
        inst.id_operand(idx).ok_or_else(|| {
            Diag::invalid_binary(format!(
                "{}: missing ID operand {}",
                inst.opcode.short_name(),
                idx + 1
            ))
        })
    }
}

/// Rules with a deliberately unenforced reading, because content in the wild
/// (and the conformance suites it was tested against) relies on it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RelaxedRule {
    /// Vulkan 1.0 limits memory scopes to `Device`/`Workgroup`/`Invocation`,
    /// but `Subgroup`-scoped atomics are accepted.
    VulkanSubgroupAtomicScope,

    /// Vulkan barriers with non-`None` semantics are not required to name a
    /// storage class in their semantics.
    VulkanBarrierStorageClassSemantics,
}

const RELAXED_RULES: &[RelaxedRule] =
    &[RelaxedRule::VulkanSubgroupAtomicScope, RelaxedRule::VulkanBarrierStorageClassSemantics];

impl RelaxedRule {
    pub fn is_relaxed(self) -> bool {
        let relaxed = RELAXED_RULES.contains(&self);
        if relaxed {
            tracing::trace!(rule = ?self, "not enforcing relaxed rule");
        }
        relaxed
    }
}

type InstRule = fn(&RuleCx<'_>, usize, &spv::Inst) -> Result<(), Diag>;
type ModuleRule = fn(&RuleCx<'_>) -> Result<(), Diag>;

struct RuleGroup {
    name: &'static str,
    module_rule: Option<ModuleRule>,
    inst_rule: Option<InstRule>,
}

const RULE_GROUPS: &[RuleGroup] = &[
    RuleGroup {
        name: "instruction",
        module_rule: None,
        inst_rule: Some(instruction::check_inst),
    },
    RuleGroup { name: "env", module_rule: Some(env::check_module), inst_rule: Some(env::check_inst) },
    RuleGroup { name: "misc", module_rule: None, inst_rule: Some(misc::check_inst) },
    RuleGroup { name: "types", module_rule: None, inst_rule: Some(types::check_inst) },
    RuleGroup { name: "decoration", module_rule: None, inst_rule: Some(decoration::check_inst) },
    RuleGroup { name: "cfg", module_rule: None, inst_rule: Some(cfg::check_inst) },
    RuleGroup { name: "function", module_rule: None, inst_rule: Some(function::check_inst) },
    RuleGroup { name: "memory", module_rule: None, inst_rule: Some(memory::check_inst) },
    RuleGroup { name: "atomics", module_rule: None, inst_rule: Some(atomics::check_inst) },
    RuleGroup { name: "barriers", module_rule: None, inst_rule: Some(barriers::check_inst) },
    RuleGroup { name: "tensor", module_rule: None, inst_rule: Some(tensor::check_inst) },
    RuleGroup { name: "layout", module_rule: Some(layout::check_module), inst_rule: None },
    RuleGroup { name: "entry_points", module_rule: Some(misc::check_module), inst_rule: None },
];

/// Run all rule groups, in order, over the whole module.
pub fn run(cx: &RuleCx<'_>, sink: &mut DiagSink) -> ControlFlow<()> {
    for group in RULE_GROUPS {
        let _span = tracing::trace_span!("rule_group", group = group.name).entered();

        if let Some(rule) = group.module_rule {
            sink.check(rule(cx))?;
        }
        if let Some(rule) = group.inst_rule {
            for (idx, inst) in cx.module.insts.iter().enumerate() {
                sink.check(rule(cx, idx, inst).map_err(|diag| diag.at_inst(idx)))?;
            }
        }
    }
    ControlFlow::Continue(())
}

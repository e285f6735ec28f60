//! Capability & environment gating, driven by the grammar's requirement records.
//!
//! Every opcode and every enumerant operand (including each bit of a mask)
//! carries a [`spec::Requirements`] record. Whether a use is legal is decided
//! here, against the module's declared capabilities (and those they implicitly
//! declare), its declared extensions, the active SPIR-V version, and the target
//! environment's capability allow-list.

use crate::diag::Diag;
use crate::env::{ClientApi, TargetEnv};
use crate::module::Module;
use crate::spv::{self, spec, Version};
use itertools::Itertools;
use rustc_hash::FxHashSet;

pub struct Gate<'m> {
    env: TargetEnv,

    /// Version used for instruction/enumerant version requirements.
    version: Version,

    /// Declared capabilities, plus all those they implicitly declare.
    enabled_capabilities: FxHashSet<u32>,

    module: &'m Module,
}

/// What an error message names as the gated thing (e.g. `Operand 2 of MemoryModel`).
enum Subject<'a> {
    Opcode(spec::Opcode),
    Operand { number: usize, inst: &'a spv::Inst },
}

impl Subject<'_> {
    fn describe(&self) -> String {
        match self {
            Self::Opcode(opcode) => opcode.short_name().to_string(),
            Self::Operand { number, inst } => {
                format!("Operand {number} of {}", inst.opcode.short_name())
            }
        }
    }
}

impl<'m> Gate<'m> {
    pub fn new(module: &'m Module, env: TargetEnv, version: Version) -> Self {
        let wk = &spec::Spec::get().well_known;

        let mut enabled_capabilities = FxHashSet::default();
        let mut queue: Vec<u32> = module.capabilities.iter().copied().collect();
        while let Some(cap) = queue.pop() {
            if !enabled_capabilities.insert(cap) {
                continue;
            }
            // A capability's own requirements are the capabilities it implies.
            if let Some((_, def)) = wk.kind.Capability.enumerant(cap) {
                queue.extend(def.reqs.capabilities.iter().copied());
            }
        }

        tracing::debug!(
            declared = module.capabilities.len(),
            enabled = enabled_capabilities.len(),
            "capabilities resolved"
        );

        Self { env, version, enabled_capabilities, module }
    }

    pub fn env(&self) -> TargetEnv {
        self.env
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn has_capability(&self, cap: u32) -> bool {
        self.enabled_capabilities.contains(&cap)
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.module.extensions.contains(name)
    }

    fn capability_names(caps: &[u32]) -> String {
        let spv_spec = spec::Spec::get();
        caps.iter().map(|&cap| spv_spec.capability_name(cap)).join(" ")
    }

    fn check_reqs(
        &self,
        reqs: &spec::Requirements,
        subject: Subject<'_>,
        check_capabilities: bool,
    ) -> Result<(), Diag> {
        if check_capabilities
            && !reqs.capabilities.is_empty()
            && !reqs.capabilities.iter().any(|&cap| self.has_capability(cap))
        {
            let prefix = match subject {
                Subject::Opcode(_) => "Opcode ",
                Subject::Operand { .. } => "",
            };
            return Err(Diag::invalid_capability(format!(
                "{prefix}{} requires one of these capabilities: {}",
                subject.describe(),
                Self::capability_names(&reqs.capabilities)
            )));
        }

        if let Some(last) = reqs.last_version {
            if self.version > last {
                return Err(Diag::wrong_version(format!(
                    "{} requires SPIR-V version {last} or earlier",
                    subject.describe()
                )));
            }
        }

        let core = reqs.min_version.is_some_and(|min| self.version >= min);
        if !core && !reqs.extensions.iter().any(|ext| self.has_extension(ext)) {
            return Err(match reqs.min_version {
                Some(min) if reqs.extensions.is_empty() => Diag::wrong_version(format!(
                    "{} requires SPIR-V version {min} or later",
                    subject.describe()
                )),
                _ => Diag::invalid_capability(format!(
                    "{} requires one of these extensions: {}",
                    subject.describe(),
                    reqs.extensions.iter().join(" ")
                )),
            });
        }

        Ok(())
    }

    pub fn check_opcode(&self, opcode: spec::Opcode) -> Result<(), Diag> {
        tracing::trace!(opcode = opcode.name(), "gating opcode");
        self.check_reqs(&opcode.def().reqs, Subject::Opcode(opcode), true)
    }

    /// Check the enumerant `value` (a single bit, for masks) found in `inst.operands[operand_idx]`.
    pub fn check_enumerant(
        &self,
        inst: &spv::Inst,
        operand_idx: usize,
        kind: spec::OperandKind,
        value: u32,
    ) -> Result<(), Diag> {
        let wk = &spec::Spec::get().well_known;
        let Some((name, enumerant)) = kind.enumerant(value) else {
            return Ok(());
        };
        tracing::trace!(kind = kind.name(), enumerant = name, "gating enumerant");

        // Declaring a capability implies it, only its version/extensions are gated.
        let declares_it = inst.opcode == wk.op.OpCapability && kind == wk.kind.Capability;
        let number = inst.operand_number(operand_idx);
        self.check_reqs(&enumerant.reqs, Subject::Operand { number, inst }, !declares_it)
    }

    /// Gate the opcode and every enumerant operand of `inst`.
    pub fn check_inst(&self, inst: &spv::Inst) -> Result<(), Diag> {
        self.check_opcode(inst.opcode)?;

        for (i, &operand) in inst.operands.iter().enumerate() {
            let spv::Operand::Imm(spv::Imm::Short(kind, word)) = operand else {
                continue;
            };
            match kind.def() {
                spec::OperandKindDef::BitEnum { .. } => {
                    for bit in spec::BitIdx::of_all_set_bits(word) {
                        self.check_enumerant(inst, i, kind, 1 << bit.0)?;
                    }
                }
                spec::OperandKindDef::ValueEnum { .. } => {
                    self.check_enumerant(inst, i, kind, word)?;
                }
                spec::OperandKindDef::Id | spec::OperandKindDef::Literal { .. } => {}
            }
        }
        Ok(())
    }

    /// Whether the target environment permits declaring `cap` at all.
    pub fn capability_allowed_by_env(&self, cap: u32) -> bool {
        let wk = &spec::Spec::get().well_known;
        let spv_spec = spec::Spec::get();
        let name = spv_spec.capability_name(cap);
        let name = &name[..];

        match self.env.client_api() {
            ClientApi::Universal => true,
            ClientApi::Vulkan => ![
                "Addresses",
                "Linkage",
                "Kernel",
                "Vector16",
                "Float16Buffer",
                "ImageBasic",
                "ImageReadWrite",
                "ImageMipmap",
                "Pipes",
                "Groups",
                "DeviceEnqueue",
                "LiteralSampler",
                "GenericPointer",
                "SubgroupDispatch",
                "NamedBarrier",
                "PipeStorage",
            ]
            .contains(&name),
            ClientApi::OpenCl => {
                [
                    wk.cap.Addresses,
                    wk.cap.Float16Buffer,
                    wk.cap.Int16,
                    wk.cap.Int8,
                    wk.cap.Kernel,
                    wk.cap.Linkage,
                    wk.cap.Vector16,
                    wk.cap.Float16,
                    wk.cap.Float64,
                    wk.cap.Int64,
                    wk.cap.Int64Atomics,
                ]
                .contains(&cap)
                    || [
                        "Groups",
                        "ImageBasic",
                        "LiteralSampler",
                        "Sampled1D",
                        "Image1D",
                        "SampledBuffer",
                        "ImageBuffer",
                        "ImageReadWrite",
                    ]
                    .contains(&name)
            }
            ClientApi::WebGpu => {
                [wk.cap.Matrix, wk.cap.Shader, wk.cap.VulkanMemoryModel].contains(&cap)
                    || ["Sampled1D", "Image1D", "DerivativeControl", "ImageQuery"].contains(&name)
            }
        }
    }

    pub fn check_capability_allowed_by_env(&self, cap: u32) -> Result<(), Diag> {
        if self.capability_allowed_by_env(cap) {
            return Ok(());
        }
        Err(Diag::invalid_capability(format!(
            "Capability {} is not allowed by {} specification (or requires extension)",
            spec::Spec::get().capability_name(cap),
            self.env.description()
        )))
    }
}

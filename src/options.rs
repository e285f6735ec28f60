//! Validator configuration.

use crate::spv::Version;
use serde::Deserialize;

/// Upper bounds on module sizes, checked while building the module tables
/// and by the rules.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UniversalLimits {
    pub max_struct_members: u32,
    pub max_struct_depth: u32,
    pub max_local_variables: u32,
    pub max_global_variables: u32,
    pub max_switch_branches: u32,
    pub max_function_args: u32,
    pub max_control_flow_nesting_depth: u32,
    pub max_access_chain_indexes: u32,
    pub max_id_bound: u32,
}

impl Default for UniversalLimits {
    fn default() -> Self {
        Self {
            max_struct_members: 16383,
            max_struct_depth: 255,
            max_local_variables: 524287,
            max_global_variables: 65535,
            max_switch_branches: 16383,
            max_function_args: 255,
            max_control_flow_nesting_depth: 1023,
            max_access_chain_indexes: 255,
            max_id_bound: 0x3FFFFF,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorOptions {
    /// Accept logically matching (but not identical) pointee types for
    /// `OpFunctionCall` arguments, as found in modules before legalization.
    pub relax_logical_pointer: bool,

    /// Vulkan block layout: allow vectors aligned only to their components
    /// (as long as they don't straddle a 16-byte boundary).
    pub relax_block_layout: bool,

    /// Vulkan block layout: only scalar alignment is required.
    pub scalar_block_layout: bool,

    /// Don't check Vulkan block layout at all.
    pub skip_block_layout: bool,

    /// Use this version (instead of the header's) for instruction version gating.
    #[serde(deserialize_with = "deserialize_version")]
    pub override_version: Option<Version>,

    pub universal_limits: UniversalLimits,

    /// Report every failing rule, instead of stopping at the first.
    pub exhaustive: bool,
}

fn deserialize_version<'de, D>(deserializer: D) -> Result<Option<Version>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let version: Option<(u8, u8)> = Deserialize::deserialize(deserializer)?;
    Ok(version.map(|(major, minor)| Version::new(major, minor)))
}

impl ValidatorOptions {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn relax_logical_pointer(mut self, relax: bool) -> Self {
        self.relax_logical_pointer = relax;
        self
    }

    pub fn relax_block_layout(mut self, relax: bool) -> Self {
        self.relax_block_layout = relax;
        self
    }

    pub fn scalar_block_layout(mut self, scalar: bool) -> Self {
        self.scalar_block_layout = scalar;
        self
    }

    pub fn skip_block_layout(mut self, skip: bool) -> Self {
        self.skip_block_layout = skip;
        self
    }

    pub fn override_version(mut self, version: Option<Version>) -> Self {
        self.override_version = version;
        self
    }

    pub fn universal_limits(mut self, limits: UniversalLimits) -> Self {
        self.universal_limits = limits;
        self
    }

    pub fn exhaustive(mut self, exhaustive: bool) -> Self {
        self.exhaustive = exhaustive;
        self
    }
}

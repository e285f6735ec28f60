//! Target environments (client API profile + version) a module is validated against.

use crate::spv::Version;
use std::fmt;
use std::str::FromStr;

/// The client API (and its version) that legality is judged against.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetEnv {
    /// Plain SPIR-V of the given version, with no client API rules.
    Universal(Version),

    Vulkan1_0,
    Vulkan1_1,
    /// Vulkan 1.1 with `VK_KHR_spirv_1_4`, allowing SPIR-V 1.4 modules.
    Vulkan1_1Spirv1_4,
    Vulkan1_2,
    Vulkan1_3,
    Vulkan1_4,

    OpenCl1_2,

    WebGpu0,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClientApi {
    Universal,
    Vulkan,
    OpenCl,
    WebGpu,
}

impl TargetEnv {
    pub const ALL_NAMED: &'static [TargetEnv] = &[
        TargetEnv::Universal(Version::new(1, 0)),
        TargetEnv::Universal(Version::new(1, 1)),
        TargetEnv::Universal(Version::new(1, 2)),
        TargetEnv::Universal(Version::new(1, 3)),
        TargetEnv::Universal(Version::new(1, 4)),
        TargetEnv::Universal(Version::new(1, 5)),
        TargetEnv::Universal(Version::new(1, 6)),
        TargetEnv::Vulkan1_0,
        TargetEnv::Vulkan1_1,
        TargetEnv::Vulkan1_1Spirv1_4,
        TargetEnv::Vulkan1_2,
        TargetEnv::Vulkan1_3,
        TargetEnv::Vulkan1_4,
        TargetEnv::OpenCl1_2,
        TargetEnv::WebGpu0,
    ];

    pub fn client_api(self) -> ClientApi {
        match self {
            Self::Universal(_) => ClientApi::Universal,
            Self::Vulkan1_0
            | Self::Vulkan1_1
            | Self::Vulkan1_1Spirv1_4
            | Self::Vulkan1_2
            | Self::Vulkan1_3
            | Self::Vulkan1_4 => ClientApi::Vulkan,
            Self::OpenCl1_2 => ClientApi::OpenCl,
            Self::WebGpu0 => ClientApi::WebGpu,
        }
    }

    pub fn is_vulkan(self) -> bool {
        self.client_api() == ClientApi::Vulkan
    }

    pub fn is_webgpu(self) -> bool {
        self.client_api() == ClientApi::WebGpu
    }

    /// Highest SPIR-V version a module may declare in its header.
    pub fn spirv_version(self) -> Version {
        match self {
            Self::Universal(v) => v,
            Self::Vulkan1_0 | Self::OpenCl1_2 => Version::new(1, 0),
            Self::Vulkan1_1 | Self::WebGpu0 => Version::new(1, 3),
            Self::Vulkan1_1Spirv1_4 => Version::new(1, 4),
            Self::Vulkan1_2 => Version::new(1, 5),
            Self::Vulkan1_3 | Self::Vulkan1_4 => Version::new(1, 6),
        }
    }

    /// Vulkan API version (`(major, minor)`), for Vulkan environments.
    pub fn vulkan_version(self) -> Option<(u8, u8)> {
        Some(match self {
            Self::Vulkan1_0 => (1, 0),
            Self::Vulkan1_1 | Self::Vulkan1_1Spirv1_4 => (1, 1),
            Self::Vulkan1_2 => (1, 2),
            Self::Vulkan1_3 => (1, 3),
            Self::Vulkan1_4 => (1, 4),
            _ => return None,
        })
    }

    /// Human-readable description, as used in diagnostics.
    pub fn description(self) -> String {
        match self {
            Self::Universal(v) => format!("SPIR-V {v}"),
            Self::Vulkan1_0 => "Vulkan 1.0".into(),
            Self::Vulkan1_1 => "Vulkan 1.1".into(),
            Self::Vulkan1_1Spirv1_4 => "Vulkan 1.1 (with SPIR-V 1.4)".into(),
            Self::Vulkan1_2 => "Vulkan 1.2".into(),
            Self::Vulkan1_3 => "Vulkan 1.3".into(),
            Self::Vulkan1_4 => "Vulkan 1.4".into(),
            Self::OpenCl1_2 => "OpenCL 1.2".into(),
            Self::WebGpu0 => "WebGPU".into(),
        }
    }
}

impl fmt::Display for TargetEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Universal(v) => write!(f, "spv{v}"),
            Self::Vulkan1_0 => f.write_str("vulkan1.0"),
            Self::Vulkan1_1 => f.write_str("vulkan1.1"),
            Self::Vulkan1_1Spirv1_4 => f.write_str("vulkan1.1spv1.4"),
            Self::Vulkan1_2 => f.write_str("vulkan1.2"),
            Self::Vulkan1_3 => f.write_str("vulkan1.3"),
            Self::Vulkan1_4 => f.write_str("vulkan1.4"),
            Self::OpenCl1_2 => f.write_str("opencl1.2"),
            Self::WebGpu0 => f.write_str("webgpu0"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown target environment `{0}`")]
pub struct UnknownTargetEnv(pub String);

impl FromStr for TargetEnv {
    type Err = UnknownTargetEnv;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL_NAMED
            .iter()
            .copied()
            .find(|env| env.to_string() == s)
            .ok_or_else(|| UnknownTargetEnv(s.to_string()))
    }
}

impl<'de> serde::Deserialize<'de> for TargetEnv {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

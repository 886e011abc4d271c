//! Runner capabilities and capability profiles
//!
//! A backend describes what it can do through [`Capabilities`]. The
//! interpreter reads them to evaluate tags in qualifiers and to decide
//! whether `[require]` blocks are satisfied. A [`CapabilityProfile`] loaded
//! from YAML can override any part of them, which is how a test run pretends
//! to be a more limited runner.

use crate::compiler::SourceFormat;
use crate::format::Format;
use crate::model::ShaderModel;
use crate::qualifier::KNOWN_TAGS;
use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// An optional feature a test may require
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cap {
    ClipPlanes,
    DepthBounds,
    Float64,
    Fog,
    GeometryShader,
    Int64,
    PointSize,
    Rov,
    RtVpArrayIndex,
    TessellationShader,
    WaveOps,
    Native16Bit,
}

/// Capabilities by the keyword used in `[require]` blocks
pub const CAP_NAMES: &[(&str, Cap)] = &[
    ("clip-planes", Cap::ClipPlanes),
    ("depth-bounds", Cap::DepthBounds),
    ("float64", Cap::Float64),
    ("fog", Cap::Fog),
    ("geometry-shader", Cap::GeometryShader),
    ("int64", Cap::Int64),
    ("point-size", Cap::PointSize),
    ("rov", Cap::Rov),
    ("rt-vp-array-index", Cap::RtVpArrayIndex),
    ("tessellation-shader", Cap::TessellationShader),
    ("wave-ops", Cap::WaveOps),
    ("native-16-bit", Cap::Native16Bit),
];

impl Cap {
    /// Keyword used in `[require]` blocks
    pub fn name(self) -> &'static str {
        CAP_NAMES.iter().find(|(_, cap)| *cap == self).map_or("", |(name, _)| *name)
    }
}

impl FromStr for Cap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CAP_NAMES.iter().find(|(name, _)| *name == s).map(|(_, cap)| *cap).ok_or_else(|| format!("Unknown capability '{s}'"))
    }
}

impl fmt::Display for Cap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Cap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Cap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

bitflags! {
    /// Per-format capabilities
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatCaps: u32 {
        /// Typed UAV loads are supported for the format
        const UAV_LOAD = 1 << 0;
    }
}

/// What a runner and its compiler support
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Name of the backend
    pub runner: String,
    /// Name of the shader compiler
    pub compiler: String,
    /// Tags usable in qualifier expressions
    pub tags: Vec<String>,
    /// Lowest supported shader model
    pub minimum_model: ShaderModel,
    /// Highest supported shader model
    pub maximum_model: ShaderModel,
    /// Supported optional features
    pub caps: BTreeSet<Cap>,
    /// Capabilities of formats that have any
    pub format_caps: BTreeMap<Format, FormatCaps>,
    /// Source formats the compiler accepts in run mode
    pub source_formats: Vec<SourceFormat>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            runner: "none".to_string(),
            compiler: "none".to_string(),
            tags: Vec::new(),
            minimum_model: ShaderModel::MIN,
            maximum_model: ShaderModel::MAX,
            caps: BTreeSet::new(),
            format_caps: BTreeMap::new(),
            source_formats: vec![SourceFormat::Hlsl],
        }
    }
}

impl Capabilities {
    /// Whether an optional feature is supported
    pub fn has(&self, cap: Cap) -> bool {
        self.caps.contains(&cap)
    }

    /// Capabilities of a format
    pub fn format_caps(&self, format: Format) -> FormatCaps {
        self.format_caps.get(&format).copied().unwrap_or_default()
    }

    /// Whether the given source format is accepted in run mode
    pub fn accepts_source(&self, format: SourceFormat) -> bool {
        self.source_formats.contains(&format)
    }
}

/// Overrides for [`Capabilities`] loaded from YAML
///
/// Every field is optional; absent fields keep the backend's value.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityProfile {
    #[serde(default)]
    pub runner: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub minimum_model: Option<ShaderModel>,
    #[serde(default)]
    pub maximum_model: Option<ShaderModel>,
    #[serde(default)]
    pub caps: Option<Vec<Cap>>,
    /// Formats supporting typed UAV loads
    #[serde(default)]
    pub uav_load_formats: Option<Vec<Format>>,
    #[serde(default)]
    pub source_formats: Option<Vec<SourceFormat>>,
}

/// A capability profile that cannot be applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("unknown tag '{0}'")]
    UnknownTag(String),
    #[error("empty shader model range {0} - {1}")]
    EmptyModelRange(ShaderModel, ShaderModel),
}

impl CapabilityProfile {
    /// Parses a profile from YAML content
    ///
    /// # Arguments
    /// * `yaml_content` - YAML string containing the profile
    pub fn from_yaml(yaml_content: &str) -> Result<Self, serde_norway::Error> {
        serde_norway::from_str(yaml_content)
    }

    /// Parses a profile from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML profile
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }

    /// Applies the overrides on top of a backend's capabilities
    ///
    /// # Returns
    /// The overridden capabilities, or an error if the profile names an
    /// unknown tag or an empty model range
    pub fn apply(&self, base: &Capabilities) -> Result<Capabilities, ProfileError> {
        let mut caps = base.clone();

        if let Some(runner) = &self.runner {
            caps.runner = runner.clone();
        }
        if let Some(tags) = &self.tags {
            if let Some(unknown) = tags.iter().find(|tag| !KNOWN_TAGS.contains(&tag.as_str())) {
                return Err(ProfileError::UnknownTag(unknown.clone()));
            }
            caps.tags = tags.clone();
        }
        if let Some(model) = self.minimum_model {
            caps.minimum_model = model;
        }
        if let Some(model) = self.maximum_model {
            caps.maximum_model = model;
        }
        if caps.maximum_model < caps.minimum_model {
            return Err(ProfileError::EmptyModelRange(caps.minimum_model, caps.maximum_model));
        }
        if let Some(list) = &self.caps {
            caps.caps = list.iter().copied().collect();
        }
        if let Some(formats) = &self.uav_load_formats {
            caps.format_caps = formats.iter().map(|format| (*format, FormatCaps::UAV_LOAD)).collect();
        }
        if let Some(formats) = &self.source_formats {
            caps.source_formats = formats.clone();
        }

        Ok(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_names() {
        for (name, cap) in CAP_NAMES {
            assert_eq!(name.parse::<Cap>().unwrap(), *cap);
            assert_eq!(cap.to_string(), *name);
        }
        assert!("float128".parse::<Cap>().is_err());
    }

    #[test]
    fn test_profile_parsing_and_apply() {
        let yaml = r#"
runner: limited
tags: [vulkan, mvk<1.2.11]
minimum_model: "4.0"
maximum_model: "5.1"
caps: [float64, wave-ops]
uav_load_formats: [r32-uint, r32g32b32a32-float]
source_formats: [hlsl, wgsl]
"#;

        let profile = CapabilityProfile::from_yaml(yaml).unwrap();
        let caps = profile.apply(&Capabilities::default()).unwrap();

        assert_eq!(caps.runner, "limited");
        assert_eq!(caps.compiler, "none");
        assert_eq!(caps.tags, vec!["vulkan".to_string(), "mvk<1.2.11".to_string()]);
        assert_eq!(caps.minimum_model, ShaderModel::Sm4_0);
        assert_eq!(caps.maximum_model, ShaderModel::Sm5_1);
        assert!(caps.has(Cap::Float64));
        assert!(!caps.has(Cap::Int64));
        assert_eq!(caps.format_caps(Format::R32Uint), FormatCaps::UAV_LOAD);
        assert!(caps.format_caps(Format::R16Uint).is_empty());
        assert!(caps.accepts_source(SourceFormat::Wgsl));
    }

    #[test]
    fn test_empty_profile_keeps_base() {
        let profile = CapabilityProfile::from_yaml("{}").unwrap();
        let base = Capabilities::default();
        assert_eq!(profile.apply(&base).unwrap(), base);
    }

    #[test]
    fn test_invalid_profiles() {
        let profile = CapabilityProfile::from_yaml("tags: [vulkan, metal]").unwrap();
        assert_eq!(profile.apply(&Capabilities::default()), Err(ProfileError::UnknownTag("metal".to_string())));

        let profile = CapabilityProfile::from_yaml("minimum_model: \"6.0\"\nmaximum_model: \"5.0\"").unwrap();
        assert!(matches!(profile.apply(&Capabilities::default()), Err(ProfileError::EmptyModelRange(..))));

        assert!(CapabilityProfile::from_yaml("colour: blue").is_err());
    }
}

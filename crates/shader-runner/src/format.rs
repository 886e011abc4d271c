//! Texel formats understood by test files
//!
//! Formats are named the way test files spell them (`r32g32b32a32-float`,
//! `d24-unorm-s8-uint`, ...). Each carries enough layout information to size
//! resources and to decode texels during probes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Numeric interpretation of a format's components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Float,
    Unorm,
    Snorm,
    Uint,
    Sint,
    /// Raw bits with no interpretation
    Typeless,
}

/// A resource or vertex-attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Format {
    R32G32B32A32Float,
    R32G32B32A32Uint,
    R32G32B32A32Sint,
    R32G32Float,
    R32G32Uint,
    R32G32Sint,
    R32Float,
    R32Uint,
    R32Sint,
    R32Typeless,
    R16G16B16A16Float,
    R16G16B16A16Unorm,
    R16G16B16A16Uint,
    R16G16B16A16Sint,
    R16G16Float,
    R16G16Unorm,
    R16G16Uint,
    R16G16Sint,
    R16Float,
    R16Unorm,
    R16Uint,
    R16Sint,
    R8G8B8A8Unorm,
    R8G8B8A8Snorm,
    R8G8B8A8Uint,
    R8G8B8A8Sint,
    R8G8Unorm,
    R8Unorm,
    D32Float,
    D24UnormS8Uint,
    /// Structured data whose stride is given explicitly
    Unknown,
}

/// Static layout description of a [`Format`]
#[derive(Debug, Clone, Copy)]
pub struct FormatInfo {
    /// Name used in test files
    pub name: &'static str,
    /// Bytes per texel; zero for [`Format::Unknown`]
    pub texel_size: u32,
    /// Number of components per texel
    pub component_count: u32,
    /// Interpretation of every component
    pub component_type: ComponentType,
}

const fn info(name: &'static str, texel_size: u32, component_count: u32, component_type: ComponentType) -> FormatInfo {
    FormatInfo {
        name,
        texel_size,
        component_count,
        component_type,
    }
}

/// Every format with its layout, in the order test files usually list them
pub const FORMATS: &[(Format, FormatInfo)] = &[
    (Format::R32G32B32A32Float, info("r32g32b32a32-float", 16, 4, ComponentType::Float)),
    (Format::R32G32B32A32Uint, info("r32g32b32a32-uint", 16, 4, ComponentType::Uint)),
    (Format::R32G32B32A32Sint, info("r32g32b32a32-sint", 16, 4, ComponentType::Sint)),
    (Format::R32G32Float, info("r32g32-float", 8, 2, ComponentType::Float)),
    (Format::R32G32Uint, info("r32g32-uint", 8, 2, ComponentType::Uint)),
    (Format::R32G32Sint, info("r32g32-sint", 8, 2, ComponentType::Sint)),
    (Format::R32Float, info("r32-float", 4, 1, ComponentType::Float)),
    (Format::R32Uint, info("r32-uint", 4, 1, ComponentType::Uint)),
    (Format::R32Sint, info("r32-sint", 4, 1, ComponentType::Sint)),
    (Format::R32Typeless, info("r32-typeless", 4, 1, ComponentType::Typeless)),
    (Format::R16G16B16A16Float, info("r16g16b16a16-float", 8, 4, ComponentType::Float)),
    (Format::R16G16B16A16Unorm, info("r16g16b16a16-unorm", 8, 4, ComponentType::Unorm)),
    (Format::R16G16B16A16Uint, info("r16g16b16a16-uint", 8, 4, ComponentType::Uint)),
    (Format::R16G16B16A16Sint, info("r16g16b16a16-sint", 8, 4, ComponentType::Sint)),
    (Format::R16G16Float, info("r16g16-float", 4, 2, ComponentType::Float)),
    (Format::R16G16Unorm, info("r16g16-unorm", 4, 2, ComponentType::Unorm)),
    (Format::R16G16Uint, info("r16g16-uint", 4, 2, ComponentType::Uint)),
    (Format::R16G16Sint, info("r16g16-sint", 4, 2, ComponentType::Sint)),
    (Format::R16Float, info("r16-float", 2, 1, ComponentType::Float)),
    (Format::R16Unorm, info("r16-unorm", 2, 1, ComponentType::Unorm)),
    (Format::R16Uint, info("r16-uint", 2, 1, ComponentType::Uint)),
    (Format::R16Sint, info("r16-sint", 2, 1, ComponentType::Sint)),
    (Format::R8G8B8A8Unorm, info("r8g8b8a8-unorm", 4, 4, ComponentType::Unorm)),
    (Format::R8G8B8A8Snorm, info("r8g8b8a8-snorm", 4, 4, ComponentType::Snorm)),
    (Format::R8G8B8A8Uint, info("r8g8b8a8-uint", 4, 4, ComponentType::Uint)),
    (Format::R8G8B8A8Sint, info("r8g8b8a8-sint", 4, 4, ComponentType::Sint)),
    (Format::R8G8Unorm, info("r8g8-unorm", 2, 2, ComponentType::Unorm)),
    (Format::R8Unorm, info("r8-unorm", 1, 1, ComponentType::Unorm)),
    (Format::D32Float, info("d32-float", 4, 1, ComponentType::Float)),
    (Format::D24UnormS8Uint, info("d24-unorm-s8-uint", 4, 1, ComponentType::Unorm)),
    (Format::Unknown, info("unknown", 0, 1, ComponentType::Typeless)),
];

impl Format {
    /// Layout description of this format
    pub fn info(self) -> &'static FormatInfo {
        // The table lists every variant exactly once, in declaration order
        &FORMATS[self as usize].1
    }

    /// Name used in test files
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Bytes per texel
    pub fn texel_size(self) -> u32 {
        self.info().texel_size
    }

    /// Number of components per texel
    pub fn component_count(self) -> u32 {
        self.info().component_count
    }

    /// Interpretation of every component
    pub fn component_type(self) -> ComponentType {
        self.info().component_type
    }

    /// Bytes per component, for formats with uniformly sized components
    pub fn component_size(self) -> u32 {
        self.texel_size() / self.component_count()
    }

    /// Whether this is a depth or depth-stencil format
    pub fn is_depth(self) -> bool {
        matches!(self, Format::D32Float | Format::D24UnormS8Uint)
    }

    /// Looks up a format by its test-file name
    pub fn from_name(name: &str) -> Option<Self> {
        FORMATS.iter().find(|(_, info)| info.name == name).map(|(format, _)| *format)
    }
}

impl FromStr for Format {
    type Err = UnknownFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownFormatError(s.to_string()))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Format {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Format {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The text does not name a known format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormatError(pub String);

impl fmt::Display for UnknownFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown format '{}'", self.0)
    }
}

impl std::error::Error for UnknownFormatError {}

//! Shader compiler contract
//!
//! The interpreter never compiles shaders itself. It hands accumulated
//! source text to a [`ShaderCompiler`] and keeps whatever comes back, so
//! that backends can consume it at draw or dispatch time.

use crate::error::{ParseError, parse_bail};
use crate::model::ShaderModel;
use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Pipeline stage a shader block belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Vertex,
    Pixel,
    Hull,
    Domain,
    Geometry,
    Compute,
    Effect,
}

impl ShaderType {
    /// Number of shader types
    pub const COUNT: usize = 7;

    /// Every shader type
    pub const ALL: [ShaderType; Self::COUNT] = [
        ShaderType::Vertex,
        ShaderType::Pixel,
        ShaderType::Hull,
        ShaderType::Domain,
        ShaderType::Geometry,
        ShaderType::Compute,
        ShaderType::Effect,
    ];

    /// Ordinal of this type, usable as an array index
    pub fn index(self) -> usize {
        self as usize
    }

    /// Keyword used in block headers
    pub fn block_name(self) -> &'static str {
        match self {
            ShaderType::Vertex => "vertex shader",
            ShaderType::Pixel => "pixel shader",
            ShaderType::Hull => "hull shader",
            ShaderType::Domain => "domain shader",
            ShaderType::Geometry => "geometry shader",
            ShaderType::Compute => "compute shader",
            ShaderType::Effect => "effect",
        }
    }

    /// Two-letter prefix of HLSL target profiles (`ps_5_0`, `cs_6_0`, ...)
    pub fn profile_prefix(self) -> &'static str {
        match self {
            ShaderType::Vertex => "vs",
            ShaderType::Pixel => "ps",
            ShaderType::Hull => "hs",
            ShaderType::Domain => "ds",
            ShaderType::Geometry => "gs",
            ShaderType::Compute => "cs",
            ShaderType::Effect => "fx",
        }
    }
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.block_name())
    }
}

/// Language or container the shader source is written in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    #[default]
    Hlsl,
    Wgsl,
    /// Legacy D3D bytecode as hex digits
    D3dbcHex,
    /// DXBC container with TPF bytecode as hex digits
    DxbcTpfHex,
    /// DXBC container with DXIL bytecode as hex digits
    DxbcDxilHex,
}

/// Source formats by the name used in shader block headers
pub const SOURCE_FORMATS: &[(&str, SourceFormat)] = &[
    ("hlsl", SourceFormat::Hlsl),
    ("wgsl", SourceFormat::Wgsl),
    ("d3dbc-hex", SourceFormat::D3dbcHex),
    ("dxbc-tpf-hex", SourceFormat::DxbcTpfHex),
    ("dxbc-dxil-hex", SourceFormat::DxbcDxilHex),
];

impl SourceFormat {
    /// Name used in shader block headers
    pub fn name(self) -> &'static str {
        SOURCE_FORMATS.iter().find(|(_, format)| *format == self).map_or("hlsl", |(name, _)| *name)
    }

    /// Whether the source carries precompiled bytecode as hex digits
    pub fn is_hex(self) -> bool {
        matches!(self, SourceFormat::D3dbcHex | SourceFormat::DxbcTpfHex | SourceFormat::DxbcDxilHex)
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SOURCE_FORMATS
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, format)| *format)
            .ok_or_else(|| format!("Unknown source format '{s}'"))
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for SourceFormat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for SourceFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

bitflags! {
    /// Options passed to the compiler, set from `[require]` blocks
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CompileOptions: u32 {
        const ROW_MAJOR = 1 << 0;
        const COLUMN_MAJOR = 1 << 1;
        const BACKCOMPAT = 1 << 2;
        const CHILD_EFFECT = 1 << 3;
        const INCLUDE_EMPTY_BUFFERS = 1 << 4;
    }
}

/// Compile options by the name used in `options:` directives
pub const COMPILE_OPTION_NAMES: &[(&str, CompileOptions)] = &[
    ("row-major", CompileOptions::ROW_MAJOR),
    ("column-major", CompileOptions::COLUMN_MAJOR),
    ("backcompat", CompileOptions::BACKCOMPAT),
    ("child-effect", CompileOptions::CHILD_EFFECT),
    ("include-empty-buffers", CompileOptions::INCLUDE_EMPTY_BUFFERS),
];

/// Expected or observed outcome of compiling a shader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CompileStatus {
    #[default]
    Ok,
    Fail,
    NotImpl,
}

impl CompileStatus {
    /// Classifies a compile result
    pub fn of<T>(result: &Result<T, CompileError>) -> Self {
        match result {
            Ok(_) => CompileStatus::Ok,
            Err(CompileError::Failed(_)) => CompileStatus::Fail,
            Err(CompileError::NotImplemented(_)) => CompileStatus::NotImpl,
        }
    }
}

impl fmt::Display for CompileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileStatus::Ok => f.write_str("success"),
            CompileStatus::Fail => f.write_str("failure"),
            CompileStatus::NotImpl => f.write_str("not implemented"),
        }
    }
}

/// Accumulated source text of a shader block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderSource {
    pub text: String,
    pub format: SourceFormat,
}

impl ShaderSource {
    /// Creates a shader source
    pub fn new(text: impl Into<String>, format: SourceFormat) -> Self {
        Self { text: text.into(), format }
    }

    /// Decodes the hex digits of a precompiled source
    ///
    /// Whitespace between digits is ignored; anything else is an error.
    pub fn decode_hex(&self) -> Result<Vec<u8>, ParseError> {
        let digits: Vec<u8> = self
            .text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_digit(16).map(|d| d as u8).ok_or(c))
            .collect::<Result<_, char>>()
            .map_err(|c| ParseError::new(format!("Invalid hex digit '{c}' in shader source.")))?;

        if digits.len() % 2 != 0 {
            parse_bail!("Odd number of hex digits in shader source.");
        }

        Ok(digits.chunks_exact(2).map(|pair| (pair[0] << 4) | pair[1]).collect())
    }
}

/// Kind of a resource binding used by a compiled shader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    UniformBuffer,
    StorageBuffer { read_only: bool },
    Texture { multisampled: bool },
    StorageTexture,
    Sampler { comparison: bool },
}

/// A resource binding reflected from a compiled shader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderBinding {
    /// Binding index within group 0
    pub binding: u32,
    pub kind: BindingKind,
}

/// Compiled shader code in the form the compiler produced
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderCode {
    Wgsl(String),
    SpirV(Vec<u32>),
    /// Opaque bytecode, e.g. decoded from a hex source
    Bytecode(Vec<u8>),
}

/// Result of a successful compile
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledShader {
    pub shader_type: ShaderType,
    pub model: ShaderModel,
    pub code: ShaderCode,
    pub entry_point: String,
    pub bindings: Vec<ShaderBinding>,
}

/// Why a compile did not produce code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The compiler rejected the source
    #[error("compilation failed: {0}")]
    Failed(String),
    /// The compiler does not support this source, type or model
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

/// A shader compiler the interpreter drives
pub trait ShaderCompiler {
    /// Compiles a shader for the given type and model
    ///
    /// # Arguments
    /// * `source` - Source text and its format
    /// * `shader_type` - Pipeline stage
    /// * `model` - Shader model to target
    /// * `options` - Options from the current `[require]` block
    fn compile(&self, source: &ShaderSource, shader_type: ShaderType, model: ShaderModel, options: CompileOptions) -> Result<CompiledShader, CompileError>;

    /// Runs only the preprocessor over `source`
    fn preprocess(&self, _source: &str) -> Result<String, CompileError> {
        Err(CompileError::NotImplemented("preprocessing".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_format_names() {
        for (name, format) in SOURCE_FORMATS {
            assert_eq!(name.parse::<SourceFormat>().unwrap(), *format);
            assert_eq!(format.name(), *name);
        }
        assert!("glsl".parse::<SourceFormat>().is_err());
        assert!(SourceFormat::DxbcTpfHex.is_hex());
        assert!(!SourceFormat::Wgsl.is_hex());
    }

    #[test]
    fn test_decode_hex() {
        let source = ShaderSource::new("44 58 42 43\n0a ff\n", SourceFormat::DxbcTpfHex);
        assert_eq!(source.decode_hex().unwrap(), vec![0x44, 0x58, 0x42, 0x43, 0x0a, 0xff]);

        assert!(ShaderSource::new("4", SourceFormat::D3dbcHex).decode_hex().is_err());
        assert!(ShaderSource::new("zz", SourceFormat::D3dbcHex).decode_hex().is_err());
    }

    #[test]
    fn test_compile_status_of_result() {
        assert_eq!(CompileStatus::of::<()>(&Ok(())), CompileStatus::Ok);
        assert_eq!(CompileStatus::of::<()>(&Err(CompileError::Failed(String::new()))), CompileStatus::Fail);
        assert_eq!(CompileStatus::of::<()>(&Err(CompileError::NotImplemented(String::new()))), CompileStatus::NotImpl);
    }
}

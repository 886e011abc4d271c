//! Shader block headers
//!
//! A shader block header names the stage and may carry compile
//! expectations: `[pixel shader todo(sm<6) fail(sm>=6)]`,
//! `[compute shader notimpl(sm<4) wgsl]`. The body is accumulated verbatim.

use crate::compiler::{CompileStatus, SOURCE_FORMATS, ShaderType, SourceFormat};
use crate::error::{ParseError, parse_bail};
use crate::matcher::{match_table, match_token_with_qualifier};
use crate::model::{ModelMask, PerModel, ShaderModel};
use crate::qualifier::QualifierContext;

/// Parsed header of a shader block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderHeader {
    pub shader_type: ShaderType,
    /// Models whose compile result is expected to be wrong
    pub todo: ModelMask,
    /// Expected compile result per model
    pub expected: PerModel<CompileStatus>,
    pub format: SourceFormat,
}

impl ShaderHeader {
    /// Header of a block without qualifiers
    pub fn new(shader_type: ShaderType) -> Self {
        Self {
            shader_type,
            todo: ModelMask::EMPTY,
            expected: [CompileStatus::Ok; ShaderModel::COUNT],
            format: SourceFormat::default(),
        }
    }

    /// Expected compile result at a model
    pub fn expected_at(&self, model: ShaderModel) -> CompileStatus {
        self.expected[model.index()]
    }
}

/// Parses the qualifiers following the stage name of a shader block header
///
/// # Arguments
/// * `shader_type` - Stage named by the header
/// * `text` - Header text after the stage name, without the closing bracket
/// * `context` - Qualifier evaluation context
pub fn parse_shader_header(shader_type: ShaderType, text: &str, context: &QualifierContext<'_>) -> Result<ShaderHeader, ParseError> {
    let mut header = ShaderHeader::new(shader_type);
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        if let Some((qualifier, tail)) = match_token_with_qualifier(rest, "todo", context)? {
            header.todo |= qualifier.gated;
            rest = tail;
        } else if let Some((qualifier, tail)) = match_token_with_qualifier(rest, "fail", context)? {
            for model in qualifier.gated.iter() {
                header.expected[model.index()] = CompileStatus::Fail;
            }
            rest = tail;
        } else if let Some((qualifier, tail)) = match_token_with_qualifier(rest, "notimpl", context)? {
            for model in qualifier.gated.iter() {
                header.expected[model.index()] = CompileStatus::NotImpl;
            }
            rest = tail;
        } else if let Some((format, tail)) = match_table(rest, SOURCE_FORMATS) {
            header.format = format;
            rest = tail;
        } else {
            parse_bail!("Unknown shader header qualifier '{}'.", rest.trim());
        }
    }

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str, tags: &[&str]) -> Result<ShaderHeader, ParseError> {
        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        let context = QualifierContext::new(ShaderModel::Sm4_0, &tags);
        parse_shader_header(ShaderType::Pixel, text, &context)
    }

    #[test]
    fn test_plain_header() {
        let header = parse("", &[]).unwrap();
        assert_eq!(header, ShaderHeader::new(ShaderType::Pixel));
    }

    #[test]
    fn test_expectations_per_model() {
        let header = parse("todo(sm<6) fail(sm>=6) dxbc-tpf-hex", &[]).unwrap();
        assert_eq!(header.todo, ModelMask::below(ShaderModel::Sm6_0));
        assert_eq!(header.expected_at(ShaderModel::Sm5_1), CompileStatus::Ok);
        assert_eq!(header.expected_at(ShaderModel::Sm6_0), CompileStatus::Fail);
        assert_eq!(header.format, SourceFormat::DxbcTpfHex);

        let header = parse("notimpl", &[]).unwrap();
        assert!(ShaderModel::ALL.iter().all(|m| header.expected_at(*m) == CompileStatus::NotImpl));
    }

    #[test]
    fn test_expectations_follow_tags() {
        let header = parse("fail(glsl)", &[]).unwrap();
        assert!(ShaderModel::ALL.iter().all(|m| header.expected_at(*m) == CompileStatus::Ok));

        let header = parse("fail(glsl)", &["glsl"]).unwrap();
        assert!(ShaderModel::ALL.iter().all(|m| header.expected_at(*m) == CompileStatus::Fail));
    }

    #[test]
    fn test_unknown_qualifier() {
        assert!(parse("maybe", &[]).is_err());
        assert!(parse("todo(sm<2)", &[]).is_err());
    }
}

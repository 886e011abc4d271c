//! Per-block directive grammars
//!
//! Every block kind of a test file has its own line grammar. This module
//! classifies block headers; the submodules parse block contents.

pub mod input_layout;
pub mod require;
pub mod resource;
pub mod sampler;
pub mod shader;

use crate::compiler::ShaderType;
use crate::error::{ParseError, parse_bail};
use crate::matcher::{expect_end, expect_u32, match_table, match_token};
use crate::qualifier::QualifierContext;
use crate::resource::{RESOURCE_TYPES, ResourceType};
use shader::{ShaderHeader, parse_shader_header};

/// A classified `[...]` block header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockHeader {
    Require,
    Test,
    Preproc,
    /// Preprocessing is expected to fail
    PreprocInvalid,
    InputLayout,
    Shader(ShaderHeader),
    Resource(ResourceType, u32),
    Sampler(u32),
}

/// Parses a block header line
///
/// # Arguments
/// * `line` - The whole header line, starting with `[`
/// * `context` - Qualifier evaluation context for shader headers
pub fn parse_block_header(line: &str, context: &QualifierContext<'_>) -> Result<BlockHeader, ParseError> {
    let Some(inner) = line.trim().strip_prefix('[') else {
        parse_bail!("Block headers must start with '['.");
    };
    let Some((inner, trailing)) = inner.rsplit_once(']') else {
        parse_bail!("Unterminated block header '{}'.", line.trim());
    };
    expect_end(trailing)?;

    if let Some(rest) = match_token(inner, "require") {
        expect_end(rest)?;
        return Ok(BlockHeader::Require);
    }
    if let Some(rest) = match_token(inner, "test") {
        expect_end(rest)?;
        return Ok(BlockHeader::Test);
    }
    if let Some(rest) = match_token(inner, "preproc") {
        if let Some(rest) = match_token(rest, "fail") {
            expect_end(rest)?;
            return Ok(BlockHeader::PreprocInvalid);
        }
        expect_end(rest)?;
        return Ok(BlockHeader::Preproc);
    }
    if let Some(rest) = match_token(inner, "input layout") {
        expect_end(rest)?;
        return Ok(BlockHeader::InputLayout);
    }
    if let Some(rest) = match_token(inner, "sampler") {
        let (slot, rest) = expect_u32(rest, "sampler slot")?;
        expect_end(rest)?;
        return Ok(BlockHeader::Sampler(slot));
    }

    for shader_type in ShaderType::ALL {
        if let Some(rest) = match_token(inner, shader_type.block_name()) {
            return Ok(BlockHeader::Shader(parse_shader_header(shader_type, rest, context)?));
        }
    }

    if let Some((ty, rest)) = match_table(inner, RESOURCE_TYPES) {
        if ty == ResourceType::DepthStencil {
            expect_end(rest)?;
            return Ok(BlockHeader::Resource(ty, 0));
        }
        let (slot, rest) = expect_u32(rest, "resource slot")?;
        expect_end(rest)?;
        return Ok(BlockHeader::Resource(ty, slot));
    }

    parse_bail!("Unknown block header '{}'.", line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::SourceFormat;
    use crate::model::ShaderModel;

    fn parse(line: &str) -> Result<BlockHeader, ParseError> {
        let tags: Vec<String> = Vec::new();
        let context = QualifierContext::new(ShaderModel::Sm4_0, &tags);
        parse_block_header(line, &context)
    }

    #[test]
    fn test_simple_headers() {
        assert_eq!(parse("[require]").unwrap(), BlockHeader::Require);
        assert_eq!(parse("[test]").unwrap(), BlockHeader::Test);
        assert_eq!(parse("[preproc]").unwrap(), BlockHeader::Preproc);
        assert_eq!(parse("[preproc fail]").unwrap(), BlockHeader::PreprocInvalid);
        assert_eq!(parse("[input layout]").unwrap(), BlockHeader::InputLayout);
        assert_eq!(parse("[sampler 2]").unwrap(), BlockHeader::Sampler(2));
    }

    #[test]
    fn test_resource_headers() {
        assert_eq!(parse("[rtv 1]").unwrap(), BlockHeader::Resource(ResourceType::RenderTarget, 1));
        assert_eq!(parse("[dsv]").unwrap(), BlockHeader::Resource(ResourceType::DepthStencil, 0));
        assert_eq!(parse("[srv 0]").unwrap(), BlockHeader::Resource(ResourceType::Texture, 0));
        assert_eq!(parse("[uav 3]").unwrap(), BlockHeader::Resource(ResourceType::Uav, 3));
        assert_eq!(parse("[vb 0]").unwrap(), BlockHeader::Resource(ResourceType::VertexBuffer, 0));
        assert!(parse("[uav]").is_err());
    }

    #[test]
    fn test_shader_headers() {
        let BlockHeader::Shader(header) = parse("[pixel shader todo(sm<6) wgsl]").unwrap() else {
            panic!("not a shader header");
        };
        assert_eq!(header.shader_type, ShaderType::Pixel);
        assert_eq!(header.format, SourceFormat::Wgsl);
        assert!(header.todo.contains(ShaderModel::Sm5_0));

        let BlockHeader::Shader(header) = parse("[effect]").unwrap() else {
            panic!("not a shader header");
        };
        assert_eq!(header.shader_type, ShaderType::Effect);
    }

    #[test]
    fn test_malformed_headers() {
        assert!(parse("[tests]").is_err());
        assert!(parse("[test").is_err());
        assert!(parse("[test] extra").is_err());
        assert!(parse("[vertex shader maybe]").is_err());
    }
}

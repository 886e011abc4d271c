//! `[input layout]` block directives

use crate::error::{ParseError, parse_bail};
use crate::format::Format;
use crate::matcher::{expect_end, expect_u32, next_word};
use crate::resource::InputElement;

/// Parses `<slot> <format> <semantic-name> [<semantic-index>]`
pub fn parse_input_element(line: &str) -> Result<InputElement, ParseError> {
    let (slot, rest) = expect_u32(line, "vertex buffer slot")?;

    let Some((format_name, rest)) = next_word(rest) else {
        parse_bail!("Missing element format.");
    };
    let format: Format = format_name.parse().map_err(|e| ParseError::new(format!("{e}.")))?;
    if format == Format::Unknown {
        parse_bail!("Input elements need a concrete format.");
    }

    let Some((semantic_name, rest)) = next_word(rest) else {
        parse_bail!("Missing semantic name.");
    };

    let (semantic_index, rest) = if rest.trim().is_empty() { (0, rest) } else { expect_u32(rest, "semantic index")? };
    expect_end(rest)?;

    Ok(InputElement {
        semantic_name: semantic_name.to_string(),
        semantic_index,
        slot,
        format,
        texel_size: format.texel_size(),
    })
}

//! Resource block directives (`[rtv]`, `[dsv]`, `[srv]`, `[uav]`, `[vb]`)

use crate::error::{ParseError, parse_bail};
use crate::format::Format;
use crate::matcher::{expect_end, expect_u32, match_token, next_word, parse_u32_literal};
use crate::resource::{Dimension, ResourceParams};

/// Parses one line of a resource block into `params`
pub fn parse_resource_line(params: &mut ResourceParams, line: &str) -> Result<(), ParseError> {
    let desc = &mut params.desc;

    if let Some(rest) = match_token(line, "format") {
        if params.explicit_format && desc.format == Format::Unknown {
            parse_bail!("Format and stride are mutually exclusive.");
        }
        let Some((name, rest)) = next_word(rest) else {
            parse_bail!("Missing format name.");
        };
        expect_end(rest)?;
        let format: Format = name.parse().map_err(|e| ParseError::new(format!("{e}.")))?;
        desc.format = format;
        desc.texel_size = format.texel_size();
        params.explicit_format = true;
    } else if let Some(rest) = match_token(line, "stride") {
        if params.explicit_format && desc.format != Format::Unknown {
            parse_bail!("Format and stride are mutually exclusive.");
        }
        let (stride, rest) = expect_u32(rest, "stride")?;
        expect_end(rest)?;
        if stride == 0 {
            parse_bail!("Stride must not be zero.");
        }
        desc.format = Format::Unknown;
        desc.texel_size = stride;
        params.explicit_format = true;
    } else if let Some(rest) = match_token(line, "size") {
        parse_size(params, rest)?;
    } else if let Some(rest) = match_token(line, "levels") {
        let (levels, rest) = expect_u32(rest, "level count")?;
        expect_end(rest)?;
        if levels == 0 {
            parse_bail!("Level count must not be zero.");
        }
        desc.level_count = levels;
    } else {
        for word in line.split_whitespace() {
            let value = parse_data_word(word)?;
            params.data.extend_from_slice(&value.to_le_bytes());
        }
    }
    Ok(())
}

/// Parses a `size (kind, dims...)` argument list
fn parse_size(params: &mut ResourceParams, text: &str) -> Result<(), ParseError> {
    let Some(inner) = text.trim().strip_prefix('(').and_then(|t| t.strip_suffix(')')) else {
        parse_bail!("Malformed size '{}'.", text.trim());
    };

    let mut fields = inner.split(',').map(str::trim);
    let kind = fields.next().unwrap_or_default();
    let dims = fields
        .map(|field| parse_u32_literal(field).ok_or_else(|| ParseError::new(format!("Malformed dimension '{field}'."))))
        .collect::<Result<Vec<_>, _>>()?;

    let expect_dims = |count: usize| -> Result<(), ParseError> {
        if dims.len() != count {
            parse_bail!("Size kind '{kind}' takes {count} dimensions, got {}.", dims.len());
        }
        if dims.contains(&0) {
            parse_bail!("Resource dimensions must not be zero.");
        }
        Ok(())
    };

    let desc = &mut params.desc;
    match kind {
        "buffer" | "raw_buffer" | "counter_buffer" => {
            expect_dims(1)?;
            desc.dimension = Dimension::Buffer;
            desc.width = dims[0];
            desc.is_raw = kind == "raw_buffer";
            desc.is_uav_counter = kind == "counter_buffer";
            if desc.is_uav_counter {
                desc.format = Format::R32Uint;
                desc.texel_size = 4;
                params.explicit_format = true;
            }
        }
        "2d" => {
            expect_dims(2)?;
            desc.dimension = Dimension::Texture2d;
            (desc.width, desc.height) = (dims[0], dims[1]);
        }
        "2dms" => {
            expect_dims(3)?;
            desc.dimension = Dimension::Texture2dMs;
            (desc.sample_count, desc.width, desc.height) = (dims[0], dims[1], dims[2]);
        }
        "2darray" => {
            expect_dims(3)?;
            desc.dimension = Dimension::Texture2dArray;
            (desc.width, desc.height, desc.layer_count) = (dims[0], dims[1], dims[2]);
        }
        "3d" => {
            expect_dims(3)?;
            desc.dimension = Dimension::Texture3d;
            (desc.width, desc.height, desc.depth) = (dims[0], dims[1], dims[2]);
        }
        "cube" => {
            expect_dims(1)?;
            desc.dimension = Dimension::Cube;
            (desc.width, desc.height, desc.layer_count) = (dims[0], dims[0], 6);
        }
        _ => parse_bail!("Unknown size kind '{kind}'."),
    }
    Ok(())
}

/// Parses a numeric payload word into its 32-bit little-endian image
///
/// Words containing `.` are floats; others are integers, optionally
/// hexadecimal or negative.
fn parse_data_word(word: &str) -> Result<u32, ParseError> {
    let value = if word.contains('.') {
        word.parse::<f32>().ok().map(f32::to_bits)
    } else if let Some(negative) = word.strip_prefix('-') {
        negative.parse::<u32>().ok().and_then(|v| 0i64.checked_sub(v as i64)).and_then(|v| i32::try_from(v).ok()).map(|v| v as u32)
    } else {
        parse_u32_literal(word)
    };

    value.ok_or_else(|| ParseError::new(format!("Malformed resource data '{word}'.")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;

    fn parse(ty: ResourceType, lines: &[&str]) -> Result<ResourceParams, ParseError> {
        let mut params = ResourceParams::new(ty, 0);
        for line in lines {
            parse_resource_line(&mut params, line)?;
        }
        Ok(params)
    }

    #[test]
    fn test_size_kinds() {
        let params = parse(ResourceType::Texture, &["size ( 2d , 4 , 8 )"]).unwrap();
        assert_eq!(params.desc.dimension, Dimension::Texture2d);
        assert_eq!((params.desc.width, params.desc.height, params.desc.depth), (4, 8, 1));
        assert_eq!(params.desc.layer_count, 1);

        let params = parse(ResourceType::Texture, &["size (2dms, 4, 16, 16)"]).unwrap();
        assert_eq!(params.desc.sample_count, 4);
        assert_eq!(params.desc.width, 16);

        let params = parse(ResourceType::Texture, &["size (cube, 2)", "levels 2"]).unwrap();
        assert_eq!((params.desc.width, params.desc.height, params.desc.layer_count), (2, 2, 6));
        assert_eq!(params.desc.level_count, 2);

        let params = parse(ResourceType::Uav, &["size (counter_buffer, 1)"]).unwrap();
        assert!(params.desc.is_uav_counter);
        assert_eq!(params.desc.texel_size, 4);
        assert!(params.explicit_format);

        let params = parse(ResourceType::Uav, &["stride 12", "size (raw_buffer, 3)"]).unwrap();
        assert!(params.desc.is_raw);
        assert_eq!(params.desc.texel_size, 12);
    }

    #[test]
    fn test_format_and_stride() {
        let params = parse(ResourceType::Uav, &["format r32-uint"]).unwrap();
        assert_eq!(params.desc.format, Format::R32Uint);
        assert_eq!(params.desc.texel_size, 4);
        assert!(params.explicit_format);

        assert!(parse(ResourceType::Uav, &["stride 8", "format r32-uint"]).is_err());
        assert!(parse(ResourceType::Uav, &["format r32-uint", "stride 8"]).is_err());
        assert!(parse(ResourceType::Uav, &["format r33-uint"]).is_err());
    }

    #[test]
    fn test_payload_words() {
        let params = parse(ResourceType::Texture, &["1.0 0x10 -1", "7"]).unwrap();
        let words: Vec<u32> = params.data.chunks(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
        assert_eq!(words, vec![1.0f32.to_bits(), 16, u32::MAX, 7]);
    }

    #[test]
    fn test_malformed_lines() {
        assert!(parse(ResourceType::Texture, &["size (2d, 4)"]).is_err());
        assert!(parse(ResourceType::Texture, &["size (4d, 4, 4)"]).is_err());
        assert!(parse(ResourceType::Texture, &["size 2d, 4, 4"]).is_err());
        assert!(parse(ResourceType::Texture, &["levels 0"]).is_err());
        assert!(parse(ResourceType::Texture, &["1.0 abc"]).is_err());
    }
}

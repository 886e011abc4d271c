//! Keyword matching for directive lines
//!
//! Every directive grammar is built from the same primitive: match a keyword
//! at the start of the line, make sure it is a whole word, and hand back the
//! rest of the line. Matching never consumes input on failure.

use crate::error::{ParseError, parse_bail};
use crate::qualifier::{Qualifier, QualifierContext, parse_qualifier};

/// Returns true if `c` may directly follow a keyword
fn is_word_boundary(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ']'
}

/// Matches a single word at the start of `line` without skipping what follows
fn match_word<'a>(line: &'a str, word: &str) -> Option<&'a str> {
    let tail = line.trim_start().strip_prefix(word)?;
    match tail.chars().next() {
        None => Some(tail),
        Some(c) if is_word_boundary(c) => Some(tail),
        Some(_) => None,
    }
}

/// Matches `token` at the start of `line`
///
/// Leading whitespace is skipped. The token must be followed by the end of
/// the line, whitespace, `(` or `]`. A token made of several words matches
/// with any amount of whitespace between them.
///
/// # Returns
/// The rest of the line after the token and any trailing whitespace, or
/// `None` if the token does not match
pub fn match_token<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    match_token_raw(line, token).map(str::trim_start)
}

fn match_token_raw<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    let mut rest = line;
    for word in token.split_whitespace() {
        rest = match_word(rest, word)?;
    }
    Some(rest)
}

/// Matches `token` optionally followed by a parenthesized qualifier expression
///
/// The expression must start immediately after the token. Without one, the
/// qualifier is vacuously true for every model.
///
/// # Returns
/// `Ok(None)` if the token does not match; otherwise the evaluated qualifier
/// and the rest of the line after trailing whitespace
pub fn match_token_with_qualifier<'a>(line: &'a str, token: &str, context: &QualifierContext<'_>) -> Result<Option<(Qualifier, &'a str)>, ParseError> {
    let Some(rest) = match_token_raw(line, token) else {
        return Ok(None);
    };

    if rest.starts_with('(') {
        let (qualifier, rest) = parse_qualifier(rest, context)?;
        Ok(Some((qualifier, rest.trim_start())))
    } else {
        Ok(Some((Qualifier::ALWAYS, rest.trim_start())))
    }
}

/// Matches the longest entry of `table` at the start of `line`
///
/// Entries are compared by name length rather than table order, so a name
/// that is a word-prefix of another ("less" and "less equal") never shadows
/// the longer one.
pub fn match_table<'a, T: Copy>(line: &'a str, table: &[(&str, T)]) -> Option<(T, &'a str)> {
    table
        .iter()
        .filter_map(|(name, value)| match_token(line, name).map(|rest| (name.len(), *value, rest)))
        .max_by_key(|(len, _, _)| *len)
        .map(|(_, value, rest)| (value, rest))
}

/// Splits off the next whitespace-delimited word
pub fn next_word(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    let end = line.find(char::is_whitespace).unwrap_or(line.len());
    if end == 0 { None } else { Some((&line[..end], line[end..].trim_start())) }
}

/// Parses an unsigned integer, accepting a `0x` prefix for hexadecimal
pub fn parse_u32_literal(word: &str) -> Option<u32> {
    match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => word.parse().ok(),
    }
}

/// Parses the next word as an unsigned integer
pub fn expect_u32<'a>(line: &'a str, what: &str) -> Result<(u32, &'a str), ParseError> {
    let Some((word, rest)) = next_word(line) else {
        parse_bail!("Missing {what}.");
    };
    match parse_u32_literal(word) {
        Some(value) => Ok((value, rest)),
        None => parse_bail!("Malformed {what} '{word}'."),
    }
}

/// Parses the next word as a 32-bit float
pub fn expect_f32<'a>(line: &'a str, what: &str) -> Result<(f32, &'a str), ParseError> {
    let Some((word, rest)) = next_word(line) else {
        parse_bail!("Missing {what}.");
    };
    match word.parse() {
        Ok(value) => Ok((value, rest)),
        Err(_) => parse_bail!("Malformed {what} '{word}'."),
    }
}

/// Parses exactly `N` floats from the next words
pub fn expect_f32_array<'a, const N: usize>(mut line: &'a str, what: &str) -> Result<([f32; N], &'a str), ParseError> {
    let mut values = [0.0; N];
    for value in values.iter_mut() {
        let (parsed, rest) = expect_f32(line, what)?;
        *value = parsed;
        line = rest;
    }
    Ok((values, line))
}

/// Fails unless nothing but whitespace remains
pub fn expect_end(line: &str) -> Result<(), ParseError> {
    if line.trim().is_empty() {
        Ok(())
    } else {
        parse_bail!("Malformed trailing characters '{}'.", line.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::Capabilities;
    use crate::model::{ModelMask, ShaderModel};

    #[test]
    fn test_match_token_requires_word_boundary() {
        assert_eq!(match_token("  draw quad", "draw"), Some("quad"));
        assert_eq!(match_token("drawing", "draw"), None);
        assert_eq!(match_token("todo(sm<6)", "todo"), Some("(sm<6)"));
        assert_eq!(match_token("dsv]", "dsv"), Some("]"));
        assert_eq!(match_token("probe", "probe"), Some(""));
    }

    #[test]
    fn test_match_multi_word_token() {
        assert_eq!(match_token("shader   model >= 4.0", "shader model"), Some(">= 4.0"));
        assert_eq!(match_token("shader modelx", "shader model"), None);
    }

    #[test]
    fn test_match_table_prefers_longest_name() {
        let table = [("less", 1), ("less equal", 2), ("equal", 3)];
        assert_eq!(match_table("less equal 0.5", &table), Some((2, "0.5")));
        assert_eq!(match_table("less 0.5", &table), Some((1, "0.5")));
        assert_eq!(match_table("greater", &table), None);
    }

    #[test]
    fn test_match_token_with_qualifier() {
        let caps = Capabilities::default();
        let context = QualifierContext::new(ShaderModel::Sm5_0, &caps.tags);

        let (qualifier, rest) = match_token_with_qualifier("todo(sm>=6) draw quad", "todo", &context).unwrap().unwrap();
        assert!(!qualifier.holds);
        assert_eq!(qualifier.models, ModelMask::at_least(ShaderModel::Sm6_0));
        assert_eq!(rest, "draw quad");

        let (qualifier, rest) = match_token_with_qualifier("todo probe", "todo", &context).unwrap().unwrap();
        assert_eq!(qualifier, Qualifier::ALWAYS);
        assert_eq!(rest, "probe");

        assert!(match_token_with_qualifier("todos", "todo", &context).unwrap().is_none());
    }

    #[test]
    fn test_numeric_helpers() {
        assert_eq!(expect_u32("0x10 rest", "value").unwrap(), (16, "rest"));
        assert_eq!(expect_f32_array::<2>("1.5 -2 tail", "value").unwrap(), ([1.5, -2.0], "tail"));
        assert!(expect_u32("abc", "value").is_err());
        assert!(expect_end("  ").is_ok());
        assert!(expect_end(" x ").is_err());
    }
}

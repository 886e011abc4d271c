//! Qualifier expressions
//!
//! Qualifiers such as `todo(sm<6)`, `fail(sm>=4.0 & !msl)` or
//! `if(vulkan | d3d12)` carry a small boolean expression:
//!
//! ```text
//! expr     := disjunct ('|' disjunct)*
//! disjunct := term ('&' term)*
//! term     := 'sm>=' model | 'sm<' model | ['!'] tag
//! ```
//!
//! Evaluating an expression yields both a truth value for the current
//! runner and a mask of the shader models the expression applies to.

use crate::error::{ParseError, parse_bail};
use crate::model::{ModelMask, ShaderModel};

/// Every tag a runner may advertise
pub const KNOWN_TAGS: &[&str] = &["d3d11", "d3d12", "d3d9", "glsl", "llvmpipe", "msl", "mvk<1.2.11", "mvk", "opengl", "vulkan", "warp", "wgpu"];

/// What a qualifier expression is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct QualifierContext<'a> {
    /// Lowest shader model of the current session range
    pub minimum_model: ShaderModel,
    /// Tags advertised by the runner
    pub tags: &'a [String],
}

impl<'a> QualifierContext<'a> {
    /// Creates a new evaluation context
    pub fn new(minimum_model: ShaderModel, tags: &'a [String]) -> Self {
        Self { minimum_model, tags }
    }

    fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Result of evaluating a qualifier expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qualifier {
    /// Truth value of the expression for the current runner
    pub holds: bool,
    /// Models the expression applies to, ignoring tags
    pub models: ModelMask,
    /// Models covered by disjuncts whose tag terms all hold
    pub gated: ModelMask,
}

impl Qualifier {
    /// The value of an absent expression
    pub const ALWAYS: Qualifier = Qualifier {
        holds: true,
        models: ModelMask::ALL,
        gated: ModelMask::ALL,
    };
}

/// Matches the longest known tag at the start of `input`
fn match_tag(input: &str) -> Option<(&'static str, &str)> {
    let mut tags = KNOWN_TAGS.to_vec();
    tags.sort_by_key(|tag| std::cmp::Reverse(tag.len()));

    tags.into_iter().find_map(|tag| {
        let rest = input.strip_prefix(tag)?;
        match rest.chars().next() {
            Some(c) if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '<' => None,
            _ => Some((tag, rest)),
        }
    })
}

/// Parses the model literal following `sm>=` or `sm<`
fn parse_model(input: &str) -> Result<(ShaderModel, &str), ParseError> {
    let end = input.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(input.len());
    let (literal, rest) = input.split_at(end);
    match literal.parse() {
        Ok(model) => Ok((model, rest)),
        Err(e) => parse_bail!("Invalid shader model '{literal}' in qualifier: {e}."),
    }
}

/// Parses and evaluates one conjunction of terms
///
/// # Returns
/// (holds, model mask, tag terms hold, rest of input)
fn parse_disjunct<'a>(mut input: &'a str, context: &QualifierContext<'_>) -> Result<(bool, ModelMask, bool, &'a str), ParseError> {
    let mut holds = true;
    let mut tags_hold = true;
    let mut models = ModelMask::ALL;

    loop {
        input = input.trim_start();

        if let Some(rest) = input.strip_prefix("sm>=") {
            let (model, rest) = parse_model(rest)?;
            holds &= context.minimum_model >= model;
            models &= ModelMask::at_least(model);
            input = rest;
        } else if let Some(rest) = input.strip_prefix("sm<") {
            let (model, rest) = parse_model(rest)?;
            if model == ShaderModel::MIN {
                parse_bail!("Qualifier 'sm<{model}' can never hold.");
            }
            holds &= context.minimum_model < model;
            models &= ModelMask::below(model);
            input = rest;
        } else {
            let (negate, rest) = match input.strip_prefix('!') {
                Some(rest) => (true, rest.trim_start()),
                None => (false, input),
            };
            let Some((tag, rest)) = match_tag(rest) else {
                let word: String = rest.chars().take_while(|c| !matches!(c, ')' | '&' | '|') && !c.is_whitespace()).collect();
                parse_bail!("Unknown qualifier term '{word}'.");
            };
            let present = context.has_tag(tag) != negate;
            holds &= present;
            tags_hold &= present;
            input = rest;
        }

        input = input.trim_start();
        match input.strip_prefix('&') {
            Some(rest) => input = rest,
            None => return Ok((holds, models, tags_hold, input)),
        }
    }
}

/// Parses and evaluates a parenthesized qualifier expression
///
/// # Arguments
/// * `input` - Text starting at the opening parenthesis
/// * `context` - Runner state the expression is evaluated against
///
/// # Returns
/// The evaluated qualifier and the text after the closing parenthesis
pub fn parse_qualifier<'a>(input: &'a str, context: &QualifierContext<'_>) -> Result<(Qualifier, &'a str), ParseError> {
    let Some(mut input) = input.strip_prefix('(') else {
        parse_bail!("Expected '(' to open a qualifier expression.");
    };

    let mut qualifier = Qualifier {
        holds: false,
        models: ModelMask::EMPTY,
        gated: ModelMask::EMPTY,
    };

    loop {
        let (holds, models, tags_hold, rest) = parse_disjunct(input, context)?;
        qualifier.holds |= holds;
        qualifier.models |= models;
        if tags_hold {
            qualifier.gated |= models;
        }

        if let Some(rest) = rest.strip_prefix('|') {
            input = rest;
        } else if let Some(rest) = rest.strip_prefix(')') {
            return Ok((qualifier, rest));
        } else {
            parse_bail!("Malformed qualifier expression near '{}'.", rest.trim());
        }
    }
}

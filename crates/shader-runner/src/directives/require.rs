//! `[require]` block directives

use crate::caps::{CAP_NAMES, Cap, Capabilities, FormatCaps};
use crate::compiler::{COMPILE_OPTION_NAMES, CompileOptions};
use crate::error::{ParseError, parse_bail};
use crate::format::Format;
use crate::matcher::{expect_end, match_table, match_token, next_word};
use crate::model::ShaderModel;

/// Requirements collected from one `[require]` block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequireBlock {
    minimum_model: Option<ShaderModel>,
    /// Models at or above this are excluded
    below_model: Option<ShaderModel>,
    options: CompileOptions,
    caps: Vec<Cap>,
    format_caps: Vec<(Format, FormatCaps)>,
}

/// Session settings a `[require]` block resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirements {
    pub minimum_model: ShaderModel,
    /// `None` if the block excludes every model
    pub maximum_model: Option<ShaderModel>,
    pub options: CompileOptions,
    /// Requirements the capabilities do not meet
    pub unmet: Vec<String>,
}

impl Requirements {
    /// Why tests under these requirements must be skipped, if they must
    pub fn skip_reason(&self) -> Option<String> {
        match self.maximum_model {
            Some(max) if max >= self.minimum_model => {}
            _ => return Some("no supported shader model in the required range".to_string()),
        }
        if self.unmet.is_empty() { None } else { Some(format!("missing {}", self.unmet.join(", "))) }
    }
}

impl RequireBlock {
    /// Parses one line of a `[require]` block
    pub fn parse_line(&mut self, line: &str) -> Result<(), ParseError> {
        if let Some(rest) = match_token(line, "shader model >=") {
            self.minimum_model = Some(parse_model(rest)?);
        } else if let Some(rest) = match_token(line, "shader model <") {
            let model = parse_model(rest)?;
            if model == ShaderModel::MIN {
                parse_bail!("Shader model < {model} excludes every model.");
            }
            self.below_model = Some(model);
        } else if let Some(mut rest) = match_token(line, "options:") {
            self.options = CompileOptions::empty();
            while let Some((word, tail)) = next_word(rest) {
                let Some((_, option)) = COMPILE_OPTION_NAMES.iter().find(|(name, _)| *name == word) else {
                    parse_bail!("Unknown compile option '{word}'.");
                };
                self.options |= *option;
                rest = tail;
            }
        } else if let Some(rest) = match_token(line, "format") {
            let Some((name, rest)) = next_word(rest) else {
                parse_bail!("Missing format name.");
            };
            let format: Format = name.parse().map_err(|e| ParseError::new(format!("{e}.")))?;
            let Some(rest) = match_token(rest, "uav-load") else {
                parse_bail!("Unknown format capability '{}'.", rest.trim());
            };
            expect_end(rest)?;
            self.format_caps.push((format, FormatCaps::UAV_LOAD));
        } else if let Some((cap, rest)) = match_table(line, CAP_NAMES) {
            expect_end(rest)?;
            self.caps.push(cap);
        } else {
            parse_bail!("Unknown require directive '{}'.", line.trim());
        }
        Ok(())
    }

    /// Resolves the block against a runner's capabilities
    pub fn evaluate(&self, caps: &Capabilities) -> Requirements {
        let minimum_model = self.minimum_model.map_or(caps.minimum_model, |model| model.max(caps.minimum_model));
        let maximum_model = match self.below_model {
            Some(below) => below.prev().map(|model| model.min(caps.maximum_model)),
            None => Some(caps.maximum_model),
        };

        let mut unmet: Vec<String> = self.caps.iter().filter(|cap| !caps.has(**cap)).map(|cap| cap.to_string()).collect();
        unmet.extend(
            self.format_caps
                .iter()
                .filter(|(format, required)| !caps.format_caps(*format).contains(*required))
                .map(|(format, _)| format!("{format} uav-load")),
        );

        Requirements {
            minimum_model,
            maximum_model,
            options: self.options,
            unmet,
        }
    }
}

fn parse_model(text: &str) -> Result<ShaderModel, ParseError> {
    let Some((word, rest)) = next_word(text) else {
        parse_bail!("Missing shader model.");
    };
    expect_end(rest)?;
    word.parse().map_err(|e| ParseError::new(format!("{e} '{word}'.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(lines: &[&str]) -> RequireBlock {
        let mut block = RequireBlock::default();
        for line in lines {
            block.parse_line(line).unwrap();
        }
        block
    }

    #[test]
    fn test_model_range() {
        let caps = Capabilities::default();
        let requirements = parse(&["shader model >= 4.0", "shader model < 6.0"]).evaluate(&caps);
        assert_eq!(requirements.minimum_model, ShaderModel::Sm4_0);
        assert_eq!(requirements.maximum_model, Some(ShaderModel::Sm5_1));
        assert!(requirements.skip_reason().is_none());
    }

    #[test]
    fn test_disjoint_range_is_skipped() {
        let caps = Capabilities::default();
        let requirements = parse(&["shader model >= 6.0", "shader model < 4.0"]).evaluate(&caps);
        assert!(requirements.skip_reason().is_some());
    }

    #[test]
    fn test_range_is_clamped_to_capabilities() {
        let caps = Capabilities {
            minimum_model: ShaderModel::Sm4_0,
            maximum_model: ShaderModel::Sm5_1,
            ..Default::default()
        };
        let requirements = parse(&["shader model >= 2.0"]).evaluate(&caps);
        assert_eq!(requirements.minimum_model, ShaderModel::Sm4_0);
        assert_eq!(requirements.maximum_model, Some(ShaderModel::Sm5_1));

        let requirements = parse(&["shader model >= 6.0"]).evaluate(&caps);
        assert!(requirements.skip_reason().is_some());
    }

    #[test]
    fn test_shader_model_below_lowest_is_fatal() {
        assert!(RequireBlock::default().parse_line("shader model < 2.0").is_err());
    }

    #[test]
    fn test_caps_and_options() {
        let mut caps = Capabilities::default();
        caps.caps.insert(Cap::Float64);
        caps.format_caps.insert(Format::R32Uint, FormatCaps::UAV_LOAD);

        let block = parse(&["float64", "int64", "format r32-uint uav-load", "format r16-uint uav-load", "options: backcompat", "options: row-major child-effect"]);
        let requirements = block.evaluate(&caps);

        assert_eq!(requirements.options, CompileOptions::ROW_MAJOR | CompileOptions::CHILD_EFFECT);
        assert_eq!(requirements.unmet, vec!["int64".to_string(), "r16-uint uav-load".to_string()]);
        assert_eq!(requirements.skip_reason().unwrap(), "missing int64, r16-uint uav-load");
    }

    #[test]
    fn test_malformed_directives() {
        let mut block = RequireBlock::default();
        assert!(block.parse_line("float128").is_err());
        assert!(block.parse_line("options: fast-math").is_err());
        assert!(block.parse_line("format r32-uint uav-store").is_err());
        assert!(block.parse_line("shader model >= 4.0 extra").is_err());
    }
}

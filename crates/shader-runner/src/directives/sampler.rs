//! `[sampler]` block directives

use crate::error::{ParseError, parse_bail};
use crate::matcher::{expect_end, match_table, match_token};
use crate::resource::{ADDRESS_MODES, COMPARISON_FUNCS, FilterMode, SamplerDesc};

const FILTER_MODES: &[(&str, FilterMode)] = &[("point", FilterMode::Point), ("linear", FilterMode::Linear)];

/// Parses one line of a sampler block into `sampler`
pub fn parse_sampler_line(sampler: &mut SamplerDesc, line: &str) -> Result<(), ParseError> {
    if let Some(mut rest) = match_token(line, "address") {
        for address in sampler.address.iter_mut() {
            let Some((mode, tail)) = match_table(rest, ADDRESS_MODES) else {
                parse_bail!("Malformed address mode '{}'.", rest.trim());
            };
            *address = mode;
            rest = tail;
        }
        expect_end(rest)?;
    } else if let Some(mut rest) = match_token(line, "filter") {
        let mut modes = [FilterMode::Point; 3];
        for mode in modes.iter_mut() {
            let Some((parsed, tail)) = match_table(rest, FILTER_MODES) else {
                parse_bail!("Malformed filter mode '{}'.", rest.trim());
            };
            *mode = parsed;
            rest = tail;
        }
        expect_end(rest)?;
        sampler.filter.min = modes[0];
        sampler.filter.mag = modes[1];
        sampler.filter.mip = modes[2];
        sampler.filter.comparison = sampler.func.is_some();
    } else if let Some(rest) = match_token(line, "comparison") {
        let Some((func, rest)) = match_table(rest, COMPARISON_FUNCS) else {
            parse_bail!("Unknown comparison function '{}'.", rest.trim());
        };
        expect_end(rest)?;
        sampler.func = Some(func);
        sampler.filter.comparison = true;
    } else {
        parse_bail!("Unknown sampler directive '{}'.", line.trim());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{AddressMode, ComparisonFunc};

    #[test]
    fn test_address_and_filter() {
        let mut sampler = SamplerDesc::new(0);
        parse_sampler_line(&mut sampler, "address wrap mirror_once border").unwrap();
        parse_sampler_line(&mut sampler, "filter linear point linear").unwrap();

        assert_eq!(sampler.address, [AddressMode::Wrap, AddressMode::MirrorOnce, AddressMode::Border]);
        assert_eq!(sampler.filter.min, FilterMode::Linear);
        assert_eq!(sampler.filter.mag, FilterMode::Point);
        assert_eq!(sampler.filter.mip, FilterMode::Linear);
        assert!(!sampler.filter.comparison);
    }

    #[test]
    fn test_comparison_switches_reduction() {
        let mut sampler = SamplerDesc::new(1);
        parse_sampler_line(&mut sampler, "comparison less equal").unwrap();
        assert_eq!(sampler.func, Some(ComparisonFunc::LessEqual));
        assert!(sampler.filter.comparison);

        parse_sampler_line(&mut sampler, "filter linear linear point").unwrap();
        assert!(sampler.filter.comparison);
    }

    #[test]
    fn test_malformed_lines() {
        let mut sampler = SamplerDesc::new(0);
        assert!(parse_sampler_line(&mut sampler, "address wrap wrap").is_err());
        assert!(parse_sampler_line(&mut sampler, "filter linear linear anisotropic").is_err());
        assert!(parse_sampler_line(&mut sampler, "comparison sometimes").is_err());
        assert!(parse_sampler_line(&mut sampler, "lod bias 1.0").is_err());
    }
}

//! The wire text protocol's grammar: `name ':' value '|' type
//! [ '|@' sampleRate ]` (spec.md §6). A single linear pass over the
//! line with no backtracking — a hand-written scanner rather than a
//! parser-combinator crate, since the grammar has no recursive
//! structure to amortize one over.

use metricsd_core::{Error, Result};
use metricsd_registry::Family;

use crate::validate::validate_name;

/// One successfully parsed measurement, ready for `Engine::inject`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMetric {
    pub name: String,
    pub family: Family,
    pub value: f64,
    pub sample_rate: f64,
}

fn family_from_token(token: &str) -> Option<Family> {
    match token {
        "c" => Some(Family::Counter),
        "g" => Some(Family::Gauge),
        "a" => Some(Family::Averager),
        "ms" => Some(Family::Timer),
        "ac" => Some(Family::Accumulator),
        "m" => Some(Family::Meter),
        _ => None,
    }
}

/// Parses one line of the wire protocol. Blank lines are the caller's
/// concern to skip before calling this (spec.md §6: "blank lines
/// between metrics are allowed and ignored").
pub fn parse_line(line: &str) -> Result<ParsedMetric> {
    if line.is_empty() {
        return Err(Error::NoName);
    }

    let (name, rest) = line.split_once(':').ok_or(Error::NoValue)?;
    if name.is_empty() {
        return Err(Error::NoName);
    }
    validate_name(name)?;

    let mut fields = rest.split('|');

    let value_str = fields.next().filter(|s| !s.is_empty()).ok_or(Error::NoValue)?;
    let value: f64 = value_str
        .parse()
        .map_err(|_| Error::ValueInvalid(value_str.to_string()))?;

    let type_str = fields.next().filter(|s| !s.is_empty()).ok_or(Error::NoType)?;
    let family = family_from_token(type_str).ok_or_else(|| Error::TypeInvalid(type_str.to_string()))?;

    let mut sample_rate = 1.0;
    if let Some(sr_field) = fields.next() {
        let sr_str = sr_field
            .strip_prefix('@')
            .ok_or_else(|| Error::SamplingInvalid(sr_field.to_string()))?;
        if sr_str.is_empty() {
            return Err(Error::NoSampling);
        }
        let sr: f64 = sr_str
            .parse()
            .map_err(|_| Error::SamplingInvalid(sr_str.to_string()))?;
        if !(sr > 0.0) {
            return Err(Error::SamplingInvalid(sr_str.to_string()));
        }
        sample_rate = sr;
    }

    if fields.next().is_some() {
        return Err(Error::invalid("trailing fields after sample rate"));
    }

    Ok(ParsedMetric {
        name: name.to_string(),
        family,
        value,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_counter_with_sample_rate() {
        let m = parse_line("test:1.5|c|@0.1").unwrap();
        assert_eq!(m.name, "test");
        assert_eq!(m.family, Family::Counter);
        assert_eq!(m.value, 1.5);
        assert_eq!(m.sample_rate, 0.1);
    }

    #[test]
    fn defaults_sample_rate_to_one() {
        let m = parse_line("test:1.5|c").unwrap();
        assert_eq!(m.sample_rate, 1.0);
    }

    #[test]
    fn parses_every_family_token() {
        assert_eq!(parse_line("n:1|c").unwrap().family, Family::Counter);
        assert_eq!(parse_line("n:1|g").unwrap().family, Family::Gauge);
        assert_eq!(parse_line("n:1|a").unwrap().family, Family::Averager);
        assert_eq!(parse_line("n:1|ms").unwrap().family, Family::Timer);
        assert_eq!(parse_line("n:1|ac").unwrap().family, Family::Accumulator);
        assert_eq!(parse_line("n:1|m").unwrap().family, Family::Meter);
    }

    #[test]
    fn rejects_empty_line() {
        assert!(matches!(parse_line(""), Err(Error::NoName)));
    }

    #[test]
    fn rejects_missing_colon() {
        assert!(matches!(parse_line("test"), Err(Error::NoValue)));
    }

    #[test]
    fn rejects_missing_value() {
        assert!(matches!(parse_line("test:"), Err(Error::NoValue)));
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(parse_line("test:1.5|xyz"), Err(Error::TypeInvalid(_))));
    }

    #[test]
    fn rejects_zero_sample_rate() {
        assert!(matches!(parse_line("test:1.5|c|@0"), Err(Error::SamplingInvalid(_))));
    }

    #[test]
    fn rejects_invalid_name() {
        assert!(matches!(parse_line("te/st:1.5|c"), Err(Error::NameInvalid(_))));
    }
}

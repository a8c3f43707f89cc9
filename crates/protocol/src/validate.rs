//! Metric name validation, shared by the wire parser and by entry
//! creation inside the engine (spec.md §9 "name validation
//! convergence").

use metricsd_core::{Error, Result};

/// Rejects empty names and any byte `< 0x20` or one of `/ \ " :`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::NoName);
    }
    for b in name.bytes() {
        if b < 0x20 || matches!(b, b'/' | b'\\' | b'"' | b':') {
            return Err(Error::NameInvalid(name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_name() {
        assert!(validate_name("app.requests").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(validate_name(""), Err(Error::NoName)));
    }

    #[test]
    fn rejects_forbidden_bytes() {
        for bad in ["te/st", "te\\st", "te\"st", "te:st", "te\nst"] {
            assert!(matches!(validate_name(bad), Err(Error::NameInvalid(_))), "{bad:?} should be rejected");
        }
    }
}

//! Call trace flags and filter
//!
//! The `trace` option is a string of flag characters, one per traced event:
//! `n` for native calls, `p` for public calls, `f` for script function entry.
//! The `trace_filter` option is a regular expression; only trace lines it
//! matches somewhere are logged.

use crate::{ConfigError, ConfigResult};
use regex::Regex;
use std::fmt;

/// Which call events are written to the log while scripts run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceFlags {
    pub natives: bool,
    pub publics: bool,
    pub functions: bool,
}

impl TraceFlags {
    /// No tracing
    pub const NONE: TraceFlags = TraceFlags {
        natives: false,
        publics: false,
        functions: false,
    };

    /// Parse a flag string such as `"np"`
    ///
    /// Whitespace is ignored. Any other character is rejected.
    pub fn parse(s: &str) -> ConfigResult<Self> {
        let mut flags = Self::NONE;
        for c in s.chars() {
            match c {
                'n' => flags.natives = true,
                'p' => flags.publics = true,
                'f' => flags.functions = true,
                c if c.is_whitespace() => {}
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: "trace".to_string(),
                        reason: format!("unknown trace flag '{}' (expected n, p or f)", other),
                    })
                }
            }
        }
        Ok(flags)
    }

    /// True if any event is traced
    pub fn any(&self) -> bool {
        self.natives || self.publics || self.functions
    }
}

impl fmt::Display for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.natives {
            f.write_str("n")?;
        }
        if self.publics {
            f.write_str("p")?;
        }
        if self.functions {
            f.write_str("f")?;
        }
        Ok(())
    }
}

/// Compiled `trace_filter` pattern
#[derive(Debug, Clone)]
pub struct TraceFilter(Regex);

impl TraceFilter {
    pub fn parse(pattern: &str) -> ConfigResult<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|e| ConfigError::InvalidValue {
                field: "trace_filter".to_string(),
                reason: e.to_string(),
            })
    }

    /// True if the pattern matches anywhere in `line`
    pub fn matches(&self, line: &str) -> bool {
        self.0.is_match(line)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for TraceFilter {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Display for TraceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("", TraceFlags::NONE)]
    #[case("n", TraceFlags { natives: true, publics: false, functions: false })]
    #[case("p", TraceFlags { natives: false, publics: true, functions: false })]
    #[case("f", TraceFlags { natives: false, publics: false, functions: true })]
    #[case("fpn", TraceFlags { natives: true, publics: true, functions: true })]
    #[case(" n p ", TraceFlags { natives: true, publics: true, functions: false })]
    fn test_parse_flags(#[case] input: &str, #[case] expected: TraceFlags) {
        assert_eq!(TraceFlags::parse(input).unwrap(), expected);
    }

    #[test]
    fn test_each_flag_is_independent() {
        // 'n' alone must not switch on publics or functions
        let flags = TraceFlags::parse("n").unwrap();
        assert!(!flags.publics);
        assert!(!flags.functions);
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let err = TraceFlags::parse("nx").unwrap_err();
        assert!(err.to_string().contains("unknown trace flag 'x'"));
    }

    #[test]
    fn test_display_roundtrip() {
        let flags = TraceFlags::parse("fn").unwrap();
        assert_eq!(flags.to_string(), "nf");
        assert!(flags.any());
        assert!(!TraceFlags::NONE.any());
    }

    #[rstest]
    #[case("Set", "native SetTimer ()", true)]
    #[case("^native", "native SetTimer ()", true)]
    #[case("^public", "native SetTimer ()", false)]
    #[case("OnPlayer(Connect|Spawn)", "public OnPlayerSpawn (playerid=0)", true)]
    fn test_filter_matches_anywhere(
        #[case] pattern: &str,
        #[case] line: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(TraceFilter::parse(pattern).unwrap().matches(line), expected);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let err = TraceFilter::parse("On(Player").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "trace_filter"));
    }
}

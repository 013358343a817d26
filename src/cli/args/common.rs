//! Common CLI types shared across commands

use std::str::FromStr;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty format - human-optimized rich formatting
    #[default]
    Pretty,
    /// Table format - one row per entry
    Table,
    /// JSON format - structured for scripts
    Json,
}

/// A `Name: value` request header given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderArg {
    pub name: String,
    pub value: String,
}

impl FromStr for HeaderArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once(':')
            .ok_or_else(|| format!("expected 'Name: value', got '{}'", s))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("empty header name in '{}'", s));
        }
        Ok(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_arg_parse() {
        let h: HeaderArg = "Content-Type: application/json".parse().unwrap();
        assert_eq!(h.name, "Content-Type");
        assert_eq!(h.value, "application/json");
    }

    #[test]
    fn test_header_arg_keeps_colons_in_value() {
        let h: HeaderArg = "X-Ref:http://a:1".parse().unwrap();
        assert_eq!(h.value, "http://a:1");
    }

    #[test]
    fn test_header_arg_rejects_missing_colon() {
        assert!("Accept".parse::<HeaderArg>().is_err());
        assert!(": x".parse::<HeaderArg>().is_err());
    }
}

//! Argument parsing helpers shared by CLI commands.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Parse repeated `name=value` pairs into a map. The value may itself
/// contain `=`; only the first one splits.
pub fn parse_key_value_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(Error::validation_invalid_argument(
                "param",
                format!("Expected name=value, got '{}'", pair),
                None,
                None,
            ));
        };
        if name.is_empty() {
            return Err(Error::validation_invalid_argument(
                "param",
                format!("Empty parameter name in '{}'", pair),
                None,
                None,
            ));
        }
        map.insert(name.to_string(), value.to_string());
    }
    Ok(map)
}

/// Expand a user-supplied path, resolving a leading tilde.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_and_keeps_equals_in_values() {
        let pairs = vec![
            "port=8080".to_string(),
            "connection=host=db;user=admin".to_string(),
        ];
        let map = parse_key_value_pairs(&pairs).unwrap();
        assert_eq!(map.get("port").map(String::as_str), Some("8080"));
        assert_eq!(
            map.get("connection").map(String::as_str),
            Some("host=db;user=admin")
        );
    }

    #[test]
    fn rejects_missing_separator() {
        let err = parse_key_value_pairs(&["port".to_string()]).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ValidationInvalidArgument);
    }

    #[test]
    fn rejects_empty_name() {
        assert!(parse_key_value_pairs(&["=value".to_string()]).is_err());
    }
}

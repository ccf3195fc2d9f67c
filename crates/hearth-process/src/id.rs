//! Instance identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SupervisorError};

/// Longest identifier kept after sanitizing
const MAX_ID_LEN: usize = 128;

/// Stable identifier of a managed instance
///
/// Always sanitized: only ASCII alphanumerics, `_` and `-`, at most 128
/// characters, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Sanitize an externally supplied identifier
    pub fn parse(raw: &str) -> Result<Self> {
        let id = sanitize_instance_id(raw);
        if id.is_empty() {
            return Err(SupervisorError::InvalidId(raw.to_string()));
        }
        Ok(Self(id))
    }

    /// Allocate a fresh `server_xxxxxxxx` identifier
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("server_{}", &hex[..8]))
    }

    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trim, replace anything outside `[A-Za-z0-9_-]` with `_`, cap the length
pub fn sanitize_instance_id(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_ID_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_path_characters() {
        assert_eq!(sanitize_instance_id("  ../etc/passwd "), "___etc_passwd");
        assert_eq!(sanitize_instance_id("survival-1_b"), "survival-1_b");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "a".repeat(300);
        assert_eq!(sanitize_instance_id(&long).len(), MAX_ID_LEN);
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert!(matches!(
            InstanceId::parse("   "),
            Err(SupervisorError::InvalidId(_))
        ));
    }

    #[test]
    fn test_generate_shape() {
        let id = InstanceId::generate();
        assert!(id.as_str().starts_with("server_"));
        assert_eq!(id.as_str().len(), "server_".len() + 8);
        assert_eq!(InstanceId::parse(id.as_str()).unwrap(), id);
    }
}

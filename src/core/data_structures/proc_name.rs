/*!
 * Process Names
 * Bounded inline strings for descriptor names
 */

use crate::core::limits::PROC_NAME_MAX;
use serde::{Deserialize, Serialize};
use smartstring::alias::String as SmartString;
use std::fmt;

/// Descriptor name, truncated to `PROC_NAME_MAX` bytes on construction
///
/// # Performance
///
/// Names never exceed the inline threshold of `SmartString`, so copying a
/// name between a process and its threads never allocates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ProcName {
    inner: SmartString,
}

impl ProcName {
    /// Create an empty name (unused slots)
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: SmartString::new(),
        }
    }

    /// Get string slice
    #[inline(always)]
    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Clear name when the slot is reclaimed
    #[inline]
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl Default for ProcName {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ProcName {
    fn from(s: &str) -> Self {
        let mut end = s.len().min(PROC_NAME_MAX);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        Self {
            inner: SmartString::from(&s[..end]),
        }
    }
}

impl From<String> for ProcName {
    #[inline]
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl AsRef<str> for ProcName {
    #[inline(always)]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ProcName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name_kept() {
        let name = ProcName::from("initcode");
        assert_eq!(name.as_str(), "initcode");
    }

    #[test]
    fn test_long_name_truncated() {
        let name = ProcName::from("a-very-long-process-name");
        assert_eq!(name.as_str().len(), PROC_NAME_MAX);
        assert_eq!(name.as_str(), "a-very-long-proc");
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        let name = ProcName::from("ééééééééé");
        assert!(name.as_str().len() <= PROC_NAME_MAX);
        assert!(name.as_str().chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_serialization() {
        let name = ProcName::from("sh");
        let json = serde_json::to_string(&name).unwrap();
        let back: ProcName = serde_json::from_str(&json).unwrap();
        assert_eq!(name, back);
    }
}

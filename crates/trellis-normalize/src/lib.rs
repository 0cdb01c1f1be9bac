//! Normalized names for packages, extras and dependency groups.
//!
//! All three name kinds share the same normalization: the name is lowercased
//! and every run of `-`, `_` and `.` is collapsed into a single `-`.
//!
//! See: <https://packaging.python.org/en/latest/specifications/name-normalization/>

use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

pub use extra_name::ExtraName;
pub use group_name::{GroupName, MAIN_GROUP};
pub use package_name::PackageName;

mod extra_name;
mod group_name;
mod package_name;

/// Validate and normalize an owned or borrowed name, e.g. a package or extra name.
fn validate_and_normalize(name: &str) -> Result<String, InvalidNameError> {
    let mut normalized = String::with_capacity(name.len());
    let mut last = None;
    for char in name.bytes() {
        match char {
            b'A'..=b'Z' => {
                normalized.push(char.to_ascii_lowercase() as char);
            }
            b'a'..=b'z' | b'0'..=b'9' => {
                normalized.push(char as char);
            }
            b'-' | b'_' | b'.' => {
                // Names can't start with punctuation.
                if last.is_none() {
                    return Err(InvalidNameError(name.to_string()));
                }
                if !matches!(last, Some(b'-' | b'_' | b'.')) {
                    normalized.push('-');
                }
            }
            _ => {
                return Err(InvalidNameError(name.to_string()));
            }
        }
        last = Some(char);
    }
    // Names can't end with punctuation.
    if matches!(last, None | Some(b'-' | b'_' | b'.')) {
        return Err(InvalidNameError(name.to_string()));
    }
    Ok(normalized)
}

/// Invalid [`PackageName`], [`ExtraName`] or [`GroupName`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidNameError(String);

impl InvalidNameError {
    /// Returns the invalid name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Not a valid package or extra name: \"{}\". Names must start and end with a letter or \
            digit and may only contain -, _, ., and alphanumeric characters.",
            self.0
        )
    }
}

impl Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize() {
        let inputs = [
            "friendly-bard",
            "Friendly-Bard",
            "FRIENDLY-BARD",
            "friendly.bard",
            "friendly_bard",
            "friendly--bard",
            "FrIeNdLy-._.-bArD",
        ];
        for input in inputs {
            assert_eq!(validate_and_normalize(input).unwrap(), "friendly-bard");
        }
    }

    #[test]
    fn unchanged() {
        // Already normalized.
        let unchanged = ["click", "8.8.8", "exclam-1"];
        for input in unchanged {
            assert_eq!(validate_and_normalize(input).unwrap(), input);
        }
    }

    #[test]
    fn failures() {
        let failures = [
            " starts-with-space",
            "-starts-with-dash",
            "ends-with-dash-",
            "ends-with-space ",
            "includes!invalid-char",
            "space in middle",
            "alpha-α",
            "",
        ];
        for input in failures {
            assert!(validate_and_normalize(input).is_err());
        }
    }
}

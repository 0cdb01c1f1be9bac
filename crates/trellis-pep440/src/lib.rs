//! A library for python version numbers and the constraint algebra on top of
//! them, following the
//! [version specifiers spec](https://packaging.python.org/en/latest/specifications/version-specifiers/)
//! for parsing and ordering, with the caret/tilde/wildcard shorthand grammar
//! commonly found in declarative manifests layered on top.
//!
//! ```rust
//! use std::str::FromStr;
//! use trellis_pep440::{Version, VersionRange};
//!
//! let range = VersionRange::from_str("^1.19").unwrap();
//! assert!(range.contains(&Version::from_str("1.21.3").unwrap()));
//! assert!(!range.contains(&Version::from_str("2.0").unwrap()));
//! ```

pub use version::{
    AmbiguousBumpError, LocalSegment, Prerelease, PrereleaseKind, Version, VersionParseError,
    VersionPattern,
};
pub use version_range::{ConstraintParseError, VersionRange};
pub use version_specifier::{
    Operator, VersionSpecifier, VersionSpecifierParseError, VersionSpecifiers,
};

mod version;
mod version_range;
mod version_specifier;

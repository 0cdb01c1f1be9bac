//! A parser and serializer for
//! [dependency specifiers](https://packaging.python.org/en/latest/specifications/dependency-specifiers/),
//! as originally specified in PEP 508, together with the environment marker
//! model.
//!
//! A specifier has a name, optional extras, either a version constraint list
//! or a direct URL, and an optional environment marker:
//!
//! ```text
//! requests[security] (>=2.13,<3.0) ; python_version >= "3.8"
//! ```

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use trellis_normalize::{ExtraName, PackageName};
use trellis_pep440::{VersionSpecifier, VersionSpecifiers};

pub use marker::{
    MarkerEnvironment, MarkerExpression, MarkerKey, MarkerOperator, MarkerTree,
};

mod cursor;
mod marker;

use cursor::Cursor;

/// An error with a span attached, pretty-printed with the offending input
/// underlined.
#[derive(Debug)]
pub struct RequirementParseError {
    /// The description of the failure.
    pub message: RequirementParseErrorKind,
    /// Span start index.
    pub start: usize,
    /// Span length.
    pub len: usize,
    /// The input string so we can print it underlined.
    pub input: String,
}

/// Either an error string from our parser or an upstream error from `url`.
#[derive(Debug, thiserror::Error)]
pub enum RequirementParseErrorKind {
    /// An error from our parser.
    #[error("{0}")]
    String(String),
    /// A URL parsing error.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl Display for RequirementParseError {
    /// Pretty formatting with underline.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let start_offset = self.input[..self.start.min(self.input.len())].chars().count();
        let underline_len = if self.start >= self.input.len() {
            1
        } else {
            self.input[self.start..(self.start + self.len).min(self.input.len())]
                .chars()
                .count()
                .max(1)
        };
        write!(
            f,
            "{}\n{}\n{}{}",
            self.message,
            self.input,
            " ".repeat(start_offset),
            "^".repeat(underline_len)
        )
    }
}

impl std::error::Error for RequirementParseError {}

/// A dependency specifier such as
/// `requests[security] (>=2.13,<3.0) ; python_version >= "3.8"`.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Requirement {
    /// The distribution name such as `requests`.
    pub name: PackageName,
    /// The list of extras such as `security` in `requests[security]`.
    pub extras: Vec<ExtraName>,
    /// The version specifiers or the direct URL, if any.
    pub version_or_url: Option<VersionOrUrl>,
    /// The marker gating the dependency's applicability, if any.
    pub marker: Option<MarkerTree>,
}

impl Requirement {
    /// Whether the dependency applies in the given environment with the given
    /// activated extras.
    pub fn evaluate_markers(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        self.marker
            .as_ref()
            .map_or(true, |marker| marker.evaluate(env, extras))
    }

    /// Return the requirement with an additional `extra == "<name>"` marker
    /// conjunct, as used when expanding extras into core metadata.
    #[must_use]
    pub fn with_extra_marker(self, extra: &ExtraName) -> Self {
        let extra_expression = MarkerTree::Expression(MarkerExpression {
            key: MarkerKey::Extra,
            operator: MarkerOperator::Equal,
            value: extra.to_string(),
        });
        let marker = match self.marker {
            Some(marker) => MarkerTree::and_of([marker, extra_expression]),
            None => extra_expression,
        };
        Self {
            marker: Some(marker),
            ..self
        }
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            write!(
                f,
                "[{}]",
                self.extras
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<String>>()
                    .join(",")
            )?;
        }
        if let Some(version_or_url) = &self.version_or_url {
            match version_or_url {
                VersionOrUrl::VersionSpecifier(specifiers) => {
                    if !specifiers.is_empty() {
                        write!(f, " ({specifiers})")?;
                    }
                }
                VersionOrUrl::Url(url) => {
                    // We add the space for markers later if necessary.
                    write!(f, " @ {url}")?;
                }
            }
        }
        if let Some(marker) = &self.marker {
            if !marker.is_always() {
                write!(f, " ; {marker}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Requirement {
    type Err = RequirementParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse_requirement(&mut Cursor::new(input))
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        Self::from_str(&string).map_err(de::Error::custom)
    }
}

/// The version constraints or the direct URL of a dependency specifier.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum VersionOrUrl {
    /// A PEP 440 version specifier set such as `>=1.19,<2.0`.
    VersionSpecifier(VersionSpecifiers),
    /// A direct URL such as `https://.../tqdm-4.66.0-py3-none-any.whl`.
    Url(Url),
}

impl Display for VersionOrUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionSpecifier(specifiers) => write!(f, "{specifiers}"),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

fn parse_name(cursor: &mut Cursor) -> Result<PackageName, RequirementParseError> {
    // https://peps.python.org/pep-0508/#names
    // ^([A-Z0-9]|[A-Z0-9][A-Z0-9._-]*[A-Z0-9])$ with re.IGNORECASE
    let mut name = String::new();
    if let Some((index, char)) = cursor.next() {
        if matches!(char, 'A'..='Z' | 'a'..='z' | '0'..='9') {
            name.push(char);
        } else {
            return Err(RequirementParseError {
                message: RequirementParseErrorKind::String(format!(
                    "Expected package name starting with an alphanumeric character, found '{char}'"
                )),
                start: index,
                len: char.len_utf8(),
                input: cursor.to_string(),
            });
        }
    } else {
        return Err(RequirementParseError {
            message: RequirementParseErrorKind::String(
                "Empty field is not allowed for a dependency specifier".to_string(),
            ),
            start: 0,
            len: 1,
            input: cursor.to_string(),
        });
    }

    loop {
        match cursor.peek() {
            Some((index, char @ ('A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '-' | '_'))) => {
                name.push(char);
                cursor.next();
                // [.-_] can't be the final character
                if cursor.peek().is_none() && matches!(char, '.' | '-' | '_') {
                    return Err(RequirementParseError {
                        message: RequirementParseErrorKind::String(format!(
                            "Package name must end with an alphanumeric character, not '{char}'"
                        )),
                        start: index,
                        len: char.len_utf8(),
                        input: cursor.to_string(),
                    });
                }
            }
            Some(_) | None => {
                return Ok(PackageName::new(name)
                    .expect("`PackageName` validation should match the grammar above"));
            }
        }
    }
}

/// Parses extras in the `[extra1,extra2]` format.
fn parse_extras(cursor: &mut Cursor) -> Result<Vec<ExtraName>, RequirementParseError> {
    let Some(bracket_pos) = cursor.eat_char('[') else {
        return Ok(Vec::new());
    };
    cursor.eat_whitespace();

    let mut extras = Vec::new();
    let mut is_first_iteration = true;

    loop {
        // End of the extras section. (Empty extras are allowed.)
        if let Some(']') = cursor.peek_char() {
            cursor.next();
            break;
        }

        // Comma separator, required between extras.
        match (cursor.peek(), is_first_iteration) {
            (Some((pos, ',')), true) => {
                return Err(RequirementParseError {
                    message: RequirementParseErrorKind::String(
                        "Expected either alphanumerical character (starting the extra name) or \
                        ']' (ending the extras section), found ','"
                            .to_string(),
                    ),
                    start: pos,
                    len: 1,
                    input: cursor.to_string(),
                });
            }
            (Some((_, ',')), false) => {
                cursor.next();
            }
            (Some((pos, other)), false) => {
                return Err(RequirementParseError {
                    message: RequirementParseErrorKind::String(format!(
                        "Expected either ',' (separating extras) or ']' (ending the extras \
                        section), found '{other}'"
                    )),
                    start: pos,
                    len: 1,
                    input: cursor.to_string(),
                });
            }
            _ => {}
        }

        cursor.eat_whitespace();
        let mut buffer = String::new();
        match cursor.next() {
            Some((_, alphanumeric @ ('a'..='z' | 'A'..='Z' | '0'..='9'))) => {
                buffer.push(alphanumeric);
            }
            Some((pos, other)) => {
                return Err(RequirementParseError {
                    message: RequirementParseErrorKind::String(format!(
                        "Expected an alphanumeric character starting the extra name, found '{other}'"
                    )),
                    start: pos,
                    len: other.len_utf8(),
                    input: cursor.to_string(),
                });
            }
            None => {
                return Err(RequirementParseError {
                    message: RequirementParseErrorKind::String(
                        "Missing closing bracket (expected ']', found end of dependency \
                        specification)"
                            .to_string(),
                    ),
                    start: bracket_pos,
                    len: 1,
                    input: cursor.to_string(),
                })
            }
        }
        let (start, len) = cursor
            .take_while(|char| matches!(char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.'));
        buffer.push_str(cursor.slice(start, len));
        match cursor.peek() {
            Some((pos, char)) if char != ',' && char != ']' && !char.is_whitespace() => {
                return Err(RequirementParseError {
                    message: RequirementParseErrorKind::String(format!(
                        "Invalid character in extras name, expected an alphanumeric character, \
                        '-', '_', '.', ',' or ']', found '{char}'"
                    )),
                    start: pos,
                    len: char.len_utf8(),
                    input: cursor.to_string(),
                });
            }
            _ => {}
        }
        cursor.eat_whitespace();

        extras.push(
            ExtraName::new(buffer).expect("`ExtraName` validation should match the grammar above"),
        );
        is_first_iteration = false;
    }

    Ok(extras)
}

fn parse_url(cursor: &mut Cursor) -> Result<Url, RequirementParseError> {
    cursor.eat_whitespace();
    let (start, len) = cursor.take_while(|char| !char.is_whitespace());
    let url = cursor.slice(start, len);
    if url.is_empty() {
        return Err(RequirementParseError {
            message: RequirementParseErrorKind::String("Expected URL".to_string()),
            start,
            len,
            input: cursor.to_string(),
        });
    }
    Url::parse(url).map_err(|err| RequirementParseError {
        message: RequirementParseErrorKind::Url(err),
        start,
        len,
        input: cursor.to_string(),
    })
}

/// PEP 440 wrapper.
fn parse_specifier(
    cursor: &Cursor,
    buffer: &str,
    start: usize,
    end: usize,
) -> Result<VersionSpecifier, RequirementParseError> {
    VersionSpecifier::from_str(buffer).map_err(|err| RequirementParseError {
        message: RequirementParseErrorKind::String(err.to_string()),
        start,
        len: end.saturating_sub(start),
        input: cursor.to_string(),
    })
}

/// Such as `>=1.19,<2.0`, either delimited by the end of the specifier or a
/// `;` for the marker part.
fn parse_version_specifier(
    cursor: &mut Cursor,
) -> Result<Option<VersionOrUrl>, RequirementParseError> {
    let mut start = cursor.pos();
    let mut specifiers = Vec::new();
    let mut buffer = String::new();
    loop {
        match cursor.peek() {
            Some((end, ',')) => {
                specifiers.push(parse_specifier(cursor, &buffer, start, end)?);
                buffer.clear();
                cursor.next();
                start = end + 1;
            }
            Some((_, ';')) | None => {
                let end = cursor.pos();
                specifiers.push(parse_specifier(cursor, &buffer, start, end)?);
                return Ok(Some(VersionOrUrl::VersionSpecifier(
                    specifiers.into_iter().collect(),
                )));
            }
            Some((_, char)) => {
                buffer.push(char);
                cursor.next();
            }
        }
    }
}

/// Such as `(>=1.19,<2.0)`.
fn parse_version_specifier_parentheses(
    cursor: &mut Cursor,
) -> Result<Option<VersionOrUrl>, RequirementParseError> {
    let brace_pos = cursor.pos();
    cursor.next();
    cursor.eat_whitespace();
    let mut start = cursor.pos();
    let mut specifiers = Vec::new();
    let mut buffer = String::new();
    loop {
        match cursor.next() {
            Some((end, ',')) => {
                specifiers.push(parse_specifier(cursor, &buffer, start, end)?);
                buffer.clear();
                start = end + 1;
            }
            Some((end, ')')) => {
                specifiers.push(parse_specifier(cursor, &buffer, start, end)?);
                return Ok(Some(VersionOrUrl::VersionSpecifier(
                    specifiers.into_iter().collect(),
                )));
            }
            Some((_, char)) => buffer.push(char),
            None => {
                return Err(RequirementParseError {
                    message: RequirementParseErrorKind::String(
                        "Missing closing parenthesis (expected ')', found end of dependency \
                        specification)"
                            .to_string(),
                    ),
                    start: brace_pos,
                    len: 1,
                    input: cursor.to_string(),
                })
            }
        }
    }
}

/// Parse a dependency specifier:
///
/// ```text
/// specification = wsp* name wsp* extras? wsp*
///                 (('@' wsp* url) | ('(' versionspec ')') | versionspec)?
///                 wsp* (';' wsp* marker)? wsp*
/// ```
fn parse_requirement(cursor: &mut Cursor) -> Result<Requirement, RequirementParseError> {
    cursor.eat_whitespace();
    let name = parse_name(cursor)?;
    cursor.eat_whitespace();
    let extras = parse_extras(cursor)?;
    cursor.eat_whitespace();

    let version_or_url = match cursor.peek_char() {
        Some('@') => {
            cursor.next();
            Some(VersionOrUrl::Url(parse_url(cursor)?))
        }
        Some('(') => parse_version_specifier_parentheses(cursor)?,
        Some('<' | '=' | '>' | '~' | '!') => parse_version_specifier(cursor)?,
        Some(';') | None => None,
        Some(other) => {
            return Err(RequirementParseError {
                message: RequirementParseErrorKind::String(format!(
                    "Expected one of `@`, `(`, `<`, `=`, `>`, `~`, `!`, `;`, found `{other}`"
                )),
                start: cursor.pos(),
                len: other.len_utf8(),
                input: cursor.to_string(),
            });
        }
    };

    cursor.eat_whitespace();
    let marker = if cursor.peek_char() == Some(';') {
        // Skip past the semicolon
        cursor.next();
        Some(marker::parse_markers_cursor(cursor)?)
    } else {
        None
    };
    cursor.eat_whitespace();
    if let Some((pos, char)) = cursor.next() {
        let message = if marker.is_none() {
            format!(r"Expected end of input or ';', found '{char}'")
        } else {
            format!(r"Expected end of input, found '{char}'")
        };
        return Err(RequirementParseError {
            message: RequirementParseErrorKind::String(message),
            start: pos,
            len: char.len_utf8(),
            input: cursor.to_string(),
        });
    }

    Ok(Requirement {
        name,
        extras,
        version_or_url,
        marker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn requirement(string: &str) -> Requirement {
        Requirement::from_str(string).unwrap()
    }

    #[test]
    fn parse_registry() {
        let parsed = requirement("requests[security]>=2.13,<3.0");
        assert_eq!(parsed.name.as_str(), "requests");
        assert_eq!(parsed.extras.len(), 1);
        assert_eq!(parsed.extras[0].as_str(), "security");
        let Some(VersionOrUrl::VersionSpecifier(specifiers)) = &parsed.version_or_url else {
            panic!("expected version specifiers");
        };
        assert_eq!(specifiers.to_string(), ">=2.13,<3.0");
        assert!(parsed.marker.is_none());
    }

    #[test]
    fn canonical_form() {
        for (input, canonical) in [
            (
                "requests[security]>=2.13,<3.0",
                "requests[security] (>=2.13,<3.0)",
            ),
            (
                "requests [security,tests] >= 2.8.1 ; python_version > \"3.8\"",
                "requests[security,tests] (>=2.8.1) ; python_version > \"3.8\"",
            ),
            ("Django", "django"),
            ("numpy ( >=1.19 )", "numpy (>=1.19)"),
            (
                "pip @ https://github.com/pypa/pip/archive/1.3.1.zip",
                "pip @ https://github.com/pypa/pip/archive/1.3.1.zip",
            ),
            (
                "importlib-metadata ; python_version < \"3.8\"",
                "importlib-metadata ; python_version < \"3.8\"",
            ),
        ] {
            assert_eq!(requirement(input).to_string(), canonical, "{input}");
            // The canonical form is a fixed point.
            assert_eq!(
                requirement(&requirement(input).to_string()).to_string(),
                canonical
            );
        }
    }

    #[test]
    fn parse_errors() {
        for invalid in [
            "",
            "-requests",
            "requests[",
            "requests[security",
            "requests[security]>=",
            "requests @",
            "requests==2.0 garbage",
            "requests ; bogus_key == 'x'",
        ] {
            assert!(Requirement::from_str(invalid).is_err(), "`{invalid}`");
        }
    }

    #[test]
    fn with_extra_marker() {
        let parsed = requirement("itsdangerous (>=1.1.0)")
            .with_extra_marker(&ExtraName::from_str("security").unwrap());
        assert_eq!(
            parsed.to_string(),
            "itsdangerous (>=1.1.0) ; extra == \"security\""
        );
        let parsed = requirement("tqdm ; python_version >= '3.8'")
            .with_extra_marker(&ExtraName::from_str("cli").unwrap());
        assert_eq!(
            parsed.to_string(),
            "tqdm ; python_version >= \"3.8\" and extra == \"cli\""
        );
    }

    #[test]
    fn evaluate_markers() {
        let env = MarkerEnvironment {
            implementation_name: "cpython".to_string(),
            implementation_version: "3.7.3".parse().unwrap(),
            os_name: "posix".to_string(),
            platform_machine: "x86_64".to_string(),
            platform_python_implementation: "CPython".to_string(),
            platform_release: "5.15.0".to_string(),
            platform_system: "Linux".to_string(),
            platform_version: "#1 SMP".to_string(),
            python_full_version: "3.7.3".parse().unwrap(),
            python_version: "3.7".parse().unwrap(),
            sys_platform: "linux".to_string(),
        };
        let parsed = requirement("importlib-metadata ; python_version < \"3.8\"");
        assert!(parsed.evaluate_markers(&env, &[]));
        let parsed = requirement("colorama ; sys_platform == \"win32\"");
        assert!(!parsed.evaluate_markers(&env, &[]));
    }
}

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::version::compare_release;
use crate::{Version, VersionPattern};

/// One of `~=` `==` `!=` `<=` `>=` `<` `>` `===`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    /// `== 1.2.3`
    Equal,
    /// `== 1.2.*`
    EqualStar,
    /// `===` (discouraged)
    ///
    /// "Use of this operator is heavily discouraged and tooling MAY display a warning when it is
    /// used"
    ExactEqual,
    /// `!= 1.2.3`
    NotEqual,
    /// `!= 1.2.*`
    NotEqualStar,
    /// `~=`
    TildeEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
}

impl Operator {
    /// Returns `true` if this operator represents a wildcard.
    pub fn is_star(self) -> bool {
        matches!(self, Self::EqualStar | Self::NotEqualStar)
    }
}

impl FromStr for Operator {
    type Err = OperatorParseError;

    /// Notably, this does not know about star versions, it just assumes the base operator.
    fn from_str(operator: &str) -> Result<Self, Self::Err> {
        let operator = match operator {
            "==" => Self::Equal,
            "===" => {
                tracing::warn!("Using arbitrary equality (`===`) is discouraged");
                Self::ExactEqual
            }
            "!=" => Self::NotEqual,
            "~=" => Self::TildeEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessThanEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanEqual,
            other => {
                return Err(OperatorParseError {
                    got: other.to_string(),
                })
            }
        };
        Ok(operator)
    }
}

impl Display for Operator {
    /// Note that both `EqualStar` and `NotEqualStar` print without the star;
    /// the star belongs to the version pattern.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let operator = match self {
            Self::Equal | Self::EqualStar => "==",
            Self::ExactEqual => "===",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::TildeEqual => "~=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
        };
        write!(f, "{operator}")
    }
}

/// An error that occurs when parsing an invalid version specifier operator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no such comparison operator {got:?}, must be one of ~= == != <= >= < > ===")]
pub struct OperatorParseError {
    got: String,
}

/// A version specifier such as `>=1.19` or `== 1.1.*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
}

impl VersionSpecifier {
    /// Build a specifier from an operator and a version pattern, checking
    /// the combinations the spec forbids.
    pub fn from_pattern(
        operator: Operator,
        pattern: VersionPattern,
    ) -> Result<Self, VersionSpecifierParseError> {
        let star = pattern.is_wildcard();
        let operator = match (operator, star) {
            (Operator::Equal, true) => Operator::EqualStar,
            (Operator::NotEqual, true) => Operator::NotEqualStar,
            (operator, true) => {
                return Err(VersionSpecifierParseError::new(format!(
                    "operator {operator} cannot be used with a wildcard version"
                )));
            }
            (operator, false) => operator,
        };
        let version = pattern.into_version();
        if operator == Operator::TildeEqual && version.release().len() < 2 {
            return Err(VersionSpecifierParseError::new(
                "the ~= operator requires at least two release segments",
            ));
        }
        if version.is_local()
            && !matches!(
                operator,
                Operator::Equal | Operator::NotEqual | Operator::ExactEqual
            )
        {
            return Err(VersionSpecifierParseError::new(format!(
                "local versions are not permitted with the {operator} operator"
            )));
        }
        Ok(Self { operator, version })
    }

    /// `== <version>`
    pub fn equals_version(version: Version) -> Self {
        Self {
            operator: Operator::Equal,
            version,
        }
    }

    /// `>= <version>`
    pub fn greater_than_equal_version(version: Version) -> Self {
        Self {
            operator: Operator::GreaterThanEqual,
            version,
        }
    }

    /// `> <version>`
    pub fn greater_than_version(version: Version) -> Self {
        Self {
            operator: Operator::GreaterThan,
            version,
        }
    }

    /// `< <version>`
    pub fn less_than_version(version: Version) -> Self {
        Self {
            operator: Operator::LessThan,
            version,
        }
    }

    /// `<= <version>`
    pub fn less_than_equal_version(version: Version) -> Self {
        Self {
            operator: Operator::LessThanEqual,
            version,
        }
    }

    /// The operator of the specifier.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The version of the specifier.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether the given version satisfies the version range.
    ///
    /// For example, `>=1.19` contains `1.21`, but not `1.17`.
    pub fn contains(&self, version: &Version) -> bool {
        match self.operator {
            Operator::Equal => {
                if self.version.is_local() {
                    version == &self.version
                } else {
                    // A specifier without a local segment matches any local
                    // variant of the version.
                    version.without_local() == self.version
                }
            }
            Operator::NotEqual => {
                if self.version.is_local() {
                    version != &self.version
                } else {
                    version.without_local() != self.version
                }
            }
            Operator::ExactEqual => version.to_string() == self.version.to_string(),
            Operator::EqualStar => self.release_prefix_matches(version),
            Operator::NotEqualStar => !self.release_prefix_matches(version),
            Operator::TildeEqual => {
                let prefix_len = self.version.release().len() - 1;
                version >= &self.version
                    && compare_release(
                        &version.release()[..version.release().len().min(prefix_len)],
                        &self.version.release()[..prefix_len],
                    ) == Ordering::Equal
            }
            Operator::GreaterThan => {
                if compare_release(version.release(), self.version.release()) == Ordering::Equal {
                    // A post-release or local variant of the specified version
                    // does not satisfy `>`, unless the specifier is itself a
                    // post-release.
                    if !self.version.is_post() && version.is_post() {
                        return false;
                    }
                    if version.is_local() {
                        return false;
                    }
                }
                version > &self.version
            }
            Operator::GreaterThanEqual => version >= &self.version,
            Operator::LessThan => {
                if compare_release(version.release(), self.version.release()) == Ordering::Equal {
                    // A pre-release of the specified version does not satisfy
                    // `<`, unless the specifier is itself a pre-release.
                    if !self.version.any_prerelease() && version.any_prerelease() {
                        return false;
                    }
                }
                version < &self.version
            }
            Operator::LessThanEqual => version <= &self.version,
        }
    }

    /// Whether the version's release starts with the specifier's release,
    /// padded with zeroes, i.e. the `== 1.2.*` relation.
    fn release_prefix_matches(&self, version: &Version) -> bool {
        if version.epoch() != self.version.epoch() {
            return false;
        }
        let prefix = self.version.release();
        let release = version.release();
        (0..prefix.len()).all(|index| release.get(index).copied().unwrap_or_default() == prefix[index])
    }

    /// Whether the specifier's version carries a pre-release or dev segment.
    pub fn any_prerelease(&self) -> bool {
        self.version.any_prerelease()
    }
}

impl FromStr for VersionSpecifier {
    type Err = VersionSpecifierParseError;

    /// Parse a specifier such as `>= 1.19` or `==1.1.*`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let spec = spec.trim();
        let (operator, rest) = ["===", "==", "!=", "~=", "<=", ">=", "<", ">"]
            .iter()
            .find_map(|prefix| Some((*prefix, spec.strip_prefix(prefix)?)))
            .ok_or_else(|| {
                VersionSpecifierParseError::new(format!(
                    "missing comparison operator in `{spec}`, expected one of ~= == != <= >= < > ==="
                ))
            })?;
        let operator = Operator::from_str(operator)
            .expect("the operator table above only contains valid operators");
        let pattern = VersionPattern::from_str(rest.trim()).map_err(|err| {
            VersionSpecifierParseError::new(err.to_string())
        })?;
        Self::from_pattern(operator, pattern)
    }
}

impl Display for VersionSpecifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator, self.version)?;
        if self.operator.is_star() {
            write!(f, ".*")?;
        }
        Ok(())
    }
}

impl Serialize for VersionSpecifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionSpecifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        Self::from_str(&string).map_err(de::Error::custom)
    }
}

/// An error when parsing a version specifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct VersionSpecifierParseError {
    message: String,
}

impl VersionSpecifierParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A comma-separated list of specifiers, such as `>=1.19,<2.0`, that all must
/// hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl VersionSpecifiers {
    /// The list matching any version.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Whether all specifiers match the given version.
    pub fn contains(&self, version: &Version) -> bool {
        self.0.iter().all(|specifier| specifier.contains(version))
    }

    /// Returns `true` if there are no specifiers, i.e. any version matches.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the specifiers.
    pub fn iter(&self) -> impl Iterator<Item = &VersionSpecifier> {
        self.0.iter()
    }
}

impl FromIterator<VersionSpecifier> for VersionSpecifiers {
    fn from_iter<I: IntoIterator<Item = VersionSpecifier>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for VersionSpecifiers {
    type Item = VersionSpecifier;
    type IntoIter = std::vec::IntoIter<VersionSpecifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionSpecifierParseError;

    fn from_str(specifiers: &str) -> Result<Self, Self::Err> {
        let specifiers = specifiers.trim();
        if specifiers.is_empty() {
            return Ok(Self::empty());
        }
        specifiers
            .split(',')
            .map(VersionSpecifier::from_str)
            .collect()
    }
}

impl Display for VersionSpecifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for specifier in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{specifier}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for VersionSpecifiers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionSpecifiers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        Self::from_str(&string).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn specifier(string: &str) -> VersionSpecifier {
        VersionSpecifier::from_str(string).unwrap()
    }

    #[track_caller]
    fn version(string: &str) -> Version {
        Version::from_str(string).unwrap()
    }

    #[test]
    fn parse_and_display() {
        for (input, canonical) in [
            (">=1.19", ">=1.19"),
            ("== 1.1.*", "==1.1.*"),
            ("~= 0.9", "~=0.9"),
            ("!=1.0rc1", "!=1.0rc1"),
            ("=== 1.0", "===1.0"),
            ("<2", "<2"),
        ] {
            assert_eq!(specifier(input).to_string(), canonical);
        }
    }

    #[test]
    fn invalid_combinations() {
        assert!(VersionSpecifier::from_str(">=1.0.*").is_err());
        assert!(VersionSpecifier::from_str("~=1").is_err());
        assert!(VersionSpecifier::from_str(">1.0+local").is_err());
        assert!(VersionSpecifier::from_str("1.0").is_err());
    }

    #[test]
    fn contains() {
        assert!(specifier(">=1.19").contains(&version("1.21")));
        assert!(!specifier(">=1.19").contains(&version("1.17")));
        assert!(specifier("==1.1.*").contains(&version("1.1.42")));
        assert!(specifier("==1.1.*").contains(&version("1.1")));
        assert!(!specifier("==1.1.*").contains(&version("1.2")));
        assert!(specifier("~=1.2.3").contains(&version("1.2.9")));
        assert!(!specifier("~=1.2.3").contains(&version("1.3.0")));
        assert!(specifier("~=1.2").contains(&version("1.9")));
        assert!(!specifier("~=1.2").contains(&version("2.0")));
        // `==1.0` matches local variants, `==1.0+foo` is exact.
        assert!(specifier("==1.0").contains(&version("1.0+foo")));
        assert!(!specifier("==1.0+foo").contains(&version("1.0")));
        // Exclusive bounds and qualifiers.
        assert!(!specifier(">1.0").contains(&version("1.0.post1")));
        assert!(specifier(">1.0.post0").contains(&version("1.0.post1")));
        assert!(!specifier("<1.0").contains(&version("1.0rc1")));
        assert!(specifier("<1.0rc2").contains(&version("1.0rc1")));
        assert!(specifier("<1.0").contains(&version("0.9")));
    }

    #[test]
    fn exact_equal_is_textual() {
        assert!(specifier("===1.0").contains(&version("1.0")));
        assert!(!specifier("===1.0").contains(&version("1.0.0")));
    }

    #[test]
    fn specifiers() {
        let specifiers = VersionSpecifiers::from_str(">=2.13, <3.0").unwrap();
        assert_eq!(specifiers.to_string(), ">=2.13,<3.0");
        assert!(specifiers.contains(&version("2.14")));
        assert!(!specifiers.contains(&version("3.0")));
        assert!(VersionSpecifiers::from_str("").unwrap().is_empty());
    }
}

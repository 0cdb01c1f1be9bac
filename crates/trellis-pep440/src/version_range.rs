use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{Operator, Version, VersionSpecifiers};

/// A set of versions, kept as a sorted list of disjoint intervals.
///
/// The set is closed under union, intersection, difference and complement.
/// It is built from the constraint grammar: the comparison operators
/// (`>=1.2`, `!=1.0`, `~=1.2`), the shorthand operators (`^1.2.3`, `~1.2`,
/// `1.2.*`), commas for intersection and `||` for union.
///
/// By default a range does not admit pre-release versions. A pre-release is
/// only matched when the interval it falls into has a pre-release lower bound
/// (e.g. `>=1.0a1`), or when the range was explicitly marked with
/// [`VersionRange::with_prereleases`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    intervals: Vec<Interval>,
    allow_prereleases: bool,
}

/// A contiguous interval of versions. `None` bounds are infinite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Interval {
    min: Option<Version>,
    include_min: bool,
    max: Option<Version>,
    include_max: bool,
}

impl Interval {
    fn any() -> Self {
        Self {
            min: None,
            include_min: false,
            max: None,
            include_max: false,
        }
    }

    fn is_empty(&self) -> bool {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => match min.cmp(max) {
                Ordering::Greater => true,
                Ordering::Equal => !(self.include_min && self.include_max),
                Ordering::Less => false,
            },
            _ => false,
        }
    }

    fn contains(&self, version: &Version, allow_prereleases: bool) -> bool {
        if let Some(min) = &self.min {
            match version.cmp(min) {
                Ordering::Less => return false,
                Ordering::Equal if !self.include_min => return false,
                _ => {}
            }
        }
        if let Some(max) = &self.max {
            match version.cmp(max) {
                Ordering::Greater => return false,
                Ordering::Equal if !self.include_max => return false,
                _ => {}
            }
        }
        if version.any_prerelease() && !allow_prereleases {
            // Only an interval anchored at a pre-release admits pre-releases.
            if !self
                .min
                .as_ref()
                .is_some_and(super::Version::any_prerelease)
            {
                return false;
            }
        }
        true
    }
}

/// Compare two lower bounds; an inclusive bound starts earlier than an
/// exclusive bound on the same version.
fn cmp_lower(a: (Option<&Version>, bool), b: (Option<&Version>, bool)) -> Ordering {
    match (a.0, b.0) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => left.cmp(right).then(match (a.1, b.1) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => Ordering::Equal,
        }),
    }
}

/// Compare two upper bounds; an inclusive bound reaches further than an
/// exclusive bound on the same version.
fn cmp_upper(a: (Option<&Version>, bool), b: (Option<&Version>, bool)) -> Ordering {
    match (a.0, b.0) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(left), Some(right)) => left.cmp(right).then(match (a.1, b.1) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => Ordering::Equal,
        }),
    }
}

/// Whether `next` overlaps or shares an endpoint with `prev`, where `prev`'s
/// lower bound is known to not be greater than `next`'s.
fn touches(prev: &Interval, next: &Interval) -> bool {
    let (Some(prev_max), Some(next_min)) = (&prev.max, &next.min) else {
        return true;
    };
    match next_min.cmp(prev_max) {
        Ordering::Less => true,
        Ordering::Equal => prev.include_max || next.include_min,
        Ordering::Greater => false,
    }
}

/// Sort, drop empty intervals and merge overlapping or endpoint-sharing ones.
fn normalize(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|interval| !interval.is_empty());
    intervals.sort_by(|a, b| {
        cmp_lower((a.min.as_ref(), a.include_min), (b.min.as_ref(), b.include_min)).then_with(
            || cmp_upper((a.max.as_ref(), a.include_max), (b.max.as_ref(), b.include_max)),
        )
    });
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        if let Some(last) = merged.last_mut() {
            if touches(last, &interval) {
                if cmp_upper(
                    (interval.max.as_ref(), interval.include_max),
                    (last.max.as_ref(), last.include_max),
                ) == Ordering::Greater
                {
                    last.max = interval.max;
                    last.include_max = interval.include_max;
                }
                continue;
            }
        }
        merged.push(interval);
    }
    merged
}

impl VersionRange {
    /// The range containing every version.
    pub fn any() -> Self {
        Self {
            intervals: vec![Interval::any()],
            allow_prereleases: false,
        }
    }

    /// The range containing no versions.
    pub fn empty() -> Self {
        Self {
            intervals: Vec::new(),
            allow_prereleases: false,
        }
    }

    /// The range containing exactly the given version.
    pub fn exact(version: Version) -> Self {
        Self {
            intervals: vec![Interval {
                min: Some(version.clone()),
                include_min: true,
                max: Some(version),
                include_max: true,
            }],
            allow_prereleases: false,
        }
    }

    /// `> version`
    pub fn higher_than(version: Version) -> Self {
        Self::bounded(Some(version), false, None, false)
    }

    /// `>= version`
    pub fn at_least(version: Version) -> Self {
        Self::bounded(Some(version), true, None, false)
    }

    /// `< version`
    pub fn lower_than(version: Version) -> Self {
        Self::bounded(None, false, Some(version), false)
    }

    /// `<= version`
    pub fn at_most(version: Version) -> Self {
        Self::bounded(None, false, Some(version), true)
    }

    /// `>= min, < max`
    pub fn between(min: Version, max: Version) -> Self {
        Self::bounded(Some(min), true, Some(max), false)
    }

    fn bounded(
        min: Option<Version>,
        include_min: bool,
        max: Option<Version>,
        include_max: bool,
    ) -> Self {
        Self {
            intervals: normalize(vec![Interval {
                min,
                include_min,
                max,
                include_max,
            }]),
            allow_prereleases: false,
        }
    }

    /// Mark the range as admitting pre-release versions.
    #[must_use]
    pub fn with_prereleases(mut self) -> Self {
        self.allow_prereleases = true;
        self
    }

    /// Whether the range was marked as admitting pre-release versions.
    pub fn allows_prereleases(&self) -> bool {
        self.allow_prereleases
    }

    /// Whether no version is in the range.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Whether every version is in the range.
    pub fn is_any(&self) -> bool {
        self.intervals.len() == 1
            && self.intervals[0].min.is_none()
            && self.intervals[0].max.is_none()
    }

    /// Whether the version is in the range.
    pub fn contains(&self, version: &Version) -> bool {
        self.intervals
            .iter()
            .any(|interval| interval.contains(version, self.allow_prereleases))
    }

    /// The set of versions in both `self` and `other`.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let mut intervals = Vec::new();
        for left in &self.intervals {
            for right in &other.intervals {
                let min = match cmp_lower(
                    (left.min.as_ref(), left.include_min),
                    (right.min.as_ref(), right.include_min),
                ) {
                    Ordering::Less => (right.min.clone(), right.include_min),
                    _ => (left.min.clone(), left.include_min),
                };
                let max = match cmp_upper(
                    (left.max.as_ref(), left.include_max),
                    (right.max.as_ref(), right.include_max),
                ) {
                    Ordering::Greater => (right.max.clone(), right.include_max),
                    _ => (left.max.clone(), left.include_max),
                };
                intervals.push(Interval {
                    min: min.0,
                    include_min: min.1,
                    max: max.0,
                    include_max: max.1,
                });
            }
        }
        Self {
            intervals: normalize(intervals),
            allow_prereleases: self.allow_prereleases || other.allow_prereleases,
        }
    }

    /// The set of versions in `self` or `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut intervals = self.intervals.clone();
        intervals.extend(other.intervals.iter().cloned());
        Self {
            intervals: normalize(intervals),
            allow_prereleases: self.allow_prereleases || other.allow_prereleases,
        }
    }

    /// The set of versions not in `self`.
    #[must_use]
    pub fn complement(&self) -> Self {
        let mut intervals = Vec::with_capacity(self.intervals.len() + 1);
        let mut previous: Option<(Version, bool)> = None;
        for interval in &self.intervals {
            match (&interval.min, &previous) {
                (Some(min), None) => intervals.push(Interval {
                    min: None,
                    include_min: false,
                    max: Some(min.clone()),
                    include_max: !interval.include_min,
                }),
                (Some(min), Some((prev_max, prev_include))) => intervals.push(Interval {
                    min: Some(prev_max.clone()),
                    include_min: !prev_include,
                    max: Some(min.clone()),
                    include_max: !interval.include_min,
                }),
                (None, _) => {}
            }
            previous = interval
                .max
                .clone()
                .map(|max| (max, interval.include_max))
                .or(None);
            if interval.max.is_none() {
                // Reaches +∞, nothing can follow in a normalized list.
                return Self {
                    intervals: normalize(intervals),
                    allow_prereleases: self.allow_prereleases,
                };
            }
        }
        match previous {
            Some((max, include)) => intervals.push(Interval {
                min: Some(max),
                include_min: !include,
                max: None,
                include_max: false,
            }),
            None => intervals.push(Interval::any()),
        }
        Self {
            intervals: normalize(intervals),
            allow_prereleases: self.allow_prereleases,
        }
    }

    /// The set of versions in `self` but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut result = self.intersect(&other.complement());
        // Taking a difference never widens pre-release admission.
        result.allow_prereleases = self.allow_prereleases;
        result
    }

    /// Whether every version in `other` is also in `self`.
    pub fn allows_all(&self, other: &Self) -> bool {
        other.difference(self).is_empty()
    }

    /// Whether at least one version is in both `self` and `other`.
    pub fn allows_any(&self, other: &Self) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Convert a comma-separated specifier list into the equivalent range.
    pub fn from_specifiers(specifiers: &VersionSpecifiers) -> Self {
        let mut range = Self::any();
        for specifier in specifiers.iter() {
            let version = specifier.version().clone();
            let single = match specifier.operator() {
                Operator::Equal | Operator::ExactEqual => Self::exact(version),
                Operator::NotEqual => Self::exact(version).complement(),
                Operator::EqualStar => Self::wildcard(&version),
                Operator::NotEqualStar => Self::wildcard(&version).complement(),
                Operator::TildeEqual => Self::compatible(&version),
                Operator::LessThan => Self::lower_than(version),
                Operator::LessThanEqual => Self::at_most(version),
                Operator::GreaterThan => Self::higher_than(version),
                Operator::GreaterThanEqual => Self::at_least(version),
            };
            range = range.intersect(&single);
        }
        range
    }

    /// Express the range as a conjunction of specifiers.
    ///
    /// Returns `None` when the range is empty or spans more than one
    /// interval, since neither can be written as a pure conjunction.
    pub fn to_specifiers(&self) -> Option<VersionSpecifiers> {
        if self.is_any() {
            return Some(VersionSpecifiers::empty());
        }
        let [interval] = self.intervals.as_slice() else {
            return None;
        };
        let mut specifiers = Vec::new();
        if let (Some(min), Some(max)) = (&interval.min, &interval.max) {
            if min == max && interval.include_min && interval.include_max {
                specifiers.push(crate::VersionSpecifier::equals_version(min.clone()));
                return Some(specifiers.into_iter().collect());
            }
        }
        if let Some(min) = &interval.min {
            specifiers.push(if interval.include_min {
                crate::VersionSpecifier::greater_than_equal_version(min.clone())
            } else {
                crate::VersionSpecifier::greater_than_version(min.clone())
            });
        }
        if let Some(max) = &interval.max {
            specifiers.push(if interval.include_max {
                crate::VersionSpecifier::less_than_equal_version(max.clone())
            } else {
                crate::VersionSpecifier::less_than_version(max.clone())
            });
        }
        Some(specifiers.into_iter().collect())
    }

    /// The range matched by a wildcard such as `1.2.*`: `>=1.2, <1.3`.
    fn wildcard(version: &Version) -> Self {
        let upper = version.bump_release(version.release().len().saturating_sub(1));
        Self::between(version.clone(), upper)
    }

    /// The range matched by a compatible release clause such as `~=1.2.3`:
    /// `>=1.2.3, <1.3`.
    fn compatible(version: &Version) -> Self {
        let upper = version.stable().bump_release(version.release().len() - 2);
        Self::between(version.clone(), upper)
    }
}

impl Default for VersionRange {
    /// The range containing every version.
    fn default() -> Self {
        Self::any()
    }
}

impl FromStr for VersionRange {
    type Err = ConstraintParseError;

    fn from_str(constraints: &str) -> Result<Self, Self::Err> {
        let constraints = constraints.trim();
        if constraints.is_empty() {
            return Err(ConstraintParseError::new(constraints, "empty constraint"));
        }
        let mut union: Option<VersionRange> = None;
        // `||` is the usual spelling, a single `|` is tolerated.
        for group in constraints.split('|') {
            let group = group.trim();
            if group.is_empty() {
                continue;
            }
            let range = parse_group(group)
                .map_err(|message| ConstraintParseError::new(constraints, message))?;
            union = Some(match union {
                Some(existing) => existing.union(&range),
                None => range,
            });
        }
        union.ok_or_else(|| ConstraintParseError::new(constraints, "empty constraint"))
    }
}

fn parse_group(group: &str) -> Result<VersionRange, String> {
    // Trailing commas occur in the wild; tolerate them.
    let group = group.trim().trim_end_matches(',').trim_end();
    let mut range = VersionRange::any();
    for token in group.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err("empty constraint between commas".to_string());
        }
        range = range.intersect(&parse_single(token)?);
    }
    Ok(range)
}

fn is_any_token(token: &str) -> bool {
    let token = token.strip_prefix(['v', 'V']).unwrap_or(token);
    !token.is_empty()
        && token
            .split('.')
            .all(|segment| matches!(segment, "*" | "x" | "X"))
}

fn parse_single(token: &str) -> Result<VersionRange, String> {
    if is_any_token(token) {
        return Ok(VersionRange::any());
    }
    if let Some(rest) = token.strip_prefix('^') {
        let version = parse_version(rest)?;
        let upper = version.next_breaking();
        return Ok(VersionRange::between(version, upper));
    }
    if let Some(rest) = token.strip_prefix('~') {
        if !rest.starts_with('=') {
            let version = parse_version(rest)?;
            let upper = if version.precision() == 1 {
                version.stable().bump_release(0)
            } else {
                version.stable().bump_release(1)
            };
            return Ok(VersionRange::between(version, upper));
        }
    }
    for operator in ["===", "==", "!=", "~=", "<=", ">=", "<", ">"] {
        let Some(rest) = token.strip_prefix(operator) else {
            continue;
        };
        let rest = rest.trim();
        return match operator {
            "===" => Ok(VersionRange::exact(parse_version(rest)?)),
            "==" | "!=" => {
                let pattern = crate::VersionPattern::from_str(rest).map_err(|err| err.to_string())?;
                let positive = if pattern.is_wildcard() {
                    VersionRange::wildcard(pattern.version())
                } else {
                    VersionRange::exact(pattern.into_version())
                };
                if operator == "==" {
                    Ok(positive)
                } else {
                    Ok(positive.complement())
                }
            }
            "~=" => {
                let version = parse_version(rest)?;
                if version.precision() < 2 {
                    return Err(format!(
                        "the ~= operator requires at least two release segments, got `{rest}`"
                    ));
                }
                Ok(VersionRange::compatible(&version))
            }
            "<=" => Ok(VersionRange::at_most(parse_version(rest)?)),
            ">=" => Ok(VersionRange::at_least(parse_version(rest)?)),
            "<" => Ok(VersionRange::lower_than(parse_version(rest)?)),
            ">" => Ok(VersionRange::higher_than(parse_version(rest)?)),
            _ => unreachable!(),
        };
    }
    // A bare wildcard such as `1.2.*` is shorthand for `==1.2.*`.
    let pattern = crate::VersionPattern::from_str(token).map_err(|err| err.to_string())?;
    if pattern.is_wildcard() {
        Ok(VersionRange::wildcard(pattern.version()))
    } else {
        // A bare version pins exactly.
        Ok(VersionRange::exact(pattern.into_version()))
    }
}

fn parse_version(input: &str) -> Result<Version, String> {
    Version::from_str(input.trim()).map_err(|err| err.to_string())
}

/// An error when parsing a version constraint such as `^1.2 || >=3`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version constraint `{input}`: {message}")]
pub struct ConstraintParseError {
    input: String,
    message: String,
}

impl ConstraintParseError {
    fn new(input: &str, message: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            message: message.into(),
        }
    }
}

impl Display for VersionRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("<empty>");
        }
        if self.is_any() {
            return f.write_str("*");
        }
        let mut first_interval = true;
        for interval in &self.intervals {
            if !first_interval {
                f.write_str(" || ")?;
            }
            first_interval = false;
            match (&interval.min, &interval.max) {
                (Some(min), Some(max))
                    if min == max && interval.include_min && interval.include_max =>
                {
                    write!(f, "=={min}")?;
                }
                (min, max) => {
                    let mut first_bound = true;
                    if let Some(min) = min {
                        let operator = if interval.include_min { ">=" } else { ">" };
                        write!(f, "{operator}{min}")?;
                        first_bound = false;
                    }
                    if let Some(max) = max {
                        if !first_bound {
                            f.write_str(",")?;
                        }
                        let operator = if interval.include_max { "<=" } else { "<" };
                        write!(f, "{operator}{max}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        Self::from_str(&string).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn version(string: &str) -> Version {
        Version::from_str(string).unwrap()
    }

    #[track_caller]
    fn range(string: &str) -> VersionRange {
        VersionRange::from_str(string).unwrap()
    }

    #[test]
    fn parse_operators() {
        assert_eq!(range(">=1.2"), VersionRange::at_least(version("1.2")));
        assert_eq!(range("<1.2"), VersionRange::lower_than(version("1.2")));
        assert_eq!(range("==1.2.3"), VersionRange::exact(version("1.2.3")));
        assert_eq!(range("1.2.3"), VersionRange::exact(version("1.2.3")));
        assert_eq!(range("*"), VersionRange::any());
        assert_eq!(range("x.x"), VersionRange::any());
    }

    #[test]
    fn parse_caret() {
        assert_eq!(
            range("^1.2.3"),
            VersionRange::between(version("1.2.3"), version("2.0.0"))
        );
        assert_eq!(
            range("^0.2.3"),
            VersionRange::between(version("0.2.3"), version("0.3.0"))
        );
        assert_eq!(
            range("^0.0.3"),
            VersionRange::between(version("0.0.3"), version("0.0.4"))
        );
        assert_eq!(
            range("^0.0.0"),
            VersionRange::between(version("0.0.0"), version("0.0.1"))
        );
    }

    #[test]
    fn parse_tilde() {
        assert_eq!(
            range("~1.2.3"),
            VersionRange::between(version("1.2.3"), version("1.3.0"))
        );
        assert_eq!(
            range("~1.2"),
            VersionRange::between(version("1.2"), version("1.3"))
        );
        assert_eq!(range("~1"), VersionRange::between(version("1"), version("2")));
        // PEP 440 compatible release differs for two segments.
        assert_eq!(
            range("~=1.2"),
            VersionRange::between(version("1.2"), version("2"))
        );
        assert_eq!(
            range("~=1.2.3"),
            VersionRange::between(version("1.2.3"), version("1.3"))
        );
    }

    #[test]
    fn parse_wildcard() {
        assert_eq!(
            range("1.2.*"),
            VersionRange::between(version("1.2"), version("1.3"))
        );
        assert_eq!(range("==1.*"), VersionRange::between(version("1"), version("2")));
        assert_eq!(
            range("!=1.2.*"),
            VersionRange::between(version("1.2"), version("1.3")).complement()
        );
    }

    #[test]
    fn parse_intersection_and_union() {
        let intersected = range(">=2.13,<3.0");
        assert_eq!(
            intersected,
            VersionRange::between(version("2.13"), version("3.0"))
        );
        let unioned = range("<1.0 || >=2.0");
        assert!(unioned.contains(&version("0.5")));
        assert!(!unioned.contains(&version("1.5")));
        assert!(unioned.contains(&version("2.0")));
        // Single `|` is tolerated.
        assert_eq!(range("<1.0 | >=2.0"), unioned);
        // Trailing commas are tolerated.
        assert_eq!(range(">=2.13,<3.0,"), intersected);
    }

    #[test]
    fn parse_errors() {
        for invalid in ["", ">=", "^", "bogus", ">=1.0,,<2.0", "~=1"] {
            assert!(
                VersionRange::from_str(invalid).is_err(),
                "`{invalid}` should not parse"
            );
        }
    }

    #[test]
    fn algebra_identities() {
        for constraint in [">=1.2,<2.0", "==1.5", "<1.0 || >=2.0", "*", "^0.4"] {
            let a = range(constraint);
            assert_eq!(a.intersect(&VersionRange::any()), a, "{constraint}");
            assert_eq!(a.union(&VersionRange::empty()), a, "{constraint}");
            assert_eq!(a.complement().complement(), a, "{constraint}");
            assert!(a.intersect(&a.complement()).is_empty(), "{constraint}");
            assert!(a.union(&a.complement()).is_any(), "{constraint}");
        }
    }

    #[test]
    fn union_contains_either() {
        let a = range(">=1.0,<2.0");
        let b = range(">=1.5,<3.0");
        let union = a.union(&b);
        for candidate in ["0.9", "1.0", "1.7", "2.5", "3.0", "3.1"] {
            let candidate = version(candidate);
            assert_eq!(
                union.contains(&candidate),
                a.contains(&candidate) || b.contains(&candidate),
                "{candidate}"
            );
        }
        // Overlapping intervals merge.
        assert_eq!(union, range(">=1.0,<3.0"));
    }

    #[test]
    fn merges_touching_intervals() {
        let merged = range("<1.0").union(&range(">=1.0"));
        assert!(merged.is_any());
        // Two exclusive bounds on the same version leave a hole.
        let hole = range("<1.0").union(&range(">1.0"));
        assert!(!hole.is_any());
        assert!(!hole.contains(&version("1.0")));
    }

    #[test]
    fn difference() {
        let a = range(">=1.0,<3.0");
        let b = range(">=2.0,<2.5");
        let difference = a.difference(&b);
        assert!(difference.contains(&version("1.5")));
        assert!(!difference.contains(&version("2.2")));
        assert!(difference.contains(&version("2.5")));
        assert!(difference.contains(&version("2.9")));
        assert!(!difference.contains(&version("3.0")));
    }

    #[test]
    fn allows_all_and_any() {
        let wide = range(">=1.0,<3.0");
        let narrow = range(">=1.5,<2.0");
        assert!(wide.allows_all(&narrow));
        assert!(!narrow.allows_all(&wide));
        assert!(wide.allows_any(&narrow));
        assert!(!wide.allows_any(&range(">=4.0")));
        assert!(wide.allows_all(&VersionRange::empty()));
    }

    #[test]
    fn prerelease_admission() {
        let plain = range(">=1.0,<2.0");
        assert!(!plain.contains(&version("1.5a1")));
        assert!(!plain.contains(&version("1.5.dev1")));
        assert!(plain.contains(&version("1.5")));

        // A pre-release lower bound admits pre-releases.
        let anchored = range(">=1.5a1,<2.0");
        assert!(anchored.contains(&version("1.5a2")));

        // So does the explicit flag.
        let flagged = range(">=1.0,<2.0").with_prereleases();
        assert!(flagged.contains(&version("1.5a1")));

        // An exact pre-release pin matches itself.
        assert!(range("==1.0rc1").contains(&version("1.0rc1")));
    }

    #[test]
    fn caret_prerelease_lower_bound() {
        // `^1.2.3rc1` anchors at the pre-release and keeps the stable cap.
        let caret = range("^1.2.3rc1");
        assert!(caret.contains(&version("1.2.3rc2")));
        assert!(caret.contains(&version("1.5")));
        assert!(!caret.contains(&version("2.0")));
    }

    #[test]
    fn display_round_trip() {
        for (constraint, canonical) in [
            (">=2.13,<3.0", ">=2.13,<3.0"),
            ("^1.2.3", ">=1.2.3,<2.0.0"),
            ("~0.9", ">=0.9,<0.10"),
            ("==1.5", "==1.5"),
            ("<1.0 || >=2.0", "<1.0 || >=2.0"),
            ("*", "*"),
        ] {
            assert_eq!(range(constraint).to_string(), canonical);
            assert_eq!(range(&range(constraint).to_string()), range(constraint));
        }
    }

    #[test]
    fn from_specifiers() {
        let specifiers = VersionSpecifiers::from_str(">=2.13,<3.0").unwrap();
        assert_eq!(
            VersionRange::from_specifiers(&specifiers),
            range(">=2.13,<3.0")
        );
        let star = VersionSpecifiers::from_str("==1.2.*").unwrap();
        assert_eq!(VersionRange::from_specifiers(&star), range("1.2.*"));
    }
}

//! Environment marker implementation with validation and warnings.
//!
//! Markers gate a dependency on the deployment environment (python version,
//! operating system, architecture, or an activated extra), e.g.
//! `importlib-metadata ; python_version < "3.8"` or
//! `itsdangerous (>=1.1.0) ; extra == "security"`. The marker grammar has
//! some oversights and the comparison design (PEP 440 comparisons with
//! lexicographic fallback) leads to confusing outcomes, so bogus comparisons
//! are reported as warnings and evaluate to false.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use tracing::warn;

use trellis_normalize::ExtraName;
use trellis_pep440::{Operator, Version, VersionPattern, VersionRange, VersionSpecifier};

use crate::cursor::Cursor;
use crate::{RequirementParseError, RequirementParseErrorKind};

/// One of the environment attributes a marker leaf may test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKey {
    /// `os_name`
    OsName,
    /// `sys_platform`
    SysPlatform,
    /// `platform_machine`
    PlatformMachine,
    /// `platform_python_implementation`
    PlatformPythonImplementation,
    /// `platform_release`
    PlatformRelease,
    /// `platform_system`
    PlatformSystem,
    /// `platform_version`
    PlatformVersion,
    /// `python_version`
    PythonVersion,
    /// `python_full_version`
    PythonFullVersion,
    /// `implementation_name`
    ImplementationName,
    /// `implementation_version`
    ImplementationVersion,
    /// `extra`
    Extra,
}

impl MarkerKey {
    /// Whether the attribute's values are PEP 440 versions.
    pub fn is_version(self) -> bool {
        matches!(
            self,
            Self::PythonVersion | Self::PythonFullVersion | Self::ImplementationVersion
        )
    }

    /// Whether the attribute participates in python version range reasoning.
    fn is_python(self) -> bool {
        matches!(self, Self::PythonVersion | Self::PythonFullVersion)
    }
}

impl FromStr for MarkerKey {
    type Err = String;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let key = match key {
            "os_name" => Self::OsName,
            "sys_platform" => Self::SysPlatform,
            "platform_machine" => Self::PlatformMachine,
            "platform_python_implementation" => Self::PlatformPythonImplementation,
            "platform_release" => Self::PlatformRelease,
            "platform_system" => Self::PlatformSystem,
            "platform_version" => Self::PlatformVersion,
            "python_version" => Self::PythonVersion,
            "python_full_version" => Self::PythonFullVersion,
            "implementation_name" => Self::ImplementationName,
            "implementation_version" => Self::ImplementationVersion,
            "extra" => Self::Extra,
            _ => return Err(format!("Invalid marker name: {key}")),
        };
        Ok(key)
    }
}

impl Display for MarkerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OsName => "os_name",
            Self::SysPlatform => "sys_platform",
            Self::PlatformMachine => "platform_machine",
            Self::PlatformPythonImplementation => "platform_python_implementation",
            Self::PlatformRelease => "platform_release",
            Self::PlatformSystem => "platform_system",
            Self::PlatformVersion => "platform_version",
            Self::PythonVersion => "python_version",
            Self::PythonFullVersion => "python_full_version",
            Self::ImplementationName => "implementation_name",
            Self::ImplementationVersion => "implementation_version",
            Self::Extra => "extra",
        })
    }
}

/// How to compare attribute and literal, such as by `==`, `>` or `not in`.
///
/// `Contains`/`NotContains` are the flipped containment forms, written
/// `"win" in sys_platform`: the literal is tested against the attribute
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerOperator {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessEqual,
    /// `~=`
    TildeEqual,
    /// `===`
    ExactEqual,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// The inverted `in`: the quoted literal was on the left-hand side.
    Contains,
    /// The inverted `not in`: the quoted literal was on the left-hand side.
    NotContains,
}

impl MarkerOperator {
    /// The PEP 440 operator for version-valued comparisons, `None` for the
    /// containment operators.
    fn to_pep440_operator(self) -> Option<Operator> {
        match self {
            Self::Equal => Some(Operator::Equal),
            Self::NotEqual => Some(Operator::NotEqual),
            Self::GreaterThan => Some(Operator::GreaterThan),
            Self::GreaterEqual => Some(Operator::GreaterThanEqual),
            Self::LessThan => Some(Operator::LessThan),
            Self::LessEqual => Some(Operator::LessThanEqual),
            Self::TildeEqual => Some(Operator::TildeEqual),
            Self::ExactEqual => Some(Operator::ExactEqual),
            Self::In | Self::NotIn | Self::Contains | Self::NotContains => None,
        }
    }

    /// The operator with its operands swapped, used to normalize markers
    /// written literal-first (`"3.8" < python_version`).
    fn flip(self) -> Self {
        match self {
            Self::GreaterThan => Self::LessThan,
            Self::GreaterEqual => Self::LessEqual,
            Self::LessThan => Self::GreaterThan,
            Self::LessEqual => Self::GreaterEqual,
            Self::In => Self::Contains,
            Self::NotIn => Self::NotContains,
            Self::Contains => Self::In,
            Self::NotContains => Self::NotIn,
            same => same,
        }
    }
}

impl FromStr for MarkerOperator {
    type Err = String;

    /// Whitespace between "not" and "in" is normalized by the parser.
    fn from_str(operator: &str) -> Result<Self, Self::Err> {
        let operator = match operator {
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessEqual,
            "~=" => Self::TildeEqual,
            "===" => Self::ExactEqual,
            "in" => Self::In,
            "not in" => Self::NotIn,
            other => return Err(format!("Invalid comparator: {other}")),
        };
        Ok(operator)
    }
}

impl Display for MarkerOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterEqual => ">=",
            Self::LessThan => "<",
            Self::LessEqual => "<=",
            Self::TildeEqual => "~=",
            Self::ExactEqual => "===",
            Self::In | Self::Contains => "in",
            Self::NotIn | Self::NotContains => "not in",
        })
    }
}

/// The attribute values of a deployment environment.
///
/// See: <https://packaging.python.org/en/latest/specifications/dependency-specifiers/#environment-markers>
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerEnvironment {
    pub implementation_name: String,
    pub implementation_version: Version,
    pub os_name: String,
    pub platform_machine: String,
    pub platform_python_implementation: String,
    pub platform_release: String,
    pub platform_system: String,
    pub platform_version: String,
    pub python_full_version: Version,
    pub python_version: Version,
    pub sys_platform: String,
}

impl MarkerEnvironment {
    /// The version-typed value of the key in this environment.
    fn get_version(&self, key: MarkerKey) -> &Version {
        match key {
            MarkerKey::ImplementationVersion => &self.implementation_version,
            MarkerKey::PythonFullVersion => &self.python_full_version,
            MarkerKey::PythonVersion => &self.python_version,
            _ => unreachable!("not a version-valued marker key: {key}"),
        }
    }

    /// The string-typed value of the key in this environment; version values
    /// fall back to their textual form for the containment operators.
    fn get_string(&self, key: MarkerKey) -> String {
        match key {
            MarkerKey::ImplementationName => self.implementation_name.clone(),
            MarkerKey::OsName => self.os_name.clone(),
            MarkerKey::PlatformMachine => self.platform_machine.clone(),
            MarkerKey::PlatformPythonImplementation => {
                self.platform_python_implementation.clone()
            }
            MarkerKey::PlatformRelease => self.platform_release.clone(),
            MarkerKey::PlatformSystem => self.platform_system.clone(),
            MarkerKey::PlatformVersion => self.platform_version.clone(),
            MarkerKey::SysPlatform => self.sys_platform.clone(),
            MarkerKey::ImplementationVersion => self.implementation_version.to_string(),
            MarkerKey::PythonFullVersion => self.python_full_version.to_string(),
            MarkerKey::PythonVersion => self.python_version.to_string(),
            MarkerKey::Extra => unreachable!("extra is not an environment value"),
        }
    }
}

/// Represents one clause such as `python_version > "3.8"`: an environment
/// attribute, an operator and a quoted literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerExpression {
    /// The environment attribute under test.
    pub key: MarkerKey,
    /// An operator, such as `>=` or `not in`.
    pub operator: MarkerOperator,
    /// The quoted literal the attribute is compared against.
    pub value: String,
}

/// Membership test with the RHS treated as a list of alternatives when it is
/// one: `|` and whitespace both separate alternatives.
fn value_in(needle: &str, haystack: &str) -> bool {
    let alternatives: Vec<&str> = haystack
        .split(|c: char| c.is_whitespace() || c == '|')
        .filter(|alternative| !alternative.is_empty())
        .collect();
    if alternatives.len() > 1 {
        alternatives.contains(&needle)
    } else {
        haystack.contains(needle)
    }
}

impl MarkerExpression {
    /// Evaluate the clause against the environment and the activated extras.
    fn evaluate(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        if self.key == MarkerKey::Extra {
            return match self.operator {
                MarkerOperator::Equal => match ExtraName::from_str(&self.value) {
                    Ok(extra) => extras.contains(&extra),
                    Err(err) => {
                        warn!(
                            "Expected an extra name, found '{}', evaluating to false: {err}",
                            self.value
                        );
                        false
                    }
                },
                MarkerOperator::NotEqual => match ExtraName::from_str(&self.value) {
                    Ok(extra) => !extras.contains(&extra),
                    Err(err) => {
                        warn!(
                            "Expected an extra name, found '{}', evaluating to false: {err}",
                            self.value
                        );
                        false
                    }
                },
                _ => {
                    warn!(
                        "Comparing extra with an operator other than == or != is wrong, \
                        evaluating to false: {self}"
                    );
                    false
                }
            };
        }

        if self.key.is_version() {
            if let Some(operator) = self.operator.to_pep440_operator() {
                let pattern = match VersionPattern::from_str(&self.value) {
                    Ok(pattern) => pattern,
                    Err(err) => {
                        warn!(
                            "Expected a version to compare with {}, found '{}', \
                            evaluating to false: {err}",
                            self.key, self.value
                        );
                        return false;
                    }
                };
                let specifier = match VersionSpecifier::from_pattern(operator, pattern) {
                    Ok(specifier) => specifier,
                    Err(err) => {
                        warn!("Invalid operator/version combination, evaluating to false: {err}");
                        return false;
                    }
                };
                return specifier.contains(env.get_version(self.key));
            }
        }

        let env_value = env.get_string(self.key);
        self.compare_strings(&env_value, &self.value)
    }

    /// Compare the attribute value and the literal by PEP 508 string logic,
    /// with warnings for the lexicographic cases.
    fn compare_strings(&self, env_value: &str, literal: &str) -> bool {
        match self.operator {
            MarkerOperator::Equal => env_value == literal,
            MarkerOperator::NotEqual => env_value != literal,
            MarkerOperator::ExactEqual => env_value == literal,
            MarkerOperator::GreaterThan => {
                warn!("Comparing {env_value} and {literal} lexicographically");
                env_value > literal
            }
            MarkerOperator::GreaterEqual => {
                warn!("Comparing {env_value} and {literal} lexicographically");
                env_value >= literal
            }
            MarkerOperator::LessThan => {
                warn!("Comparing {env_value} and {literal} lexicographically");
                env_value < literal
            }
            MarkerOperator::LessEqual => {
                warn!("Comparing {env_value} and {literal} lexicographically");
                env_value <= literal
            }
            MarkerOperator::TildeEqual => {
                warn!("Can't compare {env_value} and {literal} with `~=`, evaluating to false");
                false
            }
            MarkerOperator::In => value_in(env_value, literal),
            MarkerOperator::NotIn => !value_in(env_value, literal),
            MarkerOperator::Contains => env_value.contains(literal),
            MarkerOperator::NotContains => !env_value.contains(literal),
        }
    }

    /// The python version range this clause pins, if it is a range-typed
    /// clause on `python_version` or `python_full_version`.
    fn python_range(&self) -> Option<VersionRange> {
        if !self.key.is_python() {
            return None;
        }
        let operator = self.operator.to_pep440_operator()?;
        let pattern = VersionPattern::from_str(&self.value).ok()?;
        // `python_version` has major.minor granularity: equality on it is a
        // prefix match on the full version.
        if self.key == MarkerKey::PythonVersion
            && matches!(operator, Operator::Equal | Operator::NotEqual)
            && !pattern.is_wildcard()
            && pattern.version().release().len() == 2
        {
            let exact = VersionRange::between(
                pattern.version().clone(),
                pattern.version().bump_release(1),
            );
            return Some(if operator == Operator::Equal {
                exact
            } else {
                exact.complement()
            });
        }
        let specifier = VersionSpecifier::from_pattern(operator, pattern).ok()?;
        Some(VersionRange::from_specifiers(
            &std::iter::once(specifier).collect(),
        ))
    }
}

impl Display for MarkerExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.operator {
            // The flipped containment forms serialize literal-first.
            MarkerOperator::Contains | MarkerOperator::NotContains => {
                write!(f, "\"{}\" {} {}", self.value, self.operator, self.key)
            }
            _ => write!(f, "{} {} \"{}\"", self.key, self.operator, self.value),
        }
    }
}

/// A marker expression tree: leaves are [`MarkerExpression`] clauses, inner
/// nodes conjunctions and disjunctions, and the two constants absorb
/// simplification results.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerTree {
    /// The marker that holds in every environment.
    Always,
    /// The marker that holds in no environment.
    Never,
    /// A simple expression such as `python_version > "3.8"`.
    Expression(MarkerExpression),
    /// An `and` between nested expressions, such as
    /// `python_version > "3.8" and implementation_name == "cpython"`.
    And(Vec<MarkerTree>),
    /// An `or` between nested expressions, such as
    /// `python_version > "3.8" or implementation_name == "cpython"`.
    Or(Vec<MarkerTree>),
}

impl MarkerTree {
    /// A conjunction with the trivial simplifications applied eagerly:
    /// `Always` children vanish, one `Never` child collapses the whole node.
    pub fn and_of(children: impl IntoIterator<Item = MarkerTree>) -> MarkerTree {
        let mut flattened = Vec::new();
        for child in children {
            match child {
                MarkerTree::Always => {}
                MarkerTree::Never => return MarkerTree::Never,
                MarkerTree::And(nested) => flattened.extend(nested),
                other => flattened.push(other),
            }
        }
        match flattened.len() {
            0 => MarkerTree::Always,
            1 => flattened.pop().expect("len is 1"),
            _ => MarkerTree::And(flattened),
        }
    }

    /// A disjunction with the trivial simplifications applied eagerly.
    pub fn or_of(children: impl IntoIterator<Item = MarkerTree>) -> MarkerTree {
        let mut flattened = Vec::new();
        for child in children {
            match child {
                MarkerTree::Never => {}
                MarkerTree::Always => return MarkerTree::Always,
                MarkerTree::Or(nested) => flattened.extend(nested),
                other => {
                    if !flattened.contains(&other) {
                        flattened.push(other);
                    }
                }
            }
        }
        match flattened.len() {
            0 => MarkerTree::Never,
            1 => flattened.pop().expect("len is 1"),
            _ => MarkerTree::Or(flattened),
        }
    }

    /// Whether the marker holds in every environment.
    pub fn is_always(&self) -> bool {
        matches!(self, MarkerTree::Always)
    }

    /// Whether the marker holds in no environment.
    pub fn is_never(&self) -> bool {
        matches!(self, MarkerTree::Never)
    }

    /// Does this marker apply in the given environment?
    pub fn evaluate(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        match self {
            MarkerTree::Always => true,
            MarkerTree::Never => false,
            MarkerTree::Expression(expression) => expression.evaluate(env, extras),
            MarkerTree::And(children) => children.iter().all(|child| child.evaluate(env, extras)),
            MarkerTree::Or(children) => children.iter().any(|child| child.evaluate(env, extras)),
        }
    }

    /// The disjunctive normal form: a disjunction of conjunctions of clauses.
    ///
    /// `Always` is the disjunction of one empty conjunction, `Never` the
    /// empty disjunction.
    fn dnf(&self) -> Vec<Vec<MarkerExpression>> {
        match self {
            MarkerTree::Always => vec![Vec::new()],
            MarkerTree::Never => Vec::new(),
            MarkerTree::Expression(expression) => vec![vec![expression.clone()]],
            MarkerTree::Or(children) => children.iter().flat_map(MarkerTree::dnf).collect(),
            MarkerTree::And(children) => {
                let mut conjunctions: Vec<Vec<MarkerExpression>> = vec![Vec::new()];
                for child in children {
                    let child_dnf = child.dnf();
                    let mut next = Vec::with_capacity(conjunctions.len() * child_dnf.len());
                    for conjunction in &conjunctions {
                        for child_conjunction in &child_dnf {
                            let mut merged = conjunction.clone();
                            merged.extend(child_conjunction.iter().cloned());
                            next.push(merged);
                        }
                    }
                    conjunctions = next;
                }
                conjunctions
            }
        }
    }

    /// A marker equivalent to `self and other`, normalized to DNF with
    /// redundant and contradictory clauses eliminated.
    #[must_use]
    pub fn intersect(&self, other: &MarkerTree) -> MarkerTree {
        let mut conjunctions = Vec::new();
        for left in self.dnf() {
            for right in other.dnf() {
                let mut merged = left.clone();
                merged.extend(right.iter().cloned());
                if let Some(simplified) = simplify_conjunction(merged) {
                    if !conjunctions.contains(&simplified) {
                        conjunctions.push(simplified);
                    }
                }
            }
        }
        MarkerTree::or_of(conjunctions.into_iter().map(|conjunction| {
            MarkerTree::and_of(conjunction.into_iter().map(MarkerTree::Expression))
        }))
    }

    /// A marker equivalent to `self or other`.
    #[must_use]
    pub fn union(&self, other: &MarkerTree) -> MarkerTree {
        MarkerTree::or_of([self.clone(), other.clone()])
    }

    /// The residual marker with every `extra` clause removed.
    ///
    /// Used when projecting a dependency's marker into core metadata, where
    /// the extra condition is expressed separately.
    #[must_use]
    pub fn without_extras(&self) -> MarkerTree {
        self.exclude_matching(&|expression| expression.key == MarkerKey::Extra)
    }

    /// The residual marker with `extra == "<name>"` clauses removed.
    #[must_use]
    pub fn exclude_extra(&self, extra: &ExtraName) -> MarkerTree {
        self.exclude_matching(&|expression| {
            expression.key == MarkerKey::Extra
                && expression.operator == MarkerOperator::Equal
                && ExtraName::from_str(&expression.value).as_ref() == Ok(extra)
        })
    }

    fn exclude_matching(&self, predicate: &impl Fn(&MarkerExpression) -> bool) -> MarkerTree {
        match self {
            MarkerTree::Always => MarkerTree::Always,
            MarkerTree::Never => MarkerTree::Never,
            MarkerTree::Expression(expression) => {
                if predicate(expression) {
                    MarkerTree::Always
                } else {
                    MarkerTree::Expression(expression.clone())
                }
            }
            MarkerTree::And(children) => MarkerTree::and_of(
                children
                    .iter()
                    .map(|child| child.exclude_matching(predicate)),
            ),
            MarkerTree::Or(children) => {
                // Dropping a clause from a disjunction must not make the
                // whole disjunction trivially true.
                let remaining: Vec<MarkerTree> = children
                    .iter()
                    .map(|child| child.exclude_matching(predicate))
                    .filter(|child| !child.is_always())
                    .collect();
                if remaining.is_empty() {
                    MarkerTree::Always
                } else {
                    MarkerTree::or_of(remaining)
                }
            }
        }
    }

    /// Project the marker onto the python version attributes, returning the
    /// range of python versions in which the marker can hold.
    ///
    /// Clauses on other attributes are treated as satisfiable, so a marker
    /// with no python clause projects to the full range.
    pub fn only_python(&self) -> VersionRange {
        let conjunctions = self.dnf();
        if conjunctions.is_empty() {
            return VersionRange::empty();
        }
        let mut result = VersionRange::empty();
        for conjunction in conjunctions {
            let mut range = VersionRange::any();
            for expression in &conjunction {
                if let Some(expression_range) = expression.python_range() {
                    range = range.intersect(&expression_range);
                }
            }
            result = result.union(&range);
        }
        result
    }
}

/// Eliminate redundancy inside one conjunction of clauses. Returns `None`
/// when the conjunction is contradictory.
fn simplify_conjunction(atoms: Vec<MarkerExpression>) -> Option<Vec<MarkerExpression>> {
    // Exact duplicates first.
    let mut deduped: Vec<MarkerExpression> = Vec::with_capacity(atoms.len());
    for atom in atoms {
        if !deduped.contains(&atom) {
            deduped.push(atom);
        }
    }

    // Clauses on the python version attributes are folded through the range
    // algebra.
    let mut python_atoms = Vec::new();
    let mut rest = Vec::new();
    let mut python_key = None;
    for atom in deduped {
        if atom.key.is_python() && atom.python_range().is_some() {
            python_key.get_or_insert(atom.key);
            python_atoms.push(atom);
        } else {
            rest.push(atom);
        }
    }
    let mut simplified = Vec::new();
    if !python_atoms.is_empty() {
        let mut range = VersionRange::any();
        for atom in &python_atoms {
            range = range.intersect(&atom.python_range().expect("checked above"));
        }
        if range.is_empty() {
            return None;
        }
        match range.to_specifiers() {
            Some(specifiers) => {
                let key = python_key.expect("at least one python atom");
                simplified.extend(specifiers.iter().map(|specifier| MarkerExpression {
                    key,
                    operator: match specifier.operator() {
                        Operator::Equal => MarkerOperator::Equal,
                        Operator::GreaterThan => MarkerOperator::GreaterThan,
                        Operator::GreaterThanEqual => MarkerOperator::GreaterEqual,
                        Operator::LessThan => MarkerOperator::LessThan,
                        Operator::LessThanEqual => MarkerOperator::LessEqual,
                        _ => unreachable!("to_specifiers only emits bound operators"),
                    },
                    value: specifier.version().to_string(),
                }));
            }
            // The intersection is a union of intervals, which a conjunction
            // can't express: keep the original clauses.
            None => simplified.extend(python_atoms),
        }
    }

    // Pairwise literal implication for the string-valued attributes. `extra`
    // is exempt from the `==`/`==` contradiction: several extras can be
    // active at once.
    for index in 0..rest.len() {
        for other in &rest[..index] {
            if rest[index].key != other.key || rest[index].key == MarkerKey::Extra {
                continue;
            }
            let (left, right) = (&rest[index], other);
            let contradictory = match (left.operator, right.operator) {
                (MarkerOperator::Equal, MarkerOperator::Equal) => left.value != right.value,
                (MarkerOperator::Equal, MarkerOperator::NotEqual)
                | (MarkerOperator::NotEqual, MarkerOperator::Equal) => left.value == right.value,
                _ => false,
            };
            if contradictory {
                return None;
            }
        }
    }
    let mut filtered: Vec<MarkerExpression> = Vec::with_capacity(rest.len());
    for atom in &rest {
        // `key == a` implies `key != b`, drop the weaker clause.
        let implied = atom.operator == MarkerOperator::NotEqual
            && atom.key != MarkerKey::Extra
            && rest.iter().any(|other| {
                other.key == atom.key
                    && other.operator == MarkerOperator::Equal
                    && other.value != atom.value
            });
        if !implied {
            filtered.push(atom.clone());
        }
    }
    simplified.extend(filtered);
    Some(simplified)
}

impl Display for MarkerTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let format_inner = |child: &MarkerTree| {
            if matches!(child, MarkerTree::Expression(_)) {
                format!("{child}")
            } else {
                format!("({child})")
            }
        };
        match self {
            MarkerTree::Always => Ok(()),
            MarkerTree::Never => f.write_str("<empty>"),
            MarkerTree::Expression(expression) => write!(f, "{expression}"),
            MarkerTree::And(children) => f.write_str(
                &children
                    .iter()
                    .map(format_inner)
                    .collect::<Vec<String>>()
                    .join(" and "),
            ),
            MarkerTree::Or(children) => f.write_str(
                &children
                    .iter()
                    .map(format_inner)
                    .collect::<Vec<String>>()
                    .join(" or "),
            ),
        }
    }
}

impl FromStr for MarkerTree {
    type Err = RequirementParseError;

    fn from_str(markers: &str) -> Result<Self, Self::Err> {
        let mut cursor = Cursor::new(markers);
        let tree = parse_markers_cursor(&mut cursor)?;
        cursor.eat_whitespace();
        if let Some((pos, unexpected)) = cursor.next() {
            return Err(RequirementParseError {
                message: RequirementParseErrorKind::String(format!(
                    "Unexpected character '{unexpected}', expected end of input"
                )),
                start: pos,
                len: unexpected.len_utf8(),
                input: cursor.to_string(),
            });
        }
        Ok(tree)
    }
}

/// One side of a marker clause before normalization: an attribute or a quoted
/// literal.
enum MarkerValue {
    Key(MarkerKey),
    Literal(String),
}

/// ```text
/// marker_var = VARIABLE | quoted string
/// ```
fn parse_marker_value(cursor: &mut Cursor) -> Result<MarkerValue, RequirementParseError> {
    match cursor.peek() {
        None => Err(RequirementParseError {
            message: RequirementParseErrorKind::String(
                "Expected marker value, found end of dependency specification".to_string(),
            ),
            start: cursor.pos(),
            len: 1,
            input: cursor.to_string(),
        }),
        // It can be a string ...
        Some((start_pos, quotation_mark @ ('"' | '\''))) => {
            cursor.next();
            let (start, len) = cursor.take_while(|c| c != quotation_mark);
            let value = cursor.slice(start, len).to_string();
            cursor.next_expect_char(quotation_mark, start_pos)?;
            Ok(MarkerValue::Literal(value))
        }
        // ... or it can be a keyword
        Some(_) => {
            let (start, len) = cursor.take_while(|char| {
                !char.is_whitespace() && !['>', '=', '<', '!', '~', ')'].contains(&char)
            });
            let key = cursor.slice(start, len);
            MarkerKey::from_str(key)
                .map(MarkerValue::Key)
                .map_err(|_| RequirementParseError {
                    message: RequirementParseErrorKind::String(format!(
                        "Expected a valid marker name, found '{key}'"
                    )),
                    start,
                    len,
                    input: cursor.to_string(),
                })
        }
    }
}

/// ```text
/// version_cmp = wsp* <'<=' | '<' | '!=' | '==' | '>=' | '>' | '~=' | '==='>
/// marker_op   = version_cmp | (wsp* 'in') | (wsp* 'not' wsp+ 'in')
/// ```
fn parse_marker_operator(cursor: &mut Cursor) -> Result<MarkerOperator, RequirementParseError> {
    let (start, len) =
        cursor.take_while(|char| !char.is_whitespace() && char != '\'' && char != '"');
    let operator = cursor.slice(start, len);
    if operator == "not" {
        // 'not' wsp+ 'in'
        cursor.eat_whitespace();
        cursor.next_expect_char('i', cursor.pos())?;
        cursor.next_expect_char('n', cursor.pos())?;
        return Ok(MarkerOperator::NotIn);
    }
    MarkerOperator::from_str(operator).map_err(|_| RequirementParseError {
        message: RequirementParseErrorKind::String(format!(
            "Expected a valid marker operator (such as '>=' or 'not in'), found '{operator}'"
        )),
        start,
        len,
        input: cursor.to_string(),
    })
}

/// ```text
/// marker_expr = marker_var marker_op marker_var
/// ```
///
/// A clause is normalized so that the attribute ends up on the left: a
/// literal-first comparison flips the operator, a literal-first containment
/// becomes [`MarkerOperator::Contains`].
fn parse_marker_key_op_value(
    cursor: &mut Cursor,
) -> Result<MarkerExpression, RequirementParseError> {
    cursor.eat_whitespace();
    let expression_start = cursor.pos();
    let l_value = parse_marker_value(cursor)?;
    cursor.eat_whitespace();
    let operator = parse_marker_operator(cursor)?;
    cursor.eat_whitespace();
    let r_value = parse_marker_value(cursor)?;
    match (l_value, r_value) {
        (MarkerValue::Key(key), MarkerValue::Literal(value)) => Ok(MarkerExpression {
            key,
            operator,
            value,
        }),
        (MarkerValue::Literal(value), MarkerValue::Key(key)) => Ok(MarkerExpression {
            key,
            operator: operator.flip(),
            value,
        }),
        (MarkerValue::Literal(_), MarkerValue::Literal(_)) => Err(RequirementParseError {
            message: RequirementParseErrorKind::String(
                "Comparing two quoted strings with each other doesn't make sense".to_string(),
            ),
            start: expression_start,
            len: cursor.pos() - expression_start,
            input: cursor.to_string(),
        }),
        (MarkerValue::Key(_), MarkerValue::Key(_)) => Err(RequirementParseError {
            message: RequirementParseErrorKind::String(
                "Comparing two markers with each other doesn't make sense".to_string(),
            ),
            start: expression_start,
            len: cursor.pos() - expression_start,
            input: cursor.to_string(),
        }),
    }
}

/// ```text
/// marker_expr = marker_var marker_op marker_var
///             | wsp* '(' marker ')'
/// ```
fn parse_marker_expr(cursor: &mut Cursor) -> Result<MarkerTree, RequirementParseError> {
    cursor.eat_whitespace();
    if let Some(start_pos) = cursor.eat_char('(') {
        let marker = parse_marker_or(cursor)?;
        cursor.next_expect_char(')', start_pos)?;
        Ok(marker)
    } else {
        Ok(MarkerTree::Expression(parse_marker_key_op_value(cursor)?))
    }
}

/// ```text
/// marker_and = marker_expr ('and' marker_expr)*
/// ```
fn parse_marker_and(cursor: &mut Cursor) -> Result<MarkerTree, RequirementParseError> {
    parse_marker_op(cursor, "and", MarkerTree::And, parse_marker_expr)
}

/// ```text
/// marker_or = marker_and ('or' marker_and)*
/// ```
fn parse_marker_or(cursor: &mut Cursor) -> Result<MarkerTree, RequirementParseError> {
    parse_marker_op(cursor, "or", MarkerTree::Or, parse_marker_and)
}

/// Parses both `marker_and` and `marker_or`.
fn parse_marker_op(
    cursor: &mut Cursor,
    op: &str,
    op_constructor: fn(Vec<MarkerTree>) -> MarkerTree,
    parse_inner: fn(&mut Cursor) -> Result<MarkerTree, RequirementParseError>,
) -> Result<MarkerTree, RequirementParseError> {
    let first_element = parse_inner(cursor)?;
    cursor.eat_whitespace();
    // Check if we're done here instead of invoking the whole vec allocating loop.
    if matches!(cursor.peek_char(), None | Some(')')) {
        return Ok(first_element);
    }

    let mut expressions = Vec::with_capacity(1);
    expressions.push(first_element);
    loop {
        cursor.eat_whitespace();
        let (start, len) = cursor.peek_while(|c| !c.is_whitespace());
        match cursor.slice(start, len) {
            value if value == op => {
                cursor.take_while(|c| !c.is_whitespace());
                let expression = parse_inner(cursor)?;
                expressions.push(expression);
            }
            _ => {
                // Build the tree, but a single element doesn't need a node.
                return if expressions.len() == 1 {
                    Ok(expressions.pop().expect("len is 1"))
                } else {
                    Ok(op_constructor(expressions))
                };
            }
        }
    }
}

/// Parses a marker expression from a cursor positioned after the `;` of a
/// dependency specification.
pub(crate) fn parse_markers_cursor(
    cursor: &mut Cursor,
) -> Result<MarkerTree, RequirementParseError> {
    parse_marker_or(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> MarkerEnvironment {
        MarkerEnvironment {
            implementation_name: "cpython".to_string(),
            implementation_version: Version::from_str("3.11.4").unwrap(),
            os_name: "posix".to_string(),
            platform_machine: "x86_64".to_string(),
            platform_python_implementation: "CPython".to_string(),
            platform_release: "5.15.0".to_string(),
            platform_system: "Linux".to_string(),
            platform_version: "#1 SMP".to_string(),
            python_full_version: Version::from_str("3.11.4").unwrap(),
            python_version: Version::from_str("3.11").unwrap(),
            sys_platform: "linux".to_string(),
        }
    }

    #[track_caller]
    fn marker(string: &str) -> MarkerTree {
        MarkerTree::from_str(string).unwrap()
    }

    #[track_caller]
    fn extra(name: &str) -> ExtraName {
        ExtraName::from_str(name).unwrap()
    }

    #[test]
    fn evaluate_basic() {
        assert!(marker("python_version >= \"3.8\"").evaluate(&env(), &[]));
        assert!(!marker("python_version < '3.8'").evaluate(&env(), &[]));
        assert!(marker("sys_platform == 'linux'").evaluate(&env(), &[]));
        assert!(marker("os_name == 'posix' and python_full_version > '3.10.1'")
            .evaluate(&env(), &[]));
        assert!(marker("sys_platform == 'win32' or implementation_name == 'cpython'")
            .evaluate(&env(), &[]));
    }

    #[test]
    fn evaluate_containment() {
        assert!(marker("sys_platform in 'linux|darwin'").evaluate(&env(), &[]));
        assert!(marker("sys_platform in 'linux darwin'").evaluate(&env(), &[]));
        assert!(!marker("sys_platform in 'win32|darwin'").evaluate(&env(), &[]));
        assert!(marker("sys_platform not in 'win32 cygwin'").evaluate(&env(), &[]));
        // Substring semantics when the RHS is a single value.
        assert!(marker("platform_machine in 'x86_64v2'").evaluate(&env(), &[]));
        // The literal-first containment tests against the attribute value.
        assert!(marker("'linu' in sys_platform").evaluate(&env(), &[]));
        assert!(marker("'win' not in sys_platform").evaluate(&env(), &[]));
    }

    #[test]
    fn evaluate_extras() {
        let security = extra("security");
        assert!(marker("extra == 'security'").evaluate(&env(), &[security.clone()]));
        assert!(!marker("extra == 'security'").evaluate(&env(), &[]));
        assert!(marker("extra != 'security'").evaluate(&env(), &[]));
        // Extras normalize before comparison.
        assert!(marker("extra == 'Security'").evaluate(&env(), &[security]));
    }

    #[test]
    fn evaluate_reversed_comparison() {
        assert!(marker("'3.8' <= python_version").evaluate(&env(), &[]));
        assert!(!marker("'4.0' <= python_version").evaluate(&env(), &[]));
    }

    #[test]
    fn parse_precedence() {
        // `and` binds tighter than `or`.
        let tree = marker("os_name == 'a' or os_name == 'b' and sys_platform == 'c'");
        assert_eq!(
            tree.to_string(),
            "os_name == \"a\" or (os_name == \"b\" and sys_platform == \"c\")"
        );
        let grouped = marker("(os_name == 'a' or os_name == 'b') and sys_platform == 'c'");
        assert_eq!(
            grouped.to_string(),
            "(os_name == \"a\" or os_name == \"b\") and sys_platform == \"c\""
        );
    }

    #[test]
    fn parse_errors() {
        for invalid in [
            "bogus_key == 'x'",
            "os_name == ",
            "os_name",
            "'a' == 'b'",
            "os_name == 'a' garbage",
        ] {
            assert!(MarkerTree::from_str(invalid).is_err(), "`{invalid}`");
        }
    }

    #[test]
    fn intersect_identity() {
        let m = marker("sys_platform == 'linux'");
        assert_eq!(m.intersect(&MarkerTree::Always), m);
        assert_eq!(MarkerTree::Always.intersect(&m), m);
        assert_eq!(m.intersect(&MarkerTree::Never), MarkerTree::Never);
    }

    #[test]
    fn intersect_python_ranges() {
        let left = marker("python_version >= \"3.8\" and python_version < \"4.0\"");
        let right = marker("python_version < \"3.10\"");
        let intersected = left.intersect(&right);
        assert_eq!(
            intersected.to_string(),
            "python_version >= \"3.8\" and python_version < \"3.10\""
        );
    }

    #[test]
    fn intersect_contradiction() {
        let left = marker("python_version >= \"3.10\"");
        let right = marker("python_version < \"3.8\"");
        assert_eq!(left.intersect(&right), MarkerTree::Never);

        let left = marker("os_name == 'posix'");
        let right = marker("os_name == 'nt'");
        assert_eq!(left.intersect(&right), MarkerTree::Never);
    }

    #[test]
    fn intersect_redundancy() {
        let left = marker("os_name == 'posix'");
        let right = marker("os_name != 'nt'");
        assert_eq!(left.intersect(&right), left);
    }

    #[test]
    fn intersect_matches_conjunction_evaluation() {
        let pairs = [
            ("python_version >= '3.8'", "sys_platform == 'linux'"),
            ("os_name == 'posix'", "os_name != 'posix'"),
            (
                "python_version >= '3.8' or sys_platform == 'win32'",
                "python_version < '3.12'",
            ),
        ];
        for (left, right) in pairs {
            let (left, right) = (marker(left), marker(right));
            let intersected = left.intersect(&right);
            assert_eq!(
                intersected.evaluate(&env(), &[]),
                left.evaluate(&env(), &[]) && right.evaluate(&env(), &[]),
                "{left} ∧ {right}"
            );
        }
    }

    #[test]
    fn exclude_extras() {
        let m = marker("python_version >= '3.8' and extra == 'security'");
        assert_eq!(
            m.without_extras().to_string(),
            "python_version >= \"3.8\""
        );
        assert_eq!(
            m.exclude_extra(&extra("security")).to_string(),
            "python_version >= \"3.8\""
        );
        // A different extra stays.
        assert_eq!(m.exclude_extra(&extra("other")), m);
        // A marker that is nothing but the extra reduces to always-true.
        assert!(marker("extra == 'security'").without_extras().is_always());
    }

    #[test]
    fn only_python() {
        let range = marker("python_version >= '3.9' and python_version < '4.0'").only_python();
        assert_eq!(range, VersionRange::from_str(">=3.9,<4.0").unwrap());

        // `python_version == "3.9"` pins the whole 3.9 series.
        let range = marker("python_version == '3.9'").only_python();
        assert_eq!(range, VersionRange::from_str(">=3.9,<3.10").unwrap());

        // Clauses on other attributes don't constrain python.
        assert!(marker("sys_platform == 'linux'").only_python().is_any());

        // Disjunctions union.
        let range =
            marker("python_version < '3.8' or python_version >= '3.10'").only_python();
        assert!(range.contains(&Version::from_str("3.7").unwrap()));
        assert!(!range.contains(&Version::from_str("3.9").unwrap()));
        assert!(range.contains(&Version::from_str("3.11").unwrap()));

        assert!(MarkerTree::Never.only_python().is_empty());
    }

    #[test]
    fn display_round_trip() {
        for input in [
            "python_version >= \"3.8\"",
            "sys_platform == \"linux\" and extra == \"security\"",
            "os_name == \"a\" or (os_name == \"b\" and sys_platform == \"c\")",
            "\"linu\" in sys_platform",
        ] {
            assert_eq!(marker(input).to_string(), input);
            assert_eq!(marker(&marker(input).to_string()), marker(input));
        }
    }
}

//! The dependency model: a closed set of origin kinds with constraints,
//! extras, markers and group membership.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::warn;
use url::Url;

use trellis_normalize::{ExtraName, GroupName, PackageName};
use trellis_pep440::VersionRange;
use trellis_pep508::{MarkerTree, Requirement, VersionOrUrl};

use crate::pyproject::DependencyTable;
use crate::Diagnostics;

/// The version control systems a dependency may be fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsKind {
    Git,
    Hg,
    Svn,
    Bzr,
}

impl Display for VcsKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Git => "git",
            Self::Hg => "hg",
            Self::Svn => "svn",
            Self::Bzr => "bzr",
        })
    }
}

/// Which revision of a VCS origin to check out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum VcsReference {
    /// The repository's default branch.
    #[default]
    DefaultBranch,
    /// A named branch.
    Branch(String),
    /// A tag.
    Tag(String),
    /// An exact commit.
    Commit(String),
    /// An arbitrary ref, e.g. `refs/pull/1/head`.
    Ref(String),
}

impl VcsReference {
    /// The checkout target as it appears after `@` in a VCS URL, if pinned.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::DefaultBranch => None,
            Self::Branch(value) | Self::Tag(value) | Self::Commit(value) | Self::Ref(value) => {
                Some(value)
            }
        }
    }
}

/// Where a dependency comes from.
///
/// Only the registry kind carries a version constraint; the other kinds pin
/// their origin directly, so two direct dependencies are interchangeable
/// exactly when their origins coincide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencySource {
    /// A package from a registry, constrained by a version range.
    Registry {
        constraint: VersionRange,
        /// The named alternative registry to fetch from, if any.
        source: Option<String>,
    },
    /// A distribution archive on the local filesystem.
    Path { path: PathBuf },
    /// A source tree on the local filesystem.
    Directory {
        path: PathBuf,
        develop: bool,
        /// The build system the tree appears to use, probed from its
        /// `pyproject.toml` or `setup.py` when the tree exists.
        build_hint: Option<String>,
    },
    /// A distribution archive at a remote URL.
    Url { url: Url },
    /// A checkout from a version control system.
    Vcs {
        kind: VcsKind,
        url: String,
        reference: VcsReference,
        subdirectory: Option<String>,
        develop: bool,
    },
}

/// A single declared dependency of the package.
///
/// The identity of a dependency is the tuple (name, origin, extras, marker):
/// group membership and the optional flag describe where it is used, not what
/// it is.
#[derive(Debug, Clone)]
pub struct Dependency {
    /// The normalized name of the depended-upon package.
    pub name: PackageName,
    /// The origin kind with its constraint or pinned location.
    pub source: DependencySource,
    /// The extras activated on the dependency.
    pub extras: BTreeSet<ExtraName>,
    /// The environment gate; [`MarkerTree::Always`] when unconditional.
    pub marker: MarkerTree,
    /// The python versions the dependency applies to.
    pub python: VersionRange,
    /// Whether the dependency only applies when selected through an extra.
    pub optional: bool,
    /// Whether pre-release versions satisfy the constraint.
    pub allow_prereleases: bool,
    /// The dependency groups the dependency belongs to.
    pub groups: BTreeSet<GroupName>,
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.source == other.source
            && self.extras == other.extras
            && self.marker == other.marker
    }
}

impl Eq for Dependency {}

impl Hash for Dependency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.source.hash(state);
        self.extras.hash(state);
        self.marker.hash(state);
    }
}

/// Suffixes that make a local path a distribution archive rather than a
/// source tree.
const ARCHIVE_SUFFIXES: &[&str] = &[".whl", ".zip", ".tar.gz", ".tar.bz2"];

fn is_archive_path(path: &Path) -> bool {
    path.to_str().is_some_and(|path| {
        let path = path.to_ascii_lowercase();
        ARCHIVE_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
    })
}

/// Probe a source tree for the build system it uses; `None` when the tree
/// does not exist (yet) or declares nothing recognizable.
fn probe_build_hint(path: &Path) -> Option<String> {
    if path.join("pyproject.toml").is_file() {
        Some("pyproject".to_string())
    } else if path.join("setup.py").is_file() {
        Some("setuptools".to_string())
    } else {
        None
    }
}

impl Dependency {
    /// A registry dependency on any version, the starting point for builders.
    pub fn registry(name: PackageName, constraint: VersionRange) -> Self {
        Self {
            name,
            source: DependencySource::Registry {
                constraint,
                source: None,
            },
            extras: BTreeSet::new(),
            marker: MarkerTree::Always,
            python: VersionRange::any(),
            optional: false,
            allow_prereleases: false,
            groups: BTreeSet::new(),
        }
    }

    /// Build a dependency from a parsed dependency string.
    pub fn from_requirement(requirement: Requirement) -> Self {
        let marker = requirement.marker.unwrap_or(MarkerTree::Always);
        let python = marker.only_python();
        let source = match requirement.version_or_url {
            None => DependencySource::Registry {
                constraint: VersionRange::any(),
                source: None,
            },
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => DependencySource::Registry {
                constraint: VersionRange::from_specifiers(&specifiers),
                source: None,
            },
            Some(VersionOrUrl::Url(url)) => source_from_url(&url),
        };
        Self {
            name: requirement.name,
            source,
            extras: requirement.extras.into_iter().collect(),
            marker,
            python,
            optional: false,
            allow_prereleases: false,
            groups: BTreeSet::new(),
        }
    }

    /// Build a dependency from an inline declaration table, reporting every
    /// violated rule under `path`.
    pub(crate) fn from_table(
        name: &PackageName,
        table: &DependencyTable,
        path: &str,
        diagnostics: &mut Diagnostics,
    ) -> Option<Self> {
        let vcs = [
            (VcsKind::Git, &table.git),
            (VcsKind::Hg, &table.hg),
            (VcsKind::Svn, &table.svn),
            (VcsKind::Bzr, &table.bzr),
        ]
        .into_iter()
        .filter_map(|(kind, url)| Some((kind, url.clone()?)))
        .collect::<Vec<_>>();

        // Exactly one origin kind.
        let origins = usize::from(table.version.is_some())
            + usize::from(table.path.is_some())
            + usize::from(table.url.is_some())
            + vcs.len();
        if origins != 1 {
            diagnostics.error(
                path,
                "a dependency needs exactly one origin among `version`, `path`, `url` and a \
                version control system",
            );
            return None;
        }

        // At most one revision selector, and only for a VCS origin.
        let references = [
            ("branch", &table.branch),
            ("tag", &table.tag),
            ("rev", &table.rev),
            ("ref", &table.reference),
        ]
        .into_iter()
        .filter_map(|(key, value)| Some((key, value.clone()?)))
        .collect::<Vec<_>>();
        if references.len() > 1 {
            diagnostics.error(
                path,
                "`branch`, `tag`, `rev` and `ref` are mutually exclusive",
            );
            return None;
        }
        if vcs.is_empty() {
            if let Some((key, _)) = references.first() {
                diagnostics.error(path, format!("`{key}` requires a version control origin"));
                return None;
            }
            if table.subdirectory.is_some() {
                diagnostics.error(path, "`subdirectory` requires a version control origin");
                return None;
            }
        }

        let develop = table.develop.unwrap_or(false);
        let source = if let Some((kind, url)) = vcs.into_iter().next() {
            let reference = match references.into_iter().next() {
                None => VcsReference::DefaultBranch,
                Some(("branch", value)) => VcsReference::Branch(value),
                Some(("tag", value)) => VcsReference::Tag(value),
                Some(("rev", value)) => VcsReference::Commit(value),
                Some((_, value)) => VcsReference::Ref(value),
            };
            DependencySource::Vcs {
                kind,
                url,
                reference,
                subdirectory: table.subdirectory.clone(),
                develop,
            }
        } else if let Some(dependency_path) = &table.path {
            if is_archive_path(dependency_path) {
                if table.develop == Some(true) {
                    warn!("{path}: `develop` has no effect on an archive dependency, ignoring");
                }
                DependencySource::Path {
                    path: dependency_path.clone(),
                }
            } else {
                DependencySource::Directory {
                    path: dependency_path.clone(),
                    develop,
                    build_hint: probe_build_hint(dependency_path),
                }
            }
        } else if let Some(url) = &table.url {
            if table.develop == Some(true) {
                warn!("{path}: `develop` has no effect on a url dependency, ignoring");
            }
            match Url::parse(url) {
                Ok(url) => DependencySource::Url { url },
                Err(err) => {
                    diagnostics.error(path, format!("invalid url `{url}`: {err}"));
                    return None;
                }
            }
        } else {
            let version = table.version.as_deref().expect("an origin is present");
            if table.develop == Some(true) {
                warn!("{path}: `develop` has no effect on a registry dependency, ignoring");
            }
            match VersionRange::from_str(version) {
                Ok(constraint) => DependencySource::Registry {
                    constraint,
                    source: table.source.clone(),
                },
                Err(err) => {
                    diagnostics.error(path, err);
                    return None;
                }
            }
        };

        let mut extras = BTreeSet::new();
        for (index, extra) in table.extras.iter().flatten().enumerate() {
            match ExtraName::from_str(extra) {
                Ok(extra) => {
                    extras.insert(extra);
                }
                Err(err) => diagnostics.error(format!("{path}.extras[{index}]"), err),
            }
        }

        let mut marker = match &table.markers {
            Some(markers) => match MarkerTree::from_str(markers) {
                Ok(marker) => marker,
                Err(err) => {
                    diagnostics.error(format!("{path}.markers"), err);
                    MarkerTree::Always
                }
            },
            None => MarkerTree::Always,
        };
        let mut python = marker.only_python();

        // The `python` shorthand folds into both the marker and the range.
        if let Some(constraint) = &table.python {
            match VersionRange::from_str(constraint) {
                Ok(range) => {
                    python = python.intersect(&range);
                    if let Some(python_marker) = python_range_to_marker(&range) {
                        marker = marker.intersect(&python_marker);
                    }
                }
                Err(err) => diagnostics.error(format!("{path}.python"), err),
            }
        }

        Some(Self {
            name: name.clone(),
            source,
            extras,
            marker,
            python,
            optional: table.optional.unwrap_or(false),
            allow_prereleases: table.allow_prereleases.unwrap_or(false),
            groups: BTreeSet::new(),
        })
    }

    /// The canonical dependency string, e.g.
    /// `requests[security] (>=2.13,<3.0) ; python_version >= "3.8"`.
    pub fn to_dependency_string(&self) -> String {
        self.dependency_string_with_marker(&self.effective_marker())
    }

    /// The canonical dependency string with the given marker in place of the
    /// dependency's own, as used when expanding extras into core metadata.
    pub fn dependency_string_with_marker(&self, marker: &MarkerTree) -> String {
        let mut output = self.name.to_string();
        if !self.extras.is_empty() {
            output.push('[');
            output.push_str(
                &self
                    .extras
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<String>>()
                    .join(","),
            );
            output.push(']');
        }
        match &self.source {
            DependencySource::Registry { constraint, .. } => {
                if !constraint.is_any() {
                    output.push_str(&format!(" ({constraint})"));
                }
            }
            DependencySource::Path { path } | DependencySource::Directory { path, .. } => {
                output.push_str(&format!(" @ file://{}", posix_path(path)));
            }
            DependencySource::Url { url } => {
                output.push_str(&format!(" @ {url}"));
            }
            DependencySource::Vcs {
                kind,
                url,
                reference,
                subdirectory,
                ..
            } => {
                output.push_str(&format!(" @ {kind}+{url}"));
                if let Some(reference) = reference.as_str() {
                    output.push_str(&format!("@{reference}"));
                }
                if let Some(subdirectory) = subdirectory {
                    output.push_str(&format!("#subdirectory={subdirectory}"));
                }
            }
        }
        if !marker.is_always() {
            output.push_str(&format!(" ; {marker}"));
        }
        output
    }

    /// The marker with the per-dependency python constraint folded in.
    pub fn effective_marker(&self) -> MarkerTree {
        if self.python.is_any() {
            return self.marker.clone();
        }
        // When the marker already pins exactly this python range, don't
        // duplicate the clauses.
        if self.marker.only_python() == self.python {
            return self.marker.clone();
        }
        match python_range_to_marker(&self.python) {
            Some(python_marker) => self.marker.intersect(&python_marker),
            None => self.marker.clone(),
        }
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dependency_string())
    }
}

/// Forward slashes regardless of host platform; archives and dependency
/// strings are portable.
fn posix_path(path: &Path) -> String {
    let path = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        path.into_owned()
    } else {
        path.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Classify a dependency URL: `git+...` and friends are VCS origins,
/// `file://` paths are local, anything else is a plain url origin.
fn source_from_url(url: &Url) -> DependencySource {
    let scheme = url.scheme();
    if let Some((vcs, _)) = scheme.split_once('+') {
        let kind = match vcs {
            "git" => Some(VcsKind::Git),
            "hg" => Some(VcsKind::Hg),
            "svn" => Some(VcsKind::Svn),
            "bzr" => Some(VcsKind::Bzr),
            _ => None,
        };
        if let Some(kind) = kind {
            let stripped = url.as_str().trim_start_matches(&format!("{vcs}+"));
            // A trailing `@rev` selects the revision, a `#subdirectory=` the
            // project directory inside the checkout.
            let (stripped, subdirectory) = match stripped.split_once('#') {
                Some((stripped, fragment)) => (
                    stripped,
                    fragment
                        .strip_prefix("subdirectory=")
                        .map(ToString::to_string),
                ),
                None => (stripped, None),
            };
            let (url, reference) = match stripped.rsplit_once('@') {
                // Don't mistake `git@host:...` user info for a revision.
                Some((base, revision)) if !revision.contains('/') && base.contains("://") => (
                    base.to_string(),
                    VcsReference::Ref(revision.to_string()),
                ),
                _ => (stripped.to_string(), VcsReference::DefaultBranch),
            };
            return DependencySource::Vcs {
                kind,
                url,
                reference,
                subdirectory,
                develop: false,
            };
        }
    }
    if scheme == "file" {
        let path = PathBuf::from(url.path());
        if is_archive_path(&path) {
            return DependencySource::Path { path };
        }
        return DependencySource::Directory {
            build_hint: probe_build_hint(&path),
            path,
            develop: false,
        };
    }
    DependencySource::Url { url: url.clone() }
}

/// Express a python version range as `python_version` clauses, when it fits
/// in a conjunction.
fn python_range_to_marker(range: &VersionRange) -> Option<MarkerTree> {
    use trellis_pep508::{MarkerExpression, MarkerKey, MarkerOperator};

    let specifiers = range.to_specifiers()?;
    Some(MarkerTree::and_of(specifiers.iter().map(|specifier| {
        let operator = match specifier.operator() {
            trellis_pep440::Operator::Equal => MarkerOperator::Equal,
            trellis_pep440::Operator::GreaterThan => MarkerOperator::GreaterThan,
            trellis_pep440::Operator::GreaterThanEqual => MarkerOperator::GreaterEqual,
            trellis_pep440::Operator::LessThan => MarkerOperator::LessThan,
            trellis_pep440::Operator::LessThanEqual => MarkerOperator::LessEqual,
            _ => MarkerOperator::Equal,
        };
        MarkerTree::Expression(MarkerExpression {
            key: MarkerKey::PythonVersion,
            operator,
            value: specifier.version().to_string(),
        })
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchemaErrors;

    #[track_caller]
    fn name(value: &str) -> PackageName {
        PackageName::from_str(value).unwrap()
    }

    fn from_table(toml: &str) -> Result<Option<Dependency>, SchemaErrors> {
        let table: DependencyTable = toml::from_str(toml).unwrap();
        let mut diagnostics = Diagnostics::default();
        let dependency = Dependency::from_table(&name("demo"), &table, "demo", &mut diagnostics);
        diagnostics.finish().map(|()| dependency)
    }

    #[test]
    fn registry_from_string() {
        let requirement: Requirement = "requests[security]>=2.13,<3.0".parse().unwrap();
        let dependency = Dependency::from_requirement(requirement);
        assert_eq!(dependency.name.as_str(), "requests");
        assert_eq!(dependency.extras.len(), 1);
        assert!(dependency.marker.is_always());
        let DependencySource::Registry { constraint, .. } = &dependency.source else {
            panic!("expected a registry source");
        };
        assert_eq!(constraint.to_string(), ">=2.13,<3.0");
        assert_eq!(
            dependency.to_dependency_string(),
            "requests[security] (>=2.13,<3.0)"
        );
    }

    #[test]
    fn registry_from_table() {
        let dependency = from_table(r#"version = "^2.13""#).unwrap().unwrap();
        let DependencySource::Registry { constraint, .. } = &dependency.source else {
            panic!("expected a registry source");
        };
        assert_eq!(constraint.to_string(), ">=2.13,<3.0");
    }

    #[test]
    fn vcs_from_table() {
        let dependency = from_table(
            "git = \"https://github.com/pallets/flask\"\ntag = \"2.0.0\"",
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            dependency.to_dependency_string(),
            "demo @ git+https://github.com/pallets/flask@2.0.0"
        );
        let DependencySource::Vcs { reference, .. } = &dependency.source else {
            panic!("expected a vcs source");
        };
        assert_eq!(reference, &VcsReference::Tag("2.0.0".to_string()));
    }

    #[test]
    fn origin_exclusivity() {
        assert!(from_table("version = \"^1\"\npath = \"../demo\"").is_err());
        assert!(from_table("optional = true").is_err());
        assert!(
            from_table("git = \"https://x.example/r\"\nbranch = \"a\"\ntag = \"b\"").is_err()
        );
        assert!(from_table("version = \"^1\"\nbranch = \"main\"").is_err());
        assert!(from_table("version = \"^1\"\nsubdirectory = \"sub\"").is_err());
    }

    #[test]
    fn path_kind_split() {
        let directory = from_table(r#"path = "../demo""#).unwrap().unwrap();
        assert!(matches!(
            directory.source,
            DependencySource::Directory { .. }
        ));
        let archive = from_table(r#"path = "../demo-0.1.0.tar.gz""#)
            .unwrap()
            .unwrap();
        assert!(matches!(archive.source, DependencySource::Path { .. }));
    }

    #[test]
    fn python_folds_into_marker() {
        let dependency = from_table("version = \"^1\"\npython = \">=3.8,<4.0\"")
            .unwrap()
            .unwrap();
        assert_eq!(
            dependency.python,
            VersionRange::from_str(">=3.8,<4.0").unwrap()
        );
        assert_eq!(
            dependency.to_dependency_string(),
            "demo (>=1,<2) ; python_version >= \"3.8\" and python_version < \"4.0\""
        );
    }

    #[test]
    fn python_intersects_markers() {
        let dependency = from_table(
            "version = \"*\"\nmarkers = \"sys_platform == 'linux'\"\npython = \">=3.8\"",
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            dependency.effective_marker().to_string(),
            "python_version >= \"3.8\" and sys_platform == \"linux\""
        );
    }

    #[test]
    fn direct_equality_ignores_constraint() {
        let left: Requirement = "demo @ git+https://x.example/r.git@main".parse().unwrap();
        let right: Requirement = "demo @ git+https://x.example/r.git@main".parse().unwrap();
        assert_eq!(
            Dependency::from_requirement(left),
            Dependency::from_requirement(right)
        );

        let pinned: Requirement = "demo==1.0".parse().unwrap();
        let any: Requirement = "demo".parse().unwrap();
        assert_ne!(
            Dependency::from_requirement(pinned),
            Dependency::from_requirement(any)
        );
    }

    #[test]
    fn url_classification() {
        let requirement: Requirement = "demo @ https://x.example/demo-1.0-py3-none-any.whl"
            .parse()
            .unwrap();
        assert!(matches!(
            Dependency::from_requirement(requirement).source,
            DependencySource::Url { .. }
        ));

        let requirement: Requirement = "demo @ git+https://x.example/r.git@v1.0#subdirectory=demo"
            .parse()
            .unwrap();
        let dependency = Dependency::from_requirement(requirement);
        let DependencySource::Vcs {
            kind,
            url,
            reference,
            subdirectory,
            ..
        } = &dependency.source
        else {
            panic!("expected a vcs source");
        };
        assert_eq!(*kind, VcsKind::Git);
        assert_eq!(url, "https://x.example/r.git");
        assert_eq!(reference, &VcsReference::Ref("v1.0".to_string()));
        assert_eq!(subdirectory.as_deref(), Some("demo"));
    }
}

//! The serde surface of a `pyproject.toml`: the standardized `[project]`
//! table, the legacy `[tool.trellis]` table and `[build-system]`.
//!
//! This module only captures shape; cross-field rules, sub-grammar parsing
//! and the modern/legacy reconciliation live in [`crate::Package`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use trellis_normalize::PackageName;

/// A `pyproject.toml` as specified in PEP 517 and PEP 621.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct PyProjectToml {
    /// PEP 621-compliant project metadata.
    pub project: Option<Project>,
    /// Tool-specific tables; only `tool.trellis` is interpreted.
    pub tool: Option<Tool>,
    /// Build-related data.
    pub build_system: Option<BuildSystem>,
}

impl PyProjectToml {
    /// Parse a `PyProjectToml` from a raw TOML string.
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// The legacy table, if declared.
    pub(crate) fn trellis(&self) -> Option<&ToolTrellis> {
        self.tool.as_ref()?.trellis.as_ref()
    }
}

/// The `[project]` table as specified in
/// <https://packaging.python.org/en/latest/specifications/pyproject-toml>.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Project {
    /// The name of the project.
    pub name: PackageName,
    /// The version of the project; parsed during package assembly so that a
    /// malformed version aggregates with the other manifest errors.
    pub version: Option<String>,
    /// The summary description of the project in one line.
    pub description: Option<String>,
    /// The full description of the project (i.e. the README).
    pub readme: Option<Readme>,
    /// The Python version requirements of the project.
    pub requires_python: Option<String>,
    /// The license under which the project is distributed.
    pub license: Option<License>,
    /// The people or organizations considered to be the "authors" of the project.
    pub authors: Option<Vec<Contact>>,
    /// The people or organizations considered to be the "maintainers" of the project.
    pub maintainers: Option<Vec<Contact>>,
    /// The keywords for the project.
    pub keywords: Option<Vec<String>>,
    /// Trove classifiers which apply to the project.
    pub classifiers: Option<Vec<String>>,
    /// A table of URLs where the key is the URL label and the value is the URL itself.
    pub urls: Option<BTreeMap<String, String>>,
    /// The console entrypoints of the project.
    pub scripts: Option<BTreeMap<String, ScriptDecl>>,
    /// The GUI entrypoints of the project.
    pub gui_scripts: Option<BTreeMap<String, ScriptDecl>>,
    /// Entrypoint groups of the project; the key of the inner table is the
    /// name of the entry point and the value is the object reference.
    pub entry_points: Option<BTreeMap<String, BTreeMap<String, String>>>,
    /// The dependencies of the project as dependency strings.
    pub dependencies: Option<Vec<String>>,
    /// The optional dependencies of the project, keyed by extra.
    pub optional_dependencies: Option<BTreeMap<String, Vec<String>>>,
    /// Fields intentionally unspecified here so the legacy table (or a
    /// frontend) can supply them.
    pub dynamic: Option<Vec<String>>,
}

/// The `project.readme` key: a path, several paths, or a file table.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged, rename_all = "kebab-case")]
pub enum Readme {
    /// Relative path to the README.
    Path(PathBuf),
    /// Several READMEs, concatenated in order into the description.
    Paths(Vec<PathBuf>),
    /// Relative path to the README plus an explicit content type.
    File {
        file: PathBuf,
        content_type: Option<String>,
    },
}

impl Readme {
    /// The referenced paths, in declaration order.
    pub(crate) fn paths(&self) -> Vec<PathBuf> {
        match self {
            Self::Path(path) => vec![path.clone()],
            Self::Paths(paths) => paths.clone(),
            Self::File { file, .. } => vec![file.clone()],
        }
    }
}

/// The `project.license` key: a literal, `{ text = ... }` or `{ file = ... }`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum License {
    /// A literal license string such as `MIT`.
    Literal(String),
    Text {
        /// The full text of the license.
        text: String,
    },
    File {
        /// The file containing the license text.
        file: PathBuf,
    },
}

/// A `project.authors` or `project.maintainers` entry: either the
/// `Display Name <email@host>` string form or a table with `name` and/or
/// `email` keys.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged, expecting = "a string or a table with 'name' and/or 'email' keys")]
pub enum Contact {
    /// `"Display Name <email@host>"`
    String(String),
    NameEmail {
        name: String,
        email: String,
    },
    Name {
        name: String,
    },
    Email {
        email: String,
    },
}

/// A script target: an object reference such as `mod.sub:callable`, or a
/// file reference `{ path = "...", type = "file" }`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ScriptDecl {
    /// `mod.sub:callable`
    Reference(String),
    /// A file shipped verbatim as the script.
    File {
        path: PathBuf,
        #[serde(rename = "type")]
        kind: String,
    },
}

/// The `[tool]` table; only the `trellis` entry is interpreted.
#[derive(Deserialize, Debug, Clone)]
pub struct Tool {
    pub trellis: Option<ToolTrellis>,
}

/// The legacy `[tool.trellis]` table.
///
/// Fields here may only take effect when the `[project]` table is absent or
/// defers the field via `dynamic`.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ToolTrellis {
    pub name: Option<PackageName>,
    pub version: Option<String>,
    pub description: Option<String>,
    /// A single path or a list of paths.
    pub readme: Option<Readme>,
    /// `"Display Name <email@host>"` strings.
    pub authors: Option<Vec<Contact>>,
    pub maintainers: Option<Vec<Contact>>,
    pub license: Option<License>,
    pub keywords: Option<Vec<String>>,
    pub classifiers: Option<Vec<String>>,
    /// Shorthand URL keys, folded into the project URL map.
    pub homepage: Option<String>,
    pub repository: Option<String>,
    pub documentation: Option<String>,
    pub urls: Option<BTreeMap<String, String>>,
    /// The runtime dependencies, either constraint strings or inline tables.
    /// The reserved `python` key constrains the python version instead.
    pub dependencies: Option<BTreeMap<String, DependencyDecl>>,
    /// Legacy alias for the `dev` group.
    pub dev_dependencies: Option<BTreeMap<String, DependencyDecl>>,
    /// Dependency groups beyond the runtime one.
    pub group: Option<BTreeMap<String, DependencyGroup>>,
    /// Extras, mapping an extra name to dependency names of the runtime group.
    pub extras: Option<BTreeMap<String, Vec<String>>>,
    pub scripts: Option<BTreeMap<String, ScriptDecl>>,
    /// Entry point groups, mirroring `project.entry-points`.
    pub plugins: Option<BTreeMap<String, BTreeMap<String, String>>>,
    /// The source layout: packages to ship.
    pub packages: Option<Vec<PackageDecl>>,
    /// Extra files to ship, beyond the declared packages.
    pub include: Option<Vec<IncludeDecl>>,
    /// Patterns to drop from the declared packages.
    pub exclude: Option<Vec<String>>,
    /// Build-time configuration for native extensions.
    pub build: Option<BuildDecl>,
    /// Accept classifiers outside the known vocabulary.
    pub allow_unknown_classifiers: Option<bool>,
}

/// A dependency declaration: a plain constraint string or an inline table.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum DependencyDecl {
    /// `requests = "^2.13"`
    Constraint(String),
    /// `requests = { version = "^2.13", extras = ["security"] }`
    Table(DependencyTable),
}

/// The inline table form of a dependency declaration.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct DependencyTable {
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub git: Option<String>,
    pub hg: Option<String>,
    pub svn: Option<String>,
    pub bzr: Option<String>,
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub rev: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub subdirectory: Option<String>,
    pub extras: Option<Vec<String>>,
    pub markers: Option<String>,
    pub python: Option<String>,
    pub optional: Option<bool>,
    pub develop: Option<bool>,
    pub allow_prereleases: Option<bool>,
    /// The named repository to fetch a registry dependency from.
    pub source: Option<String>,
}

/// A `[tool.trellis.group.<name>]` table.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct DependencyGroup {
    pub dependencies: Option<BTreeMap<String, DependencyDecl>>,
    /// An optional group is skipped by installers unless requested.
    pub optional: Option<bool>,
}

/// One entry of `tool.trellis.packages`.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct PackageDecl {
    /// The package directory (or glob) to ship.
    pub include: String,
    /// The directory the package lives in, e.g. `src`.
    pub from: Option<PathBuf>,
    /// Which distribution formats the entry applies to.
    pub format: Option<FormatDecl>,
}

/// One entry of `tool.trellis.include`: a pattern, optionally gated to one
/// distribution format.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum IncludeDecl {
    Pattern(String),
    Table {
        path: String,
        format: Option<FormatDecl>,
    },
}

/// A format selector: one format or a list of them.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum FormatDecl {
    One(String),
    Many(Vec<String>),
}

impl FormatDecl {
    pub(crate) fn names(&self) -> Vec<&str> {
        match self {
            Self::One(format) => vec![format.as_str()],
            Self::Many(formats) => formats.iter().map(String::as_str).collect(),
        }
    }
}

/// The `[tool.trellis.build]` table.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct BuildDecl {
    /// A python script run at build time to produce native extensions.
    pub script: Option<PathBuf>,
}

/// The `[build-system]` table as specified in PEP 517.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct BuildSystem {
    /// Dependency strings required to execute the build system.
    pub requires: Vec<String>,
    /// A string naming the backend used to perform the build.
    pub build_backend: Option<String>,
    /// <https://peps.python.org/pep-0517/#in-tree-build-backends>
    pub backend_path: Option<Vec<String>>,
}

//! Assembly of the validated [`Package`] from the raw manifest tables,
//! including the modern/legacy reconciliation rule.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use indexmap::IndexMap;
use tracing::warn;

use trellis_normalize::{ExtraName, GroupName, PackageName, MAIN_GROUP};
use trellis_pep440::{Version, VersionRange, VersionSpecifiers};
use trellis_pep508::Requirement;

use crate::pyproject::{
    Contact as ContactDecl, DependencyDecl, FormatDecl, IncludeDecl, License, PyProjectToml,
    ScriptDecl, ToolTrellis,
};
use crate::{Dependency, Diagnostics, ManifestError};

/// A person or organization, resolved from either the
/// `Display Name <email@host>` string form or the structured table form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Display for Contact {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.email) {
            (Some(name), Some(email)) => write!(f, "{name} <{email}>"),
            (Some(name), None) => write!(f, "{name}"),
            (None, Some(email)) => write!(f, "{email}"),
            (None, None) => Ok(()),
        }
    }
}

/// A validated script target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptTarget {
    /// An object reference such as `mod.sub:callable`.
    Reference { module: String, object: String },
    /// A file shipped verbatim.
    File { path: PathBuf },
}

impl Display for ScriptTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference { module, object } => write!(f, "{module}:{object}"),
            Self::File { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Which distribution formats an include entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Formats {
    pub sdist: bool,
    pub wheel: bool,
}

impl Formats {
    /// Included in both distribution formats.
    pub fn both() -> Self {
        Self {
            sdist: true,
            wheel: true,
        }
    }
}

/// A `packages` entry of the source layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInclude {
    /// The package directory (or glob) to ship.
    pub include: String,
    /// The directory the package lives in, e.g. `src`.
    pub from: Option<PathBuf>,
    /// Which distribution formats the entry applies to.
    pub formats: Formats,
}

/// An extra `include` entry beyond the declared packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeEntry {
    /// The file or glob to ship.
    pub path: String,
    /// Which distribution formats the entry applies to.
    pub formats: Formats,
}

/// Build-time configuration for native extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// The python script run at build time.
    pub script: PathBuf,
}

/// The fields the `[project]` table may defer via `dynamic`.
const DYNAMIC_FIELDS: &[&str] = &[
    "version",
    "description",
    "readme",
    "requires-python",
    "license",
    "authors",
    "maintainers",
    "keywords",
    "classifiers",
    "urls",
    "scripts",
    "gui-scripts",
    "entry-points",
    "dependencies",
    "optional-dependencies",
];

/// The closed vocabulary of top-level trove classifier categories.
const CLASSIFIER_CATEGORIES: &[&str] = &[
    "Development Status",
    "Environment",
    "Framework",
    "Intended Audience",
    "License",
    "Natural Language",
    "Operating System",
    "Programming Language",
    "Topic",
    "Typing",
];

/// The root entity: a validated package with its dependency groups, extras,
/// scripts, entry points and build configuration.
///
/// Immutable after assembly, except for the version, which a frontend may
/// assign once when the manifest defers it.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: PackageName,
    version: Option<Version>,
    pub description: Option<String>,
    /// The readme files, concatenated in order into the long description.
    pub readmes: Vec<PathBuf>,
    pub requires_python: VersionRange,
    pub license: Option<License>,
    pub authors: Vec<Contact>,
    pub maintainers: Vec<Contact>,
    pub keywords: Vec<String>,
    pub classifiers: Vec<String>,
    pub urls: IndexMap<String, String>,
    /// The dependency groups; the runtime group is `main`.
    pub dependency_groups: IndexMap<GroupName, Vec<Dependency>>,
    /// The extras, mapping an extra name to dependency names of `main`.
    pub extras: IndexMap<ExtraName, Vec<PackageName>>,
    pub scripts: IndexMap<String, ScriptTarget>,
    pub gui_scripts: IndexMap<String, ScriptTarget>,
    /// Entry point groups beyond the script groups.
    pub entry_points: IndexMap<String, IndexMap<String, String>>,
    /// The source layout; empty when the module is inferred from the name.
    pub packages: Vec<PackageInclude>,
    pub include: Vec<IncludeEntry>,
    pub exclude: Vec<String>,
    pub build: Option<BuildConfig>,
    /// The `[build-system] requires` entries, verbatim.
    pub build_requires: Vec<String>,
    /// The fields deferred by `project.dynamic`.
    pub dynamic: BTreeSet<String>,
}

impl Package {
    /// The package version, if the manifest (or a frontend) supplied one.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Supply the version for a manifest that defers it. A frontend may do
    /// this once, before artifact emission.
    pub fn set_version(&mut self, version: Version) -> Result<(), ManifestError> {
        if let Some(existing) = &self.version {
            return Err(ManifestError::VersionAlreadySet(existing.to_string()));
        }
        self.version = Some(version);
        Ok(())
    }

    /// The runtime dependencies.
    pub fn main_dependencies(&self) -> &[Dependency] {
        self.dependency_groups
            .get(&*MAIN_GROUP)
            .map_or(&[], Vec::as_slice)
    }

    /// Interpret a parsed manifest, collecting every validation error.
    pub fn from_pyproject(pyproject: &PyProjectToml) -> Result<Self, ManifestError> {
        let mut diagnostics = Diagnostics::default();
        let project = pyproject.project.as_ref();
        let legacy = pyproject.trellis();

        // The package name is the one field that can never be dynamic.
        let name = match (project.map(|p| &p.name), legacy.and_then(|l| l.name.as_ref())) {
            (Some(modern), Some(_)) => {
                diagnostics.error(
                    "tool.trellis.name",
                    "`name` is declared in `[project]` and cannot be overridden",
                );
                modern.clone()
            }
            (Some(modern), None) => modern.clone(),
            (None, Some(legacy)) => legacy.clone(),
            (None, None) => {
                diagnostics.error("project.name", "a package needs a name");
                diagnostics.finish()?;
                unreachable!("finish reported an error");
            }
        };

        let dynamic: BTreeSet<String> = project
            .and_then(|project| project.dynamic.clone())
            .unwrap_or_default()
            .into_iter()
            .collect();
        for field in &dynamic {
            if field == "name" {
                diagnostics.error("project.dynamic", "`name` must not be dynamic");
            } else if !DYNAMIC_FIELDS.contains(&field.as_str()) {
                diagnostics.error(
                    "project.dynamic",
                    format!("`{field}` is not a field that can be dynamic"),
                );
            }
        }

        let project_present = project.is_some();

        // Version.
        let modern_version = project.and_then(|p| p.version.as_ref());
        let legacy_version = legacy.and_then(|l| l.version.as_ref());
        let version_from_legacy = use_legacy(
            "version",
            project_present,
            &dynamic,
            modern_version.is_some(),
            legacy_version.is_some(),
            &mut diagnostics,
        );
        let (version_text, version_path) = if version_from_legacy {
            (legacy_version, "tool.trellis.version")
        } else {
            (modern_version, "project.version")
        };
        let version = version_text.and_then(|text| match Version::from_str(text) {
            Ok(version) => Some(version),
            Err(err) => {
                diagnostics.error(version_path, err);
                None
            }
        });
        if version.is_none()
            && project.is_some()
            && modern_version.is_none()
            && !dynamic.contains("version")
        {
            diagnostics.error(
                "project.version",
                "a version is required unless it is listed in `project.dynamic`",
            );
        }

        // Scalar metadata.
        let description = pick(
            "description",
            project_present,
            &dynamic,
            project.and_then(|p| p.description.clone()),
            legacy.and_then(|l| l.description.clone()),
            &mut diagnostics,
        );
        if let Some(description) = &description {
            if description.contains('\n') {
                diagnostics.error("project.description", "must be a single line");
            }
        }

        let readme = pick(
            "readme",
            project_present,
            &dynamic,
            project.and_then(|p| p.readme.clone()),
            legacy.and_then(|l| l.readme.clone()),
            &mut diagnostics,
        );
        let readmes = readme.map(|readme| readme.paths()).unwrap_or_default();
        validate_readmes(&readmes, &mut diagnostics);

        let license = pick(
            "license",
            project_present,
            &dynamic,
            project.and_then(|p| p.license.clone()),
            legacy.and_then(|l| l.license.clone()),
            &mut diagnostics,
        );

        let authors = pick(
            "authors",
            project_present,
            &dynamic,
            project.and_then(|p| p.authors.clone()),
            legacy.and_then(|l| l.authors.clone()),
            &mut diagnostics,
        )
        .unwrap_or_default();
        let authors = resolve_contacts(&authors, "project.authors", &mut diagnostics);
        let maintainers = pick(
            "maintainers",
            project_present,
            &dynamic,
            project.and_then(|p| p.maintainers.clone()),
            legacy.and_then(|l| l.maintainers.clone()),
            &mut diagnostics,
        )
        .unwrap_or_default();
        let maintainers = resolve_contacts(&maintainers, "project.maintainers", &mut diagnostics);

        let keywords = pick(
            "keywords",
            project_present,
            &dynamic,
            project.and_then(|p| p.keywords.clone()),
            legacy.and_then(|l| l.keywords.clone()),
            &mut diagnostics,
        )
        .unwrap_or_default();

        let allow_unknown_classifiers = legacy
            .and_then(|l| l.allow_unknown_classifiers)
            .unwrap_or(false);
        let classifiers = pick(
            "classifiers",
            project_present,
            &dynamic,
            project.and_then(|p| p.classifiers.clone()),
            legacy.and_then(|l| l.classifiers.clone()),
            &mut diagnostics,
        )
        .unwrap_or_default();
        validate_classifiers(&classifiers, allow_unknown_classifiers, &mut diagnostics);

        // URLs; the legacy shorthand keys fold into the map.
        let legacy_urls = legacy.map(legacy_url_map).unwrap_or_default();
        let urls: IndexMap<String, String> = if use_legacy(
            "urls",
            project_present,
            &dynamic,
            project.is_some_and(|p| p.urls.is_some()),
            !legacy_urls.is_empty(),
            &mut diagnostics,
        ) {
            legacy_urls
        } else {
            project
                .and_then(|p| p.urls.clone())
                .unwrap_or_default()
                .into_iter()
                .collect()
        };

        // Python requirement: `project.requires-python` or the reserved
        // `python` key of the legacy dependency table.
        let legacy_python = legacy
            .and_then(|l| l.dependencies.as_ref())
            .and_then(|dependencies| dependencies.get("python"));
        let requires_python = if use_legacy(
            "requires-python",
            project_present,
            &dynamic,
            project.is_some_and(|p| p.requires_python.is_some()),
            legacy_python.is_some(),
            &mut diagnostics,
        ) {
            match legacy_python.expect("checked above") {
                DependencyDecl::Constraint(constraint) => {
                    match VersionRange::from_str(constraint) {
                        Ok(range) => range,
                        Err(err) => {
                            diagnostics.error("tool.trellis.dependencies.python", err);
                            VersionRange::any()
                        }
                    }
                }
                DependencyDecl::Table(_) => {
                    diagnostics.error(
                        "tool.trellis.dependencies.python",
                        "the python requirement must be a constraint string",
                    );
                    VersionRange::any()
                }
            }
        } else if let Some(requires_python) = project.and_then(|p| p.requires_python.as_ref()) {
            match VersionSpecifiers::from_str(requires_python) {
                Ok(specifiers) => VersionRange::from_specifiers(&specifiers),
                Err(err) => {
                    diagnostics.error("project.requires-python", err);
                    VersionRange::any()
                }
            }
        } else {
            VersionRange::any()
        };

        // Dependency groups.
        let mut dependency_groups: IndexMap<GroupName, Vec<Dependency>> = IndexMap::new();
        let mut extras: IndexMap<ExtraName, Vec<PackageName>> = IndexMap::new();

        let legacy_has_dependencies = legacy.is_some_and(|l| {
            l.dependencies
                .as_ref()
                .is_some_and(|d| d.keys().any(|k| k != "python"))
        });
        let dependencies_from_legacy = use_legacy(
            "dependencies",
            project_present,
            &dynamic,
            project.is_some_and(|p| p.dependencies.is_some()),
            legacy_has_dependencies,
            &mut diagnostics,
        );

        let mut main = Vec::new();
        if dependencies_from_legacy {
            let declarations = legacy
                .and_then(|l| l.dependencies.as_ref())
                .expect("checked above");
            for (dependency_name, declaration) in declarations {
                if dependency_name == "python" {
                    continue;
                }
                let path = format!("tool.trellis.dependencies.{dependency_name}");
                if let Some(dependency) = resolve_declaration(
                    dependency_name,
                    declaration,
                    &path,
                    &mut diagnostics,
                ) {
                    main.push(dependency);
                }
            }
        } else if let Some(dependencies) = project.and_then(|p| p.dependencies.as_ref()) {
            for (index, dependency) in dependencies.iter().enumerate() {
                let path = format!("project.dependencies[{index}]");
                match Requirement::from_str(dependency) {
                    Ok(requirement) => main.push(Dependency::from_requirement(requirement)),
                    Err(err) => diagnostics.error(path, err),
                }
            }
        }

        // Extras: the modern optional-dependencies table creates the optional
        // dependencies itself, the legacy extras table references them.
        let extras_from_legacy = use_legacy(
            "optional-dependencies",
            project_present,
            &dynamic,
            project.is_some_and(|p| p.optional_dependencies.is_some()),
            legacy.is_some_and(|l| l.extras.is_some()),
            &mut diagnostics,
        );
        if !extras_from_legacy {
            if let Some(optional) = project.and_then(|p| p.optional_dependencies.as_ref()) {
                for (extra, requirements) in optional {
                    let extra = match ExtraName::from_str(extra) {
                        Ok(extra) => extra,
                        Err(err) => {
                            diagnostics
                                .error(format!("project.optional-dependencies.{extra}"), err);
                            continue;
                        }
                    };
                    let mut names = Vec::new();
                    for (index, requirement) in requirements.iter().enumerate() {
                        let path =
                            format!("project.optional-dependencies.{extra}[{index}]");
                        match Requirement::from_str(requirement) {
                            Ok(requirement) => {
                                let mut dependency = Dependency::from_requirement(requirement);
                                dependency.optional = true;
                                names.push(dependency.name.clone());
                                main.push(dependency);
                            }
                            Err(err) => diagnostics.error(path, err),
                        }
                    }
                    extras.insert(extra, names);
                }
            }
        }

        for dependency in &mut main {
            dependency.groups.insert(MAIN_GROUP.clone());
        }
        dependency_groups.insert(MAIN_GROUP.clone(), main);

        // Legacy groups, including the `dev-dependencies` alias.
        if let Some(legacy) = legacy {
            let mut groups: Vec<(GroupName, &std::collections::BTreeMap<String, DependencyDecl>)> =
                Vec::new();
            if let Some(dev) = &legacy.dev_dependencies {
                groups.push((GroupName::from_str("dev").expect("a valid group name"), dev));
            }
            for (group_name, group) in legacy.group.iter().flatten() {
                match GroupName::from_str(group_name) {
                    Ok(group_name) => {
                        if let Some(dependencies) = &group.dependencies {
                            groups.push((group_name, dependencies));
                        }
                    }
                    Err(err) => {
                        diagnostics.error(format!("tool.trellis.group.{group_name}"), err);
                    }
                }
            }
            for (group_name, declarations) in groups {
                for (dependency_name, declaration) in declarations {
                    let path =
                        format!("tool.trellis.group.{group_name}.dependencies.{dependency_name}");
                    if let Some(mut dependency) = resolve_declaration(
                        dependency_name,
                        declaration,
                        &path,
                        &mut diagnostics,
                    ) {
                        dependency.groups.insert(group_name.clone());
                        dependency_groups
                            .entry(group_name.clone())
                            .or_default()
                            .push(dependency);
                    }
                }
            }

            // Legacy extras reference dependencies of the runtime group.
            if extras_from_legacy {
                let main = dependency_groups
                    .get(&*MAIN_GROUP)
                    .expect("the main group is always present");
                for (extra, references) in legacy.extras.iter().flatten() {
                    let path = format!("tool.trellis.extras.{extra}");
                    let extra = match ExtraName::from_str(extra) {
                        Ok(extra) => extra,
                        Err(err) => {
                            diagnostics.error(path, err);
                            continue;
                        }
                    };
                    let mut names = Vec::new();
                    for reference in references {
                        let Ok(reference) = PackageName::from_str(reference) else {
                            diagnostics.error(path.clone(), format!("invalid name `{reference}`"));
                            continue;
                        };
                        match main.iter().find(|dependency| dependency.name == reference) {
                            None => diagnostics.error(
                                path.clone(),
                                format!(
                                    "`{reference}` is not a dependency of the runtime group"
                                ),
                            ),
                            Some(dependency) => {
                                if !dependency.optional {
                                    warn!(
                                        "{path}: `{reference}` is referenced by an extra but \
                                        not marked optional"
                                    );
                                }
                                names.push(reference);
                            }
                        }
                    }
                    extras.insert(extra, names);
                }
            }
        }

        // Scripts and entry points.
        let scripts_from_legacy = use_legacy(
            "scripts",
            project_present,
            &dynamic,
            project.is_some_and(|p| p.scripts.is_some()),
            legacy.is_some_and(|l| l.scripts.is_some()),
            &mut diagnostics,
        );
        let (script_decls, scripts_path) = if scripts_from_legacy {
            (legacy.and_then(|l| l.scripts.clone()), "tool.trellis.scripts")
        } else {
            (project.and_then(|p| p.scripts.clone()), "project.scripts")
        };
        let scripts = resolve_scripts(script_decls, scripts_path, &mut diagnostics);
        let gui_scripts = resolve_scripts(
            project.and_then(|p| p.gui_scripts.clone()),
            "project.gui-scripts",
            &mut diagnostics,
        );

        let entry_points_from_legacy = use_legacy(
            "entry-points",
            project_present,
            &dynamic,
            project.is_some_and(|p| p.entry_points.is_some()),
            legacy.is_some_and(|l| l.plugins.is_some()),
            &mut diagnostics,
        );
        let (entry_point_decls, entry_points_path) = if entry_points_from_legacy {
            (legacy.and_then(|l| l.plugins.clone()), "tool.trellis.plugins")
        } else {
            (
                project.and_then(|p| p.entry_points.clone()),
                "project.entry-points",
            )
        };
        let mut entry_points: IndexMap<String, IndexMap<String, String>> = IndexMap::new();
        for (group, entries) in entry_point_decls.into_iter().flatten() {
            let path = format!("{entry_points_path}.{group}");
            if group == "console_scripts" || group == "gui_scripts" {
                diagnostics.error(
                    path,
                    "use the scripts tables instead of the reserved entry point groups",
                );
                continue;
            }
            if !is_valid_entry_point_group(&group) {
                diagnostics.error(
                    path,
                    "entry point groups must consist of letters and numbers separated by dots",
                );
                continue;
            }
            let mut resolved = IndexMap::new();
            for (entry_name, target) in entries {
                if !is_valid_entry_point_name(&entry_name) {
                    diagnostics.error(
                        format!("{path}.{entry_name}"),
                        "entry point names must consist of letters, numbers, dots and dashes",
                    );
                    continue;
                }
                resolved.insert(entry_name, target);
            }
            entry_points.insert(group, resolved);
        }

        // Source layout and build configuration, legacy-table only.
        let mut packages = Vec::new();
        for (index, declaration) in legacy.and_then(|l| l.packages.as_ref()).iter().flat_map(|p| p.iter()).enumerate() {
            let path = format!("tool.trellis.packages[{index}]");
            let formats = resolve_formats(declaration.format.as_ref(), &path, &mut diagnostics);
            packages.push(PackageInclude {
                include: declaration.include.clone(),
                from: declaration.from.clone(),
                formats,
            });
        }
        let mut include = Vec::new();
        for (index, declaration) in legacy.and_then(|l| l.include.as_ref()).iter().flat_map(|i| i.iter()).enumerate() {
            let path = format!("tool.trellis.include[{index}]");
            let entry = match declaration {
                IncludeDecl::Pattern(pattern) => IncludeEntry {
                    path: pattern.clone(),
                    formats: Formats::both(),
                },
                IncludeDecl::Table { path: pattern, format } => IncludeEntry {
                    path: pattern.clone(),
                    formats: resolve_formats(format.as_ref(), &path, &mut diagnostics),
                },
            };
            include.push(entry);
        }
        let exclude = legacy
            .and_then(|l| l.exclude.clone())
            .unwrap_or_default();
        let build = legacy
            .and_then(|l| l.build.as_ref())
            .and_then(|build| build.script.clone())
            .map(|script| BuildConfig { script });
        let build_requires = pyproject
            .build_system
            .as_ref()
            .map(|build_system| build_system.requires.clone())
            .unwrap_or_default();

        diagnostics.finish()?;

        Ok(Self {
            name,
            version,
            description,
            readmes,
            requires_python,
            license,
            authors,
            maintainers,
            keywords,
            classifiers,
            urls,
            dependency_groups,
            extras,
            scripts,
            gui_scripts,
            entry_points,
            packages,
            include,
            exclude,
            build,
            build_requires,
            dynamic,
        })
    }
}

/// A field declared in `[project]` must not be re-declared in the legacy
/// table unless it is listed in `dynamic`, in which case the legacy value
/// wins. Returns whether the legacy value is the effective one.
fn use_legacy(
    field: &str,
    project_present: bool,
    dynamic: &BTreeSet<String>,
    modern_declared: bool,
    legacy_declared: bool,
    diagnostics: &mut Diagnostics,
) -> bool {
    if !project_present {
        return legacy_declared;
    }
    if modern_declared && legacy_declared && !dynamic.contains(field) {
        diagnostics.error(
            format!("tool.trellis.{field}"),
            format!(
                "`{field}` is already declared in `[project]`; list it in `project.dynamic` to \
                let the legacy table supply it"
            ),
        );
        return false;
    }
    legacy_declared && (!modern_declared || dynamic.contains(field))
}

/// Reconcile one field between the two tables and return the winning value.
fn pick<T>(
    field: &str,
    project_present: bool,
    dynamic: &BTreeSet<String>,
    modern: Option<T>,
    legacy: Option<T>,
    diagnostics: &mut Diagnostics,
) -> Option<T> {
    if use_legacy(
        field,
        project_present,
        dynamic,
        modern.is_some(),
        legacy.is_some(),
        diagnostics,
    ) {
        legacy
    } else {
        modern
    }
}

fn legacy_url_map(legacy: &ToolTrellis) -> IndexMap<String, String> {
    let mut urls = IndexMap::new();
    if let Some(homepage) = &legacy.homepage {
        urls.insert("Homepage".to_string(), homepage.clone());
    }
    if let Some(repository) = &legacy.repository {
        urls.insert("Repository".to_string(), repository.clone());
    }
    if let Some(documentation) = &legacy.documentation {
        urls.insert("Documentation".to_string(), documentation.clone());
    }
    for (label, url) in legacy.urls.iter().flatten() {
        urls.insert(label.clone(), url.clone());
    }
    urls
}

fn resolve_declaration(
    dependency_name: &str,
    declaration: &DependencyDecl,
    path: &str,
    diagnostics: &mut Diagnostics,
) -> Option<Dependency> {
    let dependency_name = match PackageName::from_str(dependency_name) {
        Ok(name) => name,
        Err(err) => {
            diagnostics.error(path, err);
            return None;
        }
    };
    match declaration {
        DependencyDecl::Constraint(constraint) => match VersionRange::from_str(constraint) {
            Ok(constraint) => Some(Dependency::registry(dependency_name, constraint)),
            Err(err) => {
                diagnostics.error(path, err);
                None
            }
        },
        DependencyDecl::Table(table) => {
            Dependency::from_table(&dependency_name, table, path, diagnostics)
        }
    }
}

fn resolve_contacts(
    contacts: &[ContactDecl],
    path: &str,
    diagnostics: &mut Diagnostics,
) -> Vec<Contact> {
    let mut resolved = Vec::with_capacity(contacts.len());
    for (index, contact) in contacts.iter().enumerate() {
        match contact {
            ContactDecl::String(string) => match parse_contact_string(string) {
                Some(contact) => resolved.push(contact),
                None => diagnostics.error(
                    format!("{path}[{index}]"),
                    format!("`{string}` does not match `Display Name <email@host>`"),
                ),
            },
            ContactDecl::NameEmail { name, email } => resolved.push(Contact {
                name: Some(name.clone()),
                email: Some(email.clone()),
            }),
            ContactDecl::Name { name } => resolved.push(Contact {
                name: Some(name.clone()),
                email: None,
            }),
            ContactDecl::Email { email } => resolved.push(Contact {
                name: None,
                email: Some(email.clone()),
            }),
        }
    }
    resolved
}

/// `Display Name <email@host>`
fn parse_contact_string(string: &str) -> Option<Contact> {
    let string = string.trim();
    let (name, email) = match string.split_once('<') {
        Some((name, email)) => {
            let email = email.strip_suffix('>')?.trim();
            if !email.contains('@') {
                return None;
            }
            let name = name.trim();
            (
                (!name.is_empty()).then(|| name.to_string()),
                Some(email.to_string()),
            )
        }
        None => {
            if string.is_empty() || string.contains('>') {
                return None;
            }
            (Some(string.to_string()), None)
        }
    };
    Some(Contact { name, email })
}

fn validate_readmes(readmes: &[PathBuf], diagnostics: &mut Diagnostics) {
    let mut suffixes = BTreeSet::new();
    for (index, readme) in readmes.iter().enumerate() {
        match readme.extension().and_then(|suffix| suffix.to_str()) {
            Some(suffix @ ("md" | "rst" | "txt")) => {
                suffixes.insert(suffix.to_string());
            }
            _ => diagnostics.error(
                format!("project.readme[{index}]"),
                format!(
                    "`{}` has an unsupported suffix, expected `.md`, `.rst` or `.txt`",
                    readme.display()
                ),
            ),
        }
    }
    if suffixes.len() > 1 {
        diagnostics.error(
            "project.readme",
            "all readme files must share one suffix so the content type is unambiguous",
        );
    }
}

fn validate_classifiers(
    classifiers: &[String],
    allow_unknown: bool,
    diagnostics: &mut Diagnostics,
) {
    if allow_unknown {
        return;
    }
    for (index, classifier) in classifiers.iter().enumerate() {
        let category = classifier
            .split_once(" :: ")
            .map_or(classifier.as_str(), |(category, _)| category);
        if !CLASSIFIER_CATEGORIES.contains(&category) {
            diagnostics.error(
                format!("project.classifiers[{index}]"),
                format!("`{classifier}` is not a known trove classifier"),
            );
        }
    }
}

fn resolve_scripts(
    declarations: Option<std::collections::BTreeMap<String, ScriptDecl>>,
    path: &str,
    diagnostics: &mut Diagnostics,
) -> IndexMap<String, ScriptTarget> {
    let mut scripts = IndexMap::new();
    for (script_name, declaration) in declarations.into_iter().flatten() {
        let script_path = format!("{path}.{script_name}");
        if !is_valid_entry_point_name(&script_name) {
            diagnostics.error(
                script_path,
                "script names must consist of letters, numbers, dots and dashes",
            );
            continue;
        }
        match declaration {
            ScriptDecl::Reference(reference) => match parse_object_reference(&reference) {
                Some((module, object)) => {
                    scripts.insert(script_name, ScriptTarget::Reference { module, object });
                }
                None => diagnostics.error(
                    script_path,
                    format!("`{reference}` does not match `module(.submodule)*:object`"),
                ),
            },
            ScriptDecl::File { path: file, kind } => {
                if kind == "file" {
                    scripts.insert(script_name, ScriptTarget::File { path: file });
                } else {
                    diagnostics.error(
                        script_path,
                        format!("unknown script type `{kind}`, expected `file`"),
                    );
                }
            }
        }
    }
    scripts
}

/// `mod(.sub)*:callable`
fn parse_object_reference(reference: &str) -> Option<(String, String)> {
    let (module, object) = reference.split_once(':')?;
    let is_dotted_identifier = |value: &str| {
        !value.is_empty()
            && value.split('.').all(|segment| {
                !segment.is_empty()
                    && !segment.starts_with(|c: char| c.is_ascii_digit())
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
            })
    };
    (is_dotted_identifier(module) && is_dotted_identifier(object))
        .then(|| (module.to_string(), object.to_string()))
}

fn is_valid_entry_point_group(group: &str) -> bool {
    group
        .chars()
        .next()
        .map(|c| c.is_alphanumeric() || c == '_')
        .unwrap_or(false)
        && group
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '_')
}

fn is_valid_entry_point_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == '_')
}

fn resolve_formats(
    declaration: Option<&FormatDecl>,
    path: &str,
    diagnostics: &mut Diagnostics,
) -> Formats {
    let Some(declaration) = declaration else {
        return Formats::both();
    };
    let mut formats = Formats {
        sdist: false,
        wheel: false,
    };
    for name in declaration.names() {
        match name {
            "sdist" => formats.sdist = true,
            "wheel" => formats.wheel = true,
            other => diagnostics.error(
                format!("{path}.format"),
                format!("unknown format `{other}`, expected `sdist` or `wheel`"),
            ),
        }
    }
    formats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DependencySource, ManifestError};
    use indoc::indoc;

    #[track_caller]
    fn package(contents: &str) -> Package {
        let pyproject = PyProjectToml::parse(contents).unwrap();
        Package::from_pyproject(&pyproject).unwrap()
    }

    #[track_caller]
    fn errors(contents: &str) -> Vec<String> {
        let pyproject = PyProjectToml::parse(contents).unwrap();
        match Package::from_pyproject(&pyproject) {
            Ok(_) => panic!("expected a validation error"),
            Err(ManifestError::Schema(errors)) => {
                errors.0.into_iter().map(|error| error.to_string()).collect()
            }
            Err(other) => panic!("expected schema errors, got {other}"),
        }
    }

    #[test]
    fn minimal_modern() {
        let package = package(indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"
        "#});
        assert_eq!(package.name.as_str(), "demo");
        assert_eq!(package.version().unwrap().to_string(), "0.1");
        assert!(package.main_dependencies().is_empty());
    }

    #[test]
    fn modern_dependencies() {
        let package = package(indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"
            dependencies = ["requests[security]>=2.13,<3.0"]

            [project.optional-dependencies]
            cli = ["click>=8"]
        "#});
        let main = package.main_dependencies();
        assert_eq!(main.len(), 2);
        assert_eq!(
            main[0].to_dependency_string(),
            "requests[security] (>=2.13,<3.0)"
        );
        assert!(!main[0].optional);
        assert!(main[1].optional);
        assert_eq!(
            package.extras.first().map(|(extra, names)| {
                (extra.as_str(), names[0].as_str())
            }),
            Some(("cli", "click"))
        );
    }

    #[test]
    fn legacy_table() {
        let package = package(indoc! {r#"
            [tool.trellis]
            name = "demo"
            version = "1.2.3"
            description = "A demo"
            authors = ["Ferris the Crab <ferris@rustacean.net>"]
            homepage = "https://demo.example"

            [tool.trellis.dependencies]
            python = "^3.8"
            requests = { version = "^2.13", extras = ["security"] }
            tomlkit = "~0.11"

            [tool.trellis.group.dev.dependencies]
            pytest = "^7.0"

            [tool.trellis.extras]
            http = ["requests"]
        "#});
        assert_eq!(package.name.as_str(), "demo");
        assert_eq!(
            package.requires_python.to_string(),
            ">=3.8,<4.0"
        );
        assert_eq!(package.authors[0].to_string(), "Ferris the Crab <ferris@rustacean.net>");
        assert_eq!(package.urls.get("Homepage").unwrap(), "https://demo.example");
        assert_eq!(package.main_dependencies().len(), 2);
        let dev = GroupName::from_str("dev").unwrap();
        assert_eq!(package.dependency_groups.get(&dev).unwrap().len(), 1);
        assert_eq!(
            package.extras.get(&ExtraName::from_str("http").unwrap()).unwrap(),
            &[PackageName::from_str("requests").unwrap()]
        );
    }

    #[test]
    fn reconciliation_rejects_duplicate_fields() {
        let messages = errors(indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"

            [tool.trellis]
            version = "0.2"
        "#});
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("tool.trellis.version:"), "{}", messages[0]);
    }

    #[test]
    fn dynamic_fields_defer_to_legacy() {
        let package = package(indoc! {r#"
            [project]
            name = "demo"
            dynamic = ["version"]

            [tool.trellis]
            version = "0.2"
        "#});
        // The legacy value wins for a dynamic field.
        assert_eq!(package.version().unwrap().to_string(), "0.2");
    }

    #[test]
    fn dynamic_version_may_stay_unset() {
        let mut package = package(indoc! {r#"
            [project]
            name = "demo"
            dynamic = ["version"]
        "#});
        assert!(package.version().is_none());
        package.set_version(Version::from_str("0.3").unwrap()).unwrap();
        assert_eq!(package.version().unwrap().to_string(), "0.3");
        // Only one assignment is allowed.
        assert!(package.set_version(Version::from_str("0.4").unwrap()).is_err());
    }

    #[test]
    fn name_must_not_be_dynamic() {
        let messages = errors(indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"
            dynamic = ["name"]
        "#});
        assert!(messages[0].contains("`name` must not be dynamic"), "{}", messages[0]);
    }

    #[test]
    fn version_required_without_dynamic() {
        let messages = errors(indoc! {r#"
            [project]
            name = "demo"
        "#});
        assert!(messages[0].starts_with("project.version:"), "{}", messages[0]);
    }

    #[test]
    fn errors_aggregate() {
        let messages = errors(indoc! {r#"
            [project]
            name = "demo"
            version = "not a version"
            description = "two\nlines"
            dependencies = ["also not a dependency !"]
        "#});
        let paths: Vec<&str> = messages
            .iter()
            .map(|message| message.split(':').next().unwrap())
            .collect();
        assert_eq!(
            paths,
            [
                "project.version",
                "project.description",
                "project.dependencies[0]"
            ]
        );
    }

    #[test]
    fn extras_must_reference_main_dependencies() {
        let messages = errors(indoc! {r#"
            [tool.trellis]
            name = "demo"
            version = "0.1"

            [tool.trellis.dependencies]
            requests = "^2.13"

            [tool.trellis.extras]
            http = ["missing"]
        "#});
        assert!(
            messages[0].contains("`missing` is not a dependency of the runtime group"),
            "{}",
            messages[0]
        );
    }

    #[test]
    fn scripts_validate() {
        let package = package(indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"

            [project.scripts]
            demo = "demo.cli:main"

            [project.entry-points.demo_group]
            plugin = "demo.plugins:entry"
        "#});
        assert_eq!(
            package.scripts.get("demo"),
            Some(&ScriptTarget::Reference {
                module: "demo.cli".to_string(),
                object: "main".to_string()
            })
        );
        assert_eq!(package.entry_points["demo_group"]["plugin"], "demo.plugins:entry");

        let messages = errors(indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"

            [project.scripts]
            demo = "not a reference"
        "#});
        assert!(messages[0].starts_with("project.scripts.demo:"), "{}", messages[0]);
    }

    #[test]
    fn reserved_entry_point_groups() {
        let messages = errors(indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"

            [project.entry-points.console_scripts]
            demo = "demo:main"
        "#});
        assert!(
            messages[0].contains("reserved entry point groups"),
            "{}",
            messages[0]
        );
    }

    #[test]
    fn classifier_vocabulary() {
        let messages = errors(indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"
            classifiers = ["Programming Language :: Python", "Made Up :: Nope"]
        "#});
        assert!(messages[0].starts_with("project.classifiers[1]:"), "{}", messages[0]);

        // The escape hatch.
        package(indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"
            classifiers = ["Made Up :: Nope"]

            [tool.trellis]
            allow-unknown-classifiers = true
        "#});
    }

    #[test]
    fn readme_suffixes() {
        let messages = errors(indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"
            readme = ["README.md", "HISTORY.rst"]
        "#});
        assert!(
            messages[0].contains("share one suffix"),
            "{}",
            messages[0]
        );

        let package = package(indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"
            readme = ["README.md", "CHANGES.md"]
        "#});
        assert_eq!(package.readmes.len(), 2);
    }

    #[test]
    fn build_configuration() {
        let package = package(indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"

            [tool.trellis.build]
            script = "build.py"

            [build-system]
            requires = ["trellis", "cffi>=1.0"]
            build-backend = "trellis"
        "#});
        assert_eq!(
            package.build,
            Some(BuildConfig {
                script: PathBuf::from("build.py")
            })
        );
        assert_eq!(package.build_requires, ["trellis", "cffi>=1.0"]);
    }

    #[test]
    fn source_layout() {
        let package = package(indoc! {r#"
            [tool.trellis]
            name = "demo"
            version = "0.1"
            packages = [{ include = "demo", from = "src" }]
            include = ["data/*.csv", { path = "notes.txt", format = "sdist" }]
            exclude = ["**/*.tmp"]
        "#});
        assert_eq!(package.packages.len(), 1);
        assert_eq!(package.packages[0].from, Some(PathBuf::from("src")));
        assert!(package.include[0].formats.wheel);
        assert!(package.include[1].formats.sdist);
        assert!(!package.include[1].formats.wheel);
        assert_eq!(package.exclude, ["**/*.tmp"]);
    }

    #[test]
    fn path_dependency_kinds() {
        let package = package(indoc! {r#"
            [tool.trellis]
            name = "demo"
            version = "0.1"

            [tool.trellis.dependencies]
            sibling = { path = "../sibling", develop = true }
        "#});
        let DependencySource::Directory { develop, .. } = &package.main_dependencies()[0].source
        else {
            panic!("expected a directory source");
        };
        assert!(*develop);
    }
}

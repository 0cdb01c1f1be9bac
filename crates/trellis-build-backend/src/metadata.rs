//! Core Metadata 2.3 emission, shared by the sdist `PKG-INFO` and the wheel
//! `METADATA` file, plus the `entry_points.txt` rendering.
//!
//! <https://packaging.python.org/en/latest/specifications/core-metadata/>

use std::fmt::Display;
use std::path::Path;

use itertools::Itertools;

use trellis_manifest::{License, Package, ScriptTarget};

use crate::Error;

/// The metadata of one distribution, ready to render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreMetadata {
    pub metadata_version: String,
    pub name: String,
    pub version: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub description_content_type: Option<String>,
    pub keywords: Option<String>,
    pub author: Option<String>,
    pub author_email: Option<String>,
    pub maintainer: Option<String>,
    pub maintainer_email: Option<String>,
    pub license: Option<String>,
    pub classifiers: Vec<String>,
    pub requires_dist: Vec<String>,
    pub requires_python: Option<String>,
    pub project_urls: Vec<String>,
    pub provides_extras: Vec<String>,
}

impl CoreMetadata {
    /// Collect the metadata of a package; readme and license files are read
    /// relative to `root`.
    pub fn from_package(package: &Package, root: &Path) -> Result<Self, Error> {
        let version = package.version().ok_or(Error::MissingVersion)?;

        // Multiple readmes concatenate in declaration order, separated by one
        // blank line; the suffix determines the content type.
        let mut description: Option<String> = None;
        for readme in &package.readmes {
            let contents = fs_err::read_to_string(root.join(readme))?;
            if let Some(existing) = &mut description {
                while !existing.ends_with("\n\n") {
                    existing.push('\n');
                }
                existing.push_str(&contents);
            } else {
                description = Some(contents);
            }
        }
        let description_content_type = package
            .readmes
            .first()
            .and_then(|readme| readme.extension())
            .and_then(|suffix| suffix.to_str())
            .map(|suffix| {
                match suffix {
                    "md" => "text/markdown",
                    "rst" => "text/x-rst",
                    _ => "text/plain",
                }
                .to_string()
            });

        let license = match &package.license {
            None => None,
            Some(License::Literal(license)) => Some(license.clone()),
            Some(License::Text { text }) => Some(text.clone()),
            // The file is read at emission time.
            Some(License::File { file }) => Some(fs_err::read_to_string(root.join(file))?),
        };

        let author = package
            .authors
            .iter()
            .filter(|contact| contact.email.is_none())
            .map(|contact| contact.to_string())
            .join(", ");
        let author_email = package
            .authors
            .iter()
            .filter(|contact| contact.email.is_some())
            .map(|contact| contact.to_string())
            .join(", ");
        let maintainer = package
            .maintainers
            .iter()
            .filter(|contact| contact.email.is_none())
            .map(|contact| contact.to_string())
            .join(", ");
        let maintainer_email = package
            .maintainers
            .iter()
            .filter(|contact| contact.email.is_some())
            .map(|contact| contact.to_string())
            .join(", ");

        let requires_python = if package.requires_python.is_any() {
            None
        } else {
            Some(
                package
                    .requires_python
                    .to_specifiers()
                    .map_or_else(|| package.requires_python.to_string(), |s| s.to_string()),
            )
        };

        Ok(Self {
            metadata_version: "2.3".to_string(),
            name: package.name.to_string(),
            version: version.to_string(),
            summary: package.description.clone(),
            description,
            description_content_type,
            keywords: (!package.keywords.is_empty()).then(|| package.keywords.join(",")),
            author: (!author.is_empty()).then_some(author),
            author_email: (!author_email.is_empty()).then_some(author_email),
            maintainer: (!maintainer.is_empty()).then_some(maintainer),
            maintainer_email: (!maintainer_email.is_empty()).then_some(maintainer_email),
            license,
            classifiers: package.classifiers.clone(),
            requires_dist: requires_dist_lines(package),
            requires_python,
            project_urls: package
                .urls
                .iter()
                .map(|(label, url)| format!("{label}, {url}"))
                .collect(),
            provides_extras: package
                .extras
                .keys()
                .map(ToString::to_string)
                .collect(),
        })
    }

    /// Convert to the pseudo-email format used by `METADATA` and `PKG-INFO`.
    ///
    /// Continuation lines are folded with `key-width + 2` spaces, matching
    /// what the stdlib email parser round-trips.
    pub fn core_metadata_format(&self) -> String {
        fn write_str(writer: &mut String, key: &str, value: impl Display) {
            let value = value.to_string();
            let mut lines = value.lines();
            if let Some(line) = lines.next() {
                writer.push_str(&format!("{key}: {line}\n"));
            } else {
                // The value is an empty string
                writer.push_str(&format!("{key}: \n"));
            }
            for line in lines {
                writer.push_str(&format!("{}{}\n", " ".repeat(key.len() + 2), line));
            }
        }
        fn write_opt_str(writer: &mut String, key: &str, value: Option<&impl Display>) {
            if let Some(value) = value {
                write_str(writer, key, value);
            }
        }
        fn write_all(
            writer: &mut String,
            key: &str,
            values: impl IntoIterator<Item = impl Display>,
        ) {
            for value in values {
                write_str(writer, key, value);
            }
        }

        let mut writer = String::new();
        write_str(&mut writer, "Metadata-Version", &self.metadata_version);
        write_str(&mut writer, "Name", &self.name);
        write_str(&mut writer, "Version", &self.version);
        write_opt_str(&mut writer, "Summary", self.summary.as_ref());
        write_opt_str(&mut writer, "Keywords", self.keywords.as_ref());
        write_opt_str(&mut writer, "Author", self.author.as_ref());
        write_opt_str(&mut writer, "Author-email", self.author_email.as_ref());
        write_opt_str(&mut writer, "Maintainer", self.maintainer.as_ref());
        write_opt_str(
            &mut writer,
            "Maintainer-email",
            self.maintainer_email.as_ref(),
        );
        write_opt_str(&mut writer, "License", self.license.as_ref());
        write_all(&mut writer, "Classifier", &self.classifiers);
        write_opt_str(
            &mut writer,
            "Requires-Python",
            self.requires_python.as_ref(),
        );
        write_all(&mut writer, "Requires-Dist", &self.requires_dist);
        write_all(&mut writer, "Project-URL", &self.project_urls);
        write_all(&mut writer, "Provides-Extra", &self.provides_extras);
        write_opt_str(
            &mut writer,
            "Description-Content-Type",
            self.description_content_type.as_ref(),
        );

        if let Some(description) = &self.description {
            writer.push('\n');
            writer.push_str(description);
        }
        writer
    }
}

/// One `Requires-Dist` line per dependency: the non-optional runtime
/// dependencies first, then the optional ones gated per extra.
fn requires_dist_lines(package: &Package) -> Vec<String> {
    let mut lines = Vec::new();
    for dependency in package.main_dependencies() {
        if !dependency.optional {
            lines.push(dependency.to_dependency_string());
        }
    }
    for (extra, names) in &package.extras {
        for name in names {
            let Some(dependency) = package
                .main_dependencies()
                .iter()
                .find(|dependency| dependency.name == *name)
            else {
                continue;
            };
            let marker = dependency
                .effective_marker()
                .exclude_extra(extra)
                .intersect(&extra_marker(extra));
            lines.push(dependency.dependency_string_with_marker(&marker));
        }
    }
    lines
}

fn extra_marker(extra: &trellis_normalize::ExtraName) -> trellis_pep508::MarkerTree {
    use trellis_pep508::{MarkerExpression, MarkerKey, MarkerOperator, MarkerTree};
    MarkerTree::Expression(MarkerExpression {
        key: MarkerKey::Extra,
        operator: MarkerOperator::Equal,
        value: extra.to_string(),
    })
}

/// Validate and render the entrypoints to an `entry_points.txt`.
///
/// <https://packaging.python.org/en/latest/specifications/entry-points/>
///
/// Returns `None` if no entrypoints are defined.
pub(crate) fn to_entry_points(package: &Package) -> Option<String> {
    if package.scripts.is_empty()
        && package.gui_scripts.is_empty()
        && package.entry_points.is_empty()
    {
        return None;
    }

    let mut writer = String::new();
    let console_scripts: Vec<(String, String)> = package
        .scripts
        .iter()
        .filter_map(|(name, target)| match target {
            ScriptTarget::Reference { .. } => Some((name.clone(), target.to_string())),
            // File scripts ship in the data directory, not as entry points.
            ScriptTarget::File { .. } => None,
        })
        .collect();
    if !console_scripts.is_empty() {
        write_group(&mut writer, "console_scripts", console_scripts);
    }
    if !package.gui_scripts.is_empty() {
        write_group(
            &mut writer,
            "gui_scripts",
            package
                .gui_scripts
                .iter()
                .map(|(name, target)| (name.clone(), target.to_string())),
        );
    }
    for (group, entries) in &package.entry_points {
        write_group(
            &mut writer,
            group,
            entries
                .iter()
                .map(|(name, target)| (name.clone(), target.clone())),
        );
    }
    if writer.is_empty() {
        None
    } else {
        Some(writer)
    }
}

/// Write one `entry_points.txt` group.
fn write_group(
    writer: &mut String,
    group: &str,
    entries: impl IntoIterator<Item = (String, String)>,
) {
    writer.push_str(&format!("[{group}]\n"));
    for (name, object_reference) in entries {
        writer.push_str(&format!("{name} = {object_reference}\n"));
    }
    writer.push('\n');
}

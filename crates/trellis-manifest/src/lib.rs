//! Reads a `pyproject.toml` and assembles the logical package it declares.
//!
//! Two tables are understood: the standardized `[project]` table and the
//! legacy `[tool.trellis]` table. A field may only be supplied by the legacy
//! table when the `[project]` table defers it via `dynamic`; declaring a
//! field in both tables otherwise is a validation error.
//!
//! Validation is collecting: all schema-level problems of a manifest are
//! reported in one error, each with the path of the offending field
//! (`project.dependencies[3]`-style). Sub-grammar parse failures (versions,
//! markers, dependency strings) surface through the same paths.

use std::fmt::{self, Display, Formatter};

pub use dependency::{Dependency, DependencySource, VcsKind, VcsReference};
pub use package::{
    BuildConfig, Contact, Formats, IncludeEntry, Package, PackageInclude, ScriptTarget,
};
pub use pyproject::{
    BuildDecl, BuildSystem, Contact as ContactDecl, DependencyDecl, DependencyGroup,
    DependencyTable, FormatDecl, IncludeDecl, License, PackageDecl, Project, PyProjectToml,
    Readme, ScriptDecl, Tool, ToolTrellis,
};

mod dependency;
mod package;
mod pyproject;

/// A failure to interpret a `pyproject.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The TOML itself does not parse; the message cites line and column.
    #[error("invalid pyproject.toml")]
    Toml(#[from] toml::de::Error),
    /// One or more fields violate the schema.
    #[error(transparent)]
    Schema(#[from] SchemaErrors),
    /// The version was assigned twice.
    #[error("the package version is already set to {0}")]
    VersionAlreadySet(String),
}

/// The aggregated field-level validation errors of one manifest.
#[derive(Debug)]
pub struct SchemaErrors(pub Vec<FieldError>);

impl Display for SchemaErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "invalid pyproject.toml")?;
        for error in &self.0 {
            writeln!(f, "  {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaErrors {}

/// A validation error anchored at a field path such as
/// `project.dependencies[3]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// The path of the offending field within the manifest.
    pub path: String,
    /// What is wrong with it.
    pub message: String,
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Collects field errors so the user sees every manifest problem at once.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    errors: Vec<FieldError>,
}

impl Diagnostics {
    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Display) {
        self.errors.push(FieldError {
            path: path.into(),
            message: message.to_string(),
        });
    }

    pub(crate) fn finish(self) -> Result<(), SchemaErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaErrors(self.errors))
        }
    }
}

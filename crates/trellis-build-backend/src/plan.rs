//! File selection for the two distribution formats.
//!
//! The plan lists `(source path, archive path)` pairs, sorted by archive
//! path, so that archive assembly is a pure fold and repeated builds see the
//! files in the same order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, trace};
use walkdir::WalkDir;

use trellis_manifest::{DependencySource, Formats, Package};

use crate::Error;

/// One selected file: where it is on disk and where it goes in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// The file on disk.
    pub source: PathBuf,
    /// The portable (forward-slash) path inside the archive.
    pub archive_path: String,
}

/// The files of each distribution, plus the license files that the wheel
/// places under `.dist-info/licenses/`.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    /// Files of the source distribution, relative to the source tree.
    pub sdist_files: Vec<PlanEntry>,
    /// Files of the wheel, relative to the site-packages root.
    pub wheel_files: Vec<PlanEntry>,
    /// License files, shipped in the sdist root and the wheel's
    /// `.dist-info/licenses/`.
    pub license_files: Vec<PlanEntry>,
}

/// The filenames always shipped with the sdist when present.
const LICENSE_PREFIXES: &[&str] = &["LICENSE", "LICENCE", "COPYING", "NOTICE", "AUTHORS"];

impl BuildPlan {
    /// Select the files of both distributions for the given package.
    pub fn new(package: &Package, source_tree: &Path) -> Result<Self, Error> {
        let mut sdist: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut wheel: BTreeMap<String, PathBuf> = BTreeMap::new();

        let exclude_matcher = exclude_matcher(&package.exclude)?;
        // Local directory dependencies may live inside the source tree; they
        // are their own projects and are never walked.
        let dependency_dirs: Vec<PathBuf> = package
            .dependency_groups
            .values()
            .flatten()
            .filter_map(|dependency| match &dependency.source {
                DependencySource::Directory { path, .. } => {
                    Some(normalize_relative(&source_tree.join(path), source_tree)?)
                }
                _ => None,
            })
            .collect();

        // 1. The declared packages (or the inferred module) contribute their
        //    transitive contents, minus VCS-ignored files and excludes.
        for root in package_roots(package, source_tree) {
            let base = match &root.from {
                Some(from) => source_tree.join(from),
                None => source_tree.to_path_buf(),
            };
            let module_root = base.join(&root.include);
            if !module_root.exists() {
                debug!("Skipping missing package root {}", module_root.display());
                continue;
            }
            let mut walk = ignore::WalkBuilder::new(&module_root);
            walk.hidden(false)
                .parents(true)
                .ignore(false)
                .git_global(false)
                .git_ignore(true)
                .git_exclude(true)
                .require_git(true)
                .sort_by_file_path(std::cmp::Ord::cmp);
            for entry in walk.build() {
                let entry = entry.map_err(|err| Error::WalkDir {
                    root: module_root.clone(),
                    source: err,
                })?;
                if !entry.file_type().is_some_and(|file_type| file_type.is_file()) {
                    continue;
                }
                let tree_relative = entry.path().strip_prefix(source_tree)?;
                if exclude_matcher.is_match(tree_relative) {
                    trace!("Excluding {}", tree_relative.display());
                    continue;
                }
                if dependency_dirs
                    .iter()
                    .any(|dir| tree_relative.starts_with(dir))
                {
                    continue;
                }
                if root.formats.sdist {
                    sdist.insert(
                        portable_path(tree_relative)?,
                        entry.path().to_path_buf(),
                    );
                }
                if root.formats.wheel {
                    // The wheel is rooted at the import path, so the `from`
                    // directory is stripped.
                    let base_relative = entry.path().strip_prefix(&base)?;
                    wheel.insert(portable_path(base_relative)?, entry.path().to_path_buf());
                }
            }
        }

        // 2. Explicit includes are always in, regardless of the VCS ignore
        //    status of the file.
        if !package.include.is_empty() {
            let mut builder = GlobSetBuilder::new();
            for entry in &package.include {
                builder.add(Glob::new(&entry.path).map_err(|err| Error::Glob {
                    field: "tool.trellis.include".to_string(),
                    source: err,
                })?);
            }
            let include_matcher = builder.build().map_err(|err| Error::Glob {
                field: "tool.trellis.include".to_string(),
                source: err,
            })?;
            for entry in WalkDir::new(source_tree)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| entry.file_name() != ".git")
            {
                let entry = entry.map_err(|err| Error::WalkDir {
                    root: source_tree.to_path_buf(),
                    source: ignore::Error::from(std::io::Error::from(err)),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let tree_relative = entry.path().strip_prefix(source_tree)?;
                let formats = matching_formats(&include_matcher, package, tree_relative);
                let Some(formats) = formats else {
                    continue;
                };
                if formats.sdist {
                    sdist.insert(portable_path(tree_relative)?, entry.path().to_path_buf());
                }
                if formats.wheel {
                    wheel.insert(portable_path(tree_relative)?, entry.path().to_path_buf());
                }
            }
        }

        // 3. The standard metadata files are always part of the sdist.
        for name in ["pyproject.toml"] {
            let path = source_tree.join(name);
            if path.is_file() {
                sdist.insert(name.to_string(), path);
            }
        }
        for readme in &package.readmes {
            let path = source_tree.join(readme);
            if path.is_file() {
                sdist.insert(portable_path(readme)?, path);
            }
        }
        let mut license_files = Vec::new();
        let mut root_entries: Vec<_> = fs_err::read_dir(source_tree)?
            .collect::<Result<_, _>>()?;
        root_entries.sort_by_key(|entry| entry.file_name());
        for entry in root_entries {
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let upper = file_name.to_ascii_uppercase();
            if LICENSE_PREFIXES
                .iter()
                .any(|prefix| upper.starts_with(prefix))
            {
                sdist.insert(file_name.to_string(), entry.path());
                license_files.push(PlanEntry {
                    source: entry.path(),
                    archive_path: file_name.to_string(),
                });
            }
        }

        Ok(Self {
            sdist_files: into_entries(sdist),
            wheel_files: into_entries(wheel),
            license_files,
        })
    }
}

/// A resolved package root: the directory to walk, where it is anchored and
/// which formats it feeds.
struct PackageRoot {
    include: PathBuf,
    from: Option<PathBuf>,
    formats: Formats,
}

/// The declared packages, or the module inferred from the package name using
/// the src layout when present.
fn package_roots(package: &Package, source_tree: &Path) -> Vec<PackageRoot> {
    if !package.packages.is_empty() {
        return package
            .packages
            .iter()
            .map(|declared| PackageRoot {
                include: PathBuf::from(&declared.include),
                from: declared.from.clone(),
                formats: declared.formats,
            })
            .collect();
    }
    let module = package.name.as_dist_info_name().to_string();
    if source_tree.join("src").join(&module).is_dir() {
        vec![PackageRoot {
            include: PathBuf::from(module),
            from: Some(PathBuf::from("src")),
            formats: Formats::both(),
        }]
    } else if source_tree.join(&module).is_dir() {
        vec![PackageRoot {
            include: PathBuf::from(module),
            from: None,
            formats: Formats::both(),
        }]
    } else {
        Vec::new()
    }
}

/// Excludes are unanchored: `__pycache__` excludes all directories named
/// `__pycache__` anywhere. A `/` prefix anchors a pattern to the project
/// root.
fn exclude_matcher(excludes: &[String]) -> Result<GlobSet, Error> {
    let mut builder = GlobSetBuilder::new();
    for exclude in excludes {
        let exclude = match exclude.strip_prefix('/') {
            Some(anchored) => anchored.to_string(),
            None => format!("**/{exclude}"),
        };
        for pattern in [exclude.clone(), format!("{exclude}/**")] {
            builder.add(Glob::new(&pattern).map_err(|err| Error::Glob {
                field: "tool.trellis.exclude".to_string(),
                source: err,
            })?);
        }
    }
    builder.build().map_err(|err| Error::Glob {
        field: "tool.trellis.exclude".to_string(),
        source: err,
    })
}

/// The union of the format selectors of all include entries matching the
/// path, `None` when nothing matches.
fn matching_formats(
    matcher: &GlobSet,
    package: &Package,
    path: &Path,
) -> Option<Formats> {
    let matches = matcher.matches(path);
    if matches.is_empty() {
        return None;
    }
    let mut formats = Formats {
        sdist: false,
        wheel: false,
    };
    for index in matches {
        let entry = &package.include[index];
        formats.sdist |= entry.formats.sdist;
        formats.wheel |= entry.formats.wheel;
    }
    Some(formats)
}

/// Resolve `root/../`-free relative form of `path` under `root`, `None` when
/// it escapes the tree.
fn normalize_relative(path: &Path, root: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            std::path::Component::CurDir => {}
            component => normalized.push(component),
        }
    }
    normalized.strip_prefix(root).ok().map(Path::to_path_buf)
}

/// Forward slashes regardless of host platform; archives are portable.
fn portable_path(path: &Path) -> Result<String, Error> {
    let path = path
        .to_str()
        .ok_or_else(|| Error::NotUtf8Path(path.to_path_buf()))?;
    if std::path::MAIN_SEPARATOR == '/' {
        Ok(path.to_string())
    } else {
        Ok(path.replace(std::path::MAIN_SEPARATOR, "/"))
    }
}

fn into_entries(files: BTreeMap<String, PathBuf>) -> Vec<PlanEntry> {
    files
        .into_iter()
        .map(|(archive_path, source)| PlanEntry {
            source,
            archive_path,
        })
        .collect()
}

//! Wheel assembly: the payload files, the `.dist-info` directory and the
//! editable variant whose payload is a `.pth` loader stub.

use std::collections::BTreeSet;
use std::path::Path;

use fs_err::File;
use tracing::debug;

use trellis_manifest::{Package, ScriptTarget};

use crate::metadata::{to_entry_points, CoreMetadata};
use crate::plan::BuildPlan;
use crate::{
    distribution_prefix, load_package, wheel_tag, DirectoryWriter, Error, FilesystemWriter,
    ZipDirectoryWriter, BACKEND_NAME, BACKEND_VERSION,
};

/// Build the wheel and return its filename,
/// `<name>-<version>-<py>-<abi>-<plat>.whl`.
///
/// When `metadata_directory` is given, its `METADATA` bytes are reused
/// verbatim. On error the partial output file is removed before the error
/// propagates.
pub(crate) fn build(
    source_tree: &Path,
    wheel_directory: &Path,
    metadata_directory: Option<&Path>,
) -> Result<String, Error> {
    let package = load_package(source_tree)?;
    let prefix = distribution_prefix(&package)?;
    let tag = wheel_tag(&package);
    let filename = format!("{prefix}-{tag}.whl");
    let wheel_path = wheel_directory.join(&filename);
    debug!("Writing wheel at {}", wheel_path.display());

    let result: Result<(), Error> = (|| {
        let metadata = reusable_metadata(&package, source_tree, metadata_directory, &prefix)?;
        let plan = BuildPlan::new(&package, source_tree)?;

        let mut writer: Box<dyn DirectoryWriter> =
            Box::new(ZipDirectoryWriter::new_wheel(File::create(&wheel_path)?));
        let mut seen_directories = BTreeSet::new();
        for entry in &plan.wheel_files {
            write_parents(&mut *writer, &mut seen_directories, &entry.archive_path)?;
            writer.write_file(&entry.archive_path, &entry.source)?;
        }

        // File-reference scripts ship in the data directory, picked up by the
        // installer's script handling.
        let data_scripts: Vec<_> = package
            .scripts
            .iter()
            .chain(package.gui_scripts.iter())
            .filter_map(|(name, target)| match target {
                ScriptTarget::File { path } => Some((name, path)),
                ScriptTarget::Reference { .. } => None,
            })
            .collect();
        if !data_scripts.is_empty() {
            let scripts_dir = format!("{prefix}.data/scripts");
            writer.write_directory(&format!("{prefix}.data"))?;
            writer.write_directory(&scripts_dir)?;
            for (name, path) in data_scripts {
                writer.write_file(&format!("{scripts_dir}/{name}"), &source_tree.join(path))?;
            }
        }

        let dist_info_dir = write_dist_info(
            &mut *writer,
            &package,
            &plan,
            &metadata,
            &prefix,
            &tag,
        )?;
        writer.close(&dist_info_dir)?;
        Ok(())
    })();
    if let Err(err) = result {
        let _ = fs_err::remove_file(&wheel_path);
        return Err(err);
    }
    Ok(filename)
}

/// Write only the `.dist-info` directory and return its name.
pub(crate) fn write_metadata_directory(
    source_tree: &Path,
    metadata_directory: &Path,
) -> Result<String, Error> {
    let package = load_package(source_tree)?;
    let prefix = distribution_prefix(&package)?;
    let tag = wheel_tag(&package);
    debug!("Writing metadata files to {}", metadata_directory.display());

    let metadata = CoreMetadata::from_package(&package, source_tree)?.core_metadata_format();
    let plan = BuildPlan::new(&package, source_tree)?;
    let mut writer: Box<dyn DirectoryWriter> = Box::new(FilesystemWriter::new(metadata_directory));
    let dist_info_dir = write_dist_info(&mut *writer, &package, &plan, &metadata, &prefix, &tag)?;
    writer.close(&dist_info_dir)?;
    Ok(dist_info_dir)
}

/// Build an editable wheel: the payload is a `.pth` file naming the package
/// roots, so importing resolves into the source tree.
pub(crate) fn build_editable(
    source_tree: &Path,
    wheel_directory: &Path,
    metadata_directory: Option<&Path>,
) -> Result<String, Error> {
    let package = load_package(source_tree)?;
    let prefix = distribution_prefix(&package)?;
    let tag = "py3-none-any";
    let filename = format!("{prefix}-{tag}.whl");
    let wheel_path = wheel_directory.join(&filename);
    debug!("Writing editable wheel at {}", wheel_path.display());

    let result: Result<(), Error> = (|| {
        let metadata = reusable_metadata(&package, source_tree, metadata_directory, &prefix)?;
        let plan = BuildPlan::new(&package, source_tree)?;

        // Editables are temporary; skipping compression saves time on both
        // ends.
        let mut writer: Box<dyn DirectoryWriter> =
            Box::new(ZipDirectoryWriter::new_stored(File::create(&wheel_path)?));

        let mut roots = BTreeSet::new();
        if package.packages.is_empty() {
            let source_root = if source_tree.join("src").is_dir() {
                source_tree.join("src")
            } else {
                source_tree.to_path_buf()
            };
            roots.insert(source_root);
        } else {
            for declared in &package.packages {
                let root = match &declared.from {
                    Some(from) => source_tree.join(from),
                    None => source_tree.to_path_buf(),
                };
                roots.insert(root);
            }
        }
        let pth: String = roots
            .iter()
            .map(|root| format!("{}\n", root.display()))
            .collect();
        writer.write_bytes(
            &format!("{}.pth", package.name.as_dist_info_name()),
            pth.as_bytes(),
        )?;

        let dist_info_dir =
            write_dist_info(&mut *writer, &package, &plan, &metadata, &prefix, tag)?;
        writer.close(&dist_info_dir)?;
        Ok(())
    })();
    if let Err(err) = result {
        let _ = fs_err::remove_file(&wheel_path);
        return Err(err);
    }
    Ok(filename)
}

/// The `METADATA` bytes: regenerated, or reused verbatim from the metadata
/// directory of the prepare step when the frontend passes one.
fn reusable_metadata(
    package: &Package,
    source_tree: &Path,
    metadata_directory: Option<&Path>,
    prefix: &str,
) -> Result<String, Error> {
    match metadata_directory {
        Some(metadata_directory) => {
            let path = metadata_directory
                .join(format!("{prefix}.dist-info"))
                .join("METADATA");
            let previous = fs_err::read_to_string(&path)?;
            // A stale prepare step must not leak into the wheel.
            let current = CoreMetadata::from_package(package, source_tree)?.core_metadata_format();
            if previous != current {
                return Err(Error::InconsistentSteps("METADATA"));
            }
            Ok(previous)
        }
        None => Ok(CoreMetadata::from_package(package, source_tree)?.core_metadata_format()),
    }
}

/// Add directory entries for every unseen parent of the archive path.
fn write_parents(
    writer: &mut dyn DirectoryWriter,
    seen: &mut BTreeSet<String>,
    archive_path: &str,
) -> Result<(), Error> {
    let mut directories = Vec::new();
    let mut parent = archive_path;
    while let Some((directory, _)) = parent.rsplit_once('/') {
        directories.push(directory.to_string());
        parent = directory;
    }
    for directory in directories.into_iter().rev() {
        if seen.insert(directory.clone()) {
            writer.write_directory(&directory)?;
        }
    }
    Ok(())
}

/// Add `METADATA`, `WHEEL`, `entry_points.txt` and the license files to the
/// dist-info directory. `RECORD` is added on closing.
///
/// Returns the name of the dist-info directory.
fn write_dist_info(
    writer: &mut dyn DirectoryWriter,
    package: &Package,
    plan: &BuildPlan,
    metadata: &str,
    prefix: &str,
    tag: &str,
) -> Result<String, Error> {
    let dist_info_dir = format!("{prefix}.dist-info");
    writer.write_directory(&dist_info_dir)?;

    writer.write_bytes(
        &format!("{dist_info_dir}/METADATA"),
        metadata.as_bytes(),
    )?;

    let wheel_info = wheel_info(package, tag);
    writer.write_bytes(&format!("{dist_info_dir}/WHEEL"), wheel_info.as_bytes())?;

    // `entry_points.txt` is only written when at least one entry exists.
    if let Some(entry_points) = to_entry_points(package) {
        writer.write_bytes(
            &format!("{dist_info_dir}/entry_points.txt"),
            entry_points.as_bytes(),
        )?;
    }

    if !plan.license_files.is_empty() {
        let licenses_dir = format!("{dist_info_dir}/licenses");
        writer.write_directory(&licenses_dir)?;
        for license in &plan.license_files {
            writer.write_file(
                &format!("{licenses_dir}/{}", license.archive_path),
                &license.source,
            )?;
        }
    }

    Ok(dist_info_dir)
}

/// The `WHEEL` file contents.
///
/// <https://packaging.python.org/en/latest/specifications/binary-distribution-format/#file-contents>
fn wheel_info(package: &Package, tag: &str) -> String {
    let root_is_purelib = package.build.is_none();
    format!(
        "Wheel-Version: 1.0\nGenerator: {BACKEND_NAME} {BACKEND_VERSION}\nRoot-Is-Purelib: {root_is_purelib}\nTag: {tag}\n"
    )
}

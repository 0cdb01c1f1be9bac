//! Source distribution assembly: a gzipped tar whose bytes only depend on
//! the source tree and `SOURCE_DATE_EPOCH`.

use std::collections::BTreeSet;
use std::io::{self, BufReader, Cursor};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use fs_err::File;
use tar::{EntryType, Header};
use tracing::debug;

use crate::metadata::CoreMetadata;
use crate::plan::BuildPlan;
use crate::{distribution_prefix, load_package, source_date_epoch, Error};

/// Build the sdist and return its filename, `<name>-<version>.tar.gz`.
///
/// On error the partial output file is removed before the error propagates.
pub(crate) fn build(source_tree: &Path, sdist_directory: &Path) -> Result<String, Error> {
    let package = load_package(source_tree)?;
    let prefix = distribution_prefix(&package)?;
    let filename = format!("{prefix}.tar.gz");
    let sdist_path = sdist_directory.join(&filename);
    debug!("Writing sdist at {}", sdist_path.display());
    if let Err(err) = write_sdist(source_tree, &package, &prefix, &sdist_path) {
        let _ = fs_err::remove_file(&sdist_path);
        return Err(err);
    }
    Ok(filename)
}

fn write_sdist(
    source_tree: &Path,
    package: &trellis_manifest::Package,
    prefix: &str,
    sdist_path: &Path,
) -> Result<(), Error> {
    let plan = BuildPlan::new(package, source_tree)?;
    let metadata = CoreMetadata::from_package(package, source_tree)?.core_metadata_format();

    // The full entry list, sorted by archive path: a directory entry for
    // every parent, the selected files, and `PKG-INFO`, which sorts among
    // the plan entries like any other file.
    enum Payload {
        Directory,
        File(PathBuf),
        Bytes(Vec<u8>),
    }
    let mut entries: Vec<(String, Payload)> = plan
        .sdist_files
        .iter()
        .map(|entry| {
            (
                format!("{prefix}/{}", entry.archive_path),
                Payload::File(entry.source.clone()),
            )
        })
        .collect();
    entries.push((
        format!("{prefix}/PKG-INFO"),
        Payload::Bytes(metadata.into_bytes()),
    ));
    let mut directories = BTreeSet::new();
    for (archive_path, _) in &entries {
        let mut parent = archive_path.as_str();
        while let Some((directory, _)) = parent.rsplit_once('/') {
            directories.insert(directory.to_string());
            parent = directory;
        }
    }
    entries.extend(
        directories
            .into_iter()
            .map(|directory| (format!("{directory}/"), Payload::Directory)),
    );
    entries.sort_by(|(left, _), (right, _)| left.cmp(right));

    let timestamp = source_date_epoch();
    let tar_gz = File::create(sdist_path)?;
    let encoder = GzEncoder::new(tar_gz, Compression::new(6));
    let mut tar = tar::Builder::new(encoder);

    for (archive_path, payload) in entries {
        let mut header = deterministic_header(timestamp);
        match payload {
            Payload::Directory => {
                header.set_entry_type(EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                tar.append_data(&mut header, &archive_path, io::empty())
                    .map_err(|err| Error::TarWrite(sdist_path.to_path_buf(), err))?;
            }
            Payload::File(source) => {
                header.set_mode(0o644);
                let metadata = fs_err::metadata(&source)?;
                header.set_size(metadata.len());
                tar.append_data(
                    &mut header,
                    &archive_path,
                    BufReader::new(File::open(&source)?),
                )
                .map_err(|err| Error::TarWrite(sdist_path.to_path_buf(), err))?;
            }
            Payload::Bytes(bytes) => {
                header.set_mode(0o644);
                header.set_size(bytes.len() as u64);
                tar.append_data(&mut header, &archive_path, Cursor::new(bytes))
                    .map_err(|err| Error::TarWrite(sdist_path.to_path_buf(), err))?;
            }
        }
    }

    tar.into_inner()
        .and_then(GzEncoder::finish)
        .map_err(|err| Error::TarWrite(sdist_path.to_path_buf(), err))?;
    Ok(())
}

/// A tar header with every machine- and time-dependent field pinned.
fn deterministic_header(timestamp: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("").expect("the empty name fits");
    header.set_groupname("").expect("the empty name fits");
    header.set_mtime(timestamp);
    header
}

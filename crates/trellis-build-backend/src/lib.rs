//! The PEP 517 build backend: deterministic sdist and wheel emission for
//! projects declared in a `pyproject.toml`.
//!
//! The frontend-facing surface are the hook functions at the bottom of this
//! module: [`get_requires_for_build_sdist`], [`get_requires_for_build_wheel`],
//! [`prepare_metadata_for_build_wheel`], [`build_sdist`], [`build_wheel`] and
//! [`build_editable`]. Every hook reads the manifest fresh; no state persists
//! between invocations.

use std::collections::BTreeMap;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf, StripPrefixError};
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use fs_err::File;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::trace;
use zip::{CompressionMethod, ZipWriter};

use trellis_manifest::{ManifestError, Package, PyProjectToml};
use trellis_pep508::Requirement;

mod metadata;
mod plan;
mod source_dist;
mod wheel;

pub use metadata::CoreMetadata;
pub use plan::{BuildPlan, PlanEntry};

/// The name the backend identifies itself with, e.g. in the `Generator`
/// header of the `WHEEL` file.
pub const BACKEND_NAME: &str = "trellis";

/// The backend version baked into generated metadata.
pub const BACKEND_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The fallback archive timestamp: 1980-01-01, the floor of the zip format.
const DEFAULT_SOURCE_DATE_EPOCH: u64 = 315_532_800;

/// The configuration mapping a frontend passes to a hook.
pub type ConfigSettings = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Invalid pyproject.toml")]
    Manifest(#[from] ManifestError),
    #[error("The manifest defers the version and no frontend supplied one")]
    MissingVersion,
    #[error("Unsupported glob expression in `{field}`")]
    Glob {
        field: String,
        #[source]
        source: globset::Error,
    },
    #[error("Failed to walk source tree: `{}`", root.display())]
    WalkDir {
        root: PathBuf,
        #[source]
        source: ignore::Error,
    },
    #[error("Non-UTF-8 paths are not supported: `{}`", _0.display())]
    NotUtf8Path(PathBuf),
    #[error("Failed to walk source tree")]
    StripPrefix(#[from] StripPrefixError),
    #[error("Failed to write wheel zip archive")]
    Zip(#[from] zip::result::ZipError),
    #[error("Failed to write RECORD file")]
    Csv(#[from] csv::Error),
    #[error("Inconsistent metadata between prepare and build step: `{0}`")]
    InconsistentSteps(&'static str),
    #[error("Failed to write to {}", _0.display())]
    TarWrite(PathBuf, #[source] io::Error),
}

/// An entry in the `RECORD` file.
///
/// <https://packaging.python.org/en/latest/specifications/recording-installed-packages/#the-record-file>
pub(crate) struct RecordEntry {
    /// The path to the file relative to the package root.
    ///
    /// While the spec would allow backslashes, we always use portable paths
    /// with forward slashes.
    pub(crate) path: String,
    /// The SHA-256 of the file, base64-urlsafe without padding.
    pub(crate) hash: String,
    /// The size of the file in bytes.
    pub(crate) size: usize,
}

pub(crate) fn digest(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::new().chain_update(bytes).finalize())
}

/// Read the input and write it both to the hasher and the target.
///
/// We're implementing this tee-ing manually since there is no sync
/// `InspectReader` or std tee function.
pub(crate) fn write_hashed(
    path: &str,
    reader: &mut dyn Read,
    writer: &mut dyn Write,
) -> Result<RecordEntry, io::Error> {
    let mut hasher = Sha256::new();
    let mut size = 0;
    // 8KB is the default defined in `std::sys_common::io`.
    let mut buffer = vec![0; 8 * 1024];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        if read == 0 {
            // End of file
            break;
        }
        hasher.update(&buffer[..read]);
        writer.write_all(&buffer[..read])?;
        size += read;
    }
    Ok(RecordEntry {
        path: path.to_string(),
        hash: URL_SAFE_NO_PAD.encode(hasher.finalize()),
        size,
    })
}

/// Write the `RECORD` file.
///
/// Rows are sorted by archive path; the entry for `RECORD` itself carries
/// empty hash and size fields since it can't include its own digest.
pub(crate) fn write_record(
    writer: &mut dyn Write,
    dist_info_dir: &str,
    mut record: Vec<RecordEntry>,
) -> Result<(), Error> {
    record.push(RecordEntry {
        path: format!("{dist_info_dir}/RECORD"),
        hash: String::new(),
        size: 0,
    });
    record.sort_by(|left, right| left.path.cmp(&right.path));

    let mut record_writer = csv::Writer::from_writer(writer);
    for entry in record {
        let (hash, size) = if entry.hash.is_empty() {
            (String::new(), String::new())
        } else {
            (format!("sha256={}", entry.hash), entry.size.to_string())
        };
        record_writer.write_record(&[entry.path, hash, size])?;
    }
    record_writer.flush()?;
    Ok(())
}

/// Allows dispatching between writing to a directory and writing to a zip.
///
/// All paths are string types instead of path types since wheels are portable
/// between platforms.
///
/// Contract: You must call close before dropping to obtain a valid output
/// (dropping is fine in the error case).
pub(crate) trait DirectoryWriter {
    /// Add a file with the given content.
    fn write_bytes(&mut self, path: &str, bytes: &[u8]) -> Result<(), Error>;

    /// Add a local file.
    fn write_file(&mut self, path: &str, file: &Path) -> Result<(), Error>;

    /// Create a directory.
    fn write_directory(&mut self, directory: &str) -> Result<(), Error>;

    /// Write the `RECORD` file and, if applicable, the central directory.
    fn close(self: Box<Self>, dist_info_dir: &str) -> Result<(), Error>;
}

/// Zip archive (wheel) writer with deterministic entries: a fixed timestamp,
/// fixed permissions and a fixed compression level.
pub(crate) struct ZipDirectoryWriter {
    writer: ZipWriter<File>,
    compression: CompressionMethod,
    timestamp: zip::DateTime,
    record: Vec<RecordEntry>,
}

impl ZipDirectoryWriter {
    /// A wheel writer with deflate compression.
    pub(crate) fn new_wheel(file: File) -> Self {
        Self {
            writer: ZipWriter::new(file),
            compression: CompressionMethod::Deflated,
            timestamp: zip_timestamp(source_date_epoch()),
            record: Vec::new(),
        }
    }

    /// A wheel writer with no (stored) compression, for inputs that are
    /// already compressed.
    pub(crate) fn new_stored(file: File) -> Self {
        Self {
            writer: ZipWriter::new(file),
            compression: CompressionMethod::Stored,
            timestamp: zip_timestamp(source_date_epoch()),
            record: Vec::new(),
        }
    }

    fn options(&self) -> zip::write::FileOptions {
        let options = zip::write::FileOptions::default()
            .compression_method(self.compression)
            .last_modified_time(self.timestamp)
            .unix_permissions(0o644);
        if self.compression == CompressionMethod::Deflated {
            // A fixed level, so the same inputs deflate to the same bytes.
            options.compression_level(Some(6))
        } else {
            options
        }
    }
}

impl DirectoryWriter for ZipDirectoryWriter {
    fn write_bytes(&mut self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        trace!("Adding {}", path);
        self.writer.start_file(path, self.options())?;
        self.writer.write_all(bytes)?;
        self.record.push(RecordEntry {
            path: path.to_string(),
            hash: digest(bytes),
            size: bytes.len(),
        });
        Ok(())
    }

    fn write_file(&mut self, path: &str, file: &Path) -> Result<(), Error> {
        trace!("Adding {} from {}", path, file.display());
        let mut reader = BufReader::new(File::open(file)?);
        self.writer.start_file(path, self.options())?;
        let record = write_hashed(path, &mut reader, &mut self.writer)?;
        self.record.push(record);
        Ok(())
    }

    fn write_directory(&mut self, directory: &str) -> Result<(), Error> {
        trace!("Adding directory {}", directory);
        Ok(self.writer.add_directory(directory, self.options())?)
    }

    /// Write the `RECORD` file and the central directory.
    fn close(mut self: Box<Self>, dist_info_dir: &str) -> Result<(), Error> {
        let record_path = format!("{dist_info_dir}/RECORD");
        trace!("Adding {record_path}");
        let record = std::mem::take(&mut self.record);
        self.writer.start_file(record_path.as_str(), self.options())?;
        let mut buffer = Vec::new();
        write_record(&mut buffer, dist_info_dir, record)?;
        self.writer.write_all(&buffer)?;

        trace!("Adding central directory");
        self.writer.finish()?;
        Ok(())
    }
}

/// File system writer, used for the metadata-only preparation step.
pub(crate) struct FilesystemWriter {
    /// The metadata directory that file paths are relative to.
    root: PathBuf,
    record: Vec<RecordEntry>,
}

impl FilesystemWriter {
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            root: root.to_owned(),
            record: Vec::new(),
        }
    }
}

impl DirectoryWriter for FilesystemWriter {
    fn write_bytes(&mut self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        trace!("Adding {}", path);
        self.record.push(RecordEntry {
            path: path.to_string(),
            hash: digest(bytes),
            size: bytes.len(),
        });
        Ok(fs_err::write(self.root.join(path), bytes)?)
    }

    fn write_file(&mut self, path: &str, file: &Path) -> Result<(), Error> {
        trace!("Adding {} from {}", path, file.display());
        let mut reader = BufReader::new(File::open(file)?);
        let mut writer = File::create(self.root.join(path))?;
        let record = write_hashed(path, &mut reader, &mut writer)?;
        self.record.push(record);
        Ok(())
    }

    fn write_directory(&mut self, directory: &str) -> Result<(), Error> {
        trace!("Adding directory {}", directory);
        Ok(fs_err::create_dir_all(self.root.join(directory))?)
    }

    /// Write the `RECORD` file.
    fn close(mut self: Box<Self>, dist_info_dir: &str) -> Result<(), Error> {
        let record = std::mem::take(&mut self.record);
        let mut writer = File::create(self.root.join(dist_info_dir).join("RECORD"))?;
        write_record(&mut writer, dist_info_dir, record)?;
        Ok(())
    }
}

/// The archive timestamp: `SOURCE_DATE_EPOCH` when set, a fixed constant
/// otherwise, so repeated builds are byte-identical.
pub(crate) fn source_date_epoch() -> u64 {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(DEFAULT_SOURCE_DATE_EPOCH)
}

/// Days-based civil calendar conversion, after Howard Hinnant's algorithms.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let days = days + 719_468;
    let era = days.div_euclid(146_097);
    let day_of_era = days.rem_euclid(146_097);
    let year_of_era = (day_of_era - day_of_era / 1460 + day_of_era / 36524 - day_of_era / 146_096) / 365;
    let year = year_of_era + era * 400;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let month_index = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * month_index + 2) / 5 + 1;
    let month = if month_index < 10 {
        month_index + 3
    } else {
        month_index - 9
    };
    let year = if month <= 2 { year + 1 } else { year };
    (year, u32::try_from(month).expect("month is 1-12"), u32::try_from(day).expect("day is 1-31"))
}

/// Convert a unix timestamp into a DOS datetime, clamped into the
/// representable 1980..=2107 range.
pub(crate) fn zip_timestamp(epoch: u64) -> zip::DateTime {
    let epoch = epoch.clamp(DEFAULT_SOURCE_DATE_EPOCH, 4_102_444_800);
    let days = i64::try_from(epoch / 86_400).expect("the epoch is clamped");
    let seconds_of_day = epoch % 86_400;
    let (year, month, day) = civil_from_days(days);
    zip::DateTime::from_date_and_time(
        u16::try_from(year).expect("the epoch is clamped"),
        u8::try_from(month).expect("month is 1-12"),
        u8::try_from(day).expect("day is 1-31"),
        u8::try_from(seconds_of_day / 3600).expect("hour is 0-23"),
        u8::try_from(seconds_of_day % 3600 / 60).expect("minute is 0-59"),
        // DOS timestamps have two-second granularity.
        u8::try_from(seconds_of_day % 60 / 2 * 2).expect("second is 0-58"),
    )
    .expect("clamped timestamps are representable")
}

/// Load and interpret the manifest at the root of the source tree.
pub(crate) fn load_package(source_tree: &Path) -> Result<Package, Error> {
    let contents = fs_err::read_to_string(source_tree.join("pyproject.toml"))?;
    let pyproject = PyProjectToml::parse(&contents).map_err(ManifestError::from)?;
    Ok(Package::from_pyproject(&pyproject)?)
}

/// The escaped `<name>-<version>` prefix shared by the distribution
/// filenames, with `+` in a local version escaped to `_`.
pub(crate) fn distribution_prefix(package: &Package) -> Result<String, Error> {
    let version = package.version().ok_or(Error::MissingVersion)?;
    Ok(format!(
        "{}-{}",
        package.name.as_dist_info_name(),
        version.to_string().replace('+', "_")
    ))
}

/// The wheel tag triple: pure wheels are `py3-none-any`, a build script makes
/// the wheel platform-specific.
pub(crate) fn wheel_tag(package: &Package) -> String {
    if package.build.is_some() {
        format!("py3-none-{}", host_platform_tag())
    } else {
        "py3-none-any".to_string()
    }
}

/// The platform tag of the machine the backend runs on.
fn host_platform_tag() -> String {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("linux", "x86_64") => "linux_x86_64".to_string(),
        ("linux", "aarch64") => "linux_aarch64".to_string(),
        ("macos", "x86_64") => "macosx_10_12_x86_64".to_string(),
        ("macos", "aarch64") => "macosx_11_0_arm64".to_string(),
        ("windows", "x86_64") => "win_amd64".to_string(),
        ("windows", "x86") => "win32".to_string(),
        (os, arch) => format!("{os}_{arch}"),
    }
}

/// PEP 517: the build requirements for an sdist. The backend is
/// self-contained, so there are none.
pub fn get_requires_for_build_sdist(_config: Option<&ConfigSettings>) -> Vec<String> {
    Vec::new()
}

/// PEP 517: the build requirements for a wheel. Empty for pure wheels; when
/// the manifest declares a build script, the `[build-system] requires`
/// entries beyond the backend itself.
pub fn get_requires_for_build_wheel(
    source_tree: &Path,
    _config: Option<&ConfigSettings>,
) -> Result<Vec<String>, Error> {
    let package = load_package(source_tree)?;
    if package.build.is_none() {
        return Ok(Vec::new());
    }
    Ok(package
        .build_requires
        .iter()
        .filter(|requirement| {
            Requirement::from_str(requirement)
                .map(|requirement| requirement.name.as_str() != BACKEND_NAME)
                .unwrap_or(true)
        })
        .cloned()
        .collect())
}

/// PEP 517: write only the `.dist-info` directory into `metadata_directory`
/// and return its name.
pub fn prepare_metadata_for_build_wheel(
    source_tree: &Path,
    metadata_directory: &Path,
    _config: Option<&ConfigSettings>,
) -> Result<String, Error> {
    wheel::write_metadata_directory(source_tree, metadata_directory)
}

/// PEP 517: build the sdist into `sdist_directory` and return its filename.
pub fn build_sdist(
    source_tree: &Path,
    sdist_directory: &Path,
    _config: Option<&ConfigSettings>,
) -> Result<String, Error> {
    source_dist::build(source_tree, sdist_directory)
}

/// PEP 517: build the wheel into `wheel_directory` and return its filename.
///
/// When `metadata_directory` is given, its `METADATA` bytes are reused
/// verbatim; they must match what [`prepare_metadata_for_build_wheel`] would
/// produce for this source tree.
pub fn build_wheel(
    source_tree: &Path,
    wheel_directory: &Path,
    _config: Option<&ConfigSettings>,
    metadata_directory: Option<&Path>,
) -> Result<String, Error> {
    wheel::build(source_tree, wheel_directory, metadata_directory)
}

/// PEP 660: build a wheel whose payload makes the source tree importable,
/// by pointing a `.pth` file at the package roots.
pub fn build_editable(
    source_tree: &Path,
    wheel_directory: &Path,
    _config: Option<&ConfigSettings>,
    metadata_directory: Option<&Path>,
) -> Result<String, Error> {
    wheel::build_editable(source_tree, wheel_directory, metadata_directory)
}

#[cfg(test)]
mod tests;

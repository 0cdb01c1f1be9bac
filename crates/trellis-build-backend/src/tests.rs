use std::io::Read;
use std::path::Path;

use indoc::indoc;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use super::*;

/// A flat-layout demo project with a module, metadata files and an extra.
fn demo_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs_err::write(
        dir.path().join("pyproject.toml"),
        indoc! {r#"
            [project]
            name = "demo"
            version = "0.1"
            description = "A demo package"
            readme = "README.md"
            requires-python = ">=3.8"
            license = { text = "MIT" }
            authors = [{ name = "Ferris the Crab", email = "ferris@rustacean.net" }]
            dependencies = ["requests[security]>=2.13,<3.0"]

            [project.optional-dependencies]
            cli = ["click>=8 ; python_version >= '3.8'"]

            [project.scripts]
            demo = "demo.cli:main"

            [build-system]
            requires = ["trellis"]
            build-backend = "trellis"
        "#},
    )
    .unwrap();
    fs_err::write(dir.path().join("README.md"), "# demo\n\nA demo package.\n").unwrap();
    fs_err::write(dir.path().join("LICENSE"), "MIT\n").unwrap();
    fs_err::create_dir(dir.path().join("demo")).unwrap();
    fs_err::write(dir.path().join("demo").join("__init__.py"), "__version__ = \"0.1\"\n").unwrap();
    fs_err::write(
        dir.path().join("demo").join("cli.py"),
        "def main():\n    print(\"demo\")\n",
    )
    .unwrap();
    dir
}

fn read_wheel_file(wheel: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(File::open(wheel).unwrap()).unwrap();
    let mut contents = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    contents
}

#[test]
fn wheel_contents_and_metadata() {
    let source = demo_tree();
    let output = TempDir::new().unwrap();
    let filename = build_wheel(source.path(), output.path(), None, None).unwrap();
    assert_eq!(filename, "demo-0.1-py3-none-any.whl");

    let wheel = output.path().join(&filename);
    let mut archive = zip::ZipArchive::new(File::open(&wheel).unwrap()).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|index| archive.by_index(index).unwrap().name().to_string())
        .collect();
    assert!(names.contains(&"demo/__init__.py".to_string()), "{names:?}");
    assert!(names.contains(&"demo-0.1.dist-info/METADATA".to_string()));
    assert!(names.contains(&"demo-0.1.dist-info/WHEEL".to_string()));
    assert!(names.contains(&"demo-0.1.dist-info/entry_points.txt".to_string()));
    assert!(names.contains(&"demo-0.1.dist-info/licenses/LICENSE".to_string()));
    assert!(names.contains(&"demo-0.1.dist-info/RECORD".to_string()));
    // The wheel payload is rooted at the import path.
    assert!(!names.contains(&"pyproject.toml".to_string()));

    let metadata = read_wheel_file(&wheel, "demo-0.1.dist-info/METADATA");
    insta::assert_snapshot!(metadata, @r###"
    Metadata-Version: 2.3
    Name: demo
    Version: 0.1
    Summary: A demo package
    Author-email: Ferris the Crab <ferris@rustacean.net>
    License: MIT
    Requires-Python: >=3.8
    Requires-Dist: requests[security] (>=2.13,<3.0)
    Requires-Dist: click (>=8) ; python_version >= "3.8" and extra == "cli"
    Provides-Extra: cli
    Description-Content-Type: text/markdown

    # demo

    A demo package.
    "###);

    let wheel_file = read_wheel_file(&wheel, "demo-0.1.dist-info/WHEEL");
    assert_eq!(
        wheel_file,
        format!(
            "Wheel-Version: 1.0\nGenerator: trellis {BACKEND_VERSION}\nRoot-Is-Purelib: true\nTag: py3-none-any\n"
        )
    );

    let entry_points = read_wheel_file(&wheel, "demo-0.1.dist-info/entry_points.txt");
    insta::assert_snapshot!(entry_points, @r###"
    [console_scripts]
    demo = demo.cli:main

    "###);
}

#[test]
fn record_covers_the_archive() {
    let source = demo_tree();
    let output = TempDir::new().unwrap();
    let filename = build_wheel(source.path(), output.path(), None, None).unwrap();
    let wheel = output.path().join(&filename);

    let record = read_wheel_file(&wheel, "demo-0.1.dist-info/RECORD");
    let rows: Vec<Vec<String>> = record
        .lines()
        .map(|line| line.split(',').map(ToString::to_string).collect())
        .collect();

    // Sorted by archive path.
    let paths: Vec<&String> = rows.iter().map(|row| &row[0]).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);

    // Every non-directory archive entry is listed, with the correct digest
    // and size; RECORD itself has empty hash and size fields.
    let mut archive = zip::ZipArchive::new(File::open(&wheel).unwrap()).unwrap();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).unwrap();
        let name = entry.name().to_string();
        if name.ends_with('/') {
            continue;
        }
        let row = rows
            .iter()
            .find(|row| row[0] == name)
            .unwrap_or_else(|| panic!("{name} missing from RECORD"));
        if name == "demo-0.1.dist-info/RECORD" {
            assert_eq!(row[1], "");
            assert_eq!(row[2], "");
            continue;
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).unwrap();
        let digest = format!(
            "sha256={}",
            base64::engine::general_purpose::URL_SAFE_NO_PAD
                .encode(Sha256::new().chain_update(&bytes).finalize())
        );
        assert_eq!(row[1], digest, "{name}");
        assert_eq!(row[2], bytes.len().to_string(), "{name}");
    }
}

#[test]
fn sdist_contents() {
    let source = demo_tree();
    let output = TempDir::new().unwrap();
    let filename = build_sdist(source.path(), output.path(), None).unwrap();
    assert_eq!(filename, "demo-0.1.tar.gz");

    let tar_gz = File::open(output.path().join(&filename)).unwrap();
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(tar_gz));
    let mut files = Vec::new();
    let mut pkg_info = String::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().into_owned();
        let header = entry.header();
        assert_eq!(header.uid().unwrap(), 0);
        assert_eq!(header.gid().unwrap(), 0);
        if entry.header().entry_type().is_dir() {
            assert_eq!(header.mode().unwrap(), 0o755);
            continue;
        }
        assert_eq!(header.mode().unwrap(), 0o644);
        if path == "demo-0.1/PKG-INFO" {
            entry.read_to_string(&mut pkg_info).unwrap();
        }
        files.push(path);
    }

    // Everything lives under the `<name>-<version>/` top directory, in
    // lexicographic order.
    let mut sorted = files.clone();
    sorted.sort();
    assert_eq!(files, sorted);
    assert_eq!(
        files,
        [
            "demo-0.1/LICENSE",
            "demo-0.1/PKG-INFO",
            "demo-0.1/README.md",
            "demo-0.1/demo/__init__.py",
            "demo-0.1/demo/cli.py",
            "demo-0.1/pyproject.toml",
        ]
    );

    // `PKG-INFO` matches the wheel `METADATA` byte for byte.
    let wheel_output = TempDir::new().unwrap();
    let wheel_name = build_wheel(source.path(), wheel_output.path(), None, None).unwrap();
    let metadata = read_wheel_file(
        &wheel_output.path().join(wheel_name),
        "demo-0.1.dist-info/METADATA",
    );
    assert_eq!(pkg_info, metadata);
}

#[test]
fn builds_are_reproducible() {
    let source = demo_tree();

    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let first_wheel = build_wheel(source.path(), first.path(), None, None).unwrap();
    let second_wheel = build_wheel(source.path(), second.path(), None, None).unwrap();
    assert_eq!(first_wheel, second_wheel);
    assert_eq!(
        fs_err::read(first.path().join(&first_wheel)).unwrap(),
        fs_err::read(second.path().join(&second_wheel)).unwrap()
    );

    let first_sdist = build_sdist(source.path(), first.path(), None).unwrap();
    let second_sdist = build_sdist(source.path(), second.path(), None).unwrap();
    assert_eq!(
        fs_err::read(first.path().join(&first_sdist)).unwrap(),
        fs_err::read(second.path().join(&second_sdist)).unwrap()
    );
}

#[test]
fn prepared_metadata_is_reused() {
    let source = demo_tree();
    let metadata_dir = TempDir::new().unwrap();
    let dist_info = prepare_metadata_for_build_wheel(source.path(), metadata_dir.path(), None)
        .unwrap();
    assert_eq!(dist_info, "demo-0.1.dist-info");
    assert!(metadata_dir
        .path()
        .join(&dist_info)
        .join("METADATA")
        .is_file());
    assert!(metadata_dir.path().join(&dist_info).join("RECORD").is_file());

    let output = TempDir::new().unwrap();
    let filename =
        build_wheel(source.path(), output.path(), None, Some(metadata_dir.path())).unwrap();
    assert_eq!(filename, "demo-0.1-py3-none-any.whl");

    // A prepare step from a diverged source tree is rejected.
    fs_err::write(
        metadata_dir.path().join(&dist_info).join("METADATA"),
        "Metadata-Version: 2.3\nName: other\nVersion: 9.9\n",
    )
    .unwrap();
    let err = build_wheel(source.path(), output.path(), None, Some(metadata_dir.path()))
        .unwrap_err();
    assert!(matches!(err, Error::InconsistentSteps("METADATA")));
}

#[test]
fn editable_wheel_points_at_the_source_tree() {
    let source = demo_tree();
    let output = TempDir::new().unwrap();
    let filename = build_editable(source.path(), output.path(), None, None).unwrap();
    let wheel = output.path().join(&filename);

    let pth = read_wheel_file(&wheel, "demo.pth");
    assert_eq!(pth.trim_end(), source.path().display().to_string());
    let metadata = read_wheel_file(&wheel, "demo-0.1.dist-info/METADATA");
    assert!(metadata.contains("Name: demo"));
}

#[test]
fn src_layout_with_declared_packages() {
    let dir = TempDir::new().unwrap();
    fs_err::write(
        dir.path().join("pyproject.toml"),
        indoc! {r#"
            [tool.trellis]
            name = "demo"
            version = "0.1"
            packages = [{ include = "demo", from = "src" }]
            include = [{ path = "data/defaults.cfg", format = "sdist" }]
            exclude = ["**/*.secret"]
        "#},
    )
    .unwrap();
    fs_err::create_dir_all(dir.path().join("src").join("demo")).unwrap();
    fs_err::write(dir.path().join("src").join("demo").join("__init__.py"), "").unwrap();
    fs_err::write(dir.path().join("src").join("demo").join("token.secret"), "").unwrap();
    fs_err::create_dir(dir.path().join("data")).unwrap();
    fs_err::write(dir.path().join("data").join("defaults.cfg"), "x = 1\n").unwrap();

    let output = TempDir::new().unwrap();
    let wheel_name = build_wheel(dir.path(), output.path(), None, None).unwrap();
    let mut archive =
        zip::ZipArchive::new(File::open(output.path().join(&wheel_name)).unwrap()).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|index| archive.by_index(index).unwrap().name().to_string())
        .collect();
    // The `src` prefix is stripped in the wheel and the exclude applies.
    assert!(names.contains(&"demo/__init__.py".to_string()), "{names:?}");
    assert!(!names.iter().any(|name| name.contains("token.secret")));
    // The sdist-only include stays out of the wheel.
    assert!(!names.iter().any(|name| name.contains("defaults.cfg")));

    let sdist_name = build_sdist(dir.path(), output.path(), None).unwrap();
    let tar_gz = File::open(output.path().join(&sdist_name)).unwrap();
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(tar_gz));
    let files: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|entry| {
            entry
                .unwrap()
                .path()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    // The sdist keeps the full tree layout.
    assert!(files.contains(&"demo-0.1/src/demo/__init__.py".to_string()), "{files:?}");
    assert!(files.contains(&"demo-0.1/data/defaults.cfg".to_string()));
    assert!(!files.iter().any(|name| name.contains("token.secret")));
}

#[test]
fn requires_hooks() {
    let source = demo_tree();
    assert!(get_requires_for_build_sdist(None).is_empty());
    // No build script, no build requirements.
    assert!(get_requires_for_build_wheel(source.path(), None)
        .unwrap()
        .is_empty());

    let native = TempDir::new().unwrap();
    fs_err::write(
        native.path().join("pyproject.toml"),
        indoc! {r#"
            [project]
            name = "native"
            version = "0.1"

            [tool.trellis.build]
            script = "build.py"

            [build-system]
            requires = ["trellis", "cffi>=1.0"]
            build-backend = "trellis"
        "#},
    )
    .unwrap();
    assert_eq!(
        get_requires_for_build_wheel(native.path(), None).unwrap(),
        ["cffi>=1.0"]
    );
}

#[test]
fn dynamic_version_needs_a_frontend() {
    let dir = TempDir::new().unwrap();
    fs_err::write(
        dir.path().join("pyproject.toml"),
        indoc! {r#"
            [project]
            name = "demo"
            dynamic = ["version"]
        "#},
    )
    .unwrap();
    let output = TempDir::new().unwrap();
    let err = build_sdist(dir.path(), output.path(), None).unwrap_err();
    assert!(matches!(err, Error::MissingVersion));
}

#[test]
fn timestamps() {
    // 2020-02-02 03:04:05 UTC
    let timestamp = zip_timestamp(1_580_612_645);
    assert_eq!(timestamp.year(), 2020);
    assert_eq!(timestamp.month(), 2);
    assert_eq!(timestamp.day(), 2);
    assert_eq!(timestamp.hour(), 3);
    assert_eq!(timestamp.minute(), 4);
    // Two-second granularity.
    assert_eq!(timestamp.second(), 4);

    // Pre-1980 timestamps clamp to the zip epoch.
    let timestamp = zip_timestamp(0);
    assert_eq!(timestamp.year(), 1980);
    assert_eq!(timestamp.month(), 1);
    assert_eq!(timestamp.day(), 1);
}

#[test]
fn record_digest_is_unpadded() {
    assert_eq!(digest(b"trellis").len(), 43);
    assert!(!digest(b"trellis").contains('='));
}

//! Reading inputs from files: ordering across files, globs, compression and failures.

use std::fs;
use tempfile::TempDir;
use xcut::fields::FieldOptions;
use xcut::sink::VecEmitter;
use xcut::{Error, InputSource, Pipeline, SinkMode};

fn write(dir: &TempDir, name: &str, body: &str) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.path().join(name);
    fs::write(&path, body)?;
    Ok(path)
}

fn run_files(source: &InputSource) -> anyhow::Result<Vec<String>> {
    let out = VecEmitter::new();
    Pipeline::default().with_workers(4).with_mode(SinkMode::Ordered).run(
        source.open()?,
        FieldOptions::default().build()?,
        out.clone(),
    )?;
    Ok(out.payloads())
}

#[test]
fn test_files_are_read_in_argument_order() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let a = write(&dir, "a.txt", "a1\na2\n")?;
    let b = write(&dir, "b.txt", "b1\r\nb2")?;

    let out = run_files(&InputSource::Files(vec![b, a]))?;
    assert_eq!(out, vec!["b1", "b2", "a1", "a2"]);
    Ok(())
}

#[test]
fn test_glob_pattern_expands_sorted() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    write(&dir, "part-2.log", "two\n")?;
    write(&dir, "part-1.log", "one\n")?;
    write(&dir, "other.txt", "skip\n")?;
    fs::create_dir(dir.path().join("part-3.log"))?;

    let pattern = format!("{}/part-*.log", dir.path().display());
    let source = InputSource::from_args(&[pattern])?;
    assert_eq!(run_files(&source)?, vec!["one", "two"]);
    Ok(())
}

#[test]
fn test_glob_without_match_is_an_error() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let pattern = format!("{}/*.missing", dir.path().display());
    let err = InputSource::from_args(&[pattern]).unwrap_err();
    assert!(matches!(err, Error::NoMatchingInput { .. }));
    Ok(())
}

#[test]
fn test_missing_file_aborts_before_reading() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let present = write(&dir, "present.txt", "x\n")?;
    let missing = dir.path().join("missing.txt");

    let err = InputSource::Files(vec![present, missing.clone()]).open().err().unwrap();
    match err {
        Error::SourceUnavailable { path, .. } => assert_eq!(path, missing),
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn test_no_arguments_means_stdin() -> anyhow::Result<()> {
    assert_eq!(InputSource::from_args::<String>(&[])?, InputSource::Stdin);
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn test_gzip_input_is_decompressed() -> anyhow::Result<()> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let dir = TempDir::new()?;
    let path = dir.path().join("data.txt.gz");
    let mut enc = GzEncoder::new(fs::File::create(&path)?, Compression::default());
    enc.write_all(b"k v\nk2 v2\n")?;
    enc.finish()?;

    let plain = write(&dir, "plain.txt", "p q\n")?;
    let out = run_files(&InputSource::Files(vec![path, plain]))?;
    assert_eq!(out, vec!["k v", "k2 v2", "p q"]);
    Ok(())
}

#[cfg(feature = "compression-zstd")]
#[test]
fn test_zstd_input_is_decompressed() -> anyhow::Result<()> {
    use std::io::Write;

    let dir = TempDir::new()?;
    let path = dir.path().join("data.zst");
    let bytes = zstd::encode_all(&b"z1\nz2\n"[..], 3)?;
    fs::File::create(&path)?.write_all(&bytes)?;

    assert_eq!(run_files(&InputSource::Files(vec![path]))?, vec!["z1", "z2"]);
    Ok(())
}

#[test]
fn test_fields_across_files() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let a = write(&dir, "a.csv", "id,name,age\n1,ann,31\n")?;
    let b = write(&dir, "b.csv", "2,bob,42\n")?;

    let cut = FieldOptions {
        delimiter: ",".into(),
        fields: "2,1".into(),
        pattern_fields: "2".into(),
        pattern: Some("s/^(.)/$1$1/".into()),
        ..FieldOptions::default()
    }
    .build()?;
    let out = VecEmitter::new();
    Pipeline::default()
        .with_workers(3)
        .with_mode(SinkMode::Ordered)
        .run(InputSource::Files(vec![a, b]).open()?, cut, out.clone())?;
    assert_eq!(out.payloads(), vec!["nname,id", "aann,1", "bbob,2"]);
    Ok(())
}

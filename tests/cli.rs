//! The `xcut` binary, driven as a subprocess.

use std::io::Write;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn xcut(args: &[&str], stdin: &str) -> anyhow::Result<Output> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_xcut"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    // The child may exit on bad options before reading anything.
    if let Err(e) = child.stdin.take().expect("stdin is piped").write_all(stdin.as_bytes())
        && e.kind() != std::io::ErrorKind::BrokenPipe
    {
        return Err(e.into());
    }
    Ok(child.wait_with_output()?)
}

fn stdout_lines(out: &Output) -> Vec<String> {
    String::from_utf8_lossy(&out.stdout).lines().map(str::to_string).collect()
}

#[test]
fn test_sorted_field_selection_from_stdin() -> anyhow::Result<()> {
    let out = xcut(&["-s", "-d", ",", "-f", "3,1", "-j", "4"], "a,b,c\nd,e,f\ng,h\n")?;
    assert!(out.status.success());
    assert_eq!(stdout_lines(&out), vec!["c,a", "f,d", "g"]);
    Ok(())
}

#[test]
fn test_pattern_on_inverse_fields() -> anyhow::Result<()> {
    let out = xcut(&["-s", "-d", ":", "-p", "1", "-i", "-x", r"s/\d+/N/"], "a1:b22:c3\n")?;
    assert!(out.status.success());
    assert_eq!(stdout_lines(&out), vec!["a1:bN:cN"]);
    Ok(())
}

#[test]
fn test_unsorted_output_keeps_every_line() -> anyhow::Result<()> {
    let input: String = (1..=500).map(|i| format!("{i} x\n")).collect();
    let out = xcut(&["-f", "1"], &input)?;
    assert!(out.status.success());
    let mut got: Vec<u32> = stdout_lines(&out).iter().map(|l| l.parse().unwrap()).collect();
    got.sort_unstable();
    assert_eq!(got, (1..=500).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_files_and_missing_file() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let a = dir.path().join("a.txt");
    std::fs::write(&a, "1 2\n")?;
    let a = a.to_string_lossy().into_owned();

    let ok = xcut(&["-s", "-f", "2", &a, &a], "")?;
    assert!(ok.status.success());
    assert_eq!(stdout_lines(&ok), vec!["2", "2"]);

    let missing = dir.path().join("nope.txt").to_string_lossy().into_owned();
    let bad = xcut(&[&a, &missing], "")?;
    assert_eq!(bad.status.code(), Some(1));
    assert!(bad.stdout.is_empty(), "nothing may be written when an input is missing");
    assert!(String::from_utf8_lossy(&bad.stderr).contains("cannot open"));
    Ok(())
}

#[test]
fn test_invalid_options_are_rejected() -> anyhow::Result<()> {
    for args in [
        &["-f", "0"][..],
        &["-f", "1,,2"][..],
        &["-i", "-x", "s/a/b/"][..],
        &["-p", "1"][..],
        &["-x", "s/a/b"][..],
        &["-x", "s/(/b/"][..],
        &["-d", ""][..],
        &["-x", ""][..],
        &["-j", "abc"][..],
        &["-f"][..],
        &["--no-such-flag"][..],
    ] {
        let out = xcut(args, "a b\n")?;
        assert_eq!(out.status.code(), Some(1), "wrong exit status for {args:?}");
        assert!(out.stdout.is_empty());
        let stderr = String::from_utf8_lossy(&out.stderr);
        assert!(stderr.starts_with("xcut: "), "unexpected message for {args:?}: {stderr}");
    }
    Ok(())
}

#[cfg(feature = "metrics")]
#[test]
fn test_metrics_file_is_written() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("m.json");
    let out = xcut(&["--metrics", &path.to_string_lossy()], "a\nb\nc\n")?;
    assert!(out.status.success());

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(json["records_in"]["value"], 3);
    assert_eq!(json["records_out"]["value"], 3);
    Ok(())
}

#[test]
fn test_help_exits_successfully() -> anyhow::Result<()> {
    let out = xcut(&["--help"], "")?;
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("--sorted"));
    Ok(())
}

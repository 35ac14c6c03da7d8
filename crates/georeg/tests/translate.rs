//! Process contract of the external translate step, exercised with stand-in
//! shell scripts. Kept in one test so no other test thread forks while the
//! scripts are being written.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use georeg::{GdalTranslate, TranslateError, TranslateRequest, Translator};

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn gdal_translate_process_contract() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out_registered.tif");
    let request = TranslateRequest::new(dir.path().join("in.tif"), &output, &[]);

    // success: the last argument is the output path
    let ok = script(dir.path(), "ok.sh", r#"for last; do :; done; echo done > "$last""#);
    GdalTranslate::new(&ok).translate(&request).unwrap();
    assert!(output.exists());
    fs::remove_file(&output).unwrap();

    // failure: partial output is removed and stderr is surfaced
    let failing = script(
        dir.path(),
        "fail.sh",
        r#"for last; do :; done; echo partial > "$last"; echo "ERROR 4: bad gcp" >&2; exit 3"#,
    );
    match GdalTranslate::new(&failing).translate(&request) {
        Err(TranslateError::Failed { status, stderr, .. }) => {
            assert_eq!(status.code(), Some(3));
            assert!(stderr.contains("bad gcp"), "{stderr}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!output.exists());

    // failure without writing: an earlier registered raster survives
    fs::write(&output, "earlier run").unwrap();
    let refusing = script(dir.path(), "refuse.sh", r#"echo "ERROR 1: no" >&2; exit 3"#);
    assert!(matches!(
        GdalTranslate::new(&refusing).translate(&request),
        Err(TranslateError::Failed { .. })
    ));
    assert_eq!(fs::read_to_string(&output).unwrap(), "earlier run");
    fs::remove_file(&output).unwrap();

    // timeout: the child is killed and partial output removed
    let slow = script(
        dir.path(),
        "slow.sh",
        r#"for last; do :; done; echo partial > "$last"; exec sleep 30"#,
    );
    let started = Instant::now();
    let result = GdalTranslate::new(&slow)
        .with_timeout(Some(Duration::from_millis(300)))
        .translate(&request);
    assert!(matches!(result, Err(TranslateError::Timeout { .. })), "{result:?}");
    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(!output.exists());

    // timeout with a forked grandchild still holding stderr open
    let forking = script(dir.path(), "forking.sh", "sleep 6");
    let started = Instant::now();
    let result = GdalTranslate::new(&forking)
        .with_timeout(Some(Duration::from_millis(300)))
        .translate(&request);
    assert!(matches!(result, Err(TranslateError::Timeout { .. })), "{result:?}");
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
}

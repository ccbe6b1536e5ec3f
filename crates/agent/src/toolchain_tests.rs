// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn streams_stdout_lines_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut lines = Vec::new();

    let result = run_streaming(
        "echo one; echo two",
        dir.path(),
        None,
        &CancellationToken::new(),
        |line| lines.push(line),
    )
    .await
    .unwrap();

    assert_eq!(result.exit_code, Some(0));
    assert_eq!(
        lines,
        vec![
            OutputLine::Stdout("one".to_string()),
            OutputLine::Stdout("two".to_string()),
        ]
    );
}

#[tokio::test]
async fn stderr_is_tagged_separately() {
    let dir = tempfile::tempdir().unwrap();
    let mut errs = Vec::new();

    run_streaming(
        "echo oops 1>&2",
        dir.path(),
        None,
        &CancellationToken::new(),
        |line| {
            if let OutputLine::Stderr(text) = line {
                errs.push(text);
            }
        },
    )
    .await
    .unwrap();

    assert_eq!(errs, vec!["oops"]);
}

#[tokio::test]
async fn reports_nonzero_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let result = run_streaming("exit 3", dir.path(), None, &CancellationToken::new(), |_| {})
        .await
        .unwrap();
    assert_eq!(result.exit_code, Some(3));
}

#[tokio::test]
async fn runs_in_the_given_cwd() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("marker"), b"x").await.unwrap();

    let mut lines = Vec::new();
    run_streaming("ls", dir.path(), None, &CancellationToken::new(), |line| {
        lines.push(line.text().to_string())
    })
    .await
    .unwrap();

    assert!(lines.contains(&"marker".to_string()));
}

#[tokio::test]
async fn tees_output_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let tee = dir.path().join("build.log");

    run_streaming(
        "echo logged; echo also 1>&2",
        dir.path(),
        Some(&tee),
        &CancellationToken::new(),
        |_| {},
    )
    .await
    .unwrap();

    let contents = tokio::fs::read_to_string(&tee).await.unwrap();
    assert!(contents.contains("logged"));
    assert!(contents.contains("also"));
}

#[tokio::test]
async fn cancellation_kills_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let err = run_streaming("sleep 30", dir.path(), None, &token, |_| {})
        .await
        .expect_err("should be cancelled");

    assert!(matches!(err, ToolchainError::Cancelled));
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

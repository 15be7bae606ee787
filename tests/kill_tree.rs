#![cfg(unix)]

use std::error::Error;
use std::time::Duration;

use kitguard::exec::{OutputSink, ProcessOptions, ProcessRunner};
use kitguard_test_utils::{init_tracing, with_timeout, SharedBuffer, TempTree};

type TestResult = Result<(), Box<dyn Error>>;

fn args(cmd: &[&str]) -> Vec<String> {
    cmd.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn killing_a_run_takes_its_background_children_along() -> TestResult {
    init_tracing();
    let tree = TempTree::new();
    let runner = ProcessRunner::with_output(OutputSink::new(SharedBuffer::new()));
    let opts = ProcessOptions {
        dir: Some(tree.root()),
        ..ProcessOptions::default()
    };

    let process = runner
        .spawn(&args(&["sh", "-c", "(sleep 1; touch marker) & sleep 30"]), &opts)
        .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    process.handle().kill_tree()?;
    let outcome = with_timeout(process.wait()).await?;
    assert!(!outcome.success);
    assert_eq!(outcome.code, None);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!tree.exists("marker"), "background child survived the kill");
    Ok(())
}

#[tokio::test]
async fn force_kill_reaches_processes_that_ignore_sigterm() -> TestResult {
    let tree = TempTree::new();
    let runner = ProcessRunner::with_output(OutputSink::new(SharedBuffer::new()));
    let opts = ProcessOptions {
        dir: Some(tree.root()),
        ..ProcessOptions::default()
    };

    let process = runner
        .spawn(&args(&["sh", "-c", "trap '' TERM; sleep 30"]), &opts)
        .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let handle = process.handle();
    handle.kill_tree()?;
    handle.force_kill_tree()?;
    let outcome = with_timeout(process.wait()).await?;
    assert!(!outcome.success);
    Ok(())
}

#[tokio::test]
async fn killing_an_emptied_group_is_not_an_error() -> TestResult {
    let tree = TempTree::new();
    let runner = ProcessRunner::with_output(OutputSink::new(SharedBuffer::new()));
    let opts = ProcessOptions {
        dir: Some(tree.root()),
        ..ProcessOptions::default()
    };

    let process = runner.spawn(&args(&["true"]), &opts).await?;
    let handle = process.handle();
    let outcome = with_timeout(process.wait()).await?;
    assert!(outcome.success);

    handle.kill_tree()?;
    handle.force_kill_tree()?;
    Ok(())
}

use std::error::Error;
use std::path::Path;
use std::time::Duration;

use kitguard::guard::Guard;
use kitguard::{GuardError, MatchResult, Matcher, IGNORE_HIDDEN, IGNORE_VCS};
use kitguard_test_utils::{collect_runs_for, init_tracing, GuardConfigBuilder, TempTree};

type TestResult = Result<(), Box<dyn Error>>;

const INCLUDED: MatchResult = MatchResult {
    matched: true,
    negative: false,
};
const EXCLUDED: MatchResult = MatchResult {
    matched: false,
    negative: true,
};
const NOTHING: MatchResult = MatchResult {
    matched: false,
    negative: false,
};

fn check(m: &mut Matcher, path: &str, is_dir: bool) -> MatchResult {
    m.is_match(Path::new(path), is_dir).expect("match should not fail")
}

#[test]
fn double_star_spans_zero_or_more_segments() -> TestResult {
    init_tracing();
    let tree = TempTree::new();
    let mut m = Matcher::new(tree.root(), &["**/*.go"])?;

    assert_eq!(check(&mut m, "main.go", false), INCLUDED);
    assert_eq!(check(&mut m, "cmd/app/main.go", false), INCLUDED);
    assert_eq!(check(&mut m, "cmd/app/main.rs", false), NOTHING);
    Ok(())
}

#[test]
fn later_negation_overrides_earlier_inclusion() -> TestResult {
    let tree = TempTree::new();
    let mut m = Matcher::new(tree.root(), &["src/**", "!src/gen/**"])?;

    assert_eq!(check(&mut m, "src/lib.rs", false), INCLUDED);
    assert_eq!(check(&mut m, "src/gen/api.rs", false), EXCLUDED);
    assert_eq!(check(&mut m, "src/gen", true), EXCLUDED);
    assert!(check(&mut m, "src/gen", true).prunes(true));
    Ok(())
}

#[test]
fn hidden_sentinel_excludes_dotfiles() -> TestResult {
    let tree = TempTree::new();
    let mut m = Matcher::new(tree.root(), &["**", IGNORE_HIDDEN])?;

    assert_eq!(check(&mut m, ".env", false), EXCLUDED);
    assert_eq!(check(&mut m, "web/.cache", true), EXCLUDED);
    assert_eq!(check(&mut m, "..cache", true), EXCLUDED);
    assert_eq!(check(&mut m, "web/index.html", false), INCLUDED);
    assert!(!check(&mut m, ".", true).negative, "the root itself is not hidden");
    Ok(())
}

#[test]
fn literal_paths_resolve_to_themselves() -> TestResult {
    let tree = TempTree::new();
    tree.file("config/app.toml", "x = 1");
    let outside = TempTree::new();
    let external = outside.file("shared.toml", "");

    let patterns = vec![
        "config/app.toml".to_string(),
        external.to_string_lossy().into_owned(),
    ];
    let mut m = Matcher::new(tree.root(), &patterns)?;

    assert_eq!(check(&mut m, "config/app.toml", false), INCLUDED);
    assert_eq!(m.is_match(&external, false)?, INCLUDED);
    assert_eq!(m.external_literals(), vec![external]);
    Ok(())
}

#[test]
fn glob_syntax_errors_are_reported() {
    let tree = TempTree::new();
    let err = Matcher::new(tree.root(), &["src/[a-"]).unwrap_err();
    assert!(matches!(err, GuardError::Pattern { .. }), "{err:?}");
}

#[test]
fn matching_is_idempotent() -> TestResult {
    let tree = TempTree::new();
    let mut m = Matcher::new(tree.root(), &["**", "!*.tmp", "keep.tmp"])?;

    for (path, is_dir) in [("a.tmp", false), ("keep.tmp", false), ("dir", true)] {
        let first = check(&mut m, path, is_dir);
        let second = check(&mut m, path, is_dir);
        assert_eq!(first, second, "{path}");
    }
    Ok(())
}

#[test]
fn vcs_sentinel_outside_a_repository_fails() {
    let tree = TempTree::new();
    if tree.inside_git_checkout() {
        eprintln!("temp dir is inside a git checkout; skipping");
        return;
    }
    let err = Matcher::new(tree.root(), &["**", IGNORE_VCS]).unwrap_err();
    match err {
        GuardError::Vcs(msg) => assert!(msg.contains("git"), "{msg}"),
        other => panic!("expected a VCS error, got {other:?}"),
    }
}

#[tokio::test]
async fn guard_with_vcs_sentinel_outside_a_repository_never_runs() -> TestResult {
    let tree = TempTree::new();
    if tree.inside_git_checkout() {
        eprintln!("temp dir is inside a git checkout; skipping");
        return Ok(());
    }
    tree.file("main.go", "");

    let config = GuardConfigBuilder::new(tree.root()).init_run(true).build();
    let mut guard = Guard::new(
        vec!["true".to_string()],
        vec!["**".to_string(), IGNORE_VCS.to_string()],
        config,
    );
    let mut rx = guard.run_events();

    match guard.start().await {
        Err(GuardError::Vcs(msg)) => assert!(msg.contains("git"), "{msg}"),
        Err(other) => panic!("expected a VCS error, got {other:?}"),
        Ok(_) => panic!("guard started outside a repository"),
    }

    let events = collect_runs_for(&mut rx, Duration::from_millis(300)).await;
    assert!(events.is_empty(), "{events:?}");
    assert!(rx.recv().await.is_none(), "run event channel should be closed");
    Ok(())
}

#[test]
fn vcs_sentinel_applies_gitignore_rules() -> TestResult {
    init_tracing();
    let tree = TempTree::new();
    if !tree.git_init() {
        eprintln!("git not available; skipping");
        return Ok(());
    }
    tree.file(".gitignore", "target/\n*.log\n!keep.log\n");
    tree.file("web/.gitignore", "dist\n");
    tree.file("src/main.rs", "");
    tree.file("target/debug/app", "");
    tree.file("web/dist/bundle.js", "");

    let mut m = Matcher::new(tree.root(), &["**", IGNORE_VCS])?;

    assert_eq!(check(&mut m, "src/main.rs", false), INCLUDED);
    assert_eq!(check(&mut m, "target", true), EXCLUDED);
    assert_eq!(check(&mut m, "target/debug/app", false), EXCLUDED);
    assert_eq!(check(&mut m, "debug.log", false), EXCLUDED);
    assert_eq!(check(&mut m, "keep.log", false), INCLUDED);
    assert_eq!(check(&mut m, "web/dist", true), EXCLUDED);
    assert_eq!(check(&mut m, "web/index.html", false), INCLUDED);
    Ok(())
}

#[test]
fn git_directory_stays_excluded_whatever_follows() -> TestResult {
    let tree = TempTree::new();
    if !tree.git_init() {
        eprintln!("git not available; skipping");
        return Ok(());
    }
    tree.file("debug.log", "");
    tree.file(".gitignore", "*.log\n");

    let mut m = Matcher::new(tree.root(), &[IGNORE_VCS, "**", ".git/**"])?;

    assert_eq!(check(&mut m, ".git", true), EXCLUDED);
    // Ignore-file rules are positional: the later `**` re-includes.
    assert_eq!(check(&mut m, "debug.log", false), INCLUDED);
    Ok(())
}

#[test]
fn submodule_roots_stay_excluded_whatever_follows() -> TestResult {
    let tree = TempTree::new();
    if !tree.git_init() {
        eprintln!("git not available; skipping");
        return Ok(());
    }
    tree.file(
        ".gitmodules",
        "[submodule \"vendor/lib\"]\n\tpath = vendor/lib\n\turl = ./vendor/lib\n",
    );
    tree.file("vendor/lib/lib.go", "");
    tree.file("vendor/other.go", "");
    // Register a gitlink without cloning anything.
    let registered = tree.git(&[
        "update-index",
        "--add",
        "--cacheinfo",
        "160000,0123456789abcdef0123456789abcdef01234567,vendor/lib",
    ]);
    if !registered || !tree.git(&["submodule", "status"]) {
        eprintln!("cannot register a submodule; skipping");
        return Ok(());
    }

    let mut m = Matcher::new(tree.root(), &["**", IGNORE_VCS, "vendor/**"])?;

    let sub = check(&mut m, "vendor/lib", true);
    assert_eq!(sub, EXCLUDED);
    assert!(sub.prunes(true));
    assert_eq!(check(&mut m, "vendor/other.go", false), INCLUDED);
    Ok(())
}

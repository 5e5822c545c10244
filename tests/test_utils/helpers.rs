/*!
 * 测试辅助函数
 *
 * - 轮询等待引擎状态
 * - 真实 git 仓库的搭建（本地 bare remote）
 */

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use wavesync::sync::EngineStatus;
use wavesync::SyncEngine;

/// Polls the engine status until `predicate` holds, panicking after 10s.
pub async fn wait_for(
    engine: &SyncEngine,
    what: &str,
    predicate: impl Fn(&EngineStatus) -> bool,
) -> EngineStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let status = engine.status();
        if predicate(&status) {
            return status;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}: last status {:?}", what, status);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Real-git tests are skipped on machines without a git binary.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Runs git with a fixed identity and returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {:?}: {}", args, e));
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Bare remote on `main` with one commit containing `README.md`.
pub fn init_remote(root: &Path) -> PathBuf {
    let remote = root.join("remote.git");
    std::fs::create_dir_all(&remote).unwrap();
    git(&remote, &["init", "--bare", "--quiet", "-b", "main"]);

    let seed = root.join("seed");
    git(root, &["clone", "--quiet", remote.to_str().unwrap(), seed.to_str().unwrap()]);
    configure_identity(&seed);
    git(&seed, &["checkout", "--quiet", "-b", "main"]);
    write_file(&seed, "README.md", "hello\n");
    git(&seed, &["add", "-A"]);
    git(&seed, &["commit", "--quiet", "-m", "initial"]);
    git(&seed, &["push", "--quiet", "origin", "main"]);
    remote
}

/// A second working copy standing in for another machine.
pub fn clone_other(root: &Path, remote: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    git(root, &["clone", "--quiet", "-b", "main", remote.to_str().unwrap(), dir.to_str().unwrap()]);
    configure_identity(&dir);
    dir
}

/// Repository-local identity so commits made by the engine itself work
/// without a global git config.
pub fn configure_identity(dir: &Path) {
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "user.email", "test@example.com"]);
}

pub fn write_file(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

pub fn read_file(dir: &Path, relative: &str) -> String {
    std::fs::read_to_string(dir.join(relative)).unwrap()
}

pub fn commit_and_push(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "--quiet", "-m", message]);
    git(dir, &["push", "--quiet", "origin", "main"]);
}

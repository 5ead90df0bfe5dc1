use std::process::Command;

/// Trimmed stdout of a git command, `None` outside a checkout
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    let version = git(&["describe", "--tags", "--abbrev=0"])
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    let commit = git(&["rev-parse", "--short=10", "HEAD"]).unwrap_or_else(|| "unknown".into());

    for (name, value) in [
        ("GIT_TAG", version),
        ("GIT_HASH", commit),
        ("BUILD_TIME", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
    ] {
        println!("cargo:rustc-env={name}={value}");
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
}

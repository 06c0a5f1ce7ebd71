// Inject the version reported by `perfreport --version`
//
// A clean release tag "v1.2.3" becomes "1.2.3". Anything else is the crate
// version followed by the output of git describe.

use std::process::Command;

fn main() {
    let version = git_version().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=PERFREPORT_VERSION={}", version);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/tags");
}

fn git_version() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let described = String::from_utf8(output.stdout).ok()?;
    let described = described.trim();
    match described.strip_prefix('v') {
        Some(tag) if !tag.contains('-') => Some(tag.to_string()),
        Some(tag) => tag.split('-').next().map(str::to_string),
        None => Some(format!("{}-{}", env!("CARGO_PKG_VERSION"), described)),
    }
}

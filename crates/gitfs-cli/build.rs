//! Build stamp for `gitfs version`.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=GITFS_BUILD_REVISION");

    let date = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    println!("cargo:rustc-env=GITFS_BUILD_DATE={date}");

    let revision = std::env::var("GITFS_BUILD_REVISION").ok().or_else(|| {
        let out = Command::new("git")
            .args(["rev-parse", "--short=12", "HEAD"])
            .output()
            .ok()?;
        if !out.status.success() {
            return None;
        }
        let rev = String::from_utf8(out.stdout).ok()?;
        let rev = rev.trim();
        (!rev.is_empty()).then(|| rev.to_string())
    });
    if let Some(revision) = revision {
        println!("cargo:rustc-env=GITFS_BUILD_REVISION={revision}");
    }
}

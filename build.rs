use std::process::{Command, Output};

fn git(args: &[&str]) -> Option<Output> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
    // Source tarballs have no .git; packagers pass the hash in instead.
    println!("cargo:rerun-if-env-changed=RAWFIT_GIT_HASH");

    let hash = std::env::var("RAWFIT_GIT_HASH")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            git(&["rev-parse", "--short", "HEAD"])
                .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        })
        .unwrap_or_default();

    let on_tag = git(&["describe", "--exact-match", "--tags", "HEAD"]).is_some();

    println!("cargo:rustc-env=GIT_HASH={hash}");
    println!("cargo:rustc-env=ON_RELEASE_TAG={on_tag}");
}

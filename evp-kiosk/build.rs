//! Build script for evp-kiosk
//!
//! Stamps the binary with what `evp_kiosk::build_info()` logs at start-up,
//! so a kiosk's log identifies the exact build it runs:
//! - `GIT_HASH`: short commit, or `EVP_GIT_HASH` for source drops without `.git`
//! - `BUILD_TIMESTAMP`: RFC 3339 with local offset
//! - `BUILD_PROFILE`: cargo profile

use std::env;
use std::process::Command;

const UNKNOWN: &str = "unknown";

fn git_hash() -> String {
    if let Ok(hash) = env::var("EVP_GIT_HASH") {
        let hash = hash.trim();
        if !hash.is_empty() {
            return hash.to_string();
        }
    }

    Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn main() {
    let build_timestamp =
        chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
    let profile = env::var("PROFILE").unwrap_or_else(|_| UNKNOWN.to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash());
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=BUILD_PROFILE={}", profile);

    // No rerun-if-changed: the timestamp must be fresh on every build
}

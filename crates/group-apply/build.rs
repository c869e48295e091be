//! Records what `group-apply --version` reports about the build itself:
//! the target triple, the cargo profile and the UTC build date.

use std::env;

fn main() {
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown-target".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown-profile".to_string());
    let built = chrono::Utc::now().date_naive();

    for (key, value) in [
        ("GROUP_APPLY_TARGET", target),
        ("GROUP_APPLY_PROFILE", profile),
        ("GROUP_APPLY_BUILD_DATE", built.to_string()),
    ] {
        println!("cargo::rustc-env={key}={value}");
    }
}

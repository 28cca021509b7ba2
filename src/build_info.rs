/// Build-time git commit SHA stamped by build.rs when available.
pub fn git_sha() -> Option<&'static str> {
    option_env!("CLAIMGUARD_BUILD_GIT_SHA")
}

/// Crate version plus the commit it was built from, e.g. `0.1.0 (3f2a9c1d0b7e)`.
pub fn describe() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match git_sha() {
        Some(sha) => format!("{version} ({sha})"),
        None => version.to_string(),
    }
}

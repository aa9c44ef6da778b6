//! Build information printed by the `version` subcommand.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Set by release builds (`GIT_COMMIT=... cargo build`).
pub const GIT_COMMIT: Option<&str> = option_env!("GIT_COMMIT");
pub const BUILD_DATE: Option<&str> = option_env!("BUILD_DATE");

pub fn version_info() -> String {
    format!(
        "Version: {}\nGit commit: {}\nBuild date: {}\nPlatform: {}/{}\n",
        VERSION,
        GIT_COMMIT.unwrap_or("unknown"),
        BUILD_DATE.unwrap_or("unknown"),
        std::env::consts::OS,
        std::env::consts::ARCH,
    )
}

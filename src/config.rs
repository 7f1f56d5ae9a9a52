//! Project layout and environment configuration.
//!
//! A Clearphone project root looks like:
//!
//! ```text
//! <root>/
//! ├── apps/
//! │   ├── core.toml
//! │   └── extras/{free,non-free}.toml
//! ├── device-profiles/*.toml
//! └── downloads/            (default APK cache)
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the project root.
pub const ROOT_ENV: &str = "CLEARPHONE_ROOT";

pub const APPS_DIR: &str = "apps";
pub const PROFILES_DIR: &str = "device-profiles";
pub const DOWNLOADS_DIR: &str = "downloads";

/// True when `dir` has the catalog marker file `apps/core.toml`.
pub fn is_project_root(dir: &Path) -> bool {
    dir.join(APPS_DIR).join("core.toml").is_file()
}

/// First of `start` and its ancestors that is a project root.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| is_project_root(dir))
        .map(Path::to_path_buf)
}

/// Resolve the project root.
///
/// Precedence: `explicit` (the `--root` flag), then `env_root` (the value of
/// `CLEARPHONE_ROOT`), then the nearest ancestor of `cwd` holding
/// `apps/core.toml`, then `cwd` itself.
pub fn resolve_project_root(
    explicit: Option<&Path>,
    env_root: Option<OsString>,
    cwd: &Path,
) -> PathBuf {
    if let Some(root) = explicit {
        debug!("Project root from --root: {}", root.display());
        return root.to_path_buf();
    }
    if let Some(root) = env_root.filter(|r| !r.is_empty()) {
        debug!("Project root from {}: {:?}", ROOT_ENV, root);
        return PathBuf::from(root);
    }
    match find_project_root(cwd) {
        Some(root) => {
            debug!("Project root discovered at {}", root.display());
            root
        }
        None => cwd.to_path_buf(),
    }
}

/// Resolve a profile argument.
///
/// Absolute paths and paths that exist relative to the working directory are
/// used as given. Otherwise the path is tried under the root, then under
/// `<root>/device-profiles`, where a bare name such as `samsung-s24` also
/// matches `samsung-s24.toml`.
pub fn resolve_profile_path(root: &Path, profile: &Path) -> PathBuf {
    if profile.is_absolute() || profile.exists() {
        return profile.to_path_buf();
    }

    let under_root = root.join(profile);
    if under_root.exists() {
        return under_root;
    }

    let profiles = root.join(PROFILES_DIR);
    let candidate = profiles.join(profile);
    if candidate.exists() || profile.extension().is_some() {
        return candidate;
    }
    candidate.with_extension("toml")
}

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Platform base for the default home directory.
fn platform_base() -> Result<PathBuf> {
    #[cfg(target_os = "windows")]
    let var = "APPDATA";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";
    std::env::var_os(var)
        .map(PathBuf::from)
        .with_context(|| format!("{var} is not set"))
}

/// Resolve the configured home directory into an absolute path.
///
/// `None` falls back to `<platform base>/<default_subdir>`. A leading `~`
/// expands to the platform base, relative paths are taken from the current
/// directory.
pub fn resolve_home_dir(
    configured: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf> {
    let path = match configured {
        None => platform_base()?.join(default_subdir),
        Some(raw) => expand(&raw)?,
    };
    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()?.join(path)
    };
    if create {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
    }
    Ok(path)
}

fn expand(raw: &str) -> Result<PathBuf> {
    if raw == "~" {
        return platform_base();
    }
    if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
        return Ok(platform_base()?.join(rest));
    }
    if raw.starts_with('~') {
        bail!("home_dir '{raw}': only the current user's home can be referenced");
    }
    Ok(Path::new(raw).to_path_buf())
}

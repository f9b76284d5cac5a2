//! Locating the synthesis engine executable.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Engine binary name without extension.
pub const ENGINE_NAME: &str = "piper";

fn exe_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Resolve the engine executable.
///
/// Order: `explicit`, then `<install_dir>/piper/piper[.exe]` (the layout of
/// the release archive), then a sidecar next to the current executable
/// (with or without a target-triple suffix), then bare `piper` on `PATH`.
pub fn resolve_engine(explicit: Option<&Path>, install_dir: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    let unpacked = install_dir.join(ENGINE_NAME).join(exe_name(ENGINE_NAME));
    if unpacked.is_file() {
        debug!("engine: using unpacked {}", unpacked.display());
        return unpacked;
    }

    if let Some(sidecar) = resolve_sidecar(ENGINE_NAME) {
        debug!("engine: using sidecar {}", sidecar.display());
        return sidecar;
    }

    // PATH fallback
    PathBuf::from(exe_name(ENGINE_NAME))
}

fn resolve_sidecar(name: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let exe_dir = exe.parent()?;

    let triple = target_triple();
    [
        exe_dir.join(format!("{name}-{triple}")),
        exe_dir.join(format!("{name}-{triple}.exe")),
        exe_dir.join(exe_name(name)),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

fn target_triple() -> &'static str {
    if cfg!(all(target_arch = "x86_64", target_os = "linux")) {
        "x86_64-unknown-linux-gnu"
    } else if cfg!(all(target_arch = "aarch64", target_os = "linux")) {
        "aarch64-unknown-linux-gnu"
    } else if cfg!(all(target_arch = "x86_64", target_os = "macos")) {
        "x86_64-apple-darwin"
    } else if cfg!(all(target_arch = "aarch64", target_os = "macos")) {
        "aarch64-apple-darwin"
    } else if cfg!(all(target_arch = "x86_64", target_os = "windows")) {
        "x86_64-pc-windows-msvc"
    } else {
        "unknown"
    }
}

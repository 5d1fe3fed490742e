//! Platform-specific paths shared by the bridge, the host and the messenger

use std::io;
use std::path::{Path, PathBuf};

/// Environment variable overriding the native host binary location
pub const HOST_PATH_ENV: &str = "VAULTLINK_HOST_PATH";

/// Get the platform-specific data directory for storing application data
///
/// Returns:
/// - Windows: %LOCALAPPDATA%\VaultLink
/// - macOS: ~/Library/Application Support/VaultLink
/// - Linux/Other: ~/.local/share/VaultLink
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join("VaultLink")
}

/// File in which the bridge records the loopback port it bound
pub fn get_port_file_path() -> PathBuf {
    get_data_dir().join("bridge.port")
}

/// Record the bridge port, creating the parent directory if needed
pub fn write_port_file(path: &Path, port: u16) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, port.to_string())
}

/// Read a previously recorded bridge port
pub fn read_port_file(path: &Path) -> Option<u16> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Remove the port file; a missing file is not an error
pub fn remove_port_file(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Get the binary name for the current platform
///
/// Returns the name with .exe extension on Windows, without on Unix
pub fn get_binary_name(base: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", base)
    } else {
        base.to_string()
    }
}

/// Locate the native messaging host binary.
///
/// Checks `VAULTLINK_HOST_PATH`, then the directory of the running
/// executable, and finally falls back to the bare name for a PATH lookup.
pub fn resolve_host_binary() -> PathBuf {
    let binary_name = get_binary_name("vaultlink-host");
    let mut candidates = Vec::new();

    if let Ok(explicit_path) = std::env::var(HOST_PATH_ENV) {
        let trimmed = explicit_path.trim();
        if !trimmed.is_empty() {
            candidates.push(PathBuf::from(trimmed));
        }
    }

    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(exe_dir) = current_exe.parent() {
            candidates.push(exe_dir.join(&binary_name));
            candidates.push(exe_dir.join("bin").join(&binary_name));
        }
    }

    candidates
        .into_iter()
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(binary_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_data_dir() {
        let dir = get_data_dir();
        assert!(dir.to_string_lossy().ends_with("VaultLink"));
    }

    #[test]
    fn test_port_file_path() {
        let path = get_port_file_path();
        assert!(path.to_string_lossy().ends_with("bridge.port"));
    }

    #[test]
    fn test_port_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bridge.port");

        assert_eq!(read_port_file(&path), None);
        write_port_file(&path, 17867).unwrap();
        assert_eq!(read_port_file(&path), Some(17867));

        remove_port_file(&path).unwrap();
        assert_eq!(read_port_file(&path), None);
        // Removing twice is fine
        remove_port_file(&path).unwrap();
    }

    #[test]
    fn test_garbage_port_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.port");
        std::fs::write(&path, "not-a-port").unwrap();

        assert_eq!(read_port_file(&path), None);
    }

    #[test]
    fn test_get_binary_name() {
        let host_name = get_binary_name("vaultlink-host");

        if cfg!(target_os = "windows") {
            assert!(host_name.ends_with(".exe"));
        } else {
            assert_eq!(host_name, "vaultlink-host");
        }
    }
}

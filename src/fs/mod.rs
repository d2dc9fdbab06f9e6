use std::ffi::CString;
use std::fs;
use std::fs::{OpenOptions, Permissions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use crate::common::{Result, WebdeskError};

/// Sets the owner of a path. Used on every generated file so the target user can read it.
pub fn chown(path: &str, uid: u32, gid: u32) -> Result<()> {
    let c_path = CString::new(path)
        .map_err(|error| WebdeskError::SystemError(format!("Invalid path {}: {}", path, error)))?;

    if unsafe { libc::chown(c_path.as_ptr(), uid, gid) } != 0 {
        let error = std::io::Error::last_os_error();
        return Err(WebdeskError::SystemError(format!("Could not change owner of {} to {}:{}: {}", path, uid, gid, error)));
    }
    Ok(())
}

pub fn mkdir(path: &str) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|error| WebdeskError::SystemError(format!("Could not create directory {}: {}", path, error)))
}

/// Sets the permission bits of a path, eg `0o700`.
pub fn chmod(path: &str, mode: u32) -> Result<()> {
    fs::set_permissions(path, Permissions::from_mode(mode))
        .map_err(|error| WebdeskError::SystemError(format!("Could not set mode {:o} on {}: {}", mode, path, error)))
}

/// Writes (or overwrites) a file with the given content, permissions and ownership.
///
/// The permissions are applied at creation and again after writing, so that an existing file
/// with wider permissions is tightened.
///
/// # Arguments
/// * `path` - The path to the file.
/// * `content` - The content of the file.
/// * `mode` - The permissions of the file.
/// * `uid` - The user ID to set as the owner.
/// * `gid` - The group ID to set as the owner.
pub fn write_file(path: &str, content: &[u8], mode: u32, uid: u32, gid: u32) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(|error| WebdeskError::ArtifactError(format!("Could not open file {}: {}", path, error)))?;

    file.write_all(content)
        .map_err(|error| WebdeskError::ArtifactError(format!("Could not write file {}: {}", path, error)))?;

    chmod(path, mode)?;
    chown(path, uid, gid)?;
    Ok(())
}

/// Creates a directory owned by the given user.
pub fn create_owned_directory(path: &str, mode: u32, uid: u32, gid: u32) -> Result<()> {
    mkdir(path)?;
    // An existing directory may belong to someone else
    chown(path, uid, gid)?;
    chmod(path, mode)?;
    Ok(())
}

/// Removes a directory and its content. A missing directory is not an error.
///
/// # Returns
/// `true` if something was removed.
pub fn remove_dir(path: &Path) -> Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(WebdeskError::SystemError(format!("Could not remove directory {}: {}", path.display(), error))),
    }
}

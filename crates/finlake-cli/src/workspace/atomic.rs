use std::fs::{File, create_dir_all};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::{WorkspaceError, WorkspaceResult};

/// Replace `path` with `data` through a uniquely named sibling file.
pub fn write_bytes_atomic(path: &Path, data: &[u8]) -> WorkspaceResult<()> {
    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty());
    if let Some(parent) = parent {
        create_dir_all(parent)?;
    }

    let staging = staging_path(path)?;
    let written = File::create(&staging)
        .and_then(|mut file| file.write_all(data).and_then(|_| file.sync_all()))
        .and_then(|_| std::fs::rename(&staging, path));
    if let Err(err) = written {
        let _ = std::fs::remove_file(&staging);
        return Err(err.into());
    }

    match parent {
        Some(parent) => sync_dir(parent).map_err(WorkspaceError::from),
        None => Ok(()),
    }
}

fn staging_path(path: &Path) -> WorkspaceResult<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| WorkspaceError::Invalid(format!("cannot write to {}", path.display())))?;
    Ok(path.with_file_name(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    )))
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_without_leaving_staging_files() {
        let dir = std::env::temp_dir().join(format!("finlake_atomic_{}", Uuid::new_v4()));
        let path = dir.join("jobs.json");
        write_bytes_atomic(&path, b"first").expect("first write");
        write_bytes_atomic(&path, b"second").expect("second write");

        assert_eq!(std::fs::read(&path).expect("read"), b"second");
        let entries = std::fs::read_dir(&dir).expect("read dir").count();
        assert_eq!(entries, 1);
    }
}

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Handle on the durable store artifacts are published to
pub trait DurableStorage: Send + Sync {
    /// Place a finished local file at `durable`, replacing any previous
    /// object. Readers of `durable` must never see a partial file.
    fn move_local_file_to(&self, local: &Path, durable: &Path) -> io::Result<()>;

    /// Remove a local path and everything under it. Missing paths are fine.
    fn recursive_delete(&self, local: &Path) -> io::Result<()>;
}

/// Durable storage on a (possibly network-mounted) filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFsStorage;

impl LocalFsStorage {
    pub fn new() -> Self {
        Self
    }
}

impl DurableStorage for LocalFsStorage {
    fn move_local_file_to(&self, local: &Path, durable: &Path) -> io::Result<()> {
        if let Some(parent) = durable.parent() {
            fs::create_dir_all(parent)?;
        }

        if fs::rename(local, durable).is_ok() {
            return Ok(());
        }

        // Rename fails across filesystems: copy next to the target, then
        // rename within the target's directory.
        let partial = partial_path(durable);
        let result = copy_synced(local, &partial).and_then(|()| fs::rename(&partial, durable));
        if result.is_err() {
            let _ = fs::remove_file(&partial);
        }
        result?;

        fs::remove_file(local)
    }

    fn recursive_delete(&self, local: &Path) -> io::Result<()> {
        let result = if local.is_dir() {
            fs::remove_dir_all(local)
        } else {
            fs::remove_file(local)
        };

        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Hidden sibling used while copying into place
fn partial_path(durable: &Path) -> PathBuf {
    let name = durable
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    durable.with_file_name(format!(".{}.partial", name))
}

fn copy_synced(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to)?;
    File::open(to)?.sync_all()
}

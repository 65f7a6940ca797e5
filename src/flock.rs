use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Advisory lock on the data directory so only one process opens the store.
/// The lock file records the owning PID for debugging and is released (and
/// removed) on drop.
#[derive(Debug)]
pub struct DirLock {
    _file: File,
    path: PathBuf,
}

impl DirLock {
    pub fn acquire<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        lock_exclusive(&file)?;

        // stamp the owning PID so a stale lock can be traced to a process
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self { _file: file, path })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> io::Result<()> {
    match unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } {
        0 => Ok(()),
        _ => Err(io::Error::last_os_error()),
    }
}

// Without flock(2) the lock degrades to the PID marker file alone.
#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_is_exclusive_and_released() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("LOCK");

        let lock = DirLock::acquire(&path).unwrap();
        #[cfg(unix)]
        assert!(DirLock::acquire(&path).is_err());

        drop(lock);
        assert!(!path.exists());
        let relock = DirLock::acquire(&path).unwrap();
        drop(relock);
    }
}

//! Injectable filesystem abstraction (§6.2 Injected interfaces).
//!
//! The Ring Store never touches `std::fs` directly. It goes through a
//! [`Filesystem`] + [`FileHandle`] pair so that tests can substitute an
//! in-memory double instead of real files (§13), keeping storage code behind
//! traits rather than owning concrete I/O types outright.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A single fixed-length, positioned-I/O file handle.
///
/// Mirrors §6.2: `size`, `resize`, `read`, `write`, `flush`, `close`.
pub trait FileHandle: Send {
    fn size(&mut self) -> io::Result<u64>;
    fn resize(&mut self, new_len: u64) -> io::Result<()>;
    fn read_at(&mut self, abs_offset: u64, buf: &mut [u8]) -> io::Result<()>;
    fn write_at(&mut self, abs_offset: u64, buf: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

/// Filesystem-level operations needed to open a Ring Store (§6.2).
pub trait Filesystem {
    fn exists(&self, path: &Path) -> bool;
    fn create_directories(&self, path: &Path) -> io::Result<()>;
    fn create_empty_file(&self, path: &Path) -> io::Result<()>;
    fn open_read_write(&self, path: &Path) -> io::Result<Box<dyn FileHandle>>;
}

/// The process's native filesystem, backed by `std::fs::File`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFilesystem;

impl Filesystem for NativeFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_directories(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn create_empty_file(&self, path: &Path) -> io::Result<()> {
        fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        Ok(())
    }

    fn open_read_write(&self, path: &Path) -> io::Result<Box<dyn FileHandle>> {
        let file = fs::OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Box::new(NativeFileHandle { file }))
    }
}

struct NativeFileHandle {
    file: fs::File,
}

impl FileHandle for NativeFileHandle {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn resize(&mut self, new_len: u64) -> io::Result<()> {
        self.file.set_len(new_len)
    }

    fn read_at(&mut self, abs_offset: u64, buf: &mut [u8]) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_exact_at(buf, abs_offset)
        }
        #[cfg(not(unix))]
        {
            use std::io::{Read, Seek, SeekFrom};
            self.file.seek(SeekFrom::Start(abs_offset))?;
            self.file.read_exact(buf)
        }
    }

    fn write_at(&mut self, abs_offset: u64, buf: &[u8]) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.write_all_at(buf, abs_offset)
        }
        #[cfg(not(unix))]
        {
            use std::io::{Seek, SeekFrom, Write};
            self.file.seek(SeekFrom::Start(abs_offset))?;
            self.file.write_all(buf)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// An in-memory filesystem double for fast, deterministic tests (§6.2:
/// "tests inject an in-memory filesystem").
#[derive(Debug, Default, Clone)]
pub struct InMemoryFilesystem {
    files: Arc<Mutex<std::collections::HashMap<PathBuf, Arc<Mutex<Vec<u8>>>>>>,
    dirs: Arc<Mutex<std::collections::HashSet<PathBuf>>>,
}

impl InMemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filesystem for InMemoryFilesystem {
    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).contains_key(path)
    }

    fn create_directories(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            self.dirs
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(parent.to_path_buf());
        }
        Ok(())
    }

    fn create_empty_file(&self, path: &Path) -> io::Result<()> {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())));
        Ok(())
    }

    fn open_read_write(&self, path: &Path) -> io::Result<Box<dyn FileHandle>> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let data = files.get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "file not created")
        })?;
        Ok(Box::new(InMemoryFileHandle { data }))
    }
}

struct InMemoryFileHandle {
    data: Arc<Mutex<Vec<u8>>>,
}

impl FileHandle for InMemoryFileHandle {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.data.lock().unwrap_or_else(|e| e.into_inner()).len() as u64)
    }

    fn resize(&mut self, new_len: u64) -> io::Result<()> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .resize(new_len as usize, 0);
        Ok(())
    }

    fn read_at(&mut self, abs_offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let start = abs_offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of file"));
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, abs_offset: u64, buf: &[u8]) -> io::Result<()> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let start = abs_offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "write past end of file",
            ));
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

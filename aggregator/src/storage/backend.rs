use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

/// Where the `UpdateStore` keeps its named artifacts.
pub trait Backend: Send + Sync {
    /// Writes `data` under `name`, replacing any previous artifact.
    fn write(&self, name: &str, data: &[u8]) -> io::Result<()>;

    /// Appends `data` at the end of the artifact `name`, creating it if needed.
    fn append(&self, name: &str, data: &[u8]) -> io::Result<()>;

    /// Reads back the artifact `name`, `None` if it was never written.
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>>;

    /// Removes every artifact.
    fn clear(&self) -> io::Result<()>;
}

/// Keeps one file per artifact inside a directory.
#[derive(Debug, Clone)]
pub struct FsBackend {
    dir: PathBuf,
}

impl FsBackend {
    /// Opens `dir` as a backend, creating it if missing.
    ///
    /// # Arguments
    /// * `dir` - The directory holding the artifacts of a single run.
    pub fn open<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

impl Backend for FsBackend {
    fn write(&self, name: &str, data: &[u8]) -> io::Result<()> {
        fs::write(self.dir.join(name), data)
    }

    fn append(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(name))?;
        file.write_all(data)
    }

    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.dir.join(name)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn clear(&self) -> io::Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(path)?;
            }
        }

        Ok(())
    }
}

/// Keeps every artifact in memory, for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The names of the artifacts written so far, sorted.
    pub fn names(&self) -> Vec<String> {
        self.files.lock().keys().cloned().collect()
    }
}

impl Backend for MemoryBackend {
    fn write(&self, name: &str, data: &[u8]) -> io::Result<()> {
        self.files.lock().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn append(&self, name: &str, data: &[u8]) -> io::Result<()> {
        self.files
            .lock()
            .entry(name.to_string())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.files.lock().get(name).cloned())
    }

    fn clear(&self) -> io::Result<()> {
        self.files.lock().clear();
        Ok(())
    }
}

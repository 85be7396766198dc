use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

/// The key of the token identifying the group a client joins.
pub const GROUP_TOKEN: &str = "group_token";
/// The key of the token handed out by the registry on registration.
pub const CLIENT_TOKEN: &str = "client_token";

/// Keeps the tokens of a client across restarts.
pub trait CredentialStore: Send + Sync {
    /// Reads the value stored under `key`, `None` if there is none.
    fn load(&self, key: &str) -> io::Result<Option<String>>;

    /// Stores `value` under `key`, replacing the previous one.
    fn store(&self, key: &str, value: &str) -> io::Result<()>;
}

impl<C: CredentialStore + ?Sized> CredentialStore for Arc<C> {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        (**self).load(key)
    }

    fn store(&self, key: &str, value: &str) -> io::Result<()> {
        (**self).store(key, value)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentials {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding the given group token.
    pub fn with_group(group_token: &str) -> Self {
        let store = Self::default();
        store
            .entries
            .lock()
            .insert(GROUP_TOKEN.to_string(), group_token.to_string());
        store
    }
}

impl CredentialStore for MemoryCredentials {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct DirCredentials {
    dir: PathBuf,
}

impl DirCredentials {
    pub fn open<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

impl CredentialStore for DirCredentials {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.dir.join(key)) {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn store(&self, key: &str, value: &str) -> io::Result<()> {
        fs::write(self.dir.join(key), value)
    }
}

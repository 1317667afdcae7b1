use async_trait::async_trait;
use fd_lock::RwLock as FileLock;
use nimbus_core::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use super::{persistence, Change, Collection, KvStore};

type Entries = BTreeMap<String, Value>;

/// One pretty-printed JSON object per collection under a data directory.
///
/// Writers hold an exclusive advisory lock on `<collection>.lock` for the
/// whole read-change-write, so several processes may share the directory.
/// Each write goes to a fresh temporary file that is renamed over the
/// collection file; readers never see a partial file and take no lock.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(persistence("create data directory"))?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn path_for(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.as_str()))
    }

    fn lock_path_for(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.lock", collection.as_str()))
    }

    async fn read(&self, collection: Collection) -> Result<Entries> {
        match tokio::fs::read(self.path_for(collection)).await {
            Ok(bytes) => decode_entries(&bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Entries::new()),
            Err(err) => Err(persistence("read collection file")(err)),
        }
    }

    /// Runs `apply` against the current file contents under the collection
    /// lock. The file is rewritten only when `apply` reports a change.
    async fn modify<T, F>(&self, collection: Collection, apply: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Entries) -> Result<(T, bool)> + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let dir = self.dir.clone();
        let path = self.path_for(collection);
        let lock_path = self.lock_path_for(collection);

        tokio::task::spawn_blocking(move || {
            let lock_file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)
                .map_err(persistence("open lock file"))?;
            let mut lock = FileLock::new(lock_file);
            let _held = lock.write().map_err(persistence("lock collection file"))?;

            let mut entries = read_entries_blocking(&path)?;
            let (out, changed) = apply(&mut entries)?;
            if changed {
                write_entries_blocking(&dir, &path, &entries)?;
            }
            Ok(out)
        })
        .await
        .map_err(persistence("join file store task"))?
    }
}

fn decode_entries(bytes: &[u8]) -> Result<Entries> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Entries::new());
    }
    serde_json::from_slice(bytes).map_err(persistence("decode collection file"))
}

fn read_entries_blocking(path: &Path) -> Result<Entries> {
    match std::fs::read(path) {
        Ok(bytes) => decode_entries(&bytes),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Entries::new()),
        Err(err) => Err(persistence("read collection file")(err)),
    }
}

fn write_entries_blocking(dir: &Path, path: &Path, entries: &Entries) -> Result<()> {
    let body = serde_json::to_vec_pretty(entries).map_err(persistence("encode collection"))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(persistence("create temporary file"))?;
    tmp.write_all(&body)
        .map_err(persistence("write collection file"))?;
    tmp.as_file()
        .sync_all()
        .map_err(persistence("flush collection file"))?;
    tmp.persist(path)
        .map_err(persistence("replace collection file"))?;
    Ok(())
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        Ok(self.read(collection).await?.remove(key))
    }

    async fn put(&self, collection: Collection, key: &str, value: Value) -> Result<()> {
        let key = key.to_string();
        self.modify(collection, move |entries| {
            entries.insert(key, value);
            Ok(((), true))
        })
        .await
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.modify(collection, move |entries| {
            let removed = entries.remove(&key).is_some();
            Ok((removed, removed))
        })
        .await
    }

    async fn scan(&self, collection: Collection) -> Result<Vec<(String, Value)>> {
        Ok(self.read(collection).await?.into_iter().collect())
    }

    async fn update(&self, collection: Collection, key: &str, change: Change) -> Result<Option<Value>> {
        let key = key.to_string();
        self.modify(collection, move |entries| {
            let Some(slot) = entries.get_mut(&key) else {
                return Ok((None, false));
            };
            let next = change(slot.clone())?;
            *slot = next.clone();
            Ok((Some(next), true))
        })
        .await
    }

    async fn delete_many(&self, collection: Collection, keys: &[String]) -> Result<usize> {
        let keys = keys.to_vec();
        self.modify(collection, move |entries| {
            let removed = keys
                .iter()
                .filter(|key| entries.remove(key.as_str()).is_some())
                .count();
            Ok((removed, removed > 0))
        })
        .await
    }
}

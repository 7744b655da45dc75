//! Certificate cache.
//!
//! `CertificateStore` maps an identity to the path of its certificate file.
//! Entries are added on first resolution and never evicted. The index file
//! holds one `<identity> <path>` record per line, in insertion order, with no
//! trailing newline; it is read by `populate()` and rewritten atomically by
//! `persist()`.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::directory::CertificateDirectory;
use crate::error::{MailError, Result};
use crate::identity::Identity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub identity: Identity,
    pub certificate_path: PathBuf,
}

#[derive(Debug, Default)]
struct Index {
    records: Vec<CertificateRecord>,
    positions: HashMap<Identity, usize>,
}

impl Index {
    fn get(&self, identity: &Identity) -> Option<&CertificateRecord> {
        self.positions.get(identity).map(|&at| &self.records[at])
    }

    /// Insert unless present; returns the record that ends up in the index.
    fn insert_if_absent(&mut self, record: CertificateRecord) -> &CertificateRecord {
        let at = match self.positions.get(&record.identity) {
            Some(&at) => at,
            None => {
                let at = self.records.len();
                self.positions.insert(record.identity.clone(), at);
                self.records.push(record);
                at
            }
        };
        &self.records[at]
    }

    fn parse(text: &str) -> Result<Self> {
        let mut index = Index::default();
        let text = text.strip_suffix('\n').unwrap_or(text);
        if text.is_empty() {
            return Ok(index);
        }
        for (n, line) in text.split('\n').enumerate() {
            let line_no = n + 1;
            let malformed = |reason: String| MailError::MalformedIndex {
                line: line_no,
                reason,
            };

            let tokens: Vec<&str> = line.split(' ').collect();
            let [identity, path] = tokens.as_slice() else {
                return Err(malformed(format!(
                    "expected \"<identity> <path>\", found {} field(s)",
                    tokens.len()
                )));
            };
            if !indexable(Path::new(path)) {
                return Err(malformed(format!("invalid certificate path {path:?}")));
            }
            let identity = Identity::new(*identity).map_err(|e| malformed(e.to_string()))?;
            if index.positions.contains_key(&identity) {
                return Err(malformed(format!("duplicate identity {identity}")));
            }
            index.insert_if_absent(CertificateRecord {
                identity,
                certificate_path: PathBuf::from(*path),
            });
        }
        Ok(index)
    }

    fn render(&self) -> String {
        self.records
            .iter()
            .map(|r| format!("{} {}", r.identity, r.certificate_path.display()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Point-in-time copy of the cache, in insertion order. Iterate it as often as
/// needed; later resolutions do not show up in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    records: Vec<CertificateRecord>,
}

impl Listing {
    pub fn iter(&self) -> std::slice::Iter<'_, CertificateRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a Listing {
    type Item = &'a CertificateRecord;
    type IntoIter = std::slice::Iter<'a, CertificateRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for Listing {
    type Item = CertificateRecord;
    type IntoIter = std::vec::IntoIter<CertificateRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

pub struct CertificateStore {
    index_path: PathBuf,
    directory: Arc<dyn CertificateDirectory>,
    inner: RwLock<Index>,
}

impl CertificateStore {
    /// Empty store; call `populate()` to load the index.
    pub fn new(index_path: impl Into<PathBuf>, directory: Arc<dyn CertificateDirectory>) -> Self {
        Self {
            index_path: index_path.into(),
            directory,
            inner: RwLock::new(Index::default()),
        }
    }

    pub fn open(
        index_path: impl Into<PathBuf>,
        directory: Arc<dyn CertificateDirectory>,
    ) -> Result<Self> {
        let store = Self::new(index_path, directory);
        store.populate()?;
        Ok(store)
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Replace the in-memory cache with the index file's records. A missing
    /// file loads nothing. Any bad line fails the load and keeps the current
    /// cache as it was.
    pub fn populate(&self) -> Result<usize> {
        let text = match fs::read_to_string(&self.index_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.index_path.display(), "no certificate index yet");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };
        let loaded = Index::parse(&text)?;
        let count = loaded.records.len();
        *self.inner.write() = loaded;
        info!(path = %self.index_path.display(), count, "certificate index loaded");
        Ok(count)
    }

    /// Path of `identity`'s certificate, asking the directory on a miss.
    ///
    /// The directory is queried without holding the lock, so two threads may
    /// both fetch; the first insert wins and both get its path.
    pub fn resolve(&self, identity: &Identity) -> Result<PathBuf> {
        if let Some(record) = self.inner.read().get(identity) {
            return Ok(record.certificate_path.clone());
        }

        let fetched = self.directory.fetch_certificate(identity)?;
        if !indexable(&fetched) {
            return Err(MailError::CertificateNotFound {
                identity: identity.clone(),
                reason: format!("path {:?} cannot be recorded in the index", fetched),
            });
        }

        let mut index = self.inner.write();
        let record = index.insert_if_absent(CertificateRecord {
            identity: identity.clone(),
            certificate_path: fetched,
        });
        debug!(%identity, path = %record.certificate_path.display(), "certificate cached");
        Ok(record.certificate_path.clone())
    }

    pub fn get(&self, identity: &Identity) -> Option<PathBuf> {
        self.inner
            .read()
            .get(identity)
            .map(|r| r.certificate_path.clone())
    }

    pub fn list(&self) -> Listing {
        Listing {
            records: self.inner.read().records.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the index next to its final location, fsync, then rename over it.
    pub fn persist(&self) -> Result<()> {
        let (rendered, count) = {
            let index = self.inner.read();
            (index.render(), index.records.len())
        };

        let parent = match self.index_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut staging = NamedTempFile::new_in(&parent)?;
        staging.write_all(rendered.as_bytes())?;
        staging.as_file().sync_all()?;
        staging.persist(&self.index_path).map_err(|e| e.error)?;

        info!(path = %self.index_path.display(), count, "certificate index persisted");
        Ok(())
    }
}

/// Index records are space separated, so paths may not contain whitespace.
fn indexable(path: &Path) -> bool {
    let rendered = path.to_string_lossy();
    !rendered.is_empty() && !rendered.contains(char::is_whitespace)
}

impl std::fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateStore")
            .field("index_path", &self.index_path)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Hands out `<root>/<identity>.crt` and counts calls.
    struct CountingDirectory {
        root: PathBuf,
        calls: AtomicUsize,
    }

    impl CountingDirectory {
        fn new(root: &Path) -> Arc<Self> {
            Arc::new(Self {
                root: root.to_path_buf(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl CertificateDirectory for CountingDirectory {
        fn fetch_certificate(&self, identity: &Identity) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.root.join(format!("{identity}.crt")))
        }
    }

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    #[test]
    fn resolve_caches_after_first_fetch() {
        let dir = tempdir().unwrap();
        let directory = CountingDirectory::new(dir.path());
        let store = CertificateStore::new(dir.path().join("index.db"), directory.clone());

        let first = store.resolve(&id("bob")).unwrap();
        let second = store.resolve(&id("bob")).unwrap();
        assert_eq!(first, second);
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn listing_is_a_restartable_snapshot() {
        let dir = tempdir().unwrap();
        let store = CertificateStore::new(
            dir.path().join("index.db"),
            CountingDirectory::new(dir.path()),
        );
        store.resolve(&id("bob")).unwrap();
        store.resolve(&id("alice")).unwrap();

        let listing = store.list();
        store.resolve(&id("carol")).unwrap();

        let names: Vec<_> = listing.iter().map(|r| r.identity.to_string()).collect();
        assert_eq!(names, ["bob", "alice"]);
        assert_eq!((&listing).into_iter().count(), 2);
        assert_eq!(store.list().len(), 3);
    }

    #[test]
    fn index_format_has_no_trailing_newline() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("index.db");
        let store = CertificateStore::new(&index, CountingDirectory::new(Path::new("/certs")));
        store.resolve(&id("bob")).unwrap();
        store.resolve(&id("alice")).unwrap();
        store.persist().unwrap();

        let text = fs::read_to_string(&index).unwrap();
        assert_eq!(text, "bob /certs/bob.crt\nalice /certs/alice.crt");
    }

    #[test]
    fn empty_store_persists_an_empty_file() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("nested").join("index.db");
        let store = CertificateStore::new(&index, CountingDirectory::new(dir.path()));
        store.persist().unwrap();
        assert_eq!(fs::read_to_string(&index).unwrap(), "");
        assert_eq!(store.populate().unwrap(), 0);
    }

    #[test]
    fn malformed_lines_fail_the_whole_load() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("index.db");
        let store = CertificateStore::new(&index, CountingDirectory::new(dir.path()));
        store.resolve(&id("zed")).unwrap();

        for (text, bad_line) in [
            ("bob /c/bob.crt\nalice", 2),
            ("bob /c/bob.crt\nalice /c/a b.crt", 2),
            ("bob /c/bob.crt\nbob /c/other.crt", 2),
            ("b@b /c/bob.crt", 1),
            ("bob /c/bob.crt\n\nalice /c/alice.crt", 2),
            ("bob /c/bob.crt\r", 1),
            ("bob /c/bob.crt\r\nalice /c/alice.crt", 1),
            ("bob /c/a\tb.crt", 1),
            ("bob ", 1),
        ] {
            fs::write(&index, text).unwrap();
            match store.populate() {
                Err(MailError::MalformedIndex { line, .. }) => assert_eq!(line, bad_line, "{text:?}"),
                other => panic!("expected MalformedIndex for {text:?}, got {other:?}"),
            }
            let names: Vec<_> = store.list().into_iter().map(|r| r.identity).collect();
            assert_eq!(names, [id("zed")]);
        }
    }

    #[test]
    fn whitespace_in_fetched_path_is_refused() {
        let dir = tempdir().unwrap();
        let store = CertificateStore::new(
            dir.path().join("index.db"),
            CountingDirectory::new(Path::new("/my certs")),
        );
        assert!(matches!(
            store.resolve(&id("bob")),
            Err(MailError::CertificateNotFound { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_resolve_yields_one_record() {
        let dir = tempdir().unwrap();
        let store = Arc::new(CertificateStore::new(
            dir.path().join("index.db"),
            CountingDirectory::new(dir.path()),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.resolve(&id("bob")).unwrap())
            })
            .collect();
        let paths: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(paths.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.len(), 1);
    }
}

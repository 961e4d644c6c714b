//! # Key Artifact Store
//!
//! Write-once storage of key artifacts, one file per identifier, named by
//! [`KeyId::file_name`].
//!
//! ## Claim Invariant
//!
//! The only way to create an artifact is [`KeyStore::claim`], which opens the
//! name with exclusive-create semantics (`O_CREAT | O_EXCL`). Among any number
//! of racing claims for one name the filesystem admits exactly one; the rest
//! fail with [`StoreError::AlreadyClaimed`] and never write. There is no
//! "check, then create" anywhere in this module.
//!
//! A [`Claim`] ends in one of two ways:
//!
//! - [`Claim::persist`] writes the whole body and finalizes the file. The
//!   artifact is then permanent; nothing here reopens it for writing.
//! - Anything else (short write, write error, the claim being dropped) closes
//!   the handle and removes the file so the identifier can be registered
//!   again. Removal is best effort: a failed remove is logged and the
//!   original error stands.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::StoreError;
use crate::identity::KeyId;

/// Upper bound on the full artifact path, matching Linux `PATH_MAX`.
pub const MAX_ARTIFACT_PATH: usize = 4096;

/// Permission bits for new artifacts (owner only).
#[cfg(unix)]
const ARTIFACT_MODE: u32 = 0o700;

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// An open, freshly claimed artifact.
pub trait KeyHandle: Write + Send {
    /// Flush to stable storage and close the handle.
    fn finalize(self: Box<Self>) -> io::Result<()>;
}

impl KeyHandle for File {
    fn finalize(self: Box<Self>) -> io::Result<()> {
        self.sync_all()
    }
}

/// Storage that can create names exclusively and remove them.
pub trait KeyBackend: Send + Sync + fmt::Debug {
    /// Directory the artifact names are resolved against.
    fn root(&self) -> &Path;

    /// Create `name`, failing with [`io::ErrorKind::AlreadyExists`] if it
    /// exists. Must be atomic with respect to concurrent callers.
    fn create_new(&self, name: &str) -> io::Result<Box<dyn KeyHandle>>;

    /// Remove `name`.
    fn remove(&self, name: &str) -> io::Result<()>;
}

/// Artifacts as plain files in one directory.
#[derive(Debug, Clone)]
pub struct DirBackend {
    root: PathBuf,
}

impl DirBackend {
    /// Store artifacts directly under `root`. The directory must exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl KeyBackend for DirBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn create_new(&self, name: &str) -> io::Result<Box<dyn KeyHandle>> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(ARTIFACT_MODE);
        }
        let file = options.open(self.root.join(name))?;
        Ok(Box::new(file))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.root.join(name))
    }
}

// ---------------------------------------------------------------------------
// KeyStore
// ---------------------------------------------------------------------------

/// Hands out exclusive [`Claim`]s on artifact names.
///
/// Cheap to clone; clones share the backend.
#[derive(Debug, Clone)]
pub struct KeyStore {
    backend: Arc<dyn KeyBackend>,
}

impl KeyStore {
    /// Wrap an arbitrary backend.
    pub fn new(backend: impl KeyBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Store artifacts as files under `root`.
    pub fn open_dir(root: impl Into<PathBuf>) -> Self {
        Self::new(DirBackend::new(root))
    }

    /// Directory artifacts live in.
    pub fn root(&self) -> &Path {
        self.backend.root()
    }

    /// Where the artifact for `id` lives (or would live).
    pub fn artifact_path(&self, id: KeyId) -> PathBuf {
        self.root().join(id.file_name())
    }

    /// Exclusively create the artifact for `id`.
    ///
    /// The path bound is checked before the backend is touched.
    pub fn claim(&self, id: KeyId) -> Result<Claim, StoreError> {
        let name = id.file_name();

        let len = self.root().join(&name).as_os_str().len();
        if len > MAX_ARTIFACT_PATH {
            return Err(StoreError::PathTooLong {
                name,
                len,
                max: MAX_ARTIFACT_PATH,
            });
        }

        match self.backend.create_new(&name) {
            Ok(handle) => Ok(Claim {
                handle,
                guard: ClaimGuard {
                    name,
                    backend: Arc::clone(&self.backend),
                    armed: true,
                },
            }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyClaimed { name })
            }
            Err(source) => Err(StoreError::Create { name, source }),
        }
    }
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

/// Exclusive ownership of a just-created artifact name.
///
/// Field order matters: on drop the handle closes before the guard removes
/// the file.
pub struct Claim {
    handle: Box<dyn KeyHandle>,
    guard: ClaimGuard,
}

impl fmt::Debug for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claim")
            .field("name", &self.guard.name)
            .field("armed", &self.guard.armed)
            .finish()
    }
}

impl Claim {
    /// Artifact name this claim holds.
    pub fn name(&self) -> &str {
        &self.guard.name
    }

    /// Write all of `body` and finalize the artifact.
    ///
    /// On an incomplete or failed write the handle is closed, the artifact
    /// removed, and the write error returned. A finalize failure after a
    /// complete write is only logged: the bytes are already in place.
    pub fn persist(self, body: &[u8]) -> Result<(), StoreError> {
        let Claim { mut handle, guard } = self;

        match write_body(handle.as_mut(), body) {
            Ok(()) => {
                let name = guard.disarm();
                if let Err(error) = handle.finalize() {
                    tracing::warn!(key = %name, %error, "failed to close key artifact");
                }
                Ok(())
            }
            Err(failure) => {
                drop(handle);
                let name = guard.release();
                Err(failure.into_store_error(name))
            }
        }
    }
}

/// Removes the claimed name unless disarmed.
struct ClaimGuard {
    name: String,
    backend: Arc<dyn KeyBackend>,
    armed: bool,
}

impl ClaimGuard {
    fn disarm(mut self) -> String {
        self.armed = false;
        std::mem::take(&mut self.name)
    }

    fn release(mut self) -> String {
        self.armed = false;
        self.remove();
        std::mem::take(&mut self.name)
    }

    fn remove(&self) {
        match self.backend.remove(&self.name) {
            Ok(()) => tracing::debug!(key = %self.name, "released claim"),
            Err(error) => tracing::error!(
                key = %self.name,
                %error,
                "failed to remove partial key artifact; manual cleanup required"
            ),
        }
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(key = %self.name, "claim abandoned before body was persisted");
            self.remove();
        }
    }
}

// ---------------------------------------------------------------------------
// Body writes
// ---------------------------------------------------------------------------

enum WriteFailure {
    Io(io::Error),
    Short { written: usize, expected: usize },
}

impl WriteFailure {
    fn into_store_error(self, name: String) -> StoreError {
        match self {
            Self::Io(source) => StoreError::Write { name, source },
            Self::Short { written, expected } => StoreError::ShortWrite {
                name,
                written,
                expected,
            },
        }
    }
}

/// Write `body` in full, counting bytes accepted by the handle.
///
/// A handle that stops making progress ends the loop; the count then decides
/// whether the write was complete.
fn write_body(handle: &mut dyn KeyHandle, body: &[u8]) -> Result<(), WriteFailure> {
    let mut written = 0;
    while written < body.len() {
        match handle.write(&body[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(WriteFailure::Io(e)),
        }
    }

    if written != body.len() {
        return Err(WriteFailure::Short {
            written,
            expected: body.len(),
        });
    }

    handle.flush().map_err(WriteFailure::Io)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Barrier, Mutex};

    /// How a [`FaultyBackend`] handle misbehaves.
    #[derive(Debug, Clone, Copy)]
    enum Fault {
        /// Accept this many bytes, then report no progress.
        StallAfter(usize),
        /// Accept this many bytes, then fail.
        FailAfter(usize),
        /// Write fine, fail on finalize.
        FinalizeFails,
    }

    #[derive(Debug)]
    struct FaultyBackend {
        inner: DirBackend,
        fault: Fault,
        remove_fails: bool,
    }

    struct FaultyHandle {
        file: File,
        fault: Fault,
        written: usize,
    }

    impl Write for FaultyHandle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let limit = match self.fault {
                Fault::StallAfter(n) | Fault::FailAfter(n) => n,
                Fault::FinalizeFails => usize::MAX,
            };
            let room = limit.saturating_sub(self.written);
            if room == 0 {
                return match self.fault {
                    Fault::FailAfter(_) => Err(io::Error::new(io::ErrorKind::Other, "disk full")),
                    _ => Ok(0),
                };
            }
            // One byte at a time so partial progress is actually on disk.
            let n = self.file.write(&buf[..buf.len().min(room).min(1)])?;
            self.written += n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl KeyHandle for FaultyHandle {
        fn finalize(self: Box<Self>) -> io::Result<()> {
            match self.fault {
                Fault::FinalizeFails => Err(io::Error::new(io::ErrorKind::Other, "EIO on close")),
                _ => self.file.sync_all(),
            }
        }
    }

    impl KeyBackend for FaultyBackend {
        fn root(&self) -> &Path {
            self.inner.root()
        }

        fn create_new(&self, name: &str) -> io::Result<Box<dyn KeyHandle>> {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.root().join(name))?;
            Ok(Box::new(FaultyHandle {
                file,
                fault: self.fault,
                written: 0,
            }))
        }

        fn remove(&self, name: &str) -> io::Result<()> {
            if self.remove_fails {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "EPERM"));
            }
            self.inner.remove(name)
        }
    }

    fn faulty_store(root: &Path, fault: Fault, remove_fails: bool) -> KeyStore {
        KeyStore::new(FaultyBackend {
            inner: DirBackend::new(root),
            fault,
            remove_fails,
        })
    }

    #[test]
    fn claim_then_persist_writes_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open_dir(dir.path());
        let id = KeyId::new(0x1);

        let claim = store.claim(id).unwrap();
        assert_eq!(claim.name(), "0x1.key");
        claim.persist(b"secret-a").unwrap();

        assert_eq!(fs::read(store.artifact_path(id)).unwrap(), b"secret-a");
    }

    #[test]
    fn empty_body_is_a_valid_registration() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open_dir(dir.path());
        let id = KeyId::new(0x2);

        store.claim(id).unwrap().persist(b"").unwrap();

        assert_eq!(fs::read(store.artifact_path(id)).unwrap(), b"");
        assert!(store.claim(id).unwrap_err().is_conflict());
    }

    #[test]
    fn second_claim_conflicts_and_leaves_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open_dir(dir.path());
        let id = KeyId::new(0xabc);

        store.claim(id).unwrap().persist(b"first").unwrap();

        let err = store.claim(id).unwrap_err();
        assert!(
            matches!(&err, StoreError::AlreadyClaimed { name } if name == "0xabc.key"),
            "got {err:?}"
        );
        assert_eq!(fs::read(store.artifact_path(id)).unwrap(), b"first");
    }

    #[test]
    fn outstanding_claim_blocks_other_claimants() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open_dir(dir.path());
        let id = KeyId::new(7);

        let held = store.claim(id).unwrap();
        assert!(store.claim(id).unwrap_err().is_conflict());
        held.persist(b"winner").unwrap();
        assert_eq!(fs::read(store.artifact_path(id)).unwrap(), b"winner");
    }

    #[test]
    fn dropped_claim_is_released() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open_dir(dir.path());
        let id = KeyId::new(9);

        drop(store.claim(id).unwrap());

        assert!(!store.artifact_path(id).exists());
        store.claim(id).unwrap().persist(b"again").unwrap();
    }

    #[test]
    fn stalled_write_removes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = faulty_store(dir.path(), Fault::StallAfter(3), false);
        let id = KeyId::new(0x10);

        let err = store.claim(id).unwrap().persist(b"secret-a").unwrap_err();

        assert!(
            matches!(
                err,
                StoreError::ShortWrite {
                    written: 3,
                    expected: 8,
                    ..
                }
            ),
            "got {err:?}"
        );
        assert!(!store.artifact_path(id).exists());
    }

    #[test]
    fn failed_write_removes_artifact_and_frees_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = faulty_store(dir.path(), Fault::FailAfter(4), false);
        let id = KeyId::new(0x11);

        let err = store.claim(id).unwrap().persist(b"secret-a").unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }), "got {err:?}");
        assert!(!store.artifact_path(id).exists());

        KeyStore::open_dir(dir.path())
            .claim(id)
            .unwrap()
            .persist(b"retry")
            .unwrap();
        assert_eq!(fs::read(store.artifact_path(id)).unwrap(), b"retry");
    }

    #[test]
    fn failed_cleanup_keeps_original_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = faulty_store(dir.path(), Fault::FailAfter(2), true);
        let id = KeyId::new(0x12);

        let err = store.claim(id).unwrap().persist(b"secret-a").unwrap_err();

        assert!(matches!(err, StoreError::Write { .. }), "got {err:?}");
        // The orphan stays behind for an operator to reconcile.
        assert_eq!(fs::read(store.artifact_path(id)).unwrap(), b"se");
    }

    #[test]
    fn finalize_failure_still_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = faulty_store(dir.path(), Fault::FinalizeFails, false);
        let id = KeyId::new(0x13);

        store.claim(id).unwrap().persist(b"secret-a").unwrap();

        assert_eq!(fs::read(store.artifact_path(id)).unwrap(), b"secret-a");
    }

    #[test]
    fn missing_root_is_create_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open_dir(dir.path().join("does-not-exist"));

        let err = store.claim(KeyId::new(1)).unwrap_err();
        assert!(matches!(err, StoreError::Create { .. }), "got {err:?}");
    }

    #[test]
    fn overlong_path_rejected_before_create() {
        let root = PathBuf::from("/").join("r".repeat(MAX_ARTIFACT_PATH));
        let store = KeyStore::open_dir(&root);

        let err = store.claim(KeyId::new(1)).unwrap_err();
        assert!(
            matches!(err, StoreError::PathTooLong { max: MAX_ARTIFACT_PATH, .. }),
            "got {err:?}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn artifacts_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open_dir(dir.path());
        let id = KeyId::new(0x20);
        store.claim(id).unwrap().persist(b"k").unwrap();

        let mode = fs::metadata(store.artifact_path(id))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o077, 0, "mode {mode:o} grants group/other access");
    }

    #[test]
    fn racing_claims_admit_exactly_one() {
        const RACERS: usize = 16;
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open_dir(dir.path());
        let id = KeyId::new(0x2);
        let barrier = Arc::new(Barrier::new(RACERS));
        let winners = Arc::new(Mutex::new(Vec::new()));

        let threads: Vec<_> = (0..RACERS)
            .map(|i| {
                let store = store.clone();
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    let body = format!("body-{i}");
                    barrier.wait();
                    match store.claim(id) {
                        Ok(claim) => {
                            claim.persist(body.as_bytes()).unwrap();
                            winners.lock().unwrap().push(body);
                        }
                        Err(e) => assert!(e.is_conflict(), "unexpected {e:?}"),
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let winners = winners.lock().unwrap();
        assert_eq!(winners.len(), 1);
        assert_eq!(
            fs::read(store.artifact_path(id)).unwrap(),
            winners[0].as_bytes()
        );
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}

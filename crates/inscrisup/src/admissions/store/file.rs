use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::{AdmissionRepository, AdmissionStore, RepositoryError};

/// Repository persisting the whole ledger as one JSON document.
///
/// Every read and transaction reloads the document under an advisory lock on
/// a sibling `.lock` file, shared for reads and exclusive for commits, so
/// several processes may work on the same ledger. Commits write a sibling
/// temporary file and rename it over the target, so a crash mid-write never
/// leaves a truncated ledger behind.
#[derive(Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Holds the advisory lock until dropped.
struct LedgerLock(File);

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

impl JsonFileRepository {
    /// Opens the ledger at `path`, starting empty when the file does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path = path.as_ref().to_path_buf();
        let repository = Self {
            lock_path: sibling(&path, ".lock"),
            path,
        };
        let _lock = repository.lock(false)?;
        repository.load()?;
        Ok(repository)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self, exclusive: bool) -> Result<LedgerLock, RepositoryError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        if exclusive {
            FileExt::lock_exclusive(&file)?;
        } else {
            FileExt::lock_shared(&file)?;
        }
        Ok(LedgerLock(file))
    }

    fn load(&self) -> Result<AdmissionStore, RepositoryError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(AdmissionStore::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn persist(&self, store: &AdmissionStore) -> Result<(), RepositoryError> {
        let temp_path = sibling(&self.path, ".tmp");

        let bytes = serde_json::to_vec_pretty(store)?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.path)?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "ledger persisted");
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl AdmissionRepository for JsonFileRepository {
    fn read<T>(&self, view: impl FnOnce(&AdmissionStore) -> T) -> Result<T, RepositoryError> {
        let _lock = self.lock(false)?;
        let store = self.load()?;
        Ok(view(&store))
    }

    fn transaction<T, E>(
        &self,
        work: impl FnOnce(&mut AdmissionStore) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<RepositoryError>,
    {
        let _lock = self.lock(true)?;
        let mut working = self.load()?;
        let value = work(&mut working)?;
        self.persist(&working)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admissions::domain::{FileNumber, Student};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn student(file: u32, last_name: &str) -> Student {
        Student {
            file_number: FileNumber(file),
            last_name: last_name.to_string(),
            first_name: "Anne".to_string(),
            birth_date: None,
            email: "anne@example.org".to_string(),
            phone: String::new(),
            address: String::new(),
            sex: None,
            current_proposition: None,
        }
    }

    fn cleanup(path: &Path) {
        let _ = fs::remove_file(path);
        let _ = fs::remove_file(sibling(path, ".lock"));
    }

    fn scratch_path(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("inscrisup-{label}-{}-{nanos}.json", std::process::id()))
    }

    #[test]
    fn committed_state_survives_reopen() {
        let path = scratch_path("reopen");
        {
            let repository = JsonFileRepository::open(&path).expect("opens empty ledger");
            repository
                .transaction(|store| {
                    store.insert_student(student(314, "LEROY"));
                    Ok::<_, RepositoryError>(())
                })
                .expect("commit succeeds");
        }

        let reopened = JsonFileRepository::open(&path).expect("reopens ledger");
        let email = reopened
            .read(|store| store.student(FileNumber(314)).map(|s| s.email.clone()))
            .expect("read succeeds");
        assert_eq!(email.as_deref(), Some("anne@example.org"));

        cleanup(&path);
    }

    #[test]
    fn two_handles_on_one_ledger_keep_both_commits() {
        let path = scratch_path("shared");
        let server = JsonFileRepository::open(&path).expect("server handle opens");
        let command = JsonFileRepository::open(&path).expect("command handle opens");

        server
            .transaction(|store| {
                store.insert_student(student(1, "ARNAUD"));
                Ok::<_, RepositoryError>(())
            })
            .expect("server commit");
        command
            .transaction(|store| {
                store.insert_student(student(2, "VIDAL"));
                Ok::<_, RepositoryError>(())
            })
            .expect("command commit");

        let seen_by_server = server
            .read(|store| store.students().map(|s| s.file_number).collect::<Vec<_>>())
            .expect("server reads");
        assert_eq!(seen_by_server, vec![FileNumber(1), FileNumber(2)]);

        let reopened = JsonFileRepository::open(&path).expect("reopens ledger");
        assert_eq!(
            reopened
                .read(|store| store.students().count())
                .expect("read succeeds"),
            2
        );

        cleanup(&path);
    }

    #[test]
    fn concurrent_commits_from_threads_are_serialized() {
        let path = scratch_path("threads");
        let handles: Vec<_> = (0..4u32)
            .map(|worker| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let repository = JsonFileRepository::open(&path).expect("handle opens");
                    for offset in 0..5u32 {
                        repository
                            .transaction(|store| {
                                store.insert_student(student(worker * 10 + offset, "MARTIN"));
                                Ok::<_, RepositoryError>(())
                            })
                            .expect("commit succeeds");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker finishes");
        }

        let repository = JsonFileRepository::open(&path).expect("reopens ledger");
        assert_eq!(
            repository
                .read(|store| store.students().count())
                .expect("read succeeds"),
            20
        );

        cleanup(&path);
    }

    #[test]
    fn failed_transaction_leaves_ledger_untouched() {
        let path = scratch_path("rollback");
        let repository = JsonFileRepository::open(&path).expect("opens empty ledger");

        let outcome = repository.transaction(|store| {
            store.insert_student(student(9, "BLANC"));
            Err::<(), _>(RepositoryError::Unavailable("abandoned".to_string()))
        });
        assert!(outcome.is_err());
        assert!(!path.exists());
        assert_eq!(
            repository
                .read(|store| store.students().count())
                .expect("read succeeds"),
            0
        );

        cleanup(&path);
    }

    #[test]
    fn open_rejects_corrupt_ledger() {
        let path = scratch_path("corrupt");
        fs::write(&path, b"{ not json").expect("write scratch file");

        match JsonFileRepository::open(&path) {
            Err(RepositoryError::Serialization(_)) => {}
            other => panic!("expected serialization error, got {other:?}"),
        }

        cleanup(&path);
    }
}

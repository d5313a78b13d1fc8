use std::sync::{Arc, Mutex, MutexGuard};

use super::{AdmissionRepository, AdmissionStore, RepositoryError};

/// Process-local repository; the mutex serializes every writer.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAdmissionRepository {
    state: Arc<Mutex<AdmissionStore>>,
}

impl InMemoryAdmissionRepository {
    pub fn new(store: AdmissionStore) -> Self {
        Self {
            state: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, AdmissionStore>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("admission store mutex poisoned".to_string()))
    }

    /// Copy of the committed state, mostly useful in tests.
    pub fn snapshot(&self) -> Result<AdmissionStore, RepositoryError> {
        Ok(self.lock()?.clone())
    }
}

impl AdmissionRepository for InMemoryAdmissionRepository {
    fn read<T>(&self, view: impl FnOnce(&AdmissionStore) -> T) -> Result<T, RepositoryError> {
        let guard = self.lock()?;
        Ok(view(&guard))
    }

    fn transaction<T, E>(
        &self,
        work: impl FnOnce(&mut AdmissionStore) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<RepositoryError>,
    {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        let value = work(&mut working)?;
        *guard = working;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admissions::domain::{FileNumber, Student};

    fn student(file: u32) -> Student {
        Student {
            file_number: FileNumber(file),
            last_name: "DURAND".to_string(),
            first_name: "Paul".to_string(),
            birth_date: None,
            email: String::new(),
            phone: String::new(),
            address: String::new(),
            sex: None,
            current_proposition: None,
        }
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let repository = InMemoryAdmissionRepository::default();

        let result: Result<(), RepositoryError> = repository.transaction(|store| {
            store.insert_student(student(7));
            Err(RepositoryError::Unavailable("boom".to_string()))
        });
        assert!(result.is_err());

        let count = repository
            .read(|store| store.students().count())
            .expect("read succeeds");
        assert_eq!(count, 0);
    }

    #[test]
    fn committed_transaction_is_visible() {
        let repository = InMemoryAdmissionRepository::default();
        repository
            .transaction(|store| {
                store.insert_student(student(7));
                Ok::<_, RepositoryError>(())
            })
            .expect("commit succeeds");

        let snapshot = repository.snapshot().expect("snapshot");
        assert!(snapshot.student(FileNumber(7)).is_some());
    }
}

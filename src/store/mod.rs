use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;

const MAX_UPDATE_ATTEMPTS: usize = 5;

struct Versioned<T> {
    version: u64,
    value: T,
}

/// Versioned in-memory document repository. Every mutation goes through
/// [`Repository::update`] or [`Repository::update_once`]; direct field
/// overwrites without a version check are not expressible.
pub struct Repository<T: Clone> {
    kind: &'static str,
    items: DashMap<Uuid, Versioned<T>>,
}

impl<T: Clone> Repository<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: DashMap::new(),
        }
    }

    pub fn insert(&self, id: Uuid, value: T) {
        self.items.insert(id, Versioned { version: 0, value });
    }

    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.items.get(id).map(|entry| entry.value.clone())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items
            .iter()
            .map(|entry| entry.value.clone())
            .collect()
    }

    /// Optimistic read-modify-write. The closure runs against a copy and may
    /// be retried on version conflict, so it must be free of external side
    /// effects. An error from the closure discards the copy; the stored
    /// document is untouched.
    pub fn update<R>(
        &self,
        id: Uuid,
        mut f: impl FnMut(&mut T) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let (version, mut value) = {
                let entry = self.items.get(&id).ok_or_else(|| self.not_found(&id))?;
                (entry.version, entry.value.clone())
            };

            let out = f(&mut value)?;

            let mut entry = self.items.get_mut(&id).ok_or_else(|| self.not_found(&id))?;
            if entry.version == version {
                entry.version += 1;
                entry.value = value;
                return Ok(out);
            }
        }

        Err(AppError::Busy)
    }

    /// Exclusive read-modify-write: the entry stays locked while the closure
    /// runs, so it runs at most once and may carry external side effects
    /// (ledger legs). An error discards the copy without writing back.
    pub fn update_once<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut T) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let mut entry = self.items.get_mut(&id).ok_or_else(|| self.not_found(&id))?;
        let mut value = entry.value.clone();
        let out = f(&mut value)?;
        entry.version += 1;
        entry.value = value;
        Ok(out)
    }

    fn not_found(&self, id: &Uuid) -> AppError {
        AppError::NotFound(format!("{} {} not found", self.kind, id))
    }
}

use std::sync::Mutex;

use crate::{CoreError, LinkRepository, ShortCode, ShortLink, User, UserRepository};

/// Simple in-memory link repository for tests and non-persistent
/// deployments. Data does not survive the process and must never be treated
/// as durable; the SQLite adapter is the durable variant.
pub struct InMemoryRepo {
    inner: Mutex<Inner>,
}

struct Inner {
    seq: u64,
    rows: Vec<Row>,
}

struct Row {
    seq: u64,
    link: ShortLink,
}

/// In-memory user repository holding the zero-or-one admin row.
pub struct InMemoryUserRepo {
    users: Mutex<Vec<User>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                seq: 0,
                rows: Vec::new(),
            }),
        }
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> CoreError {
    CoreError::Repository("mutex poisoned".into())
}

impl LinkRepository for InMemoryRepo {
    fn insert(&self, link: ShortLink) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        if inner
            .rows
            .iter()
            .any(|r| r.link.short_code == link.short_code)
        {
            return Err(CoreError::AlreadyExists);
        }
        inner.seq += 1;
        let seq = inner.seq;
        inner.rows.push(Row { seq, link });
        Ok(())
    }

    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        Ok(inner
            .rows
            .iter()
            .find(|r| &r.link.short_code == code)
            .map(|r| r.link.clone()))
    }

    fn find_by_id(&self, id: &str) -> Result<Option<ShortLink>, CoreError> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        Ok(inner
            .rows
            .iter()
            .find(|r| r.link.id == id)
            .map(|r| r.link.clone()))
    }

    fn find_all(&self) -> Result<Vec<ShortLink>, CoreError> {
        let inner = self.inner.lock().map_err(|_| poisoned())?;
        let mut rows: Vec<(u64, ShortLink)> = inner
            .rows
            .iter()
            .map(|r| (r.seq, r.link.clone()))
            .collect();
        // Newest first; the insertion sequence breaks created_at ties.
        rows.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at).then(b.0.cmp(&a.0)));
        Ok(rows.into_iter().map(|(_, link)| link).collect())
    }

    fn increment_click(&self, code: &ShortCode) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        match inner.rows.iter_mut().find(|r| &r.link.short_code == code) {
            Some(row) => {
                row.link.click_count += 1;
                Ok(())
            }
            None => Err(CoreError::NotFound),
        }
    }

    fn update(&self, link: &ShortLink) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        match inner.rows.iter_mut().find(|r| r.link.id == link.id) {
            Some(row) => {
                row.link = link.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound),
        }
    }

    fn delete(&self, id: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().map_err(|_| poisoned())?;
        inner.rows.retain(|r| r.link.id != id);
        Ok(())
    }
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryUserRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl UserRepository for InMemoryUserRepo {
    fn find_users(&self) -> Result<Vec<User>, CoreError> {
        let users = self.users.lock().map_err(|_| poisoned())?;
        Ok(users.clone())
    }

    fn find_user(&self, id: &str) -> Result<Option<User>, CoreError> {
        let users = self.users.lock().map_err(|_| poisoned())?;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    fn create_user(&self, user: User) -> Result<(), CoreError> {
        let mut users = self.users.lock().map_err(|_| poisoned())?;
        if !users.is_empty() {
            return Err(CoreError::AlreadyExists);
        }
        users.push(user);
        Ok(())
    }
}

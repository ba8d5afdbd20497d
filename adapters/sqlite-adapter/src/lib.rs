//! sqlite-adapter — SQLite implementation of the link and user repository
//! ports for durable single-node deployments.
//!
//! Purpose
//! - Provide a lightweight, file-based store to run the system without
//!   external services.
//! - Implements the `LinkRepository` and `UserRepository` traits from the
//!   `domain` crate.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Stores timestamps as milliseconds since UNIX_EPOCH.
//! - The UNIQUE constraint on `short_code` is what makes concurrent creation
//!   safe: a duplicate insert surfaces as `AlreadyExists` and the service
//!   retries with a fresh code.
//! - The click increment is a single UPDATE statement, never a
//!   read-modify-write in application code.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::{CoreError, LinkRepository, ShortCode, ShortLink, User, UserRepository};
use rusqlite::{params, Connection};

/// SQLite-backed repository.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Construct from env var `DB_PATH` (defaults to `./data/shortlinks.db`).
    pub fn from_env() -> Result<Self, CoreError> {
        let path = std::env::var("DB_PATH").unwrap_or_else(|_| "./data/shortlinks.db".to_string());
        // Ensure directory exists
        if let Some(dir) = Path::new(&path).parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        Self::new(path)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS shortlinks (
            id TEXT PRIMARY KEY,
            short_code TEXT NOT NULL UNIQUE,
            original_url TEXT NOT NULL,
            title TEXT,
            created_at INTEGER NOT NULL,
            click_count INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_shortlinks_created_at ON shortlinks(created_at);
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            password TEXT NOT NULL
        );
        "#,
    )
    .map_err(map_sqerr)?;
    Ok(())
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Repository(format!("sqlite error: {e}"))
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn system_time_to_millis(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as i64
}

fn millis_to_system_time(ms: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64)
}

const LINK_COLUMNS: &str = "id, short_code, original_url, title, created_at, click_count";

fn row_to_link(row: &rusqlite::Row) -> Result<ShortLink, CoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    let code_str: String = row.get(1).map_err(map_sqerr)?;
    let original_url: String = row.get(2).map_err(map_sqerr)?;
    let title: Option<String> = row.get(3).map_err(map_sqerr)?;
    let created_at: i64 = row.get(4).map_err(map_sqerr)?;
    let click_count: i64 = row.get(5).map_err(map_sqerr)?;

    let short_code = ShortCode::new(code_str)
        .map_err(|e| CoreError::Repository(format!("bad short code in db: {e}")))?;
    Ok(ShortLink {
        id,
        short_code,
        original_url,
        title,
        created_at: millis_to_system_time(created_at),
        click_count: click_count.max(0) as u64,
    })
}

impl LinkRepository for SqliteRepo {
    fn insert(&self, link: ShortLink) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let res = conn.execute(
            "INSERT INTO shortlinks(id, short_code, original_url, title, created_at, click_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                link.id,
                link.short_code.as_str(),
                link.original_url,
                link.title,
                system_time_to_millis(link.created_at),
                link.click_count as i64,
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(CoreError::AlreadyExists),
            Err(e) => Err(map_sqerr(e)),
        }
    }

    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {LINK_COLUMNS} FROM shortlinks WHERE short_code = ?1"
            ))
            .map_err(map_sqerr)?;
        let mut rows = stmt.query(params![code.as_str()]).map_err(map_sqerr)?;
        match rows.next().map_err(map_sqerr)? {
            Some(row) => Ok(Some(row_to_link(row)?)),
            None => Ok(None),
        }
    }

    fn find_by_id(&self, id: &str) -> Result<Option<ShortLink>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {LINK_COLUMNS} FROM shortlinks WHERE id = ?1"
            ))
            .map_err(map_sqerr)?;
        let mut rows = stmt.query(params![id]).map_err(map_sqerr)?;
        match rows.next().map_err(map_sqerr)? {
            Some(row) => Ok(Some(row_to_link(row)?)),
            None => Ok(None),
        }
    }

    fn find_all(&self) -> Result<Vec<ShortLink>, CoreError> {
        let conn = self.lock()?;
        // rowid breaks created_at ties so same-instant creations still list
        // newest first.
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {LINK_COLUMNS} FROM shortlinks ORDER BY created_at DESC, rowid DESC"
            ))
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            out.push(row_to_link(row)?);
        }
        Ok(out)
    }

    fn increment_click(&self, code: &ShortCode) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE shortlinks SET click_count = click_count + 1 WHERE short_code = ?1",
                params![code.as_str()],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn update(&self, link: &ShortLink) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE shortlinks SET original_url = ?1, title = ?2 WHERE id = ?3",
                params![link.original_url, link.title, link.id],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn delete(&self, id: &str) -> Result<(), CoreError> {
        let conn = self.lock()?;
        // Deleting an absent id is not an error.
        conn.execute("DELETE FROM shortlinks WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        Ok(())
    }
}

impl UserRepository for SqliteRepo {
    fn find_users(&self) -> Result<Vec<User>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name, password FROM users")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            out.push(row_to_user(row)?);
        }
        Ok(out)
    }

    fn find_user(&self, id: &str) -> Result<Option<User>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name, password FROM users WHERE id = ?1")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query(params![id]).map_err(map_sqerr)?;
        match rows.next().map_err(map_sqerr)? {
            Some(row) => Ok(Some(row_to_user(row)?)),
            None => Ok(None),
        }
    }

    fn create_user(&self, user: User) -> Result<(), CoreError> {
        let conn = self.lock()?;
        // The at-most-one-row rule is checked inside the transaction so two
        // racing registrations cannot both land.
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        let existing: i64 = tx
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .map_err(map_sqerr)?;
        if existing > 0 {
            return Err(CoreError::AlreadyExists);
        }
        let res = tx.execute(
            "INSERT INTO users(id, name, password) VALUES (?1, ?2, ?3)",
            params![user.id, user.name, user.password_hash],
        );
        match res {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => return Err(CoreError::AlreadyExists),
            Err(e) => return Err(map_sqerr(e)),
        }
        tx.commit().map_err(map_sqerr)?;
        Ok(())
    }
}

fn row_to_user(row: &rusqlite::Row) -> Result<User, CoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    let name: String = row.get(1).map_err(map_sqerr)?;
    let password_hash: String = row.get(2).map_err(map_sqerr)?;
    Ok(User {
        id,
        name,
        password_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tmp_db() -> (SqliteRepo, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let repo = SqliteRepo::new(path).unwrap();
        (repo, dir)
    }

    fn link(id: &str, code: &str, at_secs: u64) -> ShortLink {
        ShortLink::new(
            id.to_string(),
            ShortCode::new(code).unwrap(),
            format!("https://example.com/{id}"),
            None,
            UNIX_EPOCH + Duration::from_secs(at_secs),
        )
    }

    #[test]
    fn insert_get_roundtrip() {
        let (repo, _dir) = tmp_db();
        let mut l = link("id-1", "abc123", 42);
        l.title = Some("Example".into());
        repo.insert(l.clone()).unwrap();

        let by_code = repo
            .find_by_code(&l.short_code)
            .unwrap()
            .expect("found by code");
        assert_eq!(by_code, l);

        let by_id = repo.find_by_id("id-1").unwrap().expect("found by id");
        assert_eq!(by_id.title.as_deref(), Some("Example"));
        assert_eq!(by_id.click_count, 0);
    }

    #[test]
    fn duplicate_code_is_conflict() {
        let (repo, _dir) = tmp_db();
        repo.insert(link("id-1", "dup123", 0)).unwrap();
        let err = repo.insert(link("id-2", "dup123", 1)).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
        // The first row is untouched.
        assert!(repo.find_by_id("id-1").unwrap().is_some());
        assert!(repo.find_by_id("id-2").unwrap().is_none());
    }

    #[test]
    fn find_all_orders_newest_first() {
        let (repo, _dir) = tmp_db();
        for i in 0..5u64 {
            repo.insert(link(&format!("id-{i}"), &format!("code0{i}"), i))
                .unwrap();
        }
        let items = repo.find_all().unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[0].id, "id-4");
        assert_eq!(items[4].id, "id-0");
    }

    #[test]
    fn same_instant_creations_list_latest_insert_first() {
        let (repo, _dir) = tmp_db();
        repo.insert(link("first", "code01", 7)).unwrap();
        repo.insert(link("second", "code02", 7)).unwrap();
        let items = repo.find_all().unwrap();
        assert_eq!(items[0].id, "second");
        assert_eq!(items[1].id, "first");
    }

    #[test]
    fn increment_click_is_cumulative() {
        let (repo, _dir) = tmp_db();
        let l = link("id-1", "clickm", 0);
        repo.insert(l.clone()).unwrap();

        repo.increment_click(&l.short_code).unwrap();
        repo.increment_click(&l.short_code).unwrap();
        repo.increment_click(&l.short_code).unwrap();

        let got = repo.find_by_code(&l.short_code).unwrap().unwrap();
        assert_eq!(got.click_count, 3);
    }

    #[test]
    fn increment_unknown_code_is_not_found() {
        let (repo, _dir) = tmp_db();
        let missing = ShortCode::new("nosuch").unwrap();
        assert!(matches!(
            repo.increment_click(&missing),
            Err(CoreError::NotFound)
        ));
    }

    #[test]
    fn delete_is_idempotent() {
        let (repo, _dir) = tmp_db();
        repo.insert(link("id-1", "code01", 0)).unwrap();
        repo.delete("id-1").unwrap();
        repo.delete("id-1").unwrap();
        repo.delete("never-existed").unwrap();
        assert!(repo.find_by_id("id-1").unwrap().is_none());
    }

    #[test]
    fn update_rewrites_url_and_title() {
        let (repo, _dir) = tmp_db();
        let mut l = link("id-1", "code01", 0);
        repo.insert(l.clone()).unwrap();

        l.original_url = "https://new.example".into();
        l.title = Some("Renamed".into());
        repo.update(&l).unwrap();

        let got = repo.find_by_id("id-1").unwrap().unwrap();
        assert_eq!(got.original_url, "https://new.example");
        assert_eq!(got.title.as_deref(), Some("Renamed"));

        let ghost = link("ghost", "code99", 0);
        assert!(matches!(repo.update(&ghost), Err(CoreError::NotFound)));
    }

    #[test]
    fn user_table_holds_at_most_one_row() {
        let (repo, _dir) = tmp_db();
        assert!(repo.find_users().unwrap().is_empty());

        let alice = User {
            id: "alice".into(),
            name: "alice".into(),
            password_hash: "$argon2id$stub".into(),
        };
        repo.create_user(alice).unwrap();

        let bob = User {
            id: "bob".into(),
            name: "bob".into(),
            password_hash: "$argon2id$stub".into(),
        };
        assert!(matches!(
            repo.create_user(bob),
            Err(CoreError::AlreadyExists)
        ));

        assert_eq!(repo.find_users().unwrap().len(), 1);
        let got = repo.find_user("alice").unwrap().expect("present");
        assert_eq!(got.name, "alice");
        assert!(repo.find_user("bob").unwrap().is_none());
    }
}

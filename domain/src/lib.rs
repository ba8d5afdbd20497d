//! Domain library for the link shortener.
//!
//! This crate holds the domain types, ports (traits), and error definitions.
//! Keep adapters and IO concerns out of this crate; the in-memory adapters
//! under [`adapters`] exist for tests and disposable deployments only.

use serde::Deserialize;
use std::time::SystemTime;

/// A short, URL-safe code identifying a stored link.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortCode(String);

impl ShortCode {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if val.is_empty() {
            return Err(CoreError::InvalidCode("empty".into()));
        }
        if val.len() > 64 {
            return Err(CoreError::InvalidCode("too long".into()));
        }
        if !val
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidCode("invalid characters".into()));
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input data for creating a new short link.
///
/// Deserializes directly from the HTTP create request; a missing
/// `originalUrl` arrives as an empty string and fails validation in the
/// service rather than in the deserializer.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLink {
    #[serde(default)]
    pub original_url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Fields that may change on the secondary update path.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkUpdate {
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Stored short link mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortLink {
    /// Opaque primary key, generated at creation, immutable.
    pub id: String,
    /// Unique across all live links, immutable once created.
    pub short_code: ShortCode,
    pub original_url: String,
    pub title: Option<String>,
    /// Set once; used only for newest-first ordering.
    pub created_at: SystemTime,
    /// Monotonically non-decreasing; moves once per successful resolution.
    pub click_count: u64,
}

impl ShortLink {
    /// Create a new link with a zeroed click counter.
    pub fn new(
        id: String,
        short_code: ShortCode,
        original_url: String,
        title: Option<String>,
        created_at: SystemTime,
    ) -> Self {
        Self {
            id,
            short_code,
            original_url,
            title,
            created_at,
            click_count: 0,
        }
    }
}

/// The single admin account. `id` doubles as the login username.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Argon2id PHC string; plaintext is never stored.
    pub password_hash: String,
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Repository port for persisting and loading links.
pub trait LinkRepository: Send + Sync {
    /// Insert a new link. Fails with [`CoreError::AlreadyExists`] when the
    /// short code is already taken; the service retries with a fresh code.
    fn insert(&self, link: ShortLink) -> Result<(), CoreError>;
    fn find_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError>;
    fn find_by_id(&self, id: &str) -> Result<Option<ShortLink>, CoreError>;
    /// All live links, newest first.
    fn find_all(&self) -> Result<Vec<ShortLink>, CoreError>;
    /// Atomically bump the click counter. [`CoreError::NotFound`] when the
    /// code is absent.
    fn increment_click(&self, code: &ShortCode) -> Result<(), CoreError>;
    /// Update an existing link (original_url, title).
    fn update(&self, link: &ShortLink) -> Result<(), CoreError>;
    /// Remove a link by id. Removing an absent id is not an error.
    fn delete(&self, id: &str) -> Result<(), CoreError>;
}

/// Repository port for the single-admin user table (zero or one row).
pub trait UserRepository: Send + Sync {
    fn find_users(&self) -> Result<Vec<User>, CoreError>;
    fn find_user(&self, id: &str) -> Result<Option<User>, CoreError>;
    /// Create the admin account. Fails with [`CoreError::AlreadyExists`]
    /// once any row exists.
    fn create_user(&self, user: User) -> Result<(), CoreError>;
}

/// Core domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid short code: {0}")]
    InvalidCode(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("resource already exists")]
    AlreadyExists,
    #[error("not found")]
    NotFound,
    #[error("no free short code after {0} attempts")]
    CodeSpaceExhausted(u32),
    #[error("repository error: {0}")]
    Repository(String),
}

pub mod adapters;
pub mod code;
pub mod service;
pub mod validate;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_code_accepts_simple_values() {
        let c = ShortCode::new("aB3_-9").expect("valid code");
        assert_eq!(c.as_str(), "aB3_-9");
    }

    #[test]
    fn short_code_rejects_empty() {
        let err = ShortCode::new("").unwrap_err();
        assert!(matches!(err, CoreError::InvalidCode(_)));
    }

    #[test]
    fn short_code_rejects_bad_characters() {
        assert!(ShortCode::new("has/slash").is_err());
        assert!(ShortCode::new("has space").is_err());
        assert!(ShortCode::new("a".repeat(65)).is_err());
    }

    #[test]
    fn new_link_starts_unclicked() {
        let link = ShortLink::new(
            "id1".into(),
            ShortCode::new("abc123").expect("valid"),
            "https://example.com".into(),
            None,
            SystemTime::UNIX_EPOCH,
        );
        assert_eq!(link.click_count, 0);
    }

    #[test]
    fn new_link_deserializes_camel_case() {
        let input: NewLink =
            serde_json::from_str(r#"{"originalUrl":"https://example.com","title":"Docs"}"#)
                .expect("valid json");
        assert_eq!(input.original_url, "https://example.com");
        assert_eq!(input.title.as_deref(), Some("Docs"));

        // Missing fields default instead of failing deserialization.
        let empty: NewLink = serde_json::from_str("{}").expect("valid json");
        assert_eq!(empty.original_url, "");
        assert!(empty.title.is_none());
    }
}

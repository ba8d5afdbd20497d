//! credential-auth — single-admin credential verification and session tokens.
//!
//! Purpose
//! - Hash and verify the admin password with Argon2id.
//! - Enforce the at-most-one-account registration rule.
//! - Issue and verify HS256 session tokens for the admin API.
//!
//! API
//! - `AuthGate::register(repo, name, password)` → `Result<User, AuthError>`
//! - `AuthGate::login(repo, name, password)` → `Result<(token, SessionUser), AuthError>`
//! - `AuthGate::verify(token)` → `Result<SessionUser, AuthError>`
//!
//! Notes
//! - Unknown usernames and wrong passwords produce the same
//!   [`AuthError::InvalidCredentials`]; a throwaway verification runs for
//!   unknown users so both rejections cost a hash comparison.
//! - Keeps a small public surface so apps don’t need to know the internals.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use domain::{CoreError, User, UserRepository};

/// Identity carried by a verified session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("an account already exists")]
    RegistrationClosed,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("missing or malformed token")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("password hashing failed")]
    Hash,
    #[error("session token error")]
    Token,
    #[error("repository error: {0}")]
    Repository(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    name: String,
    iat: u64,
    exp: u64,
}

/// Hash verified for unknown usernames, computed once per process.
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("throwaway-for-unknown-users").unwrap_or_default());

/// Credential gate guarding the admin API.
pub struct AuthGate {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl AuthGate {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Create the one admin account. Rejected with
    /// [`AuthError::RegistrationClosed`] forever once a user row exists.
    pub fn register<R: UserRepository>(
        &self,
        repo: &R,
        name: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::MissingField("name"));
        }
        if password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }

        let existing = repo.find_users().map_err(repo_err)?;
        if !existing.is_empty() {
            return Err(AuthError::RegistrationClosed);
        }

        let user = User {
            id: name.to_string(),
            name: name.to_string(),
            password_hash: hash_password(password)?,
        };
        match repo.create_user(user.clone()) {
            Ok(()) => {
                debug!(user = %user.id, "admin account created");
                Ok(user)
            }
            // Lost a registration race; the earlier row wins.
            Err(CoreError::AlreadyExists) => Err(AuthError::RegistrationClosed),
            Err(e) => Err(repo_err(e)),
        }
    }

    /// Exchange credentials for a session token. Unknown user and wrong
    /// password are indistinguishable to the caller.
    pub fn login<R: UserRepository>(
        &self,
        repo: &R,
        name: &str,
        password: &str,
    ) -> Result<(String, SessionUser), AuthError> {
        if name.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        match repo.find_user(name).map_err(repo_err)? {
            Some(user) => {
                if !verify_password(password, &user.password_hash)? {
                    return Err(AuthError::InvalidCredentials);
                }
                let session = SessionUser {
                    id: user.id,
                    name: user.name,
                };
                let token = self.issue(&session)?;
                Ok((token, session))
            }
            None => {
                // Unknown user must cost the same as a wrong password.
                let _ = verify_password(password, &DUMMY_HASH);
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Verify a session token and return the identity it carries.
    pub fn verify(&self, token: &str) -> Result<SessionUser, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default()).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Malformed,
            },
        )?;
        Ok(SessionUser {
            id: data.claims.sub,
            name: data.claims.name,
        })
    }

    fn issue(&self, user: &SessionUser) -> Result<String, AuthError> {
        let now = unix_now();
        let claims = Claims {
            sub: user.id.clone(),
            name: user.name.clone(),
            iat: now,
            exp: now + self.ttl.as_secs(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|_| AuthError::Token)
    }
}

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::Hash)
}

/// Verify a password against a stored Argon2 hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::Hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Random URL-safe secret for deployments that did not configure one.
pub fn random_secret() -> String {
    SaltString::generate(&mut OsRng).to_string()
}

fn repo_err(e: CoreError) -> AuthError {
    AuthError::Repository(e.to_string())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::adapters::memory_repo::InMemoryUserRepo;

    fn gate() -> AuthGate {
        AuthGate::new(b"test-secret-32-bytes-long-enough", Duration::from_secs(3600))
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash).expect("verify"));
        assert!(!verify_password("battery staple", &hash).expect("verify"));
    }

    #[test]
    fn register_then_login() {
        let gate = gate();
        let repo = InMemoryUserRepo::new();

        let user = gate.register(&repo, "alice", "s3cret").expect("registered");
        assert_eq!(user.id, "alice");
        assert_eq!(user.name, "alice");
        assert!(user.password_hash.starts_with("$argon2"));

        let (token, session) = gate.login(&repo, "alice", "s3cret").expect("logged in");
        assert_eq!(session.id, "alice");

        let verified = gate.verify(&token).expect("valid token");
        assert_eq!(verified, session);
    }

    #[test]
    fn registration_closes_after_first_account() {
        let gate = gate();
        let repo = InMemoryUserRepo::new();

        gate.register(&repo, "alice", "s3cret").expect("registered");
        let err = gate.register(&repo, "bob", "other").unwrap_err();
        assert_eq!(err, AuthError::RegistrationClosed);
    }

    #[test]
    fn register_requires_both_fields() {
        let gate = gate();
        let repo = InMemoryUserRepo::new();
        assert_eq!(
            gate.register(&repo, "  ", "pw").unwrap_err(),
            AuthError::MissingField("name")
        );
        assert_eq!(
            gate.register(&repo, "alice", "").unwrap_err(),
            AuthError::MissingField("password")
        );
    }

    #[test]
    fn unknown_user_and_wrong_password_are_indistinguishable() {
        let gate = gate();
        let repo = InMemoryUserRepo::new();
        gate.register(&repo, "alice", "s3cret").expect("registered");

        let wrong_password = gate.login(&repo, "alice", "nope").unwrap_err();
        let unknown_user = gate.login(&repo, "mallory", "nope").unwrap_err();
        assert_eq!(wrong_password, unknown_user);
        assert_eq!(wrong_password, AuthError::InvalidCredentials);
    }

    #[test]
    fn tampered_token_rejected() {
        let gate = gate();
        let repo = InMemoryUserRepo::new();
        gate.register(&repo, "alice", "s3cret").expect("registered");
        let (token, _) = gate.login(&repo, "alice", "s3cret").expect("logged in");

        let mut tampered = token.clone();
        tampered.push('x');
        assert_eq!(gate.verify(&tampered).unwrap_err(), AuthError::Malformed);
        assert_eq!(
            gate.verify("not.a.token").unwrap_err(),
            AuthError::Malformed
        );
    }

    #[test]
    fn wrong_secret_rejected() {
        let gate = gate();
        let other = AuthGate::new(b"another-secret-entirely-here!!!!", Duration::from_secs(3600));
        let repo = InMemoryUserRepo::new();
        gate.register(&repo, "alice", "s3cret").expect("registered");
        let (token, _) = gate.login(&repo, "alice", "s3cret").expect("logged in");

        assert_eq!(other.verify(&token).unwrap_err(), AuthError::Malformed);
    }

    #[test]
    fn expired_token_rejected() {
        let gate = gate();
        // Craft a token whose exp is well past the default validation leeway.
        let now = unix_now();
        let claims = Claims {
            sub: "alice".into(),
            name: "alice".into(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret-32-bytes-long-enough"),
        )
        .expect("encode");

        assert_eq!(gate.verify(&token).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn random_secret_is_nonempty_and_varies() {
        let a = random_secret();
        let b = random_secret();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }
}

use tracing::{debug, warn};

use crate::validate::{is_valid_url, validate_original_url};
use crate::{
    Clock, CoreError, LinkRepository, LinkUpdate, NewLink, ShortCode, ShortLink,
};
use crate::code::CodeGenerator;

/// Upper bound on code regeneration attempts per creation. With a
/// 6-character code over a 64-character alphabet the space holds ~6.9e10
/// codes, so hitting this cap means the store is effectively full or
/// misbehaving, not bad luck.
pub const MAX_CODE_ATTEMPTS: u32 = 32;

/// Outcome of resolving a short code that exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// URL the visitor should be redirected to.
    pub target: String,
    /// Whether the visit was recorded. Accounting is best-effort; a failed
    /// increment never blocks the redirect.
    pub counted: bool,
}

/// Application service orchestrating creation and resolution of short links.
///
/// It remains generic over repository, code generator, and clock so the
/// domain stays testable without external dependencies.
pub struct LinkService<R: LinkRepository, G: CodeGenerator, C: Clock> {
    repo: R,
    codegen: G,
    clock: C,
}

impl<R: LinkRepository, G: CodeGenerator, C: Clock> LinkService<R, G, C> {
    pub fn new(repo: R, codegen: G, clock: C) -> Self {
        Self {
            repo,
            codegen,
            clock,
        }
    }

    /// Create a new short link.
    ///
    /// The store's uniqueness check is the arbiter for code collisions:
    /// insert optimistically and regenerate on a duplicate, bounded by
    /// [`MAX_CODE_ATTEMPTS`]. There is no check-then-insert window, so
    /// concurrent creations cannot end up sharing a code.
    pub fn create_short_link(&self, input: NewLink) -> Result<ShortLink, CoreError> {
        validate_original_url(&input.original_url)?;
        let original_url = input.original_url.trim().to_string();
        let title = input.title.and_then(normalize_title);

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let link = ShortLink::new(
                self.codegen.next_id(),
                self.codegen.next_code(),
                original_url.clone(),
                title.clone(),
                self.clock.now(),
            );
            match self.repo.insert(link.clone()) {
                Ok(()) => return Ok(link),
                Err(CoreError::AlreadyExists) => {
                    debug!(attempt, "short code collision, regenerating");
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
    }

    /// All links, newest first.
    pub fn get_all_links(&self) -> Result<Vec<ShortLink>, CoreError> {
        self.repo.find_all()
    }

    pub fn get_link_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, CoreError> {
        self.repo.find_by_code(code)
    }

    /// Remove a link. Deleting an id that no longer exists succeeds.
    pub fn delete_link(&self, id: &str) -> Result<(), CoreError> {
        self.repo.delete(id)
    }

    /// Secondary update path; not exercised by the primary flows.
    pub fn update_link(&self, id: &str, update: LinkUpdate) -> Result<ShortLink, CoreError> {
        let mut link = self.repo.find_by_id(id)?.ok_or(CoreError::NotFound)?;
        if let Some(url) = update.original_url {
            validate_original_url(&url)?;
            link.original_url = url.trim().to_string();
        }
        if let Some(title) = update.title {
            link.title = normalize_title(title);
        }
        self.repo.update(&link)?;
        Ok(link)
    }

    /// Parse-only URL check, exposed for callers that validate before
    /// submitting.
    pub fn is_valid_url(&self, candidate: &str) -> bool {
        is_valid_url(candidate)
    }

    /// Resolve a short code to its redirect target, recording the visit.
    ///
    /// Lookup and increment form one resolution unit: the counter moves at
    /// most once per call and only when the link exists. A failed increment
    /// is logged and swallowed; the redirect proceeds with the
    /// already-fetched URL.
    pub fn resolve(&self, code: &ShortCode) -> Result<Option<Resolved>, CoreError> {
        let Some(link) = self.repo.find_by_code(code)? else {
            return Ok(None);
        };
        let counted = match self.repo.increment_click(code) {
            Ok(()) => true,
            Err(e) => {
                warn!(code = %code, err = %e, "click increment failed, redirecting anyway");
                false
            }
        };
        Ok(Some(Resolved {
            target: link.original_url,
            counted,
        }))
    }
}

fn normalize_title(title: String) -> Option<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

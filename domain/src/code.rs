//! Random short-code and link-id generation.

use rand::Rng;

use crate::ShortCode;

/// URL-safe alphabet codes and ids are drawn from.
pub const CODE_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Length of generated short codes.
pub const CODE_LEN: usize = 6;

/// Length of generated link ids.
pub const ID_LEN: usize = 21;

/// Source of fresh short codes and link ids.
pub trait CodeGenerator: Send + Sync {
    fn next_code(&self) -> ShortCode;
    fn next_id(&self) -> String;
}

/// Uniform random generator over [`CODE_ALPHABET`]. Output carries no
/// structural relation to any input; collision handling is the caller's
/// concern (the service retries against the store's uniqueness check).
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomCodeGenerator;

fn random_string(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

impl CodeGenerator for RandomCodeGenerator {
    fn next_code(&self) -> ShortCode {
        // Valid by construction — every alphabet character passes validation.
        // If this fails (shouldn't), fall back to a safe minimal code.
        ShortCode::new(random_string(CODE_LEN))
            .unwrap_or_else(|_| ShortCode::new("0").expect("'0' is a valid code"))
    }

    fn next_id(&self) -> String {
        random_string(ID_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_have_fixed_length_and_alphabet() {
        let g = RandomCodeGenerator;
        for _ in 0..100 {
            let code = g.next_code();
            assert_eq!(code.as_str().len(), CODE_LEN);
            assert!(code
                .as_str()
                .bytes()
                .all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn ids_have_fixed_length_and_alphabet() {
        let g = RandomCodeGenerator;
        let id = g.next_id();
        assert_eq!(id.len(), ID_LEN);
        assert!(id.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn draws_are_not_constant() {
        let g = RandomCodeGenerator;
        let first = g.next_code();
        // 64^6 possible codes; 20 identical consecutive draws would mean a
        // broken generator, not bad luck.
        assert!((0..20).any(|_| g.next_code() != first));
    }
}

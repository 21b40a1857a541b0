/// Invitation tokens
///
/// A token is 32 random bytes, hex encoded (64 characters). It is handed
/// out once, inside the invitation link; the database only ever stores its
/// SHA-256 digest, so a leaked table cannot be replayed as links.
///
/// # Example
///
/// ```
/// use focusforge_shared::invitations::token::{generate_token, hash_token};
///
/// let (token, hash) = generate_token();
/// assert_eq!(token.len(), 64);
/// assert_eq!(hash_token(&token), hash);
/// ```

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes per token
const TOKEN_BYTES: usize = 32;

/// Length of the hex-encoded token
pub const TOKEN_LENGTH: usize = TOKEN_BYTES * 2;

/// Generates a new token and its storage hash
///
/// Returns `(token, token_hash)`. Only the hash should be persisted.
pub fn generate_token() -> (String, String) {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);

    let token = hex::encode(bytes);
    let hash = hash_token(&token);

    (token, hash)
}

/// SHA-256 of the token, lower-case hex
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Cheap shape check before touching the database
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let (token, hash) = generate_token();

        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(is_well_formed(&token));
        assert_eq!(hash.len(), 64);
        assert_ne!(token, hash);
    }

    #[test]
    fn test_tokens_are_unique() {
        let (a, hash_a) = generate_token();
        let (b, hash_b) = generate_token();

        assert_ne!(a, b);
        assert_ne!(hash_a, hash_b);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let (token, hash) = generate_token();
        assert_eq!(hash_token(&token), hash);
        assert_eq!(hash_token(&format!(" {} ", token)), hash);
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_is_well_formed() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("abc"));
        assert!(!is_well_formed(&"z".repeat(TOKEN_LENGTH)));
        assert!(is_well_formed(&"0a".repeat(TOKEN_BYTES)));
    }
}

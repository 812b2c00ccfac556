use rand::TryRngCore;

use crate::error::SiteError;

pub const SLUG_LEN: usize = 8;
pub const EDIT_CREDENTIAL_LEN: usize = 32;

const SLUG_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
/// Largest multiple of the alphabet size that fits in a byte; bytes at or
/// above it are discarded so every character is equally likely.
const SLUG_BYTE_CUTOFF: u8 = (256 / SLUG_ALPHABET.len() * SLUG_ALPHABET.len()) as u8;

fn random_bytes(len: usize) -> Result<Vec<u8>, SiteError> {
    let mut bytes = vec![0u8; len];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SiteError::Upstream(format!("Failed to generate random bytes: {e}")))?;
    Ok(bytes)
}

/// Short lowercase alphanumeric public identifier.
pub fn generate_slug() -> Result<String, SiteError> {
    let mut slug = String::with_capacity(SLUG_LEN);
    while slug.len() < SLUG_LEN {
        for byte in random_bytes(SLUG_LEN * 2)? {
            if byte < SLUG_BYTE_CUTOFF {
                slug.push(SLUG_ALPHABET[byte as usize % SLUG_ALPHABET.len()] as char);
                if slug.len() == SLUG_LEN {
                    break;
                }
            }
        }
    }
    Ok(slug)
}

/// Secret granting edit rights, 32 hex characters.
pub fn generate_edit_credential() -> Result<String, SiteError> {
    let mut hex = hex::encode(random_bytes(EDIT_CREDENTIAL_LEN.div_ceil(2))?);
    hex.truncate(EDIT_CREDENTIAL_LEN);
    Ok(hex)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn slug_shape() {
        let slug = generate_slug().unwrap();
        assert_eq!(slug.len(), SLUG_LEN);
        assert!(
            slug.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn credential_shape() {
        let credential = generate_edit_credential().unwrap();
        assert_eq!(credential.len(), EDIT_CREDENTIAL_LEN);
        assert!(credential.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_values_do_not_repeat() {
        let slugs: HashSet<_> = (0..500).map(|_| generate_slug().unwrap()).collect();
        assert_eq!(slugs.len(), 500);
        let credentials: HashSet<_> = (0..500)
            .map(|_| generate_edit_credential().unwrap())
            .collect();
        assert_eq!(credentials.len(), 500);
    }
}

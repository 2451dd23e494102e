use crate::error::AppResult;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Salted, irreversible hash suitable for storage.
pub fn hash_password(plaintext: &str, cost: u32) -> AppResult<String> {
    Ok(bcrypt::hash(plaintext, cost)?)
}

/// Constant-time verification via bcrypt. Malformed hashes never verify.
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    bcrypt::verify(plaintext, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_and_is_salted() {
        let a = hash_password("correct horse", 4).unwrap();
        let b = hash_password("correct horse", 4).unwrap();
        assert_ne!(a, b);
        assert!(verify_password("correct horse", &a));
        assert!(verify_password("correct horse", &b));
        assert!(!verify_password("wrong horse", &a));
    }

    #[test]
    fn garbage_hash_does_not_verify() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}

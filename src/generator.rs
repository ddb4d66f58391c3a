//! Token generation for new short URLs

use uuid::Uuid;

/// Characters a token is made of
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a generated token
const TOKEN_LENGTH: usize = 8;

/// Source of tokens for new short URLs
pub trait Generator: Send + Sync + 'static {
    /// Generate a new token
    ///
    /// Uniqueness is not guaranteed, storage has the final say
    fn generate_id(&self) -> String;
}

/// Random alphanumeric tokens
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomGenerator;

impl Generator for RandomGenerator {
    fn generate_id(&self) -> String {
        // the low bits of a v4 UUID are all random
        let mut value = Uuid::new_v4().as_u128();
        let base = ALPHABET.len() as u128;

        let mut token = String::with_capacity(TOKEN_LENGTH);
        for _ in 0..TOKEN_LENGTH {
            #[allow(clippy::cast_possible_truncation)] // always smaller than the alphabet
            let index = (value % base) as usize;
            token.push(char::from(ALPHABET[index]));
            value /= base;
        }

        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_generator() {
        let generator = RandomGenerator;

        let token = generator.generate_id();
        assert_eq!(TOKEN_LENGTH, token.len());
        assert!(token.chars().all(|ch| ch.is_ascii_alphanumeric()));

        assert_ne!(token, generator.generate_id());
    }
}

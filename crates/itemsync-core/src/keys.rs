//! Key generation for locally created items.

use rand::Rng;

use crate::types::ItemKey;

/// Characters allowed in generated keys. Excludes look-alikes (0, 1, O).
pub const KEY_ALPHABET: &[u8] = b"23456789ABCDEFGHIJKLMNPQRSTUVWXYZ";

/// Length of generated keys.
pub const KEY_LENGTH: usize = 8;

/// Mints identities for records that have none yet.
///
/// Keys must be unique within the target library.
pub trait KeyGenerator: Send + Sync {
    /// Produce a fresh key.
    fn new_key(&self) -> ItemKey;
}

/// Random keys drawn from [`KEY_ALPHABET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomKeyGenerator;

impl KeyGenerator for RandomKeyGenerator {
    fn new_key(&self) -> ItemKey {
        let mut rng = rand::thread_rng();
        let key: String = (0..KEY_LENGTH)
            .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
            .collect();
        ItemKey::from_alphabet(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_keys_use_alphabet() {
        let generator = RandomKeyGenerator;
        for _ in 0..100 {
            let key = generator.new_key();
            assert_eq!(key.as_str().len(), KEY_LENGTH);
            assert!(key.as_str().bytes().all(|b| KEY_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_random_keys_are_distinct() {
        let generator = RandomKeyGenerator;
        let keys: HashSet<ItemKey> = (0..1000).map(|_| generator.new_key()).collect();
        assert_eq!(keys.len(), 1000);
    }
}

use std::cmp::Ordering;

/// Comparison strategy for the fixed-size keys stored in a B+Tree.
pub trait KeyManager: Send + Sync {
    /// Encoded size of every key, in bytes.
    fn key_size(&self) -> usize;

    /// Orders two encoded keys. Both are exactly `key_size()` bytes.
    fn compare_keys(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Signed little-endian integer keys, 4 or 8 bytes wide.
#[derive(Debug, Clone, Copy)]
pub struct IntegerKeyManager {
    key_size: usize,
}

impl IntegerKeyManager {
    pub fn new_i32() -> Self {
        Self { key_size: 4 }
    }

    pub fn new_i64() -> Self {
        Self { key_size: 8 }
    }

    /// Encodes `value` at this manager's width. Values outside the i32 range
    /// are truncated for 4-byte keys.
    pub fn encode(&self, value: i64) -> Vec<u8> {
        match self.key_size {
            4 => (value as i32).to_le_bytes().to_vec(),
            _ => value.to_le_bytes().to_vec(),
        }
    }

    pub fn decode(&self, key: &[u8]) -> i64 {
        match self.key_size {
            4 => i32::from_le_bytes([key[0], key[1], key[2], key[3]]) as i64,
            _ => i64::from_le_bytes([
                key[0], key[1], key[2], key[3], key[4], key[5], key[6], key[7],
            ]),
        }
    }
}

impl KeyManager for IntegerKeyManager {
    fn key_size(&self) -> usize {
        self.key_size
    }

    fn compare_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.decode(a).cmp(&self.decode(b))
    }
}

/// Fixed-size keys compared as raw bytes.
#[derive(Debug, Clone, Copy)]
pub struct BytewiseKeyManager {
    key_size: usize,
}

impl BytewiseKeyManager {
    pub fn new(key_size: usize) -> Self {
        assert!(key_size > 0, "key size must be positive");
        Self { key_size }
    }
}

impl KeyManager for BytewiseKeyManager {
    fn key_size(&self) -> usize {
        self.key_size
    }

    fn compare_keys(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_keys_are_signed() {
        let km = IntegerKeyManager::new_i32();
        let neg = km.encode(-5);
        let pos = km.encode(3);

        assert_eq!(km.key_size(), 4);
        assert_eq!(km.compare_keys(&neg, &pos), Ordering::Less);
        assert_eq!(km.compare_keys(&pos, &pos), Ordering::Equal);
        assert_eq!(km.decode(&neg), -5);
    }

    #[test]
    fn test_i64_keys() {
        let km = IntegerKeyManager::new_i64();
        let big = km.encode(1 << 40);
        let small = km.encode(7);

        assert_eq!(big.len(), 8);
        assert_eq!(km.compare_keys(&big, &small), Ordering::Greater);
        assert_eq!(km.decode(&big), 1 << 40);
    }

    #[test]
    fn test_bytewise_keys() {
        let km = BytewiseKeyManager::new(3);
        assert_eq!(km.compare_keys(b"abc", b"abd"), Ordering::Less);
        assert_eq!(km.compare_keys(b"b\0\0", b"abc"), Ordering::Greater);
    }
}

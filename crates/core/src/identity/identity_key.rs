/// Mints keys for identities seen for the first time.
pub trait IdentityKeyGenerator: Send {
    fn next_key(&mut self) -> String;
}

/// Random UUID v4 keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidKeyGenerator;

impl IdentityKeyGenerator for UuidKeyGenerator {
    fn next_key(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// `<prefix>-1`, `<prefix>-2`, ... in order.
#[derive(Clone, Debug)]
pub struct SequentialKeyGenerator {
    prefix: String,
    next: u64,
}

impl SequentialKeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl IdentityKeyGenerator for SequentialKeyGenerator {
    fn next_key(&mut self) -> String {
        let key = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_keys_are_unique() {
        let mut keys = UuidKeyGenerator;
        let a = keys.next_key();
        let b = keys.next_key();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_sequential_keys_count_up() {
        let mut keys = SequentialKeyGenerator::new("person");
        assert_eq!(keys.next_key(), "person-1");
        assert_eq!(keys.next_key(), "person-2");
    }
}

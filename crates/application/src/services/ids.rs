//! Random identifier generation.

use domain::IdGenerator;
use uuid::Uuid;

/// [`IdGenerator`] backed by random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4Generator;

impl IdGenerator for UuidV4Generator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_v4_uuids() {
        let generator = UuidV4Generator;
        let a = generator.generate();
        let b = generator.generate();

        assert_ne!(a, b);
        let parsed = Uuid::parse_str(&a).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(a.len(), 36);
    }
}

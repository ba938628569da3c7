//! Injectable UUID generator (§6.2).
//!
//! Used by the Façade for device identity; the core Ring Store and Dedup
//! Buffer have no on-disk usage of UUIDs. Kept as a trait so call sites never
//! depend on the concrete generator crate.

/// Generates RFC 4122 v4 UUID strings (hex with dashes at positions 8,13,18,23).
pub trait UuidGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Default generator backed by the `uuid` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultUuidGenerator;

impl UuidGenerator for DefaultUuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_uuid_has_v4_dash_positions() {
        let id = DefaultUuidGenerator.generate();
        assert_eq!(id.len(), 36);
        assert_eq!(id.as_bytes()[8], b'-');
        assert_eq!(id.as_bytes()[13], b'-');
        assert_eq!(id.as_bytes()[18], b'-');
        assert_eq!(id.as_bytes()[23], b'-');
    }

    #[test]
    fn generated_uuids_are_distinct() {
        let a = DefaultUuidGenerator.generate();
        let b = DefaultUuidGenerator.generate();
        assert_ne!(a, b);
    }
}

//! UUIDv7 utilities for time-ordered identifiers.
//!
//! Every entity id in munidesk is a UUIDv7 (RFC 9562): the embedded
//! millisecond timestamp gives audit-friendly natural ordering and keeps
//! btree inserts append-mostly.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Whether a UUID is version 7.
pub fn is_v7(id: &Uuid) -> bool {
    id.get_version_num() == 7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_is_version_7() {
        assert!(is_v7(&new_v7()));
    }

    #[test]
    fn test_new_v7_is_time_ordered() {
        let a = new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_v7();
        assert!(a < b);
    }
}

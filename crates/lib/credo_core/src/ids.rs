// Record identifiers are UUIDv7 generated app-side so refresh-token and
// password-reset rows sort by issuance time without a separate index.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// New record id in the textual form stored on domain models.
pub fn new_id() -> String {
    uuidv7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuidv7_is_valid() {
        let id = uuidv7();
        assert_eq!(id.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn new_ids_sort_by_creation() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert!(b >= a);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}

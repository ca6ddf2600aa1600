//! Static allow-list of trusted devices

use crate::identity::DeviceIdentity;

/// Fixed ordered set of trusted device identities
///
/// Built once from configuration and read-only afterwards, so it needs no
/// locking. Membership is serial-aware: an entry without a serial trusts
/// every unit of that vendor/product pair, an entry with one trusts exactly
/// that unit.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    entries: Vec<DeviceIdentity>,
}

impl AllowList {
    /// Create an allow-list from configured entries
    pub fn new(entries: Vec<DeviceIdentity>) -> Self {
        Self { entries }
    }

    /// Check whether any entry matches the given identity
    pub fn is_allowed(&self, identity: &DeviceIdentity) -> bool {
        self.entries.iter().any(|entry| entry.matches(identity))
    }

    /// Number of configured entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are configured (every device is unauthorized)
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<DeviceIdentity> for AllowList {
    fn from_iter<I: IntoIterator<Item = DeviceIdentity>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_allows_nothing() {
        let list = AllowList::default();
        assert!(!list.is_allowed(&DeviceIdentity::new(0x0781, 0x5571)));
    }

    #[test]
    fn test_membership_by_ids() {
        let list = AllowList::new(vec![DeviceIdentity::new(0x0781, 0x5571)]);
        assert!(list.is_allowed(&DeviceIdentity::new(0x0781, 0x5571)));
        assert!(!list.is_allowed(&DeviceIdentity::new(0x1111, 0x2222)));
    }

    #[test]
    fn test_serial_bound_entry() {
        let list = AllowList::new(vec![
            DeviceIdentity::new(0x0781, 0x5571).with_serial("TRUSTED"),
        ]);
        assert!(list.is_allowed(&DeviceIdentity::new(0x0781, 0x5571).with_serial("TRUSTED")));
        // Same model, different unit: not trusted.
        assert!(!list.is_allowed(&DeviceIdentity::new(0x0781, 0x5571).with_serial("OTHER")));
        assert!(!list.is_allowed(&DeviceIdentity::new(0x0781, 0x5571)));
    }

    #[test]
    fn test_entry_without_serial_matches_any_unit() {
        let list = AllowList::new(vec![DeviceIdentity::new(0x0781, 0x5571)]);
        assert!(list.is_allowed(&DeviceIdentity::new(0x0781, 0x5571).with_serial("ANY")));
    }
}

//! Lazy, once-per-table backend provisioning.

use dashmap::DashSet;
use tracing::info;

use mirror_search::{Mapping, SearchBackend, SearchError};
use mirror_types::IndexLocation;

/// Remembers which tables have been provisioned.
///
/// Provisioning is check-then-create: the first use of a table runs
/// `create_index` and `create_mapping`, both idempotent, and records the
/// table. Concurrent first uses may both provision; that is harmless.
#[derive(Debug, Default)]
pub struct Provisioner {
    provisioned: DashSet<String>,
    mapping: Mapping,
}

impl Provisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision `location` unless already done.
    pub fn ensure(
        &self,
        backend: &dyn SearchBackend,
        location: &IndexLocation,
    ) -> Result<(), SearchError> {
        let key = location.cache_key();
        if self.provisioned.contains(&key) {
            return Ok(());
        }

        backend.create_index(location)?;
        backend.create_mapping(location, &self.mapping)?;
        self.provisioned.insert(key);

        info!(location = %location, "Provisioned index table");
        Ok(())
    }

    pub fn is_provisioned(&self, location: &IndexLocation) -> bool {
        self.provisioned.contains(&location.cache_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_search::TantivyBackend;

    #[test]
    fn test_ensure_provisions_once() {
        let backend = TantivyBackend::in_ram();
        let provisioner = Provisioner::new();
        let location = IndexLocation::new("site", "pages");

        assert!(!provisioner.is_provisioned(&location));
        provisioner.ensure(&backend, &location).unwrap();
        provisioner.ensure(&backend, &location).unwrap();
        assert!(provisioner.is_provisioned(&location));
        assert_eq!(backend.num_docs(&location).unwrap(), 0);
    }
}

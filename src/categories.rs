//! Category labels contributed by saved pins.

use log::info;

use crate::persistence::{validate_categories, LoadStatus, PersistenceGateway, StorageKey};

/// Deduplicated category labels in insertion order.
pub struct CategoryRegistry {
    categories: Vec<String>,
    gateway: PersistenceGateway,
}

impl CategoryRegistry {
    pub fn new(gateway: PersistenceGateway) -> Self {
        Self {
            categories: Vec::new(),
            gateway,
        }
    }

    pub fn hydrate(&mut self) -> LoadStatus {
        let outcome = self
            .gateway
            .load::<String>(StorageKey::Categories, validate_categories);

        // Collapse any duplicates a hand-edited payload may carry.
        self.categories.clear();
        for category in outcome.items {
            if !category.is_empty() && !self.categories.contains(&category) {
                self.categories.push(category);
            }
        }
        outcome.status
    }

    /// Add a label (exact, case-sensitive match). Returns `false` if it was
    /// already present.
    ///
    /// The empty string is not a category: a pin saved without one must not
    /// put a blank entry in the picker, so `""` is ignored and returns `false`.
    pub fn add(&mut self, category: &str) -> bool {
        if category.is_empty() || self.contains(category) {
            return false;
        }
        self.categories.push(category.to_string());
        self.gateway.save(StorageKey::Categories, &self.categories);
        info!("[Categories] Added '{}'", category);
        true
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    pub fn list(&self) -> &[String] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Empty the set and the stored key.
    pub fn clear(&mut self) {
        self.categories.clear();
        self.gateway.clear(StorageKey::Categories);
        info!("[Categories] Cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> (CategoryRegistry, MemoryStore, PersistenceGateway) {
        let memory = MemoryStore::new();
        let gateway = PersistenceGateway::new(Box::new(memory.clone())).unwrap();
        (CategoryRegistry::new(gateway.clone()), memory, gateway)
    }

    #[test]
    fn test_add_is_idempotent() {
        let (mut categories, memory, gateway) = registry();
        assert!(categories.add("Trailhead"));
        assert!(!categories.add("Trailhead"));
        gateway.flush();

        assert_eq!(categories.len(), 1);
        assert_eq!(memory.write_count("categories"), 1);
    }

    #[test]
    fn test_case_sensitive_and_ordered() {
        let (mut categories, _, _) = registry();
        categories.add("water");
        categories.add("Water");
        categories.add("Camp");
        assert_eq!(categories.list(), ["water", "Water", "Camp"]);
    }

    #[test]
    fn test_empty_label_ignored() {
        let (mut categories, memory, gateway) = registry();
        assert!(!categories.add(""));
        gateway.flush();
        assert!(categories.is_empty());
        assert_eq!(memory.write_count("categories"), 0);

        // A pin saved without a category leaves the registry untouched.
        let mut pins = crate::pins::PinCapture::new(gateway.clone(), &Default::default());
        pins.drop_pin(crate::GpsPoint::new(40.0, -105.0), chrono::Utc::now())
            .unwrap();
        let saved = pins.save(&mut categories).unwrap();
        assert_eq!(saved.category, "");
        assert!(categories.is_empty());
    }

    #[test]
    fn test_clear_removes_key() {
        let (mut categories, memory, gateway) = registry();
        categories.add("Camp");
        categories.clear();
        gateway.flush();

        assert!(categories.is_empty());
        assert!(memory.raw("categories").is_none());
    }

    #[test]
    fn test_hydrate_dedupes() {
        let (mut categories, memory, _) = registry();
        memory.seed("categories", r#"["Camp","Camp","Summit"]"#);
        assert_eq!(categories.hydrate(), LoadStatus::Loaded);
        assert_eq!(categories.list(), ["Camp", "Summit"]);
    }
}

//! Weapon Table
//!
//! Immutable id → definition mapping. A new document produces a new table;
//! the active one is swapped, never edited.

use std::collections::BTreeMap;

use crate::config::weapon::{default_weapons, WeaponDefinition};

/// Where the active table was obtained from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOrigin {
    /// Built-in default weapons.
    Defaults,
    /// Local snapshot from a previous run.
    Cache,
    /// Freshly fetched document.
    Remote,
    /// Nothing installed (a reload is fetching).
    Empty,
}

/// Lookup table keyed by lowercase weapon id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeaponTable {
    weapons: BTreeMap<String, WeaponDefinition>,
}

impl WeaponTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the built-in weapons.
    pub fn defaults() -> Self {
        default_weapons().into_iter().collect()
    }

    /// Insert a validated definition. A later definition with the same id
    /// replaces the earlier one.
    pub fn insert(&mut self, weapon: WeaponDefinition) {
        self.weapons.insert(weapon.id.clone(), weapon);
    }

    /// Case-insensitive lookup.
    pub fn get(&self, id: &str) -> Option<&WeaponDefinition> {
        self.weapons.get(&id.trim().to_lowercase())
    }

    /// Number of weapons.
    pub fn len(&self) -> usize {
        self.weapons.len()
    }

    /// True if the table holds no weapons.
    pub fn is_empty(&self) -> bool {
        self.weapons.is_empty()
    }

    /// Weapons in id order.
    pub fn iter(&self) -> impl Iterator<Item = &WeaponDefinition> {
        self.weapons.values()
    }

    /// Copy of the underlying map.
    pub fn to_map(&self) -> BTreeMap<String, WeaponDefinition> {
        self.weapons.clone()
    }
}

impl FromIterator<WeaponDefinition> for WeaponTable {
    fn from_iter<I: IntoIterator<Item = WeaponDefinition>>(iter: I) -> Self {
        let mut table = Self::new();
        for weapon in iter {
            table.insert(weapon);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = WeaponTable::defaults();
        assert_eq!(table.get("SHOTGUN").unwrap().damage, 40.0);
        assert!(table.get("laser").is_none());
    }

    #[test]
    fn test_later_insert_wins() {
        let table: WeaponTable = vec![
            WeaponDefinition::new("rifle", 25.0, 0.2).unwrap(),
            WeaponDefinition::new("RIFLE", 30.0, 0.3).unwrap(),
        ]
        .into_iter()
        .collect();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("rifle").unwrap().damage, 30.0);
    }
}

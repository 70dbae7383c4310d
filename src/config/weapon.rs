//! Weapon Definitions
//!
//! The validated record a remote config document is made of, plus the
//! built-in defaults used when no document is available.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Id of the generic weapon returned for unrecognized lookups.
pub const GENERIC_WEAPON_ID: &str = "default";

/// Built-in weapons: (id, damage, cooldown).
const BUILT_IN: [(&str, f32, f32); 4] = [
    ("pistol", 10.0, 0.5),
    ("rifle", 25.0, 0.2),
    ("shotgun", 40.0, 1.0),
    ("rocket", 100.0, 3.0),
];

/// Validation failures for a single weapon record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeaponError {
    /// Id is empty after trimming.
    #[error("weapon id is empty")]
    EmptyId,
    /// Damage is negative or not a finite number.
    #[error("weapon {id} has invalid damage: {damage}")]
    NegativeDamage {
        /// Offending weapon.
        id: String,
        /// Rejected value.
        damage: f32,
    },
    /// Cooldown is zero, negative or not a finite number.
    #[error("weapon {id} has invalid cooldown: {cooldown}")]
    InvalidCooldown {
        /// Offending weapon.
        id: String,
        /// Rejected value.
        cooldown: f32,
    },
}

/// One configurable combat item.
///
/// Instances built through [`WeaponDefinition::new`] always hold a
/// lowercase, non-empty id, finite non-negative damage and a finite
/// positive cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponDefinition {
    /// Lowercase weapon identifier.
    pub id: String,
    /// Damage per hit.
    pub damage: f32,
    /// Seconds between shots.
    pub cooldown: f32,
}

impl WeaponDefinition {
    /// Normalize the id and validate the record.
    pub fn new(id: &str, damage: f32, cooldown: f32) -> Result<Self, WeaponError> {
        let weapon = Self {
            id: id.trim().to_lowercase(),
            damage,
            cooldown,
        };
        weapon.validate()?;
        Ok(weapon)
    }

    /// Check the record against the table invariants.
    pub fn validate(&self) -> Result<(), WeaponError> {
        if self.id.trim().is_empty() {
            return Err(WeaponError::EmptyId);
        }
        if !self.damage.is_finite() || self.damage < 0.0 {
            return Err(WeaponError::NegativeDamage {
                id: self.id.clone(),
                damage: self.damage,
            });
        }
        if !self.cooldown.is_finite() || self.cooldown <= 0.0 {
            return Err(WeaponError::InvalidCooldown {
                id: self.id.clone(),
                cooldown: self.cooldown,
            });
        }
        Ok(())
    }

    fn built_in(id: &str, damage: f32, cooldown: f32) -> Self {
        Self {
            id: id.to_string(),
            damage,
            cooldown,
        }
    }
}

impl fmt::Display for WeaponDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Weapon: {}, Damage: {}, Cooldown: {}]",
            self.id, self.damage, self.cooldown
        )
    }
}

/// The four built-in weapons, in declaration order.
pub fn default_weapons() -> Vec<WeaponDefinition> {
    BUILT_IN
        .iter()
        .map(|(id, damage, cooldown)| WeaponDefinition::built_in(id, *damage, *cooldown))
        .collect()
}

/// Deterministic stand-in for a weapon missing from the active table.
///
/// Recognized ids map to their built-in entry; anything else gets the
/// generic weapon.
pub fn fallback_for(id: &str) -> WeaponDefinition {
    let id = id.trim().to_lowercase();
    BUILT_IN
        .iter()
        .find(|(name, _, _)| *name == id)
        .map(|(name, damage, cooldown)| WeaponDefinition::built_in(name, *damage, *cooldown))
        .unwrap_or_else(|| WeaponDefinition::built_in(GENERIC_WEAPON_ID, 5.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_id() {
        let weapon = WeaponDefinition::new("  Rifle ", 25.0, 0.2).unwrap();
        assert_eq!(weapon.id, "rifle");
    }

    #[test]
    fn test_validation_rules() {
        assert_eq!(WeaponDefinition::new("  ", 1.0, 1.0), Err(WeaponError::EmptyId));
        assert!(matches!(
            WeaponDefinition::new("bad", -5.0, 1.0),
            Err(WeaponError::NegativeDamage { .. })
        ));
        assert!(matches!(
            WeaponDefinition::new("bad", 5.0, 0.0),
            Err(WeaponError::InvalidCooldown { .. })
        ));
        assert!(matches!(
            WeaponDefinition::new("bad", f32::NAN, 1.0),
            Err(WeaponError::NegativeDamage { .. })
        ));
        // Zero damage is allowed
        assert!(WeaponDefinition::new("training", 0.0, 1.0).is_ok());
    }

    #[test]
    fn test_fallback_for_known_and_unknown() {
        let rocket = fallback_for("ROCKET");
        assert_eq!(rocket.id, "rocket");
        assert_eq!(rocket.damage, 100.0);
        assert_eq!(rocket.cooldown, 3.0);

        let unknown = fallback_for("UNKNOWN");
        assert_eq!(unknown.id, GENERIC_WEAPON_ID);
        assert_eq!(unknown.damage, 5.0);
        assert_eq!(unknown.cooldown, 1.0);
        assert_eq!(fallback_for("UNKNOWN"), unknown);
    }

    #[test]
    fn test_default_weapons_are_valid() {
        let weapons = default_weapons();
        assert_eq!(weapons.len(), 4);
        assert!(weapons.iter().all(|w| w.validate().is_ok()));
    }

    #[test]
    fn test_display() {
        let weapon = WeaponDefinition::new("pistol", 10.0, 0.5).unwrap();
        assert_eq!(weapon.to_string(), "[Weapon: pistol, Damage: 10, Cooldown: 0.5]");
    }
}

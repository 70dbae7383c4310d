//! Document Parsing
//!
//! Format selection and the JSON weapon reader. CSV lives in
//! [`crate::config::csv`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::csv::parse_weapon_csv;
use crate::config::table::WeaponTable;
use crate::config::weapon::{WeaponDefinition, WeaponError};

/// Errors that reject a whole document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Fewer than two non-empty lines.
    #[error("CSV has no data rows")]
    NoDataRows,
    /// Header lacks an id, damage or cooldown column.
    #[error("CSV missing required columns (id, damage, cooldown)")]
    MissingColumns,
    /// JSON document holds no weapon array or an empty one.
    #[error("JSON has no weapons data")]
    NoWeapons,
    /// JSON could not be decoded.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    /// Every record failed validation.
    #[error("no valid weapon records")]
    NoValidRecords,
}

/// Wire format of the remote document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    /// Comma-separated sheet with a header row.
    #[default]
    Csv,
    /// `{"weapons": [...]}` object.
    Json,
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFormat::Csv => write!(f, "csv"),
            ConfigFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for ConfigFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ConfigFormat::Csv),
            "json" => Ok(ConfigFormat::Json),
            other => Err(format!("unknown config format: {}", other)),
        }
    }
}

/// Weapon record as it appears in JSON documents and snapshots.
///
/// Missing numeric fields decode as zero and are then rejected by
/// validation. Records are decoded one at a time, so a mistyped record
/// never fails the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawWeapon {
    /// Weapon id, any case.
    pub id: String,
    /// Damage per hit.
    pub damage: f32,
    /// Seconds between shots.
    pub cooldown: f32,
}

impl RawWeapon {
    /// Decode one record of a document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Validate into a definition.
    pub fn into_definition(self) -> Result<WeaponDefinition, WeaponError> {
        WeaponDefinition::new(&self.id, self.damage, self.cooldown)
    }
}

#[derive(Debug, Deserialize)]
struct WeaponDocument {
    #[serde(default)]
    weapons: Option<Vec<serde_json::Value>>,
}

/// Parse a `{"weapons": [...]}` document, dropping invalid records.
pub fn parse_weapon_json(text: &str) -> Result<WeaponTable, ParseError> {
    let document: WeaponDocument = serde_json::from_str(text)?;
    let records = match document.weapons {
        Some(records) if !records.is_empty() => records,
        _ => return Err(ParseError::NoWeapons),
    };

    let mut table = WeaponTable::new();
    for value in records {
        let record = match RawWeapon::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                warn!(target: "remote_config", "Skipping malformed record: {}", e);
                continue;
            }
        };
        match record.into_definition() {
            Ok(weapon) => {
                debug!(target: "remote_config", "Parsed: {}", weapon);
                table.insert(weapon);
            }
            Err(e) => warn!(target: "remote_config", "Skipping record: {}", e),
        }
    }

    if table.is_empty() {
        return Err(ParseError::NoValidRecords);
    }
    Ok(table)
}

/// Parse a document in the given format.
pub fn parse_document(format: ConfigFormat, text: &str) -> Result<WeaponTable, ParseError> {
    match format {
        ConfigFormat::Csv => parse_weapon_csv(text),
        ConfigFormat::Json => parse_weapon_json(text),
    }
}

//! CSV Parsing
//!
//! Two readers live here:
//!
//! - [`parse_weapon_csv`]: the lenient weapon-sheet reader. Columns are
//!   located by substring match on the header, so spreadsheet exports with
//!   headers like `WeaponID,BaseDamage,CooldownSec` work unchanged.
//! - [`parse_records`]: a general reader with quoted fields, used for CSV
//!   documents that need embedded commas or quotes.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::parser::ParseError;
use crate::config::table::WeaponTable;
use crate::config::weapon::WeaponDefinition;

/// Field delimiter.
pub const DELIMITER: char = ',';

/// Split a document into its non-empty lines.
fn lines(text: &str) -> Vec<&str> {
    text.split(['\n', '\r']).filter(|line| !line.is_empty()).collect()
}

/// Positions of the required weapon columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Column holding the weapon id.
    pub id: usize,
    /// Column holding damage.
    pub damage: usize,
    /// Column holding cooldown.
    pub cooldown: usize,
}

impl ColumnLayout {
    /// Locate the required columns in a header row.
    ///
    /// Each cell is trimmed and lowercased, then tested for `id`, else
    /// `damage`, else `cooldown`. The first substring hit claims the cell and
    /// a later cell matching the same substring takes the column over.
    pub fn detect(header: &str) -> Result<Self, ParseError> {
        let (mut id, mut damage, mut cooldown) = (None, None, None);

        for (index, cell) in header.split(DELIMITER).enumerate() {
            let cell = cell.trim().to_lowercase();
            if cell.contains("id") {
                id = Some(index);
            } else if cell.contains("damage") {
                damage = Some(index);
            } else if cell.contains("cooldown") {
                cooldown = Some(index);
            }
        }

        match (id, damage, cooldown) {
            (Some(id), Some(damage), Some(cooldown)) => Ok(Self { id, damage, cooldown }),
            _ => Err(ParseError::MissingColumns),
        }
    }

    /// Highest column index a data row must reach.
    pub fn max_index(&self) -> usize {
        self.id.max(self.damage).max(self.cooldown)
    }
}

/// Parse a weapon sheet into a table.
///
/// Rows that are too short, carry unparseable numbers or fail validation
/// are skipped. The parse fails if no row survives.
pub fn parse_weapon_csv(text: &str) -> Result<WeaponTable, ParseError> {
    let lines = lines(text);
    if lines.len() < 2 {
        return Err(ParseError::NoDataRows);
    }

    let layout = ColumnLayout::detect(lines[0])?;
    let mut table = WeaponTable::new();

    for (row, line) in lines.iter().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }

        let values: Vec<&str> = line.split(DELIMITER).collect();
        if values.len() <= layout.max_index() {
            debug!(target: "remote_config", "Skipping short row {}", row);
            continue;
        }

        let id = values[layout.id].trim();
        let damage = match values[layout.damage].trim().parse::<f32>() {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "remote_config", "Failed to parse row {}: damage: {}", row, e);
                continue;
            }
        };
        let cooldown = match values[layout.cooldown].trim().parse::<f32>() {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "remote_config", "Failed to parse row {}: cooldown: {}", row, e);
                continue;
            }
        };

        match WeaponDefinition::new(id, damage, cooldown) {
            Ok(weapon) => {
                debug!(target: "remote_config", "Parsed: {}", weapon);
                table.insert(weapon);
            }
            Err(e) => warn!(target: "remote_config", "Skipping row {}: {}", row, e),
        }
    }

    if table.is_empty() {
        return Err(ParseError::NoValidRecords);
    }
    Ok(table)
}

/// Split one line into fields, honouring double-quoted fields.
///
/// Inside quotes the delimiter is literal and `""` stands for one `"`.
pub fn split_quoted_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' && current.is_empty() {
            in_quotes = true;
        } else if c == DELIMITER {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);

    fields
}

/// Parse a general CSV document into header → value rows.
///
/// Rows whose field count differs from the header's are dropped. Keys and
/// values are trimmed.
pub fn parse_records(text: &str) -> Vec<BTreeMap<String, String>> {
    let lines = lines(text);
    if lines.len() < 2 {
        return Vec::new();
    }

    let headers: Vec<String> = split_quoted_line(lines[0])
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();

    lines[1..]
        .iter()
        .map(|line| split_quoted_line(line))
        .filter(|values| values.len() == headers.len())
        .map(|values| {
            headers
                .iter()
                .cloned()
                .zip(values.into_iter().map(|v| v.trim().to_string()))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_spreadsheet_headers() {
        let csv = "WeaponID,BaseDamage,CooldownSec\nrifle,25,0.2\nrocket,100,3.0\nbad,-5,1.0";
        let table = parse_weapon_csv(csv).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("rifle").unwrap().damage, 25.0);
        assert_eq!(table.get("rifle").unwrap().cooldown, 0.2);
        assert_eq!(table.get("rocket").unwrap().damage, 100.0);
        assert_eq!(table.get("rocket").unwrap().cooldown, 3.0);
        assert!(table.get("bad").is_none());
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let csv = "id,damage,cooldown\r\n\r\nPistol,10,0.5\r\n   \r\nShotgun,40,1\r\n";
        let table = parse_weapon_csv(csv).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get("pistol").is_some());
    }

    #[test]
    fn test_missing_column_aborts() {
        let result = parse_weapon_csv("id,damage\nrifle,25");
        assert!(matches!(result, Err(ParseError::MissingColumns)));
    }

    #[test]
    fn test_no_data_rows() {
        let result = parse_weapon_csv("id,damage,cooldown\n");
        assert!(matches!(result, Err(ParseError::NoDataRows)));
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let csv = "id,damage,cooldown,notes\n\
                   short,1\n\
                   nan_row,abc,1.0\n\
                   zero_cd,10,0\n\
                   ,10,1\n\
                   ok,10,1,extra";
        let table = parse_weapon_csv(csv).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get("ok").is_some());
    }

    #[test]
    fn test_all_rows_invalid_fails() {
        let result = parse_weapon_csv("id,damage,cooldown\nbad,-1,1\nworse,1,-1");
        assert!(matches!(result, Err(ParseError::NoValidRecords)));
    }

    #[test]
    fn test_substring_quirk_is_preserved() {
        // "iddamage" contains "id" first, so it is the id column and the
        // damage column is the later one.
        let layout = ColumnLayout::detect("iddamage,hitdamage,cooldown").unwrap();
        assert_eq!(layout, ColumnLayout { id: 0, damage: 1, cooldown: 2 });

        // A later id-like cell takes the id column over.
        let layout = ColumnLayout::detect("id,damage,cooldown,guid").unwrap();
        assert_eq!(layout.id, 3);
    }

    #[test]
    fn test_split_quoted_line() {
        assert_eq!(
            split_quoted_line(r#"rifle,"Heavy, long","He said ""hi""",3"#),
            vec!["rifle", "Heavy, long", r#"He said "hi""#, "3"]
        );
        assert_eq!(split_quoted_line("a,,b"), vec!["a", "", "b"]);
        assert_eq!(split_quoted_line(""), vec![""]);
    }

    #[test]
    fn test_parse_records() {
        let csv = "name , description\nrifle,\"fast, accurate\"\nbroken\nrocket, slow ";
        let rows = parse_records(csv);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "rifle");
        assert_eq!(rows[0]["description"], "fast, accurate");
        assert_eq!(rows[1]["description"], "slow");
    }

    proptest! {
        #[test]
        fn prop_header_order_does_not_matter(
            order in Just(vec![0usize, 1, 2]).prop_shuffle(),
            rows in proptest::collection::btree_map("[a-z]{1,8}", (0u16..500, 1u16..100), 1..8),
        ) {
            let names = ["Weapon_ID", "DamageValue", "cooldown_s"];
            let header: Vec<&str> = order.iter().map(|&i| names[i]).collect();
            let mut csv = header.join(",");

            for (id, (damage, cooldown)) in &rows {
                let cooldown = f32::from(*cooldown) / 10.0;
                let fields = [id.clone(), damage.to_string(), cooldown.to_string()];
                let line: Vec<&str> = order.iter().map(|&i| fields[i].as_str()).collect();
                csv.push('\n');
                csv.push_str(&line.join(","));
            }

            let table = parse_weapon_csv(&csv).unwrap();
            prop_assert_eq!(table.len(), rows.len());
            for (id, (damage, cooldown)) in &rows {
                let weapon = table.get(id).unwrap();
                prop_assert_eq!(weapon.damage, f32::from(*damage));
                prop_assert_eq!(weapon.cooldown, f32::from(*cooldown) / 10.0);
            }
        }
    }
}

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{format_datetime, parse_datetime};
use crate::types::RegisterRecord;

/// One CSV row of a register export. The payload travels as its JSON text
/// so the export stays a flat table an operator can open in a spreadsheet.
#[derive(Serialize, Deserialize)]
struct ExportRow {
    id: String,
    payload: String,
    created_at: String,
    updated_at: String,
}

pub fn write_export(path: &Path, records: &[RegisterRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    for record in records {
        writer.serialize(ExportRow {
            id: record.id.clone(),
            payload: record.payload.to_string(),
            created_at: format_datetime(&record.created_at),
            updated_at: format_datetime(&record.updated_at),
        })?;
    }

    writer.flush()?;
    Ok(())
}

/// Reads an export back into records. Exports are the hand-editable
/// fallback restore source, so a payload cell that is not valid JSON is
/// kept as a plain string value instead of failing the whole restore.
pub fn read_export(path: &Path) -> Result<Vec<RegisterRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();

    for row in reader.deserialize() {
        let row: ExportRow = row.map_err(|e| {
            Error::ArchiveMalformed(format!("unreadable export row in {}: {e}", path.display()))
        })?;

        let payload = serde_json::from_str(&row.payload)
            .unwrap_or_else(|_| serde_json::Value::String(row.payload.clone()));

        records.push(RegisterRecord {
            id: row.id,
            payload,
            created_at: parse_datetime(&row.created_at),
            updated_at: parse_datetime(&row.updated_at),
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_export_round_trip_preserves_nested_payloads() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("suppliers.csv");

        let records = vec![
            RegisterRecord::new(serde_json::json!({"name": "Acme", "tier": 1})),
            RegisterRecord::new(serde_json::json!({
                "name": "Umbrella, Inc.",
                "contacts": [{"email": "a@example.com"}, {"email": "b@example.com"}],
                "notes": "uses \"quotes\" and, commas",
            })),
        ];

        write_export(&path, &records).unwrap();
        let restored = read_export(&path).unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].id, records[0].id);
        assert_eq!(restored[0].payload, records[0].payload);
        assert_eq!(restored[1].payload, records[1].payload);
    }

    #[test]
    fn test_hand_edited_payload_kept_as_string() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("issues.csv");

        std::fs::write(
            &path,
            "id,payload,created_at,updated_at\n\
             row-1,not json at all,2024-01-01T00:00:00Z,2024-01-01T00:00:00Z\n",
        )
        .unwrap();

        let records = read_export(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].payload,
            serde_json::Value::String("not json at all".to_string())
        );
    }

    #[test]
    fn test_empty_export_is_valid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("events.csv");

        write_export(&path, &[]).unwrap();
        assert!(read_export(&path).unwrap().is_empty());
    }
}

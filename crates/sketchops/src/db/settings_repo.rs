//! Operator-managed runtime settings (`platform_settings`, single row).

use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};
use crate::models::SourceKind;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformSettingsRow {
    pub sketch_operator_prompt: Option<String>,
    pub evidence_processor_prompt: Option<String>,
    pub ai_provider: Option<String>,
    /// JSON object keyed by provider name.
    pub ai_provider_keys: Option<String>,
    /// JSON object, e.g. `{"model_name": "gemini-1.5-pro-002"}`.
    pub ai_model_settings: Option<String>,
    pub updated_at: Option<String>,
}

impl PlatformSettingsRow {
    /// The prompt template for a source, if one is configured and non-blank.
    pub fn prompt_for(&self, source: SourceKind) -> Option<&str> {
        let raw = match source {
            SourceKind::Chat => self.sketch_operator_prompt.as_deref(),
            SourceKind::Evidence => self.evidence_processor_prompt.as_deref(),
        };
        raw.filter(|p| !p.trim().is_empty())
    }
}

pub fn load(db: &Database) -> Result<Option<PlatformSettingsRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT sketch_operator_prompt, evidence_processor_prompt, ai_provider,
                        ai_provider_keys, ai_model_settings, updated_at
                 FROM platform_settings ORDER BY id LIMIT 1",
                [],
                |row| {
                    Ok(PlatformSettingsRow {
                        sketch_operator_prompt: row.get(0)?,
                        evidence_processor_prompt: row.get(1)?,
                        ai_provider: row.get(2)?,
                        ai_provider_keys: row.get(3)?,
                        ai_model_settings: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?)
    })
}

/// Replaces the settings row. Used by provisioning and tests; the chat
/// platform's admin UI normally owns this table.
pub fn store(db: &Database, row: &PlatformSettingsRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO platform_settings
                (id, sketch_operator_prompt, evidence_processor_prompt, ai_provider,
                 ai_provider_keys, ai_model_settings, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
             ON CONFLICT(id) DO UPDATE SET
                sketch_operator_prompt = excluded.sketch_operator_prompt,
                evidence_processor_prompt = excluded.evidence_processor_prompt,
                ai_provider = excluded.ai_provider,
                ai_provider_keys = excluded.ai_provider_keys,
                ai_model_settings = excluded.ai_model_settings,
                updated_at = excluded.updated_at",
            params![
                row.sketch_operator_prompt,
                row.evidence_processor_prompt,
                row.ai_provider,
                row.ai_provider_keys,
                row.ai_model_settings,
            ],
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_empty() {
        let db = Database::open_in_memory().unwrap();
        assert!(load(&db).unwrap().is_none());
    }

    #[test]
    fn test_store_and_reload() {
        let db = Database::open_in_memory().unwrap();
        let row = PlatformSettingsRow {
            evidence_processor_prompt: Some("Extract events".into()),
            ai_provider: Some("azure".into()),
            ..Default::default()
        };
        store(&db, &row).unwrap();
        store(&db, &row).unwrap();

        let loaded = load(&db).unwrap().unwrap();
        assert_eq!(loaded.ai_provider.as_deref(), Some("azure"));
        assert!(loaded.updated_at.is_some());
        assert_eq!(loaded.prompt_for(SourceKind::Evidence), Some("Extract events"));
        assert_eq!(loaded.prompt_for(SourceKind::Chat), None);
    }

    #[test]
    fn test_blank_prompt_counts_as_missing() {
        let row = PlatformSettingsRow {
            sketch_operator_prompt: Some("   \n".into()),
            ..Default::default()
        };
        assert_eq!(row.prompt_for(SourceKind::Chat), None);
    }
}

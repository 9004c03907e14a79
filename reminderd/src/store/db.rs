use std::path::Path;
use anyhow::{Context, Result};
use rusqlite::{Connection, params, OptionalExtension};
use shared::types::{Medication, MedicationId};

const ID_HIGH_WATER: &str = "id_high_water";

/// The medication collection. Saved and loaded whole; the list order is kept.
pub struct MedicationDb {
    conn: Connection,
}

impl MedicationDb {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS medications (
                medication_id INTEGER PRIMARY KEY,
                position      INTEGER NOT NULL,
                name          TEXT NOT NULL,
                dosage        TEXT NOT NULL,
                frequency     TEXT NOT NULL,
                start_date    TEXT NOT NULL,
                start_time    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Load the whole collection in list order
    pub fn load_all(&self) -> Result<Vec<Medication>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT medication_id, name, dosage, frequency, start_date, start_time
                 FROM medications ORDER BY position"
            )
            .context("Failed to prepare query")?;

        let medications = stmt
            .query_map([], Self::row_to_medication)
            .context("Failed to query medications")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect medications")?;

        Ok(medications)
    }

    /// Replace the stored collection. Either every row is written or none is.
    pub fn save_all(&self, medications: &[Medication]) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        tx.execute("DELETE FROM medications", [])
            .context("Failed to clear medications")?;

        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO medications (
                        medication_id, position, name, dosage, frequency, start_date, start_time
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                )
                .context("Failed to prepare insert")?;

            for (position, m) in medications.iter().enumerate() {
                insert
                    .execute(params![
                        m.medication_id,
                        position as i64,
                        &m.name,
                        &m.dosage,
                        &m.frequency,
                        &m.start_date,
                        &m.start_time,
                    ])
                    .with_context(|| format!("Failed to insert medication {}", m.medication_id))?;
            }
        }

        if let Some(max_id) = medications.iter().map(|m| m.medication_id).max() {
            tx.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = max(value, excluded.value)",
                params![ID_HIGH_WATER, max_id],
            )
            .context("Failed to record id high-water mark")?;
        }

        tx.commit().context("Failed to commit medications")?;
        Ok(())
    }

    /// Largest medication id ever saved, 0 if none. Survives deletions.
    pub fn high_water(&self) -> Result<MedicationId> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![ID_HIGH_WATER],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query id high-water mark")?;

        Ok(value.unwrap_or(0))
    }

    /// Get a single medication by id
    pub fn get(&self, medication_id: MedicationId) -> Result<Option<Medication>> {
        let result = self
            .conn
            .query_row(
                "SELECT medication_id, name, dosage, frequency, start_date, start_time
                 FROM medications WHERE medication_id = ?1",
                params![medication_id],
                Self::row_to_medication,
            )
            .optional()
            .context("Failed to query medication")?;

        Ok(result)
    }

    fn row_to_medication(row: &rusqlite::Row) -> Result<Medication, rusqlite::Error> {
        Ok(Medication {
            medication_id: row.get(0)?,
            name: row.get(1)?,
            dosage: row.get(2)?,
            frequency: row.get(3)?,
            start_date: row.get(4)?,
            start_time: row.get(5)?,
        })
    }
}

//! SQLite persistence layer.
//!
//! Single store for evolved organisms and run metrics. Uses schema
//! versioning with migrations to evolve safely over time.

use rusqlite::{params, Connection, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::evolution::{MetricSink, OrganismRepository};
use crate::organism::Organism;

/// Default database path
pub const DEFAULT_DB_PATH: &str = "data/chronos.db";

/// Initialize the database, creating parent directories and applying any
/// pending migrations
pub fn init_database(path: &str) -> Result<Arc<Mutex<Connection>>> {
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let conn = Connection::open(path)?;

    // WAL mode for concurrency; busy_timeout prevents "database is locked"
    // errors under contention
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 30000;",
    )?;

    run_migrations(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// Apply all migrations newer than the recorded schema version
fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now')),
            description TEXT
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (version, description, sql) in get_migrations() {
        if version > current_version {
            log::info!("Applying migration {}: {}", version, description);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (version, description) VALUES (?1, ?2)",
                params![version, description],
            )?;
        }
    }

    Ok(())
}

fn get_migrations() -> Vec<(i32, &'static str, &'static str)> {
    vec![(
        1,
        "Initial schema",
        include_str!("../migrations/001_initial_schema.sql"),
    )]
}

/// SQLite-backed organism store and metric sink
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(init_database(path)?))
    }

    /// Load a stored organism by id
    pub fn load(&self, id: &str) -> Result<Option<Organism>> {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut stmt = conn.prepare(
            "SELECT id, name, version, qubits, depth, circuit, phi_target,
                    lambda_phi, generation, parent_id, fitness
             FROM organisms WHERE id = ?1",
        )?;

        let mut rows = stmt.query(params![id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let circuit_json: String = row.get(5)?;
        let circuit = serde_json::from_str(&circuit_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Some(Organism {
            id: row.get(0)?,
            name: row.get(1)?,
            version: row.get(2)?,
            qubits: row.get::<_, i64>(3)? as usize,
            depth: row.get::<_, i64>(4)? as usize,
            circuit,
            phi_target: row.get(6)?,
            lambda_phi: row.get(7)?,
            generation: row.get(8)?,
            parent_id: row.get(9)?,
            fitness: row.get(10)?,
        }))
    }

    /// Best stored organisms ordered by fitness
    pub fn top_organisms(&self, limit: usize) -> Result<Vec<(String, String, Option<f64>)>> {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut stmt = conn.prepare(
            "SELECT id, name, fitness FROM organisms
             ORDER BY fitness DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        rows.collect()
    }
}

impl OrganismRepository for SqliteStore {
    fn upsert(&self, organism: &Organism) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let circuit_json = serde_json::to_string(&organism.circuit)?;
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };

        conn.execute(
            "INSERT INTO organisms (
                id, name, version, qubits, depth, circuit,
                phi_target, lambda_phi, generation, parent_id, fitness
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                version = excluded.version,
                fitness = excluded.fitness,
                updated_at = datetime('now')",
            params![
                organism.id,
                organism.name,
                organism.version,
                organism.qubits as i64,
                organism.depth as i64,
                circuit_json,
                organism.phi_target,
                organism.lambda_phi,
                organism.generation,
                organism.parent_id,
                organism.fitness,
            ],
        )?;
        Ok(())
    }
}

impl MetricSink for SqliteStore {
    fn record(
        &self,
        name: &str,
        value: f64,
        tags: &serde_json::Value,
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        conn.execute(
            "INSERT INTO metrics (name, value, tags) VALUES (?1, ?2, ?3)",
            params![name, value, tags.to_string()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organism::OrganismParams;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = SqliteStore::open(db_path.to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn test_organism(name: &str, seed: u64) -> Organism {
        let mut rng = StdRng::seed_from_u64(seed);
        Organism::new(OrganismParams::new(name, 5, 8), &mut rng).unwrap()
    }

    #[test]
    fn test_init_creates_tables() {
        let (_dir, store) = test_store();
        let conn = store.conn.lock().unwrap();

        for table in ["schema_version", "organisms", "metrics"] {
            let count: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let path = db_path.to_str().unwrap();

        init_database(path).unwrap();
        let conn = init_database(path).unwrap();

        let version: i32 = conn
            .lock()
            .unwrap()
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_upsert_and_load_round_trip() {
        let (_dir, store) = test_store();
        let organism = test_organism("CHRONOS_DB", 99);

        store.upsert(&organism).unwrap();
        let loaded = store.load(&organism.id).unwrap().unwrap();

        assert_eq!(loaded.id, organism.id);
        assert_eq!(loaded.qubits, organism.qubits);
        assert_eq!(loaded.circuit, organism.circuit);
        assert_eq!(loaded.fitness, organism.fitness);
    }

    #[test]
    fn test_upsert_updates_fitness_in_place() {
        let (_dir, store) = test_store();
        let mut organism = test_organism("CHRONOS_DB", 99);

        store.upsert(&organism).unwrap();
        organism.fitness = Some(72.5);
        organism.version += 1;
        store.upsert(&organism).unwrap();

        let loaded = store.load(&organism.id).unwrap().unwrap();
        assert_eq!(loaded.fitness, Some(72.5));
        assert_eq!(loaded.version, 2);

        let conn = store.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM organisms", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let (_dir, store) = test_store();
        assert!(store.load("org_missing").unwrap().is_none());
    }

    #[test]
    fn test_metric_record() {
        let (_dir, store) = test_store();
        let tags = serde_json::json!({"generation": 3});
        store.record("best_phi", 4.2, &tags).unwrap();

        let conn = store.conn.lock().unwrap();
        let (value, stored_tags): (f64, String) = conn
            .query_row(
                "SELECT value, tags FROM metrics WHERE name = 'best_phi'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(value, 4.2);
        assert!(stored_tags.contains("\"generation\":3"));
    }

    #[test]
    fn test_top_organisms_ordered_by_fitness() {
        let (_dir, store) = test_store();

        let mut first = test_organism("CHRONOS_A", 1);
        first.fitness = Some(40.0);
        let mut second = test_organism("CHRONOS_B", 2);
        second.fitness = Some(90.0);
        store.upsert(&first).unwrap();
        store.upsert(&second).unwrap();

        let top = store.top_organisms(2).unwrap();
        assert_eq!(top[0].1, "CHRONOS_B");
        assert_eq!(top[1].1, "CHRONOS_A");
    }
}

use rusqlite::Connection;

use mastery_core::MasteryError;

pub fn init_db(conn: &Connection) -> Result<(), MasteryError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS attempts (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            student TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            topic TEXT NOT NULL,
            accuracy REAL NOT NULL,
            level TEXT NOT NULL,
            correct_count INTEGER NOT NULL,
            total_count INTEGER NOT NULL,
            CHECK(correct_count >= 0 AND total_count >= correct_count)
        );

        CREATE INDEX IF NOT EXISTS idx_attempts_student_topic ON attempts(student, topic);

        -- Lines sent to the memory collaborator
        CREATE TABLE IF NOT EXISTS annotations (
            id TEXT PRIMARY KEY,
            subject TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_annotations_subject ON annotations(subject);
        ",
    )
    .map_err(|e| MasteryError::Storage(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_db() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        // Second call should be idempotent
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_tables_exist() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .map(|r| r.unwrap())
                .collect()
        };

        assert!(tables.contains(&"attempts".to_string()));
        assert!(tables.contains(&"annotations".to_string()));
    }

    #[test]
    fn test_rejects_impossible_counts() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO attempts (student, timestamp, topic, accuracy, level, correct_count, total_count)
             VALUES ('a', '2024-01-01T00:00:00Z', 't', 100.0, 'Advanced', 3, 2)",
            [],
        );
        assert!(result.is_err());
    }
}

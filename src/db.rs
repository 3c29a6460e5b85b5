use std::path::Path;

use rusqlite::Connection;

use crate::record::ExtractedRecord;

pub fn connect(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS interviews (
            record_number  INTEGER PRIMARY KEY,
            title          TEXT NOT NULL,
            interview_text TEXT NOT NULL,
            url            TEXT NOT NULL,
            saved_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )
}

/// Replace the table contents with `records`. Each run starts cold, so rows
/// from a previous run are not kept.
pub fn save_records(conn: &Connection, records: &[ExtractedRecord]) -> rusqlite::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM interviews", [])?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO interviews (record_number, title, interview_text, url)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for r in records {
            count += stmt.execute(rusqlite::params![r.id as i64, r.title, r.dialogue, r.url])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

#[cfg(test)]
pub fn fetch_records(conn: &Connection) -> rusqlite::Result<Vec<ExtractedRecord>> {
    let mut stmt = conn.prepare(
        "SELECT record_number, title, interview_text, url FROM interviews ORDER BY record_number",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ExtractedRecord {
                id: row.get::<_, i64>(0)? as u64,
                title: row.get(1)?,
                dialogue: row.get(2)?,
                url: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct Stats {
    pub rows: usize,
    pub first_id: Option<i64>,
    pub last_id: Option<i64>,
    pub avg_chars: Option<f64>,
}

pub fn get_stats(conn: &Connection) -> rusqlite::Result<Stats> {
    conn.query_row(
        "SELECT COUNT(*), MIN(record_number), MAX(record_number), AVG(LENGTH(interview_text))
         FROM interviews",
        [],
        |r| {
            Ok(Stats {
                rows: r.get(0)?,
                first_id: r.get(1)?,
                last_id: r.get(2)?,
                avg_chars: r.get(3)?,
            })
        },
    )
}

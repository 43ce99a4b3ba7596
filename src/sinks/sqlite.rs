use crate::errors::{NepseError, Result};
use crate::models::table::Table;
use crate::sinks::Sink;
use async_trait::async_trait;
use log::info;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;

/// Relational sink backed by SQLite. Every persist replaces the destination
/// relation's full contents (drop, recreate, insert inside one transaction),
/// the relational realization of the engine's replace semantics.
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// SQL identifier quoting; column names come straight from scraped headers
/// and may contain spaces or punctuation.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl Sink for SqliteSink {
    async fn replace_all(&mut self, name: &str, table: &Table) -> Result<()> {
        if table.width() == 0 {
            return Err(NepseError::DataError(format!(
                "refusing to persist table {} with an empty header",
                name
            )));
        }

        let quoted_name = quote_ident(name);
        let columns: Vec<String> = table
            .header
            .iter()
            .map(|col| format!("{} TEXT", quote_ident(col)))
            .collect();
        let placeholders: Vec<String> =
            (1..=table.width()).map(|i| format!("?{}", i)).collect();

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {};\nCREATE TABLE {} ({});",
            quoted_name,
            quoted_name,
            columns.join(", ")
        ))?;

        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} VALUES ({})",
                quoted_name,
                placeholders.join(", ")
            ))?;
            for row in &table.rows {
                insert.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;

        info!("Saved {} rows to relation {}", table.row_count(), name);
        Ok(())
    }

    async fn load_all(&mut self, name: &str) -> Result<Option<Table>> {
        if !self.table_exists(name)? {
            return Ok(None);
        }

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {}", quote_ident(name)))?;
        let header: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();
        let width = header.len();

        let mut rows = Vec::new();
        let mut query = stmt.query([])?;
        while let Some(row) = query.next()? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(row.get::<_, String>(i)?);
            }
            rows.push(cells);
        }

        Ok(Some(Table::with_rows(header, rows)))
    }
}

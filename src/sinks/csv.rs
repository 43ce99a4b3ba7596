use crate::errors::Result;
use crate::models::table::Table;
use crate::sinks::Sink;
use async_trait::async_trait;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

/// File sink: one `<name>.csv` per table, header row first, full-file
/// overwrite on every persist.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir: PathBuf = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", name))
    }

    fn write_table(path: &Path, tmp_path: &Path, table: &Table) -> Result<()> {
        let mut writer = csv::Writer::from_path(tmp_path)?;
        writer.write_record(&table.header)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        drop(writer);

        // Rename over the previous copy so readers never observe a torn file.
        fs::rename(tmp_path, path)?;
        Ok(())
    }
}

#[async_trait]
impl Sink for CsvSink {
    async fn replace_all(&mut self, name: &str, table: &Table) -> Result<()> {
        let path = self.table_path(name);
        let tmp_path = self.dir.join(format!("{}.csv.tmp", name));

        Self::write_table(&path, &tmp_path, table)?;
        info!(
            "Saved {} rows to {}",
            table.row_count(),
            path.display()
        );
        Ok(())
    }

    async fn load_all(&mut self, name: &str) -> Result<Option<Table>> {
        let path = self.table_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let header: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(Some(Table::with_rows(header, rows)))
    }
}

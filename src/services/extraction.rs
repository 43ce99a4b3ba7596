use crate::checkpoint::CheckpointStore;
use crate::errors::Result;
use crate::models::table::{ExtractionResult, ExtractionStatus, PageCursor, Table};
use crate::scrapers::base::{PageSource, PaginationDriver};
use crate::sinks::Sink;
use chrono::Utc;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 抽取引擎：驱动分页表格直到耗尽，并支持断点续传。
///
/// Per page: read rows, validate their shape against the header, append to
/// the accumulator, persist the whole accumulator to the sink, record the
/// page in the checkpoint store, then advance. The persist-then-checkpoint
/// ordering is the core invariant: the durable copy is always an unbroken
/// prefix of the final table, and the checkpoint never points past saved
/// data. Recovery is by re-invocation, not in-process retry: a fresh run
/// resumes from the checkpointed page (re-reading that page, so rows from it
/// may be duplicated; an accepted at-least-once tradeoff).
pub struct ExtractionEngine<C: CheckpointStore> {
    checkpoints: C,
    stop: Option<Arc<AtomicBool>>,
}

impl<C: CheckpointStore> ExtractionEngine<C> {
    pub fn new(checkpoints: C) -> Self {
        Self {
            checkpoints,
            stop: None,
        }
    }

    /// Install a flag a supervisor can set to stop the run between pages
    /// without corrupting the checkpoint.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Run one extraction to its terminal state.
    ///
    /// Returns `Ok` with status [`ExtractionStatus::Complete`] (table
    /// exhausted, checkpoint cleared) or [`ExtractionStatus::Partial`]
    /// (navigation failed or stop requested, checkpoint intact). Fatal
    /// conditions — a structural fault in the source or a failed persist —
    /// are the `Err` arm, after a best-effort final persist of whatever was
    /// accumulated.
    pub async fn extract<S, K>(
        &self,
        job_name: &str,
        source: &mut S,
        sink: &mut K,
    ) -> Result<ExtractionResult>
    where
        S: PageSource + PaginationDriver + Send,
        K: Sink + Send,
    {
        let started_at = Utc::now();
        let checkpointed = self.checkpoints.load(job_name)?;
        let mut cursor = PageCursor::first();

        // Header is read once per run, from the first page visited; it is
        // assumed stable across pages for the whole extraction.
        let header = source.header().await?;

        // On resume, seed the accumulator with the sink's durable copy so the
        // incremental full-table persists keep pages before the checkpoint.
        let mut table = match checkpointed {
            Some(page) => {
                info!("Job {}: resuming from checkpointed page {}", job_name, page);
                match sink.load_all(job_name).await? {
                    Some(existing) if existing.header == header => existing,
                    Some(_) => {
                        warn!(
                            "Job {}: persisted header no longer matches, restarting accumulation",
                            job_name
                        );
                        Table::new(header.clone())
                    }
                    None => Table::new(header.clone()),
                }
            }
            None => Table::new(header.clone()),
        };

        // Fast-forward navigation to the checkpointed page. Data on the pages
        // skipped here is already in the accumulator.
        if let Some(target) = checkpointed {
            while cursor.index() < target {
                if !source.has_next().await {
                    warn!(
                        "Job {}: table exhausted at page {} before checkpointed page {}",
                        job_name,
                        cursor.index(),
                        target
                    );
                    return Ok(self.finish(
                        job_name, started_at, 0, 0, cursor,
                        ExtractionStatus::Partial, table,
                    ));
                }
                if let Err(e) = source.advance().await {
                    warn!(
                        "Job {}: navigation failed while seeking page {}: {}",
                        job_name, target, e
                    );
                    return Ok(self.finish(
                        job_name, started_at, 0, 0, cursor,
                        ExtractionStatus::Partial, table,
                    ));
                }
                cursor.advance();
            }
        }

        let width = table.width();
        let mut pages_visited = 0u32;
        let mut skipped_rows = 0usize;

        let status = loop {
            let rows = match source.rows().await {
                Ok(rows) => rows,
                Err(e) => {
                    // Structural fault mid-run is fatal; keep what we have.
                    if let Err(pe) = sink.replace_all(job_name, &table).await {
                        warn!("Job {}: best-effort final persist failed: {}", job_name, pe);
                    }
                    return Err(e);
                }
            };

            for row in rows {
                if row.len() != width {
                    warn!(
                        "Job {} page {}: skipping row with {} cells, expected {}",
                        job_name,
                        cursor.index(),
                        row.len(),
                        width
                    );
                    skipped_rows += 1;
                    continue;
                }
                table.push_row(row);
            }
            pages_visited += 1;

            // Persist before checkpointing, never the reverse.
            sink.replace_all(job_name, &table).await?;
            self.checkpoints.save(job_name, cursor.index())?;
            info!(
                "Job {}: persisted through page {} ({} rows)",
                job_name,
                cursor.index(),
                table.row_count()
            );

            if self.stop_requested() {
                info!(
                    "Job {}: stop requested, ending after page {}",
                    job_name,
                    cursor.index()
                );
                break ExtractionStatus::Partial;
            }

            if !source.has_next().await {
                self.checkpoints.clear(job_name)?;
                break ExtractionStatus::Complete;
            }

            match source.advance().await {
                Ok(()) => cursor.advance(),
                Err(e) => {
                    warn!(
                        "Job {}: navigation failed after page {}: {}",
                        job_name,
                        cursor.index(),
                        e
                    );
                    break ExtractionStatus::Partial;
                }
            }
        };

        Ok(self.finish(
            job_name,
            started_at,
            pages_visited,
            skipped_rows,
            cursor,
            status,
            table,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        job_name: &str,
        started_at: chrono::DateTime<Utc>,
        pages_visited: u32,
        skipped_rows: usize,
        cursor: PageCursor,
        status: ExtractionStatus,
        table: Table,
    ) -> ExtractionResult {
        info!(
            "Job {}: {:?} after page {}, {} rows, {} skipped",
            job_name,
            status,
            cursor.index(),
            table.row_count(),
            skipped_rows
        );
        ExtractionResult {
            job: job_name.to_string(),
            started_at,
            pages_visited,
            last_page: cursor.index(),
            skipped_rows,
            status,
            table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::FileCheckpointStore;
    use crate::errors::NepseError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::tempdir;

    /// In-memory paged table standing in for the browser/API collaborator.
    struct FakeSource {
        header: Vec<String>,
        pages: Vec<Vec<Vec<String>>>,
        /// 0-based index of the current page.
        page: usize,
        /// Fail `advance` when the 1-based target page equals this.
        fail_advance_to: Option<u32>,
        /// Simulate a structurally broken first page.
        missing_header: bool,
        /// 1-based page numbers read via `rows`, in order.
        reads: Vec<u32>,
    }

    impl FakeSource {
        fn new(header: &[&str], pages: Vec<Vec<Vec<String>>>) -> Self {
            Self {
                header: header.iter().map(|h| h.to_string()).collect(),
                pages,
                page: 0,
                fail_advance_to: None,
                missing_header: false,
                reads: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn header(&mut self) -> Result<Vec<String>> {
            if self.missing_header {
                return Err(NepseError::SourceStructure("no table on page".to_string()));
            }
            Ok(self.header.clone())
        }

        async fn rows(&mut self) -> Result<Vec<Vec<String>>> {
            self.reads.push(self.page as u32 + 1);
            Ok(self.pages[self.page].clone())
        }
    }

    #[async_trait]
    impl PaginationDriver for FakeSource {
        async fn has_next(&mut self) -> bool {
            self.page + 1 < self.pages.len()
        }

        async fn advance(&mut self) -> Result<()> {
            let target = self.page as u32 + 2;
            if self.fail_advance_to == Some(target) {
                return Err(NepseError::Navigation(format!(
                    "next control unreachable for page {}",
                    target
                )));
            }
            self.page += 1;
            Ok(())
        }
    }

    /// Recording sink: keeps every persisted snapshot so tests can check
    /// prefix durability, and can fail a chosen persist call.
    #[derive(Default)]
    struct MemorySink {
        tables: HashMap<String, Table>,
        snapshots: Vec<Vec<Vec<String>>>,
        persists: usize,
        fail_on_persist: Option<usize>,
    }

    #[async_trait]
    impl Sink for MemorySink {
        async fn replace_all(&mut self, name: &str, table: &Table) -> Result<()> {
            self.persists += 1;
            if self.fail_on_persist == Some(self.persists) {
                return Err(NepseError::DataError("sink unavailable".to_string()));
            }
            self.snapshots.push(table.rows.clone());
            self.tables.insert(name.to_string(), table.clone());
            Ok(())
        }

        async fn load_all(&mut self, name: &str) -> Result<Option<Table>> {
            Ok(self.tables.get(name).cloned())
        }
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    /// Header and pages from the reference scenario: two pages, three rows.
    fn market_pages() -> Vec<Vec<Vec<String>>> {
        vec![
            vec![row(&["A", "100", "1"]), row(&["B", "200", "-1"])],
            vec![row(&["C", "150", "0"])],
        ]
    }

    fn engine(dir: &std::path::Path) -> ExtractionEngine<FileCheckpointStore> {
        ExtractionEngine::new(FileCheckpointStore::new(dir).unwrap())
    }

    #[tokio::test]
    async fn exhaustion_completes_and_clears_checkpoint() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let mut source = FakeSource::new(&["Symbol", "LTP", "Change"], market_pages());
        let mut sink = MemorySink::default();

        let result = engine
            .extract("live_market", &mut source, &mut sink)
            .await
            .unwrap();

        assert_eq!(result.status, ExtractionStatus::Complete);
        assert_eq!(result.pages_visited, 2);
        assert_eq!(result.last_page, 2);
        assert_eq!(result.skipped_rows, 0);
        assert_eq!(
            result.table.rows,
            vec![
                row(&["A", "100", "1"]),
                row(&["B", "200", "-1"]),
                row(&["C", "150", "0"])
            ]
        );
        // Checkpoint deleted on terminal complete
        let checkpoints = FileCheckpointStore::new(dir.path()).unwrap();
        assert_eq!(checkpoints.load("live_market").unwrap(), None);
        // Sink holds exactly the final table
        assert_eq!(sink.tables["live_market"].rows, result.table.rows);
    }

    #[tokio::test]
    async fn every_persist_is_a_prefix_of_the_final_table() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let mut source = FakeSource::new(&["Symbol", "LTP", "Change"], market_pages());
        let mut sink = MemorySink::default();

        let result = engine
            .extract("live_market", &mut source, &mut sink)
            .await
            .unwrap();

        assert_eq!(sink.snapshots.len(), 2);
        for snapshot in &sink.snapshots {
            assert_eq!(&result.table.rows[..snapshot.len()], snapshot.as_slice());
        }
    }

    #[tokio::test]
    async fn navigation_failure_yields_partial_with_checkpoint_intact() {
        let five_pages: Vec<_> = (1..=5)
            .map(|p| vec![row(&[&format!("S{}", p), "1", "0"])])
            .collect();
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let mut source = FakeSource::new(&["Symbol", "LTP", "Change"], five_pages.clone());
        source.fail_advance_to = Some(3);
        let mut sink = MemorySink::default();

        let result = engine
            .extract("floorsheet", &mut source, &mut sink)
            .await
            .unwrap();

        assert_eq!(result.status, ExtractionStatus::Partial);
        assert_eq!(result.last_page, 2);
        let checkpoints = FileCheckpointStore::new(dir.path()).unwrap();
        assert_eq!(checkpoints.load("floorsheet").unwrap(), Some(2));
        // Sink contents are exactly pages 1-2 concatenated
        assert_eq!(
            sink.tables["floorsheet"].rows,
            vec![row(&["S1", "1", "0"]), row(&["S2", "1", "0"])]
        );
    }

    #[tokio::test]
    async fn resume_revisits_checkpointed_page_then_runs_to_completion() {
        let five_pages: Vec<Vec<Vec<String>>> = (1..=5)
            .map(|p| vec![row(&[&format!("S{}", p), "1", "0"])])
            .collect();
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let mut sink = MemorySink::default();

        // First run dies advancing off page 2.
        let mut source = FakeSource::new(&["Symbol", "LTP", "Change"], five_pages.clone());
        source.fail_advance_to = Some(3);
        let first = engine
            .extract("floorsheet", &mut source, &mut sink)
            .await
            .unwrap();
        assert_eq!(first.status, ExtractionStatus::Partial);

        // Second run: fresh session starting at page 1, same checkpoint + sink.
        let mut source = FakeSource::new(&["Symbol", "LTP", "Change"], five_pages);
        let second = engine
            .extract("floorsheet", &mut source, &mut sink)
            .await
            .unwrap();

        assert_eq!(second.status, ExtractionStatus::Complete);
        assert_eq!(second.last_page, 5);
        // Only the checkpointed page onward is re-read
        assert_eq!(source.reads, vec![2, 3, 4, 5]);
        // Page 2 is re-read on resume and its rows appear twice: the
        // documented at-least-once duplication, not data loss.
        assert_eq!(
            second.table.rows,
            vec![
                row(&["S1", "1", "0"]),
                row(&["S2", "1", "0"]),
                row(&["S2", "1", "0"]),
                row(&["S3", "1", "0"]),
                row(&["S4", "1", "0"]),
                row(&["S5", "1", "0"]),
            ]
        );
        let checkpoints = FileCheckpointStore::new(dir.path()).unwrap();
        assert_eq!(checkpoints.load("floorsheet").unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped_not_fatal() {
        let pages = vec![vec![
            row(&["A", "100", "1"]),
            row(&["BROKEN", "1"]),
            row(&["B", "200", "-1"]),
        ]];
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let mut source = FakeSource::new(&["Symbol", "LTP", "Change"], pages);
        let mut sink = MemorySink::default();

        let result = engine
            .extract("company", &mut source, &mut sink)
            .await
            .unwrap();

        assert_eq!(result.status, ExtractionStatus::Complete);
        assert_eq!(result.skipped_rows, 1);
        assert_eq!(
            result.table.rows,
            vec![row(&["A", "100", "1"]), row(&["B", "200", "-1"])]
        );
    }

    #[tokio::test]
    async fn failed_persist_propagates_and_checkpoint_does_not_outrun_it() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let mut source = FakeSource::new(&["Symbol", "LTP", "Change"], market_pages());
        let mut sink = MemorySink {
            fail_on_persist: Some(2),
            ..Default::default()
        };

        let err = engine
            .extract("live_market", &mut source, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, NepseError::DataError(_)));

        // Page 1 was persisted and checkpointed; page 2 was neither.
        let checkpoints = FileCheckpointStore::new(dir.path()).unwrap();
        assert_eq!(checkpoints.load("live_market").unwrap(), Some(1));
        assert_eq!(
            sink.tables["live_market"].rows,
            vec![row(&["A", "100", "1"]), row(&["B", "200", "-1"])]
        );
    }

    #[tokio::test]
    async fn structural_fault_on_first_page_fails_outright() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let mut source = FakeSource::new(&["Symbol"], vec![Vec::new()]);
        source.missing_header = true;
        let mut sink = MemorySink::default();

        let err = engine
            .extract("company", &mut source, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, NepseError::SourceStructure(_)));

        // Nothing checkpointed, nothing persisted
        let checkpoints = FileCheckpointStore::new(dir.path()).unwrap();
        assert_eq!(checkpoints.load("company").unwrap(), None);
        assert!(sink.tables.is_empty());
    }

    #[tokio::test]
    async fn stop_flag_ends_the_run_between_pages() {
        let dir = tempdir().unwrap();
        let flag = Arc::new(AtomicBool::new(true));
        let engine = engine(dir.path()).with_stop_flag(flag);
        let mut source = FakeSource::new(&["Symbol", "LTP", "Change"], market_pages());
        let mut sink = MemorySink::default();

        let result = engine
            .extract("live_market", &mut source, &mut sink)
            .await
            .unwrap();

        // Stopped after the first page: persisted, checkpointed, resumable.
        assert_eq!(result.status, ExtractionStatus::Partial);
        assert_eq!(result.pages_visited, 1);
        let checkpoints = FileCheckpointStore::new(dir.path()).unwrap();
        assert_eq!(checkpoints.load("live_market").unwrap(), Some(1));
    }
}

use nepse_datahub::checkpoint::FileCheckpointStore;
use nepse_datahub::config::Config;
use nepse_datahub::models::table::{ExtractionResult, Table};
use nepse_datahub::scrapers::base::{PageSource, PaginationDriver};
use nepse_datahub::scrapers::market::MarketScraper;
use nepse_datahub::scrapers::nepse::NepsePageSource;
use nepse_datahub::services::extraction::ExtractionEngine;
use nepse_datahub::sinks::{CsvSink, Sink, SqliteSink};

use chrono::NaiveDate;
use clap::{App, Arg};
use log::{error, info};
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logger
    env_logger::init();

    let app = App::new("NepseDataHub")
        .version("0.1.0")
        .author("NepseDataHub Team")
        .about("NEPSE market data extraction system");

    // 添加子命令
    let app = app
        .subcommand(
            App::new("extract")
                .about("Extract a paged table from the exchange")
                .arg(
                    Arg::new("job")
                        .short('j')
                        .long("job")
                        .value_name("JOB")
                        .help("Table to extract (company, indices, floorsheet)")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::new("data-dir")
                        .long("data-dir")
                        .value_name("DIR")
                        .help("Directory for CSV output and checkpoints")
                        .takes_value(true)
                        .default_value("data"),
                )
                .arg(
                    Arg::new("db")
                        .long("db")
                        .value_name("PATH")
                        .help("Persist to this SQLite database instead of CSV")
                        .takes_value(true),
                )
                .arg(
                    Arg::new("base-url")
                        .long("base-url")
                        .value_name("URL")
                        .help("Exchange API base URL")
                        .takes_value(true),
                )
                .arg(
                    Arg::new("page-size")
                        .long("page-size")
                        .value_name("N")
                        .help("Rows requested per page")
                        .takes_value(true)
                        .default_value("500"),
                ),
        )
        .subcommand(
            App::new("todays-prices")
                .about("Fetch the daily price export")
                .arg(
                    Arg::new("date")
                        .short('d')
                        .long("date")
                        .value_name("DATE")
                        .help("Trading date (YYYY-MM-DD, default today)")
                        .takes_value(true),
                )
                .arg(
                    Arg::new("data-dir")
                        .long("data-dir")
                        .value_name("DIR")
                        .takes_value(true)
                        .default_value("data"),
                )
                .arg(
                    Arg::new("db")
                        .long("db")
                        .value_name("PATH")
                        .takes_value(true),
                ),
        )
        .subcommand(
            App::new("summary")
                .about("Fetch the live market summary")
                .arg(
                    Arg::new("data-dir")
                        .long("data-dir")
                        .value_name("DIR")
                        .takes_value(true)
                        .default_value("data"),
                )
                .arg(
                    Arg::new("db")
                        .long("db")
                        .value_name("PATH")
                        .takes_value(true),
                ),
        )
        .subcommand(
            App::new("explore")
                .about("Preview a saved table")
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .value_name("NAME")
                        .help("Saved table name (e.g. floorsheet)")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::new("data-dir")
                        .long("data-dir")
                        .value_name("DIR")
                        .takes_value(true)
                        .default_value("data"),
                )
                .arg(
                    Arg::new("limit")
                        .short('l')
                        .long("limit")
                        .value_name("LIMIT")
                        .help("Limit the number of rows to display")
                        .takes_value(true)
                        .default_value("10"),
                ),
        );

    let matches = app.get_matches();

    if let Some(matches) = matches.subcommand_matches("extract") {
        let job = matches.value_of("job").unwrap();
        let data_dir = matches.value_of("data-dir").unwrap();
        let page_size = matches
            .value_of("page-size")
            .unwrap_or("500")
            .parse::<usize>()
            .unwrap_or(500);

        let mut config = Config::new()
            .with_data_dir(data_dir)
            .with_checkpoint_dir(data_dir)
            .with_page_size(page_size)
            .with_db_path(matches.value_of("db").map(|s| s.to_string()));
        if let Some(url) = matches.value_of("base-url") {
            config = config.with_base_url(url);
        }

        let mut source = match job {
            "company" => NepsePageSource::company(&config)?,
            "indices" => NepsePageSource::indices(&config)?,
            "floorsheet" => NepsePageSource::floorsheet(&config)?,
            _ => {
                error!("Unknown job: {}", job);
                return Err(format!("Unknown job: {}", job).into());
            }
        };

        // Ctrl-C stops the run between pages; the checkpoint stays valid.
        let stop = Arc::new(AtomicBool::new(false));
        {
            let stop = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Stop requested, finishing current page");
                    stop.store(true, Ordering::Relaxed);
                }
            });
        }

        let checkpoints = FileCheckpointStore::new(&config.checkpoint_dir)?;
        let engine = ExtractionEngine::new(checkpoints).with_stop_flag(stop);

        if let Some(db) = &config.db_path {
            let mut sink = SqliteSink::new(db)?;
            run_extract(&engine, job, &mut source, &mut sink).await?;
        } else {
            let mut sink = CsvSink::new(&config.data_dir)?;
            run_extract(&engine, job, &mut source, &mut sink).await?;
        }
    } else if let Some(matches) = matches.subcommand_matches("todays-prices") {
        let data_dir = matches.value_of("data-dir").unwrap();
        let config = Config::new()
            .with_data_dir(data_dir)
            .with_db_path(matches.value_of("db").map(|s| s.to_string()));

        let date = match matches.value_of("date") {
            Some(s) => Some(NaiveDate::parse_from_str(s, "%Y-%m-%d")?),
            None => None,
        };

        let mut scraper = MarketScraper::new(&config)?;
        let table = scraper.fetch_todays_prices(date).await?;
        save_table(&config, "todays_prices", &table).await?;
    } else if let Some(matches) = matches.subcommand_matches("summary") {
        let data_dir = matches.value_of("data-dir").unwrap();
        let config = Config::new()
            .with_data_dir(data_dir)
            .with_db_path(matches.value_of("db").map(|s| s.to_string()));

        let mut scraper = MarketScraper::new(&config)?;
        let table = scraper.fetch_market_summary().await?;
        save_table(&config, "market_summary", &table).await?;
    } else if let Some(matches) = matches.subcommand_matches("explore") {
        let name = matches.value_of("name").unwrap();
        let data_dir = matches.value_of("data-dir").unwrap();
        let limit = matches
            .value_of("limit")
            .unwrap_or("10")
            .parse::<usize>()
            .unwrap_or(10);

        let mut sink = CsvSink::new(data_dir)?;
        match sink.load_all(name).await? {
            Some(table) => {
                info!("Table {}: {} rows", name, table.row_count());
                info!("{}", table.header.join(" | "));
                info!("{:-<60}", "");
                for row in table.rows.iter().take(limit) {
                    info!("{}", row.join(" | "));
                }
                if table.row_count() > limit {
                    info!("... and {} more rows", table.row_count() - limit);
                }
            }
            None => {
                info!("No saved table named {} in {}", name, data_dir);
            }
        }
    } else {
        info!("No command specified. Use --help for usage information.");
    }

    Ok(())
}

/// Run one extraction and report its terminal state.
async fn run_extract<S, K>(
    engine: &ExtractionEngine<FileCheckpointStore>,
    job: &str,
    source: &mut S,
    sink: &mut K,
) -> Result<(), Box<dyn Error>>
where
    S: PageSource + PaginationDriver + Send,
    K: Sink + Send,
{
    match engine.extract(job, source, sink).await {
        Ok(result) => {
            report(&result);
            Ok(())
        }
        Err(e) => {
            error!("Job {} failed: {}", job, e);
            Err(e.into())
        }
    }
}

fn report(result: &ExtractionResult) {
    info!(
        "Job {} finished with status {:?}: last page {}, {} rows, {} skipped",
        result.job,
        result.status,
        result.last_page,
        result.table.row_count(),
        result.skipped_rows
    );
}

/// Persist a one-shot table to the configured destination.
async fn save_table(config: &Config, name: &str, table: &Table) -> Result<(), Box<dyn Error>> {
    if let Some(db) = &config.db_path {
        let mut sink = SqliteSink::new(db)?;
        sink.replace_all(name, table).await?;
    } else {
        let mut sink = CsvSink::new(&config.data_dir)?;
        sink.replace_all(name, table).await?;
    }
    Ok(())
}

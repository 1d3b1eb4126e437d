//! Query command
//!
//! Prints one page of aggregated rows as JSON lines, each with the backend
//! it came from.

use chrono::NaiveDate;
use clap::Args;
use serde_json::json;
use wastetrack_core::model::{DateRange, ListFilters, PageRequest, SortSpec, DEFAULT_PAGE_SIZE};
use wastetrack_engine::Latest;

use super::{open_console, BackendArgs};

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Table to list
    pub table: String,

    /// Establishment filter token (`primary-7`) or `all`; administrators only
    #[arg(long)]
    pub establishment: Option<String>,

    /// Sort as `column` or `column:asc|desc`
    #[arg(long)]
    pub sort: Option<String>,

    /// Zero-based page index
    #[arg(long, default_value_t = 0)]
    pub page: usize,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// First day included (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day included (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

pub async fn execute(backends: &BackendArgs, args: QueryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut console = open_console(backends, args.establishment.as_deref()).await?;

    let mut filters = ListFilters {
        date_range: DateRange::new(args.from, args.to),
        establishment_filter: console.state().list_filters().establishment_filter.clone(),
        ..ListFilters::default()
    };
    if let Some(sort) = &args.sort {
        let sort = SortSpec::parse(sort)?;
        filters.sort_key = Some(sort.column);
        filters.sort_direction = sort.direction;
    }
    console.apply_filters(filters).await?;

    let outcome = match console
        .list(&args.table, PageRequest::new(args.page, args.page_size))
        .await?
    {
        Latest::Current(outcome) => outcome,
        Latest::Superseded => return Ok(()),
    };

    for row in &outcome.rows {
        let line = json!({
            "backend": row.source_backend,
            "backend_name": row.source_display_name,
            "row": row.row,
        });
        println!("{}", line);
    }

    eprintln!(
        "{} rows shown, {} matching (request {})",
        outcome.rows.len(),
        outcome.total_count,
        outcome.request_id.as_str()
    );
    for backend in &outcome.failed_backends {
        eprintln!("warning: {} did not answer; its rows are missing", backend);
    }

    Ok(())
}

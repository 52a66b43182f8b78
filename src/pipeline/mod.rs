// src/pipeline/mod.rs

use std::{fs, path::PathBuf, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::config::Config;
use crate::fetch::{build_download_client, download_resource, FetchError, FetchReport};
use crate::geocode::{Coordinate, Geocode, GeocodeRequest, Geocoder};
use crate::output::{render_table, write_atomic};
use crate::process::{
    extract_grid, locate_fields, utils::clean_str, FieldIndex, ParseError, RawGrid,
};

pub mod throttle;

pub use throttle::{geocode_all, Pacing};

const SAMPLE_ADDRESSES: usize = 3;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetching source spreadsheet")]
    Fetch(#[from] FetchError),
    #[error("parsing source spreadsheet")]
    Parse(#[from] ParseError),
    #[error("spreadsheet parser task failed")]
    Join(#[from] tokio::task::JoinError),
    #[error("rendering output table")]
    Render(#[from] csv::Error),
    #[error("writing output table {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where a run is. Stages only move forward; `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Parsing,
    CollectingAddresses,
    Geocoding,
    Merging,
    Writing,
    Done,
    Failed,
}

fn enter(stage: Stage) {
    info!(stage = ?stage, "stage");
}

/// Rows ready to be written, with one coordinate slot per row.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub coords: Vec<Option<Coordinate>>,
    pub requested: usize,
}

impl EnrichedTable {
    pub fn hits(&self) -> usize {
        self.coords.iter().filter(|c| c.is_some()).count()
    }

    pub fn render(&self) -> csv::Result<String> {
        render_table(&self.headers, &self.rows, &self.coords)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub fetch: FetchReport,
    pub output: PathBuf,
    pub rows: usize,
    pub requested: usize,
    pub hits: usize,
}

/// Geocodable rows: a non-blank address once quotes are stripped. Rows
/// without one are never sent to the geocoder.
pub fn collect_requests(rows: &[Vec<String>], fields: FieldIndex) -> Vec<GeocodeRequest> {
    let Some(address_col) = fields.address else {
        return Vec::new();
    };

    let mut requests = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let address = row.get(address_col).map(|a| clean_str(a)).unwrap_or_default();
        let postcode = fields
            .postcode
            .and_then(|p| row.get(p))
            .map(|p| clean_str(p));

        if let Some(request) = GeocodeRequest::new(&address, postcode.as_deref(), i) {
            if requests.len() < SAMPLE_ADDRESSES {
                match &request.postcode {
                    Some(pc) => info!(
                        "sample address {}: {:?}, {:?}",
                        requests.len() + 1,
                        request.address,
                        pc
                    ),
                    None => info!(
                        "sample address {}: {:?} (no postcode, city only)",
                        requests.len() + 1,
                        request.address
                    ),
                }
            }
            requests.push(request);
        }
    }
    requests
}

/// Place each outcome on the row it came from.
pub fn merge_coordinates(
    row_count: usize,
    requests: &[GeocodeRequest],
    outcomes: &[Geocode],
) -> Vec<Option<Coordinate>> {
    let mut coords = vec![None; row_count];
    for (request, outcome) in requests.iter().zip(outcomes) {
        if let Some(slot) = coords.get_mut(request.origin_row) {
            *slot = outcome.coordinate();
        }
    }
    coords
}

/// Normalize, geocode and merge an extracted grid.
pub async fn enrich_grid(
    grid: RawGrid,
    geocoder: Arc<dyn Geocoder>,
    pacing: &Pacing,
) -> EnrichedTable {
    enter(Stage::CollectingAddresses);
    let fields = locate_fields(&grid.headers);
    info!(headers = ?grid.headers, "headers found");
    match fields.address {
        Some(i) => info!("address column at index {} ({:?})", i, grid.headers[i]),
        None => info!("no address column; nothing will be geocoded"),
    }
    if let Some(i) = fields.postcode {
        info!("postcode column at index {} ({:?})", i, grid.headers[i]);
    }

    let (headers, rows) = grid.normalized_rows();
    let requests = collect_requests(&rows, fields);
    info!(rows = rows.len(), addresses = requests.len(), "collected addresses");

    enter(Stage::Geocoding);
    let outcomes = geocode_all(geocoder, &requests, pacing).await;

    enter(Stage::Merging);
    let coords = merge_coordinates(rows.len(), &requests, &outcomes);

    EnrichedTable {
        headers,
        rows,
        coords,
        requested: requests.len(),
    }
}

/// Fetch, parse, geocode and write the output table.
#[instrument(level = "info", skip_all, fields(source = %config.source_url))]
pub async fn run(
    config: &Config,
    geocoder: Arc<dyn Geocoder>,
) -> Result<RunSummary, PipelineError> {
    let started = Instant::now();
    match run_stages(config, geocoder).await {
        Ok(summary) => {
            enter(Stage::Done);
            info!(
                rows = summary.rows,
                requested = summary.requested,
                hits = summary.hits,
                elapsed = ?started.elapsed(),
                "wrote {}",
                summary.output.display()
            );
            Ok(summary)
        }
        Err(e) => {
            error!(stage = ?Stage::Failed, error = %e, "run aborted");
            Err(e)
        }
    }
}

async fn run_stages(
    config: &Config,
    geocoder: Arc<dyn Geocoder>,
) -> Result<RunSummary, PipelineError> {
    fs::create_dir_all(&config.data_dir).map_err(FetchError::Io)?;
    let source = config.source_path();
    let output = config.output_path();

    enter(Stage::Fetching);
    let client = build_download_client(config.fetch_timeout)?;
    let fetch =
        download_resource(&client, &config.source_url, &source, config.max_redirects).await?;
    info!(
        final_url = %fetch.final_url,
        redirects = fetch.redirects,
        bytes = fetch.bytes,
        "source saved to {}",
        source.display()
    );

    enter(Stage::Parsing);
    let grid = tokio::task::spawn_blocking(move || extract_grid(source)).await??;

    let pacing = Pacing::from(&config.geocode);
    let table = enrich_grid(grid, geocoder, &pacing).await;

    enter(Stage::Writing);
    write_atomic(&output, &table.render()?).map_err(|source| PipelineError::Write {
        path: output.clone(),
        source,
    })?;

    Ok(RunSummary {
        fetch,
        output,
        rows: table.rows.len(),
        requested: table.requested,
        hits: table.hits(),
    })
}

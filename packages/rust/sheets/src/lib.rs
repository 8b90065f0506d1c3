//! Remote tabular data ingestion.
//!
//! Every league publishes up to three delimited-text datasets (roster,
//! merch requests, merch settings). Their URLs are listed in a master
//! registry dataset keyed by league name. This crate fetches and parses
//! them into domain records.
//!
//! Loader failures never propagate: a dataset that cannot be fetched or
//! parsed degrades to an empty result plus a warning.

mod parser;

use std::collections::HashMap;
use std::time::Duration;

use merchgen_shared::{
    EntityRecord, LeagueSources, MerchGenError, MerchRequest, MerchSettings, Result,
    SheetsConfig, normalize_hex_color,
};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

pub use parser::{HeaderMap, parse_delimited, parse_row, serialize_row};

/// Maximum number of redirects to follow (published sheets redirect once or twice).
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for dataset requests.
const USER_AGENT: &str = concat!("merchgen/", env!("CARGO_PKG_VERSION"));

/// Settings cells: row 3, columns G and H (1-based).
const SETTINGS_ROW: usize = 2;
const DESIGN_ID_COLUMN: usize = 6;
const PRODUCT_ID_COLUMN: usize = 7;

/// The request dataset carries a title row above its header.
const REQUESTS_HEADER_ROW: usize = 1;

// ---------------------------------------------------------------------------
// SheetSource
// ---------------------------------------------------------------------------

/// Fetches league datasets, caching master-registry lookups per league name
/// for the lifetime of the source (one run).
pub struct SheetSource {
    client: Client,
    config: SheetsConfig,
    league_cache: HashMap<String, LeagueSources>,
}

impl SheetSource {
    /// Create a new source with the given configuration.
    pub fn new(config: SheetsConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MerchGenError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            league_cache: HashMap::new(),
        })
    }

    /// Fetch a URL and parse it into rows.
    pub async fn fetch_rows(&self, url: &str) -> Result<Vec<Vec<String>>> {
        let text = fetch_text(&self.client, url).await?;
        Ok(parse_delimited(&text))
    }

    /// Look up the dataset URLs for `league` in the master registry.
    ///
    /// Successful lookups are cached for the lifetime of this source.
    #[instrument(skip(self))]
    pub async fn league_sources(&mut self, league: &str) -> Result<LeagueSources> {
        let league = league.trim();
        if league.is_empty() {
            return Err(MerchGenError::validation("league name is missing"));
        }

        if let Some(cached) = self.league_cache.get(league) {
            debug!("league sources served from cache");
            return Ok(cached.clone());
        }

        let rows = self.fetch_rows(&self.config.master_registry_url).await?;
        let sources = league_sources_from_rows(&rows, league)?;

        info!(roster = %sources.roster_url, "resolved league datasets");
        self.league_cache.insert(league.to_string(), sources.clone());
        Ok(sources)
    }

    /// Load the merch request list. Degrades to empty on any failure.
    #[instrument(skip(self))]
    pub async fn load_merch_requests(&mut self, league: &str) -> Vec<MerchRequest> {
        let result = async {
            let sources = self.league_sources(league).await?;
            let rows = self.fetch_rows(&sources.requests_url).await?;
            Ok::<_, MerchGenError>(requests_from_rows(&rows))
        }
        .await;

        match result {
            Ok(requests) => {
                info!(count = requests.len(), "loaded merch requests");
                requests
            }
            Err(e) => {
                warn!(error = %e, "could not load merch requests");
                Vec::new()
            }
        }
    }

    /// Load the roster. Degrades to empty on any failure.
    #[instrument(skip(self))]
    pub async fn load_roster(&mut self, league: &str) -> Vec<EntityRecord> {
        let result = async {
            let sources = self.league_sources(league).await?;
            let rows = self.fetch_rows(&sources.roster_url).await?;
            Ok::<_, MerchGenError>(roster_from_rows(&rows))
        }
        .await;

        match result {
            Ok(roster) => {
                info!(count = roster.len(), "loaded roster");
                roster
            }
            Err(e) => {
                warn!(error = %e, "could not load roster");
                Vec::new()
            }
        }
    }

    /// Load merch settings. Degrades to empty identifiers on any failure.
    #[instrument(skip(self))]
    pub async fn load_merch_settings(&mut self, league: &str) -> MerchSettings {
        let result = async {
            let sources = self.league_sources(league).await?;
            match sources.settings_url {
                Some(url) => {
                    let rows = self.fetch_rows(&url).await?;
                    Ok::<_, MerchGenError>(settings_from_rows(&rows))
                }
                None => Ok(MerchSettings::default()),
            }
        }
        .await;

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "could not load merch settings");
                MerchSettings::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Row → record mapping
// ---------------------------------------------------------------------------

/// Find `league` (case-insensitive) in master registry rows.
pub fn league_sources_from_rows(rows: &[Vec<String>], league: &str) -> Result<LeagueSources> {
    let Some(header) = rows.first() else {
        return Err(MerchGenError::DataUnavailable(
            "master league registry is empty".into(),
        ));
    };
    let map = HeaderMap::from_row(header);
    let wanted = league.trim().to_lowercase();

    let entry = rows.iter().skip(1).find(|row| {
        let cell = map.get(row, "LEAGUE").trim();
        !cell.is_empty() && cell.to_lowercase() == wanted
    });

    let not_found = || {
        MerchGenError::DataUnavailable(format!(
            "league \"{}\" not found in master registry",
            league.trim()
        ))
    };

    let row = entry.ok_or_else(not_found)?;
    let roster_url = map.get(row, "TEAM INFO").trim().to_string();
    if roster_url.is_empty() {
        return Err(not_found());
    }

    let requests_url = match map.get(row, "MERCH TEAMS").trim() {
        "" => roster_url.clone(),
        url => url.to_string(),
    };
    let settings_url = match map.get(row, "MERCH SETTINGS").trim() {
        "" => None,
        url => Some(url.to_string()),
    };

    Ok(LeagueSources {
        roster_url,
        requests_url,
        settings_url,
    })
}

/// Map request dataset rows (title row, header row, then data).
pub fn requests_from_rows(rows: &[Vec<String>]) -> Vec<MerchRequest> {
    let Some(header) = rows.get(REQUESTS_HEADER_ROW) else {
        return Vec::new();
    };
    let map = HeaderMap::from_row(header);

    rows.iter()
        .skip(REQUESTS_HEADER_ROW + 1)
        .filter_map(|row| {
            let abbreviation = named_or_positional(&map, row, "Abb", 1);
            let city = named_or_positional(&map, row, "Team City", 2);
            let name = named_or_positional(&map, row, "Team Name", 3);
            if abbreviation.is_empty() && city.is_empty() && name.is_empty() {
                return None;
            }
            Some(MerchRequest {
                abbreviation,
                city,
                name,
            })
        })
        .collect()
}

/// Map roster dataset rows (header row, then data).
pub fn roster_from_rows(rows: &[Vec<String>]) -> Vec<EntityRecord> {
    let Some(header) = rows.first() else {
        return Vec::new();
    };
    let map = HeaderMap::from_row(header);

    rows.iter()
        .skip(1)
        .map(|row| {
            let city = map.get(row, "Team City").trim().to_string();
            let name = map.get(row, "Team Name").trim().to_string();
            let full_name = match map.get(row, "Full Team Name").trim() {
                "" => format!("{city} {name}").trim().to_string(),
                full => full.to_string(),
            };
            let classification = match map.get(row, "Conf") {
                "" => map.get(row, "Tier"),
                conf => conf,
            };
            EntityRecord {
                abbreviation: map.get(row, "Abb").to_string(),
                city,
                name,
                full_name,
                classification: classification.to_string(),
                division: map.get(row, "Division").to_string(),
                colors: [
                    normalize_hex_color(map.get(row, "Color 1")),
                    normalize_hex_color(map.get(row, "Color 2")),
                    normalize_hex_color(map.get(row, "Color 3")),
                ],
            }
        })
        .collect()
}

/// Read design/product ids from their fixed cells. Missing cells are empty.
pub fn settings_from_rows(rows: &[Vec<String>]) -> MerchSettings {
    let Some(row) = rows.get(SETTINGS_ROW) else {
        return MerchSettings::default();
    };
    let cell = |i: usize| row.get(i).map(|v| v.trim().to_string()).unwrap_or_default();
    MerchSettings {
        design_id: cell(DESIGN_ID_COLUMN),
        product_id: cell(PRODUCT_ID_COLUMN),
    }
}

fn named_or_positional(map: &HeaderMap, row: &[String], column: &str, position: usize) -> String {
    match map.get(row, column).trim() {
        "" => row
            .get(position)
            .map(|v| v.trim().to_string())
            .unwrap_or_default(),
        value => value.to_string(),
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Fetch a URL as text, treating non-2xx as an error.
async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| MerchGenError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(MerchGenError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| MerchGenError::Network(format!("{url}: failed to read body: {e}")))
}

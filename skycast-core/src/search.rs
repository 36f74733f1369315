//! Reconciliation orchestrator: decides which sources to query, runs
//! them, applies the fallback/priority policy and emits one normalized
//! [`WeatherBundle`] per completed search.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::CoverageBounds;
use crate::error::SearchError;
use crate::model::{Coordinates, HourlyRecord, WeatherBundle};
use crate::source::{HourlySource, OverviewSource, SourceId};

/// Minimum interval between the start of two searches.
pub const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(2000);

/// Completed bundles are reused for this long before a fresh fetch.
pub const CACHE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    /// Free-text place name, resolved through the commercial geocoder.
    Place(String),
    /// Known coordinates, e.g. from a favorites list.
    Coords(Coordinates),
}

impl SearchQuery {
    fn cache_key(&self) -> String {
        match self {
            SearchQuery::Place(name) => name.trim().to_lowercase(),
            SearchQuery::Coords(coords) => coords.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// One hourly series: national first inside its coverage area with
    /// silent fallback to commercial, commercial directly outside it.
    #[default]
    Single,
    /// Both sources fetched concurrently; national wins as primary
    /// whenever it produced data, commercial rides along for comparison.
    Multi,
}

#[derive(Debug)]
struct CachedBundle {
    bundle: WeatherBundle,
    stored_at: Instant,
}

/// `Idle → Searching → {Success, Failed} → Idle`, plus the bundle cache.
/// Exclusively owned by the orchestrator behind one lock; never held
/// across an await point.
#[derive(Debug, Default)]
struct SearchState {
    searching: bool,
    last_search_start: Option<Instant>,
    cache: HashMap<String, CachedBundle>,
}

/// The orchestrator. One search may be in flight at a time; a second
/// start fails immediately with [`SearchError::Busy`] rather than
/// queueing, and starts closer together than the rate-limit interval
/// fail with [`SearchError::RateLimited`] before any network contact.
#[derive(Debug)]
pub struct WeatherService {
    national: Box<dyn HourlySource>,
    commercial: Box<dyn OverviewSource>,
    coverage: CoverageBounds,
    rate_limit: Duration,
    cache_ttl: Duration,
    state: Mutex<SearchState>,
}

impl WeatherService {
    pub fn new(
        national: Box<dyn HourlySource>,
        commercial: Box<dyn OverviewSource>,
        coverage: CoverageBounds,
    ) -> Self {
        Self {
            national,
            commercial,
            coverage,
            rate_limit: RATE_LIMIT_INTERVAL,
            cache_ttl: CACHE_TTL,
            state: Mutex::new(SearchState::default()),
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    /// Run one search. Admission control (rate limit, busy flag, cache)
    /// happens under the state lock before any network call; the lock is
    /// released while the fetches run.
    pub async fn search(
        &self,
        query: &SearchQuery,
        mode: SourceMode,
    ) -> Result<WeatherBundle, SearchError> {
        let key = query.cache_key();

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

            if let Some(started) = state.last_search_start {
                if started.elapsed() < self.rate_limit {
                    return Err(SearchError::RateLimited);
                }
            }
            if state.searching {
                return Err(SearchError::Busy);
            }

            if let Some(cached) = state.cache.get(&key) {
                if cached.stored_at.elapsed() < self.cache_ttl {
                    tracing::debug!(key, "returning cached bundle");
                    return Ok(cached.bundle.clone());
                }
                state.cache.remove(&key);
            }

            state.searching = true;
            state.last_search_start = Some(Instant::now());
        }

        let result = self.run_search(query, mode).await;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.searching = false;
        if let Ok(bundle) = &result {
            // Inserting also sweeps entries past their TTL so the map
            // stays bounded by live queries.
            let ttl = self.cache_ttl;
            state.cache.retain(|_, cached| cached.stored_at.elapsed() < ttl);
            state
                .cache
                .insert(key, CachedBundle { bundle: bundle.clone(), stored_at: Instant::now() });
        }
        result
    }

    async fn run_search(
        &self,
        query: &SearchQuery,
        mode: SourceMode,
    ) -> Result<WeatherBundle, SearchError> {
        let place = match query {
            SearchQuery::Place(name) => self
                .commercial
                .geocode(name)
                .await?
                .ok_or(SearchError::LocationNotFound)?,
            SearchQuery::Coords(coords) => {
                if !coords.is_valid() {
                    return Err(SearchError::LocationNotFound);
                }
                self.commercial.locate(*coords).await?.ok_or(SearchError::LocationNotFound)?
            }
        };
        let coords = place.coordinates;
        tracing::debug!(name = %place.name, %coords, ?mode, "search started");

        let (primary_source, hourly, comparison_hourly) = match mode {
            SourceMode::Single => self.fetch_single(coords).await?,
            SourceMode::Multi => self.fetch_multi(coords).await?,
        };

        // Current conditions, the 7-day outlook and the timezone offset
        // always come from the commercial provider; the national source
        // carries no multi-day forecast.
        let overview = self.commercial.fetch_overview(coords).await?;

        let comparison_source = comparison_hourly.as_ref().map(|_| SourceId::Commercial);
        Ok(WeatherBundle {
            location_name: place.name,
            coordinates: coords,
            current: overview.current,
            hourly,
            daily: overview.daily,
            timezone_offset_seconds: overview.timezone_offset_seconds,
            primary_source,
            comparison_hourly,
            comparison_source,
        })
    }

    /// Single-source policy: national first inside its coverage area
    /// with a silent fallback, commercial directly outside it. A quota
    /// failure from the commercial source is terminal, never a reason to
    /// try anything else.
    async fn fetch_single(
        &self,
        coords: Coordinates,
    ) -> Result<(SourceId, Vec<HourlyRecord>, Option<Vec<HourlyRecord>>), SearchError> {
        if self.coverage.contains(coords) {
            match self.national.fetch_hourly(coords).await {
                Ok(hourly) => return Ok((SourceId::National, hourly, None)),
                Err(err) => {
                    tracing::warn!(%err, "national source failed, falling back to commercial");
                }
            }
        }

        let hourly = self.commercial.fetch_hourly(coords).await?;
        Ok((SourceId::Commercial, hourly, None))
    }

    /// Multi-source policy: both fetches are started before either is
    /// awaited so their network latencies overlap, and the priority rule
    /// only runs once both have settled. National data is treated as
    /// higher-fidelity for in-region points, so a non-empty national
    /// result is always primary, never averaged with the commercial one.
    async fn fetch_multi(
        &self,
        coords: Coordinates,
    ) -> Result<(SourceId, Vec<HourlyRecord>, Option<Vec<HourlyRecord>>), SearchError> {
        let (national, commercial) = tokio::join!(
            self.national.fetch_hourly(coords),
            self.commercial.fetch_hourly(coords),
        );

        match (national, commercial) {
            (Ok(primary), Ok(comparison)) => {
                Ok((SourceId::National, primary, Some(comparison)))
            }
            (Ok(primary), Err(err)) => {
                tracing::warn!(%err, "commercial source failed in multi-source mode");
                Ok((SourceId::National, primary, None))
            }
            (Err(err), Ok(primary)) => {
                tracing::warn!(%err, "national source failed in multi-source mode");
                Ok((SourceId::Commercial, primary, None))
            }
            (Err(national_err), Err(commercial_err)) => {
                tracing::warn!(%national_err, %commercial_err, "both sources failed");
                Err(SearchError::AllSourcesUnavailable)
            }
        }
    }
}

//! Place search (autocomplete suggestions) backed by Nominatim
//!
//! Search failures never reach the caller: they are logged and degrade to an
//! empty suggestion list. Successful responses are cached for a fixed TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::MapError;
use crate::cache::{CacheStats, ResultCache};
use crate::config::SearchConfig;
use crate::models::SearchResult;

/// Queries shorter than this never reach the network
pub const MIN_QUERY_CHARS: usize = 2;
/// Queries at least this long are searched as the user types
pub const AUTO_SEARCH_CHARS: usize = 3;
/// Upper bound on suggestions per search
pub const MAX_LIMIT: usize = 20;

/// A remote place-search service
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    /// Ranked matches for `query`. Errors are reported, not swallowed.
    async fn fetch_places(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, MapError>;
}

/// Nominatim API client, used both for suggestions and for geocoding
pub struct NominatimClient {
    client: Client,
    base_url: String,
}

/// One element of a Nominatim `/search?format=json` response
#[derive(Debug, Deserialize)]
pub struct NominatimPlace {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: NominatimAddress,
    /// Nominatim encodes coordinates as strings
    pub lat: String,
    pub lon: String,
    #[serde(rename = "type", default)]
    pub place_type: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub importance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NominatimAddress {
    pub city: Option<String>,
    pub town: Option<String>,
    pub country: Option<String>,
}

impl NominatimClient {
    /// Create a new client
    pub fn new(config: &SearchConfig) -> Result<Self, MapError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| MapError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Raw Nominatim search, in upstream order
    #[instrument(skip(self))]
    pub async fn search_raw(&self, query: &str, limit: usize) -> Result<Vec<NominatimPlace>, MapError> {
        let url = format!(
            "{}/search?q={}&format=json&limit={}&addressdetails=1",
            self.base_url,
            urlencoding::encode(query),
            limit
        );
        debug!("Nominatim request URL: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MapError::upstream(format!("Nominatim request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(MapError::upstream(format!(
                "Nominatim returned {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown error")
            )));
        }

        response
            .json::<Vec<NominatimPlace>>()
            .await
            .map_err(|e| MapError::upstream(format!("Failed to parse Nominatim response: {e}")))
    }
}

#[async_trait]
impl PlaceSearch for NominatimClient {
    async fn fetch_places(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, MapError> {
        let places = self.search_raw(query, limit).await?;
        let results = into_ranked_results(places);
        info!("Found {} places for '{}'", results.len(), query);
        Ok(results)
    }
}

impl NominatimPlace {
    /// "name, city|town, country", falling back to the full display name
    #[must_use]
    pub fn label(&self) -> String {
        let parts: Vec<&str> = [
            self.name.as_deref(),
            self.address.city.as_deref().or(self.address.town.as_deref()),
            self.address.country.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();

        if parts.is_empty() {
            self.display_name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "Location".to_string())
        } else {
            parts.join(", ")
        }
    }

    /// Convert to a [`SearchResult`]; `None` when the coordinates don't parse
    pub fn to_search_result(&self) -> Option<SearchResult> {
        let (Ok(latitude), Ok(longitude)) = (self.lat.parse::<f64>(), self.lon.parse::<f64>())
        else {
            warn!(
                "Skipping place with unparsable coordinates: {:?} / {:?}",
                self.lat, self.lon
            );
            return None;
        };

        Some(SearchResult {
            label: self.label(),
            address: self.display_name.clone().unwrap_or_default(),
            latitude,
            longitude,
            place_type: self.place_type.clone().unwrap_or_else(|| "place".to_string()),
            place_class: self.class.clone().unwrap_or_else(|| "location".to_string()),
            importance: self.importance.unwrap_or(0.0),
        })
    }
}

/// Convert and order by descending importance. The sort is stable, so ties keep upstream order.
#[must_use]
pub fn into_ranked_results(places: Vec<NominatimPlace>) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = places
        .iter()
        .filter_map(NominatimPlace::to_search_result)
        .collect();
    results.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    results
}

/// Cache key for suggestions: normalized query text plus result limit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchKey {
    pub query: String,
    pub limit: usize,
}

impl SearchKey {
    #[must_use]
    pub fn new(query: &str, limit: usize) -> Self {
        Self {
            query: normalize_query(query),
            limit,
        }
    }
}

/// Trim, collapse inner whitespace, lowercase
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cached, non-failing place search
pub struct LocationSearch {
    source: Arc<dyn PlaceSearch>,
    cache: ResultCache<SearchKey, Vec<SearchResult>>,
    default_limit: usize,
}

impl LocationSearch {
    pub fn new(source: Arc<dyn PlaceSearch>, ttl: Duration, default_limit: usize) -> Self {
        Self {
            source,
            cache: ResultCache::with_ttl("search", ttl),
            default_limit: default_limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Whether a query is long enough to be searched as the user types
    #[must_use]
    pub fn should_auto_search(query: &str) -> bool {
        query.trim().chars().count() >= AUTO_SEARCH_CHARS
    }

    /// Ranked suggestions for `query`; a `limit` of 0 means the configured default.
    /// Empty on short queries and on any upstream failure.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            debug!("Query too short, skipping search");
            return Vec::new();
        }

        let limit = if limit == 0 {
            self.default_limit
        } else {
            limit.min(MAX_LIMIT)
        };

        let key = SearchKey::new(query, limit);
        match self
            .cache
            .get_or_fetch(key, || self.source.fetch_places(query, limit))
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!("Search error: {}", e);
                Vec::new()
            }
        }
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CENTRAL_PARK_RESPONSE: &str = r#"[
        {
            "place_id": 1,
            "lat": "40.7697500",
            "lon": "-73.9807000",
            "class": "railway",
            "type": "station",
            "name": "Central Park South",
            "display_name": "Central Park South, Manhattan, New York, United States",
            "address": {"city": "New York", "country": "United States"},
            "importance": 0.31
        },
        {
            "place_id": 2,
            "lat": "40.7827725",
            "lon": "-73.9653627",
            "class": "leisure",
            "type": "park",
            "name": "Central Park",
            "display_name": "Central Park, Manhattan, New York County, New York, United States",
            "address": {"city": "New York", "country": "United States"},
            "importance": 0.8213
        },
        {
            "place_id": 3,
            "lat": "40.7812",
            "lon": "-73.9665",
            "class": "tourism",
            "type": "attraction",
            "name": "",
            "display_name": "Central Park Zoo, East Drive, Manhattan",
            "address": {}
        }
    ]"#;

    fn parse_fixture() -> Vec<NominatimPlace> {
        serde_json::from_str(CENTRAL_PARK_RESPONSE).unwrap()
    }

    #[test]
    fn test_central_park_is_ranked_first() {
        let results = into_ranked_results(parse_fixture());

        assert_eq!(results.len(), 3);
        assert!(results[0].place_type.contains("park"));
        assert!(results[0].type_label().contains("park"));
        assert_eq!(results[0].label, "Central Park, New York, United States");
        assert!((results[0].latitude - 40.782_772_5).abs() < 1e-9);
        assert!(
            results
                .windows(2)
                .all(|pair| pair[0].importance >= pair[1].importance)
        );
    }

    #[test]
    fn test_label_falls_back_to_display_name() {
        let results = into_ranked_results(parse_fixture());
        let zoo = results.iter().find(|r| r.importance == 0.0).unwrap();
        assert_eq!(zoo.label, "Central Park Zoo, East Drive, Manhattan");
        assert_eq!(zoo.type_label(), "attraction (tourism)");
    }

    #[test]
    fn test_label_uses_town_and_defaults() {
        let place: NominatimPlace = serde_json::from_str(
            r#"{"lat": "1", "lon": "2", "name": "Mill", "address": {"town": "Hebden Bridge"}}"#,
        )
        .unwrap();
        assert_eq!(place.label(), "Mill, Hebden Bridge");

        let bare: NominatimPlace = serde_json::from_str(r#"{"lat": "1", "lon": "2"}"#).unwrap();
        let result = bare.to_search_result().unwrap();
        assert_eq!(result.label, "Location");
        assert_eq!(result.type_label(), "place (location)");
    }

    #[test]
    fn test_ties_keep_upstream_order() {
        let places: Vec<NominatimPlace> = serde_json::from_str(
            r#"[
                {"lat": "0", "lon": "0", "name": "a", "importance": 0.5},
                {"lat": "0", "lon": "0", "name": "b", "importance": 0.9},
                {"lat": "0", "lon": "0", "name": "c", "importance": 0.5}
            ]"#,
        )
        .unwrap();
        let labels: Vec<String> = into_ranked_results(places)
            .into_iter()
            .map(|r| r.label)
            .collect();
        assert_eq!(labels, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_unparsable_coordinates_are_skipped() {
        let places: Vec<NominatimPlace> = serde_json::from_str(
            r#"[{"lat": "north", "lon": "0"}, {"lat": "1.5", "lon": "2.5"}]"#,
        )
        .unwrap();
        assert_eq!(into_ranked_results(places).len(), 1);
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Central   Park NYC "), "central park nyc");
        assert_eq!(SearchKey::new("Tokyo  Station", 5), SearchKey::new("tokyo station", 5));
    }

    #[test]
    fn test_should_auto_search() {
        assert!(!LocationSearch::should_auto_search("ab"));
        assert!(!LocationSearch::should_auto_search("  ab  "));
        assert!(LocationSearch::should_auto_search("abc"));
    }

    struct FakeSearch {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeSearch {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl PlaceSearch for FakeSearch {
        async fn fetch_places(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, MapError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MapError::upstream("connection refused"));
            }
            Ok(into_ranked_results(parse_fixture())
                .into_iter()
                .take(limit)
                .map(|mut r| {
                    r.address = format!("{query}: {}", r.address);
                    r
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_short_query_never_hits_network() {
        let fake = FakeSearch::new(false);
        let search = LocationSearch::new(fake.clone(), Duration::from_secs(300), 5);

        for query in ["", "a", " b ", "é"] {
            assert!(search.search(query, 5).await.is_empty());
        }
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeated_query_is_served_from_cache() {
        let fake = FakeSearch::new(false);
        let search = LocationSearch::new(fake.clone(), Duration::from_secs(300), 5);

        let first = search.search("Central Park NYC", 5).await;
        let second = search.search("  central park   nyc", 5).await;

        assert!(!first.is_empty());
        assert_eq!(first, second);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
        assert_eq!(search.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_empty_and_is_not_cached() {
        let fake = FakeSearch::new(true);
        let search = LocationSearch::new(fake.clone(), Duration::from_secs(300), 5);

        assert!(search.search("Central Park NYC", 5).await.is_empty());
        assert!(search.search("Central Park NYC", 5).await.is_empty());
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
        assert_eq!(search.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn test_limit_defaults_and_bounds() {
        let fake = FakeSearch::new(false);
        let search = LocationSearch::new(fake, Duration::from_secs(300), 2);
        assert_eq!(search.search("Central Park NYC", 0).await.len(), 2);
        assert_eq!(search.search("Central Park NYC", 1).await.len(), 1);
    }

    #[tokio::test]
    #[ignore = "hits the public Nominatim instance"]
    async fn test_live_central_park_search() {
        let client = NominatimClient::new(&SearchConfig::default()).unwrap();
        let search = LocationSearch::new(Arc::new(client), Duration::from_secs(300), 5);
        let results = search.search("Central Park NYC", 5).await;
        assert!(!results.is_empty());
        assert!(results[0].type_label().contains("park"));
    }
}

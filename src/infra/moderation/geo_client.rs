use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::core::moderation::{Geo, GeoError, GeoResolver};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);
const CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const MAX_CACHE_ENTRIES: usize = 10_000;

/// Geo lookups against an ip-api compatible JSON endpoint.
///
/// `url_template` may contain `{ip}`; otherwise the address is appended as a
/// path segment. Results are cached per address for an hour; a full cache
/// sheds stale entries first and is cleared if that is not enough.
pub struct HttpGeoResolver {
    client: Client,
    url_template: String,
    cache: DashMap<String, (Instant, Geo)>,
    cache_ttl: Duration,
    max_cache_entries: usize,
}

impl HttpGeoResolver {
    pub fn new(url_template: impl Into<String>) -> Result<Self, GeoError> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert(
            "User-Agent",
            HeaderValue::from_static("RustModerationBot/0.3"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .map_err(|e| GeoError::Lookup(e.to_string()))?;

        Ok(Self {
            client,
            url_template: url_template.into(),
            cache: DashMap::new(),
            cache_ttl: CACHE_TTL,
            max_cache_entries: MAX_CACHE_ENTRIES,
        })
    }

    fn lookup_url(&self, address: &str) -> String {
        if self.url_template.contains("{ip}") {
            self.url_template.replace("{ip}", address)
        } else {
            format!("{}/{}", self.url_template.trim_end_matches('/'), address)
        }
    }

    fn cached(&self, address: &str) -> Option<Geo> {
        let hit = self.cache.get(address)?;
        let (at, geo) = hit.value();
        (at.elapsed() < self.cache_ttl).then(|| geo.clone())
    }

    fn remember(&self, address: &str, geo: Geo, at: Instant) {
        if self.cache.len() >= self.max_cache_entries && !self.cache.contains_key(address) {
            let ttl = self.cache_ttl;
            self.cache.retain(|_, (cached_at, _)| cached_at.elapsed() < ttl);
            if self.cache.len() >= self.max_cache_entries {
                tracing::debug!(entries = self.cache.len(), "Geo cache full, clearing");
                self.cache.clear();
            }
        }
        self.cache.insert(address.to_string(), (at, geo));
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiGeo {
    status: Option<String>,
    message: Option<String>,
    country_code: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
}

impl ApiGeo {
    fn into_geo(self) -> Result<Geo, GeoError> {
        if self.status.as_deref() == Some("fail") {
            return Err(GeoError::Lookup(
                self.message.unwrap_or_else(|| "lookup refused".to_string()),
            ));
        }

        Ok(Geo {
            country: non_empty(self.country_code),
            region: non_empty(self.region_name),
            city: non_empty(self.city),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl GeoResolver for HttpGeoResolver {
    async fn resolve(&self, address: &str) -> Result<Geo, GeoError> {
        if let Some(geo) = self.cached(address) {
            return Ok(geo);
        }

        let response = self
            .client
            .get(self.lookup_url(address))
            .send()
            .await
            .map_err(|e| GeoError::Lookup(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeoError::Lookup(format!(
                "geo service returned {}",
                response.status()
            )));
        }

        let geo = response
            .json::<ApiGeo>()
            .await
            .map_err(|e| GeoError::Malformed(e.to_string()))?
            .into_geo()?;

        self.remember(address, geo.clone(), Instant::now());
        Ok(geo)
    }
}

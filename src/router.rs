use std::{sync::Arc, time::Duration};

use crate::types::{CacheKey, DaysParam, InboundMsg, ResourceRequest};

pub const DEFAULT_CHART_DAYS: &str = "365";

const VS_CURRENCY: &str = "usd";

/// Client-facing rejection for requests that never reach the fetch path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("Invalid message type.")]
    UnknownKind,
    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),
}

#[derive(Debug, Clone)]
pub struct Route {
    pub key: CacheKey,
    pub ttl: Duration,
    pub url: String,
}

/// Maps normalized requests to cache keys and upstream URLs. Both transports
/// share one instance, so keys stay canonical across them.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    base_url: Arc<str>,
    cache_ttl: Duration,
}

impl RequestRouter {
    pub fn new(base_url: &str, cache_ttl: Duration) -> Self {
        Self {
            base_url: Arc::from(base_url.trim_end_matches('/')),
            cache_ttl,
        }
    }

    /// Classify a persistent-session frame into a resource request.
    ///
    /// `days` is forwarded to upstream unvalidated; values the upstream
    /// rejects come back as its own error body.
    pub fn classify(&self, msg: InboundMsg) -> Result<ResourceRequest, RouteError> {
        match msg.kind.as_str() {
            "cryptoData" => Ok(ResourceRequest::CoinSnapshot {
                coin_id: msg.id.ok_or(RouteError::MissingParam("id"))?,
            }),
            "marketChartData" => Ok(ResourceRequest::MarketChart {
                coin_id: msg.id.ok_or(RouteError::MissingParam("id"))?,
                days: normalize_days(msg.days.map(DaysParam::into_string)),
            }),
            _ => Err(RouteError::UnknownKind),
        }
    }

    pub fn route(&self, request: &ResourceRequest) -> Route {
        match request {
            ResourceRequest::CoinSnapshot { coin_id } => Route {
                key: CacheKey::snapshot(coin_id),
                ttl: self.cache_ttl,
                url: format!("{}/coins/{}", self.base_url, coin_id),
            },
            ResourceRequest::MarketChart { coin_id, days } => Route {
                key: CacheKey::chart(coin_id, days),
                ttl: self.cache_ttl,
                url: format!(
                    "{}/coins/{}/market_chart?vs_currency={}&days={}",
                    self.base_url, coin_id, VS_CURRENCY, days
                ),
            },
        }
    }
}

/// `days` falls back to the default when the client omits it or sends "".
pub fn normalize_days(days: Option<String>) -> String {
    match days {
        Some(d) if !d.is_empty() => d,
        _ => DEFAULT_CHART_DAYS.to_string(),
    }
}

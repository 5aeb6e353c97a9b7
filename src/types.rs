use std::{fmt, sync::Arc};

use serde::Deserialize;

/// Canonical identifier for a cacheable resource and its parameters.
///
/// Both transports build keys through [`CacheKey::snapshot`] and
/// [`CacheKey::chart`], so requests with identical semantic parameters always
/// land on the same cache entry and the same in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    pub fn snapshot(coin_id: &str) -> Self {
        Self(Arc::from(format!("crypto:{coin_id}")))
    }

    pub fn chart(coin_id: &str, days: &str) -> Self {
        Self(Arc::from(format!("chart:{coin_id}:{days}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized inbound request, independent of the transport it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRequest {
    CoinSnapshot { coin_id: String },
    MarketChart { coin_id: String, days: String },
}

/// Raw shape of a frame on the persistent session:
/// `{"type": ..., "id": ..., "days": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMsg {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Option<String>,
    pub days: Option<DaysParam>,
}

/// Clients send `days` either as a JSON number or as a string (`"max"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DaysParam {
    Number(u64),
    Text(String),
}

impl DaysParam {
    pub fn into_string(self) -> String {
        match self {
            DaysParam::Number(n) => n.to_string(),
            DaysParam::Text(s) => s,
        }
    }
}

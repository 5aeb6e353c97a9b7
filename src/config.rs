use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub upstream_base_url: String,
    pub upstream_api_key: Option<String>,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr =
            std::env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".into());
        let upstream_base_url = std::env::var("UPSTREAM_BASE_URL")
            .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".into());
        let upstream_api_key = std::env::var("UPSTREAM_API_KEY").ok();
        let cache_ttl_secs = std::env::var("CACHE_TTL_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .context("CACHE_TTL_SECS must be a number")?;
        let cache_capacity = std::env::var("CACHE_CAPACITY")
            .unwrap_or_else(|_| "1024".into())
            .parse()
            .context("CACHE_CAPACITY must be a number")?;

        Ok(Self {
            bind_addr,
            upstream_base_url,
            upstream_api_key,
            cache_ttl_secs,
            cache_capacity,
        })
    }
}

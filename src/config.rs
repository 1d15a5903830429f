use std::{net::SocketAddr, time::Duration};

use serde::Deserialize;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/database.db";
pub const DEFAULT_YOOKASSA_API_URL: &str = "https://api.yookassa.ru/v3";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Credentials and transport settings for the YooKassa API.
#[derive(Debug, Clone)]
pub struct YooKassaConfig {
    pub shop_id: String,
    pub secret_key: String,
    pub api_url: String,
    pub timeout: Duration,
}

impl YooKassaConfig {
    /// Both credentials must be present and non-empty, otherwise payments run in test mode.
    pub fn from_vars(
        shop_id: Option<String>,
        secret_key: Option<String>,
        api_url: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Option<Self> {
        let shop_id = shop_id.filter(|v| !v.trim().is_empty())?;
        let secret_key = secret_key.filter(|v| !v.trim().is_empty())?;
        Some(Self {
            shop_id,
            secret_key,
            api_url: api_url
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_YOOKASSA_API_URL.into())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(timeout_secs.unwrap_or(30)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Origin used to build the provider's return URL.
    pub public_base_url: String,
    pub jwt: JwtConfig,
    pub yookassa: Option<YooKassaConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.into());
        let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = parse_port(
            std::env::var("PORT")
                .or_else(|_| std::env::var("APP_PORT"))
                .ok()
                .as_deref(),
        )?;
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "consult-backend".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "consult-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 7),
        };
        let yookassa = YooKassaConfig::from_vars(
            std::env::var("YOOKASSA_SHOP_ID").ok(),
            std::env::var("YOOKASSA_SECRET_KEY").ok(),
            std::env::var("YOOKASSA_API_URL").ok(),
            std::env::var("YOOKASSA_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok()),
        );
        Ok(Self {
            database_url,
            host,
            port,
            public_base_url,
            jwt,
            yookassa,
        })
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

fn parse_port(raw: Option<&str>) -> anyhow::Result<u16> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid port {v:?}: {e}")),
        None => Ok(DEFAULT_PORT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_config(host: &str, port: u16) -> AppConfig {
        AppConfig {
            database_url: DEFAULT_DATABASE_URL.into(),
            host: host.into(),
            port,
            public_base_url: "http://localhost:3000".into(),
            jwt: JwtConfig {
                secret: "s".into(),
                issuer: "i".into(),
                audience: "a".into(),
                ttl_minutes: 1,
            },
            yookassa: None,
        }
    }

    #[test]
    fn port_defaults_and_validation() {
        assert_eq!(parse_port(None).unwrap(), DEFAULT_PORT);
        assert_eq!(parse_port(Some(" ")).unwrap(), DEFAULT_PORT);
        assert_eq!(parse_port(Some("8081")).unwrap(), 8081);
        assert!(parse_port(Some("eighty")).is_err());
        assert!(parse_port(Some("70000")).is_err());
    }

    #[test]
    fn listen_addr_comes_from_config() {
        let addr = app_config("127.0.0.1", 8081).listen_addr().unwrap();
        assert_eq!(addr, "127.0.0.1:8081".parse::<SocketAddr>().unwrap());
        assert!(app_config("not a host", 80).listen_addr().is_err());
    }

    #[test]
    fn yookassa_requires_both_credentials() {
        assert!(YooKassaConfig::from_vars(Some("shop".into()), None, None, None).is_none());
        assert!(YooKassaConfig::from_vars(None, Some("key".into()), None, None).is_none());
        assert!(
            YooKassaConfig::from_vars(Some("shop".into()), Some("  ".into()), None, None).is_none()
        );
    }

    #[test]
    fn yookassa_defaults() {
        let cfg = YooKassaConfig::from_vars(Some("shop".into()), Some("test_key".into()), None, None)
            .expect("configured");
        assert_eq!(cfg.api_url, DEFAULT_YOOKASSA_API_URL);
        assert_eq!(cfg.timeout, Duration::from_secs(30));
    }

    #[test]
    fn yookassa_api_url_trailing_slash_is_trimmed() {
        let cfg = YooKassaConfig::from_vars(
            Some("shop".into()),
            Some("key".into()),
            Some("http://127.0.0.1:9000/v3/".into()),
            Some(5),
        )
        .expect("configured");
        assert_eq!(cfg.api_url, "http://127.0.0.1:9000/v3");
        assert_eq!(cfg.timeout, Duration::from_secs(5));
    }
}

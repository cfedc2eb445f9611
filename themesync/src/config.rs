use relay::config::Config as RelayConfig;
use serde::Deserialize;
use std::fs::File;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    /// `EnvFilter` directive, used when `RUST_LOG` is not set
    pub filter: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub relay: RelayConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data: Config = serde_yaml::from_reader(file)?;
        data.relay.validate()?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    ValidationError(#[from] relay::config::ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    const RELAY_YAML: &str = r#"
            relay:
                listener:
                    host: 0.0.0.0
                    port: 3000
                admin_listener:
                    host: 127.0.0.1
                    port: 3001
                github_secret_env: GITHUB_WEBHOOK_SECRET
                fetch_delay_secs: 2
                stores:
                    - domain: dev-staging.myshopify.com
                      access_token_env: DEV_STAGING_ACCESS_TOKEN
                branches:
                    DEV_STAGING_PROMO:
                        store_name: DEV_STAGING_PROMO
                        shopify_domain: dev-staging.myshopify.com
                        theme_name: tt-ca/DEV_STAGING_PROMO
            "#;

    #[test]
    fn relay_config() {
        let tmp = write_tmp_file(RELAY_YAML);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.common.metrics, None);
        assert_eq!(config.common.logging, None);
        assert_eq!(config.relay.listener.port, 3000);
        assert_eq!(config.relay.fetch_delay_secs, 2);
        assert_eq!(
            config.relay.branches["DEV_STAGING_PROMO"].theme_name,
            "tt-ca/DEV_STAGING_PROMO"
        );
        assert!(config.relay.sheet.is_none());
    }

    #[test]
    fn common_config() {
        let yaml = format!(
            r#"
            logging:
                sentry_dsn: https://public@sentry.example.com/1
                filter: relay=debug,info
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            {}"#,
            RELAY_YAML.trim_start()
        );
        let tmp = write_tmp_file(&yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        let logging = config.common.logging.expect("logging config");
        assert_eq!(logging.filter.as_deref(), Some("relay=debug,info"));
        assert_eq!(
            config.common.metrics,
            Some(MetricsConfig {
                statsd_host: "127.0.0.1".into(),
                statsd_port: 8125
            })
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let yaml = RELAY_YAML.replace("port: 3001", "port: 0");
        let tmp = write_tmp_file(&yaml);
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ValidationError(_))
        ));

        let tmp = write_tmp_file("relay: [not, a, map]");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ParseError(_))
        ));

        assert!(matches!(
            Config::from_file(std::path::Path::new("/nonexistent/themesync.yaml")),
            Err(ConfigError::LoadError(_))
        ));
    }
}

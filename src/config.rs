use thiserror::Error;

use crate::transform::ImputeStrategy;

pub const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_REGION: &str = "eu-west-2";

/// Reports every missing and invalid key at once rather than failing on the
/// first.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid configuration: missing [{}] invalid [{}]", .missing.join(", "), .invalid.join(", "))]
pub struct ConfigurationError {
    pub missing: Vec<String>,
    pub invalid: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Records,
    Ilp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordApiConfig {
    pub endpoint: String,
    pub token: String,
    pub database: String,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IlpConfig {
    pub addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkConfig {
    Records(RecordApiConfig),
    Ilp(IlpConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bucket: String,
    pub key: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub impute: ImputeStrategy,
    pub batch_size: usize,
    pub sink: SinkConfig,
}

fn require(
    get: &impl Fn(&str) -> Option<String>,
    missing: &mut Vec<String>,
    key: &str,
) -> Option<String> {
    match get(key) {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            missing.push(key.to_string());
            None
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Validate the whole key set up front; the lookup seam keeps this
    /// testable without touching process env.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigurationError> {
        let mut missing = Vec::new();
        let mut invalid = Vec::new();

        let bucket = require(&get, &mut missing, "S3_BUCKET");
        let key = require(&get, &mut missing, "S3_KEY");
        let region = get("AWS_REGION")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let endpoint = get("S3_ENDPOINT").filter(|v| !v.trim().is_empty());

        let sink_kind = match get("SINK_KIND").as_deref().map(str::trim) {
            None | Some("") | Some("records") => Some(SinkKind::Records),
            Some("ilp") => Some(SinkKind::Ilp),
            Some(_) => {
                invalid.push("SINK_KIND".to_string());
                None
            }
        };

        let impute = match get("IMPUTE_STRATEGY").as_deref().map(str::trim) {
            None | Some("") | Some("zero") => Some(ImputeStrategy::ZeroFill),
            Some("mean") => Some(ImputeStrategy::MeanFill),
            Some(_) => {
                invalid.push("IMPUTE_STRATEGY".to_string());
                None
            }
        };

        let batch_size = match get("BATCH_SIZE") {
            None => Some(DEFAULT_BATCH_SIZE),
            Some(v) => match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    invalid.push("BATCH_SIZE".to_string());
                    None
                }
            },
        };

        let sink = match sink_kind {
            Some(SinkKind::Records) => {
                let endpoint = require(&get, &mut missing, "TSDB_ENDPOINT");
                let token = require(&get, &mut missing, "TSDB_API_TOKEN");
                let database = require(&get, &mut missing, "TSDB_DATABASE");
                let table = require(&get, &mut missing, "TSDB_TABLE");
                match (endpoint, token, database, table) {
                    (Some(endpoint), Some(token), Some(database), Some(table)) => {
                        Some(SinkConfig::Records(RecordApiConfig {
                            endpoint,
                            token,
                            database,
                            table,
                        }))
                    }
                    _ => None,
                }
            }
            Some(SinkKind::Ilp) => require(&get, &mut missing, "ILP_ADDR")
                .map(|addr| SinkConfig::Ilp(IlpConfig { addr })),
            None => None,
        };

        if !missing.is_empty() || !invalid.is_empty() {
            return Err(ConfigurationError { missing, invalid });
        }

        match (bucket, key, impute, batch_size, sink) {
            (Some(bucket), Some(key), Some(impute), Some(batch_size), Some(sink)) => Ok(Self {
                bucket,
                key,
                region,
                endpoint,
                impute,
                batch_size,
                sink,
            }),
            // Unreachable: every None above pushed into missing or invalid.
            _ => Err(ConfigurationError { missing, invalid }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn records_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("S3_BUCKET", "demand-extracts"),
            ("S3_KEY", "demanddata_2025.csv"),
            ("TSDB_ENDPOINT", "https://tsdb.example.com"),
            ("TSDB_API_TOKEN", "secret"),
            ("TSDB_DATABASE", "grid"),
            ("TSDB_TABLE", "demand"),
        ]
    }

    #[test]
    fn records_variant_parses_with_defaults() {
        let cfg = AppConfig::from_lookup(lookup(&records_pairs())).unwrap();

        assert_eq!(cfg.bucket, "demand-extracts");
        assert_eq!(cfg.region, "eu-west-2");
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(cfg.impute, ImputeStrategy::ZeroFill);
        assert!(matches!(cfg.sink, SinkConfig::Records(_)));
    }

    #[test]
    fn every_missing_key_is_reported_at_once() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();

        for key in ["S3_BUCKET", "S3_KEY", "TSDB_ENDPOINT", "TSDB_API_TOKEN", "TSDB_DATABASE", "TSDB_TABLE"] {
            assert!(err.missing.contains(&key.to_string()), "missing should list {key}");
        }
        assert!(err.invalid.is_empty());
    }

    #[test]
    fn ilp_variant_requires_only_the_ilp_address() {
        let err = AppConfig::from_lookup(lookup(&[
            ("S3_BUCKET", "b"),
            ("S3_KEY", "k"),
            ("SINK_KIND", "ilp"),
        ]))
        .unwrap_err();
        assert_eq!(err.missing, vec!["ILP_ADDR".to_string()]);

        let cfg = AppConfig::from_lookup(lookup(&[
            ("S3_BUCKET", "b"),
            ("S3_KEY", "k"),
            ("SINK_KIND", "ilp"),
            ("ILP_ADDR", "10.0.0.5:9009"),
            ("IMPUTE_STRATEGY", "mean"),
        ]))
        .unwrap();
        assert_eq!(cfg.impute, ImputeStrategy::MeanFill);
        assert_eq!(cfg.sink, SinkConfig::Ilp(IlpConfig { addr: "10.0.0.5:9009".to_string() }));
    }

    #[test]
    fn bad_values_are_reported_as_invalid() {
        let mut pairs = records_pairs();
        pairs.push(("BATCH_SIZE", "zero"));
        pairs.push(("IMPUTE_STRATEGY", "median"));

        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.invalid.contains(&"BATCH_SIZE".to_string()));
        assert!(err.invalid.contains(&"IMPUTE_STRATEGY".to_string()));
        assert!(err.missing.is_empty());
    }
}

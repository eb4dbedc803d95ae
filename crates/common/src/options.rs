use serde::Deserialize;
use std::collections::HashMap;

/// Configuration threaded through source and executor operations.
///
/// Sources accept `&Options` on every call and never inspect it; only the executor
/// reads the tuning fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Options {
    #[serde(default = "default_desired_bundle_size_bytes")]
    pub desired_bundle_size_bytes: u64,
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
    #[serde(default = "default_dynamic_split_fraction")]
    pub dynamic_split_fraction: f64,
    #[serde(default = "default_rebalance_interval_ms")]
    pub rebalance_interval_ms: u64,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

fn default_desired_bundle_size_bytes() -> u64 {
    64 * 1024
}

fn default_max_parallelism() -> usize {
    4
}

fn default_dynamic_split_fraction() -> f64 {
    0.5
}

fn default_rebalance_interval_ms() -> u64 {
    10
}

impl Default for Options {
    fn default() -> Self {
        Self {
            desired_bundle_size_bytes: default_desired_bundle_size_bytes(),
            max_parallelism: default_max_parallelism(),
            dynamic_split_fraction: default_dynamic_split_fraction(),
            rebalance_interval_ms: default_rebalance_interval_ms(),
            labels: HashMap::new(),
        }
    }
}

impl Options {
    /// Loads options from the file named by `IGLOO_CONFIG_PATH` (if set), then
    /// overrides from `IGLOO__*` environment variables.
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::load(std::env::var("IGLOO_CONFIG_PATH").ok().as_deref())
    }

    pub fn load(config_file_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = config_file_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let s = builder
            .add_source(
                config::Environment::with_prefix("IGLOO")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        s.try_deserialize()
    }

    pub fn with_desired_bundle_size_bytes(mut self, bytes: u64) -> Self {
        self.desired_bundle_size_bytes = bytes;
        self
    }

    pub fn with_max_parallelism(mut self, parallelism: usize) -> Self {
        self.max_parallelism = parallelism;
        self
    }

    pub fn with_dynamic_split_fraction(mut self, fraction: f64) -> Self {
        self.dynamic_split_fraction = fraction;
        self
    }

    pub fn with_rebalance_interval_ms(mut self, interval_ms: u64) -> Self {
        self.rebalance_interval_ms = interval_ms;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let options: Options = config::Config::builder()
            .set_override("max_parallelism", 2)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(options.max_parallelism, 2);
        assert_eq!(options.desired_bundle_size_bytes, 64 * 1024);
        assert_eq!(options.dynamic_split_fraction, 0.5);
        assert!(options.labels.is_empty());
    }

    #[test]
    fn load_reads_toml_file() {
        let path = std::env::temp_dir().join(format!("igloo_options_{}.toml", std::process::id()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "desired_bundle_size_bytes = 12").unwrap();
            writeln!(file, "rebalance_interval_ms = 3").unwrap();
            writeln!(file, "[labels]").unwrap();
            writeln!(file, "job = \"create\"").unwrap();
        }

        let options = Options::load(path.to_str()).unwrap();
        assert_eq!(options.desired_bundle_size_bytes, 12);
        assert_eq!(options.rebalance_interval_ms, 3);
        assert_eq!(options.labels.get("job").map(String::as_str), Some("create"));

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn load_fails_for_missing_file() {
        assert!(Options::load(Some("/nonexistent/igloo/options")).is_err());
    }

    #[test]
    fn builder_methods_override_defaults() {
        let options = Options::default()
            .with_desired_bundle_size_bytes(1)
            .with_max_parallelism(8)
            .with_dynamic_split_fraction(0.25)
            .with_label("team", "igloo");
        assert_eq!(options.desired_bundle_size_bytes, 1);
        assert_eq!(options.max_parallelism, 8);
        assert_eq!(options.dynamic_split_fraction, 0.25);
        assert_eq!(options.labels["team"], "igloo");
    }
}

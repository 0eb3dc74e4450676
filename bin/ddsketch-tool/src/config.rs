use std::path::Path;

use anyhow::Context as _;
use ddsketch_wire::{MergePolicy, QuantileOptions};
use serde::Deserialize;

/// Rendering of scalar results.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Plain text, with `NULL` for absent values.
    #[default]
    Text,

    /// JSON values, with `null` for absent values.
    Json,
}

/// Tool configuration.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Whether quantiles above one are clamped to one before estimation.
    ///
    /// Defaults to `true`.
    pub clamp_quantile: bool,

    /// How scalar results are printed.
    ///
    /// Defaults to `text`.
    pub output: OutputFormat,

    /// Commit semantics for merges.
    ///
    /// With `atomic`, a sketch that fails to merge leaves the running aggregate untouched. With `legacy`, a sketch whose
    /// buckets fail to decode partway through may have already been partially applied.
    ///
    /// Defaults to `atomic`.
    pub merge_policy: MergePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clamp_quantile: true,
            output: OutputFormat::default(),
            merge_policy: MergePolicy::default(),
        }
    }
}

impl Config {
    /// Attempts to load a serialized `Config` from the given file path.
    ///
    /// # Errors
    ///
    /// If an error occurs while reading the file, or deserializing the configuration data, it will be returned.
    pub fn try_from_file<P>(config_path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let config_path = config_path.as_ref();
        let config_file_raw = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read configuration file '{}'.", config_path.display()))?;
        let config: Self =
            serde_yaml::from_str(&config_file_raw).context("Failed to parse configuration file.")?;

        Ok(config)
    }

    /// Returns the quantile estimation options described by this configuration.
    pub fn quantile_options(&self) -> QuantileOptions {
        QuantileOptions {
            clamp_upper: self.clamp_quantile,
        }
    }
}

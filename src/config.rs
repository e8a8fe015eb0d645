//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.qec-threshold.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".qec-threshold.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Aggregation settings.
    #[serde(default)]
    pub aggregate: AggregateConfig,

    /// Plot settings.
    #[serde(default)]
    pub plot: PlotConfig,
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    /// Extension of record files.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Emit the boundary-sweep columns.
    #[serde(default)]
    pub boundaries: bool,

    /// Exit with status 2 when any file was skipped.
    #[serde(default)]
    pub strict: bool,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            boundaries: false,
            strict: false,
        }
    }
}

fn default_extension() -> String {
    "json".to_string()
}

/// Plot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Figure width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Figure height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,

    /// Horizontal axis label.
    #[serde(default = "default_x_label")]
    pub x_label: String,

    /// Vertical axis label.
    #[serde(default = "default_y_label")]
    pub y_label: String,

    /// Marker radius in pixels.
    #[serde(default = "default_marker_size")]
    pub marker_size: u32,

    /// Panel title font size.
    #[serde(default = "default_caption_font_size")]
    pub caption_font_size: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            x_label: default_x_label(),
            y_label: default_y_label(),
            marker_size: default_marker_size(),
            caption_font_size: default_caption_font_size(),
        }
    }
}

fn default_width() -> u32 {
    1000
}

fn default_height() -> u32 {
    700
}

fn default_x_label() -> String {
    "p".to_string()
}

fn default_y_label() -> String {
    "pL".to_string()
}

fn default_marker_size() -> u32 {
    4
}

fn default_caption_font_size() -> u32 {
    22
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence; flags only ever switch settings on.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        use crate::cli::{Command, PlotCommand};

        match args.command {
            Some(Command::Aggregate(ref agg)) => {
                if agg.boundaries {
                    self.aggregate.boundaries = true;
                }
                if agg.strict {
                    self.aggregate.strict = true;
                }
                if let Some(ref extension) = agg.extension {
                    self.aggregate.extension = extension.clone();
                }
            }
            Some(Command::Plot { ref layout }) => {
                let size = match layout {
                    PlotCommand::Single(single) => single.size,
                    PlotCommand::Double(multi) | PlotCommand::Four(multi) => multi.size,
                };
                if let Some(size) = size {
                    self.plot.width = size.width;
                    self.plot.height = size.height;
                }
            }
            None => {}
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.aggregate.extension, "json");
        assert!(!config.aggregate.boundaries);
        assert_eq!(config.plot.y_label, "pL");
        assert_eq!(config.plot.width, 1000);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[aggregate]
boundaries = true
extension = "result"

[plot]
width = 1600
y_label = "logical error rate"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.aggregate.boundaries);
        assert_eq!(config.aggregate.extension, "result");
        assert_eq!(config.plot.width, 1600);
        assert_eq!(config.plot.height, 700);
        assert_eq!(config.plot.y_label, "logical error rate");
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[aggregate]"));
        assert!(toml_str.contains("[plot]"));
        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.plot.marker_size, 4);
    }

    #[test]
    fn test_merge_aggregate_flags() {
        let args =
            Args::try_parse_from(["qec-threshold", "aggregate", "runs", "--boundaries"]).unwrap();
        let mut config = Config::default();
        config.merge_with_args(&args);
        assert!(config.aggregate.boundaries);
        assert!(!config.aggregate.strict);
        assert_eq!(config.aggregate.extension, "json");
    }

    #[test]
    fn test_merge_plot_size() {
        let args = Args::try_parse_from([
            "qec-threshold",
            "plot",
            "single",
            "runs_data.csv",
            "-L",
            "3,5",
            "--size",
            "800x600",
        ])
        .unwrap();
        let mut config = Config::default();
        config.merge_with_args(&args);
        assert_eq!(config.plot.width, 800);
        assert_eq!(config.plot.height, 600);
    }
}

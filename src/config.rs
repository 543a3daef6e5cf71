//! Runtime configuration: where the database lives and which countries to study.
//!
//! Read from an optional JSON file. Command-line flags (and their `META_STUDY_DB` /
//! `META_STUDY_COUNTRIES` environment fallbacks, resolved by clap) take precedence.

use crate::models::CardFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub countries: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("db.sqlite3"),
            countries: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies values given on the command line. An empty country list leaves the file's list alone.
    pub fn with_overrides(mut self, database_path: Option<PathBuf>, countries: Vec<String>) -> Self {
        if let Some(path) = database_path {
            self.database_path = path;
        }
        let countries: Vec<String> = countries
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        if !countries.is_empty() {
            self.countries = countries;
        }
        self
    }

    pub fn filter(&self) -> CardFilter {
        CardFilter::countries(self.countries.iter().cloned())
    }
}

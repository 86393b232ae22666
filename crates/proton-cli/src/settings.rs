//! Settings file (`proton.toml`)
//!
//! ```toml
//! [solver]
//! max_attempts = 200000
//! max_resets = 20
//! seed = 42
//!
//! [calendar]
//! year = 2025
//! school_free_days = ["2025-10-31"]
//!
//! [[calendar.vacations]]
//! name = "Winter break"
//! start = "2025-12-24"
//! end = "2026-01-02"
//! ```
//!
//! Every table is optional; missing solver fields take their defaults.

use std::path::Path;

use anyhow::{Context, Result};
use proton_core::SchoolCalendar;
use proton_solver::SolverConfig;
use serde::Deserialize;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub solver: SolverConfig,
    pub calendar: SchoolCalendar,
}

impl Settings {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid settings")
    }

    /// Load settings from a file, or the defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("In settings file {}", path.display()))
    }
}

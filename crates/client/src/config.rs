use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use strafe::SessionConfig;

/// Command line settings layered over the JSON config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub demo_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub masters: Vec<String>,
    pub rcon_address: Option<String>,
    pub timedemo: bool,
}

pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<SessionConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<SessionConfig>(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SessionConfig::default(),
    };

    if let Some(dir) = overrides.demo_dir {
        config.demo_dir = dir;
    }
    if let Some(secs) = overrides.timeout_secs {
        config.timeout_secs = secs;
    }
    if !overrides.masters.is_empty() {
        config.masters = overrides.masters;
    }
    if overrides.rcon_address.is_some() {
        config.rcon_address = overrides.rcon_address;
    }
    config.timedemo |= overrides.timedemo;
    Ok(config)
}

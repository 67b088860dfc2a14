use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

const DEFAULT_FILE: &str = "portscan.yaml";

/// Values a YAML file may supply; anything given on the command line wins.
#[derive(Debug, Default, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub timeout: Option<u64>,
    pub num_threads: Option<i64>,
    pub verbose: Option<bool>,
    pub guess: Option<bool>,
    pub interface: Option<String>,
    pub source_port: Option<u16>,
    pub format: Option<String>,
}

/// Load `path`, or `./portscan.yaml` when no path is given and it exists.
/// An explicitly named file that cannot be read or parsed is an error.
pub fn load_config(path: Option<&Path>) -> Result<Option<FileConfig>> {
    let path = match path {
        Some(p) => p,
        None => {
            let p = Path::new(DEFAULT_FILE);
            if !p.exists() {
                return Ok(None);
            }
            p
        }
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_config(&text)
        .with_context(|| format!("parsing {}", path.display()))
        .map(Some)
}

pub fn parse_config(text: &str) -> Result<FileConfig> {
    if text.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    Ok(serde_yaml::from_str(text)?)
}

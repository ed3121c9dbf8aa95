//! `cvc config`: print the default run configuration as TOML, merged with
//! an on-disk `cvcrc` if `--config` was given.

use anyhow::Result;
use cvc_io::CvcConfig;
use std::path::Path;

pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = match config_path {
        Some(path) => CvcConfig::load(path)?,
        None => CvcConfig::default(),
    };
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

use log::*;
use std::{
    env,
    path::{Path, PathBuf},
};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "CERTREQ_CONF";

/// Variable read when `CERTREQ_CONF` is not set, for setups written for
/// the OpenSSL command line tools
#[cfg(feature = "openssl-env-compat")]
pub const LEGACY_CONFIG_ENV_VAR: &str = "OPENSSL_CONF";

/// Where the selected configuration path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    PrimaryEnv,
    LegacyEnv,
    CommandLine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: PathBuf,
    pub source: ConfigSource,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Picks the configuration path from already collected candidates
///
/// The primary variable wins over the legacy one, which wins over the
/// command line. Empty values count as unset.
pub fn choose_config_path(
    primary: Option<String>,
    legacy: Option<String>,
    command_line: Option<&Path>,
) -> Option<ConfigPath> {
    if let Some(path) = non_empty(primary) {
        return Some(ConfigPath {
            path: path.into(),
            source: ConfigSource::PrimaryEnv,
        });
    }

    if let Some(path) = non_empty(legacy) {
        return Some(ConfigPath {
            path: path.into(),
            source: ConfigSource::LegacyEnv,
        });
    }

    command_line
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| ConfigPath {
            path: p.to_path_buf(),
            source: ConfigSource::CommandLine,
        })
}

#[cfg(feature = "openssl-env-compat")]
fn legacy_env() -> Option<String> {
    env::var(LEGACY_CONFIG_ENV_VAR).ok()
}

#[cfg(not(feature = "openssl-env-compat"))]
fn legacy_env() -> Option<String> {
    None
}

/// Selects the configuration path from the environment and the `-config`
/// argument
pub fn select_config_path(command_line: Option<&Path>) -> Option<ConfigPath> {
    let selected = choose_config_path(
        env::var(CONFIG_ENV_VAR).ok(),
        legacy_env(),
        command_line,
    );

    match &selected {
        Some(c) => {
            debug!("Using configuration {} ({:?})", c.path.display(), c.source)
        }
        None => debug!("No configuration file selected"),
    }
    selected
}

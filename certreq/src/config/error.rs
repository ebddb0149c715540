// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    // The file could not be opened or read
    #[error("Could not read configuration file {path}")]
    NotFound {
        path: String,
        source: std::io::Error,
    },

    // A line opens a tag with '[' but never closes it
    #[error("Malformed tag at line {line} of {path}: '{content}'")]
    Parse {
        path: String,
        line: usize,
        content: String,
    },
}

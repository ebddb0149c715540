// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

use crate::{
    config::ConfigError, crypto::CollaboratorError,
    directive::DirectiveError, subject::SubjectError,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad, missing or conflicting command line arguments
    #[error("{0}")]
    Usage(String),

    #[error("Could not read configuration file {path}")]
    ConfigNotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed tag at line {line} of {path}: '{content}'")]
    ConfigParse {
        path: String,
        line: usize,
        content: String,
    },

    #[error("No value given for required field '{name}' on the command line or in the configuration")]
    MissingRequiredField { name: String },

    #[error("Invalid value '{value}' for {directive}: {reason}")]
    InvalidDirectiveValue {
        directive: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl Error {
    pub(crate) fn usage(reason: impl Into<String>) -> Self {
        Error::Usage(reason.into())
    }

    pub(crate) fn missing(name: &str) -> Self {
        Error::MissingRequiredField { name: name.into() }
    }

    pub(crate) fn invalid_value(
        directive: &str,
        value: &str,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidDirectiveValue {
            directive: directive.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path, source } => {
                Error::ConfigNotFound { path, source }
            }
            ConfigError::Parse {
                path,
                line,
                content,
            } => Error::ConfigParse {
                path,
                line,
                content,
            },
        }
    }
}

impl From<DirectiveError> for Error {
    fn from(err: DirectiveError) -> Self {
        match err {
            DirectiveError::InvalidValue {
                directive,
                value,
                reason,
            } => Error::InvalidDirectiveValue {
                directive,
                value,
                reason,
            },
        }
    }
}

impl From<SubjectError> for Error {
    fn from(err: SubjectError) -> Self {
        let value = err.input().to_string();
        Error::InvalidDirectiveValue {
            directive: "subject".into(),
            value,
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

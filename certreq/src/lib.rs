// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

pub mod algorithms;
pub mod args;
pub mod config;
pub mod crypto;
pub mod directive;
pub mod error;
pub mod merge;
pub mod subject;
pub mod workflow;

pub use error::{Error, Result};

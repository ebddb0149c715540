// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

mod env;
mod error;
mod params;
mod store;

pub use env::*;
pub use error::ConfigError;
pub use params::*;
pub use store::*;

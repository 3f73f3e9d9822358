// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network-server credentials, loaded once at startup.
//!
//! Credentials travel as an explicit [`ServerContext`] handed to the
//! transports; nothing in this crate reads the environment after startup
//! and there is no process-wide mutable state.

use std::env;
use std::fmt;

/// Environment variable naming the network-server host.
pub const ENV_SERVER: &str = "SERVER";
/// Environment variable holding the API bearer token.
pub const ENV_API_TOKEN: &str = "API_TOKEN";

/// Connection parameters shared by the control-plane and broker clients.
#[derive(Debug, Clone)]
pub struct ServerContext {
    /// Network-server host; ports are supplied per channel.
    pub server: String,
    /// Bearer token for the control-plane API.
    pub api_token: String,
}

/// Missing or empty credential variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextError {
    variable: &'static str,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} and {} must be set ({} is missing)",
            ENV_SERVER, ENV_API_TOKEN, self.variable
        )
    }
}

impl std::error::Error for ContextError {}

impl ServerContext {
    /// Read the context from `SERVER` and `API_TOKEN`.
    ///
    /// Empty values count as missing; callers terminate before any network
    /// activity when this fails.
    pub fn from_env() -> Result<Self, ContextError> {
        let server = read_var(ENV_SERVER)?;
        let api_token = read_var(ENV_API_TOKEN)?;
        Ok(Self { server, api_token })
    }
}

fn read_var(variable: &'static str) -> Result<String, ContextError> {
    match env::var(variable) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ContextError { variable }),
    }
}

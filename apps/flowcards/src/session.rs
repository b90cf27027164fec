//! Session boundary: resolves the acting user once per invocation.
//!
//! Every store and sync operation takes the username as an explicit
//! parameter; this adapter is the only place that reads it from the
//! environment.

use anyhow::{bail, Result};

/// Environment variable naming the acting user.
pub const SESSION_ENV: &str = "FLOWCARDS_USER";

#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
}

impl Session {
    /// An explicit flag wins over the environment.
    pub fn resolve(flag: Option<String>) -> Result<Self> {
        let username = match flag {
            Some(user) if !user.trim().is_empty() => user,
            _ => match std::env::var(SESSION_ENV) {
                Ok(user) if !user.trim().is_empty() => user,
                _ => bail!("no user selected; pass --user or set {SESSION_ENV}"),
            },
        };
        Ok(Self { username })
    }
}

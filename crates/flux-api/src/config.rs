//! Environment-derived configuration. Grounded on
//! `everruns-control-plane::main`'s inline `std::env::var` +
//! `anyhow::Context` reads — no separate config crate.

use anyhow::Context;
use uuid::Uuid;

pub struct Config {
    pub database_url: String,
    pub scheduler_base_url: String,
    pub subject_directory_base_url: String,
    pub email_base_url: String,
    pub bind_addr: String,
    /// Base URL the coordinator's own callback endpoints (process/task) are
    /// mounted under, handed to `flux-engine`'s `OperationRegistry` and
    /// `flux-coordinator`'s task schedulers.
    pub callback_base_url: String,
    /// Replaces the original's hardcoded fallback-admin UUID (see
    /// `flux_requests::reassign_assignee`).
    pub fallback_assignee: Uuid,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?,
            scheduler_base_url: std::env::var("SCHEDULER_BASE_URL")
                .context("SCHEDULER_BASE_URL environment variable required")?,
            subject_directory_base_url: std::env::var("SUBJECT_DIRECTORY_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9100".to_string()),
            email_base_url: std::env::var("EMAIL_BASE_URL").unwrap_or_else(|_| "http://localhost:9200".to_string()),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            callback_base_url: std::env::var("CALLBACK_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/flux/1.0".to_string()),
            fallback_assignee: std::env::var("FALLBACK_ASSIGNEE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(Uuid::nil),
        })
    }
}

use serde::Deserialize;
use tracing::{info, warn};

use crate::runtime::EntryPoint;

pub const DEFAULT_ENTRY_URL: &str = "background.bundle";
pub const DEFAULT_THREAD_NAME: &str = "background-runtime";

const ENV_ENTRY_URL: &str = "BACKGROUND_ENTRY_URL";
const ENV_THREAD_NAME: &str = "BACKGROUND_THREAD_NAME";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Entry point used when `start` is called without one.
    pub default_entry_url: String,
    /// Name of the dedicated background thread.
    pub thread_name: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_entry_url: DEFAULT_ENTRY_URL.to_string(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl ManagerConfig {
    /// Resolve from `BACKGROUND_ENTRY_URL` and `BACKGROUND_THREAD_NAME`,
    /// falling back to defaults for unset or blank values.
    #[must_use]
    pub fn from_env() -> Self {
        Self::resolve(|name| std::env::var(name).ok())
    }

    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let (default_entry_url, entry_url_source) = match lookup(ENV_ENTRY_URL) {
            Some(value) if value.trim().is_empty() => {
                warn!(
                    var = ENV_ENTRY_URL,
                    "Blank entry URL; falling back to default"
                );
                (DEFAULT_ENTRY_URL.to_string(), "default_invalid_env")
            }
            Some(value) => (value, "env"),
            None => (DEFAULT_ENTRY_URL.to_string(), "default"),
        };

        let (thread_name, thread_name_source) = match lookup(ENV_THREAD_NAME) {
            Some(value) if value.trim().is_empty() || value.contains('\0') => {
                warn!(
                    var = ENV_THREAD_NAME,
                    "Invalid thread name; falling back to default"
                );
                (DEFAULT_THREAD_NAME.to_string(), "default_invalid_env")
            }
            Some(value) => (value, "env"),
            None => (DEFAULT_THREAD_NAME.to_string(), "default"),
        };

        info!(
            default_entry_url = %default_entry_url,
            entry_url_source,
            thread_name = %thread_name,
            thread_name_source,
            "Resolved background manager configuration"
        );

        Self {
            default_entry_url,
            thread_name,
        }
    }

    /// The explicit entry point if given, the configured default otherwise.
    #[must_use]
    pub fn entry_point(&self, entry_url: Option<&str>) -> EntryPoint {
        EntryPoint::new(entry_url.unwrap_or(&self.default_entry_url))
    }
}

//! Configuration for the search layer.
//!
//! [`SearchConfig`] is read once at startup and treated as read-only
//! afterwards. It can be built programmatically, deserialized with serde, or
//! read from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SEARCH_ASYNC_INDEXING` | false | Fire-and-forget index mutations |
//! | `SEARCH_READ_FROM_INDEX` | false | Materialize results from the index only |
//! | `SEARCH_SHARED_RESOURCE_NAME` | 0 | Name of the shared table/index |
//! | `SEARCH_DEFAULT_PAGE_SIZE` | 30 | Default page size |
//! | `SEARCH_MAX_PAGES` | 1000 | Highest page number honored |
//! | `SEARCH_RESOURCE_PREFIX` | platform | Prefix for physical resource names |
//! | `SEARCH_ROOT_TENANT` | platform | Tenant used by tenant-implicit calls |
//! | `SEARCH_SCROLL_PAGE_SIZE` | 100 | Page size of scroll-based bulk deletes |
//! | `SEARCH_SCROLL_KEEP_ALIVE` | 60 | Scroll keep-alive (seconds) |
//! | `SEARCH_CONSISTENT_READS` | true | Consistent reads for store lookups |
//! | `SEARCH_STRICT_QUERY_SYNTAX` | false | Reject unparsable free text instead of matching all |
//!
//! # Example
//!
//! ```
//! use kestrel_search::SearchConfig;
//!
//! let config = SearchConfig {
//!     async_indexing: true,
//!     resource_prefix: "acme".to_string(),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Configuration consumed by the search and lifecycle components.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "kestrel-search")]
#[serde(default)]
pub struct SearchConfig {
    /// Return from index mutations without waiting for acknowledgment.
    #[arg(long, env = "SEARCH_ASYNC_INDEXING", default_value = "false")]
    pub async_indexing: bool,

    /// Build query results from index sources instead of the primary store.
    #[arg(long, env = "SEARCH_READ_FROM_INDEX", default_value = "false")]
    pub read_from_index: bool,

    /// Name of the physical resource shared by all shared tenants.
    #[arg(long, env = "SEARCH_SHARED_RESOURCE_NAME", default_value = "0")]
    pub shared_resource_name: String,

    /// Page size used when the caller does not supply one.
    #[arg(long, env = "SEARCH_DEFAULT_PAGE_SIZE", default_value = "30")]
    pub default_page_size: u32,

    /// Highest page number that produces a non-zero offset.
    #[arg(long, env = "SEARCH_MAX_PAGES", default_value = "1000")]
    pub max_pages: u32,

    /// Platform prefix for dedicated physical resource names.
    #[arg(long, env = "SEARCH_RESOURCE_PREFIX", default_value = "platform")]
    pub resource_prefix: String,

    /// Tenant used by the tenant-implicit operations.
    #[arg(long, env = "SEARCH_ROOT_TENANT", default_value = "platform")]
    pub root_tenant: String,

    /// Number of hits fetched per scroll page during bulk unindexing.
    #[arg(long, env = "SEARCH_SCROLL_PAGE_SIZE", default_value = "100")]
    pub scroll_page_size: u32,

    /// Scroll cursor keep-alive in seconds.
    #[arg(long, env = "SEARCH_SCROLL_KEEP_ALIVE", default_value = "60")]
    pub scroll_keep_alive_secs: u64,

    /// Use consistent reads when fetching from the primary store.
    #[arg(long, env = "SEARCH_CONSISTENT_READS", default_value = "true")]
    pub consistent_reads: bool,

    /// Reject unparsable free-text queries instead of matching everything.
    #[arg(long, env = "SEARCH_STRICT_QUERY_SYNTAX", default_value = "false")]
    pub strict_query_syntax: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            async_indexing: false,
            read_from_index: false,
            shared_resource_name: "0".to_string(),
            default_page_size: 30,
            max_pages: 1000,
            resource_prefix: "platform".to_string(),
            root_tenant: "platform".to_string(),
            scroll_page_size: 100,
            scroll_keep_alive_secs: 60,
            consistent_reads: true,
            strict_query_syntax: false,
        }
    }
}

impl SearchConfig {
    /// Creates a configuration from environment variables.
    ///
    /// Unset variables take their defaults; an unparsable environment falls
    /// back to [`SearchConfig::default`].
    pub fn from_env() -> Self {
        Self::try_parse_from(["kestrel-search"]).unwrap_or_default()
    }

    /// Returns the scroll keep-alive as a duration.
    pub fn scroll_keep_alive(&self) -> Duration {
        Duration::from_secs(self.scroll_keep_alive_secs)
    }

    /// Largest page size a caller may request.
    pub fn max_limit(&self) -> u32 {
        self.max_pages.saturating_mul(self.default_page_size)
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.default_page_size == 0 {
            errors.push("Default page size cannot be 0".to_string());
        }

        if self.max_pages == 0 {
            errors.push("Max pages cannot be 0".to_string());
        }

        if self.scroll_page_size == 0 {
            errors.push("Scroll page size cannot be 0".to_string());
        }

        if self.resource_prefix.trim().is_empty() {
            errors.push("Resource prefix cannot be blank".to_string());
        }

        if self.shared_resource_name.trim().is_empty()
            || self.shared_resource_name.chars().any(char::is_whitespace)
        {
            errors.push("Shared resource name must be non-blank without whitespace".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SearchConfig::default();
        assert!(!config.async_indexing);
        assert!(!config.read_from_index);
        assert_eq!(config.shared_resource_name, "0");
        assert_eq!(config.default_page_size, 30);
        assert_eq!(config.max_pages, 1000);
        assert_eq!(config.resource_prefix, "platform");
        assert_eq!(config.scroll_keep_alive(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_errors() {
        let config = SearchConfig {
            default_page_size: 0,
            shared_resource_name: "a b".to_string(),
            resource_prefix: " ".to_string(),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"async_indexing": true, "max_pages": 5}"#).unwrap();
        assert!(config.async_indexing);
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.default_page_size, 30);
        assert_eq!(config.max_limit(), 150);
    }

    #[test]
    fn test_config_parse_args() {
        let config = SearchConfig::try_parse_from([
            "kestrel-search",
            "--resource-prefix",
            "acme",
            "--default-page-size",
            "10",
        ])
        .unwrap();
        assert_eq!(config.resource_prefix, "acme");
        assert_eq!(config.default_page_size, 10);
    }
}

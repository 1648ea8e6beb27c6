//! Memory store configuration.

use std::env;

/// Memory store configuration.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Most items a single `Query` or `Scan` page returns.
    pub page_size: usize,
    /// Most table names a single `ListTables` page returns.
    pub list_tables_page_size: usize,
    /// `DescribeTable` calls that report `CREATING` before a new table turns
    /// `ACTIVE`. Zero makes tables active on creation.
    pub activation_polls: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            list_tables_page_size: 100,
            activation_polls: 1,
        }
    }
}

impl MemoryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            page_size: env_parse("DYNORM_MEMORY_PAGE_SIZE", defaults.page_size).max(1),
            list_tables_page_size: env_parse(
                "DYNORM_MEMORY_LIST_TABLES_PAGE_SIZE",
                defaults.list_tables_page_size,
            )
            .max(1),
            activation_polls: env_parse("DYNORM_MEMORY_ACTIVATION_POLLS", defaults.activation_polls),
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_list_tables_page_size(mut self, page_size: usize) -> Self {
        self.list_tables_page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_activation_polls(mut self, polls: u32) -> Self {
        self.activation_polls = polls;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

//! Infrastructure layer: configuration, logging, HTTP, credential storage and HTML parsing
//!
//! The engine's `SigefFetcher` is the only consumer of the HTTP client, cookie
//! store and parser; configuration and logging are wired by the binary.

pub mod config;
pub mod cookies;
pub mod http_client;
pub mod logging;
pub mod parsing;

pub use config::{AppConfig, ConfigManager, ConsultConfig, LoggingConfig, RuntimeConfig};
pub use cookies::{CookieStore, CookieStoreError};
pub use http_client::{HttpClient, HttpClientConfig, HttpError, HttpPage};
pub use logging::{init_logging, init_logging_with_config};
pub use parsing::{ParcelDetailParser, ParsingError};

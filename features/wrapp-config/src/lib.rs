//! Wrapp Config provides a registry of configs that can be injected into extensions.
//!
//! Wrapp Config is split into two major parts:
//! 1. ConfigProvider: Used to create the registry of all configs. It is registered with the
//!    loader as an already instantiated extension.
//! 2. Config<T>: A wrapper type to resolve and retrieve configs inside an initializer
//!
//! # Examples
//!
//! ```rust
//! use wrapp_config::ConfigProvider;
//!
//! #[derive(Clone)]
//! struct AppConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! let mut config_provider = ConfigProvider::new();
//! config_provider
//!     .add_config(AppConfig {
//!         host: "localhost".to_string(),
//!         port: 8080,
//!     })
//!     .unwrap();
//!
//! let retrieved_config = config_provider.get_config::<AppConfig>().unwrap();
//! assert_eq!(retrieved_config.host, "localhost");
//! assert_eq!(retrieved_config.port, 8080);
//!
//! // Extensions depending on this one can resolve `Config<AppConfig>`
//! let config_extension = config_provider.into_extension();
//! assert!(config_extension.is_instantiated());
//! ```

pub mod config;
pub mod errors;
pub mod provider;

pub use config::Config;
pub use errors::ConfigError;
pub use provider::{ConfigProvider, CONFIG_EXTENSION_NAME};

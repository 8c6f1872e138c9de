use std::{any::type_name, ops::Deref, sync::Arc};

use wrapp_loader::{Dependencies, Injectable, RequireError, Resolver};

use crate::provider::ConfigProvider;

/// A wrapper type to allow for config injections
///
/// This provides a simple way to retrieve configs from the config registry
/// inside an extension's initializer. The extension must depend on the
/// config provider extension.
///
/// # Example
/// ```rust
/// use wrapp_config::{Config, ConfigProvider};
/// use wrapp_loader::{Extension, Loader, RequireError};
///
/// pub struct ServerConfig {
///     port: u16,
/// }
/// pub struct Server {
///     port: u16,
/// }
///
/// let mut provider = ConfigProvider::new();
/// provider.add_config(ServerConfig { port: 8080 }).unwrap();
/// let config = provider.into_extension();
///
/// let server = Extension::builder("server")
///     .depends_on(&config)
///     .from_fn(|dependencies, _| async move {
///         let config = dependencies.resolve::<Config<ServerConfig>>()?;
///         Ok::<_, RequireError>(Server { port: config.port })
///     });
///
/// let loader = Loader::from_root(&server).unwrap();
/// futures::executor::block_on(loader.run()).unwrap();
/// ```
pub struct Config<T> {
    inner: Arc<T>,
}
impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Injectable> Resolver for Config<T> {
    fn resolve(dependencies: &Dependencies) -> Result<Self, RequireError>
    where
        Self: Sized,
    {
        let config_provider = dependencies.resolve::<Arc<ConfigProvider>>()?;

        let config: Arc<T> = config_provider
            .get_config()
            .ok_or_else(|| RequireError::TypeMissing(type_name::<T>()))?;

        Ok(Config { inner: config })
    }
}

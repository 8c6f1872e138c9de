use std::sync::Arc;

use futures::task::Spawn;

use crate::{
    dependency_graph::DependencyGraph,
    errors::DependencyGraphErrors,
    extension::Extension,
    loader::{DynSpawner, Loader},
    types::Injectable,
};

/// Collects extensions and loader settings before the [`Loader`] is created
///
/// Nothing is instantiated by [`LoaderBuilder::build`] - call [`Loader::run`] afterwards.
#[derive(Default)]
pub struct LoaderBuilder {
    /// Registered extensions, dependencies are added transitively on build
    extensions: Vec<Extension>,
    spawner: Option<DynSpawner>,
}

impl LoaderBuilder {
    pub fn new() -> Self {
        LoaderBuilder {
            extensions: Vec::new(),
            spawner: None,
        }
    }

    pub fn add_extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Registers an already created value as an instantiated extension
    pub fn add_instance<T: Injectable>(mut self, name: impl Into<Arc<str>>, instance: T) -> Self {
        self.extensions.push(Extension::from_instance(name, instance));
        self
    }

    /// Sets the executor used for background instantiation started by [`Loader::load`]
    ///
    /// Without a spawner every `load` drives its instantiation on a dedicated thread.
    pub fn spawner(mut self, spawner: impl Spawn + Send + Sync + 'static) -> Self {
        self.spawner = Some(Arc::new(spawner));
        self
    }

    pub fn build(self) -> Result<Loader, DependencyGraphErrors> {
        let graph = DependencyGraph::from_extensions(&self.extensions)?;
        tracing::debug!(
            "Built loader with {} extensions ({} declared)",
            graph.len(),
            self.extensions.len()
        );
        Ok(Loader::with_spawner(graph, self.spawner))
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures::executor::{block_on, ThreadPool};

    use super::*;

    #[test]
    fn build_registers_dependencies_without_instantiating() {
        let base = Extension::builder("base").from_fn(|_, _| async { Ok::<_, Infallible>(1_u8) });
        let top = Extension::builder("top")
            .depends_on(&base)
            .from_fn(|_, _| async { Ok::<_, Infallible>(2_u8) });

        let loader = LoaderBuilder::new()
            .add_extension(top.clone())
            .add_instance("settings", "verbose".to_string())
            .build()
            .unwrap();

        let names: Vec<_> = loader
            .extensions()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, ["base", "top", "settings"]);
        assert!(!top.is_instantiated());

        block_on(loader.run()).unwrap();
        assert!(top.is_instantiated());
    }

    #[test]
    fn configured_spawner_runs_background_loads() {
        let pool = ThreadPool::builder().pool_size(1).create().unwrap();
        let loader = Loader::builder().spawner(pool).build().unwrap();
        let late = Extension::builder("late").from_fn(|_, _| async { Ok::<_, Infallible>("ready") });

        let handle = loader.load(vec![late.clone()]).unwrap();
        let instances = block_on(handle).unwrap();

        assert_eq!(instances.len(), 1);
        assert_eq!(*instances[0].downcast::<&str>().unwrap(), "ready");
        assert!(late.is_instantiated());
    }

    #[test]
    fn build_rejects_duplicate_names() {
        let result = LoaderBuilder::new()
            .add_instance("twice", 1_u8)
            .add_instance("twice", 2_u8)
            .build();

        assert!(result.is_err());
    }
}

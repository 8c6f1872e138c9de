use std::{
    fmt::Debug,
    future::Future,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
};

use crate::{
    loader::Loader,
    resolver::Dependencies,
    types::{DynError, ExtensionId, ExtensionInfo, Injectable, Instance, TypeInfo},
};

/// Initialization routine of an extension
pub trait ExtensionFactory: Send + Sync + 'static {
    type Provides: Injectable;

    /// Returns the typeinfo about the factory's provided type
    fn supplies() -> TypeInfo {
        TypeInfo::of::<Self::Provides>()
    }

    /// Constructs the extension's instance
    ///
    /// `dependencies` holds the instances of the declared dependencies in declaration order.
    /// `loader` may be used to drive loading of further extensions.
    fn construct(
        &self,
        dependencies: Dependencies,
        loader: Loader,
    ) -> impl Future<Output = Result<Self::Provides, impl Into<DynError>>> + Send + '_;
}

/// Adapts a closure into an [`ExtensionFactory`]
pub struct FnFactory<F>(F);
impl<F, Fut, T, E> ExtensionFactory for FnFactory<F>
where
    F: Fn(Dependencies, Loader) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Injectable,
    E: Into<DynError> + 'static,
{
    type Provides = T;

    fn construct(
        &self,
        dependencies: Dependencies,
        loader: Loader,
    ) -> impl Future<Output = Result<T, impl Into<DynError>>> + Send + '_ {
        (self.0)(dependencies, loader)
    }
}

/// Wrapper Trait for factories, providing instances of Any
pub(crate) trait DynFactory: Send + Sync {
    fn supplies(&self) -> TypeInfo;

    fn construct(
        &self,
        dependencies: Dependencies,
        loader: Loader,
    ) -> Box<dyn Future<Output = Result<Instance, DynError>> + Send + '_>;
}
// Impl DynFactory for any ExtensionFactory
impl<T: Injectable, SpecificFactory: ExtensionFactory<Provides = T>> DynFactory
    for SpecificFactory
{
    fn supplies(&self) -> TypeInfo {
        SpecificFactory::supplies()
    }

    fn construct(
        &self,
        dependencies: Dependencies,
        loader: Loader,
    ) -> Box<dyn Future<Output = Result<Instance, DynError>> + Send + '_> {
        let construction_fut = async move {
            // Forward the call to the specific implementation
            SpecificFactory::construct(self, dependencies, loader)
                .await
                .map(Instance::new)
                .map_err(|e| e.into())
        };

        Box::new(construction_fut)
    }
}

/// A named unit with declared dependencies and an initializer producing its instance
///
/// `Extension` is a handle - cloning it yields another reference to the same extension.
/// Equality and hashing use the extension's identity, never its name.
///
/// Dependencies are fixed when the extension is built, so an extension can only depend
/// on extensions which already exist. Dependency graphs are acyclic by construction.
#[derive(Clone)]
pub struct Extension(Arc<ExtensionInner>);
struct ExtensionInner {
    info: ExtensionInfo,
    dependencies: Vec<Extension>,
    /// Set once the initializer succeeded
    instance: OnceLock<Instance>,
    /// None for extensions created from an existing instance
    factory: Option<Box<dyn DynFactory>>,
}

impl Extension {
    /// Starts building an extension with the given name
    pub fn builder(name: impl Into<Arc<str>>) -> ExtensionBuilder {
        ExtensionBuilder {
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    /// Creates an extension which is already instantiated
    ///
    /// Its instance is available to dependents without any initializer running.
    pub fn from_instance<T: Injectable>(name: impl Into<Arc<str>>, instance: T) -> Self {
        let extension = Self::new(name.into(), Vec::new(), None);
        let _ = extension.0.instance.set(Instance::new(instance));
        extension
    }

    fn new(
        name: Arc<str>,
        dependencies: Vec<Extension>,
        factory: Option<Box<dyn DynFactory>>,
    ) -> Self {
        Extension(Arc::new(ExtensionInner {
            info: ExtensionInfo {
                id: ExtensionId::next(),
                name,
            },
            dependencies,
            instance: OnceLock::new(),
            factory,
        }))
    }

    pub fn id(&self) -> ExtensionId {
        self.0.info.id
    }

    pub fn name(&self) -> &str {
        &self.0.info.name
    }

    pub fn info(&self) -> &ExtensionInfo {
        &self.0.info
    }

    /// Declared dependencies, in declaration order
    pub fn dependencies(&self) -> &[Extension] {
        &self.0.dependencies
    }

    /// The recorded instance, if the extension has been instantiated
    pub fn instance(&self) -> Option<Instance> {
        self.0.instance.get().cloned()
    }

    pub fn is_instantiated(&self) -> bool {
        self.0.instance.get().is_some()
    }

    /// Type of the instance this extension provides, if known before instantiation
    pub fn provides(&self) -> Option<TypeInfo> {
        match (&self.0.factory, self.0.instance.get()) {
            (Some(factory), _) => Some(factory.supplies()),
            (None, Some(instance)) => Some(instance.info),
            (None, None) => None,
        }
    }

    /// Runs the initializer and records the produced instance
    ///
    /// Callers are expected to go through [`Loader::run_one`], which resolves
    /// `dependencies` and guarantees a single run per extension.
    /// A failed run leaves the extension uninstantiated.
    pub async fn run(&self, dependencies: Dependencies, loader: Loader) -> Result<Instance, DynError> {
        if let Some(instance) = self.instance() {
            return Ok(instance);
        }
        let Some(factory) = &self.0.factory else {
            return Err(format!("extension '{}' has no initializer", self.name()).into());
        };

        let instance = Box::into_pin(factory.construct(dependencies, loader)).await?;

        // Keep the first recorded instance should a concurrent run have finished before us
        Ok(self.0.instance.get_or_init(|| instance).clone())
    }
}

impl PartialEq for Extension {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
impl Eq for Extension {}
impl Hash for Extension {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}
impl Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name())
            .field("id", &self.id())
            .field(
                "dependencies",
                &self.dependencies().iter().map(Extension::name).collect::<Vec<_>>(),
            )
            .field("instantiated", &self.is_instantiated())
            .finish()
    }
}

pub struct ExtensionBuilder {
    name: Arc<str>,
    dependencies: Vec<Extension>,
}
impl ExtensionBuilder {
    /// Declares a dependency - its instance is passed to the initializer at the next free position
    pub fn depends_on(mut self, dependency: &Extension) -> Self {
        self.dependencies.push(dependency.clone());
        self
    }

    pub fn depends_on_all<'a>(mut self, dependencies: impl IntoIterator<Item = &'a Extension>) -> Self {
        self.dependencies.extend(dependencies.into_iter().cloned());
        self
    }

    pub fn factory<Factory: ExtensionFactory>(self, factory: Factory) -> Extension {
        Extension::new(self.name, self.dependencies, Some(Box::new(factory)))
    }

    /// Uses a closure as the initializer
    pub fn from_fn<F, Fut, T, E>(self, init: F) -> Extension
    where
        F: Fn(Dependencies, Loader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Injectable,
        E: Into<DynError> + 'static,
    {
        self.factory(FnFactory(init))
    }
}

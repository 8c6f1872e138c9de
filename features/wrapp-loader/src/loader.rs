use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError, RwLock},
    task::{Context, Poll},
    thread,
};

use futures::{
    future::{self, BoxFuture, Shared, WeakShared},
    task::{Spawn, SpawnExt},
    FutureExt,
};
use futures_channel::oneshot;

use crate::{
    builder::LoaderBuilder,
    dependency_graph::DependencyGraph,
    errors::{
        CircularRequestError, DependencyGraphErrors, ExtensionLoadError, LoadTaskError,
        RegisterError,
    },
    extension::Extension,
    resolver::Dependencies,
    types::{ExtensionId, ExtensionInfo, Instance},
};

type Instantiation = Shared<BoxFuture<'static, Result<Instance, ExtensionLoadError>>>;
type PendingInstantiation = WeakShared<BoxFuture<'static, Result<Instance, ExtensionLoadError>>>;

/// Spawner used for the background sweep of [`Loader::load`]
pub type DynSpawner = Arc<dyn Spawn + Send + Sync>;

/// Instantiates extensions in dependency order
///
/// `Loader` is a handle - clones share the same graph and in-flight instantiations.
/// Every extension is instantiated at most once, no matter how many callers request it
/// concurrently.
///
/// The handle given to an initializer remembers which extensions are waiting on it, so
/// requesting one of them through that handle fails instead of never finishing.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<LoaderInner>,
    /// Extensions this handle instantiates on behalf of, outermost first
    instantiating: Arc<[ExtensionInfo]>,
}
struct LoaderInner {
    graph: RwLock<DependencyGraph>,
    /// Instantiations which have been started but not finished yet
    ///
    /// Only the requesters keep an instantiation alive. Once all of them are dropped
    /// the entry is stale and the next request starts over.
    in_flight: Mutex<HashMap<ExtensionId, PendingInstantiation>>,
    /// Runs the sweep started by `load` - a dedicated thread is used if not set
    spawner: Option<DynSpawner>,
}

impl Loader {
    /// Creates a loader over an existing graph
    pub fn new(graph: DependencyGraph) -> Self {
        Self::with_spawner(graph, None)
    }

    pub(crate) fn with_spawner(graph: DependencyGraph, spawner: Option<DynSpawner>) -> Self {
        Loader {
            inner: Arc::new(LoaderInner {
                graph: RwLock::new(graph),
                in_flight: Mutex::new(HashMap::new()),
                spawner,
            }),
            instantiating: Arc::from(Vec::new()),
        }
    }

    /// Builds the graph of `root` and everything it depends on, without instantiating anything
    pub fn from_root(root: &Extension) -> Result<Self, DependencyGraphErrors> {
        Ok(Self::new(DependencyGraph::from_root(root)?))
    }

    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::new()
    }

    /// All registered extensions in registration order
    pub fn extensions(&self) -> Vec<Extension> {
        self.read_graph().vertices().to_vec()
    }

    /// The recorded instance of the extension registered as `name`
    pub fn instance_of(&self, name: &str) -> Option<Instance> {
        self.read_graph().get(name).and_then(Extension::instance)
    }

    /// Registers extensions and instantiates them in the background
    ///
    /// Registration completes before this returns, so the new extensions may reference
    /// each other. Instantiation continues independently of the caller - the returned
    /// [`LoadHandle`] resolves once it finished, dropping it does not cancel the work.
    ///
    /// An initializer may call `load`, but must not await the returned handle if the
    /// loaded extensions depend on its own extension.
    pub fn load(&self, extensions: Vec<Extension>) -> Result<LoadHandle, RegisterError> {
        let added = self.write_graph().add_extensions(&extensions)?;
        tracing::debug!(
            "Loading {} extensions ({} newly registered)",
            extensions.len(),
            added.len()
        );

        let (result_tx, result_rx) = oneshot::channel();
        // The sweep runs on its own, nobody up the chain is waiting for it
        let loader = self.detached();
        let sweep = async move {
            let result = loader.run_all(&extensions).await;
            if let Err(e) = &result {
                tracing::warn!("Background instantiation failed: {e}");
            }
            // Error can be ignored, it just means nobody is waiting
            let _ = result_tx.send(result);
        };

        match &self.inner.spawner {
            Some(spawner) => spawner.spawn(sweep)?,
            None => {
                // We don't join the thread - it ends with the sweep
                thread::Builder::new()
                    .name("wrapp-loader".to_string())
                    .spawn(move || futures::executor::block_on(sweep))?;
            }
        }

        Ok(LoadHandle { result_rx })
    }

    /// Instantiates every registered extension in execution order
    ///
    /// Extensions are processed one after another. The first failure aborts the sweep,
    /// extensions later in the order are not started.
    pub async fn run(&self) -> Result<(), ExtensionLoadError> {
        // Recomputed every run, so extensions added through `load` are included
        let execution_order = self.read_graph().by_execution_order();
        tracing::debug!("Running {} extensions", execution_order.len());

        self.run_all(&execution_order).await?;

        tracing::debug!("All extensions instantiated");
        Ok(())
    }

    /// Instantiates a single extension, instantiating its dependencies first
    ///
    /// Returns the memoized instance if the extension is already instantiated. Concurrent
    /// callers for the same extension share one instantiation and observe the same outcome.
    ///
    /// A failure of the extension's own initializer is returned as an [`ExtensionLoadError`]
    /// referencing it; a failing dependency's error is returned unchanged. A failed extension
    /// stays uninstantiated and is attempted again by the next call.
    ///
    /// An initializer requesting its own extension, or any extension waiting on it, through
    /// the loader handle it was given gets an [`ExtensionLoadError`] caused by a
    /// [`CircularRequestError`].
    ///
    /// Dropping the returned future before it completes abandons the instantiation once no
    /// other requester is waiting for it. The next request starts it again.
    pub fn run_one(
        &self,
        extension: &Extension,
    ) -> BoxFuture<'static, Result<Instance, ExtensionLoadError>> {
        if let Some(instance) = extension.instance() {
            return future::ready(Ok(instance)).boxed();
        }

        if self.is_instantiating(extension) {
            let error = CircularRequestError {
                requested: extension.info().clone(),
                instantiating: self.instantiating.to_vec(),
            };
            tracing::warn!("{error}");
            let error = ExtensionLoadError::new(extension.info().clone(), error.into());
            return future::ready(Err(error)).boxed();
        }

        let instantiation = {
            let mut in_flight = self.lock_in_flight();

            // Double check - it might have finished while we waited for the lock
            if let Some(instance) = extension.instance() {
                return future::ready(Ok(instance)).boxed();
            }

            match in_flight.get(&extension.id()).and_then(WeakShared::upgrade) {
                Some(pending) => pending,
                None => {
                    tracing::trace!("Starting instantiation of '{}'", extension.name());
                    let instantiation: Instantiation =
                        self.clone().instantiate(extension.clone()).boxed().shared();
                    if let Some(pending) = instantiation.downgrade() {
                        in_flight.insert(extension.id(), pending);
                    }
                    instantiation
                }
            }
        };

        instantiation.boxed()
    }

    /// Runs `run_one` for each extension, strictly one after another
    async fn run_all(&self, extensions: &[Extension]) -> Result<Vec<Instance>, ExtensionLoadError> {
        let mut instances = Vec::with_capacity(extensions.len());
        for extension in extensions {
            instances.push(self.run_one(extension).await?);
        }
        Ok(instances)
    }

    async fn instantiate(self, extension: Extension) -> Result<Instance, ExtensionLoadError> {
        let result = self
            .on_behalf_of(&extension)
            .resolve_and_run(&extension)
            .await;

        // The instance is recorded before the entry goes away, see `run_one`
        self.lock_in_flight().remove(&extension.id());

        result
    }

    async fn resolve_and_run(&self, extension: &Extension) -> Result<Instance, ExtensionLoadError> {
        let mut resolved = Vec::with_capacity(extension.dependencies().len());
        for dependency in extension.dependencies() {
            resolved.push(self.run_one(dependency).await?);
        }

        tracing::debug!(
            "Constructing '{}' with {} dependencies",
            extension.name(),
            resolved.len()
        );

        match extension.run(Dependencies::new(resolved), self.clone()).await {
            Ok(instance) => {
                tracing::debug!(
                    "Constructed '{}' providing {}",
                    extension.name(),
                    instance.info
                );
                Ok(instance)
            }
            Err(cause) => {
                tracing::debug!("Extension '{}' failed: {cause}", extension.name());
                Err(ExtensionLoadError::new(extension.info().clone(), cause))
            }
        }
    }

    /// Handle for everything requested while `extension` is being instantiated
    fn on_behalf_of(&self, extension: &Extension) -> Loader {
        let mut instantiating = self.instantiating.to_vec();
        instantiating.push(extension.info().clone());
        Loader {
            inner: self.inner.clone(),
            instantiating: instantiating.into(),
        }
    }

    fn detached(&self) -> Loader {
        Loader {
            inner: self.inner.clone(),
            instantiating: Arc::from(Vec::new()),
        }
    }

    fn is_instantiating(&self, extension: &Extension) -> bool {
        self.instantiating.iter().any(|info| info.id == extension.id())
    }

    fn read_graph(&self) -> std::sync::RwLockReadGuard<'_, DependencyGraph> {
        self.inner.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_graph(&self) -> std::sync::RwLockWriteGuard<'_, DependencyGraph> {
        self.inner.graph.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<ExtensionId, PendingInstantiation>> {
        self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("graph", &*self.read_graph())
            .field("in_flight", &self.lock_in_flight().len())
            .field("instantiating", &self.instantiating)
            .finish()
    }
}

/// Background instantiation started by [`Loader::load`]
///
/// Resolves to the instances of the loaded extensions, in the order they were passed.
/// Can be dropped if the outcome is not of interest - the instantiation carries on.
#[must_use = "dropping the handle discards the outcome of the background instantiation"]
pub struct LoadHandle {
    result_rx: oneshot::Receiver<Result<Vec<Instance>, ExtensionLoadError>>,
}
impl LoadHandle {
    /// Returns the outcome if the sweep has already finished
    pub fn try_result(&mut self) -> Option<Result<Vec<Instance>, LoadTaskError>> {
        match self.result_rx.try_recv() {
            Ok(Some(result)) => Some(result.map_err(LoadTaskError::from)),
            Ok(None) => None,
            Err(canceled) => Some(Err(canceled.into())),
        }
    }
}
impl Future for LoadHandle {
    type Output = Result<Vec<Instance>, LoadTaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.result_rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result.map_err(LoadTaskError::from)),
            Poll::Ready(Err(canceled)) => Poll::Ready(Err(canceled.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}

//! Wrapp Loader instantiates extensions in dependency order.
//!
//! An [`Extension`] is a named unit declaring the extensions it depends on and an
//! asynchronous initializer producing its [`Instance`]. The [`Loader`] owns a
//! [`DependencyGraph`] of all registered extensions and makes sure every extension is
//! instantiated exactly once, after all of its dependencies.
//!
//! Wrapp Loader consists of the following components:
//!
//! 1. Extension - the extension handle and the [`ExtensionFactory`] initializer trait
//! 2. Dependency Graph - registration and execution order of extensions
//! 3. Loader - memoized, dependency driven instantiation
//! 4. Resolver - typed access to dependency instances inside an initializer
//! 5. Errors
//!
//! # Examples
//!
//! ```rust
//! use std::{convert::Infallible, sync::Arc};
//!
//! use wrapp_loader::{Extension, Loader};
//!
//! struct Storage;
//! struct Search {
//!     storage: Arc<Storage>,
//! }
//!
//! let storage = Extension::builder("storage")
//!     .from_fn(|_, _| async { Ok::<_, Infallible>(Storage) });
//!
//! let search = Extension::builder("search")
//!     .depends_on(&storage)
//!     .from_fn(|dependencies, _| async move {
//!         let storage = dependencies.resolve::<Arc<Storage>>()?;
//!         Ok::<_, wrapp_loader::RequireError>(Search { storage })
//!     });
//!
//! let loader = Loader::from_root(&search).unwrap();
//! futures::executor::block_on(loader.run()).unwrap();
//!
//! assert!(storage.is_instantiated());
//! assert!(search.is_instantiated());
//! ```

pub mod builder;
pub mod dependency_graph;
pub mod errors;
pub mod extension;
pub mod loader;
pub mod resolver;
pub mod types;

pub use builder::LoaderBuilder;
pub use dependency_graph::DependencyGraph;
pub use errors::{
    CircularRequestError, DependencyGraphError, DependencyGraphErrors, ExtensionLoadError,
    LoadTaskError, RegisterError, RequireError,
};
pub use extension::{Extension, ExtensionBuilder, ExtensionFactory, FnFactory};
pub use loader::{DynSpawner, LoadHandle, Loader};
pub use resolver::{Dependencies, Resolver};
pub use types::{DynError, ExtensionId, ExtensionInfo, Injectable, Instance, TypeInfo};

use std::sync::Arc;

use futures::task::SpawnError;
use thiserror::Error;

use crate::types::{DynError, ExtensionInfo};

/// An extension's own initializer failed
///
/// Cloneable, so every caller waiting on the same instantiation observes the same failure.
#[derive(Debug, Clone)]
pub struct ExtensionLoadError {
    extension: ExtensionInfo,
    cause: Arc<DynError>,
}
impl ExtensionLoadError {
    pub(crate) fn new(extension: ExtensionInfo, cause: DynError) -> Self {
        Self {
            extension,
            cause: Arc::new(cause),
        }
    }

    /// The extension whose initializer failed
    pub fn extension(&self) -> &ExtensionInfo {
        &self.extension
    }

    /// The error returned by the initializer
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &**self.cause
    }
}
impl std::fmt::Display for ExtensionLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Extension '{}' failed to load - error: {}",
            self.extension, self.cause
        )
    }
}
impl std::error::Error for ExtensionLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause())
    }
}

/// An extension was requested from inside its own instantiation
///
/// Happens when an initializer awaits, through its loader handle, an extension which
/// can only finish after that initializer returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Extension '{requested}' was requested while it is being instantiated ({})",
    joined_names(.instantiating)
)]
pub struct CircularRequestError {
    pub requested: ExtensionInfo,
    /// Extensions being instantiated when the request was made, outermost first
    pub instantiating: Vec<ExtensionInfo>,
}

fn joined_names(extensions: &[ExtensionInfo]) -> String {
    let names: Vec<&str> = extensions.iter().map(|e| e.name.as_ref()).collect();
    names.join(" -> ")
}

/// Errors when trying to require a dependency inside an initializer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequireError {
    /// No dependency provides the required type
    #[error("No dependency provides '{0}'.")]
    TypeMissing(&'static str),

    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },

    #[error("Dependency index {index} is out of range, only {len} dependencies were declared")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyGraphError {
    #[error("Two different extensions are registered as '{name}'")]
    Duplicate { name: Arc<str> },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraphErrors {
    pub errors: Vec<DependencyGraphError>,
}
impl std::fmt::Display for DependencyGraphErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The dependency graph had one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

/// Errors while registering extensions through [`crate::Loader::load`]
#[derive(Error, Debug)]
pub enum RegisterError {
    #[error(transparent)]
    DependencyGraph(#[from] DependencyGraphErrors),
    /// The background sweep could not be handed to the spawner
    #[error("Failed to spawn background instantiation: {0}")]
    Spawn(#[from] SpawnError),
    /// The background sweep thread could not be started
    #[error("Failed to start background instantiation thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Outcome of a background sweep started by [`crate::Loader::load`]
#[derive(Error, Debug, Clone)]
pub enum LoadTaskError {
    #[error(transparent)]
    Failed(#[from] ExtensionLoadError),
    /// The sweep was dropped before reporting, e.g. its executor shut down
    #[error("Background instantiation ended without reporting a result")]
    Abandoned,
}
impl From<futures_channel::oneshot::Canceled> for LoadTaskError {
    fn from(_: futures_channel::oneshot::Canceled) -> Self {
        Self::Abandoned
    }
}

use std::slice;

use crate::{errors::RequireError, types::Instance};

pub mod arc;

/// Allows custom behaviour when pulling a dependency out of [`Dependencies`]
pub trait Resolver {
    fn resolve(dependencies: &Dependencies) -> Result<Self, RequireError>
    where
        Self: Sized;
}

/// Resolved instances of an extension's declared dependencies
///
/// Positions match the order in which the dependencies were declared.
#[derive(Clone, Debug, Default)]
pub struct Dependencies {
    instances: Vec<Instance>,
}
impl Dependencies {
    pub(crate) fn new(instances: Vec<Instance>) -> Self {
        Self { instances }
    }

    /// Resolves a dependency using the [`Resolver`] strategy of `R`
    ///
    /// ```ignore
    /// let storage = dependencies.resolve::<Arc<Storage>>()?;
    /// let metrics = dependencies.resolve::<Option<Arc<Metrics>>>()?;
    /// ```
    pub fn resolve<R: Resolver>(&self) -> Result<R, RequireError> {
        R::resolve(self)
    }

    /// The instance of the dependency declared at `index`
    pub fn get(&self, index: usize) -> Result<&Instance, RequireError> {
        self.instances
            .get(index)
            .ok_or(RequireError::IndexOutOfRange {
                index,
                len: self.instances.len(),
            })
    }

    pub fn iter(&self) -> slice::Iter<'_, Instance> {
        self.instances.iter()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
impl<'a> IntoIterator for &'a Dependencies {
    type Item = &'a Instance;
    type IntoIter = slice::Iter<'a, Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

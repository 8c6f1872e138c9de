use std::{any::type_name, sync::Arc};

use crate::{
    errors::RequireError,
    resolver::{Dependencies, Resolver},
    types::Injectable,
};

// Picks the first dependency providing `T`
impl<T: Injectable> Resolver for Arc<T> {
    fn resolve(dependencies: &Dependencies) -> Result<Self, RequireError> {
        let resolved = dependencies
            .iter()
            .find(|instance| instance.is::<T>())
            .ok_or(RequireError::TypeMissing(type_name::<T>()))?;

        resolved
            .downcast::<T>()
            .map_err(|actual_type| RequireError::DowncastFailed {
                required_type: type_name::<T>(),
                actual_type,
            })
    }
}

impl<Resolvable: Resolver> Resolver for Option<Resolvable> {
    fn resolve(dependencies: &Dependencies) -> Result<Self, RequireError>
    where
        Self: Sized,
    {
        match Resolvable::resolve(dependencies) {
            Ok(resolved) => Ok(Some(resolved)),
            // A missing dependency is not an error for Option
            Err(RequireError::TypeMissing(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

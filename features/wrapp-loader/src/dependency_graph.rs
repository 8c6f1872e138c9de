use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use crate::{
    errors::{DependencyGraphError, DependencyGraphErrors},
    extension::Extension,
    types::ExtensionId,
};

/// Graph of all registered extensions
///
/// Vertices are extensions, edges point from an extension to each of its dependencies.
/// The graph is closed: every dependency of a registered extension is registered as well.
#[derive(Default, Clone)]
pub struct DependencyGraph {
    /// Registration order
    vertices: Vec<Extension>,
    index: HashMap<ExtensionId, usize>,
    names: BTreeMap<Arc<str>, ExtensionId>,
}
impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph containing `root` and everything it transitively depends on
    pub fn from_root(root: &Extension) -> Result<Self, DependencyGraphErrors> {
        Self::from_extensions([root])
    }

    pub fn from_extensions<'a>(
        extensions: impl IntoIterator<Item = &'a Extension>,
    ) -> Result<Self, DependencyGraphErrors> {
        let extensions: Vec<Extension> = extensions.into_iter().cloned().collect();
        let mut graph = Self::new();
        graph.add_extensions(&extensions)?;
        Ok(graph)
    }

    /// Registers extensions together with all of their transitive dependencies
    ///
    /// Already registered extensions are skipped. Returns the newly registered extensions,
    /// dependencies before their dependents.
    ///
    /// Either all extensions are registered or, on error, none.
    pub fn add_extensions(
        &mut self,
        extensions: &[Extension],
    ) -> Result<Vec<Extension>, DependencyGraphErrors> {
        let mut added = Vec::new();
        let mut visited = HashSet::new();
        for extension in extensions {
            collect_new(self, &mut visited, &mut added, extension);
        }

        self.check_names(&added)?;

        for extension in &added {
            self.index.insert(extension.id(), self.vertices.len());
            self.names
                .insert(extension.info().name.clone(), extension.id());
            self.vertices.push(extension.clone());
        }

        tracing::debug!(
            "Registered {} extensions, graph now holds {}",
            added.len(),
            self.vertices.len()
        );

        return Ok(added);

        // Post-order walk, so dependencies are collected before their dependents
        fn collect_new(
            graph: &DependencyGraph,
            visited: &mut HashSet<ExtensionId>,
            added: &mut Vec<Extension>,
            extension: &Extension,
        ) {
            if graph.contains(extension) || !visited.insert(extension.id()) {
                return;
            }

            for dependency in extension.dependencies() {
                collect_new(graph, visited, added, dependency);
            }

            added.push(extension.clone());
        }
    }

    /// Names must identify a single extension within the graph
    fn check_names(&self, candidates: &[Extension]) -> Result<(), DependencyGraphErrors> {
        let mut errors = Vec::new();
        let mut seen: HashMap<&str, ExtensionId> = HashMap::new();

        for extension in candidates {
            let name = extension.info().name.clone();
            let clashes_registered = self.names.contains_key(&name);
            let clashes_candidate = seen
                .insert(extension.name(), extension.id())
                .is_some_and(|id| id != extension.id());

            if clashes_registered || clashes_candidate {
                let error = DependencyGraphError::Duplicate { name };
                if !errors.contains(&error) {
                    errors.push(error);
                }
            }
        }

        if !errors.is_empty() {
            return Err(DependencyGraphErrors { errors });
        }

        Ok(())
    }

    pub fn contains(&self, extension: &Extension) -> bool {
        self.index.contains_key(&extension.id())
    }

    /// All registered extensions in registration order
    pub fn vertices(&self) -> &[Extension] {
        &self.vertices
    }

    /// All `(dependent, dependency)` pairs
    pub fn edges(&self) -> impl Iterator<Item = (&Extension, &Extension)> + '_ {
        self.vertices.iter().flat_map(|extension| {
            extension
                .dependencies()
                .iter()
                .map(move |dependency| (extension, dependency))
        })
    }

    pub fn get(&self, name: &str) -> Option<&Extension> {
        let id = self.names.get(name)?;
        self.index.get(id).map(|position| &self.vertices[*position])
    }

    /// Registered extensions which directly depend on `extension`
    pub fn dependents_of<'a>(
        &'a self,
        extension: &'a Extension,
    ) -> impl Iterator<Item = &'a Extension> + 'a {
        self.edges()
            .filter(move |(_, dependency)| *dependency == extension)
            .map(|(dependent, _)| dependent)
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Linearizes the graph so every extension comes after all of its dependencies
    ///
    /// The order is deterministic: extensions are visited in registration order,
    /// dependencies in declaration order.
    pub fn by_execution_order(&self) -> Vec<Extension> {
        let mut ordered = Vec::with_capacity(self.vertices.len());
        let mut placed = HashSet::with_capacity(self.vertices.len());

        for extension in &self.vertices {
            place(&mut ordered, &mut placed, extension);
        }

        return ordered;

        fn place(
            ordered: &mut Vec<Extension>,
            placed: &mut HashSet<ExtensionId>,
            extension: &Extension,
        ) {
            if !placed.insert(extension.id()) {
                return;
            }

            for dependency in extension.dependencies() {
                place(ordered, placed, dependency);
            }

            ordered.push(extension.clone());
        }
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for extension in &self.vertices {
            let dependencies: Vec<_> = extension
                .dependencies()
                .iter()
                .map(Extension::name)
                .collect();
            map.entry(&extension.name(), &dependencies);
        }
        map.finish()
    }
}

use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use futures::{
    channel::oneshot,
    executor::{block_on, ThreadPool},
};
use wrapp_loader::{
    CircularRequestError, DependencyGraph, DynError, Extension, ExtensionLoadError,
    LoadTaskError, Loader, RegisterError, RequireError,
};

/// Records initializer calls and the dependency values each call received
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<(String, Vec<String>)>>>);
impl Journal {
    /// Extension providing its own name, initialized from its dependencies' names
    fn extension(&self, name: &str, dependencies: &[&Extension]) -> Extension {
        let journal = self.clone();
        let own_name = name.to_string();
        Extension::builder(name)
            .depends_on_all(dependencies.iter().copied())
            .from_fn(move |deps, _| {
                let received = deps
                    .iter()
                    .map(|instance| instance.downcast::<String>().map(|s| (*s).clone()))
                    .collect::<Result<Vec<_>, _>>();
                let journal = journal.clone();
                let own_name = own_name.clone();
                async move {
                    let received = received.map_err(|actual| format!("unexpected {actual}"))?;
                    journal.0.lock().unwrap().push((own_name.clone(), received));
                    Ok::<_, String>(own_name)
                }
            })
    }

    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(name, _)| name.clone()).collect()
    }

    fn received_by(&self, name: &str) -> Vec<Vec<String>> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| called == name)
            .map(|(_, received)| received.clone())
            .collect()
    }
}

fn failing(name: &str, calls: &Arc<AtomicUsize>) -> Extension {
    let calls = calls.clone();
    Extension::builder(name).from_fn(move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(std::io::Error::other("initializer exploded")) }
    })
}

#[test]
fn leaf_initializer_runs_once_per_extension() {
    let journal = Journal::default();
    let leaf = journal.extension("leaf", &[]);
    let loader = Loader::from_root(&leaf).unwrap();

    for _ in 0..5 {
        block_on(loader.run_one(&leaf)).unwrap();
    }
    block_on(loader.run()).unwrap();

    assert_eq!(journal.calls(), ["leaf"]);
}

#[test]
fn diamond_shares_one_instance_of_the_common_dependency() {
    let journal = Journal::default();
    let d = journal.extension("d", &[]);
    let b = journal.extension("b", &[&d]);
    let c = journal.extension("c", &[&d]);
    let a = journal.extension("a", &[&b, &c]);
    let loader = Loader::from_root(&a).unwrap();

    block_on(loader.run()).unwrap();

    assert_eq!(journal.calls().iter().filter(|name| *name == "d").count(), 1);
    assert_eq!(journal.received_by("a"), [vec!["b".to_string(), "c".to_string()]]);
}

#[test]
fn dependencies_are_instantiated_before_dependents() {
    let journal = Journal::default();
    let base = journal.extension("base", &[]);
    let left = journal.extension("left", &[&base]);
    let right = journal.extension("right", &[&base]);
    let graph = DependencyGraph::from_extensions([&right, &left]).unwrap();
    let loader = Loader::new(graph);

    block_on(loader.run()).unwrap();

    let calls = journal.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], "base");
    assert!(calls.contains(&"left".to_string()));
    assert!(calls.contains(&"right".to_string()));
    assert_eq!(journal.received_by("left"), [vec!["base".to_string()]]);
    assert_eq!(journal.received_by("right"), [vec!["base".to_string()]]);
}

#[test]
fn failure_halts_the_remaining_sweep() {
    let journal = Journal::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let first = journal.extension("first", &[]);
    let broken = failing("broken", &calls);
    let last = journal.extension("last", &[]);
    let graph = DependencyGraph::from_extensions([&first, &broken, &last]).unwrap();
    let loader = Loader::new(graph);

    let error = block_on(loader.run()).unwrap_err();

    assert_eq!(&*error.extension().name, "broken");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(journal.calls(), ["first"]);
    assert!(!last.is_instantiated());
}

#[test]
fn from_root_then_run_instantiates_everything_reachable() {
    let journal = Journal::default();
    let config = Extension::from_instance("config", "prod".to_string());
    let storage = journal.extension("storage", &[&config]);
    let cache = journal.extension("cache", &[&storage]);
    let api = journal.extension("api", &[&cache, &storage, &config]);
    let loader = Loader::from_root(&api).unwrap();

    assert!(loader.extensions().iter().all(|e| e == &config || !e.is_instantiated()));

    block_on(loader.run()).unwrap();

    assert_eq!(loader.extensions().len(), 4);
    assert!(loader.extensions().iter().all(Extension::is_instantiated));
    assert_eq!(
        journal.received_by("api"),
        [vec!["cache".to_string(), "storage".to_string(), "prod".to_string()]]
    );
}

#[test]
fn failing_initializer_is_reported_with_its_extension() {
    let calls = Arc::new(AtomicUsize::new(0));
    let x = failing("x", &calls);
    let loader = Loader::from_root(&x).unwrap();

    let error = block_on(loader.run_one(&x)).unwrap_err();

    assert_eq!(error.extension(), x.info());
    assert_eq!(error.cause().to_string(), "initializer exploded");
    assert!(error.cause().downcast_ref::<std::io::Error>().is_some());
    assert!(x.instance().is_none());
}

#[test]
fn dependency_failure_is_not_rewrapped() {
    let calls = Arc::new(AtomicUsize::new(0));
    let journal = Journal::default();
    let broken = failing("broken", &calls);
    let dependent = journal.extension("dependent", &[&broken]);
    let loader = Loader::from_root(&dependent).unwrap();

    let error = block_on(loader.run_one(&dependent)).unwrap_err();

    assert_eq!(error.extension(), broken.info());
    assert!(journal.calls().is_empty());
}

#[test]
fn initializers_can_drive_the_loader() {
    let journal = Journal::default();
    let plugin = journal.extension("plugin", &[]);
    let plugin_for_host = plugin.clone();
    let host = Extension::builder("host").from_fn(move |_, loader: Loader| {
        let plugin = plugin_for_host.clone();
        async move {
            let instance = loader.run_one(&plugin).await?;
            let name = instance
                .downcast::<String>()
                .map_err(|actual| RequireError::DowncastFailed {
                    required_type: "String",
                    actual_type: actual,
                })?;
            Ok::<_, DynError>(format!("host of {name}"))
        }
    });
    let loader = Loader::from_root(&host).unwrap();

    block_on(loader.run()).unwrap();

    assert_eq!(journal.calls(), ["plugin"]);
    let host_instance = host.instance().unwrap();
    assert_eq!(*host_instance.downcast::<String>().unwrap(), "host of plugin");
}

#[test]
fn initializer_running_the_loader_fails_instead_of_waiting_on_itself() {
    let journal = Journal::default();
    let plugin = journal.extension("plugin", &[]);
    let host = Extension::builder("host").from_fn(|_, loader: Loader| async move {
        loader.run().await?;
        Ok::<_, DynError>("host".to_string())
    });
    let graph = DependencyGraph::from_extensions([&plugin, &host]).unwrap();
    let loader = Loader::new(graph);

    let error = block_on(loader.run()).unwrap_err();

    assert_eq!(error.extension(), host.info());
    let inner = error.cause().downcast_ref::<ExtensionLoadError>().unwrap();
    assert_eq!(inner.extension(), host.info());
    assert!(inner.cause().is::<CircularRequestError>());
    assert_eq!(journal.calls(), ["plugin"]);
    assert!(plugin.is_instantiated());
    assert!(!host.is_instantiated());
}

#[test]
fn initializer_awaiting_its_dependent_fails() {
    let dependent_slot: Arc<Mutex<Option<Extension>>> = Arc::default();
    let slot = dependent_slot.clone();
    let base = Extension::builder("base").from_fn(move |_, loader: Loader| {
        let dependent = slot.lock().unwrap().take();
        async move {
            if let Some(dependent) = dependent {
                loader.run_one(&dependent).await?;
            }
            Ok::<_, DynError>("base".to_string())
        }
    });
    let journal = Journal::default();
    let dependent = journal.extension("dependent", &[&base]);
    *dependent_slot.lock().unwrap() = Some(dependent.clone());
    let loader = Loader::from_root(&dependent).unwrap();

    let error = block_on(loader.run_one(&dependent)).unwrap_err();

    // Reported by the initializer which made the request
    assert_eq!(error.extension(), base.info());
    let inner = error.cause().downcast_ref::<ExtensionLoadError>().unwrap();
    let cycle = inner.cause().downcast_ref::<CircularRequestError>().unwrap();
    assert_eq!(&cycle.requested, dependent.info());
    assert_eq!(
        cycle.instantiating,
        vec![dependent.info().clone(), base.info().clone()]
    );
    assert!(journal.calls().is_empty());
}

#[test]
fn load_registers_before_returning_and_reports_completion() {
    let journal = Journal::default();
    let base = journal.extension("base", &[]);
    let loader = Loader::from_root(&base).unwrap();
    block_on(loader.run()).unwrap();

    let plugin = journal.extension("plugin", &[&base]);
    let extra = journal.extension("extra", &[&plugin]);
    let handle = loader.load(vec![plugin.clone(), extra.clone()]).unwrap();

    // Registration is complete even if instantiation is still running
    assert_eq!(loader.extensions().len(), 3);

    let instances = block_on(handle).unwrap();
    let names: Vec<_> = instances
        .iter()
        .map(|instance| (*instance.downcast::<String>().unwrap()).clone())
        .collect();
    assert_eq!(names, ["plugin", "extra"]);
    assert_eq!(journal.calls(), ["base", "plugin", "extra"]);
}

#[test]
fn load_reports_background_failure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = Loader::new(DependencyGraph::new());
    let broken = failing("broken", &calls);

    let handle = loader.load(vec![broken.clone()]).unwrap();

    match block_on(handle) {
        Err(LoadTaskError::Failed(error)) => assert_eq!(error.extension(), broken.info()),
        other => panic!("expected a load failure, got {other:?}"),
    }
}

#[test]
fn dropped_load_handle_does_not_cancel_instantiation() {
    let pool = ThreadPool::builder().pool_size(1).create().unwrap();
    let loader = Loader::builder().spawner(pool).build().unwrap();
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let done_tx = Arc::new(Mutex::new(Some(done_tx)));
    let background = Extension::builder("background").from_fn(move |_, _| {
        let done_tx = done_tx.clone();
        async move {
            if let Some(tx) = done_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
            Ok::<_, Infallible>(())
        }
    });

    drop(loader.load(vec![background.clone()]).unwrap());

    block_on(done_rx).unwrap();
    // Instance is recorded right after the initializer returns
    block_on(loader.run_one(&background)).unwrap();
    assert!(background.is_instantiated());
}

#[test]
fn load_rejects_name_clashes_without_registering() {
    let journal = Journal::default();
    let original = journal.extension("storage", &[]);
    let loader = Loader::from_root(&original).unwrap();
    let impostor = journal.extension("storage", &[]);

    let result = loader.load(vec![impostor.clone()]);

    assert!(matches!(result, Err(RegisterError::DependencyGraph(_))));
    assert_eq!(loader.extensions(), vec![original]);
    assert!(journal.calls().is_empty());
}

#[test]
fn run_picks_up_extensions_loaded_after_a_previous_run() {
    let journal = Journal::default();
    let first = journal.extension("first", &[]);
    let loader = Loader::from_root(&first).unwrap();
    block_on(loader.run()).unwrap();

    let second = journal.extension("second", &[&first]);
    let handle = loader.load(vec![second.clone()]).unwrap();
    block_on(loader.run()).unwrap();
    block_on(handle).unwrap();

    assert!(second.is_instantiated());
    assert_eq!(journal.calls(), ["first", "second"]);
}

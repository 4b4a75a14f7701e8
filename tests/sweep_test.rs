//! Cache sweeps on unload.

mod common;

use common::{identity, image, FakeHost};
use modswap::lifecycle::{LifecycleRegistry, TypeRef};
use modswap::sweep::{
    AssemblySet, ClassKey, MemberTable, SweepError, SweepRegistry, SweepReport, Sweeper,
};
use modswap::StandardCaches;
use std::sync::Arc;

fn loaded_pair(caches: &StandardCaches) -> LifecycleRegistry {
    let host = FakeHost::new().with_caches(caches.clone());
    let mut registry = LifecycleRegistry::new(Box::new(host)).with_sweepers(caches.sweep_registry());
    for (guid, name) in [("g.alpha", "Alpha"), ("g.beta", "Beta")] {
        registry.register(identity(guid), name, image(name), None).unwrap();
        assert!(registry.trigger_load(guid).unwrap());
    }
    registry
}

fn beta_types(registry: &LifecycleRegistry) -> Vec<TypeRef> {
    registry.load_contexts().get("g.beta").unwrap().assembly().unwrap().types()
}

#[test]
fn test_unload_sweeps_only_owned_entries() {
    let caches = StandardCaches::new();
    let mut registry = loaded_pair(&caches);
    assert_eq!(caches.injected_types.len(), 4);
    assert_eq!(caches.inflated_methods.len(), 4);
    assert_eq!(caches.class_lookup.len(), 4);
    assert_eq!(caches.reflection.type_count(), 4);
    assert_eq!(caches.type_index.len(), 4);

    registry.unload("g.alpha").unwrap();

    assert!(!caches.injected_types.contains("Alpha.Plugin"));
    assert!(caches.injected_types.contains("Beta.Plugin"));
    assert_eq!(caches.inflated_methods.len(), 2);
    assert_eq!(caches.class_lookup.len(), 2);
    assert_eq!(caches.reflection.type_count(), 2);
    assert!(caches.type_index.get("Alpha.Settings").is_none());
    assert!(caches.type_index.get("Beta.Settings").is_some());

    let beta = beta_types(&registry);
    for table in MemberTable::ALL {
        assert!(caches.reflection.contains_type(table, &beta[0]));
    }

    assert_eq!(registry.process_tick().reclaimed.len(), 1);
    assert!(registry.is_active("g.beta"));
}

#[test]
fn test_unload_all_leaves_caches_empty() {
    let caches = StandardCaches::new();
    let mut registry = loaded_pair(&caches);

    registry.unload_all();

    assert!(caches.injected_types.is_empty());
    assert!(caches.inflated_methods.is_empty());
    assert!(caches.class_lookup.is_empty());
    assert_eq!(caches.reflection.type_count(), 0);
    assert_eq!(caches.type_index.len(), 0);
    assert_eq!(registry.process_tick().reclaimed.len(), 2);
}

#[test]
fn test_class_key_for_foreign_image_left_in_place() {
    let caches = StandardCaches::new();
    let registry = loaded_pair(&caches);
    let alpha = registry.load_contexts().get("g.alpha").unwrap().assembly().unwrap().clone();
    let beta = registry.load_contexts().get("g.beta").unwrap().assembly().unwrap().clone();

    // Same name as an Alpha class, but registered against Beta's image.
    let stray = ClassKey::new("Alpha", "Plugin", beta.id());
    caches.class_lookup.insert(stray.clone(), 0xdead);

    let owned = AssemblySet::from_assemblies(&[alpha]);
    let summary = SweepRegistry::new().with(caches.class_lookup.clone()).sweep_all(&owned);
    assert_eq!(summary.removed, 2);
    assert_eq!(summary.unattributed, 1);
    assert_eq!(caches.class_lookup.get(&stray), Some(0xdead));
}

#[test]
fn test_second_sweep_removes_nothing() {
    let caches = StandardCaches::new();
    let registry = loaded_pair(&caches);
    let alpha = registry.load_contexts().get("g.alpha").unwrap().assembly().unwrap().clone();
    let owned = AssemblySet::from_assemblies(&[alpha]);
    let sweepers = caches.sweep_registry();

    assert_eq!(sweepers.sweep_all(&owned).removed, 2 + 2 + 2 + 2 + 2);
    let again = sweepers.sweep_all(&owned);
    assert_eq!(again.removed, 0);
    assert!(again.failures.is_empty());
}

struct Exploding;

impl Sweeper for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn sweep(&self, _owned: &AssemblySet) -> Result<SweepReport, SweepError> {
        panic!("cache corrupted")
    }
}

#[test]
fn test_panicking_sweeper_does_not_stop_others() {
    let caches = StandardCaches::new();
    let host = FakeHost::new().with_caches(caches.clone());
    let sweepers = SweepRegistry::new()
        .with(Arc::new(Exploding))
        .with(caches.type_index.clone());
    let mut registry = LifecycleRegistry::new(Box::new(host)).with_sweepers(sweepers);

    registry.register(identity("g1"), "A", image("A"), None).unwrap();
    assert!(registry.trigger_load("g1").unwrap());
    assert_eq!(caches.type_index.len(), 2);

    registry.unload("g1").unwrap();
    assert_eq!(caches.type_index.len(), 0);
    assert!(registry.is_unloading("g1"));
}

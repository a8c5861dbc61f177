//! # Metric Derivation Tests
//!
//! Verifies hit-rate arithmetic, per-level counter selection for caches and TLBs, core metrics,
//! power aggregation, and the zero-filled result when no dump exists.

use hwsweep_core::config::{ComponentSpec, HierarchyConfig, PowerConfig};
use hwsweep_core::power::{PowerContext, PowerModelSet, PowerState};
use hwsweep_core::stats::{DerivedMetrics, StatsSnapshot, hit_rate};
use hwsweep_core::topology::TopologyGraph;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

use crate::common::fixtures::{self, FULL_DUMP, L1_ONLY_DUMP};

fn column(metrics: &DerivedMetrics, key: &str) -> Option<serde_json::Value> {
    metrics
        .columns()
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

#[test]
fn test_hit_rate_values() {
    assert_eq!(hit_rate(80, 20), 80.0);
    assert_eq!(hit_rate(0, 0), 0.0);
    assert_eq!(hit_rate(0, 10), 0.0);
    assert_eq!(hit_rate(10, 0), 100.0);
}

#[test]
fn test_l1_only_hit_rates() {
    let config = fixtures::l1_only("l1_only");
    let graph = TopologyGraph::from_config(&config.hierarchy).unwrap();
    let stats = StatsSnapshot::parse_str(L1_ONLY_DUMP);

    let m = DerivedMetrics::derive(Some(&stats), &graph.instrumented_components(), None);
    assert!(m.stats_available);
    assert!(m.warnings.is_empty());
    assert_eq!(m.levels.len(), 2);

    let icache = m.level("icache").unwrap();
    assert_eq!((icache.hits, icache.misses), (900, 100));
    assert_eq!(icache.hit_rate, 90.0);
    let dcache = m.level("dcache").unwrap();
    assert_eq!((dcache.hits, dcache.misses), (700, 300));
    assert_eq!(dcache.hit_rate, 70.0);

    assert_eq!(m.core.sim_insts, 40_000);
    assert_eq!(m.core.sim_ticks, 500_000_000);
    assert_eq!(m.core.ipc, 0.08);
    assert_eq!(column(&m, "icache_hit_rate"), Some(json!(90.0)));
    assert_eq!(column(&m, "dcache_hit_rate"), Some(json!(70.0)));
    assert_eq!(column(&m, "total_dynamic_power"), None);
}

#[test]
fn test_tlb_and_l2_levels() {
    let mut h = HierarchyConfig::default();
    h.set_component(ComponentSpec::tlb());
    let graph = TopologyGraph::from_config(&h).unwrap();
    let stats = StatsSnapshot::parse_str(FULL_DUMP);

    let m = DerivedMetrics::derive(Some(&stats), &graph.instrumented_components(), None);
    let labels: Vec<&str> = m.levels.iter().map(|l| l.label.as_str()).collect();
    assert_eq!(labels, vec!["icache", "dcache", "l2", "itlb", "dtlb"]);

    assert_eq!(m.level("l2").unwrap().hit_rate, 50.0);
    let itlb = m.level("itlb").unwrap();
    assert_eq!((itlb.hits, itlb.misses), (9990, 10));
    let dtlb = m.level("dtlb").unwrap();
    assert_eq!((dtlb.hits, dtlb.misses), (9900, 100));
    assert!((dtlb.hit_rate - 99.0).abs() < 1e-9);
}

#[test]
fn test_ipc_from_cycles_when_not_reported() {
    let graph = TopologyGraph::from_config(&HierarchyConfig::default()).unwrap();
    let stats = StatsSnapshot::parse_str(FULL_DUMP);
    let m = DerivedMetrics::derive(Some(&stats), &graph.instrumented_components(), None);
    assert_eq!(m.core.ipc, 0.1);
    assert_eq!(m.core.sim_seconds, 0.001);
}

#[test]
fn test_missing_dump_reports_zeros() {
    let graph = TopologyGraph::from_config(&HierarchyConfig::default()).unwrap();
    let m = DerivedMetrics::derive(None, &graph.instrumented_components(), None);

    assert!(!m.stats_available);
    assert_eq!(m.warnings.len(), 1);
    assert_eq!(m.core.sim_insts, 0);
    assert_eq!(m.levels.len(), 3);
    for level in &m.levels {
        assert_eq!((level.hits, level.misses, level.hit_rate), (0, 0, 0.0));
    }
    assert_eq!(column(&m, "stats_available"), Some(json!(false)));
}

#[test]
fn test_power_columns_and_totals() {
    let config = PowerConfig {
        enabled: true,
        instrument_caches: true,
        ..PowerConfig::default()
    };
    let graph = TopologyGraph::from_config(&HierarchyConfig::default()).unwrap();
    let models = PowerModelSet::attach_all(&graph, &config).unwrap();
    let ctx = PowerContext::new(models, &config);
    let stats = StatsSnapshot::parse_str(&format!("{FULL_DUMP}system.cpu.ipc 0.1\n"));

    let m = DerivedMetrics::derive(Some(&stats), &graph.instrumented_components(), Some(&ctx));
    assert!(m.power_enabled);
    assert!(m.warnings.is_empty(), "{:?}", m.warnings);
    assert_eq!(m.power.len(), 4);
    assert!(m.power.iter().all(|p| p.state == PowerState::On));

    let dynamic: f64 = m.power.iter().map(|p| p.dynamic_watts).sum();
    let leak: f64 = m.power.iter().map(|p| p.static_watts).sum();
    assert!((m.total_dynamic_watts - dynamic).abs() < 1e-9);
    assert!((m.total_static_watts - leak).abs() < 1e-9);
    assert!(m.total_dynamic_watts > 0.0);

    for key in [
        "cpu_dynamic_power",
        "cpu_static_power",
        "l2_dynamic_power",
        "total_dynamic_power",
        "total_static_power",
    ] {
        assert!(column(&m, key).is_some(), "missing column {key}");
    }
}

#[test]
fn test_power_error_downgrades_to_zero() {
    let config = PowerConfig {
        enabled: true,
        ..PowerConfig::default()
    };
    let graph = TopologyGraph::from_config(&HierarchyConfig::default()).unwrap();
    let ctx = PowerContext::new(PowerModelSet::attach_all(&graph, &config).unwrap(), &config);
    // The dump carries no `system.cpu.ipc`, which the CPU formula needs.
    let stats = StatsSnapshot::parse_str(FULL_DUMP);

    let m = DerivedMetrics::derive(Some(&stats), &graph.instrumented_components(), Some(&ctx));
    assert_eq!(m.power.len(), 1);
    assert_eq!(m.power[0].dynamic_watts, 0.0);
    assert_eq!(m.total_static_watts, 0.0);
    assert_eq!(m.warnings.len(), 1);
    assert!(m.warnings[0].contains("system.cpu.ipc"));
}

#[test]
fn test_missing_cpu_model_is_reported() {
    let config = PowerConfig {
        enabled: true,
        ..PowerConfig::default()
    };
    let graph = TopologyGraph::from_config(&HierarchyConfig::default()).unwrap();
    let ctx = PowerContext::new(PowerModelSet::default(), &config);
    let stats = StatsSnapshot::parse_str(L1_ONLY_DUMP);

    let m = DerivedMetrics::derive(Some(&stats), &graph.instrumented_components(), Some(&ctx));
    assert_eq!(m.power.len(), 1);
    assert_eq!(m.power[0].label, "cpu");
    assert!(m.warnings[0].contains("no power model"));
}

proptest! {
    #[test]
    fn prop_hit_rate_is_a_percentage(hits in 0u64..1_000_000_000, misses in 0u64..1_000_000_000) {
        let rate = hit_rate(hits, misses);
        prop_assert!((0.0..=100.0).contains(&rate));
        if hits + misses > 0 {
            let expected = hits as f64 / (hits + misses) as f64 * 100.0;
            prop_assert!((rate - expected).abs() < 1e-9);
        }
    }
}

//! # Configuration Tests
//!
//! Tests for configuration defaults, JSON deserialization, range validation, quantity parsing,
//! and the parameter columns written to result rows.

use hwsweep_core::common::size::{GIB, KIB, MIB};
use hwsweep_core::common::{ConfigError, parse_frequency, parse_size};
use hwsweep_core::config::*;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[test]
fn test_hierarchy_defaults() {
    let h = HierarchyConfig::default();
    assert!(h.enable_l2);
    assert_eq!(h.components.len(), 3);
    assert_eq!(h.cpu.kind, CpuKind::InOrder);
    assert_eq!(h.cpu.isa, Isa::X86);
    assert_eq!(h.cpu.clock_hz, 1_000_000_000);
    assert_eq!(h.memory.range, AddrRange::new(512 * MIB));
    assert_eq!(h.memory.dram, DramKind::Ddr3_1600);
    assert_eq!(h.cache_line_size_override, None);

    let l1d = h.component(ComponentLevel::L1D).unwrap();
    assert_eq!(l1d.size, 64 * KIB);
    assert_eq!(l1d.associativity, Associativity::Ways(2));
    assert_eq!(l1d.block_size, 64);
    assert_eq!(l1d.max_outstanding_requests, 4);
    assert_eq!(l1d.targets_per_request, 20);

    let l2 = h.component(ComponentLevel::L2).unwrap();
    assert_eq!(l2.size, 256 * KIB);
    assert_eq!(l2.associativity, Associativity::Ways(8));
    assert_eq!(l2.tag_latency, 20);
    assert_eq!(l2.max_outstanding_requests, 20);
    assert_eq!(l2.targets_per_request, 12);
}

#[test]
fn test_power_defaults() {
    let power = PowerConfig::default();
    assert!(!power.enabled);
    assert_eq!(power.voltage, 1.0);
    assert_eq!(power.temperature, 25.0);
    assert!(!power.instrument_caches);
    assert!(power.overrides.is_empty());
}

#[rstest]
#[case("16kB", 16 * KIB)]
#[case("16KiB", 16 * KIB)]
#[case("16k", 16 * KIB)]
#[case("512MB", 512 * MIB)]
#[case("4GiB", 4 * GIB)]
#[case("64", 64)]
#[case("64B", 64)]
fn test_parse_size(#[case] input: &str, #[case] expected: u64) {
    assert_eq!(parse_size(input).unwrap(), expected);
}

#[rstest]
#[case("")]
#[case("kB")]
#[case("1.5kB")]
#[case("16XB")]
fn test_parse_size_rejects(#[case] input: &str) {
    assert!(matches!(
        parse_size(input),
        Err(ConfigError::InvalidQuantity { kind: "size", .. })
    ));
}

#[test]
fn test_parse_frequency() {
    assert_eq!(parse_frequency("1GHz").unwrap(), 1_000_000_000);
    assert_eq!(parse_frequency("1.5GHz").unwrap(), 1_500_000_000);
    assert_eq!(parse_frequency("500MHz").unwrap(), 500_000_000);
    assert!(parse_frequency("0GHz").is_err());
    assert!(parse_frequency("fast").is_err());
}

#[test]
fn test_experiment_from_json_with_strings() {
    let json = r#"{
        "name": "edge_probe",
        "hierarchy": {
            "cpu": { "kind": "o3", "isa": "arm", "clock_hz": "2GHz", "threads": 2 },
            "components": [
                { "name": "L1ICache", "level": "L1I", "size": "32kB", "associativity": "full" },
                { "name": "L1DCache", "level": "L1D", "size": 32768, "associativity": 4,
                  "mshrs": 8, "tgts_per_mshr": 16 },
                { "name": "TLB", "level": "tlb", "size": 128, "associativity": 8, "block_size": "8kB" }
            ],
            "memory": { "range": { "size": "4GB" }, "dram": "DDR4_2400_8x8" }
        },
        "power": { "enabled": true, "voltage": 1.2 }
    }"#;
    let config = ExperimentConfig::from_json_str(json).unwrap();
    let h = &config.hierarchy;

    assert_eq!(h.cpu.kind, CpuKind::OutOfOrder);
    assert_eq!(h.cpu.isa, Isa::Arm);
    assert_eq!(h.cpu.clock_hz, 2_000_000_000);
    assert_eq!(h.cpu.threads, 2);
    assert!(!h.enable_l2);
    assert_eq!(h.memory.range.size, 4 * GIB);
    assert_eq!(h.memory.dram, DramKind::Ddr4_2400);

    let l1i = h.component(ComponentLevel::L1I).unwrap();
    assert_eq!(l1i.associativity, Associativity::Full);
    assert_eq!(l1i.tag_latency, 2);

    let l1d = h.component(ComponentLevel::L1D).unwrap();
    assert_eq!(l1d.max_outstanding_requests, 8);
    assert_eq!(l1d.targets_per_request, 16);

    let tlb = h.component(ComponentLevel::Tlb).unwrap();
    assert_eq!(tlb.size, 128);
    assert_eq!(tlb.block_size, 8 * KIB);

    assert!(config.power.enabled);
    assert_eq!(config.power.voltage, 1.2);
    assert_eq!(config.power.temperature, 25.0);
    config.validate().unwrap();
}

#[test]
fn test_malformed_json() {
    assert!(matches!(
        ExperimentConfig::from_json_str("{ \"name\": 3 }"),
        Err(ConfigError::Json(_))
    ));
    assert!(ExperimentConfig::from_json_str(
        r#"{ "name": "x", "hierarchy": { "components": [
            { "name": "a", "level": "L1I", "size": "lots", "associativity": 2 } ] } }"#
    )
    .is_err());
}

#[test]
fn test_from_path_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = ExperimentConfig::from_path(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_json_roundtrip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfg.json");
    let mut config = ExperimentConfig::new("file_cfg", HierarchyConfig::default());
    config.hierarchy.cache_line_size_override = Some(128);
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    assert_eq!(ExperimentConfig::from_path(&path).unwrap(), config);
}

#[rstest]
#[case("")]
#[case("has space")]
#[case("a/b")]
#[case("a\\b")]
fn test_validate_rejects_bad_names(#[case] name: &str) {
    let config = ExperimentConfig::new(name, HierarchyConfig::default());
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidParameter { field, .. }) if field == "name"
    ));
}

#[test]
fn test_validate_cpu_ranges() {
    let mut config = ExperimentConfig::new("cpu", HierarchyConfig::default());
    config.hierarchy.cpu.clock_hz = 0;
    assert!(config.validate().is_err());

    let mut config = ExperimentConfig::new("cpu", HierarchyConfig::default());
    config.hierarchy.cpu.kind = CpuKind::OutOfOrder;
    config.hierarchy.cpu.widths.issue = 0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidParameter { field, .. }) if field == "cpu.widths.issue"
    ));

    // In-order cores ignore width settings.
    config.hierarchy.cpu.kind = CpuKind::InOrder;
    config.validate().unwrap();
}

#[test]
fn test_multithreading_requires_out_of_order() {
    let mut config = ExperimentConfig::new("smt", HierarchyConfig::default());
    config.hierarchy.cpu.threads = 2;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidParameter { field, .. }) if field == "cpu.threads"
    ));
    config.hierarchy.cpu.kind = CpuKind::OutOfOrder;
    config.validate().unwrap();
}

#[rstest]
#[case(8, true)]
#[case(9, false)]
#[case(100_000, false)]
fn test_thread_limit(#[case] threads: u32, #[case] valid: bool) {
    let mut config = ExperimentConfig::new("smt", HierarchyConfig::default());
    config.hierarchy.cpu.kind = CpuKind::OutOfOrder;
    config.hierarchy.cpu.threads = threads;
    match config.validate() {
        Ok(()) => assert!(valid),
        Err(ConfigError::InvalidParameter { field, .. }) => {
            assert!(!valid);
            assert_eq!(field, "cpu.threads");
        }
        Err(e) => panic!("unexpected error: {e}"),
    }
}

#[test]
fn test_validate_memory_and_line_override() {
    let mut config = ExperimentConfig::new("mem", HierarchyConfig::default());
    config.hierarchy.memory.range.size = 0;
    assert!(config.validate().is_err());

    let mut config = ExperimentConfig::new("line", HierarchyConfig::default());
    config.hierarchy.cache_line_size_override = Some(48);
    assert!(config.validate().is_err());
    config.hierarchy.cache_line_size_override = Some(32);
    config.validate().unwrap();
}

#[test]
fn test_validate_power() {
    let mut config = ExperimentConfig::new("power", HierarchyConfig::default());
    config.power.voltage = -0.5;
    assert!(config.validate().is_err());

    config.power.voltage = 1.0;
    config.power.temperature = f64::NAN;
    assert!(config.validate().is_err());

    config.power.temperature = 40.0;
    config.power.overrides.push(FormulaOverride {
        class: hwsweep_core::power::ComponentClass::Cpu,
        state: hwsweep_core::power::PowerState::On,
        dynamic: "voltage * (".to_string(),
        static_power: "0.1".to_string(),
    });
    assert!(matches!(config.validate(), Err(ConfigError::Formula(_))));
}

#[test]
fn test_component_spec_validate() {
    ComponentSpec::l1d().validate().unwrap();
    ComponentSpec::tlb().validate().unwrap();

    let bad = [
        ComponentSpec::l1d().with_size(0),
        ComponentSpec::l1d().with_block_size(48),
        ComponentSpec::l1d().with_size(1000),
        ComponentSpec::l1d().with_associativity(Associativity::Ways(0)),
        ComponentSpec::l1d().with_associativity(Associativity::Ways(3)),
        ComponentSpec::l1d()
            .with_size(256)
            .with_associativity(Associativity::Ways(8)),
        ComponentSpec::l1d().with_mshrs(0),
        ComponentSpec::l1d().with_targets(0),
    ];
    for spec in bad {
        assert!(spec.validate().is_err(), "{spec:?} should be rejected");
    }
}

#[test]
fn test_geometry() {
    let l1d = ComponentSpec::l1d();
    assert_eq!(l1d.capacity_units(), 1024);
    assert_eq!(l1d.num_sets(), 512);
    let full = l1d.with_associativity(Associativity::Full);
    assert_eq!(full.num_sets(), 1);
    assert_eq!(ComponentSpec::tlb().capacity_units(), 64);
}

#[test]
fn test_effective_spec() {
    let l1d = ComponentSpec::l1d();
    assert_eq!(l1d.effective(Isa::X86, Some(128)).block_size, 128);
    assert_eq!(l1d.effective(Isa::X86, None).block_size, 64);

    let tlb = ComponentSpec::tlb()
        .with_associativity(Associativity::Ways(8))
        .with_block_size(16 * KIB);
    let x86 = tlb.effective(Isa::X86, Some(128));
    assert_eq!(x86.associativity, Associativity::Full);
    assert_eq!(x86.block_size, X86_PAGE_SIZE);
    let arm = tlb.effective(Isa::Arm, Some(128));
    assert_eq!(arm, tlb);
}

#[test]
fn test_set_component_replaces_or_appends() {
    let mut h = HierarchyConfig::default();
    h.set_component(ComponentSpec::l2().with_size(MIB));
    assert_eq!(h.components.len(), 3);
    assert_eq!(h.component(ComponentLevel::L2).unwrap().size, MIB);

    h.set_component(ComponentSpec::tlb());
    assert_eq!(h.components.len(), 4);
    assert_eq!(h.effective_line_size(), 64);
    h.cache_line_size_override = Some(32);
    assert_eq!(h.effective_line_size(), 32);
}

#[test]
fn test_parameters_two_level() {
    let config = ExperimentConfig::new("baseline", HierarchyConfig::default());
    let params = config.parameters();

    assert_eq!(param(&params, "cpu_type"), Some("minor"));
    assert_eq!(param(&params, "isa"), Some("x86"));
    assert_eq!(param(&params, "cpu_clock"), Some("1GHz"));
    assert_eq!(param(&params, "enable_l2"), Some("true"));
    assert_eq!(param(&params, "mem_size"), Some("512MiB"));
    assert_eq!(param(&params, "l1i_size"), Some("16KiB"));
    assert_eq!(param(&params, "l1d_size"), Some("64KiB"));
    assert_eq!(param(&params, "l2_size"), Some("256KiB"));
    assert_eq!(param(&params, "l2_assoc"), Some("8"));
    assert_eq!(param(&params, "l2_mshrs"), Some("20"));
    assert_eq!(param(&params, "fetch_width"), None);
    assert_eq!(param(&params, "voltage"), None);
}

#[test]
fn test_parameters_skip_disabled_l2() {
    let mut h = HierarchyConfig::default();
    h.enable_l2 = false;
    let params = ExperimentConfig::new("no_l2", h).parameters();

    assert_eq!(param(&params, "enable_l2"), Some("false"));
    assert_eq!(param(&params, "l1d_size"), Some("64KiB"));
    assert!(params.iter().all(|(k, _)| !k.starts_with("l2_")));
}

#[test]
fn test_parameters_report_effective_tlb() {
    let mut h = HierarchyConfig::default();
    h.set_component(
        ComponentSpec::tlb()
            .with_associativity(Associativity::Ways(2))
            .with_block_size(8 * KIB),
    );
    h.cpu.kind = CpuKind::OutOfOrder;
    let mut config = ExperimentConfig::new("tlb", h);
    config.power.enabled = true;
    let params = config.parameters();

    assert_eq!(param(&params, "tlb_entries"), Some("64"));
    assert_eq!(param(&params, "tlb_assoc"), Some("full"));
    assert_eq!(param(&params, "page_size"), Some("4KiB"));
    assert_eq!(param(&params, "issue_width"), Some("4"));
    assert_eq!(param(&params, "voltage"), Some("1"));
    assert_eq!(param(&params, "temperature"), Some("25"));
}

#[test]
fn test_addr_range_display() {
    let range = AddrRange::new(512 * MIB);
    assert_eq!(range.end(), 0x2000_0000);
    assert_eq!(range.to_string(), "[0x0, 0x20000000)");
}

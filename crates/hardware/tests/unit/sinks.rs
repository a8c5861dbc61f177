//! # Result Sink Tests
//!
//! Verifies the per-configuration CSV files and the keyed JSON table: column layout, overwrite
//! semantics, and that rows of other configurations are never disturbed.

use hwsweep_core::common::SinkError;
use hwsweep_core::sim::{CsvDirSink, ExperimentResult, JsonTableSink, MemorySink, ResultSink};
use hwsweep_core::stats::{DerivedMetrics, StatsSnapshot};
use hwsweep_core::topology::TopologyGraph;
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::fixtures::{self, L1_ONLY_DUMP};

fn result_for(name: &str, dump: Option<&str>) -> ExperimentResult {
    let config = fixtures::l1_only(name);
    let graph = TopologyGraph::from_config(&config.hierarchy).unwrap();
    let snapshot = dump.map(StatsSnapshot::parse_str);
    let metrics =
        DerivedMetrics::derive(snapshot.as_ref(), &graph.instrumented_components(), None);
    ExperimentResult::new(&config, metrics, graph.warnings())
}

#[test]
fn test_columns_layout() {
    let result = result_for("l1_only", Some(L1_ONLY_DUMP));
    let columns = result.columns();
    assert_eq!(columns.first().unwrap(), &("config".to_string(), json!("l1_only")));
    assert_eq!(columns.last().unwrap(), &("complete".to_string(), json!(true)));

    let row = result.row();
    assert_eq!(row["l1d_size"], json!("64KiB"));
    assert_eq!(row["icache_hit_rate"], json!(90.0));
    assert_eq!(row["dcache_misses"], json!(300));
}

#[test]
fn test_csv_sink_writes_one_file_per_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = CsvDirSink::new(dir.path().join("out"));
    let result = result_for("size_8kB", Some(L1_ONLY_DUMP));
    sink.append(&result).unwrap();

    let path = sink.path_for("size_8kB");
    assert_eq!(path.file_name().unwrap(), "size_8kB_result.csv");
    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);

    let header: Vec<&str> = lines[0].split(',').collect();
    let values: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(header.len(), values.len());
    assert_eq!(header[0], "config");
    assert_eq!(values[0], "size_8kB");
    let at = header.iter().position(|h| *h == "dcache_hit_rate").unwrap();
    assert_eq!(values[at], "70.0");
}

#[test]
fn test_csv_sink_overwrites_same_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = CsvDirSink::new(dir.path());
    sink.append(&result_for("baseline", None)).unwrap();
    sink.append(&result_for("baseline", Some(L1_ONLY_DUMP)))
        .unwrap();

    let text = std::fs::read_to_string(sink.path_for("baseline")).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.lines().nth(1).unwrap().ends_with("true"));
}

#[test]
fn test_json_table_last_write_wins() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results").join("table.json");
    let mut sink = JsonTableSink::new(&path);
    assert!(sink.load().unwrap().is_empty());

    sink.append(&result_for("a", None)).unwrap();
    sink.append(&result_for("b", Some(L1_ONLY_DUMP))).unwrap();
    let b_before = sink.load().unwrap()["b"].clone();

    sink.append(&result_for("a", Some(L1_ONLY_DUMP))).unwrap();
    let table = sink.load().unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table["a"]["complete"], json!(true));
    assert_eq!(table["b"], b_before);
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn test_memory_sink_last_write_wins() {
    let mut sink = MemorySink::new();
    sink.append(&result_for("a", None)).unwrap();
    sink.append(&result_for("b", None)).unwrap();
    sink.append(&result_for("a", Some(L1_ONLY_DUMP))).unwrap();

    assert_eq!(sink.results.len(), 2);
    assert_eq!(sink.results[0].name, "a");
    assert!(sink.results[0].complete);
    assert_eq!(sink.results[1].name, "b");
    assert!(!sink.results[1].complete);
}

#[test]
fn test_json_table_rejects_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.json");
    std::fs::write(&path, "{ not json").unwrap();
    let mut sink = JsonTableSink::new(&path);
    assert!(matches!(
        sink.append(&result_for("a", None)),
        Err(SinkError::Json(_))
    ));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}

#[test]
fn test_memory_sink_through_trait_objects() {
    let mut sink = MemorySink::new();
    {
        let mut boxed: Box<dyn ResultSink + '_> = Box::new(&mut sink);
        boxed.append(&result_for("x", None)).unwrap();
    }
    assert_eq!(sink.results.len(), 1);
    assert!(!sink.results[0].complete);
}

/// Dump texts, workload binaries, and configuration helpers.
pub mod fixtures;


/// Routes library `tracing` output to the test writer. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

//! Memory-hierarchy experiment CLI.
//!
//! This binary is the single entry point for experiments. It provides:
//! 1. **Run:** One configuration (preset name or JSON file) with per-parameter overrides.
//! 2. **Sweep:** Every preset of one or more families, continuing past failures.
//! 3. **List / show:** The preset table and the synthesized topology of a configuration.
//! 4. **Derive:** Metrics recomputed from an existing counter dump, without running anything.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use hwsweep_core::common::{ConfigError, parse_frequency, parse_size};
use hwsweep_core::config::{
    Associativity, BranchPredictor, ComponentLevel, ComponentSpec, CpuKind, ExperimentConfig, Isa,
};
use hwsweep_core::power::{PowerContext, PowerModelSet};
use hwsweep_core::presets::{self, Family};
use hwsweep_core::sim::{
    CommandKernel, CsvDirSink, ExperimentRunner, JsonTableSink, ResultSink, Workload,
};
use hwsweep_core::stats::{DerivedMetrics, StatsSnapshot};
use hwsweep_core::topology::TopologyGraph;

#[derive(Parser, Debug)]
#[command(
    name = "hwsweep",
    author,
    version,
    about = "Memory-hierarchy design-space exploration",
    long_about = "Build simulator topologies from cache/TLB/CPU presets, run them through an external kernel, and collect hit rates and power.\n\nExamples:\n  hwsweep list\n  hwsweep run assoc_4 --binary workloads/matrix --kernel build/X86/gem5.opt\n  hwsweep run edge_o3 --l2-cache --power-models --binary workloads/edge_arm\n  hwsweep sweep --family cache --binary workloads/matrix\n  hwsweep derive results/baseline/stats.txt --config baseline"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one configuration.
    Run {
        /// Preset name or path to a JSON configuration.
        config: String,

        #[command(flatten)]
        runtime: RuntimeArgs,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Run every preset of the selected families (all families when none is given).
    Sweep {
        /// Family to include (repeatable): baseline, cache, virtual_memory, superscalar, edge.
        #[arg(short, long)]
        family: Vec<String>,

        #[command(flatten)]
        runtime: RuntimeArgs,
    },

    /// List presets.
    List {
        /// Only this family.
        #[arg(short, long)]
        family: Option<String>,
    },

    /// Print the topology a configuration synthesizes.
    Show {
        /// Preset name or path to a JSON configuration.
        config: String,

        /// Print the kernel-facing JSON instead of the summary.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Derive metrics from an existing counter dump.
    Derive {
        /// Counter dump (stats.txt).
        stats: PathBuf,

        /// Configuration the dump was produced with.
        #[arg(short, long, default_value = "baseline")]
        config: String,

        /// Print the result row as JSON.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// One `<name>_result.csv` per experiment.
    Csv,
    /// One `results.json` table keyed by configuration name.
    Json,
}

#[derive(Args, Debug)]
struct RuntimeArgs {
    /// Workload executable run inside the simulated system.
    #[arg(short, long)]
    binary: PathBuf,

    /// Workload arguments (space separated).
    #[arg(long, default_value = "")]
    args: String,

    /// Simulator executable.
    #[arg(long, default_value = "gem5.opt")]
    kernel: PathBuf,

    /// Extra argument passed to the simulator before the generated ones (repeatable).
    #[arg(long = "kernel-arg", allow_hyphen_values = true)]
    kernel_args: Vec<String>,

    /// Root for run directories and result files.
    #[arg(short, long, default_value = "results")]
    output_dir: PathBuf,

    /// Result format.
    #[arg(long, value_enum, default_value_t = SinkKind::Csv)]
    sink: SinkKind,
}

fn size_arg(s: &str) -> Result<u64, String> {
    parse_size(s).map_err(|e| e.to_string())
}

fn frequency_arg(s: &str) -> Result<u64, String> {
    parse_frequency(s).map_err(|e| e.to_string())
}

fn assoc_arg(s: &str) -> Result<Associativity, String> {
    if s.eq_ignore_ascii_case("full") {
        Ok(Associativity::Full)
    } else {
        s.parse()
            .map(Associativity::Ways)
            .map_err(|_| format!("'{s}' is neither a way count nor 'full'"))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CpuArg {
    /// In-order core.
    Minor,
    /// Out-of-order core.
    O3,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum IsaArg {
    X86,
    Arm,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BpArg {
    /// Minimal one-entry predictor.
    None,
    /// Kernel default predictor.
    Simple,
}

/// Per-parameter overrides applied on top of the selected configuration.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Rename the configuration (result key and run directory).
    #[arg(long)]
    name: Option<String>,

    /// L1 instruction cache size (e.g. 32kB).
    #[arg(long, value_parser = size_arg)]
    l1i_size: Option<u64>,

    /// L1 data cache size.
    #[arg(long, value_parser = size_arg)]
    l1d_size: Option<u64>,

    /// L2 cache size.
    #[arg(long, value_parser = size_arg)]
    l2_size: Option<u64>,

    /// Associativity of both L1s (way count or `full`).
    #[arg(long, value_parser = assoc_arg)]
    l1_assoc: Option<Associativity>,

    /// L2 associativity.
    #[arg(long, value_parser = assoc_arg)]
    l2_assoc: Option<Associativity>,

    /// System-wide cache line size in bytes.
    #[arg(long)]
    cache_line_size: Option<u64>,

    /// TLB entries.
    #[arg(long)]
    tlb_size: Option<u64>,

    /// TLB associativity.
    #[arg(long, value_parser = assoc_arg)]
    tlb_assoc: Option<Associativity>,

    /// Page size (e.g. 4kB).
    #[arg(long, value_parser = size_arg)]
    page_size: Option<u64>,

    /// Core class.
    #[arg(long, value_enum)]
    cpu_type: Option<CpuArg>,

    /// Instruction set.
    #[arg(long, value_enum)]
    isa: Option<IsaArg>,

    /// Core clock (e.g. 2GHz).
    #[arg(long, value_parser = frequency_arg)]
    cpu_clock: Option<u64>,

    /// Main memory size (e.g. 512MB).
    #[arg(long, value_parser = size_arg)]
    mem_size: Option<u64>,

    /// Insert the L2 (baseline 256KiB 8-way when the configuration has none).
    #[arg(long)]
    l2_cache: bool,

    /// Attach power models to the CPU.
    #[arg(long)]
    power_models: bool,

    /// Also attach power models to caches.
    #[arg(long)]
    cache_power: bool,

    /// Supply voltage in volts.
    #[arg(long)]
    voltage: Option<f64>,

    /// Die temperature in degrees Celsius.
    #[arg(long)]
    temperature: Option<f64>,

    /// Fetch width.
    #[arg(long)]
    fetch_width: Option<u32>,

    /// Decode width.
    #[arg(long)]
    decode_width: Option<u32>,

    /// Rename width.
    #[arg(long)]
    rename_width: Option<u32>,

    /// Dispatch width.
    #[arg(long)]
    dispatch_width: Option<u32>,

    /// Issue width.
    #[arg(long)]
    issue_width: Option<u32>,

    /// Commit width.
    #[arg(long)]
    commit_width: Option<u32>,

    /// Hardware threads.
    #[arg(long)]
    threads: Option<u32>,

    /// Round-robin SMT fetch/commit policies.
    #[arg(long)]
    smt: bool,

    /// Branch predictor.
    #[arg(long, value_enum)]
    bp: Option<BpArg>,
}

/// Returns the spec at `level`, inserting `default` first when the configuration has none.
fn spec_mut<'a>(
    config: &'a mut ExperimentConfig,
    level: ComponentLevel,
    default: fn() -> ComponentSpec,
) -> &'a mut ComponentSpec {
    let hierarchy = &mut config.hierarchy;
    let idx = match hierarchy.components.iter().position(|c| c.level == level) {
        Some(idx) => idx,
        None => {
            hierarchy.components.push(default());
            hierarchy.components.len() - 1
        }
    };
    &mut hierarchy.components[idx]
}

impl Overrides {
    fn apply(&self, config: &mut ExperimentConfig) {
        if let Some(name) = &self.name {
            config.name.clone_from(name);
        }
        if let Some(size) = self.l1i_size {
            spec_mut(config, ComponentLevel::L1I, ComponentSpec::l1i).size = size;
        }
        if let Some(size) = self.l1d_size {
            spec_mut(config, ComponentLevel::L1D, ComponentSpec::l1d).size = size;
        }
        if let Some(assoc) = self.l1_assoc {
            spec_mut(config, ComponentLevel::L1I, ComponentSpec::l1i).associativity = assoc;
            spec_mut(config, ComponentLevel::L1D, ComponentSpec::l1d).associativity = assoc;
        }
        if self.l2_cache {
            config.hierarchy.enable_l2 = true;
            let _ = spec_mut(config, ComponentLevel::L2, ComponentSpec::l2);
        }
        if let Some(size) = self.l2_size {
            spec_mut(config, ComponentLevel::L2, ComponentSpec::l2).size = size;
        }
        if let Some(assoc) = self.l2_assoc {
            spec_mut(config, ComponentLevel::L2, ComponentSpec::l2).associativity = assoc;
        }
        if self.cache_line_size.is_some() {
            config.hierarchy.cache_line_size_override = self.cache_line_size;
        }
        if let Some(entries) = self.tlb_size {
            spec_mut(config, ComponentLevel::Tlb, ComponentSpec::tlb).size = entries;
        }
        if let Some(assoc) = self.tlb_assoc {
            spec_mut(config, ComponentLevel::Tlb, ComponentSpec::tlb).associativity = assoc;
        }
        if let Some(page) = self.page_size {
            spec_mut(config, ComponentLevel::Tlb, ComponentSpec::tlb).block_size = page;
        }

        let cpu = &mut config.hierarchy.cpu;
        if let Some(kind) = self.cpu_type {
            cpu.kind = match kind {
                CpuArg::Minor => CpuKind::InOrder,
                CpuArg::O3 => CpuKind::OutOfOrder,
            };
        }
        if let Some(isa) = self.isa {
            cpu.isa = match isa {
                IsaArg::X86 => Isa::X86,
                IsaArg::Arm => Isa::Arm,
            };
        }
        if let Some(hz) = self.cpu_clock {
            cpu.clock_hz = hz;
        }
        let widths = [
            (self.fetch_width, &mut cpu.widths.fetch),
            (self.decode_width, &mut cpu.widths.decode),
            (self.rename_width, &mut cpu.widths.rename),
            (self.dispatch_width, &mut cpu.widths.dispatch),
            (self.issue_width, &mut cpu.widths.issue),
            (self.commit_width, &mut cpu.widths.commit),
        ];
        for (value, slot) in widths {
            if let Some(v) = value {
                *slot = v;
            }
        }
        if let Some(threads) = self.threads {
            cpu.threads = threads;
        }
        if self.smt {
            cpu.smt = true;
        }
        if let Some(bp) = self.bp {
            cpu.branch_predictor = match bp {
                BpArg::None => BranchPredictor::Minimal,
                BpArg::Simple => BranchPredictor::Default,
            };
        }

        if let Some(size) = self.mem_size {
            config.hierarchy.memory.range.size = size;
        }
        if self.power_models || self.cache_power {
            config.power.enabled = true;
        }
        if self.cache_power {
            config.power.instrument_caches = true;
        }
        if let Some(v) = self.voltage {
            config.power.voltage = v;
        }
        if let Some(t) = self.temperature {
            config.power.temperature = t;
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Commands::Run {
            config,
            runtime,
            overrides,
        } => cmd_run(&config, &runtime, &overrides),
        Commands::Sweep { family, runtime } => cmd_sweep(&family, &runtime),
        Commands::List { family } => cmd_list(family.as_deref()),
        Commands::Show {
            config,
            json,
            overrides,
        } => cmd_show(&config, json, &overrides),
        Commands::Derive {
            stats,
            config,
            json,
            overrides,
        } => cmd_derive(&stats, &config, json, &overrides),
    };

    if let Err(message) = outcome {
        eprintln!("Error: {message}");
        process::exit(1);
    }
}

/// Loads a preset, or a JSON file when `name` is an existing path.
fn load_config(name: &str, overrides: &Overrides) -> Result<ExperimentConfig, ConfigError> {
    let path = Path::new(name);
    let mut config = if path.extension().is_some_and(|e| e == "json") || path.is_file() {
        ExperimentConfig::from_path(path)?
    } else {
        presets::lookup(name)?
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn make_sink(runtime: &RuntimeArgs) -> Box<dyn ResultSink> {
    match runtime.sink {
        SinkKind::Csv => Box::new(CsvDirSink::new(&runtime.output_dir)),
        SinkKind::Json => Box::new(JsonTableSink::new(runtime.output_dir.join("results.json"))),
    }
}

fn make_runner(
    runtime: &RuntimeArgs,
) -> Result<ExperimentRunner<CommandKernel, Box<dyn ResultSink>>, String> {
    let workload =
        Workload::new(&runtime.binary).with_args(runtime.args.split_whitespace());
    workload.check().map_err(|e| e.to_string())?;
    let kernel = CommandKernel::new(&runtime.kernel).with_args(runtime.kernel_args.iter().cloned());
    Ok(
        ExperimentRunner::new(kernel, make_sink(runtime), workload, &runtime.output_dir)
            .with_summaries(true),
    )
}

fn cmd_run(name: &str, runtime: &RuntimeArgs, overrides: &Overrides) -> Result<(), String> {
    let config = load_config(name, overrides).map_err(|e| e.to_string())?;
    let mut runner = make_runner(runtime)?;

    println!("{}", "=".repeat(60));
    println!("Configuration: {}", config.name);
    println!("{}", "=".repeat(60));
    let result = runner.run(&config).map_err(|e| e.to_string())?;
    if !result.complete {
        for warning in &result.warnings {
            tracing::warn!(config = %result.name, "{warning}");
        }
        println!("Result for '{}' is incomplete", result.name);
    }
    Ok(())
}

fn cmd_sweep(families: &[String], runtime: &RuntimeArgs) -> Result<(), String> {
    let selected: Vec<Family> = if families.is_empty() {
        Family::ALL.to_vec()
    } else {
        families
            .iter()
            .map(|f| Family::from_name(f))
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?
    };
    let configs: Vec<ExperimentConfig> = selected.into_iter().flat_map(presets::family).collect();
    let mut runner = make_runner(runtime)?;
    let report = runner.sweep(&configs);

    println!("\n{}", "=".repeat(60));
    println!(
        "Sweep: {} completed, {} failed",
        report.completed.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        println!("  {:<16} {}", failure.name, failure.error);
    }
    println!("{}", "=".repeat(60));
    Ok(())
}

fn cmd_list(family: Option<&str>) -> Result<(), String> {
    let filter = family
        .map(Family::from_name)
        .transpose()
        .map_err(|e| e.to_string())?;
    for preset in presets::PRESETS
        .iter()
        .filter(|p| filter.is_none_or(|f| p.family == f))
    {
        println!(
            "{:<16} {:<16} {}",
            preset.name,
            preset.family.to_string(),
            preset.description
        );
    }
    Ok(())
}

fn cmd_show(name: &str, json: bool, overrides: &Overrides) -> Result<(), String> {
    let config = load_config(name, overrides).map_err(|e| e.to_string())?;
    let graph = TopologyGraph::from_config(&config.hierarchy).map_err(|e| e.to_string())?;
    if json {
        println!("{}", graph.to_json().map_err(|e| e.to_string())?);
    } else {
        println!("Configuration: {}", config.name);
        print!("{graph}");
    }
    Ok(())
}

fn cmd_derive(
    stats: &Path,
    name: &str,
    json: bool,
    overrides: &Overrides,
) -> Result<(), String> {
    let config = load_config(name, overrides).map_err(|e| e.to_string())?;
    let graph = TopologyGraph::from_config(&config.hierarchy).map_err(|e| e.to_string())?;
    let power = if config.power.enabled {
        let models =
            PowerModelSet::attach_all(&graph, &config.power).map_err(|e| e.to_string())?;
        Some(PowerContext::new(models, &config.power))
    } else {
        None
    };

    let snapshot = match StatsSnapshot::from_path(stats) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!("{e}");
            None
        }
    };
    let metrics = DerivedMetrics::derive(
        snapshot.as_ref(),
        &graph.instrumented_components(),
        power.as_ref(),
    );

    if json {
        let result = hwsweep_core::sim::ExperimentResult::new(&config, metrics, graph.warnings());
        let row = serde_json::to_string_pretty(&result.row()).map_err(|e| e.to_string())?;
        println!("{row}");
    } else {
        metrics.print_summary(&config.name);
    }
    Ok(())
}

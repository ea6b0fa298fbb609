//! drmx CLI: explain, run, and validate matrix expressions.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use drmx_core::config::EngineConfig;
use drmx_core::prelude::*;
use drmx_exec::{CallRecorder, CheckpointManager, LocalBackend, PhysicalOps};
use drmx_planner::{
    cleanup, describe, normalize, parse_yaml_expression, plan_hash, Drm, ExpressionDoc, InputDef,
};

#[derive(Parser)]
#[command(name = "drmx")]
#[command(
    about = "drmx: algebraic optimizer for distributed matrix expressions",
    long_about = None
)]
struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the logical plan before and after each rewrite pass (EXPLAIN)
    Explain {
        /// Path to the expression YAML file
        #[arg(short, long)]
        expr: PathBuf,

        /// Print JSON instead of indented trees
        #[arg(long)]
        json: bool,
    },

    /// Materialize an expression on the local substrate
    Run {
        /// Path to the expression YAML file
        #[arg(short, long)]
        expr: PathBuf,

        /// Storage level for the result (overrides config), e.g. MEMORY_AND_DISK
        #[arg(long)]
        storage_level: Option<String>,

        /// Print every physical call made
        #[arg(long)]
        trace: bool,
    },

    /// Parse an expression YAML file and check operand shapes
    Validate {
        /// Path to the expression YAML file
        #[arg(short, long)]
        expr: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Explain { expr, json } => {
            if let Err(e) = explain_expression(&expr, json) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Run {
            expr,
            storage_level,
            trace,
        } => {
            if let Err(e) = run_expression(&expr, storage_level.as_deref(), trace) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { expr } => {
            if let Err(e) = validate_expression(&expr) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Expression is valid");
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "drmx_planner=trace,drmx_exec=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

type CliResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn load(path: &Path) -> CliResult<ExpressionDoc> {
    let yaml_content = fs::read_to_string(path)?;
    Ok(parse_yaml_expression(&yaml_content)?)
}

/// Random dense data for a declared input; seeded inputs are reproducible.
fn generate_input<B: PhysicalOps>(
    mgr: &mut CheckpointManager<B>,
    name: &str,
    def: &InputDef,
) -> Result<Drm> {
    let seed = def.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut rng = StdRng::seed_from_u64(seed);
    let m = InCoreMatrix::from_fn(def.rows, def.cols, |_, _| rng.gen_range(-1.0..1.0));
    tracing::debug!(input = name, rows = def.rows, cols = def.cols, seed, "generated input");

    match def.key_type {
        KeyType::Int => mgr.parallelize(&m, def.partitions),
        KeyType::Long => {
            let keys = (0..def.rows as i64).map(RowKey::Long).collect();
            mgr.parallelize_keyed(keys, &m, def.partitions)
        }
        KeyType::Text => {
            let keys = (0..def.rows)
                .map(|i| RowKey::Text(format!("{name}-{i}")))
                .collect();
            mgr.parallelize_keyed(keys, &m, def.partitions)
        }
    }
}

fn build<B: PhysicalOps>(doc: &ExpressionDoc, mgr: &mut CheckpointManager<B>) -> CliResult<Drm> {
    Ok(doc.build(|name, def| generate_input(mgr, name, def))?)
}

fn apply_overrides(cfg: &mut EngineConfig, storage_level: Option<&str>) -> Result<()> {
    if let Some(level) = storage_level {
        cfg.default_storage_level = level.parse()?;
    }
    cfg.validate()
}

/// `DRMX_*` environment plus command-line overrides. Malformed values fail.
fn engine_config(storage_level: Option<&str>) -> Result<EngineConfig> {
    let mut cfg = EngineConfig::try_from_env()?;
    apply_overrides(&mut cfg, storage_level)?;
    Ok(cfg)
}

fn explain_expression(path: &Path, json: bool) -> CliResult<()> {
    let doc = load(path)?;
    let mut mgr = CheckpointManager::new(engine_config(None)?, LocalBackend::new())?;
    let logical = build(&doc, &mut mgr)?;
    let normalized = normalize(&logical)?;
    let optimized = cleanup(&normalized);

    if json {
        let out = serde_json::json!({
            "logical": describe(&logical),
            "normalized": describe(&normalized),
            "optimized": optimized.as_ref().ok().map(describe),
            "error": optimized.as_ref().err().map(|e| e.to_string()),
            "plan_hash": optimized.as_ref().ok().map(plan_hash).transpose()?.map(|h| h.to_hex()),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Expression Plan");
    println!("===============");
    println!();
    println!("Logical:");
    print!("{}", describe(&logical));
    println!();
    println!("After normalization:");
    print!("{}", describe(&normalized));
    println!();
    match optimized {
        Ok(optimized) => {
            println!("After cleanup:");
            print!("{}", describe(&optimized));
            println!();
            println!("Plan hash: {}", plan_hash(&optimized)?);
            Ok(())
        }
        Err(e) => {
            println!("Cleanup rejected the plan: {}", e);
            Err(e.into())
        }
    }
}

fn run_expression(path: &Path, storage_level: Option<&str>, trace: bool) -> CliResult<()> {
    let doc = load(path)?;
    let config = engine_config(storage_level)?;
    let level = config.default_storage_level;

    let mut mgr = CheckpointManager::new(config, CallRecorder::new(LocalBackend::new()))?;
    let expr = build(&doc, &mut mgr)?;
    mgr.backend().clear();

    let started = Instant::now();
    let cp = mgr.checkpoint(&expr, level)?;
    let elapsed = started.elapsed();

    let leaf = cp
        .checkpoint()
        .ok_or("checkpoint did not produce a materialized leaf")?;
    println!("✓ Expression materialized");
    println!("  Shape: {}x{} ({}-keyed)", leaf.nrow(), leaf.ncol(), leaf.key_type());
    println!("  Non-zeros: {}", leaf.nnz().as_i64());
    println!("  Storage level: {}", leaf.storage_level());
    println!("  Partition tag: {}", leaf.partition_tag());
    println!("  Duration: {}ms", elapsed.as_millis());
    if let Some(manifest) = mgr.manifest(&expr) {
        println!("  Plan hash: {}", manifest.plan_hash);
    }

    if trace {
        println!();
        println!("Physical calls:");
        for (i, call) in mgr.backend().calls().iter().enumerate() {
            println!("  {}. {}", i + 1, serde_json::to_string(call)?);
        }
    }

    if leaf.key_type().is_int() && leaf.nrow() <= 8 && leaf.ncol() <= 8 {
        println!();
        for row in mgr.collect(&cp)?.rows() {
            let cells: Vec<String> = row.iter().map(|v| format!("{v:>10.4}")).collect();
            println!("  {}", cells.join(" "));
        }
    }
    Ok(())
}

fn validate_expression(path: &Path) -> CliResult<()> {
    let doc = load(path)?;
    let mut mgr = CheckpointManager::new(engine_config(None)?, LocalBackend::new())?;
    build(&doc, &mut mgr)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drmx_planner::{optimize, LogicalOp};

    fn manager() -> CheckpointManager<CallRecorder<LocalBackend>> {
        CheckpointManager::new(EngineConfig::default(), CallRecorder::new(LocalBackend::new()))
            .unwrap()
    }

    #[test]
    fn storage_level_flag_overrides_config() {
        let mut config = EngineConfig::default();
        apply_overrides(&mut config, Some("memory-and-disk-ser")).unwrap();
        assert_eq!(config.default_storage_level, StorageLevel::MEMORY_AND_DISK_SER);

        let mut config = EngineConfig::default();
        apply_overrides(&mut config, None).unwrap();
        assert_eq!(config.default_storage_level, StorageLevel::MEMORY_ONLY);

        assert!(matches!(
            apply_overrides(&mut config, Some("somewhere")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn malformed_environment_is_a_config_error() {
        std::env::set_var("DRMX_PARALLELISM", "many");
        let err = engine_config(None);
        std::env::remove_var("DRMX_PARALLELISM");
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn seeded_inputs_are_reproducible() {
        let def = InputDef {
            rows: 5,
            cols: 3,
            seed: Some(11),
            partitions: Some(2),
            key_type: KeyType::Int,
        };
        let mut mgr = manager();
        let a = generate_input(&mut mgr, "a", &def).unwrap();
        let b = generate_input(&mut mgr, "a", &def).unwrap();
        assert!(mgr.collect(&a).unwrap().approx_eq(&mgr.collect(&b).unwrap(), 0.0));
        assert_ne!(a.partition_tag(), b.partition_tag());
    }

    #[test]
    fn text_inputs_get_text_keys() {
        let def = InputDef {
            rows: 3,
            cols: 2,
            seed: Some(1),
            partitions: None,
            key_type: KeyType::Text,
        };
        let mut mgr = manager();
        let a = generate_input(&mut mgr, "names", &def).unwrap();
        assert_eq!(a.key_type(), KeyType::Text);
        let rows = mgr.collect_keyed(&a).unwrap();
        assert_eq!(rows[0].0, RowKey::Text("names-0".into()));
    }

    #[test]
    fn document_runs_end_to_end() {
        let doc = parse_yaml_expression(
            r#"
inputs:
  x: { rows: 20, cols: 3, seed: 5, partitions: 4 }
expr:
  matmul:
    - t: { input: x }
    - input: x
"#,
        )
        .unwrap();
        let mut mgr = manager();
        let expr = build(&doc, &mut mgr).unwrap();
        assert!(matches!(optimize(&expr).unwrap().op(), LogicalOp::SelfGramian(_)));
        mgr.backend().clear();
        let gram = mgr.collect(&expr).unwrap();
        assert_eq!((gram.nrow(), gram.ncol()), (3, 3));
        assert_eq!(mgr.backend().count("at_a"), 1);
    }
}

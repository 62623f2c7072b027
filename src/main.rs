use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::panic;
use tabled::{Table, Tabled, settings::Style};

use stress_router::analysis::SweepSpec;
use stress_router::config::{ANALYSIS, AnalysisConfig};
use stress_router::data::{
    JsonlFeatureSource, drain_into, export_model_json, load_config, load_graph_spec, load_labels,
    load_manifest, load_registry, registry_path, save_registry,
};
use stress_router::models::ModelRegistry;
use stress_router::utils::epoch_ms_to_date_string;
use stress_router::{Cli, Command, CorridorArgs, ModelsCommand, NodeId, ParetoFront, Path, SearchParams, StressEngine};

#[derive(Tabled, Serialize)]
struct ZoneRow {
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Sensor")]
    sensor: String,
    #[tabled(rename = "Area (m2)")]
    area: String,
    #[tabled(rename = "Centroid")]
    centroid: String,
    #[tabled(rename = "Aliases")]
    aliases: String,
    #[tabled(rename = "Nodes")]
    nodes: usize,
}

#[derive(Tabled, Serialize)]
struct PathRow {
    #[tabled(rename = "#")]
    config: usize,
    #[tabled(rename = "W")]
    weight: String,
    #[tabled(rename = "Alpha")]
    alpha: String,
    #[tabled(rename = "Distance (m)")]
    distance: String,
    #[tabled(rename = "Stress")]
    stress: String,
    #[tabled(rename = "Hops")]
    hops: usize,
    #[tabled(rename = "Expanded")]
    expanded: usize,
    #[tabled(rename = "Termination")]
    termination: String,
}

impl PathRow {
    fn new(config: usize, path: &Path) -> Self {
        Self {
            config,
            weight: path.params.weight.to_string(),
            alpha: path.params.alpha.to_string(),
            distance: format!("{:.1}", path.distance_m),
            stress: format!("{:.3}", path.stress),
            hops: path.len().saturating_sub(1),
            expanded: path.expanded,
            termination: path.termination.to_string(),
        }
    }
}

#[derive(Tabled, Serialize)]
struct ModelRow {
    #[tabled(rename = "Version")]
    version: u32,
    #[tabled(rename = "Deployed")]
    deployed: &'static str,
    #[tabled(rename = "Held-out MAE")]
    mae: String,
    #[tabled(rename = "Lambda")]
    lambda: String,
    #[tabled(rename = "Samples")]
    samples: String,
    #[tabled(rename = "Regressed")]
    regressed: bool,
    #[tabled(rename = "Trained")]
    trained: String,
}

fn print_table<T: Tabled>(rows: Vec<T>) {
    println!("{}", Table::new(rows).with(Style::rounded()));
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging() {
    let (global_level, my_code_level) = if cfg!(debug_assertions) {
        (log::LevelFilter::Warn, log::LevelFilter::Info)
    } else {
        (log::LevelFilter::Warn, log::LevelFilter::Warn)
    };

    env_logger::Builder::new()
        .filter(None, global_level)
        .filter(Some("stress_router"), my_code_level)
        .parse_default_env()
        .init();
}

async fn load_engine(
    config: AnalysisConfig,
    corridor: &CorridorArgs,
    registry: ModelRegistry,
) -> Result<StressEngine> {
    let manifest = load_manifest(&corridor.manifest)?;
    let graph = load_graph_spec(&corridor.graph)?;
    let engine = StressEngine::from_specs(config, &manifest, graph, registry)?;

    if let Some(features) = &corridor.features {
        let mut source = JsonlFeatureSource::open(features, corridor.batch_size).await?;
        let report = drain_into(&mut source, engine.aggregator()).await?;
        if report.rejected > 0 {
            log::warn!(
                "{} of {} feature record(s) rejected: {:?}",
                report.rejected,
                report.total(),
                report.rejected_by_reason
            );
        }
    }
    Ok(engine)
}

fn model_rows(registry: &ModelRegistry) -> Vec<ModelRow> {
    let deployed = registry.deployed_version();
    registry
        .entries()
        .iter()
        .map(|e| ModelRow {
            version: e.model.version,
            deployed: if deployed == Some(e.model.version) { "*" } else { "" },
            mae: format!("{:.4}", e.model.held_out_mae),
            lambda: format!("{}", e.model.lambda),
            samples: format!("{} (+{})", e.model.sample_count, e.model.synthetic_count),
            regressed: e.regressed,
            trained: epoch_ms_to_date_string(e.model.trained_at_ms),
        })
        .collect()
}

fn report_front(front: &ParetoFront, json: bool) -> Result<()> {
    if json {
        return print_json(front);
    }
    let rows: Vec<PathRow> = front
        .iter()
        .map(|e| PathRow::new(e.config_index, &e.path))
        .collect();
    print_table(rows);
    println!(
        "{} non-dominated of {} configuration(s), {} failed{}",
        front.len(),
        front.evaluated,
        front.failures.len(),
        front.seed.map(|s| format!(", seed {}", s)).unwrap_or_default()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        log::error!("CRITICAL PANIC:\n{}\nStack Trace:\n{}", info, backtrace);
    }));
    init_logging();

    let args = Cli::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ANALYSIS,
    };
    let registry_file = registry_path(args.model_dir.as_deref());

    match &args.command {
        Command::DumpConfig => print_json(&config)?,

        Command::Tessellate(corridor) => {
            let engine = load_engine(config, corridor, ModelRegistry::new()).await?;
            let assignment = engine.assignment();
            let rows: Vec<ZoneRow> = engine
                .tessellation()
                .zones()
                .iter()
                .map(|z| ZoneRow {
                    zone: z.id.to_string(),
                    sensor: z.sensor.to_string(),
                    area: format!("{:.1}", z.area_m2),
                    centroid: format!("({:.1}, {:.1})", z.centroid.x, z.centroid.y),
                    aliases: z.aliases.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(" "),
                    nodes: assignment.nodes_per_zone.get(&z.id).copied().unwrap_or(0),
                })
                .collect();
            if args.json {
                print_json(&rows)?;
            } else {
                print_table(rows);
                let excluded = engine.tessellation().excluded_sensors();
                if !excluded.is_empty() {
                    println!("Excluded (outside corridor): {:?}", excluded);
                }
            }
        }

        Command::Train {
            corridor,
            labels,
            promote,
        } => {
            let registry = load_registry(&registry_file)?;
            let mut engine = load_engine(config, corridor, registry).await?;
            let labels = labels.as_deref().map(load_labels).transpose()?;
            let registration = engine.train(labels.as_ref())?;
            if *promote {
                engine.promote(registration.version)?;
            }
            let registry = engine.into_registry();
            save_registry(&registry_file, &registry)?;
            if args.json {
                print_json(&registration)?;
            } else {
                print_table(model_rows(&registry));
            }
        }

        Command::Route {
            corridor,
            start,
            goal,
            weight,
            alpha,
        } => {
            let registry = load_registry(&registry_file)?;
            let params = SearchParams::try_new(
                weight.unwrap_or(config.search.weight.value()),
                alpha.unwrap_or(config.search.alpha.value()),
            )?;
            let engine = load_engine(config, corridor, registry).await?;
            let path = engine.route(NodeId(*start), NodeId(*goal), Some(params))?;
            if args.json {
                print_json(&path)?;
            } else {
                print_table(vec![PathRow::new(0, &path)]);
                let nodes: Vec<String> = path.nodes.iter().map(|n| n.to_string()).collect();
                println!("{}", nodes.join(" -> "));
            }
        }

        Command::Pareto {
            corridor,
            start,
            goal,
            samples,
            seed,
        } => {
            let registry = load_registry(&registry_file)?;
            let sweep = match samples {
                Some(n) => {
                    let mut explorer = config.explorer.clone();
                    explorer.stochastic_samples = *n;
                    if let Some(seed) = seed {
                        explorer.seed = *seed;
                    }
                    SweepSpec::stochastic_from_config(&explorer)
                }
                None => SweepSpec::grid_from_config(&config.explorer),
            };
            let engine = load_engine(config, corridor, registry).await?;
            let front = engine.explore(NodeId(*start), NodeId(*goal), &sweep)?;
            report_front(&front, args.json)?;
        }

        Command::Models(cmd) => {
            let mut registry = load_registry(&registry_file)?;
            match cmd {
                ModelsCommand::List => {}
                ModelsCommand::Promote { version } => {
                    registry.promote(*version)?;
                    save_registry(&registry_file, &registry)?;
                }
                ModelsCommand::Rollback => {
                    let version = registry.rollback()?;
                    save_registry(&registry_file, &registry)?;
                    log::info!("Rolled back to model v{}", version);
                }
                ModelsCommand::Export { version, path } => {
                    let model = registry
                        .get(*version)
                        .with_context(|| format!("no model version {} in {:?}", version, registry_file))?;
                    export_model_json(path, model)?;
                }
            }
            if args.json {
                print_json(registry.entries())?;
            } else {
                print_table(model_rows(&registry));
            }
        }
    }
    Ok(())
}

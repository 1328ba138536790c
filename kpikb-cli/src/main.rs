// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! KPI Knowledge Base CLI
//!
//! Command-line interface over a knowledge base data directory.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use kpikb_core::{EntityRef, KbConfig, SimilarityMethod};
use kpikb_query::{
    ClassInstances, EntityDescription, FormulaClosure, KnowledgeBase, NewKpi, StepSpec,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kpikb")]
#[command(about = "KPI knowledge base", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "KPIKB_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides config and KPIKB_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and the base revision
    Init,

    /// Add a KPI
    AddKpi {
        /// KPI class, e.g. energy_kpi
        #[arg(long)]
        superclass: String,

        label: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Unit of measure
        #[arg(long, default_value = "")]
        unit: String,

        /// Parsable computation formula
        #[arg(long)]
        formula: String,

        /// Human readable formula (defaults to the parsable one)
        #[arg(long)]
        human_formula: Option<String>,

        #[arg(long)]
        depends_on_machine: bool,

        #[arg(long)]
        depends_on_operation: bool,
    },

    /// Delete a KPI
    DeleteKpi { label: String },

    /// Add an operation
    AddOperation {
        label: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Delete an operation
    DeleteOperation { label: String },

    /// Register a machine
    AddMachine {
        label: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Add a process
    AddProcess {
        label: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Step as machine:operation, repeated in order
        #[arg(long = "step", value_parser = parse_step)]
        steps: Vec<StepSpec>,
    },

    /// Delete a process and its steps
    DeleteProcess { label: String },

    /// Formula closure of a KPI
    Formulas {
        label: String,

        /// Fall back to the most similar KPI
        #[arg(long)]
        closest: bool,

        /// Similarity method (edit_distance, weighted)
        #[arg(long)]
        method: Option<SimilarityMethod>,
    },

    /// Formula closure of every KPI
    AllFormulas,

    /// Instances of a class
    Instances {
        class: String,

        #[arg(long)]
        closest: bool,

        #[arg(long)]
        method: Option<SimilarityMethod>,
    },

    /// All properties of an entity
    Properties {
        label: String,

        #[arg(long)]
        closest: bool,

        #[arg(long)]
        method: Option<SimilarityMethod>,
    },

    /// List KPIs
    Kpis,

    /// Revision history
    Revision {
        #[command(subcommand)]
        command: RevisionCommands,
    },
}

#[derive(Subcommand)]
enum RevisionCommands {
    /// Revisions retained on disk
    List,

    /// Path of the current snapshot
    Path,

    /// Make a retained revision current
    Load { revision: u64 },
}

fn parse_step(s: &str) -> Result<StepSpec> {
    match s.split_once(':') {
        Some((machine, operation)) if !machine.is_empty() && !operation.is_empty() => {
            Ok(StepSpec::new(machine, operation))
        }
        _ => Err(anyhow!("expected machine:operation, got '{}'", s)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = KbConfig::load(cli.config.clone()).context("Failed to load configuration")?;
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }

    let kb: KnowledgeBase =
        KnowledgeBase::open(&config).context("Failed to open knowledge base")?;
    let json = cli.json;

    match cli.command {
        Commands::Init => {
            info!("Initialized knowledge base at {:?}", config.data_dir);
            print_revision(&kb, json)?;
        }

        Commands::AddKpi {
            superclass,
            label,
            description,
            unit,
            formula,
            human_formula,
            depends_on_machine,
            depends_on_operation,
        } => {
            let created = kb.add_kpi(&NewKpi {
                superclass,
                label,
                description,
                unit_of_measure: unit,
                parsable_formula: formula,
                human_readable_formula: human_formula,
                depends_on_machine,
                depends_on_operation,
            })?;
            print_created(&kb, &created, json)?;
        }

        Commands::DeleteKpi { label } => {
            kb.delete_kpi(&label)?;
            print_deleted(&kb, &label, json)?;
        }

        Commands::AddOperation { label, description } => {
            let created = kb.add_operation(&label, &description)?;
            print_created(&kb, &created, json)?;
        }

        Commands::DeleteOperation { label } => {
            kb.delete_operation(&label)?;
            print_deleted(&kb, &label, json)?;
        }

        Commands::AddMachine { label, description } => {
            let created = kb.add_machine(&label, &description)?;
            print_created(&kb, &created, json)?;
        }

        Commands::AddProcess {
            label,
            description,
            steps,
        } => {
            let created = kb.add_process(&label, &description, &steps)?;
            print_created(&kb, &created, json)?;
        }

        Commands::DeleteProcess { label } => {
            kb.delete_process(&label)?;
            print_deleted(&kb, &label, json)?;
        }

        Commands::Formulas {
            label,
            closest,
            method,
        } => {
            let (closure, similarity) = if closest {
                kb.closest_formulas(&label, method)?
            } else {
                (kb.formulas(&label)?, 1.0)
            };
            if json {
                print_json(&Scored {
                    similarity,
                    result: &closure,
                })?;
            } else {
                print_similarity(&label, &closure.root, similarity);
                print_closure(&closure);
            }
        }

        Commands::AllFormulas => {
            let all = kb.all_formulas()?;
            if json {
                print_json(&all)?;
            } else {
                for closure in all.values() {
                    println!("{}:", closure.root);
                    print_closure(closure);
                }
            }
        }

        Commands::Instances {
            class,
            closest,
            method,
        } => {
            let (instances, similarity) = if closest {
                kb.closest_class_instances(&class, method)?
            } else {
                (kb.class_instances(&class)?, 1.0)
            };
            if json {
                print_json(&Scored {
                    similarity,
                    result: &instances,
                })?;
            } else {
                print_similarity(&class, &instances.class.label, similarity);
                print_instances(&instances);
            }
        }

        Commands::Properties {
            label,
            closest,
            method,
        } => {
            let (description, similarity) = if closest {
                kb.closest_entity_properties(&label, method)?
            } else {
                (kb.entity_properties(&label)?, 1.0)
            };
            if json {
                print_json(&Scored {
                    similarity,
                    result: &description,
                })?;
            } else {
                print_similarity(&label, &description.entity.label, similarity);
                print_description(&description);
            }
        }

        Commands::Kpis => {
            let kpis = kb.kpis()?;
            if json {
                print_json(&kpis)?;
            } else {
                for kpi in &kpis {
                    println!("{}", kpi.label);
                }
                println!("{} KPI(s)", kpis.len());
            }
        }

        Commands::Revision { command } => match command {
            RevisionCommands::List => {
                let revisions = kb.revisions()?;
                if json {
                    print_json(&revisions)?;
                } else {
                    for revision in &revisions {
                        println!("{}", revision);
                    }
                }
            }
            RevisionCommands::Path => match kb.snapshot_path() {
                Some(path) if json => {
                    println!("{}", serde_json::json!({ "path": path.to_string_lossy() }))
                }
                Some(path) => println!("{}", path.display()),
                None => return Err(anyhow!("No snapshot written yet")),
            },
            RevisionCommands::Load { revision } => {
                kb.load_revision(revision)
                    .with_context(|| format!("Failed to load revision {}", revision))?;
                print_revision(&kb, json)?;
            }
        },
    }

    Ok(())
}

/// Lookup result paired with its similarity to the requested label
#[derive(Serialize)]
struct Scored<'a, T: Serialize> {
    similarity: f64,
    result: &'a T,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_revision(kb: &KnowledgeBase, json: bool) -> Result<()> {
    let revision = kb.current_revision();
    if json {
        println!("{}", serde_json::json!({ "revision": revision }));
    } else if let Some(revision) = revision {
        println!("✓ Revision {}", revision);
    }
    Ok(())
}

fn print_created(kb: &KnowledgeBase, created: &EntityRef, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "created": created,
                "revision": kb.current_revision(),
            })
        );
    } else {
        println!("✓ Created '{}' ({})", created.label, created.id);
        print_revision(kb, false)?;
    }
    Ok(())
}

fn print_deleted(kb: &KnowledgeBase, label: &str, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "deleted": label,
                "revision": kb.current_revision(),
            })
        );
    } else {
        println!("✓ Deleted '{}'", label);
        print_revision(kb, false)?;
    }
    Ok(())
}

fn print_similarity(requested: &str, resolved: &str, similarity: f64) {
    if requested != resolved {
        println!("Closest match for '{}': '{}' ({:.3})", requested, resolved, similarity);
    }
}

fn print_closure(closure: &FormulaClosure) {
    for (label, formula) in &closure.formulas {
        println!("  {} = {}", label, formula);
    }
}

fn print_instances(instances: &ClassInstances) {
    println!("{}:", instances.class.label);
    for instance in &instances.instances {
        println!("  {}", instance.label);
    }
    println!("{} instance(s)", instances.instances.len());
}

fn print_description(description: &EntityDescription) {
    let entity = &description.entity;
    match &description.class {
        Some(class) => println!("{} ({}) : {}", entity.label, entity.id, class.label),
        None => println!("{} ({}) : class", entity.label, entity.id),
    }
    for (property, value) in &description.properties {
        println!("  {} = {}", property, value);
    }
}

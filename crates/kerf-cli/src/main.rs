mod cli;

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use clap::Parser;

use kerf_core::commands::{add, gc, prune, recover, status, verify};
use kerf_core::config::{self, KerfConfig};
use kerf_core::repo::{lock, Repository};
use kerf_core::InstanceId;
use kerf_types::error::{KerfError, Result};

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<KerfConfig> {
    let mut config = match config::resolve_config_path(cli.config.as_deref()) {
        Some(path) => KerfConfig::load(&path)?,
        None => match &cli.root {
            Some(root) => KerfConfig::with_root(root.clone()),
            None => {
                return Err(KerfError::Config(
                    "no configuration file found; pass --config or --root".into(),
                ))
            }
        },
    };
    // An explicit --root beats the config file.
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    config.validate()?;
    Ok(config)
}

fn parse_instance(arg: Option<&str>) -> Result<Option<InstanceId>> {
    arg.map(|s| InstanceId::parse(s).map_err(KerfError::Config))
        .transpose()
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    tracing::info!("using store at {}", config.root);

    if let Commands::Init = cli.command {
        Repository::init_local(config.clone())?;
        println!("Initialized store at {}", config.root);
        return Ok(());
    }

    let repo = Repository::open_local(config)?;

    match &cli.command {
        Commands::Init => unreachable!("handled above"),

        Commands::Add { target, file } => {
            let (id, stats) = match file {
                Some(path) => add::run(&repo, target, File::open(Path::new(path))?)?,
                None => add::run(&repo, target, io::stdin())?,
            };
            println!(
                "{target}/{id}: {} bytes in {} parts ({} stored, {} deduplicated)",
                stats.bytes_total, stats.parts_total, stats.parts_stored, stats.parts_deduplicated
            );
        }

        Commands::Targets => {
            for target in repo.list_targets()? {
                println!("{target}");
            }
        }

        Commands::Status { target } => {
            let targets = match target {
                Some(t) => vec![t.clone()],
                None => repo.list_targets()?,
            };
            for target in targets {
                for s in status::run(&repo, &target)? {
                    let declared = s
                        .declared_size
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "unknown".into());
                    println!(
                        "{target}/{} {:>8} {:>3}% declared={} observed={} parts={}",
                        s.id,
                        s.state.to_string(),
                        s.completion_pct,
                        declared,
                        s.observed_bytes,
                        s.parts_linked
                    );
                }
            }
        }

        Commands::Verify { target, instance } => {
            let id = parse_instance(instance.as_deref())?;
            let report = verify::run(&repo, target, id)?;
            println!(
                "{target}/{}: size {} ({} declared, {} observed), hash {}",
                report.id,
                if report.size_ok { "ok" } else { "MISMATCH" },
                report.declared_size,
                report.observed_size,
                if report.hash_ok { "ok" } else { "MISMATCH" },
            );
            if !report.ok() {
                return Err(KerfError::Integrity(format!(
                    "instance {target}/{} failed verification",
                    report.id
                )));
            }
        }

        Commands::Recover {
            target,
            instance,
            output,
        } => {
            let id = parse_instance(instance.as_deref())?;
            let written = match output {
                Some(path) => {
                    let mut file = File::create(Path::new(path))?;
                    let n = recover::run(&repo, target, id, &mut file)?;
                    file.flush()?;
                    n
                }
                None => {
                    let mut stdout = io::stdout().lock();
                    let n = recover::run(&repo, target, id, &mut stdout)?;
                    stdout.flush()?;
                    n
                }
            };
            eprintln!("{written} bytes recovered");
        }

        Commands::Prune { target, dry_run } => {
            let targets = match target {
                Some(t) => vec![t.clone()],
                None => repo.list_targets()?,
            };
            for target in targets {
                let (stats, entries) = prune::run(&repo, &target, *dry_run)?;
                for entry in &entries {
                    println!("{:5} {target}/{} ({})", entry.action, entry.id, entry.reason);
                }
                let verb = if *dry_run { "would remove" } else { "removed" };
                println!(
                    "{target}: kept {}, {verb} {} complete and {} abandoned",
                    stats.kept, stats.pruned, stats.reclaimed_building
                );
            }
        }

        Commands::Gc { dry_run } => {
            let stats = gc::run(&repo, *dry_run)?;
            let verb = if *dry_run { "would delete" } else { "deleted" };
            println!(
                "{} entries, {} live, {verb} {} ({} bytes)",
                stats.entries_total, stats.entries_live, stats.entries_deleted, stats.bytes_freed
            );
        }

        Commands::BreakLocks => {
            let removed = lock::break_locks(repo.storage.as_ref())?;
            println!("{removed} lock(s) removed");
        }
    }

    Ok(())
}

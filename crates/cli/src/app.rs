//! Wires configuration, loader, snapshot store, and sync service behind the
//! `grimoire` subcommands.

use crate::cli::{Cli, Commands, KindArg};
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use grimoire_loader::build_loader;
use grimoire_snapshot::SnapshotStore;
use grimoire_state::{Config, EnvSnapshot, Resolver};
use grimoire_sync::{Catalog, StartupOutcome, SyncService};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Parses the command line and runs the selected subcommand.
pub fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> Result<()> {
    let env = EnvSnapshot::from_process();
    let user_path = cli.config.clone().or_else(|| env.user_config_path());
    let resolver = Resolver::new(env, user_path);
    let config = resolver
        .resolve(&cli.overrides.to_params())
        .context("failed to resolve configuration")?;

    if let Commands::Config { set, save } = &cli.command {
        return handle_config(&resolver, &config, set, *save);
    }

    let service = open_service(&config, &resolver).await?;
    let catalog = Catalog::new(Arc::clone(&service));
    match cli.command {
        Commands::Sync => {
            let result = catalog.trigger_sync().await?;
            println!("{result}");
            if !result.succeeded() {
                bail!("snapshot left unchanged");
            }
        }
        Commands::List { kind, json } => {
            startup(&service, &config, Refresh::Await).await?;
            print_list(&catalog, kind, json)?;
        }
        Commands::ShowCommand { name, args, template } => {
            startup(&service, &config, Refresh::Await).await?;
            if template {
                let command = catalog
                    .describe_command(&name)
                    .ok_or_else(|| anyhow!("command `{name}` not found"))?;
                println!("{}", serde_json::to_string_pretty(&command)?);
            } else {
                let args: HashMap<String, String> = args.into_iter().collect();
                println!("{}", catalog.get_command(&name, &args)?);
            }
        }
        Commands::ShowPersona { id } => {
            startup(&service, &config, Refresh::Await).await?;
            let persona = catalog.get_persona(&id)?;
            println!("# {}", persona.name);
            if !persona.description.is_empty() {
                println!("{}\n", persona.description);
            }
            println!("{}", persona.instructions);
        }
        Commands::ShowRule { name } => {
            startup(&service, &config, Refresh::Await).await?;
            println!("{}", catalog.get_rule(&name)?.content);
        }
        Commands::Status => print_status(&service, &config),
        Commands::Watch => watch(&service, &config).await?,
        Commands::Config { set, save } => handle_config(&resolver, &config, &set, save)?,
    }
    Ok(())
}

async fn open_service(config: &Config, resolver: &Resolver) -> Result<Arc<SyncService>> {
    let loader = build_loader(config, resolver.env().github_token()).context("failed to build the source loader")?;
    let store = SnapshotStore::open(&config.database_path)
        .await
        .with_context(|| format!("failed to open snapshot {}", config.database_path.display()))?;
    Ok(Arc::new(SyncService::new(loader, Arc::new(store))))
}

/// What startup does with a background refresh of a stale snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    /// One-shot commands exit right after printing, so the refresh lands first.
    Await,
    /// Long-running commands serve the stored snapshot while it runs.
    Detach,
}

async fn startup(service: &Arc<SyncService>, config: &Config, refresh: Refresh) -> Result<()> {
    let outcome = service.start(&config.sync).await?;
    settle(outcome, refresh).await;
    Ok(())
}

async fn settle(outcome: StartupOutcome, refresh: Refresh) {
    match outcome {
        StartupOutcome::InitialSync(result) if !result.succeeded() => {
            eprintln!(
                "warning: initial sync failed ({}); snapshot is empty",
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        StartupOutcome::BackgroundSync(handle) if refresh == Refresh::Await => {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "background sync task failed");
            }
        }
        StartupOutcome::BackgroundSync(_) => {
            tracing::debug!("serving stored snapshot while the background sync runs");
        }
        _ => {}
    }
}

async fn watch(service: &Arc<SyncService>, config: &Config) -> Result<()> {
    startup(service, config, Refresh::Detach).await?;
    let minutes = config.sync.interval_minutes.max(1);
    let periodic = service.spawn_periodic(Duration::from_secs(minutes * 60));
    tracing::info!(source = %service.loader().describe(), interval_minutes = minutes, "watching source");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    periodic.abort();
    Ok(())
}

fn print_list(catalog: &Catalog, kind: KindArg, json: bool) -> Result<()> {
    match kind {
        KindArg::Commands => {
            let commands = catalog.list_commands();
            if json {
                println!("{}", serde_json::to_string_pretty(&commands)?);
                return Ok(());
            }
            for command in commands {
                let args: Vec<&str> = command.argument_specs.iter().map(|a| a.name.as_str()).collect();
                if args.is_empty() {
                    println!("{}\t{}", command.name, command.description);
                } else {
                    println!("{}\t{}\t[{}]", command.name, command.description, args.join(", "));
                }
            }
        }
        KindArg::Personas => {
            let personas = catalog.list_personas();
            if json {
                println!("{}", serde_json::to_string_pretty(&personas)?);
                return Ok(());
            }
            for persona in personas {
                println!("{}\t{}", persona.name, persona.description);
            }
        }
        KindArg::Rules => {
            let rules = catalog.list_rules();
            if json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
                return Ok(());
            }
            for rule in rules {
                let first = rule.content.lines().next().unwrap_or_default();
                println!("{}\t{}", rule.name, first);
            }
        }
    }
    Ok(())
}

fn print_status(service: &SyncService, config: &Config) {
    let snapshot = service.store().snapshot();
    println!("source:   {}", service.loader().describe());
    println!("snapshot: {}", config.database_path.display());
    println!(
        "contents: {} commands, {} personas, {} rules",
        snapshot.commands.len(),
        snapshot.personas.len(),
        snapshot.rules.len()
    );
    match &snapshot.sync_metadata {
        None => println!("last sync: never"),
        Some(meta) => {
            let when = meta
                .last_sync_timestamp
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| meta.last_sync_timestamp.to_string());
            println!("last sync: {} ({})", when, meta.status);
            if let Some(err) = &meta.error_message {
                println!("error:    {err}");
            }
        }
    }
}

fn handle_config(resolver: &Resolver, config: &Config, set: &[(String, String)], save: bool) -> Result<()> {
    let config = if set.is_empty() && !save {
        config.clone()
    } else {
        let mut patch = Value::Object(Map::new());
        for (path, raw) in set {
            insert_path(&mut patch, path, parse_value(raw))?;
        }
        resolver
            .update(config, patch, save)
            .context("failed to update configuration")?
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    if save {
        if let Some(path) = resolver.user_config_path() {
            eprintln!("saved to {}", path.display());
        }
    }
    Ok(())
}

/// JSON literal when it parses as one, otherwise the raw string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn insert_path(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        bail!("invalid config path `{path}`");
    }
    let mut cursor = root;
    for segment in &segments[..segments.len() - 1] {
        let map = cursor
            .as_object_mut()
            .ok_or_else(|| anyhow!("`{path}` crosses a non-object value"))?;
        cursor = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let map = cursor
        .as_object_mut()
        .ok_or_else(|| anyhow!("`{path}` crosses a non-object value"))?;
    map.insert(segments[segments.len() - 1].to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn detached_refresh_does_not_block_startup() {
        let refresh = tokio::spawn(std::future::pending::<()>());
        tokio::time::timeout(
            Duration::from_secs(1),
            settle(StartupOutcome::BackgroundSync(refresh), Refresh::Detach),
        )
        .await
        .expect("detached refresh must not block");
    }

    #[tokio::test]
    async fn awaited_refresh_waits_for_the_task() {
        let pending = tokio::spawn(std::future::pending::<()>());
        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            settle(StartupOutcome::BackgroundSync(pending), Refresh::Await),
        )
        .await;
        assert!(waited.is_err(), "one-shot commands wait for the refresh");

        let done = tokio::spawn(async {});
        settle(StartupOutcome::BackgroundSync(done), Refresh::Await).await;
    }

    #[test]
    fn values_fall_back_to_strings() {
        assert_eq!(parse_value("30"), json!(30));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("main"), json!("main"));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
    }

    #[test]
    fn dotted_paths_build_nested_patches() {
        let mut patch = json!({});
        insert_path(&mut patch, "source.remote.branch", json!("dev")).unwrap();
        insert_path(&mut patch, "source.type", json!("remote")).unwrap();
        insert_path(&mut patch, "sync.enabled", json!(true)).unwrap();
        assert_eq!(
            patch,
            json!({"source": {"remote": {"branch": "dev"}, "type": "remote"}, "sync": {"enabled": true}})
        );
    }

    #[test]
    fn malformed_paths_are_rejected() {
        let mut patch = json!({});
        assert!(insert_path(&mut patch, "source..type", json!(1)).is_err());
        insert_path(&mut patch, "sync", json!(5)).unwrap();
        assert!(insert_path(&mut patch, "sync.enabled", json!(true)).is_err());
    }
}

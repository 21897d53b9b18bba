use clap::{Args, Parser, Subcommand, ValueEnum};
use grimoire_state::{ResolveParams, SourceType};
use std::path::PathBuf;

/// Command-line interface for `grimoire`.
#[derive(Debug, Parser)]
#[command(
    name = "grimoire",
    version,
    about = "Sync prompt commands, personas, and rules into a local snapshot"
)]
pub struct Cli {
    /// User preference file (JSON).
    #[arg(long, global = true, env = "GRIMOIRE_CONFIG_PATH", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Commands,
}

/// Explicit settings; these outrank the environment and the preference file.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    #[arg(long, global = true, value_enum)]
    pub source_type: Option<SourceArg>,
    /// Base directory of a local source.
    #[arg(long, global = true, value_name = "DIR")]
    pub local_path: Option<PathBuf>,
    /// Repository URL of a remote source.
    #[arg(long, global = true, value_name = "URL")]
    pub remote_url: Option<String>,
    #[arg(long, global = true)]
    pub remote_branch: Option<String>,
    #[arg(long, global = true, value_name = "MINUTES")]
    pub cache_ttl_minutes: Option<u64>,
    /// Snapshot file location.
    #[arg(long, global = true, value_name = "FILE")]
    pub db_path: Option<PathBuf>,
    /// Enable periodic sync.
    #[arg(long, global = true)]
    pub auto_sync: Option<bool>,
    #[arg(long, global = true, value_name = "MINUTES")]
    pub sync_interval_minutes: Option<u64>,
}

impl Overrides {
    pub fn to_params(&self) -> ResolveParams {
        ResolveParams {
            source_type: self.source_type.map(Into::into),
            local_path: self.local_path.clone(),
            remote_url: self.remote_url.clone(),
            remote_branch: self.remote_branch.clone(),
            cache_ttl_minutes: self.cache_ttl_minutes,
            database_path: self.db_path.clone(),
            sync_enabled: self.auto_sync,
            sync_interval_minutes: self.sync_interval_minutes,
            ..ResolveParams::default()
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SourceArg {
    Local,
    Remote,
}

impl From<SourceArg> for SourceType {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Local => SourceType::Local,
            SourceArg::Remote => SourceType::Remote,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Commands,
    Personas,
    Rules,
}

/// Available `grimoire` commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetches the source and updates the snapshot.
    Sync,
    /// Lists artifacts from the snapshot.
    List {
        #[arg(value_enum)]
        kind: KindArg,
        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Renders a command with its arguments substituted.
    ShowCommand {
        name: String,
        /// Argument value as NAME=VALUE (repeatable).
        #[arg(long = "arg", value_name = "NAME=VALUE", value_parser = parse_key_val)]
        args: Vec<(String, String)>,
        /// Show the template and its arguments instead of rendering.
        #[arg(long, default_value_t = false)]
        template: bool,
    },
    /// Prints one persona by id or name.
    ShowPersona { id: String },
    /// Prints one rule by `name#ordinal` or name.
    ShowRule { name: String },
    /// Prints source, snapshot, and last sync outcome.
    Status,
    /// Runs startup sync, then syncs periodically until Ctrl-C.
    Watch,
    /// Prints the resolved configuration, optionally updating it.
    Config {
        /// Set a field as dotted.path=VALUE; VALUE is JSON or a bare string (repeatable).
        #[arg(long = "set", value_name = "PATH=VALUE", value_parser = parse_key_val)]
        set: Vec<(String, String)>,
        /// Write the result to the preference file (requires persistence.enabled).
        #[arg(long, default_value_t = false)]
        save: bool,
    },
}

pub fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty name in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn key_val_parsing() {
        assert_eq!(
            parse_key_val("NAME=Ada Lovelace").unwrap(),
            ("NAME".to_string(), "Ada Lovelace".to_string())
        );
        assert_eq!(parse_key_val("X=a=b").unwrap().1, "a=b");
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn overrides_become_explicit_params() {
        let cli = Cli::parse_from([
            "grimoire",
            "--source-type",
            "remote",
            "--remote-url",
            "https://github.com/acme/prompts",
            "--auto-sync",
            "false",
            "status",
        ]);
        let params = cli.overrides.to_params();
        assert_eq!(params.source_type, Some(SourceType::Remote));
        assert_eq!(params.sync_enabled, Some(false));
        assert_eq!(params.local_path, None);
    }

    #[test]
    fn show_command_collects_args() {
        let cli = Cli::parse_from(["grimoire", "show-command", "greet", "--arg", "NAME=Ada", "--arg", "X=1"]);
        match cli.command {
            Commands::ShowCommand { name, args, .. } => {
                assert_eq!(name, "greet");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

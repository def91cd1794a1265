//! MediaCI CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;

use commands::{Commands, ConfigCommands};
use config::{CliConfig, OutputFormat};

#[derive(Parser)]
#[command(name = "mediaci")]
#[command(author, version, about = "MediaCI build orchestration", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Output format, overriding the configured one
    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = CliConfig::load().unwrap_or_default();
    if let Some(format) = cli.format {
        config.output_format = format;
    }

    match cli.command {
        Commands::Validate { registry } => handlers::validate(&config, registry)?,
        Commands::Plan { registry, change } => handlers::plan(&config, registry, change)?,
        Commands::Run {
            registry,
            change,
            dry_run,
            root,
        } => handlers::run(&config, registry, change, dry_run, root).await?,
        Commands::Smoke { suite, root } => handlers::smoke(&config, &suite, root).await?,
        Commands::Compare {
            ref_type,
            ref_value,
            file,
            metrics_output,
        } => handlers::compare(&config, &ref_type, &ref_value, file, metrics_output).await?,
        Commands::Schema => handlers::schema()?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_arguments() {
        let cli = Cli::try_parse_from([
            "mediaci",
            "plan",
            "config/registry.yaml",
            "--repository",
            "https://github.com/Intel-Media-SDK/MediaSDK.git",
            "--branch",
            "refs/pull/1303/head",
            "--revision",
            "ef64b58a",
            "--target-branch",
            "master",
            "--format",
            "json",
        ])
        .unwrap();

        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        let Commands::Plan { registry, change } = cli.command else {
            panic!("expected plan command");
        };
        assert_eq!(registry.unwrap().to_str(), Some("config/registry.yaml"));
        assert_eq!(change.branch, "refs/pull/1303/head");
        assert_eq!(change.target_branch.as_deref(), Some("master"));
    }

    #[test]
    fn test_compare_needs_exactly_one_input() {
        let both = Cli::try_parse_from([
            "mediaci",
            "compare",
            "--ref-type",
            "md5",
            "--ref-value",
            "abc",
            "--file",
            "a.yuv",
            "--metrics-output",
            "m.txt",
        ]);
        assert!(both.is_err());

        let neither = Cli::try_parse_from(["mediaci", "compare", "--ref-type", "md5", "--ref-value", "abc"]);
        assert!(neither.is_err());
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "mediaci",
            "--log-json",
            "run",
            "--repository",
            "https://github.com/Intel-Media-SDK/product-configs.git",
            "--branch",
            "master",
            "--revision",
            "1",
            "--dry-run",
        ])
        .unwrap();

        assert!(cli.log_json);
        let Commands::Run { registry, dry_run, root, .. } = cli.command else {
            panic!("expected run command");
        };
        assert!(registry.is_none());
        assert!(dry_run);
        assert!(root.is_none());
    }
}

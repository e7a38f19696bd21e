use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use wagate_config::WagateConfig;

#[derive(Parser)]
#[command(name = "wagate", about = "wagate: multi-session WhatsApp HTTP gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (toml, yaml or json). Discovered when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Gateway {
        /// Overrides `server.bind`.
        #[arg(long, env = "WAGATE_BIND")]
        bind: Option<String>,
        /// Overrides `server.port`.
        #[arg(long, env = "WAGATE_PORT")]
        port: Option<u16>,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn apply_overrides(config: &mut WagateConfig, bind: Option<String>, port: Option<u16>) {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "wagate starting");

    let mut config = wagate_config::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Gateway { bind, port } => {
            apply_overrides(&mut config, bind, port);
            wagate_gateway::server::start_gateway(config).await
        },
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            print!("{}", wagate_config::to_toml(&config)?);
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_gateway_flags() {
        let cli = Cli::try_parse_from([
            "wagate",
            "--log-level",
            "debug",
            "gateway",
            "--bind",
            "0.0.0.0",
            "--port",
            "8080",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        let Commands::Gateway { bind, port } = cli.command else {
            panic!("expected gateway command");
        };
        assert_eq!(bind.as_deref(), Some("0.0.0.0"));
        assert_eq!(port, Some(8080));
    }

    #[test]
    fn overrides_replace_only_given_values() {
        let mut config = WagateConfig::default();
        apply_overrides(&mut config, None, Some(9000));
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
    }
}

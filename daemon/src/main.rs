//! POHA daemon: entry point for running a POHA node.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use poha_node::{NodeConfig, PohaNode};
use poha_utils::{init_logging, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "poha-daemon", about = "Hybrid PoA / Proof-of-Humanity node daemon")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base; CLI
    /// flags and env vars override them.
    #[arg(long, env = "POHA_CONFIG")]
    config: Option<PathBuf>,

    /// Address the peer listener binds to.
    #[arg(long, env = "POHA_LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Address advertised to peers.
    #[arg(long, env = "POHA_PUBLIC_ADDR")]
    public_addr: Option<String>,

    /// Bootstrap peer addresses (comma-separated: "1.2.3.4:7600,5.6.7.8:7600").
    #[arg(long, env = "POHA_BOOTSTRAP_PEERS", value_delimiter = ',')]
    bootstrap_peers: Vec<String>,

    #[arg(long, env = "POHA_MAX_PEERS")]
    max_peers: Option<usize>,

    /// Validator addresses (comma-separated).
    #[arg(long, env = "POHA_VALIDATORS", value_delimiter = ',')]
    validators: Vec<String>,

    /// Hex-encoded 32-byte key seed.
    #[arg(long, env = "POHA_KEY_SEED", hide_env_values = true)]
    key_seed: Option<String>,

    #[arg(long, env = "POHA_BLOCK_TIME_SECS")]
    block_time_secs: Option<u64>,

    /// Start mining once the node is up.
    #[arg(long, env = "POHA_MINE")]
    mine: bool,

    /// Verify humanity through the remote service at this URL.
    #[arg(long, env = "POHA_EXTERNAL_POH_URL")]
    external_poh_url: Option<String>,

    #[arg(long, env = "POHA_EXTERNAL_POH_API_KEY", hide_env_values = true)]
    external_poh_api_key: Option<String>,

    /// Run the local humanity simulator and verify against it.
    #[arg(long, env = "POHA_POH_SIMULATOR")]
    poh_simulator: bool,

    #[arg(long, env = "POHA_POH_SIMULATOR_PORT")]
    poh_simulator_port: Option<u16>,

    /// Development only: self-verify against the local registry at boot.
    #[arg(long, env = "POHA_DEV_AUTO_VERIFY")]
    dev_auto_verify: bool,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "POHA_METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "POHA_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "POHA_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    /// Run the node until SIGINT/SIGTERM.
    Run,
    /// Print the effective configuration as TOML.
    ShowConfig,
}

impl Cli {
    /// Overlay the flags that were given on top of `base`.
    fn apply(self, base: NodeConfig) -> NodeConfig {
        let external = self.external_poh_url.is_some();
        NodeConfig {
            listen_addr: self.listen_addr.unwrap_or(base.listen_addr),
            public_addr: self.public_addr.or(base.public_addr),
            bootstrap_peers: if self.bootstrap_peers.is_empty() {
                base.bootstrap_peers
            } else {
                self.bootstrap_peers
            },
            max_peers: self.max_peers.unwrap_or(base.max_peers),
            validators: if self.validators.is_empty() {
                base.validators
            } else {
                self.validators
            },
            key_seed: self.key_seed.or(base.key_seed),
            block_time_secs: self.block_time_secs.unwrap_or(base.block_time_secs),
            mine: self.mine || base.mine,
            use_external_poh: external || base.use_external_poh,
            external_poh_base_url: self.external_poh_url.or(base.external_poh_base_url),
            external_poh_api_key: self.external_poh_api_key.or(base.external_poh_api_key),
            use_poh_simulator: self.poh_simulator || base.use_poh_simulator,
            poh_simulator_port: self.poh_simulator_port.unwrap_or(base.poh_simulator_port),
            dev_auto_verify: self.dev_auto_verify || base.dev_auto_verify,
            metrics_addr: self.metrics_addr.or(base.metrics_addr),
            log_format: self.log_format.unwrap_or(base.log_format),
            log_level: self.log_level.unwrap_or(base.log_level),
            ..base
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let base = match cli.config.as_deref() {
        Some(path) => NodeConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    let config_path = cli.config.clone();
    let command = cli.command;
    let config = cli.apply(base);

    match command {
        Command::ShowConfig => {
            print!("{}", config.to_toml_string()?);
        }
        Command::Run => {
            init_logging(config.log_format, &config.log_level)
                .context("installing the tracing subscriber")?;
            if let Some(path) = config_path {
                tracing::info!("loaded config from {}", path.display());
            }
            run(config).await?;
        }
    }
    Ok(())
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    tracing::info!(
        listen = %config.listen_addr,
        validators = config.validators.len(),
        mine = config.mine,
        "starting POHA node"
    );
    if !config.bootstrap_peers.is_empty() {
        tracing::info!("bootstrap peers: {}", config.bootstrap_peers.join(", "));
    }

    let mut node = PohaNode::new(config).await?;
    node.start().await?;

    node.shutdown.wait_for_signal().await;
    tracing::info!("shutdown signal received, stopping node");
    node.stop().await;

    tracing::info!("POHA daemon exited cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("poha-daemon").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_the_file() {
        let base = NodeConfig {
            listen_addr: "0.0.0.0:9000".into(),
            validators: vec!["V1".into()],
            max_peers: 10,
            ..NodeConfig::default()
        };
        let cli = parse(&[
            "--listen-addr",
            "127.0.0.1:7601",
            "--bootstrap-peers",
            "10.0.0.1:7600,10.0.0.2:7600",
            "--mine",
            "--log-format",
            "json",
            "run",
        ]);
        assert_eq!(cli.command, Command::Run);

        let config = cli.apply(base);
        assert_eq!(config.listen_addr, "127.0.0.1:7601");
        assert_eq!(config.bootstrap_peers, vec!["10.0.0.1:7600", "10.0.0.2:7600"]);
        assert_eq!(config.validators, vec!["V1"]);
        assert_eq!(config.max_peers, 10);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.mine);
    }

    #[test]
    fn external_url_enables_the_remote_gateway() {
        let config = parse(&["--external-poh-url", "https://poh.example", "show-config"])
            .apply(NodeConfig::default());
        assert!(config.use_external_poh);
        assert_eq!(config.external_poh_base_url.as_deref(), Some("https://poh.example"));
    }

    #[test]
    fn file_values_survive_when_flags_are_absent() {
        let base = NodeConfig {
            use_poh_simulator: true,
            poh_simulator_port: 7801,
            dev_auto_verify: true,
            ..NodeConfig::default()
        };
        let config = parse(&["run"]).apply(base);
        assert!(config.use_poh_simulator);
        assert_eq!(config.poh_simulator_port, 7801);
        assert!(config.dev_auto_verify);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn a_subcommand_is_required() {
        assert!(Cli::try_parse_from(["poha-daemon"]).is_err());
    }
}

//! Command-line interface for Hearth.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hearth_agent::{DispatchConfig, DispatchLoop, OllamaConfig, OllamaReasoner};
use hearth_core::config::env_vars;
use hearth_core::HearthConfig;
use hearth_devices::{DeviceService, MqttLink, ReadingStore, Transport};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// Hearth - talk to the light and the door in your room.
#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// MQTT broker host, overrides the configuration.
    #[arg(long, global = true)]
    broker: Option<String>,

    /// Model name, overrides the configuration.
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Handle one instruction and print the answer.
    Ask {
        /// The instruction, e.g. "turn on the light".
        instruction: String,
    },
    /// Interactive loop; every line is an independent request.
    Chat,
    /// Print the current device readings.
    Status {
        /// Seconds to wait for the startup probes to be answered.
        #[arg(long, default_value_t = 5)]
        wait_secs: u64,
        /// Print readings as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// How long to wait for the first ConnAck before handling requests anyway.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(&args)?;

    match args.command {
        Command::Ask { instruction } => run_ask(&config, &instruction).await,
        Command::Chat => run_chat(&config).await,
        Command::Status { wait_secs, json } => {
            run_status(&config, Duration::from_secs(wait_secs), json).await
        }
    }
}

fn log_filter(verbose: bool) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = if verbose { "hearth=debug" } else { "hearth=info" };
        tracing_subscriber::EnvFilter::new(directive).add_directive(tracing::Level::WARN.into())
    })
}

fn init_logging(verbose: bool) {
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let env_filter = log_filter(verbose);

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init();
    }
}

/// Config file (flag, then `HEARTH_CONFIG`), then environment, then flags.
fn load_config(args: &Args) -> Result<HearthConfig> {
    let path = args
        .config
        .clone()
        .or_else(|| std::env::var(env_vars::CONFIG).ok().map(PathBuf::from));

    let mut config = match path.as_deref() {
        Some(path) => read_config_file(path)?,
        None => HearthConfig::default(),
    };
    config.apply_env()?;

    if let Some(broker) = &args.broker {
        config.mqtt.broker = broker.clone();
    }
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    config.validate()?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<HearthConfig> {
    HearthConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

/// Broker link plus the device service on top of it.
struct Devices {
    link: Arc<MqttLink>,
    service: Arc<DeviceService>,
}

impl Devices {
    async fn connect(config: &HearthConfig) -> Self {
        let store = Arc::new(ReadingStore::new());
        let link = MqttLink::connect(
            &config.mqtt,
            config.topics.clone(),
            &config.timing,
            store.clone(),
        );

        match link.wait_connected(CONNECT_TIMEOUT).await {
            Ok(()) => info!("Connected to {}", link.broker_addr()),
            Err(_) => warn!(
                "No connection to {} yet; device requests will report it",
                link.broker_addr()
            ),
        }

        let service = Arc::new(DeviceService::with_settings(
            link.clone(),
            store,
            config.topics.clone(),
            &config.timing,
        ));
        Self { link, service }
    }

    async fn shutdown(&self) {
        if let Err(e) = self.link.disconnect().await {
            warn!("Disconnect failed: {}", e);
        }
    }
}

fn build_dispatch(config: &HearthConfig, service: Arc<DeviceService>) -> Result<DispatchLoop> {
    let reasoner = OllamaReasoner::new(OllamaConfig::from(&config.llm))?;
    info!(
        "Using Ollama: endpoint={}, model={}",
        reasoner.config().endpoint,
        reasoner.config().model
    );

    let tools = Arc::new(hearth_tools::device_registry(service));
    Ok(DispatchLoop::new(Arc::new(reasoner), tools)
        .with_config(DispatchConfig::from(&config.agent)))
}

async fn run_ask(config: &HearthConfig, instruction: &str) -> Result<()> {
    let devices = Devices::connect(config).await;
    let dispatch = build_dispatch(config, devices.service.clone())?;

    println!("{}", dispatch.answer(instruction).await);

    devices.shutdown().await;
    Ok(())
}

async fn run_chat(config: &HearthConfig) -> Result<()> {
    let devices = Devices::connect(config).await;
    let dispatch = build_dispatch(config, devices.service.clone())?;

    println!("Hearth - Chat Mode");
    println!("==================\n");
    println!("Type an instruction and press Enter.");
    println!("Type 'quit' or 'exit' to quit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            println!("Goodbye!");
            break;
        }

        println!("{}\n", dispatch.answer(input).await);
    }

    devices.shutdown().await;
    Ok(())
}

async fn run_status(config: &HearthConfig, wait: Duration, json: bool) -> Result<()> {
    let devices = Devices::connect(config).await;
    tokio::time::sleep(wait).await;

    let readings = devices.service.readings();
    if json {
        println!("{}", serde_json::to_string_pretty(&readings)?);
    } else {
        println!("Broker: {} ({})", devices.link.broker_addr(), devices.link.status());
        for reading in &readings {
            let updated = reading
                .updated_at
                .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {:<6} {:<8} raw={:<4} updated={}",
                reading.device.as_str(),
                reading.state().as_str(),
                reading.value,
                updated
            );
        }
    }

    devices.shutdown().await;
    Ok(())
}

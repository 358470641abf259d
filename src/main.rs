/*!
 * follicore - operator CLI for the inference service connection
 */

use anyhow::Context;
use clap::{Parser, Subcommand};
use follicore::config::Settings;
use follicore::error::{FolliError, EXIT_FATAL, EXIT_NOT_READY, EXIT_SUCCESS};
use follicore::logging::init_logging;
use follicore::report::{to_json_line, EventReport, HealthReport, ProbeReport};
use follicore_connect::{ConnectionState, InferenceClient, ServingStatus};
use std::path::PathBuf;
use tracing::{debug, info};

/// FolliCore inference service client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, global = true, env = "FOLLICORE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the service host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Override the service port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Use TLS
    #[arg(long, global = true)]
    tls: bool,

    /// Print machine-readable JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect, check model readiness and exit 0 only if ready
    Probe,

    /// Print the serving status of one service
    Health {
        /// Fully-qualified service name; empty asks about the whole server
        #[arg(short, long, default_value = "")]
        service: String,
    },

    /// Stay connected and print lifecycle events until Ctrl-C
    Watch,

    /// Print the resolved settings
    Config,
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<FolliError>()
                .map(FolliError::exit_code)
                .unwrap_or(EXIT_FATAL)
        }
    };
    std::process::exit(code);
}

fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(host) = &cli.host {
        settings.client.host = host.clone();
    }
    if let Some(port) = cli.port {
        settings.client.port = port;
    }
    if cli.tls {
        settings.client.use_tls = true;
    }
    if cli.verbose {
        settings.logging.verbose = true;
    }
    settings.validate()?;

    init_logging(&settings.logging)?;
    debug!(command = ?cli.command, "starting");

    if let Command::Config = cli.command {
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        } else {
            print!("{}", settings.to_toml()?);
        }
        return Ok(EXIT_SUCCESS);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Command::Probe => probe(settings, cli.json).await,
            Command::Health { service } => health(settings, &service, cli.json).await,
            Command::Watch => watch(settings, cli.json).await,
            Command::Config => Ok(EXIT_SUCCESS),
        }
    })
}

async fn probe(settings: Settings, json: bool) -> anyhow::Result<i32> {
    let endpoint = settings.client.endpoint().to_string();
    let client = InferenceClient::new(settings.client).map_err(FolliError::from)?;
    client.connect().await.map_err(FolliError::from)?;

    let stats = client.stats();
    let report = ProbeReport {
        endpoint,
        ready: stats.state == ConnectionState::Ready,
        stats,
    };
    client.disconnect();

    if json {
        println!("{}", to_json_line(&report)?);
    } else {
        println!("{}", report.render());
    }
    Ok(if report.ready {
        EXIT_SUCCESS
    } else {
        EXIT_NOT_READY
    })
}

async fn health(settings: Settings, service: &str, json: bool) -> anyhow::Result<i32> {
    let endpoint = settings.client.endpoint().to_string();
    let client = InferenceClient::new(settings.client).map_err(FolliError::from)?;
    client.connect().await.map_err(FolliError::from)?;

    let status = client
        .health()
        .check_health(service)
        .await
        .map_err(FolliError::from);
    client.disconnect();

    let report = HealthReport {
        endpoint,
        service: service.to_string(),
        status: status?,
    };
    if json {
        println!("{}", to_json_line(&report)?);
    } else {
        println!("{}", report.render());
    }
    Ok(if report.status == ServingStatus::Serving {
        EXIT_SUCCESS
    } else {
        EXIT_NOT_READY
    })
}

async fn watch(mut settings: Settings, json: bool) -> anyhow::Result<i32> {
    // Without the background watch a silent dead channel would never be noticed
    settings.client.health.enabled = true;
    let client = InferenceClient::new(settings.client).map_err(FolliError::from)?;
    let mut events = client.subscribe();

    let print = |report: EventReport| -> anyhow::Result<()> {
        if json {
            println!("{}", to_json_line(&report)?);
        } else {
            println!("{}", report.render());
        }
        Ok(())
    };

    if let Err(err) = client.connect().await {
        // The failure was already emitted as an event
        for event in events.drain() {
            print(EventReport::from(&event))?;
        }
        return Err(FolliError::from(err).into());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            event = events.recv() => match event {
                Some(event) => print(EventReport::from(&event))?,
                None => break,
            },
        }
    }

    client.disconnect();
    for event in events.drain() {
        print(EventReport::from(&event))?;
    }
    Ok(EXIT_SUCCESS)
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ratatoskr::config::Config;
use ratatoskr::error::DnsError;
use ratatoskr::handler::Handler;
use ratatoskr::resolver::root::{spawn_priming, spawn_sweeper};
use ratatoskr::resolver::Resolver;
use ratatoskr::transport::{doh, dot, tls};
use ratatoskr::{server, Result};

#[derive(Parser, Debug)]
#[command(version, about = "A recursive, DNSSEC-validating DNS resolver")]
struct Args {
    /// Location of the config file; a default one is generated if it
    /// does not exist.
    #[arg(short, long, default_value = "ratatoskr.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::load_or_create(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("cannot load configuration: {}", err);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.loglevel))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(config).await {
        error!(%err, "fatal error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting");

    let resolver = Arc::new(Resolver::new(&config)?);

    match resolver.prime_roots().await {
        Ok(count) => info!(servers = count, "root servers primed"),
        Err(err) => warn!(%err, "initial root priming failed, using configured hints"),
    }

    // A mismatch between the fetched root DNSKEY set and the configured
    // anchors means nothing can be validated; refuse to start. Plain
    // network failures are tolerated, the hourly priming will retry.
    match resolver.verify_root_anchors().await {
        Ok(()) => {}
        Err(err @ DnsError::Dnssec(_)) => return Err(err),
        Err(err) => warn!(%err, "could not self-check root anchors at boot"),
    }

    spawn_priming(resolver.clone());
    spawn_sweeper(resolver.clone());

    let handler = Handler::new(resolver);

    let bind = config.bind_addr()?;
    tokio::spawn(listener("udp", server::run_udp(bind, handler.clone())));
    tokio::spawn(listener("tcp", server::run_tcp(bind, handler.clone())));

    if config.has_tls() {
        let tls_config = tls::load_server_config(&config.tlscertificate, &config.tlsprivatekey)?;
        tokio::spawn(listener(
            "dot",
            dot::run_dot(config.bindtls_addr()?, tls_config.clone(), handler.clone()),
        ));
        tokio::spawn(listener(
            "doh",
            doh::run_doh(config.binddoh_addr()?, Some(tls_config), handler.clone()),
        ));
    } else {
        tokio::spawn(listener(
            "doh",
            doh::run_doh(config.binddoh_addr()?, None, handler.clone()),
        ));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    Ok(())
}

async fn listener(name: &'static str, serve: impl std::future::Future<Output = Result<()>>) {
    if let Err(err) = serve.await {
        error!(listener = name, %err, "listener failed");
        std::process::exit(1);
    }
}

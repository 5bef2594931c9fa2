use clap::Parser;
use dnsfilter_domain::CliOverrides;
use tracing::info;

mod bootstrap;
mod di;
mod server;

#[derive(Parser)]
#[command(name = "dnsfilter")]
#[command(version = "0.1.0")]
#[command(about = "dnsfilter - DNS forwarder over UDP, TCP, DNS-over-TLS and DNS-over-HTTPS")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Address to accept DNS queries on, e.g. 127.0.0.1:5353
    #[arg(short = 'l', long)]
    listen: Option<String>,

    /// Upstream server as host[::port[::protocol[::endpoint]]] (repeatable)
    #[arg(short = 'u', long = "upstream", value_name = "SPEC")]
    upstreams: Vec<String>,

    /// Per-query upstream timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_overrides = CliOverrides {
        listen: cli.listen,
        upstream_servers: (!cli.upstreams.is_empty()).then_some(cli.upstreams),
        timeout_ms: cli.timeout_ms,
        log_level: cli.log_level,
    };

    let config = bootstrap::load_config(cli.config.as_deref(), cli_overrides)?;

    bootstrap::init_logging(&config);

    info!("Starting dnsfilter v{}", env!("CARGO_PKG_VERSION"));

    let services = di::DnsServices::new(&config).await?;
    if services.registry.is_empty() {
        anyhow::bail!("no usable upstream servers configured");
    }

    let maintenance = services.start_pool_maintenance(config.upstream.pool_idle_timeout());

    let listen = config.server.listen.clone();
    let answer_buffer_size = config.server.answer_buffer_size;

    tokio::select! {
        result = server::start_dns_server(&listen, services.registry.clone(), answer_buffer_size) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    maintenance.abort();
    services.pool.clear();

    info!("Server shutdown complete");
    Ok(())
}

use dnsfilter_domain::Config;
use dnsfilter_infrastructure::dns::{ConnectionPool, DnsServerFactory, UpstreamRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct DnsServices {
    pub pool: Arc<ConnectionPool>,
    pub registry: Arc<UpstreamRegistry>,
}

impl DnsServices {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        info!(
            upstreams = config.upstream.servers.len(),
            timeout_ms = config.upstream.timeout_ms,
            "Initializing upstream servers"
        );

        let pool = Arc::new(
            ConnectionPool::new(config.upstream.pool_idle_timeout())
                .with_max_idle_per_host(config.upstream.max_idle_per_host),
        );
        let factory = DnsServerFactory::new(pool.clone());

        let registry = UpstreamRegistry::from_specs(
            &factory,
            &config.upstream.servers,
            config.upstream.timeout(),
        )
        .await;

        for server in registry.servers() {
            info!(server = %server, "Upstream ready");
        }

        Ok(Self {
            pool,
            registry: Arc::new(registry),
        })
    }

    /// Periodically drops idle pooled connections past their idle timeout.
    pub fn start_pool_maintenance(&self, idle_timeout: Duration) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let period = idle_timeout.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                interval.tick().await;
                let purged = pool.purge_expired();
                let stats = pool.stats();
                debug!(
                    purged,
                    idle = stats.total_idle,
                    created = stats.total_created,
                    reused = stats.total_reused,
                    "Connection pool maintenance"
                );
            }
        })
    }
}

use cache_cluster::cache::Cache;
use cache_cluster::config::{NodeConfig, ServerType};
use cache_cluster::membership::GossipMembership;
use cache_cluster::routing::{MembershipProvider, Router, StaticMembership};
use cache_cluster::services::{CacheService, bind_tcp, serve_http};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match NodeConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting {} node on {}", config.server_type, config.address);

    // 1. Cache engine, restored from the last snapshot if there is one:
    let cache = Arc::new(Cache::open(config.cache_options())?);
    let status = cache.status();
    tracing::info!(
        "Cache ready with {} segments and {} entries",
        cache.segment_count(),
        status.count
    );
    cache.clone().spawn_gc();
    cache.clone().spawn_dump();

    // 2. Membership:
    let membership: Arc<dyn MembershipProvider> = match config.gossip_address {
        Some(gossip_addr) => {
            let seeds = config.gossip_seeds()?;
            if seeds.is_empty() {
                tracing::info!("Starting as seed node (founder)");
            } else {
                tracing::info!("Gossip seeds: {:?}", seeds);
            }
            let gossip = GossipMembership::new(config.address.clone(), gossip_addr, seeds).await?;
            gossip.clone().start();
            gossip
        }
        None => {
            let members = config.static_members();
            tracing::info!("Static membership: {:?}", members);
            Arc::new(StaticMembership::new(members))
        }
    };

    // 3. Routing ring, rebuilt periodically from membership:
    let router = Router::new(config.address.clone(), config.virtual_replicas, membership);
    router.clone().spawn_refresh(config.ring_refresh_interval());

    // 4. Request surface:
    let service = CacheService::new(cache.clone(), router, config.freeze_poll());
    tracing::info!("Press Ctrl+C to shutdown");

    match config.server_type {
        ServerType::Tcp => {
            let server = bind_tcp(config.address.as_str(), service).await?;
            server
                .serve_with_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
        ServerType::Http => {
            let listener = tokio::net::TcpListener::bind(config.address.as_str()).await?;
            tokio::select! {
                result = serve_http(listener, service) => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("HTTP server shutting down"),
            }
        }
    }

    // 5. Final snapshot so a restart resumes from the latest state:
    let final_dump = tokio::task::spawn_blocking(move || cache.dump()).await?;
    if let Err(e) = final_dump {
        tracing::warn!("Final snapshot failed: {}", e);
    }

    Ok(())
}

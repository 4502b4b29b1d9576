//! Run several leader election candidates against one in-memory lease
//! store.
//!
//! Exactly one candidate holds the lease and does its "work" at any moment;
//! the others stand by and log the leader they observe. Ctrl-c cancels the
//! run token: with `--release-on-cancel` (the default) the holder steps
//! down by abandoning the lease, otherwise the lease simply expires.
//!
//! ```text
//! cargo run -p example-lease-mem -- --candidates 3 --lease-duration 15
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use memlock::MemBackend;
use memlock::MemLock;
use openlease::CancellationToken;
use openlease::HealthAdaptor;
use openlease::LeaderCallbacks;
use openlease::LeaderElectionConfig;

#[derive(Parser)]
#[clap(author, version, about)]
struct Opt {
    /// Number of in-process candidates.
    #[clap(long, default_value = "3")]
    candidates: usize,

    /// Lease duration in seconds.
    #[clap(long, default_value = "15")]
    lease_duration: u64,

    /// Renew deadline in seconds.
    #[clap(long, default_value = "10")]
    renew_deadline: u64,

    /// Retry period in seconds.
    #[clap(long, default_value = "2")]
    retry_period: u64,

    /// Slack beyond the lease expiry before a health check fails, in
    /// seconds.
    #[clap(long, default_value = "20")]
    health_tolerance: u64,

    /// Release the lease on shutdown instead of letting it expire.
    #[clap(long,
           default_value_t = true,
           action = clap::ArgAction::Set,
           num_args = 0..=1,
           default_missing_value = "true"
    )]
    release_on_cancel: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let opt = Opt::parse();

    let backend = MemBackend::new("example-lease");
    backend.set_expire_abandoned(true);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received termination, signalling shutdown");
            shutdown.cancel();
        }
    });

    let mut candidates = Vec::new();
    for i in 0..opt.candidates {
        let identity = format!("candidate-{}", i);
        let lock = Arc::new(MemLock::new(backend.clone(), &identity));
        let watch_dog = Arc::new(HealthAdaptor::new(Duration::from_secs(opt.health_tolerance)));

        let callbacks = LeaderCallbacks::new(
            {
                let identity = identity.clone();
                move |token: CancellationToken| {
                    let identity = identity.clone();
                    async move {
                        let mut ticks = 0u64;
                        loop {
                            tokio::select! {
                                _ = token.cancelled() => {
                                    tracing::info!("{}: leader work cancelled", identity);
                                    return;
                                }
                                _ = tokio::time::sleep(Duration::from_secs(3)) => {
                                    ticks += 1;
                                    tracing::info!("{}: doing protected work, tick {}", identity, ticks);
                                }
                            }
                        }
                    }
                }
            },
            {
                let identity = identity.clone();
                move || tracing::info!("{}: stopped leading", identity)
            },
        )
        .with_on_new_leader({
            let identity = identity.clone();
            move |leader: &str| {
                if leader != identity {
                    tracing::info!("{}: observed new leader {}", identity, leader);
                }
            }
        });

        let config = LeaderElectionConfig {
            lock,
            lease_duration: Duration::from_secs(opt.lease_duration),
            renew_deadline: Duration::from_secs(opt.renew_deadline),
            retry_period: Duration::from_secs(opt.retry_period),
            callbacks,
            watch_dog: Some(watch_dog.clone()),
            release_on_cancel: opt.release_on_cancel,
            name: "example".to_string(),
        };

        // Poll the health adaptor the way a liveness endpoint would.
        tokio::spawn({
            let watch_dog = watch_dog.clone();
            let identity = identity.clone();
            let shutdown = shutdown.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    }
                    if let Err(err) = watch_dog.check() {
                        tracing::warn!("{}: health check failed: {}", identity, err);
                    }
                }
            }
        });

        candidates.push(tokio::spawn(openlease::run_or_die(config, shutdown.clone())));
    }

    for candidate in candidates {
        let _ = candidate.await;
    }
    tracing::info!("all candidates stopped");

    Ok(())
}

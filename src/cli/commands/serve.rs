//! `serve`: run the configured ingestion adapters and apply their events to
//! the mirror sinks until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::{info, warn};

use crate::domain::models::{Config, EventKind};
use crate::domain::ports::{IssueProvider, TicketTracker, WorkspaceMirror};
use crate::infrastructure::github::GitHubClient;
use crate::infrastructure::mirror::{InMemoryMirror, LoggingTracker};
use crate::infrastructure::webhook::WebhookServer;
use crate::services::dispatcher::{register, EventSource, SubscriptionRegistry};
use crate::services::{KeyedSemaphore, Listener, MirrorSync, Searcher};

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Do not start the webhook listener even if realtime repositories are configured
    #[arg(long)]
    pub no_listener: bool,

    /// Do not start the scheduled searcher even if polling repositories are configured
    #[arg(long)]
    pub no_searcher: bool,
}

pub async fn execute(args: ServeArgs, config: Config) -> Result<()> {
    let provider: Arc<dyn IssueProvider> = Arc::new(GitHubClient::new(&config.github)?);
    let registry = SubscriptionRegistry::new();

    let listener = if !args.no_listener && !config.sync.realtime_repos.is_empty() {
        Some(
            Listener::new(
                config.sync.listener_config(),
                Arc::clone(&provider),
                Arc::clone(&registry),
            )
            .context("Invalid listener configuration")?,
        )
    } else {
        None
    };

    let searcher = if !args.no_searcher && !config.sync.polling_repos.is_empty() {
        Some(
            Searcher::new(
                config.sync.searcher_config(),
                Arc::clone(&provider),
                Arc::clone(&registry),
            )
            .context("Invalid searcher configuration")?,
        )
    } else {
        None
    };

    let mut sources: Vec<Arc<dyn EventSource>> = Vec::new();
    if let Some(listener) = &listener {
        sources.push(Arc::new(listener.clone()));
    }
    if let Some(searcher) = &searcher {
        sources.push(Arc::new(searcher.clone()));
    }
    if sources.is_empty() {
        bail!("No adapter configured: set sync.realtime_repos and/or sync.polling_repos");
    }

    let semaphore = KeyedSemaphore::<EventKind>::new(config.sync.semaphore_limit)
        .context("Invalid semaphore configuration")?;
    let sync = Arc::new(MirrorSync::new(
        Arc::new(InMemoryMirror::default()) as Arc<dyn WorkspaceMirror>,
        Arc::new(LoggingTracker::default()) as Arc<dyn TicketTracker>,
        semaphore,
    ));

    // Subscribing starts the adapters.
    let subscriber = register(sources);
    let subscriptions = sync.attach(&subscriber);
    info!(
        adapters = subscriber.sources(),
        subscriptions = subscriptions.len(),
        "issue mirror running"
    );

    match listener {
        Some(listener) => {
            let addr: SocketAddr = format!(
                "{}:{}",
                config.github.webhook_host, config.github.webhook_port
            )
            .parse()
            .context("Invalid webhook address")?;
            let secret = Some(config.github.webhook_secret.clone());
            if config.github.webhook_secret.is_empty() {
                warn!("webhook secret not set, signatures are not verified");
            }

            WebhookServer::new(listener, secret)
                .serve_with_shutdown(addr, shutdown_signal())
                .await?;
        }
        None => shutdown_signal().await,
    }

    if let Some(searcher) = &searcher {
        searcher.stop();
    }
    let removed = subscriptions.unsubscribe();
    info!(removed, "shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::path::Path;
use std::sync::Arc;
use tenant_network_controller::{
    api::tenant_client::TenantClient,
    config::{Args, ControllerConfig},
    controller::{NetworkController, QueueingHandler},
    errors::ControllerError,
    informer::Informer,
    workqueue::WorkQueue,
};
use tokio::sync::watch;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    // Parse before starting the runtime so --help and bad flags exit fast
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("network-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // Format: timestamp file:line LEVEL message
    //
    // Respects RUST_LOG (default: info) and RUST_LOG_FORMAT (text or json)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    let config = ControllerConfig::from_args(args).context("invalid configuration")?;
    info!(
        cluster_domain = %config.dns.cluster_domain,
        apiserver = %config.dns.apiserver_host,
        apiserver_port = config.dns.apiserver_port,
        workers = config.workers,
        "Starting tenant network controller"
    );

    debug!("Initializing Kubernetes client");
    let client = build_client(config.kubeconfig.as_deref()).await?;
    let api = Arc::new(TenantClient::new(client));
    debug!("Kubernetes client initialized successfully");

    let queue = WorkQueue::new();
    let informer = Informer::new(
        Arc::clone(&api),
        Arc::new(QueueingHandler::new(queue.clone())),
    );
    let controller = Arc::new(NetworkController::new(
        api,
        config.dns,
        informer.store(),
        informer.sync_signal(),
        queue,
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        let _ = stop_tx.send(true);
    });

    let informer_task = tokio::spawn(informer.run(stop_rx.clone()));
    let result = controller.run(config.workers, stop_rx).await;

    if let Err(e) = informer_task.await {
        error!(error = %e, "Network informer ended abnormally");
    }

    match result {
        Ok(()) => {
            info!("Tenant network controller stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Tenant network controller failed");
            Err(e.into())
        }
    }
}

/// Client from an explicit kubeconfig, or the in-cluster/default config.
async fn build_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let Some(path) = kubeconfig else {
        return Ok(Client::try_default().await.map_err(ControllerError::Client)?);
    };

    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .with_context(|| format!("failed to load kubeconfig {}", path.display()))?;
    Ok(Client::try_from(config).map_err(ControllerError::Client)?)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/**
 * SENSORHUB KERNEL - Point d'entrée principal du serveur
 *
 * RÔLE : Bootstrap : config, sink de persistance, lien MQTT, orchestrateur,
 * API HTTP + viewers WebSocket. Arrêt propre sur Ctrl-C via un jeton d'annulation.
 *
 * ARCHITECTURE : callbacks broker → file d'événements typés → boucle unique →
 * fan-out vers les viewers.
 */

use anyhow::Context;
use sensorhub_kernel::config::load_config;
use sensorhub_kernel::http::{build_router, AppState};
use sensorhub_kernel::mqtt::MqttLink;
use sensorhub_kernel::ports::JsonlSink;
use sensorhub_kernel::{KernelError, Orchestrator};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = load_config().await.map_err(KernelError::from)?;
    tracing::info!("{} channels configured: {:?}", cfg.channels.len(), cfg.channel_ids());

    // sink de persistance
    let sink = Arc::new(JsonlSink::open(&cfg.data_dir).await.map_err(KernelError::from)?);

    // lien MQTT : abonnements initiaux, échec = fatal
    let link = MqttLink::connect(&cfg).await.map_err(KernelError::from)?;
    let publisher = Arc::new(link.publisher());

    let kernel = Arc::new(Orchestrator::new(&cfg, publisher, sink));
    let cancel = CancellationToken::new();
    let (inbound_tx, inbound_rx) = mpsc::channel(256);

    let mqtt_task = tokio::spawn(link.run(inbound_tx, cancel.clone()));
    let loop_task = {
        let kernel = kernel.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { kernel.run(inbound_rx, cancel).await })
    };

    // HTTP
    let app = build_router(AppState {
        kernel: kernel.clone(),
        viewer_queue: cfg.viewer_queue,
    });
    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .map_err(|source| KernelError::Bind { addr: cfg.http.bind.clone(), source })?;
    tracing::info!("listening on http://{}", cfg.http.bind);

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        shutdown.cancel();
    });

    let server_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await
        .context("http server failed")?;

    cancel.cancel();
    let (mqtt_res, _) = tokio::join!(mqtt_task, loop_task);
    // un refus d'abonnement au démarrage annule le jeton et remonte ici
    mqtt_res.context("mqtt task panicked")??;
    tracing::info!("kernel stopped");
    Ok(())
}

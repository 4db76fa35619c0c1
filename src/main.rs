// Módulos de la aplicación
mod api;
mod app_state;
mod config;
mod dashboard;
mod dataset;
mod format;
mod models;
mod panel;
mod transport;
mod validation;

use crate::app_state::AppState;
use anyhow::Context;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Cliente del servicio de ML (sin estado global: se pasa al panel)
    let client = transport::ApiClient::new(&cfg).context("Error creando el cliente HTTP")?;
    info!(
        "Servicio de ML en {} (timeout {:?})",
        client.base_url(),
        cfg.request_timeout
    );

    // 4. Crear estado compartido de la aplicación
    let app_state = AppState::new(cfg, client);

    // Primera carga de métricas; si falla, el panel arranca en `Error` y vuelve solo a `Idle`.
    if let Err(e) = app_state.dashboard.fetch_metrics().await {
        warn!("No se pudieron cargar las métricas iniciales: {}", e);
    }

    // 5. Configurar el router de la API
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 6. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Panel escuchando en http://{}", server_addr);

    // Apagado ordenado con Ctrl-C.
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await;

    if let Err(e) = served {
        error!("El servidor terminó con error: {}", e);
        return Err(e.into());
    }

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}

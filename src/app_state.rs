use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{config::AppConfig, dashboard::Dashboard, transport::ApiClient};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub dashboard: Arc<Dashboard<ApiClient>>,
    /// Sólo una acción con `Loading` a la vez; las demás reciben 409.
    pub action_gate: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: AppConfig, client: ApiClient) -> Self {
        let dashboard = Dashboard::new(client, &config);
        Self {
            config,
            dashboard: Arc::new(dashboard),
            action_gate: Arc::new(Mutex::new(())),
        }
    }
}

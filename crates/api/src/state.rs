use nimbus_core::admins::AdminList;
use nimbus_db::SharedStore;
use nimbus_weather::ForecastService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub forecasts: Arc<ForecastService>,
    pub admins: AdminList,
    pub nimbus_env: String,
}

use std::sync::Arc;

use transix_engine::ReservationService;
use transix_store::RedisClient;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReservationService>,
    pub redis: Arc<RedisClient>,
    pub rate_limit_per_minute: i64,
}

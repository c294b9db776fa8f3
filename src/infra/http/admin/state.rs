use std::sync::Arc;

use crate::application::admin::AdminService;
use crate::application::repos::HealthRepo;
use crate::cache::CacheState;

#[derive(Clone)]
pub struct AdminState {
    pub admin: Arc<AdminService>,
    pub health: Arc<dyn HealthRepo>,
    pub cache: Option<CacheState>,
}

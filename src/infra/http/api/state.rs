use std::sync::Arc;

use crate::application::auth::AuthVerifier;
use crate::application::render::RenderPipeline;
use crate::application::repos::HealthRepo;
use crate::application::templates::TemplateAdminService;

use super::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<RenderPipeline>,
    pub templates: Arc<TemplateAdminService>,
    pub auth: Arc<dyn AuthVerifier>,
    pub health: Arc<dyn HealthRepo>,
    pub rate_limiter: Arc<ApiRateLimiter>,
}

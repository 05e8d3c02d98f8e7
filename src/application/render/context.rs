use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;

use super::types::{RenderRequest, RenderStage, RenderState};
use crate::application::auth::Principal;
use crate::application::engine::MappedPayload;
use crate::domain::injection::{InjectedValue, InjectionKey};
use crate::domain::templates::TemplateDefinition;

/// Per-request state. Lives only as long as the render future.
pub(crate) struct RenderContext<'r> {
    pub request: &'r RenderRequest,
    pub rendered_at: OffsetDateTime,
    pub principal: Option<Principal>,
    pub mapped: MappedPayload,
    pub template: Option<Arc<TemplateDefinition>>,
    pub values: HashMap<InjectionKey, InjectedValue>,
    state: RenderState,
}

impl<'r> RenderContext<'r> {
    pub fn new(request: &'r RenderRequest) -> Self {
        Self {
            request,
            rendered_at: OffsetDateTime::now_utc(),
            principal: None,
            mapped: MappedPayload::default(),
            template: None,
            values: HashMap::new(),
            state: RenderState::Received,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    /// The stage currently running, used to attribute cancellation.
    pub fn current_stage(&self) -> RenderStage {
        self.state.pending_stage().unwrap_or(RenderStage::Render)
    }

    pub fn authenticated(&mut self, principal: Principal) {
        self.principal = Some(principal);
        self.advance(RenderState::Authenticated);
    }

    pub fn mapped(&mut self, mapped: MappedPayload) {
        self.mapped = mapped;
        self.advance(RenderState::Mapped);
    }

    pub fn resolved(&mut self, template: Arc<TemplateDefinition>) {
        self.template = Some(template);
        self.advance(RenderState::Resolved);
    }

    pub fn injected(&mut self, values: HashMap<InjectionKey, InjectedValue>) {
        self.values = values;
        self.advance(RenderState::Injected);
    }

    pub fn rendered(&mut self) {
        self.advance(RenderState::Rendered);
    }

    pub fn completed(&mut self) {
        self.advance(RenderState::Completed);
    }

    pub fn failed(&mut self, stage: RenderStage) {
        if !self.state.is_terminal() {
            self.advance(RenderState::Failed(stage));
        }
    }

    fn advance(&mut self, next: RenderState) {
        debug!(
            target = "stampa::render",
            from = ?self.state,
            to = ?next,
            document_type = %self.request.document_type_code,
            "Render state transition"
        );
        self.state = next;
    }
}

//! The render pipeline.
//!
//! A request moves through `auth → mapping → resolution → injection → render`.
//! Each stage either advances the request's [`RenderState`] or ends it with a
//! [`RenderFailure`] naming the stage. The document renderer itself is pure:
//! it receives a template and its values and returns bytes.

mod context;
mod pipeline;
mod service;
mod types;

pub use pipeline::{RenderPipeline, RenderPipelineConfig};
pub use service::{ComrakDocumentRenderer, HTML_CONTENT_TYPE};
pub use types::{
    CancelReason, DocumentRenderer, FailureClass, RenderCause, RenderError, RenderFailure,
    RenderRequest, RenderResult, RenderStage, RenderState, RenderedDocument,
};

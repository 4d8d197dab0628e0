use std::sync::Arc;

use crate::archive::TranscriptArchive;
use crate::documents::{DocumentConverter, TextConverter};
use crate::interview::engine::{Clock, ReasoningService, SystemClock};
use crate::interview::evaluator::Evaluator;
use crate::interview::registry::InterviewRegistry;
use crate::llm_client::LlmClient;
use crate::realtime::channel::RealtimeNegotiator;
use crate::store::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    /// Raw client for speech and extraction endpoints.
    pub llm: LlmClient,
    pub reasoning: Arc<dyn ReasoningService>,
    pub evaluator: Arc<dyn Evaluator>,
    pub negotiator: Arc<dyn RealtimeNegotiator>,
    pub clock: Arc<dyn Clock>,
    /// Live interviews, one async mutex each.
    pub interviews: Arc<InterviewRegistry>,
    pub converter: Arc<dyn DocumentConverter>,
    /// `None` when S3 is not configured.
    pub archive: Option<TranscriptArchive>,
}

impl AppState {
    /// Wires every AI-facing seam to the same client.
    pub fn new(store: SessionStore, llm: LlmClient, archive: Option<TranscriptArchive>) -> Self {
        let shared = Arc::new(llm.clone());
        Self {
            store: Arc::new(store),
            reasoning: shared.clone(),
            evaluator: shared.clone(),
            negotiator: shared,
            llm,
            clock: Arc::new(SystemClock),
            interviews: Arc::new(InterviewRegistry::new()),
            converter: Arc::new(TextConverter),
            archive,
        }
    }
}

use tokio::sync::watch;
use tracing::{debug, warn};

use studio_types::api::GenerationRecord;

use crate::api::{Session, StudioClient};
use crate::controller::{GenerationController, GenerationRequest, GenerationState};
use crate::error::ClientError;
use crate::retry::RetryPolicy;

/// History entries the studio view keeps.
pub const HISTORY_LIMIT: u32 = 5;

/// Studio screen model: the generation controller plus the recent-history
/// list, refreshed after each successful generation.
pub struct Studio {
    controller: GenerationController<StudioClient>,
    history: watch::Sender<Vec<GenerationRecord>>,
    history_limit: u32,
}

impl Studio {
    pub fn new(client: StudioClient) -> Self {
        Self::with_policy(client, RetryPolicy::default())
    }

    pub fn with_policy(client: StudioClient, policy: RetryPolicy) -> Self {
        let (history, _) = watch::channel(Vec::new());
        Self {
            controller: GenerationController::with_policy(client, policy),
            history,
            history_limit: HISTORY_LIMIT,
        }
    }

    pub fn client(&self) -> &StudioClient {
        self.controller.transport()
    }

    pub fn controller(&self) -> &GenerationController<StudioClient> {
        &self.controller
    }

    pub fn state(&self) -> watch::Receiver<GenerationState> {
        self.controller.subscribe()
    }

    pub fn history(&self) -> watch::Receiver<Vec<GenerationRecord>> {
        self.history.subscribe()
    }

    pub fn recent(&self) -> Vec<GenerationRecord> {
        self.history.borrow().clone()
    }

    /// Generate, then reload history on success. A failed reload keeps
    /// the previous list.
    pub async fn generate(
        &self,
        session: &Session,
        request: GenerationRequest,
    ) -> Option<GenerationRecord> {
        let record = self.controller.generate(session, request).await?;
        if let Err(e) = self.refresh_history(session).await {
            warn!("History refresh after generation {} failed: {}", record.id, e);
        }
        Some(record)
    }

    pub fn abort(&self) {
        self.controller.abort();
    }

    pub async fn refresh_history(&self, session: &Session) -> Result<(), ClientError> {
        let items = self
            .client()
            .recent_generations(session, self.history_limit)
            .await?;
        debug!("Loaded {} history entries", items.len());
        self.history.send_replace(items);
        Ok(())
    }
}

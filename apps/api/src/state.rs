use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::share::intercept::Interceptor;
use crate::share::receivers::ReceiverHub;
use crate::share::store::PendingShareStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Pending-share store. Memory by default, Redis when REDIS_URL is set.
    pub store: Arc<dyn PendingShareStore>,
    /// Open receiver sessions that can take a share without the store.
    pub receivers: ReceiverHub,
    pub llm: LlmClient,
    pub config: Config,
}

impl AppState {
    /// An interceptor whose launch URLs point at `app_root`.
    pub fn interceptor(&self, app_root: String) -> Interceptor {
        Interceptor::new(
            self.store.clone(),
            self.receivers.clone(),
            self.config.max_attachment_bytes,
            app_root,
        )
    }
}

#[cfg(test)]
impl AppState {
    pub fn for_tests() -> Self {
        Self::with_store(Arc::new(crate::share::store::MemoryShareStore::new()))
    }

    pub fn with_store(store: Arc<dyn PendingShareStore>) -> Self {
        let config = Config::default();
        let llm = LlmClient::new(config.llm_api_url.clone(), None).expect("test LLM client");
        Self {
            store,
            receivers: ReceiverHub::new(),
            llm,
            config,
        }
    }
}

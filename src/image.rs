use async_trait::async_trait;

use crate::Result;
use crate::types::{GenerationRequest, GenerationResult, ProviderId};

/// One upstream image provider, normalized to [`GenerationResult`].
///
/// Implementations hold only static configuration and a cloned HTTP client
/// handle, so a single instance serves concurrent requests.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn provider(&self) -> ProviderId;

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult>;
}

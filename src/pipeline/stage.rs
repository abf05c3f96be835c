//! The stage capability.

use crate::cluster::ClusterRegistryHandle;
use crate::config::PipelineConfig;
use crate::db::DbHandle;
use crate::error::GroundswellError;
use crate::llm::LanguageModel;
use crate::metrics::Metrics;
use crate::model::RawPost;
use crate::pipeline::state::{EnrichmentState, StageResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared collaborators every stage may reach.
#[derive(Clone)]
pub struct StageCtx {
    pub db: DbHandle,
    pub llm: Arc<dyn LanguageModel>,
    pub registry: ClusterRegistryHandle,
    pub metrics: Arc<Metrics>,
    pub cfg: Arc<PipelineConfig>,
}

/// One enrichment step.
///
/// `Ok(StageResult { success: false, .. })` is a recorded stage failure the
/// pipeline carries on from; `Err` is reserved for store-write failures,
/// which fail the whole pipeline and trigger the queue's retry policy.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        ctx: &StageCtx,
        raw: &RawPost,
        state: &mut EnrichmentState,
    ) -> Result<StageResult, GroundswellError>;
}

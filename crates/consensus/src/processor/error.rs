// Path: crates/consensus/src/processor/error.rs
//! A processor that fails on purpose at configured `(height, round)` points.

use async_trait::async_trait;
use isaac_api::consensus::ProposalProcessor;
use isaac_types::app::{Block, Hash, Height, Manifest, Round, Voteproof};
use isaac_types::config::{ErrorPoint, ErrorPointKind, ErrorPoints};
use isaac_types::error::{BlockError, ProcessorError};
use std::sync::Arc;

/// Wraps a processor and injects the configured failures.
///
/// On prepare, `error` fails and `wrong-block-hash` reports a manifest with
/// another hash while the wrapped processor keeps the real block. On save,
/// `error` fails and `wrong-block-hash` drops the pending block and reports
/// a hash mismatch.
pub struct ErrorProposalProcessor {
    inner: Arc<dyn ProposalProcessor>,
    points: ErrorPoints,
}

fn find(points: &[ErrorPoint], height: Height, round: Round) -> Option<ErrorPointKind> {
    points
        .iter()
        .find(|p| p.height == height && p.round == round)
        .map(|p| p.kind)
}

impl ErrorProposalProcessor {
    pub fn new(inner: Arc<dyn ProposalProcessor>, points: ErrorPoints) -> Self {
        Self { inner, points }
    }
}

#[async_trait]
impl ProposalProcessor for ErrorProposalProcessor {
    async fn process_init(
        &self,
        proposal: &Hash,
        init: &Voteproof,
    ) -> Result<Manifest, ProcessorError> {
        let (height, round) = (init.height(), init.round());
        match find(&self.points.when_prepare, height, round) {
            None => self.inner.process_init(proposal, init).await,
            Some(ErrorPointKind::Error) => {
                tracing::warn!(target: "processor", height = height.0, round = round.0, "injected prepare error");
                Err(ProcessorError::Injected {
                    height,
                    round,
                    point: "prepare",
                })
            }
            Some(ErrorPointKind::WrongBlockHash) => {
                let m = self.inner.process_init(proposal, init).await?;
                tracing::warn!(target: "processor", height = height.0, round = round.0, "injected wrong block hash on prepare");
                Ok(Manifest::new(
                    m.height(),
                    m.round(),
                    m.proposal().clone(),
                    m.previous_block().clone(),
                    m.operations_root().cloned(),
                    Some(Hash::sha256(m.hash().as_bytes())),
                ))
            }
        }
    }

    async fn process_accept(
        &self,
        proposal: &Hash,
        accept: &Voteproof,
    ) -> Result<Block, ProcessorError> {
        let (height, round) = (accept.height(), accept.round());
        match find(&self.points.when_save, height, round) {
            None => self.inner.process_accept(proposal, accept).await,
            Some(ErrorPointKind::Error) => {
                tracing::warn!(target: "processor", height = height.0, round = round.0, "injected save error");
                Err(ProcessorError::Injected {
                    height,
                    round,
                    point: "save",
                })
            }
            Some(ErrorPointKind::WrongBlockHash) => {
                self.inner.cancel().await;
                let got = accept
                    .majority()
                    .and_then(|f| f.new_block())
                    .cloned()
                    .unwrap_or_else(|| Hash::sha256(proposal.as_bytes()));
                tracing::warn!(target: "processor", height = height.0, round = round.0, "injected wrong block hash on save");
                Err(BlockError::BlockHashMismatch {
                    expected: Hash::sha256(got.as_bytes()),
                    got,
                }
                .into())
            }
        }
    }

    async fn cancel(&self) {
        self.inner.cancel().await
    }
}

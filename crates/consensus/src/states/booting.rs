// Path: crates/consensus/src/states/booting.rs
use super::{Context, Outcome, StateHandler, Switch};
use crate::processor::{genesis_previous_block, GenesisGenerator};
use async_trait::async_trait;
use isaac_api::consensus::StateKind;
use isaac_types::app::{Height, Manifest, Round};
use isaac_types::error::{BlockError, IsaacError};
use std::sync::Arc;

/// Checks the local chain, or creates it, before the node takes part.
pub(crate) struct Booting {
    ctx: Arc<Context>,
}

impl Booting {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Recomputes every manifest hash and link up to `head`, then validates
    /// the head block itself.
    async fn check_chain(&self, head: &Manifest) -> Result<(), IsaacError> {
        let network_id = self.ctx.local.network_id();
        let mut previous = genesis_previous_block(network_id);
        for h in Height::GENESIS.0..=head.height().0 {
            let height = Height(h);
            let manifest = self
                .ctx
                .database
                .manifest_by_height(height)
                .await?
                .ok_or_else(|| IsaacError::Invariant(format!("manifest {height} missing")))?;
            manifest.is_valid()?;
            if *manifest.previous_block() != previous {
                return Err(BlockError::PreviousBlockMismatch {
                    height,
                    expected: previous,
                    got: manifest.previous_block().clone(),
                }
                .into());
            }
            previous = manifest.hash().clone();
        }

        let block = self
            .ctx
            .database
            .block_by_height(head.height())
            .await?
            .ok_or_else(|| IsaacError::Invariant(format!("block {} missing", head.height())))?;
        if block.hash() != head.hash() {
            return Err(BlockError::BlockHashMismatch {
                expected: head.hash().clone(),
                got: block.hash().clone(),
            }
            .into());
        }
        block.is_valid(network_id)?;
        Ok(())
    }

    async fn boot(&self) -> Result<Switch, IsaacError> {
        let Some(head) = self.ctx.database.last_manifest().await? else {
            let removed = self.ctx.blockdata.remove_above(Height::NIL).await?;
            if !removed.is_empty() {
                tracing::warn!(target: "consensus", count = removed.len(), "block data without database records removed");
            }
            let local = self.ctx.local.address();
            if !self
                .ctx
                .suffrage
                .is_proposer(Height::GENESIS, Round::ZERO, local)
            {
                tracing::info!(target: "consensus", "empty database, waiting for the genesis block");
                return Ok(Switch::Syncing {
                    target: Height::GENESIS,
                    voteproof: None,
                });
            }
            GenesisGenerator::new(
                self.ctx.local.clone(),
                self.ctx.database.clone(),
                self.ctx.blockdata.clone(),
                &self.ctx.genesis,
            )?
            .generate()
            .await?;
            return Ok(Switch::Joining(None));
        };

        self.check_chain(&head).await?;
        let removed = self.ctx.blockdata.remove_above(head.height()).await?;
        for height in &removed {
            tracing::warn!(
                target: "consensus",
                height = height.0,
                head = head.height().0,
                "uncommitted block data removed"
            );
        }
        tracing::info!(
            target: "consensus",
            height = head.height().0,
            block = %head.hash(),
            "local chain checked"
        );
        Ok(Switch::Joining(None))
    }
}

#[async_trait]
impl StateHandler for Booting {
    fn kind(&self) -> StateKind {
        StateKind::Booting
    }

    async fn enter(&mut self) -> Outcome {
        match self.boot().await {
            Ok(switch) => Ok(Some(switch)),
            Err(e) => Ok(Some(Switch::Broken(format!("boot failed: {e}")))),
        }
    }
}

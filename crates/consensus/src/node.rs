// Path: crates/consensus/src/node.rs
//! The node runtime.
//!
//! [`Node`] wires the database, block data, policy, suffrage, ballotbox,
//! nodepool and proposal processor into one state machine task. It is also
//! the serving side of every peer [`Channel`](isaac_networking::Channel):
//! incoming seals are checked and fed to the ballotbox or stored, and reads
//! are answered from the database in every state, BROKEN included.

use crate::ballotbox::Ballotbox;
use crate::checker::BallotChecker;
use crate::local::{LocalNode, LocalPolicy};
use crate::metrics::error_metrics;
use crate::processor::{DefaultProposalProcessor, ErrorProposalProcessor};
use crate::states::{Context, Event, StateMachine, EVENT_QUEUE_SIZE};
use crate::suffrage;
use async_trait::async_trait;
use isaac_api::blockdata::BlockData;
use isaac_api::consensus::{ProposalProcessor, StateKind};
use isaac_api::storage::Database;
use isaac_networking::{ChannelHandler, NodeInfo, Nodepool};
use isaac_types::app::{
    Address, Ballot, Block, Hash, Height, Manifest, Operation, OperationFact, OperationSeal,
    Round, Seal, Stage, Voteproof,
};
use isaac_types::config::NodeConfig;
use isaac_types::error::{ChannelError, ErrorCode, IsaacError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub struct Node {
    ctx: Arc<Context>,
    checker: BallotChecker,
    state: watch::Receiver<StateKind>,
    stop: watch::Sender<bool>,
    machine: Mutex<Option<StateMachine>>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Highest carried voteproof already handed to the state machine.
    forwarded: Mutex<Option<(Height, Round, Stage)>>,
}

impl Node {
    /// Builds a node from its configuration. Peers listed in the
    /// configuration are known by key; channels to them are attached
    /// through [`Node::nodepool`].
    pub fn new(
        config: &NodeConfig,
        database: Arc<dyn Database>,
        blockdata: Arc<dyn BlockData>,
    ) -> Result<Arc<Self>, IsaacError> {
        config.validate()?;
        let local = Arc::new(LocalNode::new(
            config.address.clone(),
            config.privatekey()?,
            config.network_id.as_bytes(),
        ));
        let policy = Arc::new(LocalPolicy::new(config.policy.clone()));
        let suffrage = suffrage::from_config(
            &config.suffrage,
            config.suffrage_nodes(),
            config.policy.number_of_acting_suffrage_nodes,
        )?;

        let nodepool = Arc::new(Nodepool::new(local.address().clone(), local.publickey()));
        for entry in &config.nodes {
            nodepool.add(entry.address.clone(), entry.publickey.clone(), None);
        }

        let ballotbox = Arc::new(Ballotbox::new(suffrage.clone(), policy.clone()));
        let default: Arc<dyn ProposalProcessor> = Arc::new(DefaultProposalProcessor::new(
            local.clone(),
            database.clone(),
            blockdata.clone(),
            suffrage.clone(),
            nodepool.clone(),
            policy.clone(),
        ));
        let processor: Arc<dyn ProposalProcessor> = if config.error_points.is_empty() {
            default
        } else {
            tracing::warn!(target: "node", "error points configured");
            Arc::new(ErrorProposalProcessor::new(
                default,
                config.error_points.clone(),
            ))
        };

        let checker = BallotChecker::new(
            local.network_id().to_vec(),
            suffrage.clone(),
            nodepool.clone(),
            policy.clone(),
        );

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let ctx = Arc::new(Context::new(
            local,
            policy,
            suffrage,
            database,
            blockdata,
            nodepool,
            ballotbox,
            processor,
            config.genesis_operations.clone(),
            events_tx,
        ));
        let (state_tx, state_rx) = watch::channel(StateKind::Booting);
        let (stop_tx, stop_rx) = watch::channel(false);
        let machine = StateMachine::new(ctx.clone(), events_rx, state_tx, stop_rx);

        Ok(Arc::new(Self {
            ctx,
            checker,
            state: state_rx,
            stop: stop_tx,
            machine: Mutex::new(Some(machine)),
            task: Mutex::new(None),
            forwarded: Mutex::new(None),
        }))
    }

    pub fn address(&self) -> &Address {
        self.ctx.local.address()
    }

    pub fn nodepool(&self) -> &Arc<Nodepool> {
        &self.ctx.nodepool
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.ctx.database
    }

    pub fn state(&self) -> StateKind {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<StateKind> {
        self.state.clone()
    }

    pub async fn last_manifest(&self) -> Result<Option<Manifest>, IsaacError> {
        Ok(self.ctx.database.last_manifest().await?)
    }

    /// Starts the state machine. A second call does nothing.
    pub fn start(&self) {
        let Some(machine) = self.machine.lock().take() else {
            return;
        };
        tracing::info!(target: "node", address = %self.address(), "node started");
        *self.task.lock() = Some(tokio::spawn(machine.run()));
    }

    /// Stops the state machine and waits for it.
    pub async fn stop(&self) {
        self.stop.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(target: "node", error = %e, "state machine task failed");
            }
        }
        tracing::info!(target: "node", address = %self.address(), "node stopped");
    }

    /// Seals `facts` with the local key, stages them and sends them to
    /// every peer.
    pub async fn submit(&self, facts: Vec<OperationFact>) -> Result<OperationSeal, IsaacError> {
        let local = &self.ctx.local;
        let operations = facts
            .into_iter()
            .map(|fact| Operation::new(fact, local.privatekey(), local.network_id()))
            .collect::<Result<Vec<_>, _>>()?;
        let seal = local.seal(operations)?;
        self.ctx.database.new_seals(&[seal.clone().into()]).await?;
        self.ctx.broadcast(seal.clone().into());
        Ok(seal)
    }

    async fn head_height(&self) -> Result<Height, IsaacError> {
        Ok(self
            .ctx
            .database
            .last_manifest()
            .await?
            .map(|m| m.height())
            .unwrap_or(Height::NIL))
    }

    /// Hands a voteproof carried by a ballot to the state machine when it is
    /// ahead of the local head and newer than anything forwarded before.
    fn forward(&self, voteproof: &Voteproof, head: Height) {
        if voteproof.height() <= head || voteproof.stage() == Stage::Sign {
            return;
        }
        let key = (voteproof.height(), voteproof.round(), voteproof.stage());
        {
            let mut last = self.forwarded.lock();
            if matches!(*last, Some(l) if key <= l) {
                return;
            }
            *last = Some(key);
        }
        self.ctx.post(Event::Voteproof(voteproof.clone()));
    }

    async fn receive_ballot(&self, ballot: Ballot) -> Result<(), IsaacError> {
        if self.state() == StateKind::Broken {
            return Ok(());
        }
        let head = self.head_height().await?;
        self.checker.check(&ballot, head)?;
        if let Some(voteproof) = ballot.voteproof() {
            self.forward(voteproof, head);
        }

        if ballot.stage() == Stage::Proposal {
            let db = &self.ctx.database;
            if db.proposal_by_fact(ballot.fact_hash()).await?.is_some() {
                return Ok(());
            }
            db.new_proposal(&ballot).await?;
            self.ctx.post(Event::Proposal(ballot));
            return Ok(());
        }
        self.ctx.vote(&ballot)
    }

    async fn receive(&self, seal: Seal) -> Result<(), IsaacError> {
        seal.is_valid(self.ctx.local.network_id())?;
        match seal {
            Seal::Operation(seal) => {
                if !self.ctx.database.has_seal(seal.hash()).await? {
                    self.ctx.database.new_seals(&[seal.into()]).await?;
                }
                Ok(())
            }
            Seal::Ballot(ballot) => self.receive_ballot(ballot).await,
        }
    }
}

fn unavailable(e: impl std::fmt::Display) -> ChannelError {
    ChannelError::Connection(format!("storage: {e}"))
}

#[async_trait]
impl ChannelHandler for Node {
    async fn handle_seal(&self, from: &Address, seal: Seal) -> Result<(), ChannelError> {
        let hash = seal.hash().clone();
        if let Err(e) = self.receive(seal).await {
            error_metrics().inc_error(e.kind().as_str(), e.code());
            tracing::warn!(
                target: "node",
                from = %from,
                seal = %hash,
                code = e.code(),
                error = %e,
                "seal dropped"
            );
        }
        Ok(())
    }

    async fn get_seals(&self, hashes: &[Hash]) -> Result<Vec<Seal>, ChannelError> {
        self.ctx.database.seals(hashes).await.map_err(unavailable)
    }

    async fn get_blocks(&self, heights: &[Height]) -> Result<Vec<Block>, ChannelError> {
        let mut blocks = Vec::with_capacity(heights.len());
        for height in heights {
            match self.ctx.database.block_by_height(*height).await {
                Ok(Some(block)) => blocks.push(block),
                Ok(None) => break,
                Err(e) => return Err(unavailable(e)),
            }
        }
        Ok(blocks)
    }

    async fn get_manifests(&self, heights: &[Height]) -> Result<Vec<Manifest>, ChannelError> {
        let mut manifests = Vec::with_capacity(heights.len());
        for height in heights {
            match self.ctx.database.manifest_by_height(*height).await {
                Ok(Some(manifest)) => manifests.push(manifest),
                Ok(None) => break,
                Err(e) => return Err(unavailable(e)),
            }
        }
        Ok(manifests)
    }

    async fn node_info(&self) -> Result<NodeInfo, ChannelError> {
        let last_manifest = self
            .ctx
            .database
            .last_manifest()
            .await
            .map_err(unavailable)?;
        Ok(NodeInfo {
            address: self.address().clone(),
            publickey: self.ctx.local.publickey(),
            network_id: self.ctx.local.network_id().to_vec(),
            state: self.state(),
            last_manifest,
            suffrage: self.ctx.suffrage.nodes().to_vec(),
        })
    }
}

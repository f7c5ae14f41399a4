// Path: crates/types/src/config/policy.rs

//! Consensus parameters shared by every node of a network.

use crate::app::timing::nanos;
use crate::error::StateError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The consensus policy. Durations are serialized as nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Threshold ratio in percent, within `(0, 100]`.
    #[serde(default = "default_threshold_ratio")]
    pub threshold_ratio: f64,
    /// How long CONSENSUS waits for a proposal after an INIT voteproof.
    #[serde(default = "default_timeout_waiting_proposal", with = "nanos")]
    pub timeout_waiting_proposal: Duration,
    /// Re-broadcast interval of INIT ballots.
    #[serde(default = "default_interval", with = "nanos")]
    pub interval_broadcasting_init_ballot: Duration,
    /// Re-broadcast interval of proposals.
    #[serde(default = "default_interval", with = "nanos")]
    pub interval_broadcasting_proposal: Duration,
    /// Delay before the first ACCEPT ballot.
    #[serde(default = "default_wait_broadcasting_accept_ballot", with = "nanos")]
    pub wait_broadcasting_accept_ballot: Duration,
    /// Re-broadcast interval of ACCEPT ballots.
    #[serde(default = "default_interval", with = "nanos")]
    pub interval_broadcasting_accept_ballot: Duration,
    /// Size of the acting suffrage.
    #[serde(default = "default_number_of_acting_suffrage_nodes")]
    pub number_of_acting_suffrage_nodes: usize,
    /// Accepted distance between a ballot's `signed_at` and local time.
    #[serde(default = "default_timespan_valid_ballot", with = "nanos")]
    pub timespan_valid_ballot: Duration,
    /// Upper bound of processing one proposal.
    #[serde(default = "default_timeout_process_proposal", with = "nanos")]
    pub timeout_process_proposal: Duration,
    /// Maximum number of operations a proposer puts into one proposal.
    #[serde(default = "default_max_operations_in_proposal")]
    pub max_operations_in_proposal: usize,
}

fn default_threshold_ratio() -> f64 {
    67.0
}
fn default_timeout_waiting_proposal() -> Duration {
    Duration::from_secs(5)
}
fn default_interval() -> Duration {
    Duration::from_secs(1)
}
fn default_wait_broadcasting_accept_ballot() -> Duration {
    Duration::from_secs(5)
}
fn default_number_of_acting_suffrage_nodes() -> usize {
    1
}
fn default_timespan_valid_ballot() -> Duration {
    Duration::from_secs(60)
}
fn default_timeout_process_proposal() -> Duration {
    Duration::from_secs(10)
}
fn default_max_operations_in_proposal() -> usize {
    100
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            threshold_ratio: default_threshold_ratio(),
            timeout_waiting_proposal: default_timeout_waiting_proposal(),
            interval_broadcasting_init_ballot: default_interval(),
            interval_broadcasting_proposal: default_interval(),
            wait_broadcasting_accept_ballot: default_wait_broadcasting_accept_ballot(),
            interval_broadcasting_accept_ballot: default_interval(),
            number_of_acting_suffrage_nodes: default_number_of_acting_suffrage_nodes(),
            timespan_valid_ballot: default_timespan_valid_ballot(),
            timeout_process_proposal: default_timeout_process_proposal(),
            max_operations_in_proposal: default_max_operations_in_proposal(),
        }
    }
}

impl Policy {
    /// Rejects values consensus cannot run with.
    pub fn is_valid(&self) -> Result<(), StateError> {
        if !(self.threshold_ratio > 0.0 && self.threshold_ratio <= 100.0) {
            return Err(StateError::Validation(format!(
                "threshold_ratio {} out of (0, 100]",
                self.threshold_ratio
            )));
        }
        if self.number_of_acting_suffrage_nodes == 0 {
            return Err(StateError::Validation(
                "number_of_acting_suffrage_nodes is zero".into(),
            ));
        }
        if self.max_operations_in_proposal == 0 {
            return Err(StateError::Validation(
                "max_operations_in_proposal is zero".into(),
            ));
        }
        let timers = [
            ("timeout_waiting_proposal", self.timeout_waiting_proposal),
            ("interval_broadcasting_init_ballot", self.interval_broadcasting_init_ballot),
            ("interval_broadcasting_proposal", self.interval_broadcasting_proposal),
            ("interval_broadcasting_accept_ballot", self.interval_broadcasting_accept_ballot),
            ("timeout_process_proposal", self.timeout_process_proposal),
        ];
        if let Some((name, _)) = timers.iter().find(|(_, d)| d.is_zero()) {
            return Err(StateError::Validation(format!("{name} is zero")));
        }
        Ok(())
    }
}

//! Discrete-event simulation substrate.
//!
//! A replica owns one [`scheduler::Scheduler`], one seeded RNG, one scenario
//! (either the simulated Tor-like network or the round model) and one
//! adversary. Scenarios report what a passive observer would see through the
//! adversary hooks.

pub mod delay_queue;
pub mod message;
pub mod network;
pub mod node;
pub mod replica;
pub mod round_model;
pub mod scheduler;

use rand::RngCore;

use crate::attack::{Adversary, AdversaryTimer, AttackError};
use crate::prob::DistributionError;
use message::ClientId;
use scheduler::Scheduler;

pub use network::{TorNetwork, TorNetworkParams};
pub use replica::{Replica, ReplicaOutcome, RunLimits, StopReason};
pub use round_model::{RoundModel, RoundModelParams};

/// Everything that can be scheduled in a replica
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimEvent {
    NetworkWake,
    ClientWake(ClientId),
    ModelActivity,
    ModelRound,
    Adversary(AdversaryTimer),
}

impl From<AdversaryTimer> for SimEvent {
    fn from(timer: AdversaryTimer) -> Self {
        SimEvent::Adversary(timer)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Attack(#[from] AttackError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("Unknown node {0}")]
    UnknownNode(String),

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),
}

/// A traffic generator feeding observations to the adversary
pub trait Scenario {
    fn name(&self) -> &'static str;

    fn start(
        &mut self,
        scheduler: &mut Scheduler<SimEvent>,
        rng: &mut dyn RngCore,
        adversary: &mut dyn Adversary,
    ) -> Result<(), SimError>;

    /// Handle a scenario event. Adversary timers never reach this.
    fn handle(
        &mut self,
        event: SimEvent,
        scheduler: &mut Scheduler<SimEvent>,
        rng: &mut dyn RngCore,
        adversary: &mut dyn Adversary,
    ) -> Result<(), SimError>;
}

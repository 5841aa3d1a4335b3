//! Round-based activity model.
//!
//! Instead of simulating clients, every cycle marks each server active with
//! probability `prob_server_active`. A little later, with probability
//! `prob_attack_round`, one of the target servers sends to the target client
//! and the client completes a request for a single message. The cycle then
//! pauses long enough that consecutive rounds do not overlap.

use log::trace;
use rand::{Rng, RngCore};

use super::message::{MessageFactory, MessageKind, NodeId, ServerId};
use super::network::TARGET_CLIENT;
use super::scheduler::Scheduler;
use super::{Scenario, SimError, SimEvent};
use crate::attack::{Adversary, AttackContext};

#[derive(Debug, Clone, PartialEq)]
pub struct RoundModelParams {
    pub num_servers: usize,
    pub num_target_servers: usize,
    pub prob_server_active: f64,
    pub prob_attack_round: f64,
    pub max_msg_delivery_time: f64,
}

#[derive(Debug)]
pub struct RoundModel {
    params: RoundModelParams,
    factory: MessageFactory,
    cycles: u64,
    attack_rounds: u64,
}

impl RoundModel {
    pub fn new(params: RoundModelParams) -> Result<Self, SimError> {
        if params.num_target_servers == 0 || params.num_target_servers > params.num_servers {
            return Err(SimError::InvalidScenario(format!(
                "num_target_servers must be in 1..={}, got {}",
                params.num_servers, params.num_target_servers
            )));
        }
        for (name, p) in [
            ("prob_server_active", params.prob_server_active),
            ("prob_attack_round", params.prob_attack_round),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SimError::InvalidScenario(format!("{} must be in [0, 1], got {}", name, p)));
            }
        }
        if !(params.max_msg_delivery_time.is_finite() && params.max_msg_delivery_time > 0.0) {
            return Err(SimError::InvalidScenario(format!(
                "max_msg_delivery_time must be finite and positive, got {}",
                params.max_msg_delivery_time
            )));
        }

        Ok(Self {
            params,
            factory: MessageFactory::new(),
            cycles: 0,
            attack_rounds: 0,
        })
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn attack_rounds(&self) -> u64 {
        self.attack_rounds
    }

    fn server_sends(
        &mut self,
        server: ServerId,
        scheduler: &mut Scheduler<SimEvent>,
        rng: &mut dyn RngCore,
        adversary: &mut dyn Adversary,
    ) {
        let message = self
            .factory
            .create(MessageKind::Data, NodeId::Server(server), NodeId::Client(TARGET_CLIENT));
        let mut ctx = AttackContext::new(scheduler, rng);
        adversary.server_sent_msg(&message, &mut ctx);
    }
}

impl Scenario for RoundModel {
    fn name(&self) -> &'static str {
        "round_model"
    }

    fn start(
        &mut self,
        scheduler: &mut Scheduler<SimEvent>,
        _rng: &mut dyn RngCore,
        _adversary: &mut dyn Adversary,
    ) -> Result<(), SimError> {
        scheduler.schedule_after(0.0, SimEvent::ModelActivity);
        Ok(())
    }

    fn handle(
        &mut self,
        event: SimEvent,
        scheduler: &mut Scheduler<SimEvent>,
        rng: &mut dyn RngCore,
        adversary: &mut dyn Adversary,
    ) -> Result<(), SimError> {
        let max = self.params.max_msg_delivery_time;

        match event {
            SimEvent::ModelActivity => {
                self.cycles += 1;
                for rank in 0..self.params.num_servers as u32 {
                    if rng.gen::<f64>() <= self.params.prob_server_active {
                        self.server_sends(ServerId(rank), scheduler, rng, adversary);
                    }
                }
                scheduler.schedule_after(0.1 * max, SimEvent::ModelRound);
            }
            SimEvent::ModelRound => {
                if rng.gen::<f64>() <= self.params.prob_attack_round {
                    let target = ServerId(rng.gen_range(0..self.params.num_target_servers as u32));
                    trace!("cycle {}: attack round through {}", self.cycles, target);
                    self.server_sends(target, scheduler, rng, adversary);

                    self.attack_rounds += 1;
                    let mut ctx = AttackContext::new(scheduler, rng);
                    adversary.client_completed_get_request(1, &mut ctx)?;
                }
                scheduler.schedule_after(2.0 * max, SimEvent::ModelActivity);
            }
            _ => {}
        }
        Ok(())
    }
}

//! Simulated Tor-like network.
//!
//! One target client and `num_clients` background clients talk to
//! `num_servers` servers through a single delay queue. The adversary sees the
//! target client's sends and completed requests, and every server's sends and
//! receptions.

use std::sync::Arc;

use log::debug;
use rand::RngCore;

use super::delay_queue::DelayDeliveryQueue;
use super::message::{ClientId, Message, MessageFactory, NodeId, ServerId};
use super::node::{Client, Node, NodeOutput, Outbox, Server};
use super::scheduler::Scheduler;
use super::{Scenario, SimError, SimEvent};
use crate::attack::{Adversary, AttackContext};
use crate::prob::RandomVariable;

pub const TARGET_CLIENT: ClientId = ClientId(0);

#[derive(Debug, Clone)]
pub struct TorNetworkParams {
    pub num_clients: usize,
    pub num_servers: usize,
    pub num_target_servers: usize,
    pub network_delay: Arc<dyn RandomVariable>,
    pub idle_time: Arc<dyn RandomVariable>,
    pub target_idle_time: Arc<dyn RandomVariable>,
    pub msgs_per_request: Arc<dyn RandomVariable>,
}

#[derive(Debug)]
pub struct TorNetwork {
    queue: DelayDeliveryQueue<SimEvent>,
    /// Index 0 is the target client
    clients: Vec<Client>,
    servers: Vec<Server>,
    factory: MessageFactory,
}

impl TorNetwork {
    pub fn new(params: TorNetworkParams) -> Result<Self, SimError> {
        if params.num_servers == 0 {
            return Err(SimError::InvalidScenario("network needs at least one server".to_string()));
        }
        if params.num_target_servers == 0 || params.num_target_servers > params.num_servers {
            return Err(SimError::InvalidScenario(format!(
                "num_target_servers must be in 1..={}, got {}",
                params.num_servers, params.num_target_servers
            )));
        }

        let servers: Vec<Server> = (0..params.num_servers as u32).map(|i| Server::new(ServerId(i))).collect();

        let mut clients = Vec::with_capacity(params.num_clients + 1);
        clients.push(Client::new(
            TARGET_CLIENT,
            (0..params.num_target_servers as u32).map(ServerId).collect(),
            params.target_idle_time.clone(),
            params.msgs_per_request.clone(),
        ));
        for i in 0..params.num_clients {
            clients.push(Client::new(
                ClientId(i as u32 + 1),
                vec![ServerId((i % params.num_servers) as u32)],
                params.idle_time.clone(),
                params.msgs_per_request.clone(),
            ));
        }

        debug!(
            "network with {} background clients, {} servers, {} targets",
            params.num_clients, params.num_servers, params.num_target_servers
        );

        Ok(Self {
            queue: DelayDeliveryQueue::new(params.network_delay, SimEvent::NetworkWake),
            clients,
            servers,
            factory: MessageFactory::new(),
        })
    }

    pub fn target_servers(&self) -> &[ServerId] {
        self.clients[0].servers()
    }

    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    fn client_index(&self, id: ClientId) -> Result<usize, SimError> {
        let index = id.0 as usize;
        if index < self.clients.len() {
            Ok(index)
        } else {
            Err(SimError::UnknownNode(id.to_string()))
        }
    }

    fn server_index(&self, id: ServerId) -> Result<usize, SimError> {
        let index = id.0 as usize;
        if index < self.servers.len() {
            Ok(index)
        } else {
            Err(SimError::UnknownNode(id.to_string()))
        }
    }

    fn apply(
        &mut self,
        node: NodeId,
        outputs: Vec<NodeOutput>,
        scheduler: &mut Scheduler<SimEvent>,
        rng: &mut dyn RngCore,
        adversary: &mut dyn Adversary,
    ) -> Result<(), SimError> {
        for output in outputs {
            match output {
                NodeOutput::Send(message) => {
                    {
                        let mut ctx = AttackContext::new(&mut *scheduler, &mut *rng);
                        match message.source {
                            NodeId::Client(TARGET_CLIENT) => adversary.client_sent_msg(&message, &mut ctx),
                            NodeId::Server(_) => adversary.server_sent_msg(&message, &mut ctx),
                            NodeId::Client(_) => {}
                        }
                    }
                    self.queue.enqueue(message, scheduler, rng);
                }
                NodeOutput::WakeAfter(delay) => {
                    if let NodeId::Client(id) = node {
                        scheduler.schedule_after(delay, SimEvent::ClientWake(id));
                    }
                }
                NodeOutput::CompletedGetRequest { num_msgs_recved } => {
                    if node == NodeId::Client(TARGET_CLIENT) {
                        let mut ctx = AttackContext::new(&mut *scheduler, &mut *rng);
                        adversary.client_completed_get_request(num_msgs_recved, &mut ctx)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn deliver(
        &mut self,
        message: Message,
        scheduler: &mut Scheduler<SimEvent>,
        rng: &mut dyn RngCore,
        adversary: &mut dyn Adversary,
    ) -> Result<(), SimError> {
        let destination = message.destination;

        let outputs = match destination {
            NodeId::Server(id) => {
                let index = self.server_index(id)?;
                {
                    let mut ctx = AttackContext::new(&mut *scheduler, &mut *rng);
                    adversary.server_recved_msg(&message, &mut ctx);
                }
                let mut outbox = Outbox::new(&mut self.factory);
                self.servers[index].put(message, rng, &mut outbox);
                outbox.into_outputs()
            }
            NodeId::Client(id) => {
                let index = self.client_index(id)?;
                let mut outbox = Outbox::new(&mut self.factory);
                self.clients[index].put(message, rng, &mut outbox);
                outbox.into_outputs()
            }
        };

        self.apply(destination, outputs, scheduler, rng, adversary)
    }
}

impl Scenario for TorNetwork {
    fn name(&self) -> &'static str {
        "network"
    }

    fn start(
        &mut self,
        scheduler: &mut Scheduler<SimEvent>,
        rng: &mut dyn RngCore,
        adversary: &mut dyn Adversary,
    ) -> Result<(), SimError> {
        for index in 0..self.clients.len() {
            let mut outbox = Outbox::new(&mut self.factory);
            self.clients[index].start(rng, &mut outbox);
            let node = self.clients[index].id();
            let outputs = outbox.into_outputs();
            self.apply(node, outputs, scheduler, rng, adversary)?;
        }
        Ok(())
    }

    fn handle(
        &mut self,
        event: SimEvent,
        scheduler: &mut Scheduler<SimEvent>,
        rng: &mut dyn RngCore,
        adversary: &mut dyn Adversary,
    ) -> Result<(), SimError> {
        match event {
            SimEvent::NetworkWake => {
                if let Some(message) = self.queue.on_wake(scheduler) {
                    self.deliver(message, scheduler, rng, adversary)?;
                }
                Ok(())
            }
            SimEvent::ClientWake(id) => {
                let index = self.client_index(id)?;
                let mut outbox = Outbox::new(&mut self.factory);
                self.clients[index].on_wake(rng, &mut outbox);
                let outputs = outbox.into_outputs();
                self.apply(NodeId::Client(id), outputs, scheduler, rng, adversary)
            }
            _ => Ok(()),
        }
    }
}

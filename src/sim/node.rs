//! Client and server nodes.
//!
//! Nodes never touch the scheduler or the network directly. They react to a
//! delivered message (or a wake-up) by pushing [`NodeOutput`]s into an
//! [`Outbox`], and the replica turns those into scheduled work.

use std::sync::Arc;

use log::trace;
use rand::seq::SliceRandom;
use rand::RngCore;

use super::message::{ClientId, Message, MessageFactory, MessageKind, NodeId, ServerId};
use crate::prob::RandomVariable;

/// Side effects requested by a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    /// Hand the message to the network
    Send(Message),
    /// Wake this node again after the given delay
    WakeAfter(f64),
    /// The client received every data message of its current GET request
    CompletedGetRequest { num_msgs_recved: u32 },
}

pub struct Outbox<'a> {
    factory: &'a mut MessageFactory,
    outputs: Vec<NodeOutput>,
}

impl<'a> Outbox<'a> {
    pub fn new(factory: &'a mut MessageFactory) -> Self {
        Self {
            factory,
            outputs: Vec::new(),
        }
    }

    pub fn send(&mut self, kind: MessageKind, source: NodeId, destination: NodeId) {
        let message = self.factory.create(kind, source, destination);
        self.outputs.push(NodeOutput::Send(message));
    }

    pub fn wake_after(&mut self, delay: f64) {
        self.outputs.push(NodeOutput::WakeAfter(delay));
    }

    pub fn completed_get_request(&mut self, num_msgs_recved: u32) {
        self.outputs.push(NodeOutput::CompletedGetRequest { num_msgs_recved });
    }

    pub fn into_outputs(self) -> Vec<NodeOutput> {
        self.outputs
    }
}

pub trait Node {
    fn id(&self) -> NodeId;

    /// Consume a message delivered by the network.
    fn put(&mut self, message: Message, rng: &mut dyn RngCore, outbox: &mut Outbox<'_>);
}

/// A client alternates between idling and waiting for the answer to a GET request
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    servers: Vec<ServerId>,
    idle_time: Arc<dyn RandomVariable>,
    msgs_per_request: Arc<dyn RandomVariable>,
    num_msgs_to_recv: u32,
    num_msgs_recved: u32,
    requests_completed: u64,
}

impl Client {
    pub fn new(
        id: ClientId,
        servers: Vec<ServerId>,
        idle_time: Arc<dyn RandomVariable>,
        msgs_per_request: Arc<dyn RandomVariable>,
    ) -> Self {
        Self {
            id,
            servers,
            idle_time,
            msgs_per_request,
            num_msgs_to_recv: 0,
            num_msgs_recved: 0,
            requests_completed: 0,
        }
    }

    pub fn servers(&self) -> &[ServerId] {
        &self.servers
    }

    pub fn requests_completed(&self) -> u64 {
        self.requests_completed
    }

    /// Begin the first idle period.
    pub fn start(&mut self, rng: &mut dyn RngCore, outbox: &mut Outbox<'_>) {
        outbox.wake_after(self.idle_time.sample(rng));
    }

    /// Idle period over: send a GET request to one of our servers.
    pub fn on_wake(&mut self, rng: &mut dyn RngCore, outbox: &mut Outbox<'_>) {
        let Some(&server) = self.servers.choose(rng) else {
            return;
        };

        let sampled = self.msgs_per_request.sample(rng).round();
        self.num_msgs_to_recv = if sampled >= 1.0 { sampled.min(u32::MAX as f64) as u32 } else { 1 };
        self.num_msgs_recved = 0;

        trace!("{} requests {} msgs from {}", self.id, self.num_msgs_to_recv, server);
        outbox.send(
            MessageKind::Get {
                num_msgs_to_recv: self.num_msgs_to_recv,
            },
            NodeId::Client(self.id),
            NodeId::Server(server),
        );
    }
}

impl Node for Client {
    fn id(&self) -> NodeId {
        NodeId::Client(self.id)
    }

    fn put(&mut self, message: Message, rng: &mut dyn RngCore, outbox: &mut Outbox<'_>) {
        if message.kind != MessageKind::Data || self.num_msgs_to_recv == 0 {
            return;
        }

        self.num_msgs_recved += 1;
        if self.num_msgs_recved == self.num_msgs_to_recv {
            trace!("{} received all {} msgs", self.id, self.num_msgs_recved);
            self.requests_completed += 1;
            outbox.completed_get_request(self.num_msgs_recved);
            self.num_msgs_to_recv = 0;
            outbox.wake_after(self.idle_time.sample(rng));
        }
    }
}

/// A server answers every GET request with the requested number of data messages
#[derive(Debug)]
pub struct Server {
    id: ServerId,
    num_msgs_recved: u64,
    num_msgs_sent: u64,
}

impl Server {
    pub fn new(id: ServerId) -> Self {
        Self {
            id,
            num_msgs_recved: 0,
            num_msgs_sent: 0,
        }
    }

    pub fn num_msgs_sent(&self) -> u64 {
        self.num_msgs_sent
    }

    pub fn num_msgs_recved(&self) -> u64 {
        self.num_msgs_recved
    }
}

impl Node for Server {
    fn id(&self) -> NodeId {
        NodeId::Server(self.id)
    }

    fn put(&mut self, message: Message, _rng: &mut dyn RngCore, outbox: &mut Outbox<'_>) {
        self.num_msgs_recved += 1;

        if let MessageKind::Get { num_msgs_to_recv } = message.kind {
            for _ in 0..num_msgs_to_recv {
                outbox.send(MessageKind::Data, NodeId::Server(self.id), message.source);
                self.num_msgs_sent += 1;
            }
        }
    }
}

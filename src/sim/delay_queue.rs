//! Delay-reordering delivery queue.
//!
//! Every message gets an independently sampled delay, so a later message can
//! overtake an earlier one. The queue keeps exactly one wake timer in the
//! scheduler, armed for the earliest pending delivery.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use log::trace;
use rand::RngCore;

use super::message::Message;
use super::scheduler::{Scheduler, SimTime, TimerHandle};
use crate::prob::RandomVariable;

#[derive(Debug)]
struct ScheduledDelivery {
    deliver_at: SimTime,
    seq: u64,
    message: Message,
}

impl PartialEq for ScheduledDelivery {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledDelivery {}

impl PartialOrd for ScheduledDelivery {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledDelivery {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deliver_at
            .total_cmp(&self.deliver_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug)]
pub struct DelayDeliveryQueue<E> {
    delay: Arc<dyn RandomVariable>,
    wake_event: E,
    heap: BinaryHeap<ScheduledDelivery>,
    next_seq: u64,
    wake: Option<(TimerHandle, SimTime)>,
    delivered: u64,
}

impl<E: Clone> DelayDeliveryQueue<E> {
    /// `wake_event` is what the queue schedules for itself; the owner routes it
    /// back to [`DelayDeliveryQueue::on_wake`].
    pub fn new(delay: Arc<dyn RandomVariable>, wake_event: E) -> Self {
        Self {
            delay,
            wake_event,
            heap: BinaryHeap::new(),
            next_seq: 0,
            wake: None,
            delivered: 0,
        }
    }

    /// Enqueue with a delay sampled from the configured distribution.
    pub fn enqueue(&mut self, message: Message, scheduler: &mut Scheduler<E>, rng: &mut dyn RngCore) -> SimTime {
        let delay = self.delay.sample(rng);
        self.deliver_with_delay(message, delay, scheduler)
    }

    /// Enqueue with an explicit delay. Negative delays deliver immediately.
    pub fn deliver_with_delay(&mut self, message: Message, delay: f64, scheduler: &mut Scheduler<E>) -> SimTime {
        let delay = if delay > 0.0 { delay } else { 0.0 };
        let deliver_at = scheduler.now() + delay;
        let seq = self.next_seq;
        self.next_seq += 1;

        trace!("message {} to {} queued for t={:.4}", message.id, message.destination, deliver_at);
        self.heap.push(ScheduledDelivery {
            deliver_at,
            seq,
            message,
        });
        self.rearm(scheduler);
        deliver_at
    }

    /// Handle the wake timer: pop at most one due message and re-arm.
    pub fn on_wake(&mut self, scheduler: &mut Scheduler<E>) -> Option<Message> {
        self.wake = None;
        let now = scheduler.now();

        let due = self.heap.peek().is_some_and(|next| next.deliver_at <= now);
        let message = if due {
            self.delivered += 1;
            self.heap.pop().map(|scheduled| scheduled.message)
        } else {
            None
        };

        self.rearm(scheduler);
        message
    }

    fn rearm(&mut self, scheduler: &mut Scheduler<E>) {
        let Some(next_at) = self.heap.peek().map(|next| next.deliver_at) else {
            return;
        };

        if let Some((handle, armed_at)) = self.wake {
            if armed_at <= next_at && scheduler.is_pending(handle) {
                return;
            }
            scheduler.cancel(handle);
        }

        let handle = scheduler.schedule_at(next_at, self.wake_event.clone());
        self.wake = Some((handle, next_at));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prob::Constant;
    use crate::sim::message::{ClientId, MessageFactory, MessageKind, NodeId, ServerId};

    #[derive(Debug, Clone, PartialEq)]
    struct Wake;

    fn queue() -> DelayDeliveryQueue<Wake> {
        DelayDeliveryQueue::new(Arc::new(Constant::new(0.0).unwrap()), Wake)
    }

    fn data(factory: &mut MessageFactory, server: u32) -> Message {
        factory.create(
            MessageKind::Data,
            NodeId::Server(ServerId(server)),
            NodeId::Client(ClientId(0)),
        )
    }

    fn drain(queue: &mut DelayDeliveryQueue<Wake>, scheduler: &mut Scheduler<Wake>) -> Vec<(SimTime, u64)> {
        let mut delivered = Vec::new();
        while let Some((time, Wake)) = scheduler.pop() {
            if let Some(message) = queue.on_wake(scheduler) {
                delivered.push((time, message.id));
            }
        }
        delivered
    }

    #[test]
    fn test_delivers_in_deliver_at_order() {
        let mut scheduler = Scheduler::new();
        let mut queue = queue();
        let mut factory = MessageFactory::new();

        for delay in [5.0, 1.0, 3.0] {
            let message = data(&mut factory, 0);
            queue.deliver_with_delay(message, delay, &mut scheduler);
        }

        let delivered = drain(&mut queue, &mut scheduler);
        let times: Vec<_> = delivered.iter().map(|(t, _)| *t).collect();
        let ids: Vec<_> = delivered.iter().map(|(_, id)| *id).collect();
        assert_eq!(times, vec![1.0, 3.0, 5.0]);
        assert_eq!(ids, vec![1, 2, 0]);
        assert!(queue.is_empty());
        assert_eq!(queue.delivered(), 3);
    }

    #[test]
    fn test_equal_deliver_at_keeps_insertion_order() {
        let mut scheduler = Scheduler::new();
        let mut queue = queue();
        let mut factory = MessageFactory::new();

        for _ in 0..4 {
            let message = data(&mut factory, 1);
            queue.deliver_with_delay(message, 2.0, &mut scheduler);
        }

        let ids: Vec<_> = drain(&mut queue, &mut scheduler).into_iter().map(|(_, id)| id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_earlier_message_rearms_single_timer() {
        let mut scheduler = Scheduler::new();
        let mut queue = queue();
        let mut factory = MessageFactory::new();

        let slow = data(&mut factory, 0);
        queue.deliver_with_delay(slow, 10.0, &mut scheduler);
        assert_eq!(scheduler.pending(), 1);

        let fast = data(&mut factory, 1);
        queue.deliver_with_delay(fast, 2.0, &mut scheduler);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.peek_time(), Some(2.0));

        let later = data(&mut factory, 2);
        queue.deliver_with_delay(later, 4.0, &mut scheduler);
        assert_eq!(scheduler.pending(), 1);

        let delivered = drain(&mut queue, &mut scheduler);
        assert_eq!(delivered, vec![(2.0, 1), (4.0, 2), (10.0, 0)]);
    }

    #[test]
    fn test_negative_delay_delivers_now() {
        let mut scheduler = Scheduler::new();
        let mut queue = queue();
        let mut factory = MessageFactory::new();

        let message = data(&mut factory, 0);
        let deliver_at = queue.deliver_with_delay(message, -1.5, &mut scheduler);
        assert_eq!(deliver_at, 0.0);
        assert_eq!(drain(&mut queue, &mut scheduler), vec![(0.0, 0)]);
    }

    #[test]
    fn test_sampled_delays_are_non_decreasing_at_delivery() {
        use crate::prob::Exponential;
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let mut scheduler = Scheduler::new();
        let mut queue = DelayDeliveryQueue::new(Arc::new(Exponential::new(1.0, 0.0).unwrap()), Wake);
        let mut factory = MessageFactory::new();
        let mut rng = StdRng::seed_from_u64(42);

        for i in 0..200 {
            let message = data(&mut factory, i % 7);
            queue.enqueue(message, &mut scheduler, &mut rng);
        }

        let times: Vec<_> = drain(&mut queue, &mut scheduler).into_iter().map(|(t, _)| t).collect();
        assert_eq!(times.len(), 200);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}

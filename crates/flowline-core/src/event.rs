//! Simulation events and the notification sink.
//!
//! Each frame records the events its tick produced. Order lifecycle events
//! and the end of the run are also forwarded, as [`Notification`]s, to a
//! [`Notifier`] supplied by the host. The engine forwards unconditionally;
//! [`NullNotifier`] discards everything.

use crate::fixed::Ticks;
use crate::id::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // -- Orders --
    OrderReserved {
        order: OrderId,
        tick: Ticks,
    },
    OrderStarted {
        order: OrderId,
        tick: Ticks,
    },
    OrderCompleted {
        order: OrderId,
        tick: Ticks,
    },
    OrderCancelled {
        order: OrderId,
        tick: Ticks,
    },
    AllOrdersCompleted {
        tick: Ticks,
    },

    // -- Production --
    /// `units` is recipe runs for a recipe step, items held otherwise.
    BatchStarted {
        step: StepId,
        units: u32,
        finish_tick: Ticks,
        tick: Ticks,
    },
    BatchFinished {
        step: StepId,
        released: u32,
        tick: Ticks,
    },
    ProductionFailed {
        step: StepId,
        order: OrderId,
        tick: Ticks,
    },

    // -- Inventory --
    SlotExhausted {
        holder: Holder,
        tick: Ticks,
    },
}

/// Discriminant-only mirror of [`Event`], for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    OrderReserved,
    OrderStarted,
    OrderCompleted,
    OrderCancelled,
    AllOrdersCompleted,
    BatchStarted,
    BatchFinished,
    ProductionFailed,
    SlotExhausted,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::OrderReserved { .. } => EventKind::OrderReserved,
            Event::OrderStarted { .. } => EventKind::OrderStarted,
            Event::OrderCompleted { .. } => EventKind::OrderCompleted,
            Event::OrderCancelled { .. } => EventKind::OrderCancelled,
            Event::AllOrdersCompleted { .. } => EventKind::AllOrdersCompleted,
            Event::BatchStarted { .. } => EventKind::BatchStarted,
            Event::BatchFinished { .. } => EventKind::BatchFinished,
            Event::ProductionFailed { .. } => EventKind::ProductionFailed,
            Event::SlotExhausted { .. } => EventKind::SlotExhausted,
        }
    }

    pub fn tick(&self) -> Ticks {
        match self {
            Event::OrderReserved { tick, .. }
            | Event::OrderStarted { tick, .. }
            | Event::OrderCompleted { tick, .. }
            | Event::OrderCancelled { tick, .. }
            | Event::AllOrdersCompleted { tick }
            | Event::BatchStarted { tick, .. }
            | Event::BatchFinished { tick, .. }
            | Event::ProductionFailed { tick, .. }
            | Event::SlotExhausted { tick, .. } => *tick,
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    OrderReserved,
    OrderStarted,
    OrderCompleted,
    SimulationStopped,
}

/// A human-readable message about an order or the run as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub order: Option<OrderId>,
    pub tick: Ticks,
    pub message: String,
}

impl Notification {
    /// The notification for `event`, if it is one hosts are told about.
    pub fn from_event(event: &Event) -> Option<Self> {
        let (kind, order, message) = match *event {
            Event::OrderReserved { order, .. } => (
                NotificationKind::OrderReserved,
                Some(order),
                format!("order {} reserved its materials", order.0),
            ),
            Event::OrderStarted { order, .. } => (
                NotificationKind::OrderStarted,
                Some(order),
                format!("order {} is in progress", order.0),
            ),
            Event::OrderCompleted { order, .. } => (
                NotificationKind::OrderCompleted,
                Some(order),
                format!("order {} completed", order.0),
            ),
            Event::AllOrdersCompleted { .. } => (
                NotificationKind::SimulationStopped,
                None,
                "all orders completed, simulation stopped".to_string(),
            ),
            _ => return None,
        };
        Some(Self {
            kind,
            order,
            tick: event.tick(),
            message,
        })
    }
}

/// Receives notifications as frames are computed.
pub trait Notifier {
    fn notify(&mut self, notification: &Notification);
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&mut self, _notification: &Notification) {}
}

/// Emits every notification as an `info` trace.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, n: &Notification) {
        tracing::info!(tick = n.tick, kind = ?n.kind, "{}", n.message);
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingNotifier {
    pub received: Vec<Notification>,
}

impl Notifier for CollectingNotifier {
    fn notify(&mut self, notification: &Notification) {
        self.received.push(notification.clone());
    }
}

impl<N: Notifier + ?Sized> Notifier for std::rc::Rc<std::cell::RefCell<N>> {
    fn notify(&mut self, notification: &Notification) {
        self.borrow_mut().notify(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_accessor_covers_variants() {
        let e = Event::AllOrdersCompleted { tick: 9 };
        assert_eq!(e.tick(), 9);
        assert_eq!(e.kind(), EventKind::AllOrdersCompleted);
        let e = Event::OrderStarted {
            order: OrderId(1),
            tick: 4,
        };
        assert_eq!(e.tick(), 4);
    }

    #[test]
    fn order_events_become_notifications() {
        let n = Notification::from_event(&Event::OrderCompleted {
            order: OrderId(7),
            tick: 12,
        })
        .unwrap();
        assert_eq!(n.kind, NotificationKind::OrderCompleted);
        assert_eq!(n.order, Some(OrderId(7)));
        assert_eq!(n.tick, 12);
        assert!(n.message.contains('7'));
    }

    #[test]
    fn run_end_is_simulation_stopped() {
        let n = Notification::from_event(&Event::AllOrdersCompleted { tick: 3 }).unwrap();
        assert_eq!(n.kind, NotificationKind::SimulationStopped);
        assert_eq!(n.order, None);
    }

    #[test]
    fn cancellation_is_not_notified() {
        let e = Event::OrderCancelled {
            order: OrderId(1),
            tick: 0,
        };
        assert!(Notification::from_event(&e).is_none());
    }

    #[test]
    fn shared_collector_receives() {
        use std::cell::RefCell;
        use std::rc::Rc;
        let shared = Rc::new(RefCell::new(CollectingNotifier::default()));
        let mut sink = shared.clone();
        let n = Notification::from_event(&Event::AllOrdersCompleted { tick: 1 }).unwrap();
        sink.notify(&n);
        NullNotifier.notify(&n);
        assert_eq!(shared.borrow().received.len(), 1);
    }
}

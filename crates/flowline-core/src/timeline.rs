//! Frames and the timeline that stores them.
//!
//! A [`Frame`] is the complete result of one tick: a deep copy of the
//! factory state and orders plus everything recorded while computing it.
//! The [`Timeline`] keeps frames for a contiguous range of ticks and a
//! cursor marking the current one. Frames after the cursor are
//! precomputed futures; they are dropped whenever the current frame is
//! changed by a command.

use crate::event::Event;
use crate::fixed::Ticks;
use crate::order::{Order, OrderStatus};
use crate::id::SensorId;
use crate::sensor::LogEntry;
use crate::sim::StateHash;
use crate::state::FactoryState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub tick: Ticks,
    pub state: FactoryState,
    pub orders: Vec<Order>,
    /// Transport duration samples recorded this tick, by link type tag.
    pub transport_durations: BTreeMap<String, Vec<Ticks>>,
    /// Step duration samples recorded this tick, by step name.
    pub step_durations: BTreeMap<String, Vec<Ticks>>,
    pub events: Vec<Event>,
    pub sensor_log: Vec<LogEntry>,
    pub state_hash: u64,
}

impl Frame {
    pub(crate) fn rehash(&mut self) {
        self.state_hash = frame_hash(self.tick, &self.state, &self.orders);
    }

    pub fn order(&self, id: crate::id::OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    /// True when no order is pending or in progress.
    pub fn all_orders_settled(&self) -> bool {
        crate::order::all_settled(&self.orders)
    }

    pub fn completed_orders(&self) -> usize {
        self.orders
            .iter()
            .filter(|o| o.status == OrderStatus::Completed)
            .count()
    }
}

pub(crate) fn frame_hash(tick: Ticks, state: &FactoryState, orders: &[Order]) -> u64 {
    let mut h = StateHash::new();
    h.write_u64(tick);
    state.hash_into(&mut h);
    for o in orders {
        h.write_u32(o.id.0);
        h.write(&[o.status.code(), o.reserved as u8]);
        h.write_opt_ticks(o.started_tick);
        h.write_opt_ticks(o.completed_tick);
    }
    h.finish()
}

/// Contiguous frames with a cursor. Never empty.
#[derive(Debug, Clone)]
pub struct Timeline {
    frames: Vec<Frame>,
    cursor: usize,
}

impl Timeline {
    pub fn new(first: Frame) -> Self {
        Self {
            frames: vec![first],
            cursor: 0,
        }
    }

    pub fn current(&self) -> &Frame {
        &self.frames[self.cursor]
    }

    pub(crate) fn current_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.cursor]
    }

    pub fn latest(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Frames from the earliest up to and including the current one.
    pub fn history(&self) -> &[Frame] {
        &self.frames[..=self.cursor]
    }

    pub fn earliest_tick(&self) -> Ticks {
        self.frames[0].tick
    }

    pub fn latest_tick(&self) -> Ticks {
        self.latest().tick
    }

    pub fn current_tick(&self) -> Ticks {
        self.current().tick
    }

    pub fn frame_at(&self, tick: Ticks) -> Option<&Frame> {
        let offset = tick.checked_sub(self.earliest_tick())?;
        self.frames.get(usize::try_from(offset).ok()?)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether a precomputed frame follows the current one.
    pub fn has_next(&self) -> bool {
        self.cursor + 1 < self.frames.len()
    }

    pub(crate) fn advance_cursor(&mut self) -> bool {
        if self.has_next() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Append a frame after the latest one.
    pub(crate) fn push(&mut self, frame: Frame) {
        debug_assert_eq!(frame.tick, self.latest_tick() + 1);
        self.frames.push(frame);
    }

    /// Move the cursor to `tick` if a frame for it is held.
    pub(crate) fn seek(&mut self, tick: Ticks) -> bool {
        match tick.checked_sub(self.earliest_tick()).map(usize::try_from) {
            Some(Ok(offset)) if offset < self.frames.len() => {
                self.cursor = offset;
                true
            }
            _ => false,
        }
    }

    /// Log entries of one sensor across every held frame, in tick order.
    pub fn sensor_log(&self, sensor: SensorId) -> Vec<&LogEntry> {
        self.frames
            .iter()
            .flat_map(|f| f.sensor_log.iter())
            .filter(|e| e.sensor == sensor)
            .collect()
    }

    /// Drop every frame after the cursor. Returns how many were dropped.
    pub(crate) fn truncate_future(&mut self) -> usize {
        let dropped = self.frames.len() - (self.cursor + 1);
        self.frames.truncate(self.cursor + 1);
        dropped
    }
}

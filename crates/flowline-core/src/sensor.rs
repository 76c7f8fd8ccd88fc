//! Sensors count and log items passing their holder.
//!
//! Every scan appends one [`LogEntry`] per item per sensor to the frame's
//! sensor log. Scans with [`ScanDirection::Product`] also bump the sensor's
//! production counter.

use crate::fixed::Ticks;
use crate::id::{Holder, MaterialId, OrderId, SensorId};
use crate::inventory::InventoryEntry;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanDirection {
    /// Item entering the holder.
    Input,
    /// Item leaving the holder.
    Output,
    /// Item produced at the holder.
    Product,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub tick: Ticks,
    pub sensor: SensorId,
    pub holder: Holder,
    pub material: MaterialId,
    pub order: Option<OrderId>,
    pub direction: ScanDirection,
    /// Production counter after this scan.
    pub counter: u64,
}

/// Writes scans for one tick.
pub(crate) struct SensorLogger<'a> {
    pub counters: &'a mut SecondaryMap<SensorId, u64>,
    pub log: &'a mut Vec<LogEntry>,
    pub tick: Ticks,
}

impl SensorLogger<'_> {
    /// Record `entry` passing every sensor in `sensors`. Always succeeds;
    /// returns the number of log entries written.
    pub fn scan(
        &mut self,
        sensors: &[SensorId],
        holder: Holder,
        direction: ScanDirection,
        entry: &InventoryEntry,
    ) -> usize {
        for &sensor in sensors {
            let counter = self.counters.entry(sensor).map_or(0, |e| {
                let c = e.or_insert(0);
                if direction == ScanDirection::Product {
                    *c += 1;
                }
                *c
            });
            self.log.push(LogEntry {
                tick: self.tick,
                sensor,
                holder,
                material: entry.material,
                order: entry.order,
                direction,
                counter,
            });
        }
        sensors.len()
    }
}

//! Event-driven voltage propagation queues.
//!
//! Each interpretation (Min/Sim/Max) owns one [`EventQueue`]. Devices are
//! enqueued keyed by the voltage that would newly reach one of their
//! terminals; dequeuing always prefers the "main" queue (devices whose new
//! voltage is already known) over the "delay" queue (devices waiting on a
//! Vth-drop adjustment or a simultaneous opposite-direction resolution).
//!
//! The per-key list is an intrusive singly-linked list over a flat
//! `Vec<DeviceId>` indexed by device id (`queue_array`) rather than a
//! `VecDeque<DeviceId>` per key — this keeps the structure at O(1) memory
//! per device regardless of how many times it moves between keys, and
//! makes "is this device already queued somewhere" an O(1) check.

use crate::ids::{DeviceId, NetId, Resistance, Voltage};
use std::collections::BTreeMap;

/// Where a newly-computed voltage places a device in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    /// Net settles to HiZ; report immediately, never re-examine.
    HiZ = -3,
    /// Value already resolved by a cheaper path; drop without enqueuing.
    SkipQueue = -2,
    /// Device is a MOS-diode connection; resolve after ordinary devices at
    /// the same key via the delay queue.
    MosDiode = -1,
    /// Ordinary device, appended to the back of the main queue at its key.
    MainBack = 0,
    /// Needs reprocessing before any new main-queue key is taken.
    DelayFront = 1,
    /// Needs reprocessing after ordinary devices at the same key.
    DelayBack = 2,
}

/// Event ordering key. For the Max interpretation the key is the negated
/// voltage so a `BTreeMap`'s ascending iteration still visits highest
/// voltage first (ties broken by insertion order within a key's list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventKey(pub i64);

impl EventKey {
    pub fn for_min(voltage: Voltage) -> Self {
        Self(voltage.value() as i64)
    }

    pub fn for_max(voltage: Voltage) -> Self {
        Self(-(voltage.value() as i64))
    }

    /// Sim-queue ordering cares about which path reaches a net first and,
    /// among ties, which path is the lower-resistance one — not the
    /// voltage value itself. `queue_time` is a dequeue counter (the
    /// discovery order), packed into the high bits so it dominates the
    /// comparison; `resistance` breaks ties within the same discovery
    /// round, masked to 16 bits so a single very resistive path can't push
    /// the whole key out of the counter's range.
    pub fn for_sim(queue_time: u64, resistance: Resistance) -> Self {
        let resistance_bits = (resistance.value() as i64) & 0xFFFF;
        Self(((queue_time as i64) << 16) | resistance_bits)
    }
}

const UNKNOWN_DEVICE: DeviceId = DeviceId::UNKNOWN;

/// Intrusive singly-linked list of devices sharing one event key, built
/// over a caller-owned `next` array so a device can only ever be linked
/// into one list at a time.
#[derive(Debug, Default)]
pub struct EventList {
    head: DeviceId,
    tail: DeviceId,
}

impl EventList {
    pub fn new() -> Self {
        Self {
            head: UNKNOWN_DEVICE,
            tail: UNKNOWN_DEVICE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_unknown()
    }

    pub fn front(&self) -> Option<DeviceId> {
        (!self.head.is_unknown()).then_some(self.head)
    }

    /// Append `device` to the end of this list. Panics if `device` is
    /// already linked somewhere (`next[device] != UNKNOWN_DEVICE`) — the
    /// invariant is "at most one queue position per device".
    pub fn push_back(&mut self, device: DeviceId, next: &mut [DeviceId]) {
        assert_eq!(
            next[device.index()],
            UNKNOWN_DEVICE,
            "device {device} already queued"
        );
        if self.tail.is_unknown() {
            self.head = device;
        } else {
            next[self.tail.index()] = device;
        }
        self.tail = device;
    }

    pub fn push_front(&mut self, device: DeviceId, next: &mut [DeviceId]) {
        assert_eq!(
            next[device.index()],
            UNKNOWN_DEVICE,
            "device {device} already queued"
        );
        if self.head.is_unknown() {
            self.tail = device;
        } else {
            next[device.index()] = self.head;
        }
        self.head = device;
    }

    /// Remove and return the device at the front of the list.
    pub fn pop_front(&mut self, next: &mut [DeviceId]) -> Option<DeviceId> {
        if self.head.is_unknown() {
            return None;
        }
        let device = self.head;
        let following = next[device.index()];
        next[device.index()] = UNKNOWN_DEVICE;
        self.head = following;
        if self.head.is_unknown() {
            self.tail = UNKNOWN_DEVICE;
        }
        Some(device)
    }
}

/// A leak pair: two power ids whose shorted nets settled to different
/// voltages, keyed by `(smaller, bigger)` so a leak is only reported once
/// regardless of discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LeakKey(pub NetId, pub NetId);

impl LeakKey {
    pub fn new(a: NetId, b: NetId) -> Self {
        if a.value() <= b.value() {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

#[derive(Debug, Default)]
pub struct LeakMap {
    leaks: BTreeMap<LeakKey, (Voltage, Voltage, DeviceId)>,
}

impl LeakMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a leak between two nets at their settled voltages, caused by
    /// `device` shorting them. A repeat insertion for the same pair is a
    /// no-op: the first discovery is kept so leak reports don't duplicate.
    pub fn add(&mut self, a: NetId, b: NetId, voltage_a: Voltage, voltage_b: Voltage, device: DeviceId) -> bool {
        let key = LeakKey::new(a, b);
        if self.leaks.contains_key(&key) {
            return false;
        }
        self.leaks.insert(key, (voltage_a, voltage_b, device));
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LeakKey, &(Voltage, Voltage, DeviceId))> {
        self.leaks.iter()
    }

    pub fn len(&self) -> usize {
        self.leaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaks.is_empty()
    }
}

/// One interpretation's event queue: a main sub-queue for ordinary
/// devices and a delay sub-queue for devices needing deferred handling
/// (MOS-diode resolution, Vth-drop requeues).
pub struct EventQueue {
    /// Shared intrusive-list link array, one entry per device.
    next: Vec<DeviceId>,
    main: BTreeMap<EventKey, EventList>,
    delay: BTreeMap<EventKey, EventList>,
    pub leaks: LeakMap,

    pub enqueue_count: u64,
    pub dequeue_count: u64,
    pub requeue_count: u64,
}

impl EventQueue {
    pub fn new(device_count: usize) -> Self {
        Self {
            next: vec![UNKNOWN_DEVICE; device_count],
            main: BTreeMap::new(),
            delay: BTreeMap::new(),
            leaks: LeakMap::new(),
            enqueue_count: 0,
            dequeue_count: 0,
            requeue_count: 0,
        }
    }

    pub fn is_queued(&self, device: DeviceId) -> bool {
        !self.next[device.index()].is_unknown() || self.front_matches(device)
    }

    fn front_matches(&self, device: DeviceId) -> bool {
        self.main.values().chain(self.delay.values()).any(|l| l.front() == Some(device))
    }

    /// Add `device` to the queue at `key` per `position`. `SkipQueue` and
    /// `HiZ` are handled by the caller before reaching here (they never
    /// enter a sub-queue); passing them in is a logic error.
    pub fn add_event(&mut self, key: EventKey, device: DeviceId, position: QueuePosition) {
        self.enqueue_count += 1;
        match position {
            QueuePosition::MainBack => {
                self.main.entry(key).or_default().push_back(device, &mut self.next);
            }
            QueuePosition::MosDiode | QueuePosition::DelayBack => {
                self.delay.entry(key).or_default().push_back(device, &mut self.next);
            }
            QueuePosition::DelayFront => {
                self.delay.entry(key).or_default().push_front(device, &mut self.next);
            }
            QueuePosition::HiZ | QueuePosition::SkipQueue => {
                panic!("{position:?} must be handled before reaching the event queue");
            }
        }
    }

    fn peek_key(queue: &BTreeMap<EventKey, EventList>) -> Option<EventKey> {
        queue
            .iter()
            .find(|(_, list)| !list.is_empty())
            .map(|(k, _)| *k)
    }

    /// True when the main queue should be serviced before the delay queue
    /// at the current frontier: the main queue wins unless the delay
    /// queue's next key is strictly earlier.
    pub fn is_next_main_queue(&self) -> bool {
        match (Self::peek_key(&self.main), Self::peek_key(&self.delay)) {
            (Some(_), None) => true,
            (None, _) => false,
            (Some(m), Some(d)) => m <= d,
        }
    }

    pub fn get_main_event(&mut self) -> Option<(EventKey, DeviceId)> {
        let key = Self::peek_key(&self.main)?;
        let list = self.main.get_mut(&key)?;
        let device = list.pop_front(&mut self.next)?;
        self.dequeue_count += 1;
        if list.is_empty() {
            self.main.remove(&key);
        }
        Some((key, device))
    }

    pub fn get_delay_event(&mut self) -> Option<(EventKey, DeviceId)> {
        let key = Self::peek_key(&self.delay)?;
        let list = self.delay.get_mut(&key)?;
        let device = list.pop_front(&mut self.next)?;
        self.dequeue_count += 1;
        if list.is_empty() {
            self.delay.remove(&key);
        }
        Some((key, device))
    }

    /// Pop the next event overall, preferring the main queue per
    /// `is_next_main_queue`.
    pub fn get_event(&mut self) -> Option<(EventKey, DeviceId)> {
        if self.is_next_main_queue() {
            self.get_main_event()
        } else {
            self.get_delay_event()
        }
    }

    pub fn is_empty(&self) -> bool {
        Self::peek_key(&self.main).is_none() && Self::peek_key(&self.delay).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_queue_orders_by_key_ascending() {
        let mut q = EventQueue::new(4);
        q.add_event(EventKey(10), DeviceId::new(0), QueuePosition::MainBack);
        q.add_event(EventKey(5), DeviceId::new(1), QueuePosition::MainBack);
        let (k1, d1) = q.get_main_event().unwrap();
        assert_eq!(k1, EventKey(5));
        assert_eq!(d1, DeviceId::new(1));
        let (k2, d2) = q.get_main_event().unwrap();
        assert_eq!(k2, EventKey(10));
        assert_eq!(d2, DeviceId::new(0));
    }

    #[test]
    fn main_queue_preserves_fifo_within_key() {
        let mut q = EventQueue::new(4);
        q.add_event(EventKey(1), DeviceId::new(0), QueuePosition::MainBack);
        q.add_event(EventKey(1), DeviceId::new(1), QueuePosition::MainBack);
        assert_eq!(q.get_main_event().unwrap().1, DeviceId::new(0));
        assert_eq!(q.get_main_event().unwrap().1, DeviceId::new(1));
    }

    #[test]
    fn double_insert_panics() {
        let mut q = EventQueue::new(4);
        q.add_event(EventKey(1), DeviceId::new(0), QueuePosition::MainBack);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            q.add_event(EventKey(2), DeviceId::new(0), QueuePosition::MainBack);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn main_queue_wins_ties_over_delay() {
        let mut q = EventQueue::new(4);
        q.add_event(EventKey(5), DeviceId::new(0), QueuePosition::DelayBack);
        q.add_event(EventKey(5), DeviceId::new(1), QueuePosition::MainBack);
        assert!(q.is_next_main_queue());
        assert_eq!(q.get_event().unwrap().1, DeviceId::new(1));
    }

    #[test]
    fn delay_front_serviced_before_later_main_key() {
        let mut q = EventQueue::new(4);
        q.add_event(EventKey(10), DeviceId::new(0), QueuePosition::MainBack);
        q.add_event(EventKey(1), DeviceId::new(1), QueuePosition::DelayFront);
        assert!(!q.is_next_main_queue());
        assert_eq!(q.get_event().unwrap().1, DeviceId::new(1));
    }

    #[test]
    fn leak_map_dedupes_pair_regardless_of_order() {
        let mut leaks = LeakMap::new();
        assert!(leaks.add(NetId::new(3), NetId::new(7), Voltage::mv(0), Voltage::mv(1800), DeviceId::new(0)));
        assert!(!leaks.add(NetId::new(7), NetId::new(3), Voltage::mv(0), Voltage::mv(1800), DeviceId::new(1)));
        assert_eq!(leaks.len(), 1);
    }

    #[test]
    fn max_key_inverts_ordering() {
        let low = EventKey::for_max(Voltage::mv(1000));
        let high = EventKey::for_max(Voltage::mv(1800));
        assert!(high < low, "higher voltage should sort first under Max ordering");
    }
}

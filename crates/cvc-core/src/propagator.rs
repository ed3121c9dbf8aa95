//! Event-driven voltage propagation.
//!
//! Three independent passes — Min, Sim, Max — each seed their event queue
//! from the declared power nets and then drain it: dequeuing a net voltage,
//! walking every device touching that net, and (for MOS devices whose gate
//! is already known) computing the new voltage reaching the opposite
//! terminal, net of a Vth drop, before re-enqueuing.
//!
//! This module owns the three [`crate::virtual_net::VirtualNetVector`]s and
//! [`crate::queue::EventQueue`]s; [`crate::checker`] consumes the settled
//! voltages afterward.

use crate::device::{Device, DeviceType};
use crate::ids::{DeviceId, NetId, Resistance, Voltage};
use crate::power::{Interpretation, Power, PowerTable};
use crate::queue::{EventKey, EventQueue, QueuePosition};
use crate::virtual_net::VirtualNetVector;
use std::collections::HashMap;

/// Net voltages and propagation state for one interpretation.
pub struct InterpretationState {
    pub interp: Interpretation,
    pub virtual_nets: VirtualNetVector,
    pub queue: EventQueue,
    /// Settled voltage per net root, populated as events are dequeued.
    pub net_voltage: HashMap<NetId, Voltage>,
    /// Nets that settled to high impedance (no driving path found).
    pub hiz_nets: Vec<NetId>,
    /// Dequeue counter, used only to build the Sim interpretation's
    /// discovery-order event key (`EventKey::for_sim`).
    queue_time: u64,
}

impl InterpretationState {
    pub fn new(interp: Interpretation, net_count: usize, device_count: usize) -> Self {
        Self {
            interp,
            virtual_nets: VirtualNetVector::new(net_count),
            queue: EventQueue::new(device_count),
            net_voltage: HashMap::new(),
            hiz_nets: Vec::new(),
            queue_time: 0,
        }
    }

    fn voltage_of(&self, power: &Power) -> Voltage {
        match self.interp {
            Interpretation::Min => power.min_voltage,
            Interpretation::Sim => power.sim_voltage,
            Interpretation::Max => power.max_voltage,
        }
    }

    fn key_for(&self, voltage: Voltage, resistance: Resistance) -> EventKey {
        match self.interp {
            Interpretation::Min => EventKey::for_min(voltage),
            Interpretation::Sim => EventKey::for_sim(self.queue_time, resistance),
            Interpretation::Max => EventKey::for_max(voltage),
        }
    }

    /// Is this power active under this interpretation? A power with no
    /// active bits set at all drives every interpretation (the common
    /// case); `MIN_ACTIVE`/`MAX_ACTIVE` restrict a power to driving only
    /// that interpretation, and `MIN_IGNORE`/`MAX_IGNORE` explicitly
    /// exclude it (e.g. a supply that's powered down for Min but not Max).
    fn is_active(&self, power: &Power) -> bool {
        use crate::power::ActiveType;
        match self.interp {
            Interpretation::Min => {
                !power.active.contains(ActiveType::MIN_IGNORE)
                    && (!power.active.contains(ActiveType::MAX_ACTIVE) || power.active.contains(ActiveType::MIN_ACTIVE))
            }
            Interpretation::Max => {
                !power.active.contains(ActiveType::MAX_IGNORE)
                    && (!power.active.contains(ActiveType::MIN_ACTIVE) || power.active.contains(ActiveType::MAX_ACTIVE))
            }
            Interpretation::Sim => {
                !power.active.contains(ActiveType::MIN_IGNORE) || !power.active.contains(ActiveType::MAX_IGNORE)
            }
        }
    }

    /// Seed the queue: every declared power net active under this
    /// interpretation starts at its declared voltage, enqueued once (its
    /// own driving "device").
    pub fn seed(&mut self, powers: &PowerTable) {
        for power in powers.iter() {
            if !self.is_active(power) {
                continue;
            }
            let voltage = self.voltage_of(power);
            if voltage.is_unknown() {
                continue;
            }
            let (root, _) = self.virtual_nets.resolve(power.net_id);
            self.net_voltage.insert(root, voltage);
        }
    }

    /// Vth-drop adjustment applied to the voltage an NMOS/PMOS device
    /// passes through on dequeue: an NMOS pulling its drain from a gate
    /// at `gate_voltage` can only bring the drain up to `gate_voltage -
    /// vth`; a PMOS can only pull down to `gate_voltage - vth` (vth
    /// negative for PMOS in the model, so this still lowers the ceiling).
    ///
    /// A gate that's still unknown when its device is relaxed gets
    /// different treatment per interpretation: Min/Max assume the worst
    /// case (device conducting) so a floating gate that could leak is
    /// still caught; Sim reflects how the circuit would actually behave,
    /// where an uncontrolled gate means the device can't be assumed on.
    fn adjust_for_vth(&self, device: &Device, gate_voltage: Voltage, driven_voltage: Voltage) -> Voltage {
        if !Self::is_threshold_device(device) || driven_voltage.is_unknown() {
            return driven_voltage;
        }
        if gate_voltage.is_unknown() {
            return match self.interp {
                Interpretation::Sim => Voltage::UNKNOWN,
                Interpretation::Min | Interpretation::Max => driven_voltage,
            };
        }
        let ceiling = gate_voltage.value() as i64 - device.vth as i64;
        if device.is_pmos() {
            Voltage::mv(driven_voltage.value().max(ceiling as i32))
        } else {
            // NMOS and diode both pull their driven terminal down toward
            // the gate/anode voltage net of the threshold drop.
            Voltage::mv(driven_voltage.value().min(ceiling as i32))
        }
    }

    /// MOS, PMOS, and (by netlist convention) every `Diode` instance count
    /// as threshold devices: they regulate the voltage they pass on by a
    /// fixed `vth` drop rather than switching it through unchanged.
    fn is_threshold_device(device: &Device) -> bool {
        device.device_type.is_mos() || device.device_type == DeviceType::Diode
    }

    /// Detect a threshold-diode connection: gate tied to drain (or
    /// source), meaning the device behaves as a diode rather than a
    /// switch. A `Diode` device is always wired this way by netlist
    /// convention. These are deferred to the delay queue so an ordinary
    /// device at the same key resolves the net first; a simultaneous
    /// opposite-direction diode on the same key is then skipped rather
    /// than double-applying the Vth drop.
    fn is_threshold_diode(device: &Device) -> bool {
        Self::is_threshold_device(device) && (device.gate == device.drain || device.gate == device.source)
    }

    fn queue_position_for(device: &Device) -> QueuePosition {
        match device.device_type {
            DeviceType::Capacitor => QueuePosition::SkipQueue,
            DeviceType::Fuse if device.fuse_open => QueuePosition::SkipQueue,
            DeviceType::Fuse | DeviceType::Resistor => QueuePosition::DelayBack,
            _ if Self::is_threshold_diode(device) => QueuePosition::MosDiode,
            _ => QueuePosition::MainBack,
        }
    }

    /// Drain the queue, propagating voltages through every device until
    /// no more events remain. `devices_by_net` maps a (resolved) net root
    /// to the devices touching it.
    pub fn propagate(&mut self, devices: &[Device], devices_by_net: &HashMap<NetId, Vec<DeviceId>>, powers: &PowerTable) {
        let _ = powers; // consulted by `seed`, before this pass starts.
        let mut pending: Vec<(NetId, Voltage)> = self.net_voltage.iter().map(|(&n, &v)| (n, v)).collect();
        pending.sort_by_key(|(n, _)| n.value());
        for (net, voltage) in pending {
            self.enqueue_devices_on_net(net, voltage, devices, devices_by_net);
        }

        while let Some((key, device_id)) = self.queue.get_event() {
            self.queue_time += 1;
            self.relax_device(key, device_id, devices, devices_by_net);
        }
    }

    fn enqueue_devices_on_net(&mut self, net: NetId, voltage: Voltage, devices: &[Device], devices_by_net: &HashMap<NetId, Vec<DeviceId>>) {
        let Some(device_ids) = devices_by_net.get(&net) else { return };
        for &device_id in device_ids {
            let device = &devices[device_id.index()];
            let position = Self::queue_position_for(device);
            if position == QueuePosition::SkipQueue {
                continue;
            }
            if self.queue.is_queued(device_id) {
                continue;
            }
            let key = self.key_for(voltage, device.resistance);
            self.queue.add_event(key, device_id, position);
        }
    }

    fn relax_device(&mut self, key: EventKey, device_id: DeviceId, devices: &[Device], devices_by_net: &HashMap<NetId, Vec<DeviceId>>) {
        let device = &devices[device_id.index()];
        let (source_root, _) = self.virtual_nets.resolve(device.source);
        let (drain_root, _) = self.virtual_nets.resolve(device.drain);
        let (gate_root, _) = self.virtual_nets.resolve(device.gate);

        let gate_voltage = self.net_voltage.get(&gate_root).copied().unwrap_or(Voltage::UNKNOWN);
        let source_voltage = self.net_voltage.get(&source_root).copied().unwrap_or(Voltage::UNKNOWN);
        let drain_voltage = self.net_voltage.get(&drain_root).copied().unwrap_or(Voltage::UNKNOWN);

        // Whichever terminal is already known drives the other, net of
        // the device's Vth drop. If both are known the device is a closed
        // short between two already-settled nets: a candidate leak if
        // those nets aren't related powers.
        let (known_net, known_voltage, unknown_net) = match (source_voltage.is_known(), drain_voltage.is_known()) {
            (true, false) => (source_root, source_voltage, drain_root),
            (false, true) => (drain_root, drain_voltage, source_root),
            (true, true) => {
                if source_voltage != drain_voltage {
                    self.queue.leaks.add(source_root, drain_root, source_voltage, drain_voltage, device_id);
                }
                return;
            }
            (false, false) => return,
        };

        let mut new_voltage = known_voltage;
        let mut resistance = device.resistance;
        if Self::is_threshold_device(device) {
            // A threshold-diode connection (gate tied to drain or source)
            // regulates itself to Vgs == Vth: the gate voltage for the
            // drop calculation is the known terminal's own voltage, not a
            // separate net (the gate net *is* one of the two terminals
            // already resolved above, and is unresolved precisely because
            // it's the net being driven).
            let effective_gate_voltage = if Self::is_threshold_diode(device) {
                known_voltage
            } else {
                gate_voltage
            };
            new_voltage = self.adjust_for_vth(device, effective_gate_voltage, known_voltage);
            resistance = Resistance::milliohms(0);
        }

        if new_voltage.is_unknown() {
            return;
        }

        let existing = self.net_voltage.get(&unknown_net).copied();
        if existing == Some(new_voltage) {
            return;
        }
        if existing.is_some() {
            return;
        }

        self.virtual_nets.set(unknown_net, known_net, resistance);
        self.net_voltage.insert(unknown_net, new_voltage);
        self.enqueue_devices_on_net(unknown_net, new_voltage, devices, devices_by_net);
        let _ = key;
    }

    /// Any net never reached during propagation is high impedance: record
    /// it for the floating-gate / possible-HiZ checks.
    pub fn finalize_hiz(&mut self, net_ids: impl Iterator<Item = NetId>) {
        for net in net_ids {
            let (root, _) = self.virtual_nets.resolve(net);
            if !self.net_voltage.contains_key(&root) {
                self.hiz_nets.push(net);
            }
        }
    }

    pub fn voltage_of_net(&mut self, net: NetId) -> Voltage {
        let (root, _) = self.virtual_nets.resolve(net);
        self.net_voltage.get(&root).copied().unwrap_or(Voltage::UNKNOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::InstanceId;

    fn nmos(id: u32, source: u32, gate: u32, drain: u32) -> Device {
        let mut d = Device::new(DeviceId::new(id), format!("M{id}"), DeviceType::Nmos, InstanceId::new(0));
        d.source = NetId::new(source);
        d.gate = NetId::new(gate);
        d.drain = NetId::new(drain);
        d.bulk = NetId::new(source);
        d.vth = 700;
        d
    }

    #[test]
    fn switch_passes_source_voltage_minus_vth_to_drain() {
        let devices = vec![nmos(0, 0, 1, 2)];
        let mut by_net: HashMap<NetId, Vec<DeviceId>> = HashMap::new();
        by_net.entry(NetId::new(0)).or_default().push(DeviceId::new(0));
        by_net.entry(NetId::new(1)).or_default().push(DeviceId::new(0));
        by_net.entry(NetId::new(2)).or_default().push(DeviceId::new(0));

        let mut powers = PowerTable::new();
        let mut vdd = Power::new(NetId::new(0), "VDD");
        vdd.sim_voltage = Voltage::mv(1800);
        let mut gate = Power::new(NetId::new(1), "GATE_HIGH");
        gate.sim_voltage = Voltage::mv(1800);
        powers.insert(vdd);
        powers.insert(gate);

        let mut state = InterpretationState::new(Interpretation::Sim, 3, 1);
        state.seed(&powers);
        state.propagate(&devices, &by_net, &powers);

        let drain_voltage = state.voltage_of_net(NetId::new(2));
        assert_eq!(drain_voltage, Voltage::mv(1800 - 700));
    }

    #[test]
    fn mos_diode_settles_a_vth_below_its_source() {
        // gate tied to drain: net 1 is both the gate and the driven net.
        let devices = vec![nmos(0, 0, 1, 1)];
        let mut by_net: HashMap<NetId, Vec<DeviceId>> = HashMap::new();
        by_net.entry(NetId::new(0)).or_default().push(DeviceId::new(0));
        by_net.entry(NetId::new(1)).or_default().push(DeviceId::new(0));

        let mut powers = PowerTable::new();
        let mut vdd = Power::new(NetId::new(0), "VDD");
        vdd.max_voltage = Voltage::mv(1200);
        powers.insert(vdd);

        let mut state = InterpretationState::new(Interpretation::Max, 2, 1);
        state.seed(&powers);
        state.propagate(&devices, &by_net, &powers);

        assert_eq!(state.voltage_of_net(NetId::new(1)), Voltage::mv(1200 - 700));
    }

    #[test]
    fn floating_gate_does_not_conduct_under_sim_but_does_under_max() {
        let devices = vec![nmos(0, 0, 1, 2)];
        let mut by_net: HashMap<NetId, Vec<DeviceId>> = HashMap::new();
        by_net.entry(NetId::new(0)).or_default().push(DeviceId::new(0));
        by_net.entry(NetId::new(2)).or_default().push(DeviceId::new(0));

        let mut powers = PowerTable::new();
        let mut vdd = Power::new(NetId::new(0), "SRC");
        vdd.sim_voltage = Voltage::mv(0);
        vdd.max_voltage = Voltage::mv(0);
        powers.insert(vdd);

        let mut sim = InterpretationState::new(Interpretation::Sim, 3, 1);
        sim.seed(&powers);
        sim.propagate(&devices, &by_net, &powers);
        assert_eq!(sim.voltage_of_net(NetId::new(2)), Voltage::UNKNOWN);

        let mut max = InterpretationState::new(Interpretation::Max, 3, 1);
        max.seed(&powers);
        max.propagate(&devices, &by_net, &powers);
        assert_eq!(max.voltage_of_net(NetId::new(2)), Voltage::mv(0));
    }

    #[test]
    fn unreached_net_is_flagged_hiz() {
        let devices: Vec<Device> = Vec::new();
        let by_net: HashMap<NetId, Vec<DeviceId>> = HashMap::new();
        let powers = PowerTable::new();

        let mut state = InterpretationState::new(Interpretation::Sim, 2, 0);
        state.seed(&powers);
        state.propagate(&devices, &by_net, &powers);
        state.finalize_hiz([NetId::new(0), NetId::new(1)].into_iter());
        assert_eq!(state.hiz_nets.len(), 2);
    }

    #[test]
    fn resistor_merges_nets_and_passes_voltage_through_unchanged() {
        let mut resistor = Device::new(DeviceId::new(0), "R1", DeviceType::Resistor, InstanceId::new(0));
        resistor.source = NetId::new(0);
        resistor.drain = NetId::new(1);
        resistor.resistance = Resistance::milliohms(500);
        let devices = vec![resistor];
        let mut by_net: HashMap<NetId, Vec<DeviceId>> = HashMap::new();
        by_net.entry(NetId::new(0)).or_default().push(DeviceId::new(0));
        by_net.entry(NetId::new(1)).or_default().push(DeviceId::new(0));

        let mut powers = PowerTable::new();
        let mut vdd = Power::new(NetId::new(0), "VDD");
        vdd.sim_voltage = Voltage::mv(1800);
        powers.insert(vdd);

        let mut state = InterpretationState::new(Interpretation::Sim, 2, 1);
        state.seed(&powers);
        state.propagate(&devices, &by_net, &powers);

        assert_eq!(state.voltage_of_net(NetId::new(1)), Voltage::mv(1800));
        let (root, resistance) = state.virtual_nets.resolve(NetId::new(1));
        assert_eq!(root, NetId::new(0));
        assert_eq!(resistance.value(), 500);
    }

    #[test]
    fn open_fuse_never_enqueues_and_blocks_propagation() {
        let mut fuse = Device::new(DeviceId::new(0), "F1", DeviceType::Fuse, InstanceId::new(0));
        fuse.source = NetId::new(0);
        fuse.drain = NetId::new(1);
        fuse.fuse_open = true;
        let devices = vec![fuse];
        let mut by_net: HashMap<NetId, Vec<DeviceId>> = HashMap::new();
        by_net.entry(NetId::new(0)).or_default().push(DeviceId::new(0));
        by_net.entry(NetId::new(1)).or_default().push(DeviceId::new(0));

        let mut powers = PowerTable::new();
        let mut vdd = Power::new(NetId::new(0), "VDD");
        vdd.sim_voltage = Voltage::mv(1800);
        powers.insert(vdd);

        let mut state = InterpretationState::new(Interpretation::Sim, 2, 1);
        state.seed(&powers);
        state.propagate(&devices, &by_net, &powers);

        assert_eq!(state.voltage_of_net(NetId::new(1)), Voltage::UNKNOWN);
    }

    #[test]
    fn capacitor_is_never_enqueued_and_blocks_dc_propagation() {
        let mut cap = Device::new(DeviceId::new(0), "C1", DeviceType::Capacitor, InstanceId::new(0));
        cap.source = NetId::new(0);
        cap.drain = NetId::new(1);
        let devices = vec![cap];
        let mut by_net: HashMap<NetId, Vec<DeviceId>> = HashMap::new();
        by_net.entry(NetId::new(0)).or_default().push(DeviceId::new(0));
        by_net.entry(NetId::new(1)).or_default().push(DeviceId::new(0));

        let mut powers = PowerTable::new();
        let mut vdd = Power::new(NetId::new(0), "VDD");
        vdd.sim_voltage = Voltage::mv(1800);
        powers.insert(vdd);

        let mut state = InterpretationState::new(Interpretation::Sim, 2, 1);
        state.seed(&powers);
        state.propagate(&devices, &by_net, &powers);

        assert_eq!(state.voltage_of_net(NetId::new(1)), Voltage::UNKNOWN);
    }

    #[test]
    fn power_marked_min_ignore_is_not_seeded_under_min_interpretation() {
        let mut powers = PowerTable::new();
        let mut vdd = Power::new(NetId::new(0), "VDD");
        vdd.min_voltage = Voltage::mv(1800);
        vdd.sim_voltage = Voltage::mv(1800);
        vdd.max_voltage = Voltage::mv(1800);
        vdd.active |= crate::power::ActiveType::MIN_IGNORE;
        powers.insert(vdd);

        let mut min = InterpretationState::new(Interpretation::Min, 1, 0);
        min.seed(&powers);
        assert_eq!(min.voltage_of_net(NetId::new(0)), Voltage::UNKNOWN);

        let mut sim = InterpretationState::new(Interpretation::Sim, 1, 0);
        sim.seed(&powers);
        assert_eq!(sim.voltage_of_net(NetId::new(0)), Voltage::mv(1800));
    }
}

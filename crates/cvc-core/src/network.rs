//! The flattened netlist container: owns all nets, devices, and the power
//! table, and drives the three propagation passes and the error checker.

use crate::checker::{Checker, ErrorEvent};
use crate::device::{ConnectionCount, Device, DeviceType, Net, SourceDrainType};
use crate::diagnostics::Diagnostics;
use crate::ids::{DeviceId, NetId};
use crate::power::{Interpretation, PowerTable};
use crate::propagator::InterpretationState;
use std::collections::HashMap;
use std::fmt;

/// A fully flattened netlist, ready for propagation and checking.
pub struct Network {
    pub nets: Vec<Net>,
    pub devices: Vec<Device>,
    pub powers: PowerTable,
}

impl Network {
    pub fn new() -> Self {
        Self {
            nets: Vec::new(),
            devices: Vec::new(),
            powers: PowerTable::new(),
        }
    }

    pub fn add_net(&mut self, net: Net) -> NetId {
        let id = NetId::new(self.nets.len() as u32);
        let mut net = net;
        net.id = id;
        net.equivalent_net = id;
        self.nets.push(net);
        id
    }

    pub fn add_device(&mut self, device: Device) -> DeviceId {
        let id = DeviceId::new(self.devices.len() as u32);
        let mut device = device;
        device.id = id;
        self.devices.push(device);
        id
    }

    /// Structural checks that don't need propagation: dangling terminal
    /// references, devices with no terminals at all, duplicate net names
    /// within the same subcircuit instance.
    pub fn validate_into(&self, diagnostics: &mut Diagnostics) {
        let net_count = self.nets.len() as u32;
        for device in &self.devices {
            for (label, terminal) in [
                ("source", device.source),
                ("gate", device.gate),
                ("drain", device.drain),
                ("bulk", device.bulk),
            ] {
                if terminal.is_unknown() {
                    continue;
                }
                if terminal.value() >= net_count {
                    diagnostics.add_error_with_entity(
                        "reference",
                        &format!("{label} terminal references non-existent net {terminal}"),
                        &device.name,
                    );
                }
            }
        }

        let mut seen: HashMap<(u32, &str), usize> = HashMap::new();
        for net in &self.nets {
            let key = (net.subcircuit.value(), net.name.as_str());
            *seen.entry(key).or_insert(0) += 1;
        }
        for ((_, name), count) in seen {
            if count > 1 {
                diagnostics.add_warning_with_entity(
                    "validation",
                    "duplicate net name within the same subcircuit instance",
                    name,
                );
            }
        }
    }

    fn devices_by_net(&self) -> HashMap<NetId, Vec<DeviceId>> {
        let mut map: HashMap<NetId, Vec<DeviceId>> = HashMap::new();
        for device in &self.devices {
            for terminal in [device.source, device.gate, device.drain, device.bulk] {
                if !terminal.is_unknown() {
                    map.entry(terminal).or_default().push(device.id);
                }
            }
        }
        map
    }

    /// Tally, per net, how many source/drain/gate/bulk terminals land on it
    /// and which device kinds drive its source/drain terminals. Feeds the
    /// possible-HiZ transmission-gate/tristate-inverter test, which needs a
    /// gate net's fan-out shape without re-walking every device.
    pub fn tally_connections(&mut self) {
        for net in &mut self.nets {
            net.connections = ConnectionCount::default();
        }
        for device in &self.devices {
            if !device.source.is_unknown() {
                let counts = &mut self.nets[device.source.index()].connections;
                counts.source_count += 1;
                counts.source_drain_type |= Self::source_drain_bit(device);
            }
            if !device.drain.is_unknown() {
                let counts = &mut self.nets[device.drain.index()].connections;
                counts.drain_count += 1;
                counts.source_drain_type |= Self::source_drain_bit(device);
            }
            if !device.gate.is_unknown() {
                self.nets[device.gate.index()].connections.gate_count += 1;
            }
            if !device.bulk.is_unknown() {
                self.nets[device.bulk.index()].connections.bulk_count += 1;
            }
        }
    }

    fn source_drain_bit(device: &Device) -> SourceDrainType {
        match device.device_type {
            DeviceType::Nmos => SourceDrainType::NMOS,
            DeviceType::Pmos => SourceDrainType::PMOS,
            DeviceType::Resistor => SourceDrainType::RESISTOR,
            DeviceType::Fuse if device.fuse_open => SourceDrainType::FUSE_OFF,
            DeviceType::Fuse => SourceDrainType::FUSE_ON,
            _ => SourceDrainType::empty(),
        }
    }

    /// Detect two device-level logic patterns used by the error checker:
    ///
    /// - A CMOS inverter/buffer: an NMOS and a PMOS sharing both a gate net
    ///   and a drain (output) net. Records the relation on the output
    ///   net's `inverter_of`/`inverter_same_logic`.
    /// - A transmission-gate/tristate-inverter pair: an NMOS and a PMOS
    ///   sharing their full source/drain pair but driven by distinct gate
    ///   nets. Records the companion gate net on each device so the
    ///   checker can compare the two control nets' settled logic.
    pub fn detect_inverters(&mut self) {
        let mut by_gate: HashMap<NetId, Vec<usize>> = HashMap::new();
        let mut by_source_drain_pair: HashMap<(NetId, NetId), Vec<usize>> = HashMap::new();
        for (idx, device) in self.devices.iter().enumerate() {
            if !device.device_type.is_mos() {
                continue;
            }
            by_gate.entry(device.gate).or_default().push(idx);
            let pair = if device.source.value() <= device.drain.value() {
                (device.source, device.drain)
            } else {
                (device.drain, device.source)
            };
            by_source_drain_pair.entry(pair).or_default().push(idx);
        }

        for idxs in by_gate.values() {
            if idxs.len() != 2 {
                continue;
            }
            let (a, b) = (idxs[0], idxs[1]);
            let (da, db) = (&self.devices[a], &self.devices[b]);
            if da.device_type == db.device_type || da.drain != db.drain {
                continue;
            }
            let output = da.drain;
            let input = da.gate;
            if !output.is_unknown() {
                let net = &mut self.nets[output.index()];
                net.inverter_of = Some(input);
                net.inverter_same_logic = false;
            }
        }

        for idxs in by_source_drain_pair.values() {
            if idxs.len() != 2 {
                continue;
            }
            let (a, b) = (idxs[0], idxs[1]);
            let (gate_a, gate_b) = {
                let (da, db) = (&self.devices[a], &self.devices[b]);
                if da.device_type == db.device_type || da.gate == db.gate {
                    continue;
                }
                (da.gate, db.gate)
            };
            self.devices[a].companion_gate = Some(gate_b);
            self.devices[b].companion_gate = Some(gate_a);
        }
    }

    /// Run all three propagation passes and return their settled state.
    #[tracing::instrument(level = "debug", skip(self), fields(nets = self.nets.len(), devices = self.devices.len()))]
    pub fn propagate(&self) -> PropagationResult {
        let devices_by_net = self.devices_by_net();
        let net_count = self.nets.len();
        let device_count = self.devices.len();

        let mut min = InterpretationState::new(Interpretation::Min, net_count, device_count);
        let mut sim = InterpretationState::new(Interpretation::Sim, net_count, device_count);
        let mut max = InterpretationState::new(Interpretation::Max, net_count, device_count);

        for state in [&mut min, &mut sim, &mut max] {
            state.seed(&self.powers);
            state.propagate(&self.devices, &devices_by_net, &self.powers);
            state.finalize_hiz(self.nets.iter().map(|n| n.id));
            tracing::debug!(interpretation = ?state.interp, hiz_nets = state.hiz_nets.len(), "propagation pass settled");
        }

        PropagationResult { min, sim, max }
    }

    /// Run the post-propagation error checker against a settled
    /// propagation result. Runs the connection-tally and inverter-pattern
    /// detection passes first, since the checker needs both.
    pub fn check(&mut self, result: &mut PropagationResult, overvoltage_limit_mv: i32, per_kind_limit: usize) -> Vec<ErrorEvent> {
        self.tally_connections();
        self.detect_inverters();

        let mut checker = Checker::new(overvoltage_limit_mv, per_kind_limit);
        for device in &self.devices {
            let (gate_is_analog, gate_source_drain_count) = if device.gate.is_unknown() {
                (false, 0)
            } else {
                let gate_net = &self.nets[device.gate.index()];
                (
                    gate_net.status.contains(crate::device::NetStatus::ANALOG),
                    gate_net.connections.source_drain_total(),
                )
            };
            let gate_is_transmission_pair = device.companion_gate.is_some();
            let gate_opposite_logic = device
                .companion_gate
                .map(|companion| {
                    let own = result.sim.voltage_of_net(device.gate);
                    let other = result.sim.voltage_of_net(companion);
                    !(own.is_known() && other.is_known() && own.value() == other.value())
                })
                .unwrap_or(false);

            let conn = crate::connection::FullConnection {
                device,
                source_net: device.source,
                gate_net: device.gate,
                drain_net: device.drain,
                bulk_net: device.bulk,
                min_source_voltage: result.min.voltage_of_net(device.source),
                sim_source_voltage: result.sim.voltage_of_net(device.source),
                max_source_voltage: result.max.voltage_of_net(device.source),
                min_gate_voltage: result.min.voltage_of_net(device.gate),
                sim_gate_voltage: result.sim.voltage_of_net(device.gate),
                max_gate_voltage: result.max.voltage_of_net(device.gate),
                min_drain_voltage: result.min.voltage_of_net(device.drain),
                sim_drain_voltage: result.sim.voltage_of_net(device.drain),
                max_drain_voltage: result.max.voltage_of_net(device.drain),
                min_bulk_voltage: result.min.voltage_of_net(device.bulk),
                sim_bulk_voltage: result.sim.voltage_of_net(device.bulk),
                max_bulk_voltage: result.max.voltage_of_net(device.bulk),
                source_power: self.powers.get(device.source),
                gate_power: self.powers.get(device.gate),
                drain_power: self.powers.get(device.drain),
                bulk_power: self.powers.get(device.bulk),
                min_leak_voltage: crate::ids::Voltage::UNKNOWN,
                max_leak_voltage: crate::ids::Voltage::UNKNOWN,
                gate_is_analog,
                gate_source_drain_count,
                gate_is_transmission_pair,
                gate_opposite_logic,
                max_vgs_mv: device.max_vgs_mv,
                max_vds_mv: device.max_vds_mv,
                max_vbs_mv: device.max_vbs_mv,
                max_vbg_mv: device.max_vbg_mv,
            };
            checker.check_overvoltage(&conn);
            checker.check_forward_diode(&conn);
            checker.check_floating_gate(&conn);
            checker.check_gate_source_leak(&conn);
            checker.check_opposite_logic_mismatch(&conn);
            checker.check_ldd_direction(&conn, device.is_ldd);
        }

        for net in &self.nets {
            let Some(input) = net.inverter_of else { continue };
            let Some(device) = self.devices.iter().find(|d| d.touches(net.id)) else { continue };
            let input_voltage = result.sim.voltage_of_net(input);
            let output_voltage = result.sim.voltage_of_net(net.id);
            checker.check_inverter_mismatch(device, input_voltage, output_voltage, net.inverter_same_logic);
        }

        // Leaks are discovered per-interpretation during propagation
        // (devices shorting two already-settled nets); the Sim pass is the
        // one whose voltages describe the circuit's actual operating
        // condition, so it's the pass checked for unrelated-power shorts.
        for (key, &(voltage_a, voltage_b, device_id)) in result.sim.queue.leaks.iter() {
            if self.powers.relates(key.0, key.1, false) {
                continue;
            }
            if let Some(magnitude) = voltage_a - voltage_b {
                let device = &self.devices[device_id.index()];
                checker.check_leak(device, magnitude.abs());
            }
        }

        for power in self.powers.iter() {
            let device = match self.devices.iter().find(|d| d.source == power.net_id || d.drain == power.net_id || d.gate == power.net_id) {
                Some(d) => d,
                None => continue,
            };
            for (expected_expr, interp, state) in [
                (&power.expected_min, Interpretation::Min, &mut result.min),
                (&power.expected_sim, Interpretation::Sim, &mut result.sim),
                (&power.expected_max, Interpretation::Max, &mut result.max),
            ] {
                let Some(expected_expr) = expected_expr else { continue };
                let expected_voltage = self.powers.evaluate_expression(expected_expr, interp);
                let actual = state.voltage_of_net(power.net_id);
                if expected_voltage.is_known() && actual.is_known() {
                    checker.check_expected_voltage(device, &power.signal, expected_voltage.value(), actual.value());
                }
            }
        }
        checker.events
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            net_count: self.nets.len(),
            device_count: self.devices.len(),
            power_count: self.powers.iter().count(),
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PropagationResult {
    pub min: InterpretationState,
    pub sim: InterpretationState,
    pub max: InterpretationState,
}

#[derive(Debug, Clone, Copy)]
pub struct NetworkStats {
    pub net_count: usize,
    pub device_count: usize,
    pub power_count: usize,
}

impl fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nets, {} devices, {} power definitions",
            self.net_count, self.device_count, self.power_count
        )
    }
}

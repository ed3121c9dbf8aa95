//! Per-device terminal snapshots: a device's four terminals resolved to
//! their equivalence roots and (once propagation has run) their min/sim/max
//! voltages. The error checker operates entirely on these snapshots rather
//! than walking the netlist graph directly.

use crate::device::{Device, DeviceType};
use crate::ids::{DeviceId, NetId, Resistance, Voltage};
use crate::power::Power;
use bitflags::bitflags;

bitflags! {
    /// Per-terminal, per-interpretation validity: a terminal's Min (or
    /// Max) voltage counts as valid when it's known, isn't a net the power
    /// file explicitly allows to float, and doesn't invert the min<=max
    /// ordering against its counterpart interpretation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ValidityFlags: u32 {
        const MIN_GATE   = 1 << 0;
        const MIN_SOURCE = 1 << 1;
        const MIN_DRAIN  = 1 << 2;
        const MIN_BULK   = 1 << 3;
        const MAX_GATE   = 1 << 4;
        const MAX_SOURCE = 1 << 5;
        const MAX_DRAIN  = 1 << 6;
        const MAX_BULK   = 1 << 7;
    }
}

/// A device's four terminals resolved to their virtual-net roots, used
/// during propagation (before voltages are fully known).
#[derive(Debug, Clone, Copy)]
pub struct Connection {
    pub device_id: DeviceId,
    pub source_net: NetId,
    pub gate_net: NetId,
    pub drain_net: NetId,
    pub bulk_net: NetId,
    pub resistance: Resistance,
}

impl Connection {
    pub fn from_device(device: &Device, resolve: impl Fn(NetId) -> (NetId, Resistance)) -> Self {
        let (source_net, source_r) = resolve(device.source);
        let (gate_net, _) = resolve(device.gate);
        let (drain_net, drain_r) = resolve(device.drain);
        let (bulk_net, _) = resolve(device.bulk);
        Self {
            device_id: device.id,
            source_net,
            gate_net,
            drain_net,
            bulk_net,
            resistance: {
                let mut total = source_r;
                total.add_saturating(drain_r);
                total
            },
        }
    }

    pub fn is_unknown_gate_voltage(&self, gate_voltage: Voltage) -> bool {
        gate_voltage.is_unknown()
    }
}

/// Full per-terminal snapshot used by the post-propagation error checker:
/// resolved nets, voltages under all three interpretations, and the power
/// definition driving each terminal (if any).
#[derive(Debug, Clone)]
pub struct FullConnection<'a> {
    pub device: &'a Device,

    pub source_net: NetId,
    pub gate_net: NetId,
    pub drain_net: NetId,
    pub bulk_net: NetId,

    pub min_source_voltage: Voltage,
    pub sim_source_voltage: Voltage,
    pub max_source_voltage: Voltage,

    pub min_gate_voltage: Voltage,
    pub sim_gate_voltage: Voltage,
    pub max_gate_voltage: Voltage,

    pub min_drain_voltage: Voltage,
    pub sim_drain_voltage: Voltage,
    pub max_drain_voltage: Voltage,

    pub min_bulk_voltage: Voltage,
    pub sim_bulk_voltage: Voltage,
    pub max_bulk_voltage: Voltage,

    pub source_power: Option<&'a Power>,
    pub gate_power: Option<&'a Power>,
    pub drain_power: Option<&'a Power>,
    pub bulk_power: Option<&'a Power>,

    /// Leak voltages computed during the two-pass leak-voltage-set step
    /// the min/max the source-drain path would settle to if this
    /// device were the only leak path from source to drain.
    pub min_leak_voltage: Voltage,
    pub max_leak_voltage: Voltage,

    /// Is the gate net marked analog (`NetStatus::ANALOG`)? Suppresses the
    /// gate-vs-source/drain leak check, which is meaningless on a node
    /// that's expected to sit at an arbitrary intermediate voltage.
    pub gate_is_analog: bool,
    /// How many source/drain terminals land on this device's gate net —
    /// a transmission gate or tristate inverter's control net is itself a
    /// source/drain terminal of the companion device, which `is_possible_hiz`
    /// needs to know to avoid flagging a deliberately shared control node.
    pub gate_source_drain_count: u32,
    /// Is this device one half of a transmission-gate/tristate-inverter
    /// pair (an NMOS and PMOS sharing a gate net, in parallel on the same
    /// source/drain pair)?
    pub gate_is_transmission_pair: bool,
    /// Within that pair, do the two gates carry opposite logic (a
    /// conventional transmission gate, normal and inverted enable) rather
    /// than the same logic (a design error)?
    pub gate_opposite_logic: bool,

    /// Per-model overvoltage ceilings (mV), falling back to the checker's
    /// shared default when a model doesn't declare one.
    pub max_vgs_mv: Option<i32>,
    pub max_vds_mv: Option<i32>,
    pub max_vbs_mv: Option<i32>,
    pub max_vbg_mv: Option<i32>,
}

impl<'a> FullConnection<'a> {
    /// Rough current estimate through the source-drain path, used by the
    /// "estimated" calculation-type fallback when no exact voltage
    /// can be derived: `|Vgs - Vth| / max(resistance, 1)`, zero if the gate
    /// voltage can't turn the device on.
    pub fn estimated_current(&self) -> Option<i64> {
        let vgs = (self.sim_gate_voltage - self.sim_source_voltage)?;
        let vth = self.device.vth as i64;
        let overdrive = (vgs - vth).abs();
        if overdrive <= 0 {
            return Some(0);
        }
        let r = self.device.resistance.value().max(1) as i64;
        Some(overdrive / r)
    }

    /// A conservative lower bound on current, using the min/max voltage
    /// spread instead of the nominal (sim) values — the worst case the
    /// device could still be driving given interpretation uncertainty.
    pub fn estimated_minimum_current(&self) -> Option<i64> {
        let vgs = (self.max_gate_voltage - self.min_source_voltage)
            .or((self.min_gate_voltage - self.max_source_voltage))?;
        let vth = self.device.vth as i64;
        let overdrive = (vgs - vth).abs();
        if overdrive <= 0 {
            return Some(0);
        }
        let r = self.device.resistance.value().max(1) as i64;
        Some(overdrive / r)
    }

    /// A capacitor wired gate-to-bulk on the same net as a MOSFET's
    /// source/drain, used as a charge pump. The checker relaxes HiZ/Vgs
    /// warnings for these since bootstrapped nodes legitimately float
    /// between pump phases.
    pub fn is_pump_capacitor(&self) -> bool {
        self.device.device_type == DeviceType::Capacitor && self.gate_net == self.bulk_net
    }

    /// Overvoltage check for Vgs/Vds/Vbs/Vbg, for the min/max
    /// interpretations. Each pair uses its model-declared ceiling when one
    /// was parsed, falling back to `default_limit_mv`. Returns the
    /// worst-case magnitude for any pair that exceeds its limit.
    pub fn check_terminal_min_max_voltages(&self, default_limit_mv: i32) -> Vec<(&'static str, i64)> {
        let flags = self.compute_validity_flags();
        let both_valid = |a: ValidityFlags, b: ValidityFlags| {
            flags.intersects(a | ValidityFlags::from_bits_truncate(a.bits() << 4))
                && flags.intersects(b | ValidityFlags::from_bits_truncate(b.bits() << 4))
        };
        let mut violations = Vec::new();
        let pairs: [(&'static str, Option<i64>, Option<i64>, Option<i32>, bool); 4] = [
            (
                "Vgs",
                (self.max_gate_voltage - self.min_source_voltage),
                (self.min_gate_voltage - self.max_source_voltage),
                self.max_vgs_mv,
                both_valid(ValidityFlags::MIN_GATE, ValidityFlags::MIN_SOURCE),
            ),
            (
                "Vds",
                (self.max_drain_voltage - self.min_source_voltage),
                (self.min_drain_voltage - self.max_source_voltage),
                self.max_vds_mv,
                both_valid(ValidityFlags::MIN_DRAIN, ValidityFlags::MIN_SOURCE),
            ),
            (
                "Vbs",
                (self.max_bulk_voltage - self.min_source_voltage),
                (self.min_bulk_voltage - self.max_source_voltage),
                self.max_vbs_mv,
                both_valid(ValidityFlags::MIN_BULK, ValidityFlags::MIN_SOURCE),
            ),
            (
                "Vbg",
                (self.max_bulk_voltage - self.min_gate_voltage),
                (self.min_bulk_voltage - self.max_gate_voltage),
                self.max_vbg_mv,
                both_valid(ValidityFlags::MIN_BULK, ValidityFlags::MIN_GATE),
            ),
        ];
        for (name, high, low, model_limit, terminals_valid) in pairs {
            if !terminals_valid {
                continue;
            }
            let worst = high
                .into_iter()
                .chain(low)
                .map(|v| v.abs())
                .max();
            let limit_mv = model_limit.unwrap_or(default_limit_mv);
            if let Some(worst) = worst {
                if worst > limit_mv as i64 {
                    violations.push((name, worst));
                }
            }
        }
        violations
    }

    /// Sim-interpretation consistency check: the nominal Vgs should never
    /// exceed the limit either, independent of min/max spread.
    pub fn check_terminal_sim_voltages(&self, limit_mv: i32) -> Option<i64> {
        let vgs = (self.sim_gate_voltage - self.sim_source_voltage)?;
        (vgs.abs() > limit_mv as i64).then_some(vgs)
    }

    /// True when the gate is not driven by any known power/input and the
    /// device could plausibly be left floating (a candidate HiZ warning
    /// rather than a hard error) — unless it's one half of a
    /// transmission-gate/tristate-inverter pair whose control nets are
    /// expected to carry opposite logic and float together by design.
    pub fn is_possible_hiz(&self) -> bool {
        self.sim_gate_voltage.is_unknown()
            && self.gate_power.is_none()
            && !(self.gate_is_transmission_pair && self.gate_opposite_logic)
    }

    /// Collapse per-terminal voltage validity into a bitmask: a terminal's
    /// Min (or Max) bit is set when that voltage is known, isn't a net the
    /// power file explicitly allows to float, and doesn't cross the
    /// min<=max ordering against its counterpart.
    pub fn compute_validity_flags(&self) -> ValidityFlags {
        let mut flags = ValidityFlags::empty();
        let terminals: [(ValidityFlags, ValidityFlags, Voltage, Voltage, Option<&Power>); 4] = [
            (ValidityFlags::MIN_GATE, ValidityFlags::MAX_GATE, self.min_gate_voltage, self.max_gate_voltage, self.gate_power),
            (ValidityFlags::MIN_SOURCE, ValidityFlags::MAX_SOURCE, self.min_source_voltage, self.max_source_voltage, self.source_power),
            (ValidityFlags::MIN_DRAIN, ValidityFlags::MAX_DRAIN, self.min_drain_voltage, self.max_drain_voltage, self.drain_power),
            (ValidityFlags::MIN_BULK, ValidityFlags::MAX_BULK, self.min_bulk_voltage, self.max_bulk_voltage, self.bulk_power),
        ];
        for (min_flag, max_flag, min_v, max_v, power) in terminals {
            let allows_hiz = power.map(|p| p.allows_hiz()).unwrap_or(false);
            let ordering_ok = match (min_v.is_known(), max_v.is_known()) {
                (true, true) => min_v.value() <= max_v.value(),
                _ => true,
            };
            if !ordering_ok || allows_hiz {
                continue;
            }
            if min_v.is_known() {
                flags |= min_flag;
            }
            if max_v.is_known() {
                flags |= max_flag;
            }
        }
        flags
    }
}

//! Post-propagation static checks: overvoltage, forward diodes,
//! floating/possible-HiZ gates, LDD direction, inverter and
//! opposite-logic-net consistency, and expected-voltage mismatches.
//!
//! Every check emits an [`ErrorEvent`] rather than failing the run; the
//! checker sweeps every device once per error class so one badly-modeled
//! net doesn't stop the rest of the circuit from being checked.

use crate::connection::FullConnection;
use crate::device::{Device, DeviceType};
use crate::ids::DeviceId;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    GateOvervoltage,
    DrainSourceOvervoltage,
    BulkOvervoltage,
    ForwardDiode,
    FloatingGate,
    PossibleHiz,
    LddDirection,
    InverterMismatch,
    OppositeLogicMismatch,
    NmosPossibleLeak,
    PmosPossibleLeak,
    ExpectedVoltageMismatch,
    Leak,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::GateOvervoltage => "gate oxide overvoltage",
            ErrorKind::DrainSourceOvervoltage => "drain-source overvoltage",
            ErrorKind::BulkOvervoltage => "bulk overvoltage",
            ErrorKind::ForwardDiode => "forward-biased diode",
            ErrorKind::FloatingGate => "floating gate",
            ErrorKind::PossibleHiz => "possible high impedance",
            ErrorKind::LddDirection => "LDD direction error",
            ErrorKind::InverterMismatch => "inverter input/output mismatch",
            ErrorKind::OppositeLogicMismatch => "opposite logic net mismatch",
            ErrorKind::NmosPossibleLeak => "NMOS gate-source possible leak",
            ErrorKind::PmosPossibleLeak => "PMOS gate-source possible leak",
            ErrorKind::ExpectedVoltageMismatch => "expected voltage mismatch",
            ErrorKind::Leak => "leak path between unrelated powers",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub device_id: DeviceId,
    pub device_name: String,
    pub detail: String,
}

/// Per-device and per-circuit error counters used to throttle repeated
/// reports of the same error class — a single misdesigned cell instanced
/// thousands of times should not produce thousands of identical lines.
#[derive(Debug, Default)]
pub struct ErrorThrottle {
    per_kind_total: HashMap<ErrorKind, usize>,
    /// Maximum reports for a single error kind before further instances
    /// are counted but not emitted.
    limit: usize,
}

impl ErrorThrottle {
    pub fn new(limit: usize) -> Self {
        Self {
            per_kind_total: HashMap::new(),
            limit,
        }
    }

    /// Returns true if this occurrence should be emitted (under the
    /// limit); always increments the running total regardless.
    fn admit(&mut self, kind: ErrorKind) -> bool {
        let count = self.per_kind_total.entry(kind).or_insert(0);
        *count += 1;
        *count <= self.limit
    }

    pub fn total_for(&self, kind: ErrorKind) -> usize {
        self.per_kind_total.get(&kind).copied().unwrap_or(0)
    }
}

pub struct Checker {
    pub throttle: ErrorThrottle,
    pub events: Vec<ErrorEvent>,
    /// Overvoltage limit in mV, loaded from the model/power file
    /// (`cvcOvervoltageLimit` equivalent).
    pub overvoltage_limit_mv: i32,
}

impl Checker {
    pub fn new(overvoltage_limit_mv: i32, per_kind_limit: usize) -> Self {
        Self {
            throttle: ErrorThrottle::new(per_kind_limit),
            events: Vec::new(),
            overvoltage_limit_mv,
        }
    }

    fn emit(&mut self, kind: ErrorKind, device: &Device, detail: String) {
        if self.throttle.admit(kind) {
            tracing::debug!(device = %device.name, kind = kind.label(), %detail, "rule violation");
            self.events.push(ErrorEvent {
                kind,
                device_id: device.id,
                device_name: device.name.clone(),
                detail,
            });
        } else {
            tracing::trace!(device = %device.name, kind = kind.label(), "rule violation suppressed by throttle");
        }
    }

    /// Vgs/Vds/Vbs/Vbg overvoltage sweep for one device.
    pub fn check_overvoltage(&mut self, conn: &FullConnection) {
        if conn.is_pump_capacitor() {
            return;
        }
        for (name, magnitude) in conn.check_terminal_min_max_voltages(self.overvoltage_limit_mv) {
            let kind = match name {
                "Vgs" => ErrorKind::GateOvervoltage,
                "Vds" => ErrorKind::DrainSourceOvervoltage,
                _ => ErrorKind::BulkOvervoltage,
            };
            self.emit(
                kind,
                conn.device,
                format!("{name} = {magnitude}mV exceeds limit {}mV", self.overvoltage_limit_mv),
            );
        }
    }

    /// A diode device forward-biased under the Sim interpretation: Vf
    /// (anode minus cathode, modeled here as gate minus source) positive
    /// beyond the device's threshold.
    pub fn check_forward_diode(&mut self, conn: &FullConnection) {
        if conn.device.device_type != DeviceType::Diode {
            return;
        }
        let Some(vf) = conn.check_terminal_sim_voltages(conn.device.vth) else {
            return;
        };
        if vf > conn.device.vth as i64 {
            self.emit(
                ErrorKind::ForwardDiode,
                conn.device,
                format!("forward voltage {vf}mV exceeds {}mV", conn.device.vth),
            );
        }
    }

    /// A MOS gate that settled to unknown voltage under Sim: either a
    /// genuinely floating node (error) or a legitimate HiZ node the power
    /// file declared as allowed (warning-level, handled by the caller
    /// checking `gate_power.map(Power::allows_hiz)`).
    pub fn check_floating_gate(&mut self, conn: &FullConnection) {
        if !conn.device.device_type.is_mos() {
            return;
        }
        if !conn.is_possible_hiz() {
            return;
        }
        let kind = if conn.gate_power.map(|p| p.allows_hiz()).unwrap_or(false) {
            ErrorKind::PossibleHiz
        } else {
            ErrorKind::FloatingGate
        };
        self.emit(kind, conn.device, format!("gate net {} has no driving source", conn.gate_net));
    }

    /// LDD (lightly-doped drain) devices are asymmetric: source and drain
    /// are not interchangeable the way an ordinary MOSFET's are. Flag a
    /// device whose modeled source terminal carries a higher voltage than
    /// its drain under Sim for an NMOS (or lower, for a PMOS) — current
    /// would flow the wrong way through the graded junction.
    pub fn check_ldd_direction(&mut self, conn: &FullConnection, is_ldd: bool) {
        if !is_ldd || !conn.device.device_type.is_mos() {
            return;
        }
        let (Some(source), Some(drain)) = (conn.sim_source_voltage.is_known().then_some(conn.sim_source_voltage), conn.sim_drain_voltage.is_known().then_some(conn.sim_drain_voltage)) else {
            return;
        };
        let reversed = if conn.device.is_nmos() {
            source.value() > drain.value()
        } else {
            source.value() < drain.value()
        };
        if reversed {
            self.emit(
                ErrorKind::LddDirection,
                conn.device,
                format!("source {source} drain {drain} violates LDD orientation"),
            );
        }
    }

    /// A device's gate held within one threshold voltage of its source
    /// under Sim: the channel is not cleanly off, so the "off" device may
    /// still conduct a sub-threshold leak current.
    pub fn check_gate_source_leak(&mut self, conn: &FullConnection) {
        if !conn.device.device_type.is_mos() || conn.gate_is_analog {
            return;
        }
        let Some(vgs) = conn.sim_gate_voltage - conn.sim_source_voltage else {
            return;
        };
        let vth = conn.device.vth as i64;
        if conn.device.is_nmos() {
            if vgs > 0 && vgs < vth {
                self.emit(
                    ErrorKind::NmosPossibleLeak,
                    conn.device,
                    format!("Vgs {vgs}mV below Vth {vth}mV leaves the channel partially on"),
                );
            }
        } else if conn.device.is_pmos() && vgs < 0 && -vgs < vth {
            self.emit(
                ErrorKind::PmosPossibleLeak,
                conn.device,
                format!("Vgs {vgs}mV above -Vth {vth}mV leaves the channel partially on"),
            );
        }
    }

    /// A net marked as the logical output of an inverter/buffer
    /// (`Net::inverter_of`) whose Sim voltage doesn't match the expected
    /// same-logic (buffer) or opposite-logic (inverter) relationship to
    /// its input.
    pub fn check_inverter_mismatch(
        &mut self,
        device: &Device,
        input_voltage: crate::ids::Voltage,
        output_voltage: crate::ids::Voltage,
        same_logic: bool,
    ) {
        if !input_voltage.is_known() || !output_voltage.is_known() {
            return;
        }
        let observed_same = input_voltage.value() == output_voltage.value();
        if observed_same != same_logic {
            self.emit(
                ErrorKind::InverterMismatch,
                device,
                format!(
                    "input {input_voltage} output {output_voltage}: expected {} logic",
                    if same_logic { "same" } else { "opposite" }
                ),
            );
        }
    }

    /// A transmission-gate/tristate-inverter pair (an NMOS and PMOS sharing
    /// a source/drain pair, driven by distinct gate nets expected to carry
    /// opposite logic) whose gates instead settled to the same logic.
    pub fn check_opposite_logic_mismatch(&mut self, conn: &FullConnection) {
        if !conn.gate_is_transmission_pair || conn.gate_opposite_logic {
            return;
        }
        self.emit(
            ErrorKind::OppositeLogicMismatch,
            conn.device,
            "transmission-gate/tristate-inverter pair control nets carry the same logic".to_string(),
        );
    }

    /// A device settled both its terminals to different voltages on two
    /// nets whose powers don't relate: current is leaking between
    /// rails that were never declared family/permit to one another.
    pub fn check_leak(&mut self, device: &Device, magnitude_mv: i64) {
        self.emit(
            ErrorKind::Leak,
            device,
            format!("leak path carries {magnitude_mv}mV between unrelated power rails"),
        );
    }

    /// Expected-voltage mismatch: a power definition names an expected
    /// value (possibly a macro expression) and the propagated voltage
    /// disagrees with it.
    pub fn check_expected_voltage(&mut self, device: &Device, net_name: &str, expected_mv: i32, actual_mv: i32) {
        if expected_mv != actual_mv {
            self.emit(
                ErrorKind::ExpectedVoltageMismatch,
                device,
                format!("net {net_name}: expected {expected_mv}mV, propagated {actual_mv}mV"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{InstanceId, NetId, Resistance, Voltage};

    fn conn_with_vgs(device: &Device, vgs_mv: i32) -> FullConnection {
        FullConnection {
            device,
            source_net: NetId::new(0),
            gate_net: NetId::new(1),
            drain_net: NetId::new(2),
            bulk_net: NetId::new(0),
            min_source_voltage: Voltage::mv(0),
            sim_source_voltage: Voltage::mv(0),
            max_source_voltage: Voltage::mv(0),
            min_gate_voltage: Voltage::mv(vgs_mv),
            sim_gate_voltage: Voltage::mv(vgs_mv),
            max_gate_voltage: Voltage::mv(vgs_mv),
            min_drain_voltage: Voltage::mv(0),
            sim_drain_voltage: Voltage::mv(0),
            max_drain_voltage: Voltage::mv(0),
            min_bulk_voltage: Voltage::mv(0),
            sim_bulk_voltage: Voltage::mv(0),
            max_bulk_voltage: Voltage::mv(0),
            source_power: None,
            gate_power: None,
            drain_power: None,
            bulk_power: None,
            min_leak_voltage: Voltage::UNKNOWN,
            max_leak_voltage: Voltage::UNKNOWN,
            gate_is_analog: false,
            gate_source_drain_count: 0,
            gate_is_transmission_pair: false,
            gate_opposite_logic: false,
            max_vgs_mv: None,
            max_vds_mv: None,
            max_vbs_mv: None,
            max_vbg_mv: None,
        }
    }

    #[test]
    fn overvoltage_reported_once_limit_exceeded() {
        let device = Device::new(DeviceId::new(0), "M1", DeviceType::Nmos, InstanceId::new(0));
        let conn = conn_with_vgs(&device, 5000);
        let mut checker = Checker::new(3600, 10);
        checker.check_overvoltage(&conn);
        assert_eq!(checker.events.len(), 1);
        assert_eq!(checker.events[0].kind, ErrorKind::GateOvervoltage);
    }

    #[test]
    fn no_overvoltage_within_limit() {
        let device = Device::new(DeviceId::new(0), "M1", DeviceType::Nmos, InstanceId::new(0));
        let conn = conn_with_vgs(&device, 1200);
        let mut checker = Checker::new(3600, 10);
        checker.check_overvoltage(&conn);
        assert!(checker.events.is_empty());
    }

    #[test]
    fn throttle_caps_reports_but_keeps_counting() {
        let device = Device::new(DeviceId::new(0), "M1", DeviceType::Nmos, InstanceId::new(0));
        let conn = conn_with_vgs(&device, 5000);
        let mut checker = Checker::new(3600, 2);
        for _ in 0..5 {
            checker.check_overvoltage(&conn);
        }
        assert_eq!(checker.events.len(), 2);
        assert_eq!(checker.throttle.total_for(ErrorKind::GateOvervoltage), 5);
    }

    #[test]
    fn pump_capacitor_is_exempt_from_overvoltage() {
        let mut device = Device::new(DeviceId::new(0), "C1", DeviceType::Capacitor, InstanceId::new(0));
        device.gate = NetId::new(1);
        device.bulk = NetId::new(1);
        let conn = conn_with_vgs(&device, 5000);
        let mut checker = Checker::new(3600, 10);
        checker.check_overvoltage(&conn);
        assert!(checker.events.is_empty());
    }

    #[test]
    fn expected_voltage_mismatch_detected() {
        let device = Device::new(DeviceId::new(0), "M1", DeviceType::Nmos, InstanceId::new(0));
        let mut checker = Checker::new(3600, 10);
        checker.check_expected_voltage(&device, "VDD", 1800, 1500);
        assert_eq!(checker.events.len(), 1);
        assert_eq!(checker.events[0].kind, ErrorKind::ExpectedVoltageMismatch);
    }

    #[test]
    fn nmos_gate_within_one_vth_of_source_is_a_possible_leak() {
        let mut device = Device::new(DeviceId::new(0), "M1", DeviceType::Nmos, InstanceId::new(0));
        device.vth = 700;
        let conn = conn_with_vgs(&device, 300);
        let mut checker = Checker::new(3600, 10);
        checker.check_gate_source_leak(&conn);
        assert_eq!(checker.events.len(), 1);
        assert_eq!(checker.events[0].kind, ErrorKind::NmosPossibleLeak);
    }

    #[test]
    fn nmos_gate_well_above_vth_is_not_a_leak() {
        let mut device = Device::new(DeviceId::new(0), "M1", DeviceType::Nmos, InstanceId::new(0));
        device.vth = 700;
        let conn = conn_with_vgs(&device, 1800);
        let mut checker = Checker::new(3600, 10);
        checker.check_gate_source_leak(&conn);
        assert!(checker.events.is_empty());
    }

    #[test]
    fn analog_gate_is_exempt_from_leak_check() {
        let mut device = Device::new(DeviceId::new(0), "M1", DeviceType::Nmos, InstanceId::new(0));
        device.vth = 700;
        let mut conn = conn_with_vgs(&device, 300);
        conn.gate_is_analog = true;
        let mut checker = Checker::new(3600, 10);
        checker.check_gate_source_leak(&conn);
        assert!(checker.events.is_empty());
    }

    #[test]
    fn inverter_mismatch_detected_when_input_and_output_match() {
        let device = Device::new(DeviceId::new(0), "M1", DeviceType::Nmos, InstanceId::new(0));
        let mut checker = Checker::new(3600, 10);
        checker.check_inverter_mismatch(&device, Voltage::mv(1800), Voltage::mv(1800), false);
        assert_eq!(checker.events.len(), 1);
        assert_eq!(checker.events[0].kind, ErrorKind::InverterMismatch);
    }

    #[test]
    fn inverter_matches_expectation_reports_nothing() {
        let device = Device::new(DeviceId::new(0), "M1", DeviceType::Nmos, InstanceId::new(0));
        let mut checker = Checker::new(3600, 10);
        checker.check_inverter_mismatch(&device, Voltage::mv(1800), Voltage::mv(0), false);
        assert!(checker.events.is_empty());
    }

    #[test]
    fn opposite_logic_mismatch_detected_when_pair_agrees() {
        let device = Device::new(DeviceId::new(0), "M1", DeviceType::Nmos, InstanceId::new(0));
        let mut conn = conn_with_vgs(&device, 0);
        conn.gate_is_transmission_pair = true;
        conn.gate_opposite_logic = false;
        let mut checker = Checker::new(3600, 10);
        checker.check_opposite_logic_mismatch(&conn);
        assert_eq!(checker.events.len(), 1);
        assert_eq!(checker.events[0].kind, ErrorKind::OppositeLogicMismatch);
    }

    #[test]
    fn opposite_logic_pair_that_actually_disagrees_is_fine() {
        let device = Device::new(DeviceId::new(0), "M1", DeviceType::Nmos, InstanceId::new(0));
        let mut conn = conn_with_vgs(&device, 0);
        conn.gate_is_transmission_pair = true;
        conn.gate_opposite_logic = true;
        let mut checker = Checker::new(3600, 10);
        checker.check_opposite_logic_mismatch(&conn);
        assert!(checker.events.is_empty());
    }
}

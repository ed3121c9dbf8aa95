//! Error report writer: UTF-8 text, one block per violation.
//!
//! ```text
//! ! gate oxide overvoltage: Vgs = 5000mV exceeds limit 3600mV
//! M1 w=1u l=0.1u
//! G: GATE_HIGH
//! S: GND
//! D: OUT
//! B: GND
//! Min: GATE_HIGH @1800mV r=0
//! Sim: GATE_HIGH @1800mV r=0
//! Max: GATE_HIGH =5000mV r=120
//!
//! ```
//!
//! `@` marks a declared (power-file) voltage, `=` a calculated one. The
//! report ends with one summary line per error kind and a grand total.

use cvc_core::checker::ErrorEvent;
use cvc_core::ids::{Resistance, Voltage};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Per-terminal identity and settled-voltage data for one reported
/// device, enough to print one complete block.
pub struct ReportedDevice {
    pub parameters: String,
    pub gate_net: String,
    pub source_net: String,
    pub drain_net: String,
    pub bulk_net: String,
    /// The terminal the violation is anchored to (its voltages are
    /// printed in the Min/Sim/Max lines); usually the gate for a gate
    /// overvoltage, or whichever terminal tripped the check.
    pub reported_net: String,
    pub min: (Voltage, Resistance, bool),
    pub sim: (Voltage, Resistance, bool),
    pub max: (Voltage, Resistance, bool),
}

fn fmt_voltage_line(label: &str, net: &str, entry: (Voltage, Resistance, bool), out: &mut String) {
    let (voltage, resistance, declared) = entry;
    let marker = if declared { '@' } else { '=' };
    if voltage.is_known() {
        let _ = writeln!(out, "{label}: {net} {marker}{}mV r={resistance}", voltage.value());
    } else {
        let _ = writeln!(out, "{label}: {net} {marker}? r={resistance}");
    }
}

/// Write one violation block for `event`, given its associated device
/// terminal snapshot.
pub fn write_block(out: &mut String, event: &ErrorEvent, device: &ReportedDevice) {
    let _ = writeln!(out, "! {}: {}", event.kind.label(), event.detail);
    let _ = writeln!(out, "{} {}", event.device_name, device.parameters);
    let _ = writeln!(out, "G: {}", device.gate_net);
    let _ = writeln!(out, "S: {}", device.source_net);
    let _ = writeln!(out, "D: {}", device.drain_net);
    let _ = writeln!(out, "B: {}", device.bulk_net);
    fmt_voltage_line("Min", &device.reported_net, device.min, out);
    fmt_voltage_line("Sim", &device.reported_net, device.sim, out);
    fmt_voltage_line("Max", &device.reported_net, device.max, out);
    out.push('\n');
}

/// Write a full report: every (event, device) pair as a block, followed
/// by a per-kind and grand-total summary.
pub fn write_report(events: &[(ErrorEvent, ReportedDevice)]) -> String {
    let mut out = String::new();
    for (event, device) in events {
        write_block(&mut out, event, device);
    }

    let mut totals: BTreeMap<&'static str, usize> = BTreeMap::new();
    for (event, _) in events {
        *totals.entry(event.kind.label()).or_insert(0) += 1;
    }
    let _ = writeln!(out, "--- summary ---");
    for (label, count) in &totals {
        let _ = writeln!(out, "{label}: {count}");
    }
    let _ = writeln!(out, "total: {}", events.len());

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvc_core::checker::ErrorKind;
    use cvc_core::ids::DeviceId;

    fn sample_event() -> ErrorEvent {
        ErrorEvent {
            kind: ErrorKind::GateOvervoltage,
            device_id: DeviceId::new(0),
            device_name: "M1".into(),
            detail: "Vgs = 5000mV exceeds limit 3600mV".into(),
        }
    }

    fn sample_device() -> ReportedDevice {
        ReportedDevice {
            parameters: "w=1u l=0.1u".into(),
            gate_net: "GATE_HIGH".into(),
            source_net: "GND".into(),
            drain_net: "OUT".into(),
            bulk_net: "GND".into(),
            reported_net: "GATE_HIGH".into(),
            min: (Voltage::mv(1800), Resistance::milliohms(0), true),
            sim: (Voltage::mv(1800), Resistance::milliohms(0), true),
            max: (Voltage::mv(5000), Resistance::milliohms(120), false),
        }
    }

    #[test]
    fn block_has_heading_and_four_terminal_lines() {
        let mut out = String::new();
        write_block(&mut out, &sample_event(), &sample_device());
        assert!(out.starts_with("! gate oxide overvoltage"));
        assert!(out.contains("G: GATE_HIGH"));
        assert!(out.contains("S: GND"));
        assert!(out.contains("D: OUT"));
        assert!(out.contains("B: GND"));
        assert!(out.ends_with("\n\n"));
    }

    #[test]
    fn declared_vs_calculated_marker() {
        let mut out = String::new();
        write_block(&mut out, &sample_event(), &sample_device());
        assert!(out.contains("Min: GATE_HIGH @1800mV"));
        assert!(out.contains("Max: GATE_HIGH =5000mV"));
    }

    #[test]
    fn report_ends_with_summary_totals() {
        let report = write_report(&[(sample_event(), sample_device())]);
        assert!(report.contains("--- summary ---"));
        assert!(report.contains("gate oxide overvoltage: 1"));
        assert!(report.contains("total: 1"));
    }
}

//! Flat netlist parser: one device record per line,
//! `deviceName modelKey gate source drain [bulk] parameterString`.
//!
//! Net names are interned into dense [`cvc_core::ids::NetId`]s as they are
//! first seen; bulk is optional (defaults to the device's source net, the
//! common convention for a four-terminal model collapsed to three pins in
//! the netlist text).

use crate::error::IoResult;
use crate::model::{BaseType, DeviceModel, ModelTable};
use cvc_core::device::{Device, DeviceType, Net};
use cvc_core::diagnostics::ImportDiagnostics;
use cvc_core::ids::{InstanceId, NetId, Resistance};
use cvc_core::network::Network;
use std::collections::HashMap;

/// Resolves a device record's model key to a [`DeviceType`]. A real
/// design's model library names keys after the transistor flavor
/// (`nmos_lvt`, `pmos_hvt`, ...); when a key doesn't say, fall back to the
/// model table's own `base_type` (and, for MOS models, the sign of
/// `vth_mv` — negative threshold is the depletion/PMOS convention) before
/// finally guessing from the SPICE element-type prefix (`M`/`R`/`C`/`D`/`F`).
fn classify_model_key(model_key: &str, model: Option<&DeviceModel>) -> DeviceType {
    let lower = model_key.to_ascii_lowercase();
    if lower.contains("pmos") {
        return DeviceType::Pmos;
    }
    if lower.contains("nmos") {
        return DeviceType::Nmos;
    }
    if let Some(model) = model {
        return match model.base_type {
            BaseType::Mos => {
                if model.vth_mv < 0 {
                    DeviceType::Pmos
                } else {
                    DeviceType::Nmos
                }
            }
            BaseType::Resistor => DeviceType::Resistor,
            BaseType::Capacitor => DeviceType::Capacitor,
            BaseType::Diode => DeviceType::Diode,
            BaseType::Bipolar => DeviceType::Other,
        };
    }
    match model_key.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('M') => DeviceType::Nmos,
        Some('R') => DeviceType::Resistor,
        Some('C') => DeviceType::Capacitor,
        Some('D') => DeviceType::Diode,
        Some('F') => DeviceType::Fuse,
        _ => DeviceType::Other,
    }
}

pub struct NetlistParser {
    net_ids: HashMap<String, NetId>,
    subcircuit: InstanceId,
}

impl NetlistParser {
    pub fn new() -> Self {
        Self {
            net_ids: HashMap::new(),
            subcircuit: InstanceId::new(0),
        }
    }

    fn intern(&mut self, network: &mut Network, name: &str) -> NetId {
        if let Some(&id) = self.net_ids.get(name) {
            return id;
        }
        let id = network.add_net(Net::new(NetId::UNKNOWN, name, self.subcircuit));
        self.net_ids.insert(name.to_string(), id);
        id
    }

    /// Resolve a net name to its id in this parser's namespace, interning
    /// it if new. Exposed so the power-file parser can share one net
    /// namespace with the netlist (a power declaration may name a net the
    /// netlist never mentions, e.g. an always-on substrate tie).
    pub fn resolve_net(&mut self, network: &mut Network, name: &str) -> NetId {
        self.intern(network, name)
    }

    /// Parse netlist text into `network`, returning import statistics and
    /// any per-line diagnostics. Malformed lines are skipped (counted and
    /// reported), not fatal — one bad device record should not block
    /// checking the rest of the circuit. `models`, if given, supplies each
    /// device's threshold voltage and static resistance by model key.
    pub fn parse(&mut self, text: &str, network: &mut Network, models: Option<&ModelTable>) -> IoResult<ImportDiagnostics> {
        let mut diagnostics = ImportDiagnostics::new();

        for (line_no, raw_line) in text.lines().enumerate() {
            let line_no = line_no + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('*') || line.starts_with('#') {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let (Some(device_name), Some(model_key), Some(gate), Some(source), Some(drain)) = (
                tokens.next(),
                tokens.next(),
                tokens.next(),
                tokens.next(),
                tokens.next(),
            ) else {
                diagnostics.add_error_at_line("parse", "device record missing required fields", line_no);
                continue;
            };

            let rest: Vec<&str> = tokens.collect();
            // Bulk is present when a token remains before the parameter
            // string; a bare parameter string (no `=`) with nothing after
            // it means bulk was omitted and defaults to source.
            let (bulk_name, parameters) = match rest.split_first() {
                Some((maybe_bulk, params)) if !maybe_bulk.contains('=') => {
                    (Some(*maybe_bulk), params.join(" "))
                }
                Some((first, params)) => (None, std::iter::once(*first).chain(params.iter().copied()).collect::<Vec<_>>().join(" ")),
                None => (None, String::new()),
            };

            let gate_id = self.intern(network, gate);
            let source_id = self.intern(network, source);
            let drain_id = self.intern(network, drain);
            let bulk_id = match bulk_name {
                Some(name) => self.intern(network, name),
                None => source_id,
            };

            let model = models.and_then(|m| m.get(model_key));
            let mut device = Device::new(
                cvc_core::ids::DeviceId::UNKNOWN,
                device_name,
                classify_model_key(model_key, model),
                self.subcircuit,
            );
            device.gate = gate_id;
            device.source = source_id;
            device.drain = drain_id;
            device.bulk = bulk_id;
            device.parameter_string = parameters;
            if let Some(model) = model {
                device.vth = model.vth_mv;
                device.is_ldd = model.is_ldd;
                device.max_vgs_mv = model.max_vgs_mv;
                device.max_vds_mv = model.max_vds_mv;
                device.max_vbs_mv = model.max_vbs_mv;
                device.max_vbg_mv = model.max_vbg_mv;
                if let Ok(milliohms) = model.resistance_expr.parse::<u32>() {
                    device.resistance = Resistance::milliohms(milliohms);
                }
            }
            network.add_device(device);
            diagnostics.stats.devices += 1;
        }

        diagnostics.stats.nets = network.nets.len();
        Ok(diagnostics)
    }
}

impl Default for NetlistParser {
    fn default() -> Self {
        Self::new()
    }
}

//! `cvc check`: parse a netlist/model/power triple, propagate Min/Sim/Max
//! voltages, run the error checker, and emit a report.

use crate::cli::ReportFormat;
use anyhow::{Context, Result};
use cvc_core::checker::ErrorEvent;
use cvc_core::ids::NetId;
use cvc_core::network::{Network, PropagationResult};
use cvc_io::model::ModelTable;
use cvc_io::netlist::NetlistParser;
use cvc_io::powerfile::PowerFileParser;
use cvc_io::report::{write_report, ReportedDevice};
use std::path::PathBuf;
use tracing::info;

pub struct CheckArgs {
    pub netlist: PathBuf,
    pub model: PathBuf,
    pub power: PathBuf,
    pub report: Option<PathBuf>,
    pub overvoltage_limit_mv: i32,
    pub per_kind_limit: usize,
    pub format: ReportFormat,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let netlist_text = std::fs::read_to_string(&args.netlist)
        .with_context(|| format!("reading netlist {}", args.netlist.display()))?;
    let model_text = std::fs::read_to_string(&args.model)
        .with_context(|| format!("reading model file {}", args.model.display()))?;
    let power_text = std::fs::read_to_string(&args.power)
        .with_context(|| format!("reading power file {}", args.power.display()))?;

    let mut models = ModelTable::new();
    let model_diagnostics = models.parse(&model_text)?;
    info!(errors = model_diagnostics.error_count(), "model file parsed");

    let mut network = Network::new();
    let mut netlist_parser = NetlistParser::new();
    let netlist_diagnostics = netlist_parser.parse(&netlist_text, &mut network, Some(&models))?;
    info!(
        devices = netlist_diagnostics.stats.devices,
        nets = netlist_diagnostics.stats.nets,
        "netlist parsed"
    );

    // `PowerFileParser`'s resolver closure needs `&mut network` to intern
    // nets the netlist never mentioned; take `powers` out first so the two
    // borrows don't overlap.
    let mut powers = std::mem::take(&mut network.powers);
    let power_diagnostics = {
        let mut power_parser = PowerFileParser::new(|name: &str| netlist_parser.resolve_net(&mut network, name));
        power_parser.parse(&power_text, &mut powers)?
    };
    for model in models.iter() {
        powers.set_model_vth(model.model_key.clone(), model.vth_mv);
    }
    network.powers = powers;
    info!(
        power_definitions = power_diagnostics.stats.power_definitions,
        warnings = power_diagnostics.warning_count(),
        "power file parsed"
    );

    let mut structural = cvc_core::diagnostics::Diagnostics::new();
    network.validate_into(&mut structural);
    if structural.has_errors() {
        for issue in &structural.issues {
            tracing::warn!("{issue}");
        }
    }

    let mut result = network.propagate();
    let events = network.check(&mut result, args.overvoltage_limit_mv, args.per_kind_limit);
    info!(violations = events.len(), "check complete");

    let reported: Vec<(ErrorEvent, ReportedDevice)> = events
        .into_iter()
        .map(|event| {
            let device = reported_device(&network, &mut result, &event);
            (event, device)
        })
        .collect();

    let report = match args.format {
        ReportFormat::Text => write_report(&reported),
        ReportFormat::Json => serde_json::to_string_pretty(
            &reported.iter().map(|(e, _)| e).collect::<Vec<_>>(),
        )?,
    };

    match &args.report {
        Some(path) => {
            std::fs::write(path, &report).with_context(|| format!("writing report to {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{report}"),
    }

    Ok(())
}

fn net_name(network: &Network, net: NetId) -> String {
    network
        .nets
        .get(net.index())
        .map(|n| n.name.clone())
        .unwrap_or_else(|| format!("net{net}"))
}

/// Pick the terminal whose voltage the report should anchor on: the
/// terminal the corresponding check actually flagged.
fn reported_terminal(event: &ErrorEvent, device: &cvc_core::device::Device) -> NetId {
    use cvc_core::checker::ErrorKind::*;
    match event.kind {
        DrainSourceOvervoltage => device.drain,
        BulkOvervoltage => device.bulk,
        _ => device.gate,
    }
}

fn reported_device(network: &Network, result: &mut PropagationResult, event: &ErrorEvent) -> ReportedDevice {
    let device = &network.devices[event.device_id.index()];
    let reported_net = reported_terminal(event, device);

    let voltage_entry = |state: &mut cvc_core::propagator::InterpretationState| {
        let voltage = state.voltage_of_net(reported_net);
        let (_, resistance) = state.virtual_nets.resolve(reported_net);
        let declared = network.powers.get(reported_net).is_some();
        (voltage, resistance, declared)
    };

    ReportedDevice {
        parameters: format!("vth={}mV r={}", device.vth, device.resistance),
        gate_net: net_name(network, device.gate),
        source_net: net_name(network, device.source),
        drain_net: net_name(network, device.drain),
        bulk_net: net_name(network, device.bulk),
        reported_net: net_name(network, reported_net),
        min: voltage_entry(&mut result.min),
        sim: voltage_entry(&mut result.sim),
        max: voltage_entry(&mut result.max),
    }
}


//! `cvc validate`: parse the input files and report structural diagnostics
//! without running propagation, for a fast netlist/power-file sanity pass.

use anyhow::{Context, Result};
use cvc_core::diagnostics::Diagnostics;
use cvc_core::network::Network;
use cvc_io::model::ModelTable;
use cvc_io::netlist::NetlistParser;
use cvc_io::powerfile::PowerFileParser;
use std::path::PathBuf;
use tracing::info;

pub struct ValidateArgs {
    pub netlist: PathBuf,
    pub model: PathBuf,
    pub power: PathBuf,
}

pub fn run(args: ValidateArgs) -> Result<()> {
    let netlist_text = std::fs::read_to_string(&args.netlist)
        .with_context(|| format!("reading netlist {}", args.netlist.display()))?;
    let model_text = std::fs::read_to_string(&args.model)
        .with_context(|| format!("reading model file {}", args.model.display()))?;
    let power_text = std::fs::read_to_string(&args.power)
        .with_context(|| format!("reading power file {}", args.power.display()))?;

    let mut models = ModelTable::new();
    let model_diagnostics = models.parse(&model_text)?;

    let mut network = Network::new();
    let mut netlist_parser = NetlistParser::new();
    let netlist_diagnostics = netlist_parser.parse(&netlist_text, &mut network, Some(&models))?;

    let mut powers = std::mem::take(&mut network.powers);
    let power_diagnostics = {
        let mut power_parser = PowerFileParser::new(|name: &str| netlist_parser.resolve_net(&mut network, name));
        power_parser.parse(&power_text, &mut powers)?
    };
    network.powers = powers;

    let mut structural = Diagnostics::new();
    network.validate_into(&mut structural);

    println!("model file:    {}", model_diagnostics.summary());
    println!("netlist:       {}", netlist_diagnostics.summary());
    println!("power file:    {}", power_diagnostics.summary());
    println!("structural:    {}", structural.summary());

    for issue in model_diagnostics
        .issues
        .iter()
        .chain(netlist_diagnostics.issues.iter())
        .chain(power_diagnostics.issues.iter())
    {
        println!("  {issue}");
    }
    for issue in &structural.issues {
        println!("  {issue}");
    }

    let stats = network.stats();
    info!(%stats, "validation complete");

    let failed = model_diagnostics.has_errors()
        || netlist_diagnostics.has_errors()
        || power_diagnostics.has_errors()
        || structural.has_errors();
    if failed {
        anyhow::bail!("validation found errors");
    }
    Ok(())
}

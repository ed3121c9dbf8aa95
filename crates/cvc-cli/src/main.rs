use clap::Parser;
use cvc_cli::cli::{Cli, Commands};
use cvc_cli::commands::{check, config, validate};
use cvc_io::CvcConfig;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::new(cli.log_level.as_filter()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let file_config = cli
        .config
        .as_ref()
        .map(CvcConfig::load)
        .transpose()
        .unwrap_or_else(|err| {
            error!("failed to load config file: {err}");
            std::process::exit(2);
        })
        .unwrap_or_default();

    let result = match cli.command {
        Commands::Check {
            netlist,
            model,
            power,
            report,
            overvoltage_limit_mv,
            format,
        } => {
            info!(netlist = %netlist.display(), "running check");
            check::run(check::CheckArgs {
                netlist,
                model,
                power,
                report,
                overvoltage_limit_mv: overvoltage_limit_mv.unwrap_or(file_config.overvoltage_limit_mv),
                per_kind_limit: file_config.max_reports_per_kind,
                format,
            })
        }
        Commands::Validate { netlist, model, power } => {
            info!(netlist = %netlist.display(), "running validate");
            validate::run(validate::ValidateArgs { netlist, model, power })
        }
        Commands::Config => config::run(cli.config.as_deref()),
    };

    if let Err(err) = result {
        error!("{err:?}");
        std::process::exit(1);
    }
}

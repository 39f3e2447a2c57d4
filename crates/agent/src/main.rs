#![forbid(unsafe_code)]

mod cli;
mod commands;
mod startup;

use anyhow::Result;

use cli::Command;
use infrastructure::logging::init_logging;
use startup::Runtime;

fn main() -> Result<()> {
    let cli = cli::parse();
    let output = cli.output;

    if let Command::Version = cli.command {
        println!("hostport {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = startup::load_config(&cli.config)?;
    let log_level = cli.log_level.unwrap_or(config.agent.log_level);
    let log_format = cli.log_format.unwrap_or(config.agent.log_format);
    init_logging(log_level, log_format)?;

    let rt = Runtime::build(config);

    let result = match cli.command {
        Command::Version => Ok(()),
        Command::Setup(args) => commands::cmd_setup(&rt, args.container_ip, &args.mappings, output),
        Command::Release(args) => {
            commands::cmd_release(&rt, args.container_ip, &args.mappings, output)
        }
        Command::Apply { release } => commands::cmd_apply(&rt, release, output),
        Command::Check(args) => commands::cmd_check(&rt, args.container_ip, &args.mappings, output),
        Command::Chains { command } => commands::cmd_chains(&rt, command),
    };

    if cli.metrics {
        commands::cmd_metrics(&rt)?;
    }
    result
}

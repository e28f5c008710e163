use clap::{Args, Subcommand};
use serde::Serialize;

use provost::log_status;
use provost::target::{self, Target};

#[derive(Serialize)]
pub struct TargetOutput {
    command: String,
    target: Target,
}

#[derive(Args)]
pub struct TargetArgs {
    #[command(subcommand)]
    command: TargetCommand,
}

#[derive(Subcommand)]
enum TargetCommand {
    /// Set the default Proxmox target
    Set {
        /// Proxmox host address
        host: String,
        /// SSH port
        #[arg(long, default_value_t = 22)]
        port: u16,
        /// LXC container ID for lxc-targeted commands
        #[arg(long, value_name = "ID")]
        container_id: Option<String>,
    },
    /// Display the configured default target
    Show,
}

pub fn run(
    args: TargetArgs,
    _global: &crate::commands::GlobalArgs,
) -> crate::commands::CmdResult<TargetOutput> {
    match args.command {
        TargetCommand::Set {
            host,
            port,
            container_id,
        } => {
            let target = Target::new(host, port, container_id);
            target::save(&target)?;
            log_status!("target", "Default target set to {}", target);
            Ok((
                TargetOutput {
                    command: "set".to_string(),
                    target,
                },
                0,
            ))
        }
        TargetCommand::Show => {
            let target = target::load()?;
            Ok((
                TargetOutput {
                    command: "show".to_string(),
                    target,
                },
                0,
            ))
        }
    }
}

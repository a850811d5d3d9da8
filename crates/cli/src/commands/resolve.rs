//! Module for the `resolve` subcommand, which runs the target resolver against the procedures
//! of a unit and prints the selected instructions.

use async_trait::async_trait;
use clap::Args;
use mixweave_core::descriptor::MemberDecl;
use mixweave_transform::resolver::{resolve_slice, resolve_targets};
use mixweave_transform::target::{SliceSpec, TargetDescriptor};
use std::error::Error;
use std::path::PathBuf;

use super::{CliError, load_unit};

/// Arguments for the `resolve` subcommand.
#[derive(Args)]
pub struct ResolveArgs {
    /// Unit file (JSON).
    pub input: PathBuf,
    /// Procedures to search (`name`, `name(desc)` or `*`).
    #[arg(long, default_value = "*")]
    pub method: String,
    /// Target descriptor, e.g. `INVOKE:demo/Log;info@0`.
    #[arg(long)]
    pub at: String,
    /// Overrides the descriptor's ordinal.
    #[arg(long)]
    pub ordinal: Option<i32>,
    /// Slice start descriptor.
    #[arg(long)]
    pub from: Option<String>,
    /// Slice end descriptor.
    #[arg(long)]
    pub to: Option<String>,
}

fn parse_target(text: &str) -> Result<TargetDescriptor, CliError> {
    let target: TargetDescriptor = text.parse()?;
    target.matcher()?;
    Ok(target)
}

#[async_trait]
impl super::Command for ResolveArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let unit = load_unit(&self.input).await?;
        let method = MemberDecl::parse(&self.method).map_err(|e| CliError::Input(e.to_string()))?;
        let mut target = parse_target(&self.at)?;
        if let Some(ordinal) = self.ordinal {
            target = target.with_ordinal(ordinal);
        }
        let slice = SliceSpec {
            from: self.from.as_deref().map(parse_target).transpose()?,
            to: self.to.as_deref().map(parse_target).transpose()?,
        };

        let mut total = 0;
        for procedure in &unit.procedures {
            if !method.matches_signature(&unit.name, &procedure.name, &procedure.desc) {
                continue;
            }
            let window = resolve_slice(procedure, Some(&slice))?;
            let sites = resolve_targets(procedure, &window, &target)?;
            println!("{}{}: {} match(es)", procedure.name, procedure.desc, sites.len());
            for site in sites {
                let index = procedure.body.index_of(site).unwrap_or_default();
                if let Some(insn) = procedure.body.instruction(site) {
                    println!("  #{index:<4} {insn}");
                }
            }
            total += 1;
        }
        if total == 0 {
            return Err(CliError::Input(format!("no procedure of {} matches {}", unit.name, method)).into());
        }
        Ok(())
    }
}

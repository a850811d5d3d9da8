//! Module for the `disasm` subcommand, which prints the procedures of a JSON unit in the
//! textual assembly form.

use async_trait::async_trait;
use clap::Args;
use mixweave_core::asm::print_body;
use mixweave_core::descriptor::MemberDecl;
use std::error::Error;
use std::path::PathBuf;

use super::{CliError, load_unit};

/// Arguments for the `disasm` subcommand.
#[derive(Args)]
pub struct DisasmArgs {
    /// Unit file (JSON).
    pub input: PathBuf,
    /// Only print procedures matching this declaration (`name` or `name(desc)`).
    #[arg(long)]
    pub procedure: Option<String>,
}

#[async_trait]
impl super::Command for DisasmArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let unit = load_unit(&self.input).await?;
        let filter = self
            .procedure
            .as_deref()
            .map(MemberDecl::parse)
            .transpose()
            .map_err(|e| CliError::Input(e.to_string()))?;

        println!(
            "unit {} extends {}",
            unit.name,
            unit.super_name.as_deref().unwrap_or("-")
        );
        for field in &unit.fields {
            let scope = if field.is_static { "static " } else { "" };
            println!("  field {scope}{}:{}", field.name, field.ty);
        }
        for procedure in &unit.procedures {
            if filter
                .as_ref()
                .is_some_and(|decl| !decl.matches_signature(&unit.name, &procedure.name, &procedure.desc))
            {
                continue;
            }
            let scope = if procedure.is_static { "static " } else { "" };
            println!(
                "\n{scope}{}{} (max_locals {})",
                procedure.name, procedure.desc, procedure.max_locals
            );
            print!("{}", print_body(&procedure.body));
        }
        Ok(())
    }
}

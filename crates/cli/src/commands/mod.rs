use async_trait::async_trait;
use clap::Subcommand;
use mixweave_core::codec::{JsonCodec, UnitCodec};
use mixweave_core::unit::CompiledUnit;
use std::error::Error;
use std::path::Path;

pub mod disasm;
pub mod resolve;
pub mod weave;

use thiserror::Error;

/// Errors raised while preparing command input.
#[derive(Debug, Error)]
pub enum CliError {
    /// An argument could not be interpreted.
    #[error("invalid argument: {0}")]
    Input(String),
    /// File read/write error.
    #[error("file error on {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Unit or manifest decoding failed.
    #[error(transparent)]
    Core(#[from] mixweave_core::Error),
    /// Resolution, splicing or merging failed.
    #[error(transparent)]
    Weave(#[from] mixweave_transform::Error),
    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// CLI subcommands for mixweave.
#[derive(Subcommand)]
pub enum Cmd {
    /// Print the procedures of a unit in assembly form.
    Disasm(disasm::DisasmArgs),
    /// Show which instructions a target descriptor selects.
    Resolve(resolve::ResolveArgs),
    /// Apply the handlers of a manifest to a unit.
    Weave(weave::WeaveArgs),
}

/// Trait for executing CLI subcommands.
#[async_trait]
pub trait Command {
    /// Executes the subcommand.
    async fn execute(self) -> Result<(), Box<dyn Error>>;
}

#[async_trait]
impl Command for Cmd {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        match self {
            Cmd::Disasm(args) => args.execute().await,
            Cmd::Resolve(args) => args.execute().await,
            Cmd::Weave(args) => args.execute().await,
        }
    }
}

/// Reads and decodes a JSON unit file.
pub(crate) async fn load_unit(path: &Path) -> Result<CompiledUnit, CliError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| CliError::File {
        path: path.display().to_string(),
        source,
    })?;
    Ok(JsonCodec::default().decode(&bytes)?)
}

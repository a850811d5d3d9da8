//! Module for the `weave` subcommand, which applies the handler units of a manifest to one
//! unit and writes the woven result.

use async_trait::async_trait;
use clap::Args;
use mixweave_core::codec::{JsonCodec, UnitCodec};
use mixweave_transform::WeaveConfig;
use mixweave_transform::hierarchy::ClassHierarchy;
use mixweave_transform::manifest::WeaveManifest;
use mixweave_transform::registry::HandlerRegistry;
use mixweave_transform::weaver::Weaver;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::{CliError, load_unit};

/// Arguments for the `weave` subcommand.
#[derive(Args)]
pub struct WeaveArgs {
    /// Unit file (JSON) to weave.
    pub input: PathBuf,
    /// Manifest declaring the handler units.
    #[arg(long)]
    pub manifest: PathBuf,
    /// Weaver configuration (JSON); defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Where to write the woven unit. Without it only the report is printed.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Stop at the first failing handler instead of skipping it.
    #[arg(long)]
    pub strict: bool,
}

async fn read_text(path: &Path) -> Result<String, CliError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::File {
            path: path.display().to_string(),
            source,
        })
}

#[async_trait]
impl super::Command for WeaveArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let WeaveArgs {
            input,
            manifest,
            config,
            out,
            strict,
        } = self;

        let mut config = match &config {
            Some(path) => serde_json::from_str::<WeaveConfig>(&read_text(path).await?)?,
            None => WeaveConfig::default(),
        };
        if strict {
            config.best_effort = false;
        }

        let base = manifest.parent().map(Path::to_path_buf).unwrap_or_default();
        let manifest = WeaveManifest::from_json(&read_text(&manifest).await?)?;
        let codec = JsonCodec { pretty: true };
        let registry = HandlerRegistry::new();
        for handler_unit in manifest.load_units(&base, &codec)? {
            registry.register(handler_unit)?;
        }

        let mut weaver = Weaver::new(
            config,
            Arc::new(registry),
            Arc::new(ClassHierarchy::new()),
        )
        .with_codec(Box::new(codec));
        if let Some(mappings) = manifest.mappings.filter(|m| !m.is_empty()) {
            weaver = weaver.with_remapper(Arc::new(mappings));
        }

        let mut unit = load_unit(&input).await?;
        let report = weaver.weave_unit(&mut unit)?;
        println!("{}", serde_json::to_string_pretty(&report)?);

        if let Some(out) = out {
            let bytes = codec.encode(&unit)?;
            tokio::fs::write(&out, bytes)
                .await
                .map_err(|source| CliError::File {
                    path: out.display().to_string(),
                    source,
                })?;
            info!("wrote {} to {}", unit.name, out.display());
        }
        Ok(())
    }
}

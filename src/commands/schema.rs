use std::path::PathBuf;

use clap::Args;
use schemars::schema_for;

use crate::config::Config;
use crate::error::Error;

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Write the schema to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl SchemaArgs {
    /// JSON Schema for `.gastown.toml` / `.gastown.json`.
    pub fn execute(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&schema_for!(Config))?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, format!("{json}\n")).map_err(|e| Error::io(path, e))?;
                eprintln!("wrote {}", path.display());
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}

//! List command - list catalog entries under a path prefix.
//!
//! # Examples
//!
//! ```bash
//! nzbfs ls /movies
//! nzbfs ls --json /movies | jq '.entries[].name'
//! ```

use anyhow::Result;
use clap::Args as ClapArgs;
use nzbfs_core::filesystem::{FilesystemSurface, NzbFilesystem};
use serde::Serialize;
use tracing::instrument;

use crate::output::create_table;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Path prefix within the catalog (default: root)
    #[arg(default_value = "/")]
    pub path: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// One entry per line (script-friendly)
    #[arg(short = '1')]
    pub one_per_line: bool,
}

#[derive(Serialize)]
struct LsOutput {
    path: String,
    entries: Vec<String>,
}

#[instrument(level = "info", name = "cmd::ls", skip_all, fields(path = %args.path))]
pub async fn execute(fs: &NzbFilesystem, args: &Args) -> Result<()> {
    let entries = fs.list_dir(&args.path).await?;
    let names: Vec<String> = entries.into_iter().map(|e| e.name).collect();

    if args.json {
        let output = LsOutput {
            path: args.path.clone(),
            entries: names,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if args.one_per_line || names.len() > 10 {
        for name in names {
            println!("{name}");
        }
    } else {
        let mut table = create_table();
        table.set_header(vec!["Name"]);
        for name in names {
            table.add_row(vec![name]);
        }
        println!("{table}");
    }

    Ok(())
}

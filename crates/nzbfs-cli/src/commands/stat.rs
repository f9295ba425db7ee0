//! Stat command - show metadata for one logical file.
//!
//! # Examples
//!
//! ```bash
//! nzbfs stat /movies/example.mkv
//! nzbfs stat --json /movies/example.mkv
//! ```

use anyhow::Result;
use clap::Args as ClapArgs;
use nzbfs_core::filesystem::{FilesystemSurface, NzbFilesystem};
use serde::Serialize;
use tracing::instrument;

use crate::output::{create_table, format_size};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Path of the file to stat
    pub path: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatOutput {
    path: String,
    size: i64,
    modified_at: i64,
    is_directory: bool,
}

#[instrument(level = "info", name = "cmd::stat", skip_all, fields(path = %args.path))]
pub async fn execute(fs: &NzbFilesystem, args: &Args) -> Result<()> {
    let stat = fs.stat(&args.path).await?;

    if args.json {
        let output = StatOutput {
            path: args.path.clone(),
            size: stat.size,
            modified_at: stat.modified_at,
            is_directory: stat.is_directory,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let mut table = create_table();
        table.set_header(vec!["Property", "Value"]);
        table.add_row(vec!["Path", &args.path]);
        table.add_row(vec!["Size", &format_size(stat.size)]);
        table.add_row(vec!["Modified", &stat.modified_at.to_string()]);
        table.add_row(vec!["Directory", &stat.is_directory.to_string()]);
        println!("{table}");
    }

    Ok(())
}

//! Cat command - stream a file's decrypted contents to stdout.
//!
//! # Examples
//!
//! ```bash
//! nzbfs cat /movies/example.mkv > example.mkv
//! ```

use anyhow::Result;
use clap::Args as ClapArgs;
use nzbfs_core::filesystem::{FilesystemSurface, NzbFilesystem, OpenFlags};
use std::io::{self, Write};
use tracing::instrument;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Path of the file to read
    pub path: String,

    /// Only read bytes `lo..=hi` (inclusive); omit `hi` for open-ended
    #[arg(long, value_name = "LO-HI")]
    pub range: Option<String>,
}

fn parse_range(spec: &str) -> Result<(i64, Option<i64>)> {
    let (lo, hi) = spec
        .split_once('-')
        .ok_or_else(|| anyhow::anyhow!("invalid --range {spec:?}, expected LO-HI or LO-"))?;
    let lo: i64 = lo.parse()?;
    let hi = if hi.is_empty() { None } else { Some(hi.parse()?) };
    Ok((lo, hi))
}

#[instrument(level = "info", name = "cmd::cat", skip_all, fields(path = %args.path))]
pub async fn execute(fs: &NzbFilesystem, args: &Args) -> Result<()> {
    let range = args.range.as_deref().map(parse_range).transpose()?;
    let handle = fs.open(&args.path, OpenFlags::ReadOnly, range).await?;

    let mut stdout = io::stdout();
    let mut buf = vec![0u8; 256 * 1024];
    loop {
        let n = fs.read(handle, &mut buf).await?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n])?;
    }

    fs.close(handle).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_range_accepts_open_ended() {
        assert_eq!(parse_range("10-").unwrap(), (10, None));
    }

    #[test]
    fn parse_range_accepts_bounded() {
        assert_eq!(parse_range("10-20").unwrap(), (10, Some(20)));
    }

    #[test]
    fn parse_range_rejects_malformed_input() {
        assert!(parse_range("abc").is_err());
    }
}

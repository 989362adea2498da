use anyhow::{Context, Result};
use std::fs;
use std::io::Read;

use crate::chunk::lines_chunk;
use crate::cli::ChunkArgs;

pub fn run(args: ChunkArgs) -> Result<()> {
    let text = match &args.file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    for line in lines_chunk(&text, args.n, args.index)? {
        println!("{}", line);
    }
    Ok(())
}

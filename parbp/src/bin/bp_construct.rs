//! Builds the succinct-tree index over a parenthesis string given on the
//! command line and reports construction time as one CSV line:
//! `<workers>,<input>,<n>,<elapsed_seconds>`.

use std::env;
use std::time::Instant;

use anyhow::{bail, Result};
use env_logger::Env;
use log::info;
use parbp::bitseq::BitSequence;
use parbp::tree::RangeMinMaxTree;

fn main() -> Result<()> {
    // Set the default log filter. This can be overridden using the
    // `RUST_LOG` environment variable, e.g. `RUST_LOG=debug`.
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        bail!("usage: {} <parenthesis sequence>", args[0]);
    }
    let input = &args[1];

    let b = BitSequence::from_parentheses(input)?;
    let n = b.len();

    let start = Instant::now();
    let tree = RangeMinMaxTree::new(&b)?;
    let elapsed = start.elapsed().as_secs_f64();
    info!(
        "built index: {} chunks, height {}",
        tree.num_chunks(),
        tree.height()
    );

    println!(
        "{},{},{},{}",
        parbp_maybe_rayon::num_workers(),
        input,
        n,
        elapsed
    );
    Ok(())
}

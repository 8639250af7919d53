//! framewatch - fetch frames, detect targets, and log what was found.
//!
//! Frame source and telemetry are chosen on the command line; the pipeline is
//! then driven from the interactive console (`help` lists the commands).

use anyhow::Result;

fn main() -> Result<()> {
    framewatch::cli::run()
}

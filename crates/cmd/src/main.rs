use anyhow::Result;
use clap::Parser;

use cmd::cli::{Cli, run};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let result = run(cli);
    diagnostics::flush();
    result
}

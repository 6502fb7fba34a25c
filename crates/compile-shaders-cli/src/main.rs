//! Main entrypoint for the `compile-shaders` command.

use clap::Parser as _;
use compile_shaders::Cli;

fn main() -> anyhow::Result<()> {
    env_logger::builder().init();

    let cli = Cli::parse();
    log::trace!("CLI args: {:?}", std::env::args().collect::<Vec<_>>());
    cli.command.run()
}

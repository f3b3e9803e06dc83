use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "hbcdn",
    version,
    about = "Content-delivery backend for a console homebrew store"
)]
pub struct HbcdnCli {
    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Debug, Subcommand)]
pub enum CommandCli {
    /// Run the reconciler on its schedule together with the download API.
    Serve,
    /// Run one reconcile cycle and exit.
    Reconcile {
        /// Print the cycle result as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
}

use clap::{Parser, Subcommand};

use self::{generate_records::GenerateRecordsArg, inspect::InspectArg, train::TrainArg};

mod generate_records;
mod inspect;
mod train;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Generate synthetic game records for training
    GenerateRecords(#[clap(flatten)] GenerateRecordsArg),
    /// Train an evaluator population on game records
    Train(#[clap(flatten)] TrainArg),
    /// Show a trained model, optionally scored on records
    Inspect(#[clap(flatten)] InspectArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::GenerateRecords(arg) => generate_records::run(&arg)?,
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Inspect(arg) => inspect::run(&arg)?,
    }
    Ok(())
}

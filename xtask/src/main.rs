use anyhow::Result as AnyResult;
use clap::{Parser, Subcommand};

use duct::{cmd, Expression};

#[derive(Debug, Subcommand)]
pub enum Subcommands {
    /// Runs the full workspace test suite.
    Test,

    /// Checks the project for errors.
    Check,

    /// Runs clippy and a formatting check.
    ExtraCheck,

    /// Builds the documentation.
    Doc {
        /// Whether to open the documentation in a browser.
        #[clap(long)]
        open: bool,
    },
}

#[derive(Debug, Parser)]
#[clap(about, version, propagate_version = true)]
pub struct Cli {
    #[clap(subcommand)]
    pub subcommand: Subcommands,
}

fn cargo(command: &[&str]) -> Expression {
    println!("🛠️  Running command: cargo {}", command.join(" "));

    cmd("cargo", command)
}

fn test() -> AnyResult<()> {
    cargo(&["test", "--workspace"]).run()?;

    Ok(())
}

fn check() -> AnyResult<()> {
    cargo(&["check", "--workspace", "--all-targets"]).run()?;

    Ok(())
}

fn extra_checks() -> AnyResult<()> {
    cargo(&["fmt", "--all", "--check"]).run()?;
    cargo(&["clippy", "--workspace", "--all-targets"]).run()?;

    Ok(())
}

fn docs(open: bool) -> AnyResult<()> {
    let mut args = vec!["doc", "--workspace", "--no-deps"];

    if open {
        args.push("--open");
    }

    cargo(&args).run()?;

    Ok(())
}

fn main() -> AnyResult<()> {
    let cli = Cli::parse();

    match cli.subcommand {
        Subcommands::Test => test(),
        Subcommands::Check => check(),
        Subcommands::ExtraCheck => extra_checks(),
        Subcommands::Doc { open } => docs(open),
    }
}

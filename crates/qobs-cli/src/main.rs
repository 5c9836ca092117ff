use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "qobs")]
#[command(about = "A build system and package manager for C/C++ projects", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by the build-like subcommands
#[derive(Args)]
struct BuildFlags {
    /// Build profile to use
    #[arg(long, short = 'p', default_value = "debug")]
    profile: String,
    /// Build file generator (qobs or ninja)
    #[arg(long, short = 'g', default_value = "qobs")]
    generator: String,
    /// Maximum number of concurrent compile jobs (defaults to the CPU count)
    #[arg(long, short = 'j')]
    jobs: Option<usize>,
    /// Features to enable, comma separated
    #[arg(long, value_delimiter = ',')]
    features: Vec<String>,
    /// Do not enable the package's default features
    #[arg(long)]
    no_default_features: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the package
    Build {
        /// Package directory (defaults to ".")
        path: Option<PathBuf>,
        #[command(flatten)]
        flags: BuildFlags,
    },
    /// Build and run the package
    Run {
        /// Package directory (defaults to ".")
        path: Option<PathBuf>,
        /// Arguments passed through to the program
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
        #[command(flatten)]
        flags: BuildFlags,
    },
    /// Remove the build directory
    Clean {
        /// Package directory (defaults to ".")
        path: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build { path, flags } => {
            commands::build::run(&path.unwrap_or_else(|| PathBuf::from(".")), &flags)
        }
        Commands::Run { path, args, flags } => {
            commands::run::run(&path.unwrap_or_else(|| PathBuf::from(".")), &args, &flags)
        }
        Commands::Clean { path } => {
            commands::clean::run(&path.unwrap_or_else(|| PathBuf::from(".")))
        }
    };

    if let Err(e) = result {
        qobs_build::msg::error(format!("{e:#}"));
        std::process::exit(1);
    }
}

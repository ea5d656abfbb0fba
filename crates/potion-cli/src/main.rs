//! potion CLI - Main entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "potion")]
#[command(version)]
#[command(about = "Render potion templates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template file against JSON data
    Render {
        /// Template file
        template: PathBuf,

        /// JSON file with the data to render against
        #[arg(short = 'd', long)]
        data: Option<PathBuf>,

        /// TOML file with engine settings
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Write output to FILE instead of stdout
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Print the token sequence of a template file as JSON
    Tokens {
        /// Template file
        template: PathBuf,

        /// TOML file with engine settings
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },

    /// List the templates defined in a page
    Templates {
        /// HTML page
        page: PathBuf,

        /// TOML file with engine settings
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "potion=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            template,
            data,
            config,
            output,
        } => commands::render::execute(commands::render::RenderArgs {
            template,
            data,
            config,
            output,
        }),
        Commands::Tokens { template, config } => {
            commands::tokens::execute(&template, config.as_deref())
        }
        Commands::Templates { page, config } => {
            commands::templates::execute(&page, config.as_deref())
        }
    }
}

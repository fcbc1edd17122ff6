mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    camera::CameraSubcommand, config::ConfigSubcommand, project::ProjectSubcommand,
    session::SessionSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "turntable",
    about = "Drive a relay turntable and a camera through 360° capture sessions",
    version,
    propagate_version = true
)]
struct Cli {
    /// Storage root (default: ~/turntable-projects)
    #[arg(long, global = true, env = "TURNTABLE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the storage layout and a default config.yaml
    Init,

    /// Show or validate the rig configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Manage capture projects
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Run and inspect capture sessions
    Session {
        #[command(subcommand)]
        subcommand: SessionSubcommand,
    },

    /// Rotate the turntable by hand
    Jog {
        /// Degrees to rotate, in (0, 360]
        degrees: f64,
    },

    /// Exercise the configured camera
    Camera {
        #[command(subcommand)]
        subcommand: CameraSubcommand,
    },

    /// List serial ports and flag likely microcontrollers
    Ports,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Session {
            subcommand: SessionSubcommand::Start { .. },
        }
        | Commands::Jog { .. }
        | Commands::Camera { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = root::resolve_root(cli.root.as_deref()).and_then(|root| match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Project { subcommand } => cmd::project::run(&root, subcommand, cli.json),
        Commands::Session { subcommand } => cmd::session::run(&root, subcommand, cli.json),
        Commands::Jog { degrees } => cmd::jog::run(&root, degrees, cli.json),
        Commands::Camera { subcommand } => cmd::camera::run(&root, subcommand, cli.json),
        Commands::Ports => cmd::ports::run(cli.json),
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

use crate::command;
use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "drm")]
#[command(about = "Docker Ruby Manager: per-version, per-gemset Ruby sandboxes in containers")]
#[command(after_help = "Activate a sandbox in the current shell with: eval \"$(drm use 3.3@myapp)\"")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a Ruby version, start its sandbox and print the environment that selects it
    Use {
        /// Version with optional gemset, e.g. 3.3 or 3.3@myapp (default: the base image)
        version: Option<String>,

        /// Repository prefix for the image, e.g. registry.local:5000/team
        #[arg(short = 'r', long)]
        repo: Option<String>,

        /// Open an interactive shell in the sandbox afterwards
        #[arg(long)]
        shell: bool,
    },

    /// Download a Ruby version's image without starting a sandbox
    Install {
        /// Version to install, e.g. 3.3
        version: String,

        /// Repository prefix for the image
        #[arg(short = 'r', long)]
        repo: Option<String>,
    },

    /// Run a command in the sandbox selected by `drm use` (a shell when none is given)
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// List Ruby versions available locally
    #[command(visible_alias = "list")]
    Ls {
        /// Repository prefix for the image
        #[arg(short = 'r', long)]
        repo: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse arguments and run the selected command. Returns the process exit status.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Use {
            version,
            repo,
            shell,
        } => command::use_version::run(version.as_deref(), repo.as_deref(), shell),
        Commands::Install { version, repo } => command::install::run(&version, repo.as_deref()),
        Commands::Run { command: args } => command::run::run(args),
        Commands::Ls { repo } => command::list::run(repo.as_deref()),
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(0)
        }
    }
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}

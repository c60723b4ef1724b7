use clap::{ArgAction, Parser, Subcommand};

/// CLI arguments parser using `clap`
#[derive(Parser, Debug)]
#[command(
    name = "gitswitch",
    version,
    about = "Manage and switch between multiple GitHub accounts"
)]
pub struct Cli {
    /// Log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Subcommand chosen to execute, interactive menu when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Creates SSH key, SSH host entry and git identity for an account
    Setup {
        /// GitHub account name (prompted when omitted)
        #[arg(long)]
        name: Option<String>,
        /// Email for the git identity (prompted when omitted)
        #[arg(long)]
        email: Option<String>,
        /// SSH host alias, defaults to github-<name>
        #[arg(long)]
        alias: Option<String>,
        /// GitHub personal access token to verify and store
        #[arg(long, env = "GITSWITCH_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Never prompt, use only the given flags
        #[arg(long)]
        no_input: bool,
    },
    /// Lists configured accounts
    List {
        /// Re-verify stored tokens against GitHub
        #[arg(long)]
        verify: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Makes an account the active global git identity
    #[command(alias = "use")]
    Switch {
        /// Account to activate (selected interactively when omitted)
        account: Option<String>,
    },
    /// Deletes all local data of an account
    Delete {
        /// Account to delete (selected interactively when omitted)
        account: Option<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Checks a GitHub username, and a token if given
    Verify {
        /// GitHub username
        username: String,
        /// Personal access token bound to the username
        token: Option<String>,
    },
    /// Displays the active account
    Current,
}

//! Command line surface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Work with RoseStudio scenario classes and instances in local folders
#[derive(Parser, Debug)]
#[command(name = "rose")]
#[command(version, about, long_about = None)]
pub(crate) struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub(crate) debug: bool,

    /// Write log lines as JSON
    #[arg(long, global = true)]
    pub(crate) log_json: bool,

    /// Settings file (also: ROSE_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) config: Option<PathBuf>,

    /// Answer yes to every confirmation and never prompt
    #[arg(short = 'y', long, global = true)]
    pub(crate) yes: bool,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Install a token file for the current shell
    Login {
        /// Token file with access_token and refresh_token
        #[arg(long, value_name = "FILE")]
        tokens: PathBuf,
        /// Replace the tokens of an existing login
        #[arg(short, long)]
        force: bool,
    },

    /// Remove the token file of the current shell
    Logout,

    /// Show the user the current shell is logged in as
    User {
        /// Print the full user record as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the RoseStudio server URL
    Server,

    /// List robots, backend systems, scenario classes or the instances of a class
    Ls {
        /// robots | systems | scenarios | instances
        entity: String,
        /// Name pattern (`*` and `?` wildcards) or uuid
        pattern: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
        /// Output only the uuids, comma separated
        #[arg(short, long, conflicts_with = "json")]
        uuid: bool,
        /// Columns to show, e.g. `-f NAME,Manufacturer`
        #[arg(short, long, value_delimiter = ',')]
        fields: Option<Vec<String>>,
    },

    /// Show which folders are connected to which scenario classes and instances
    Info {
        /// Only show this folder and the folders related to it
        folder: Option<PathBuf>,
        /// Show the RoseStudio page of each entry
        #[arg(short, long)]
        link: bool,
    },

    /// Connect a folder to a new or existing scenario class
    InitScenario {
        /// Folder to connect (default: current directory)
        folder: Option<PathBuf>,
        /// Create a new scenario class without asking
        #[arg(short, long, conflicts_with = "existing")]
        create: bool,
        #[command(flatten)]
        scenario: ScenarioArgs,
    },

    /// Create a new scenario class for a folder
    CreateScenario {
        folder: Option<PathBuf>,
        #[command(flatten)]
        scenario: ScenarioArgs,
    },

    /// Connect a folder to a new or existing instance of a scenario class
    InitInstance {
        /// Folder connected to the scenario class
        class_folder: PathBuf,
        /// Create a new scenario instance without asking
        #[arg(short, long, conflicts_with = "existing")]
        create: bool,
        #[command(flatten)]
        instance: InstanceArgs,
    },

    /// Create a new instance of a scenario class
    CreateInstance {
        class_folder: PathBuf,
        #[command(flatten)]
        instance: InstanceArgs,
    },

    /// Upload the code of a scenario class folder
    UpdateScenario {
        folder: PathBuf,
        /// Upload every file, not only those changed since the last upload
        #[arg(short, long)]
        full: bool,
        /// Download every connected instance folder afterwards
        #[arg(long)]
        cascade: bool,
        /// Skip the class upload and only download the instance folders
        #[arg(long, requires = "cascade")]
        instances_only: bool,
        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Generate the code of a scenario instance and download it into its folder
    UpdateInstance {
        folder: PathBuf,
        /// Do not upload the connected class folder first
        #[arg(short = 'n', long)]
        no_class_update: bool,
        /// Keep files that are not part of the generated code
        #[arg(long)]
        keep_files: bool,
        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Upload a class folder or download an instance folder
    Update {
        folder: PathBuf,
        /// Do not upload the connected class folder first (instances)
        #[arg(short = 'n', long)]
        no_class_update: bool,
        /// Upload every file (classes)
        #[arg(short, long)]
        full: bool,
        /// Keep files that are not part of the generated code (instances)
        #[arg(long)]
        keep_files: bool,
        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Check every connected folder against the server and repair or disconnect it
    Cleanup,

    /// Print the config JSON of a scenario
    ShowConfig {
        /// Connected folder, scenario name pattern or uuid
        target: String,
    },

    /// Edit the config JSON of a scenario in $EDITOR
    EditConfig {
        /// Connected folder, scenario name pattern or uuid
        target: String,
        /// Do not download the instance folder after saving
        #[arg(short = 'n', long)]
        no_update: bool,
    },

    /// List or instantiate the placeholders of a scenario
    Instantiate {
        /// Connected folder, scenario name pattern or uuid
        target: String,
        /// Placeholder to instantiate; lists the placeholders when omitted
        placeholder: Option<String>,
        /// Uuid of the object to instantiate the placeholder with
        #[arg(long, value_name = "UUID")]
        with: Option<String>,
    },

    /// Print version information
    Version,
}

/// Options of a new or connected scenario class
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct ScenarioArgs {
    /// Name of the new scenario class
    #[arg(long)]
    pub(crate) name: Option<String>,
    /// Connect to this existing scenario class (name or uuid)
    #[arg(long, value_name = "NAME|UUID")]
    pub(crate) existing: Option<String>,
    /// The new class keeps its code locally
    #[arg(long, conflicts_with = "server")]
    pub(crate) local: bool,
    /// The new class keeps its code on the server
    #[arg(long)]
    pub(crate) server: bool,
    /// Download the code of a connected class right away
    #[arg(long)]
    pub(crate) sync: bool,
    /// Do not upload the folder of a new server-side class
    #[arg(long)]
    pub(crate) no_upload: bool,
}

impl ScenarioArgs {
    pub(crate) fn is_local(&self) -> Option<bool> {
        match (self.local, self.server) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Options of a new or connected scenario instance
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct InstanceArgs {
    /// Name of the new scenario instance
    #[arg(long)]
    pub(crate) name: Option<String>,
    /// Connect to this existing instance (name or uuid)
    #[arg(long, value_name = "NAME|UUID")]
    pub(crate) existing: Option<String>,
    /// Folder for the instance (default: next to the class folder)
    #[arg(long, value_name = "DIR")]
    pub(crate) folder: Option<PathBuf>,
    /// Download the generated code right away
    #[arg(long)]
    pub(crate) sync: bool,
}

/// Options shared by uploads and downloads
#[derive(Args, Debug, Clone, Copy, Default)]
pub(crate) struct TransferArgs {
    /// Refresh the connection from the server first
    #[arg(long)]
    pub(crate) check: bool,
    /// Show what would be transferred without changing anything
    #[arg(long)]
    pub(crate) dry_run: bool,
}

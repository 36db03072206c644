use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use kiln_types::Stage;

#[derive(Parser)]
#[command(
    name = "kiln",
    about = "Kiln: track ceramic pieces from throwing to glaze firing",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (defaults to kiln.toml in the data directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Studio data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage pieces and their stage history
    Piece(PieceArgs),
    /// Attach, export, and remove photos
    Photo(PhotoArgs),
    /// Manage glazes and their recipes
    Glaze(GlazeArgs),
    /// Manage the clay body catalog
    Clay(ClayArgs),
    /// Manage kiln firings
    Firing(FiringArgs),
    /// Show pieces grouped by current stage
    Board(BoardArgs),
    /// Delete photo files no record points at
    Gc(GcArgs),
    /// Check record integrity and photo pairing
    Fsck(FsckArgs),
}

// ---- piece ----

#[derive(Args)]
pub struct PieceArgs {
    #[command(subcommand)]
    pub action: PieceAction,
}

#[derive(Subcommand)]
pub enum PieceAction {
    /// Create a piece (it starts at `thrown`)
    Add {
        name: String,
        /// Free-text clay name, kept as typed
        #[arg(long)]
        clay: Option<String>,
        /// Clay body from the catalog
        #[arg(long)]
        clay_body: Option<String>,
        #[arg(long)]
        glaze: Option<String>,
        #[arg(long)]
        form: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List pieces
    List {
        /// Only pieces currently at this stage
        #[arg(long)]
        stage: Option<Stage>,
    },
    /// Show a piece with its history and photos
    Show { piece: String },
    /// Record a stage on a given date
    Advance {
        piece: String,
        /// Stage to record (defaults to the next one)
        stage: Option<Stage>,
        /// RFC 3339 timestamp or YYYY-MM-DD (defaults to now)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Move a piece to a stage now, if it is not already there
    Move {
        piece: String,
        stage: Stage,
        #[arg(long)]
        note: Option<String>,
    },
    /// Edit piece fields
    Edit {
        piece: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        clay: Option<String>,
        #[arg(long)]
        glaze: Option<String>,
        #[arg(long)]
        form: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove one event from a piece's stage history
    Unstage { event: String },
    /// Delete a piece with its history and photos
    Rm { piece: String },
}

// ---- photo ----

#[derive(Args)]
pub struct PhotoArgs {
    #[command(subcommand)]
    pub action: PhotoAction,
}

/// Exactly one owner for a photo.
#[derive(Args, Clone, Debug)]
#[group(required = true, multiple = false)]
pub struct OwnerArgs {
    #[arg(long)]
    pub piece: Option<String>,
    #[arg(long)]
    pub glaze: Option<String>,
    #[arg(long)]
    pub firing: Option<String>,
}

#[derive(Subcommand)]
pub enum PhotoAction {
    /// Store an image file and attach it
    Attach {
        file: PathBuf,
        #[command(flatten)]
        owner: OwnerArgs,
        #[arg(long)]
        caption: Option<String>,
        /// Stage at capture (piece photos default to the current stage)
        #[arg(long)]
        stage: Option<Stage>,
    },
    /// List photos attached to an owner
    List {
        #[command(flatten)]
        owner: OwnerArgs,
        #[arg(long)]
        stage: Option<Stage>,
    },
    /// Write a photo's bytes to a file
    Export { photo: String, out: PathBuf },
    /// Delete a photo and its file
    Rm { photo: String },
}

// ---- glaze ----

#[derive(Args)]
pub struct GlazeArgs {
    #[command(subcommand)]
    pub action: GlazeAction,
}

#[derive(Subcommand)]
pub enum GlazeAction {
    /// Create a glaze
    Add {
        name: String,
        #[arg(long, default_value = "6")]
        cone: String,
        #[arg(long, default_value = "Glossy")]
        finish: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Append a recipe line
    Line {
        glaze: String,
        ingredient: String,
        percentage: f64,
    },
    /// Remove a recipe line
    Unline { line: String },
    /// List glazes
    List,
    /// Show a glaze with its recipe
    Show { glaze: String },
    /// Delete a glaze (pieces keep existing, unglazed)
    Rm { glaze: String },
}

// ---- clay ----

#[derive(Args)]
pub struct ClayArgs {
    #[command(subcommand)]
    pub action: ClayAction,
}

#[derive(Subcommand)]
pub enum ClayAction {
    /// Add a clay body to the catalog
    Add {
        name: String,
        #[arg(long)]
        cone: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List clay bodies
    List,
    /// Delete a clay body
    Rm { clay: String },
}

// ---- firing ----

#[derive(Args)]
pub struct FiringArgs {
    #[command(subcommand)]
    pub action: FiringAction,
}

#[derive(Subcommand)]
pub enum FiringAction {
    /// Record a firing
    Add {
        kiln: String,
        #[arg(long = "type", default_value = "Bisque")]
        firing_type: String,
        #[arg(long, default_value = "04")]
        cone: String,
        #[arg(long)]
        atmosphere: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Load a piece into a firing
    AddPiece { firing: String, piece: String },
    /// Take a piece out of a firing
    RemovePiece { firing: String, piece: String },
    /// List firings
    List,
    /// Delete a firing (its pieces are kept)
    Rm { firing: String },
}

// ---- maintenance ----

#[derive(Args)]
pub struct BoardArgs {
    /// Hide empty columns
    #[arg(long)]
    pub compact: bool,
}

#[derive(Args)]
pub struct GcArgs {}

#[derive(Args)]
pub struct FsckArgs {}

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod request;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a JSON dataset as a provider until interrupted.
    Serve(ServeArgs),
    /// Query rows of a table.
    Select(SelectArgs),
    /// Insert one row.
    Insert(InsertArgs),
    /// Update matching rows.
    Update(UpdateArgs),
    /// Delete matching rows.
    Delete(DeleteArgs),
    /// List the values under a map key.
    MapGet(MapGetArgs),
    /// Replace one value under a map key.
    MapSet(MapSetArgs),
    /// Add a value under a map key.
    MapAdd(MapValueArgs),
    /// Remove a value from a map key.
    MapRemove(MapValueArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Select(args) => request::select(args, format),
        Command::Insert(args) => request::insert(args, format),
        Command::Update(args) => request::update(args, format),
        Command::Delete(args) => request::delete(args, format),
        Command::MapGet(args) => request::map_get(args, format),
        Command::MapSet(args) => request::map_set(args, format),
        Command::MapAdd(args) => request::map_add(args, format),
        Command::MapRemove(args) => request::map_remove(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Directory to create the provider socket in.
    pub dir: PathBuf,
    /// Provider id; the socket is `<dir>/<provider-id>.sock`.
    #[arg(long, short = 'p')]
    pub provider_id: String,
    /// JSON dataset with `tables` and `maps`. Default: empty.
    #[arg(long, value_name = "FILE")]
    pub data: Option<PathBuf>,
}

/// Where a request goes.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Directory holding provider sockets.
    pub dir: PathBuf,
    /// Provider to address.
    #[arg(long, short = 'p')]
    pub provider_id: String,
    /// Table or map name.
    #[arg(long, short = 'd')]
    pub data_id: String,
    /// Identity announced to the provider.
    #[arg(long, env = "DATASHARE_CALLER_ID", default_value = "datashare-cli")]
    pub caller_id: String,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct PageArgs {
    /// Page to return, counted from 1.
    #[arg(long, default_value = "1")]
    pub page: i32,
    /// Rows or values per page.
    #[arg(long, default_value = "20")]
    pub per_page: i32,
}

#[derive(Args, Debug)]
pub struct SelectArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Columns to return (comma-separated, `*` for all).
    #[arg(long, short = 'c', value_delimiter = ',', default_value = "*")]
    pub columns: Vec<String>,
    /// Filter, `column = value`.
    #[arg(long = "where", value_name = "CLAUSE")]
    pub where_clause: Option<String>,
    /// Ordering, `column [ASC|DESC]`.
    #[arg(long, value_name = "CLAUSE")]
    pub order: Option<String>,
    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(Args, Debug)]
pub struct InsertArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Column value, `column=value` (repeatable).
    #[arg(long = "set", value_name = "COLUMN=VALUE", required = true)]
    pub values: Vec<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Column value, `column=value` (repeatable).
    #[arg(long = "set", value_name = "COLUMN=VALUE", required = true)]
    pub values: Vec<String>,
    /// Filter, `column = value`. Default: every row.
    #[arg(long = "where", value_name = "CLAUSE")]
    pub where_clause: Option<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Filter, `column = value`. Default: every row.
    #[arg(long = "where", value_name = "CLAUSE")]
    pub where_clause: Option<String>,
}

#[derive(Args, Debug)]
pub struct MapGetArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    #[arg(long, short = 'k')]
    pub key: String,
    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(Args, Debug)]
pub struct MapSetArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    #[arg(long, short = 'k')]
    pub key: String,
    #[arg(long)]
    pub old_value: String,
    #[arg(long)]
    pub new_value: String,
}

#[derive(Args, Debug)]
pub struct MapValueArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    #[arg(long, short = 'k')]
    pub key: String,
    #[arg(long)]
    pub value: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

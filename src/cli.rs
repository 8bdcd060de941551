use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve a novel and print its chapter manifest.
    Search(SearchArgs),
    /// Fetch a single chapter and print its text.
    Read(ReadArgs),
    /// Download a chapter range and write it as one Markdown file.
    Download(DownloadArgs),
}

#[derive(Debug, Args)]
pub struct OracleArgs {
    /// Model name for the OpenAI Responses API (overrides NOVELGRAB_OPENAI_MODEL).
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Novel name, as a reader would type it.
    #[arg(long)]
    pub name: String,

    /// Print the manifest as JSON instead of a listing.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub oracle: OracleArgs,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Novel name, as a reader would type it.
    #[arg(long)]
    pub name: String,

    /// Chapter number (1-based).
    #[arg(long)]
    pub chapter: u32,

    #[command(flatten)]
    pub oracle: OracleArgs,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Novel name, as a reader would type it.
    #[arg(long)]
    pub name: String,

    /// First chapter number of the range (inclusive).
    #[arg(long, default_value_t = 1)]
    pub start: u32,

    /// Last chapter number of the range (inclusive).
    #[arg(long)]
    pub end: u32,

    /// Output directory for the exported Markdown file.
    #[arg(long)]
    pub out: String,

    /// Pause between chapter fetches (overrides NOVELGRAB_BATCH_DELAY_MS).
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Overwrite an existing export file.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    #[command(flatten)]
    pub oracle: OracleArgs,
}

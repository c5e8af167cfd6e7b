//! CLI argument parsing using clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Evaluate XPath expressions across a folder of XML files and collect the matches in a CSV report
#[derive(Parser, Debug)]
#[command(name = "xpath-csv")]
#[command(author, version, about, long_about = None)]
#[command(after_help = r#"EXAMPLES:
    # One row per book title, with the book id alongside
    xpath-csv export data/ -x "//book/title/text()" -H Title -x "//book/@id" -H ID -o books.csv

    # Count matches per file: element expressions report a match count
    xpath-csv export data/ -x "//book" -o counts.csv

    # Discover tags and attributes before writing expressions
    xpath-csv sample data/ -n 10 -d 3

    # Compose an expression
    xpath-csv build book --attr lang=en --select @id
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Show debug logging
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate expressions over every *.xml file in a folder and write a CSV report
    Export(ExportArgs),
    /// Show the tags, attributes and sample values found in a folder
    Sample(SampleArgs),
    /// Build an XPath expression from a tag and conditions
    Build(BuildArgs),
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Folder holding the XML files (not searched recursively)
    pub folder: Option<PathBuf>,

    /// XPath expression; repeat for more columns
    #[arg(short = 'x', long = "xpath")]
    pub xpath: Vec<String>,

    /// Column header, one per --xpath (defaults to the expression text)
    #[arg(short = 'H', long = "header")]
    pub header: Vec<String>,

    /// CSV file to write
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Join all matches of a file into one row, separated by ';'
    #[arg(short = 'g', long = "group")]
    pub group: bool,

    /// Number of parallel workers
    #[arg(short = 'c', long = "concurrency")]
    pub concurrency: Option<usize>,

    /// Read folder, output and columns from a TOML job file
    #[arg(short = 'j', long = "job", conflicts_with_all = ["xpath", "header"])]
    pub job: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Tree,
    Json,
}

#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Folder holding the XML files
    pub folder: PathBuf,

    /// Maximum number of files to read
    #[arg(short = 'n', long = "max-files", default_value_t = 20)]
    pub max_files: usize,

    /// Maximum tree depth to show
    #[arg(short = 'd', long = "depth")]
    pub depth: Option<usize>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value_t = SampleFormat::Tree)]
    pub format: SampleFormat,

    /// Color output: auto (default), always, never
    #[arg(long = "color", default_value = "auto")]
    pub color: String,

    /// Disable color output
    #[arg(long = "no-color")]
    pub no_color: bool,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Element name
    pub tag: String,

    /// Attribute condition: NAME (exists) or NAME=VALUE; repeatable
    #[arg(short = 'a', long = "attr")]
    pub attr: Vec<String>,

    /// Require this element text
    #[arg(short = 't', long = "text")]
    pub text: Option<String>,

    /// Match values by substring instead of equality
    #[arg(long = "contains")]
    pub contains: bool,

    /// What to select: text, or @NAME for an attribute (default: the element)
    #[arg(short = 's', long = "select")]
    pub select: Option<String>,
}

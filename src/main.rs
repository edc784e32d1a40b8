//! richdoc - Convert merged HTML fragments in DOCX/ODT files to native markup

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use log::LevelFilter;
use serde::Deserialize;

use richdoc::{DocumentFormat, Metadata, RewriteOptions, RewriteReport, RichTextLookup};

#[derive(Parser)]
#[command(name = "richdoc")]
#[command(version, about = "Convert merged HTML fragments in DOCX/ODT files to native markup", long_about = None)]
#[command(after_help = "EXAMPLES:
    richdoc letter.docx -f fields.json              Rewrite letter.docx in place
    richdoc merged.odt out.odt -f fields.json       Write the result to out.odt
    richdoc merged.docx -f fields.json --title Q3   Also set the document title")]
struct Cli {
    /// Merged document (DOCX or ODT)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file; the input is rewritten in place when omitted
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// JSON array of HTML fragments, or object of merged field values
    #[arg(short, long, value_name = "FILE.json")]
    fragments: PathBuf,

    /// Document title
    #[arg(long)]
    title: Option<String>,

    /// Document subject
    #[arg(long)]
    subject: Option<String>,

    /// Document author
    #[arg(long)]
    author: Option<String>,

    /// Document keyword (repeatable)
    #[arg(long = "keyword", value_name = "K")]
    keywords: Vec<String>,

    /// Force the document format instead of detecting it
    #[arg(long, value_name = "docx|odt")]
    format: Option<DocumentFormat>,

    /// Suppress output messages
    #[arg(short, long)]
    quiet: bool,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Contents of the `--fragments` file.
#[derive(Deserialize)]
#[serde(untagged)]
enum FragmentFile {
    List(Vec<String>),
    Fields(BTreeMap<String, serde_json::Value>),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(report) => {
            if !cli.quiet {
                print_summary(&cli, &report);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Info,
        (false, _) => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(cli: &Cli) -> Result<RewriteReport, String> {
    let lookup = load_lookup(&cli.fragments)?;
    let mut options = RewriteOptions::default();
    if let Some(format) = cli.format {
        options = options.with_format(format);
    }
    let metadata = metadata(cli);
    if !metadata.is_empty() {
        options = options.with_metadata(metadata);
    }

    match &cli.output {
        Some(output) => {
            let data = std::fs::read(&cli.input)
                .map_err(|e| format!("{}: {e}", cli.input.display()))?;
            let (out, report) =
                richdoc::rewrite_bytes(&data, &lookup, &options).map_err(|e| e.to_string())?;
            std::fs::write(output, out).map_err(|e| format!("{}: {e}", output.display()))?;
            Ok(report)
        }
        None => richdoc::rewrite_file(&cli.input, &lookup, &options).map_err(|e| e.to_string()),
    }
}

fn metadata(cli: &Cli) -> Metadata {
    Metadata {
        title: cli.title.clone(),
        subject: cli.subject.clone(),
        author: cli.author.clone(),
        keywords: cli.keywords.clone(),
    }
}

fn load_lookup(path: &Path) -> Result<RichTextLookup, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let file: FragmentFile =
        serde_json::from_str(&text).map_err(|e| format!("{}: {e}", path.display()))?;
    let lookup = match file {
        FragmentFile::List(fragments) => fragments.into_iter().collect(),
        FragmentFile::Fields(fields) => RichTextLookup::from_values(
            fields
                .into_values()
                .filter_map(|v| v.as_str().map(str::to_string)),
        ),
    };
    Ok(lookup)
}

fn print_summary(cli: &Cli, report: &RewriteReport) {
    let target = cli.output.as_deref().unwrap_or(&cli.input);
    if report.changed {
        println!(
            "{}: converted {} fragment(s) in {} part(s)",
            target.display(),
            report.fragments_converted,
            report.converted_parts.len()
        );
    } else {
        println!("{}: nothing to convert", cli.input.display());
    }
    for skipped in &report.skipped_parts {
        println!("  skipped {}: {}", skipped.part, skipped.reason);
    }
}

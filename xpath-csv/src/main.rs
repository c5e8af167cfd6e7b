//! xpath-csv - XPath-to-CSV extraction over folders of XML files
//!
//! This is the CLI entry point: it parses arguments, drives the exporter on a
//! background thread and renders its events as a progress bar and messages.

mod cli;

use std::process::ExitCode;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, LevelFilter};

use xpath_csv_core::colors::{ansi, paint, should_use_color};
use xpath_csv_core::{
    classify, sample_folder, ExportEvent, ExportJob, ExportRequest, Exporter, MatchKind, XPathBuilder,
    XPathEngine, XPathSpec,
};

use cli::{BuildArgs, Cli, Command, ExportArgs, SampleArgs, SampleFormat};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Export(args) => run_export(args),
        Command::Sample(args) => run_sample(args),
        Command::Build(args) => run_build(args),
    }
}

/// Assemble the request from a job file or from the command line flags
fn build_request(args: &ExportArgs) -> Result<ExportRequest> {
    let mut request = match &args.job {
        Some(path) => {
            let job = ExportJob::from_path(path).with_context(|| format!("loading {}", path.display()))?;
            let mut request = job.into_request();
            if let Some(folder) = &args.folder {
                request.folder = folder.clone();
            }
            if let Some(output) = &args.output {
                request.output_path = output.clone();
            }
            request
        }
        None => {
            let Some(folder) = &args.folder else {
                bail!("no folder given (pass FOLDER or --job)");
            };
            let Some(output) = &args.output else {
                bail!("no output file given (use -o)");
            };
            if args.xpath.is_empty() {
                bail!("no XPath expressions given (use -x)");
            }
            let request = ExportRequest::new(folder, output);
            if args.header.is_empty() {
                request.with_specs(args.xpath.iter().map(XPathSpec::with_default_header))
            } else {
                // Count mismatches are reported by the exporter
                ExportRequest {
                    expressions: args.xpath.clone(),
                    headers: args.header.clone(),
                    ..request
                }
            }
        }
    };

    if args.group {
        request.group_matches = true;
    }
    if let Some(workers) = args.concurrency {
        request.max_workers = Some(workers);
    }
    Ok(request)
}

fn progress_bar() -> Result<ProgressBar> {
    if !atty::is(atty::Stream::Stderr) {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

fn run_export(args: ExportArgs) -> Result<ExitCode> {
    let request = build_request(&args)?;
    debug!("Export request: {:?}", request);

    let use_color = atty::is(atty::Stream::Stderr) && std::env::var("NO_COLOR").is_err();
    let pb = progress_bar()?;
    let exporter = Exporter::new();
    let (tx, rx) = crossbeam_channel::unbounded();

    let worker = thread::spawn(move || exporter.run(&request, tx));

    for event in rx.iter() {
        match event {
            ExportEvent::Progress(percent) => pb.set_position(u64::from(percent)),
            ExportEvent::FileStatus(message) => pb.set_message(message),
            ExportEvent::Warning { title, message } => {
                pb.suspend(|| eprintln!("{}: {}", paint(&title, ansi::YELLOW, use_color), message));
            }
            ExportEvent::Error { title, message } => {
                pb.suspend(|| eprintln!("{}: {}", paint(&title, ansi::RED, use_color), message));
            }
            ExportEvent::Info { title, message } => {
                pb.suspend(|| println!("{}: {}", title, message));
            }
            ExportEvent::Finished => break,
        }
    }
    pb.finish_and_clear();

    let outcome = worker.join().map_err(|_| anyhow!("export thread panicked"))?;
    Ok(match outcome {
        Ok(_) => ExitCode::SUCCESS,
        // Already reported through the event stream
        Err(_) => ExitCode::FAILURE,
    })
}

fn run_sample(args: SampleArgs) -> Result<ExitCode> {
    let sample = sample_folder(&args.folder, args.max_files)?;

    match args.format {
        SampleFormat::Json => println!("{}", sample.to_json()?),
        SampleFormat::Tree => {
            let use_color = !args.no_color && should_use_color(&args.color);
            if sample.is_empty() {
                println!("No XML elements found in {}", args.folder.display());
            } else {
                print!("{}", sample.format_tree(args.depth, use_color));
            }
            eprintln!(
                "{} files sampled, {} skipped",
                sample.files_sampled(),
                sample.skipped_files().len()
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// `NAME` or `NAME=VALUE`
fn parse_attr(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once('=') {
        Some((name, value)) => (name.trim(), Some(value)),
        None => (spec.trim(), None),
    }
}

fn builder_from_args(args: &BuildArgs) -> XPathBuilder {
    let mut builder = XPathBuilder::new(args.tag.trim());
    for attr in &args.attr {
        builder = match parse_attr(attr) {
            (name, None) => builder.attribute_exists(name),
            (name, Some(value)) if args.contains => builder.attribute_contains(name, value),
            (name, Some(value)) => builder.attribute_equals(name, value),
        };
    }
    if let Some(text) = &args.text {
        builder = if args.contains {
            builder.text_contains(text)
        } else {
            builder.text_equals(text)
        };
    }
    match args.select.as_deref().map(str::trim) {
        Some("text") | Some("text()") => builder.select_text(),
        Some(select) if select.starts_with('@') => builder.select_attribute(&select[1..]),
        _ => builder,
    }
}

fn run_build(args: BuildArgs) -> Result<ExitCode> {
    if let Some(select) = args.select.as_deref() {
        let select = select.trim();
        if !matches!(select, "text" | "text()") && !select.starts_with('@') {
            bail!("--select expects 'text' or '@NAME', got '{}'", select);
        }
    }

    let xpath = builder_from_args(&args).build()?;
    XPathEngine::new().check(&xpath)?;

    println!("{}", xpath);
    let reports = match classify(&xpath) {
        MatchKind::StringValue => "one value per match",
        MatchKind::Count => "match count per file",
    };
    eprintln!("reports: {}", reports);
    Ok(ExitCode::SUCCESS)
}

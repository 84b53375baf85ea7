//! Command line front end: cut, rewrite and select fields of text lines in parallel.

#[cfg(feature = "metrics")]
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use env_logger::Env;
use log::info;
use std::io;
#[cfg(feature = "metrics")]
use std::path::PathBuf;
use std::process;
use xcut::fields::FieldOptions;
use xcut::sink::WriterEmitter;
use xcut::{InputSource, Pipeline, SinkMode};

/// Split each input line on a delimiter, optionally rewrite fields with a
/// sed-like substitution, and print the selected fields.
///
/// Lines are processed by several threads. Output follows input order only
/// with --sorted.
#[derive(Parser, Debug)]
#[command(name = "xcut", version)]
struct Cli {
    /// Field delimiter (may be several characters)
    #[arg(short, long, default_value = " ", value_parser = NonEmptyStringValueParser::new())]
    delimiter: String,

    /// Fields to output, e.g. 3,1 (1-based; default all, in input order)
    #[arg(short, long, default_value = "")]
    fields: String,

    /// Fields the pattern applies to (default all)
    #[arg(short, long, default_value = "")]
    pattern_fields: String,

    /// Substitution applied to fields: s/SEARCH/REPLACE/ (write / as \/)
    #[arg(short = 'x', long, value_parser = NonEmptyStringValueParser::new())]
    pattern: Option<String>,

    /// Apply the pattern to the fields NOT listed by -p
    #[arg(short, long)]
    inverse: bool,

    /// Keep output lines in input order
    #[arg(short, long)]
    sorted: bool,

    /// Worker threads (default: number of CPUs)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Write run metrics as JSON to this file
    #[cfg(feature = "metrics")]
    #[arg(long, value_name = "FILE")]
    metrics: Option<PathBuf>,

    /// More logging on stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Input files or glob patterns; standard input if none (or `-`)
    files: Vec<String>,
}

impl Cli {
    fn field_options(&self) -> FieldOptions {
        FieldOptions {
            delimiter: self.delimiter.clone(),
            fields: self.fields.clone(),
            pattern_fields: self.pattern_fields.clone(),
            pattern: self.pattern.clone(),
            inverse: self.inverse,
        }
    }

    fn pipeline(&self) -> Pipeline {
        let mut p = Pipeline::default().with_mode(if self.sorted {
            SinkMode::Ordered
        } else {
            SinkMode::Unordered
        });
        if let Some(n) = self.threads {
            p = p.with_workers(n);
        }
        p
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Validate everything and open every input before reading a single line.
    let transform = cli.field_options().build()?;
    let input = InputSource::from_args(&cli.files)?;
    let reader = input.open()?;

    let summary = cli.pipeline().run(reader, transform, WriterEmitter::new(io::stdout()))?;
    info!("{summary}");

    #[cfg(feature = "metrics")]
    if let Some(path) = &cli.metrics {
        summary
            .to_metrics()
            .save_to_file(path)
            .with_context(|| format!("saving metrics to {}", path.display()))?;
    }
    Ok(())
}

/// Report a rejected command line the same way as any other error.
/// `--help` and `--version` still print normally and exit 0.
fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let rendered = e.to_string();
            let message = rendered.trim_start_matches("error: ").trim_end();
            eprintln!("xcut: {message}");
            process::exit(1);
        }
    }
}

fn main() {
    let cli = parse_args();
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if let Err(e) = run(&cli) {
        eprintln!("xcut: {e:#}");
        process::exit(1);
    }
}

mod render;

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use senddat_core::{
    CompileConfig, CompileError, DecodeOptions, Decoder, Entry, PrefixFormat, compile_with,
    generic_specs, generic_trie, load_specs_file, load_subcommands_file,
};
use senddat_diagnostics::{self as diag, Diagnostic, LineIndex, Severity};
use senddat_spec_tables::CommandTrie;
use tracing_subscriber::EnvFilter;

use crate::render::{
    Format, error_message, print_error_chain, print_summary, render_diagnostics_pretty,
};

// ── CLI definition ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "senddat",
    version,
    about = "Compile send-data source into ESC/POS bytes and decode ESC/POS byte streams"
)]
struct Cli {
    /// Output mode: "pretty" for coloured terminal output, "json" for
    /// machine-readable JSON. Defaults to "pretty" when stdout is a TTY,
    /// "json" otherwise.
    #[arg(long, global = true, value_parser = ["pretty", "json"])]
    output: Option<String>,

    /// Log more: -v for debug, -vv for trace. `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compile send-data source into printer bytes.
    Compile {
        /// Source file; stdin when omitted or `-`.
        input: Option<PathBuf>,
        /// Output file or device; stdout when omitted or `-`.
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
        /// Skip `*` delays.
        #[arg(long)]
        no_delay: bool,
        /// Directory `@` file names are resolved against. Defaults to the
        /// directory of the input file.
        #[arg(long)]
        include_dir: Option<PathBuf>,
        /// Longest text line accepted after `.` and `!`.
        #[arg(long, default_value_t = 250)]
        max_line_len: usize,
    },

    /// Decode an ESC/POS byte stream into commands and raw data.
    Decode {
        /// Byte stream file; stdin when omitted or `-`.
        input: Option<PathBuf>,
        /// Listing destination; stdout when omitted or `-`.
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
        #[command(flatten)]
        tables: TableArgs,
        /// Skip bytes that start an unknown command instead of failing.
        #[arg(long)]
        ignore_unknown: bool,
    },

    /// Load a command table and build its trie, reporting any error.
    CheckSpecs {
        /// Command table CSV.
        file: PathBuf,
        /// Subcommand table CSV to attach.
        #[arg(long)]
        subcommands: Option<PathBuf>,
        /// How table prefixes are written.
        #[arg(long, value_enum, default_value_t = PrefixArg::Dsl)]
        prefix_format: PrefixArg,
        /// Also list every command in the table.
        #[arg(long)]
        list: bool,
    },

    /// Explain a diagnostic ID (e.g. SD1001).
    Explain { id: String },
}

/// Command table selection shared by commands that decode.
#[derive(Args, Debug)]
struct TableArgs {
    /// Command table CSV; the built-in generic table when omitted.
    #[arg(long)]
    specs: Option<PathBuf>,
    /// Subcommand table CSV to attach to the command table.
    #[arg(long)]
    subcommands: Option<PathBuf>,
    /// How table prefixes are written.
    #[arg(long, value_enum, default_value_t = PrefixArg::Dsl)]
    prefix_format: PrefixArg,
}

/// Prefix notation of a table file.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum PrefixArg {
    /// Send-data notation, e.g. `ESC "@"`.
    Dsl,
    /// Hex bytes, e.g. `1B 40`.
    Hex,
}

impl From<PrefixArg> for PrefixFormat {
    fn from(p: PrefixArg) -> Self {
        match p {
            PrefixArg::Dsl => PrefixFormat::Dsl,
            PrefixArg::Hex => PrefixFormat::Hex,
        }
    }
}

// ── Main ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let format = Format::resolve_or_detect(cli.output.as_deref());

    match cli.cmd {
        Cmd::Compile {
            input,
            out,
            no_delay,
            include_dir,
            max_line_len,
        } => {
            let include_dir = include_dir.or_else(|| {
                stdio_path(input.as_deref())
                    .and_then(Path::parent)
                    .map(Path::to_path_buf)
            });
            let mut config = CompileConfig::default()
                .with_delay_multiplier(if no_delay { 0 } else { 1 })
                .with_max_line_len(max_line_len);
            if let Some(dir) = include_dir {
                config = config.with_include_dir(dir);
            }
            cmd_compile(input.as_deref(), out.as_deref(), &config, format)?;
        }
        Cmd::Decode {
            input,
            out,
            tables,
            ignore_unknown,
        } => cmd_decode(
            input.as_deref(),
            out.as_deref(),
            &tables,
            ignore_unknown,
            format,
        )?,
        Cmd::CheckSpecs {
            file,
            subcommands,
            prefix_format,
            list,
        } => {
            let tables = TableArgs {
                specs: Some(file),
                subcommands,
                prefix_format,
            };
            cmd_check_specs(&tables, list, format)?;
        }
        Cmd::Explain { id } => cmd_explain(&id, format)?,
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}

// ── Commands ────────────────────────────────────────────────────────────

fn cmd_compile(
    input: Option<&Path>,
    out: Option<&Path>,
    config: &CompileConfig,
    format: Format,
) -> Result<()> {
    let (bytes, name) = read_input(input)?;
    let source = String::from_utf8(bytes).with_context(|| format!("{name} is not UTF-8 text"))?;

    // `.` and `!` text shares stderr with diagnostics; bytes own stdout.
    let out_file = stdio_path(out);
    let result = match out_file {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            compile_with(&source, file, &mut io::stderr(), config)
        }
        None => compile_with(&source, io::stdout().lock(), &mut io::stderr(), config),
    };

    let diagnostics = match &result {
        Ok(report) => report.diagnostics.clone(),
        Err(e) => e.diagnostics(),
    };
    if let Err(e @ (CompileError::Write(_) | CompileError::Console(_))) = result {
        return Err(e.into());
    }

    match format {
        Format::Json => {
            let index = LineIndex::new(&source);
            let located: Vec<_> = diagnostics.iter().map(|d| index.locate(d)).collect();
            let report = serde_json::json!({
                "ok": result.is_ok(),
                "bytes_written": result.as_ref().map_or(0, |r| r.bytes_written),
                "diagnostics": located,
            });
            let text = serde_json::to_string_pretty(&report)?;
            if out_file.is_some() {
                println!("{text}");
            } else {
                eprintln!("{text}");
            }
        }
        Format::Pretty => {
            render_diagnostics_pretty(&source, &name, &diagnostics);
            print_summary(&diagnostics);
        }
    }
    if let Ok(report) = &result {
        tracing::info!(bytes = report.bytes_written, source = %name, "compiled");
    }

    exit_on_errors(&diagnostics);
    Ok(())
}

fn cmd_decode(
    input: Option<&Path>,
    out: Option<&Path>,
    tables: &TableArgs,
    ignore_unknown: bool,
    format: Format,
) -> Result<()> {
    let owned = if tables.specs.is_some() || tables.subcommands.is_some() {
        Some(build_trie(tables)?)
    } else {
        None
    };
    let trie = owned.as_ref().unwrap_or_else(|| generic_trie());

    let reader: Box<dyn Read> = match stdio_path(input) {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };
    let mut writer = open_output(out)?;
    let options = DecodeOptions::default().with_ignore_unknown(ignore_unknown);
    let decoder = Decoder::with_options(reader, trie, options);

    let failure = match format {
        Format::Pretty => {
            let mut failure = None;
            for item in decoder {
                match item {
                    Ok(entry) => writeln!(writer, "{entry}")?,
                    Err(e) => failure = Some(e),
                }
            }
            writer.flush()?;
            if let Some(e) = &failure {
                print_error_chain(e);
            }
            failure
        }
        Format::Json => {
            let mut entries: Vec<Entry<'_>> = Vec::new();
            let mut failure = None;
            for item in decoder {
                match item {
                    Ok(entry) => entries.push(entry),
                    Err(e) => failure = Some(e),
                }
            }
            let error = failure.as_ref().map(|e| {
                serde_json::json!({
                    "offset": e.offset,
                    "message": error_message(e),
                })
            });
            let listing = serde_json::json!({
                "ok": failure.is_none(),
                "entries": entries,
                "error": error,
            });
            serde_json::to_writer_pretty(&mut writer, &listing)?;
            writeln!(writer)?;
            writer.flush()?;
            failure
        }
    };

    if failure.is_some() {
        process::exit(1);
    }
    Ok(())
}

fn cmd_check_specs(tables: &TableArgs, list: bool, format: Format) -> Result<()> {
    let file = tables.specs.as_deref().unwrap_or(Path::new("-"));
    let trie = match build_trie(tables) {
        Ok(trie) => trie,
        Err(e) => {
            match format {
                Format::Json => {
                    let out = serde_json::json!({
                        "ok": false,
                        "file": file.display().to_string(),
                        "error": format!("{e:#}"),
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                Format::Pretty => print_error_chain(&*e),
            }
            process::exit(1);
        }
    };

    let subcommands: usize = trie.specs().iter().map(|s| s.subcommands.len()).sum();
    match format {
        Format::Json => {
            let mut out = serde_json::json!({
                "ok": true,
                "file": file.display().to_string(),
                "commands": trie.len(),
                "subcommands": subcommands,
                "nodes": trie.node_count(),
            });
            if list {
                out["specs"] = serde_json::to_value(trie.specs())?;
            }
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Format::Pretty => {
            if list {
                for spec in trie.specs() {
                    let args = spec.arg_names.join(" ");
                    println!("{:<16} {:<12} {}", spec.to_string(), args, spec.name);
                }
            }
            println!(
                "{}: {} commands, {} subcommands, {} trie nodes",
                file.display(),
                trie.len(),
                subcommands,
                trie.node_count()
            );
        }
    }
    Ok(())
}

fn cmd_explain(id: &str, format: Format) -> Result<()> {
    match format {
        Format::Json => {
            let out = serde_json::json!({
                "id": id,
                "explanation": diag::explain(id),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Format::Pretty => {
            if let Some(text) = diag::explain(id) {
                use ariadne::Fmt;
                println!("{}: {}", id.fg(ariadne::Color::Cyan), text);
            } else {
                println!("{id}: (no explanation available)");
            }
        }
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// Exit with code 1 if any diagnostic is an error.
fn exit_on_errors(diagnostics: &[Diagnostic]) {
    if diagnostics
        .iter()
        .any(|d| matches!(d.severity, Severity::Error))
    {
        process::exit(1);
    }
}

/// `None` for stdin/stdout: no path, or `-`.
fn stdio_path(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| *p != Path::new("-"))
}

/// Read a whole input, returning its bytes and a display name.
fn read_input(path: Option<&Path>) -> Result<(Vec<u8>, String)> {
    match stdio_path(path) {
        Some(path) => {
            let bytes =
                fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
            Ok((bytes, path.display().to_string()))
        }
        None => {
            let mut bytes = Vec::new();
            io::stdin()
                .read_to_end(&mut bytes)
                .context("cannot read stdin")?;
            Ok((bytes, "<stdin>".to_string()))
        }
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match stdio_path(path) {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}

/// Load the selected tables and build their trie. Subcommands without
/// `--specs` attach to a copy of the built-in table.
fn build_trie(tables: &TableArgs) -> Result<CommandTrie> {
    let format = PrefixFormat::from(tables.prefix_format);
    let mut specs = match &tables.specs {
        Some(path) => load_specs_file(path, format)
            .with_context(|| format!("cannot load command table {}", path.display()))?,
        None => generic_specs().to_vec(),
    };
    if let Some(path) = &tables.subcommands {
        let attached = load_subcommands_file(path, format, &mut specs)
            .with_context(|| format!("cannot load subcommand table {}", path.display()))?;
        tracing::debug!(attached, path = %path.display(), "attached subcommands");
    }
    CommandTrie::build(specs).context("cannot build command trie")
}

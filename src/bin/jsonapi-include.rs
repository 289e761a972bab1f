//! JSON:API Include CLI
//!
//! Command-line interface for rendering compound documents from a
//! declaration and a dataset, inspecting include plans, and linting
//! declarations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jsonapi_include::{
    lint, load_dataset, load_registry, ErrorDocument, FileStatus, LoadError, RequestContext,
    Settings, Severity,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "jsonapi-include")]
#[command(about = "Resolve JSON:API include paths into compound documents")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a compound document from a declaration and a dataset
    Render {
        /// Declaration source: file path or URL (http:// or https://)
        declaration: String,

        /// Dataset source: file path or URL
        #[arg(long)]
        data: String,

        /// Resource type of the primary data
        #[arg(long = "type", value_name = "TYPE")]
        rtype: String,

        /// Render a single resource instead of the collection
        #[arg(long)]
        id: Option<String>,

        /// Request query string (e.g., "include=movies&page[limit]=10")
        #[arg(long, short, default_value = "", conflicts_with = "url")]
        query: String,

        /// Full request URL; its query is parsed and it becomes the self link
        #[arg(long)]
        url: Option<String>,

        /// Settings file (.toml or .json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Show the validated include tree and the prefetch plan for a query
    Plan {
        /// Declaration source: file path or URL (http:// or https://)
        declaration: String,

        /// Resource type of the primary data
        #[arg(long = "type", value_name = "TYPE")]
        rtype: String,

        /// Request query string
        #[arg(long, short, default_value = "")]
        query: String,

        /// Settings file (.toml or .json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Lint declaration files (syntax, shape, unknown targets, member names)
    Lint {
        /// File or directory to lint
        path: PathBuf,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Suppress progress output, only show errors
        #[arg(long, short)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Render {
            declaration,
            data,
            rtype,
            id,
            query,
            url,
            config,
            output,
            pretty,
        } => run_render(RenderArgs {
            declaration,
            data,
            rtype,
            id,
            query,
            url,
            config,
            output,
            pretty,
        }),

        Commands::Plan {
            declaration,
            rtype,
            query,
            config,
            pretty,
        } => run_plan(&declaration, &rtype, &query, config.as_deref(), pretty),

        Commands::Lint {
            path,
            format,
            strict,
            quiet,
        } => run_lint(&path, &format, strict, quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report(e: LoadError) -> u8 {
    eprintln!("Error: {}", e);
    e.exit_code() as u8
}

fn load_settings(config: Option<&Path>) -> Result<Settings, u8> {
    let mut settings = match config {
        Some(path) => Settings::load(path).map_err(report)?,
        None => Settings::default(),
    };
    settings.apply_env_overrides().map_err(report)?;
    Ok(settings)
}

fn write_json(value: &Value, pretty: bool, output: Option<&Path>) -> Result<(), u8> {
    let json_output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }
    Ok(())
}

/// Print an error document and fail with exit code 1.
fn write_errors(document: ErrorDocument, pretty: bool, output: Option<&Path>) -> Result<(), u8> {
    tracing::info!(
        status = document.status(),
        errors = document.errors.len(),
        "request rejected"
    );
    write_json(&document.to_value(), pretty, output)?;
    Err(1)
}

struct RenderArgs {
    declaration: String,
    data: String,
    rtype: String,
    id: Option<String>,
    query: String,
    url: Option<String>,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    pretty: bool,
}

/// Request URL from `--url`, or built from the base URL, type, id and query.
fn request_url(args: &RenderArgs, settings: &Settings) -> Result<Url, u8> {
    let raw = match &args.url {
        Some(url) => url.clone(),
        None => {
            let base = settings.base_url.as_deref().unwrap_or("http://localhost");
            let mut url = format!("{}/{}", base.trim_end_matches('/'), args.rtype);
            if let Some(id) = &args.id {
                url.push('/');
                url.push_str(id);
            }
            if !args.query.is_empty() {
                url.push('?');
                url.push_str(args.query.trim_start_matches('?'));
            }
            url
        }
    };
    Url::parse(&raw).map_err(|e| {
        eprintln!("Error: invalid request URL \"{}\": {}", raw, e);
        2u8
    })
}

fn run_render(args: RenderArgs) -> Result<(), u8> {
    let settings = load_settings(args.config.as_deref())?;
    let registry = load_registry(&args.declaration).map_err(report)?;
    let root = registry.require(&args.rtype).map_err(report)?;
    let store = load_dataset(&args.data).map_err(report)?;
    let url = request_url(&args, &settings)?;
    let output = args.output.as_deref();

    let context = match RequestContext::from_url(root, url, &settings) {
        Ok(context) => context,
        Err(e) => return write_errors(ErrorDocument::from(&e), args.pretty, output),
    };

    match context.render(&store, args.id.as_deref()) {
        Ok(document) => write_json(&document.to_value(), args.pretty, output),
        Err(e) => write_errors(ErrorDocument::from(&e), args.pretty, output),
    }
}

fn run_plan(
    declaration: &str,
    rtype: &str,
    query: &str,
    config: Option<&Path>,
    pretty: bool,
) -> Result<(), u8> {
    let settings = load_settings(config)?;
    let registry = load_registry(declaration).map_err(report)?;
    let root = registry.require(rtype).map_err(report)?;

    let context = match RequestContext::from_query(root, query.trim_start_matches('?'), &settings)
    {
        Ok(context) => context,
        Err(e) => return write_errors(ErrorDocument::from(&e), pretty, None),
    };

    let plan = json!({
        "type": rtype,
        "paths": context.includes().paths(),
        "defaulted": context.includes().is_defaulted(),
        "include": context.includes(),
        "directives": context.directives(),
        "query": context.query(),
    });
    write_json(&plan, pretty, None)
}

fn run_lint(path: &Path, format: &str, strict: bool, quiet: bool) -> Result<(), u8> {
    if !path.exists() {
        eprintln!("Error: path not found: {}", path.display());
        return Err(2);
    }

    let result = lint(path, strict);

    if format == "json" {
        let value = serde_json::to_value(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        write_json(&value, true, None)?;
    } else {
        if !quiet {
            println!("Linting {} ...\n", path.display());
        }

        for file_result in &result.results {
            let status_icon = match file_result.status {
                FileStatus::Ok => "\x1b[32m✓\x1b[0m",
                FileStatus::Warning => "\x1b[33m⚠\x1b[0m",
                FileStatus::Error => "\x1b[31m✗\x1b[0m",
            };

            if !quiet || file_result.status != FileStatus::Ok {
                println!("  {} {}", status_icon, file_result.file.display());
            }

            for diag in &file_result.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {} - {}",
                        color, label, diag.code, diag.path, diag.message
                    );
                }
            }
        }

        println!();
        if result.is_ok() && (!strict || result.warnings == 0) {
            println!(
                "\x1b[32m✓ {} files checked, all passed\x1b[0m",
                result.files_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} files checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.files_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.is_ok() && (!strict || result.warnings == 0) {
        Ok(())
    } else {
        Err(1)
    }
}

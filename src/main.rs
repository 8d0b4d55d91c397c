//! gitsquash - scan git repositories as SQL tables
//!
//! This is the main entry point for the gitsquash command-line interface.

use std::io::{self, BufWriter, Write};
use std::process::ExitCode;
use std::sync::Arc;

use gitsquash::catalog::{Row, Schema};
use gitsquash::executor::RowIter;
use gitsquash::session::{Context, Session};
use gitsquash::storage::RepositoryPool;
use gitsquash::tables::Table;
use tracing_subscriber::EnvFilter;

struct Options {
    table: String,
    filter: Option<String>,
    skip_errors: bool,
    parallel: bool,
    json: bool,
    repos: Vec<String>,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let mut opts = Options {
        table: "commits".to_string(),
        filter: None,
        skip_errors: false,
        parallel: false,
        json: false,
        repos: Vec::new(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-t" | "--table" => {
                i += 1;
                if i < args.len() {
                    opts.table = args[i].clone();
                }
            }
            "-w" | "--where" => {
                i += 1;
                if i < args.len() {
                    opts.filter = Some(args[i].clone());
                }
            }
            "--skip-errors" => {
                opts.skip_errors = true;
            }
            "--parallel" => {
                opts.parallel = true;
            }
            "--json" => {
                opts.json = true;
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("gitsquash v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg => {
                if !arg.starts_with('-') {
                    opts.repos.push(arg.to_string());
                } else {
                    eprintln!("Unknown option: {}", arg);
                    return ExitCode::FAILURE;
                }
            }
        }
        i += 1;
    }

    if opts.repos.is_empty() {
        opts.repos.push(".".to_string());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    match run(&opts) {
        Ok(count) => {
            if !opts.json {
                eprintln!("({} rows)", count);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!("gitsquash - scan git repositories as SQL tables");
    println!();
    println!("Usage: gitsquash [OPTIONS] [REPO]...");
    println!();
    println!("Options:");
    println!("  -t, --table NAME     Table to scan (default: commits)");
    println!("  -w, --where EXPR     Keep rows matching a SQL expression");
    println!("  --skip-errors        Skip objects that fail to load");
    println!("  --parallel           Scan repositories on worker threads");
    println!("  --json               Print one JSON object per row");
    println!("  -h, --help           Show this help message");
    println!("  --version            Show version");
    println!();
    println!("Tables:");
    println!("  {}", gitsquash::catalog::TABLE_NAMES.join(", "));
    println!();
    println!("Examples:");
    println!("  gitsquash -t refs .");
    println!("  gitsquash -t ref_commits -w \"ref_name = 'HEAD'\" repo-a repo-b");
}

fn run(opts: &Options) -> Result<usize, Box<dyn std::error::Error>> {
    let mut pool = RepositoryPool::new();
    for path in &opts.repos {
        pool.add_git(path.as_str(), path)?;
    }

    let session = Session::from_env(Arc::new(pool));
    let skip = session.skip_git_errors() || opts.skip_errors;
    let ctx = Context::new(Arc::new(session.with_skip_git_errors(skip)));

    let table = Table::open(&opts.table, opts.filter.as_deref())?;
    let rows: Box<dyn RowIter> = if opts.parallel {
        Box::new(table.parallel_rows(&ctx)?)
    } else {
        Box::new(table.rows(&ctx))
    };

    print_rows(table.schema(), rows, opts.json)
}

fn print_rows(schema: &Schema, mut rows: Box<dyn RowIter>, json: bool) -> Result<usize, Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let names = schema.column_names();

    if !json {
        writeln!(out, "{}", names.join("\t"))?;
    }

    let written = write_rows(&mut out, &names, rows.as_mut(), json);
    rows.close()?;
    let count = written?;
    out.flush()?;
    Ok(count)
}

fn write_rows(
    out: &mut impl Write,
    names: &[&str],
    rows: &mut dyn RowIter,
    json: bool,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut count = 0;
    while let Some(row) = rows.next_row()? {
        if json {
            writeln!(out, "{}", json_row(names, &row)?)?;
        } else {
            let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(out, "{}", values.join("\t"))?;
        }
        count += 1;
    }
    Ok(count)
}

fn json_row(names: &[&str], row: &Row) -> serde_json::Result<String> {
    let mut object = serde_json::Map::with_capacity(names.len());
    for (name, value) in names.iter().zip(row) {
        object.insert(name.to_string(), serde_json::to_value(value)?);
    }
    serde_json::to_string(&serde_json::Value::Object(object))
}

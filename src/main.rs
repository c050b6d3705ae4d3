mod ai;
mod annotate;
mod config;
mod db;
mod export;
mod indexer;
mod logging;
mod scanner;
mod sidecar;

use anyhow::{bail, Result};
use std::path::PathBuf;

use config::Config;
use db::ImageFilter;
use export::ExportFormat;

enum Command {
    Scan { dirs: Vec<PathBuf> },
    Annotate { dirs: Vec<PathBuf>, force: bool },
    Find { filter: ImageFilter, json: bool },
    Export { output: PathBuf, format: ExportFormat, filter: ImageFilter },
    Stats,
}

struct Cli {
    config_path: Option<PathBuf>,
    command: Command,
}

fn next_value(args: &[String], i: &mut usize, flag: &str) -> String {
    *i += 1;
    match args.get(*i) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn next_number(args: &[String], i: &mut usize, flag: &str) -> i64 {
    let value = next_value(args, i, flag);
    match value.parse() {
        Ok(n) => n,
        Err(_) => {
            eprintln!("Error: {} requires a number, got '{}'", flag, value);
            std::process::exit(1);
        }
    }
}

/// Filter flags shared by `find` and `export`. Returns false when the flag
/// is not a filter flag so the caller can try its own flags.
fn parse_filter_flag(filter: &mut ImageFilter, args: &[String], i: &mut usize) -> bool {
    match args[*i].as_str() {
        "--keyword" | "-k" => filter.keywords.push(next_value(args, i, "--keyword")),
        "--person" | "-p" => filter.people.push(next_value(args, i, "--person")),
        "--object" | "-o" => filter.objects.push(next_value(args, i, "--object")),
        "--scene" | "-s" => filter.scenes.push(next_value(args, i, "--scene")),
        "--path" => filter.path_patterns.push(next_value(args, i, "--path")),
        "--type" => filter.picture_type = Some(next_value(args, i, "--type")),
        "--mood" => filter.mood = Some(next_value(args, i, "--mood")),
        "--style" => filter.style = Some(next_value(args, i, "--style")),
        "--description" | "-d" => filter.description = Some(next_value(args, i, "--description")),
        "--nudity" => filter.has_nudity = Some(true),
        "--no-nudity" => filter.has_nudity = Some(false),
        "--explicit" => filter.has_explicit = Some(true),
        "--no-explicit" => filter.has_explicit = Some(false),
        "--min-width" => filter.min_width = Some(next_number(args, i, "--min-width")),
        "--min-height" => filter.min_height = Some(next_number(args, i, "--min-height")),
        "--taken-after" => filter.taken_after = Some(next_value(args, i, "--taken-after")),
        "--taken-before" => filter.taken_before = Some(next_value(args, i, "--taken-before")),
        "--limit" | "-n" => filter.limit = Some(next_number(args, i, "--limit") as usize),
        _ => return false,
    }
    true
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut i = 1;

    // Global flags come before the subcommand
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("lumidex {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(next_value(&args, &mut i, "--config")));
            }
            _ => break,
        }
        i += 1;
    }

    let Some(subcommand) = args.get(i).cloned() else {
        print_help();
        std::process::exit(1);
    };
    i += 1;

    let command = match subcommand.as_str() {
        "scan" => {
            let mut dirs = Vec::new();
            while i < args.len() {
                if args[i].starts_with('-') {
                    eprintln!("Unknown argument for scan: {}", args[i]);
                    std::process::exit(1);
                }
                dirs.push(PathBuf::from(&args[i]));
                i += 1;
            }
            Command::Scan { dirs }
        }
        "annotate" => {
            let mut dirs = Vec::new();
            let mut force = false;
            while i < args.len() {
                match args[i].as_str() {
                    "--force" | "-f" => force = true,
                    other => dirs.push(PathBuf::from(other)),
                }
                i += 1;
            }
            Command::Annotate { dirs, force }
        }
        "find" => {
            let mut filter = ImageFilter::default();
            let mut json = false;
            while i < args.len() {
                if parse_filter_flag(&mut filter, &args, &mut i) {
                    i += 1;
                    continue;
                }
                match args[i].as_str() {
                    "--json" => json = true,
                    other => {
                        eprintln!("Unknown argument for find: {}", other);
                        std::process::exit(1);
                    }
                }
                i += 1;
            }
            Command::Find { filter, json }
        }
        "export" => {
            let mut filter = ImageFilter::default();
            let mut output = None;
            let mut format = ExportFormat::Json;
            while i < args.len() {
                if parse_filter_flag(&mut filter, &args, &mut i) {
                    i += 1;
                    continue;
                }
                match args[i].as_str() {
                    "--format" => {
                        let name = next_value(&args, &mut i, "--format");
                        format = match ExportFormat::from_name(&name) {
                            Some(format) => format,
                            None => {
                                eprintln!("Unknown export format: {}", name);
                                std::process::exit(1);
                            }
                        };
                    }
                    other if output.is_none() && !other.starts_with('-') => {
                        output = Some(PathBuf::from(other));
                    }
                    other => {
                        eprintln!("Unknown argument for export: {}", other);
                        std::process::exit(1);
                    }
                }
                i += 1;
            }
            let Some(output) = output else {
                eprintln!("Error: export requires an output path");
                std::process::exit(1);
            };
            Command::Export { output, format, filter }
        }
        "stats" => Command::Stats,
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(1);
        }
    };

    Cli { config_path, command }
}

fn print_help() {
    println!(
        r#"lumidex - AI-annotated image metadata indexer

USAGE:
    lumidex [OPTIONS] <COMMAND>

COMMANDS:
    scan [DIR...]        Rebuild the index from the given directories
                         (default: scanner.roots from the config)
    annotate [DIR...]    Write AI sidecar files next to each image
                         (--force rewrites existing sidecars)
    find [FILTERS]       Search the index
    export OUT           Export matching rows (--format json|csv)
    stats                Show row counts for the index

FILTERS (find, export):
    --keyword, -k PAT    Keyword pattern, repeatable, any may match
    --person, -p PAT     Recognized person, repeatable
    --object, -o PAT     Detected object label, repeatable
    --scene, -s PAT      Scene label, repeatable
    --path PAT           Image path pattern, repeatable
    --type PAT           Picture type (photo, screenshot, ...)
    --mood PAT           Mood
    --style PAT          Style
    --description, -d PAT  Match short or long description
    --nudity / --no-nudity         Only (un)flagged images
    --explicit / --no-explicit     Only (un)flagged images
    --min-width N        Minimum pixel width
    --min-height N       Minimum pixel height
    --taken-after DATE   EXIF date lower bound
    --taken-before DATE  EXIF date upper bound
    --limit, -n N        Cap the number of results

    Patterns support shell-style wildcards: * and ?

OPTIONS:
    --config, -c PATH    Path to config file
    --version, -V        Show version
    --help, -h           Show this help message

ENVIRONMENT:
    LUMIDEX_CONFIG       Path to config file (overrides default location)
    LUMIDEX_LOG          Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/lumidex/config.toml"#
    );
}

fn main() -> Result<()> {
    let cli = parse_args();

    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match cli.config_path {
        Some(path) => Config::load_from(&path)?,
        None => match std::env::var_os("LUMIDEX_CONFIG") {
            Some(path) => Config::load_from(&PathBuf::from(path))?,
            None => Config::load()?,
        },
    };

    match cli.command {
        Command::Scan { dirs } => run_scan(&config, dirs),
        Command::Annotate { dirs, force } => run_annotate(&config, dirs, force),
        Command::Find { filter, json } => run_find(&config, filter, json),
        Command::Export { output, format, filter } => run_export(&config, &output, format, filter),
        Command::Stats => run_stats(&config),
    }
}

fn resolve_roots(config: &Config, dirs: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let roots = if dirs.is_empty() {
        config.scanner.roots.clone()
    } else {
        dirs
    };
    if roots.is_empty() {
        bail!("no directories given and no scanner.roots configured");
    }
    Ok(roots)
}

fn run_scan(config: &Config, dirs: Vec<PathBuf>) -> Result<()> {
    let roots = resolve_roots(config, dirs)?;
    let report = indexer::rebuild_index(config, &roots)?;
    println!(
        "Indexed {} images from {} directories into {}",
        report.indexed,
        report.roots,
        config.database.path.display()
    );
    Ok(())
}

fn run_annotate(config: &Config, dirs: Vec<PathBuf>, force: bool) -> Result<()> {
    let roots = resolve_roots(config, dirs)?;
    let annotator = annotate::Annotator::new(config);

    let mut written = 0;
    let mut skipped = 0;
    let mut failed = 0;
    for root in &roots {
        let result = annotator.annotate_directory(root, force)?;
        written += result.written;
        skipped += result.skipped;
        failed += result.failed;
    }

    println!(
        "Sidecars: {} written, {} already present, {} failed",
        written, skipped, failed
    );
    Ok(())
}

fn run_find(config: &Config, filter: ImageFilter, json: bool) -> Result<()> {
    let db = indexer::ensure_index(config)?;
    let results = db::search::search(&db, &filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for record in &results {
        match record.short_description.as_deref() {
            Some(description) => println!("{}  ({})", record.path, description),
            None => println!("{}", record.path),
        }
    }
    eprintln!("{} images matched", results.len());
    Ok(())
}

fn run_export(
    config: &Config,
    output: &PathBuf,
    format: ExportFormat,
    filter: ImageFilter,
) -> Result<()> {
    let db = indexer::ensure_index(config)?;
    let count = export::export_images(&db, &filter, output, format)?;
    println!("Exported {} images to {} ({})", count, output.display(), format.name());
    Ok(())
}

fn run_stats(config: &Config) -> Result<()> {
    let db = indexer::ensure_index(config)?;
    let stats = db.stats()?;
    println!("Images:    {}", stats.images);
    println!("Keywords:  {}", stats.keywords);
    println!("People:    {}", stats.people);
    println!("Objects:   {}", stats.objects);
    println!("Scenes:    {}", stats.scenes);
    match stats.schema_version {
        Some(version) => println!("Schema:    v{}", version),
        None => println!("Schema:    unversioned"),
    }
    Ok(())
}

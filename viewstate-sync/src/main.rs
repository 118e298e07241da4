use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use glob::glob;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use viewstate_sync::diff::{added_lines, print_diff, DiffStats};
use viewstate_sync::locator::{find_state_property, has_member, locate_targets, state_properties};
use viewstate_sync::state::{
    clean_old_state, get_state_dir, record_modification, revert_run, save_run_metadata,
    show_history, InsertedMember, RunMetadata,
};
use viewstate_sync::{
    missing_mirrors, sync_all, Document, Intention, LocateError, MirrorPropertyIntention,
    NodeId, SyncConfig, SyncError, SyncOutcome, SyntaxTree,
};

#[derive(Parser)]
#[command(name = "viewstate-sync")]
#[command(about = "Mirror presenter State properties into their viewStateProxy object")]
#[command(long_about = "AST-aware helper for the presenter/ViewState convention.

For every property declared in a `State` class, the presenter's `viewStateProxy`
object literal needs a delegating member:

    override val loading by owner.delegateFor(\"loading\")

viewstate-sync inserts those members where they are missing, never twice, and
keeps the rest of the file byte-for-byte intact.")]
#[command(after_help = "Examples:
  viewstate-sync sync --path FeedContract.kt --property loading
  viewstate-sync sync --path FeedContract.kt --all --apply
  viewstate-sync check --paths app/src --exclude build")]
#[command(version)]
struct Cli {
    /// Use project-local state directory (.viewstate-sync) instead of the user data directory
    #[arg(long, global = true)]
    local_state: bool,

    /// JSON or YAML config file (defaults to $VIEWSTATE_SYNC_CONFIG, then built-in conventions)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format: "default", "diff", or "summary"
    #[arg(long, default_value = "default", global = true, value_parser = ["default", "diff", "summary"])]
    format: String,

    /// More log output (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tell whether the action is offered at a caret position
    Available {
        /// Kotlin source file
        #[arg(short, long)]
        path: PathBuf,

        /// 1-based line of the caret
        #[arg(long, requires = "column", conflicts_with = "offset")]
        line: Option<usize>,

        /// 1-based column of the caret
        #[arg(long, requires = "line")]
        column: Option<usize>,

        /// Byte offset of the caret
        #[arg(long)]
        offset: Option<usize>,
    },

    /// Mirror State properties into the presenter's proxy object
    #[command(after_help = "EXAMPLES:
    # Preview the member added for one property
    viewstate-sync sync --path FeedContract.kt --property loading --format diff

    # Same, picking the property by caret position
    viewstate-sync sync --path FeedContract.kt --line 3 --column 13

    # Mirror everything that is missing and record the run for 'revert'
    viewstate-sync sync --path FeedContract.kt --all --apply")]
    Sync {
        /// Kotlin source file
        #[arg(short, long)]
        path: PathBuf,

        /// Name of the State property to mirror
        #[arg(long, conflicts_with_all = ["line", "offset", "all"])]
        property: Option<String>,

        /// 1-based line of the caret
        #[arg(long, requires = "column", conflicts_with_all = ["offset", "all"])]
        line: Option<usize>,

        /// 1-based column of the caret
        #[arg(long, requires = "line")]
        column: Option<usize>,

        /// Byte offset of the caret
        #[arg(long, conflicts_with = "all")]
        offset: Option<usize>,

        /// Mirror every State property of the file
        #[arg(long)]
        all: bool,

        /// Write the result here instead of modifying the file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Apply changes (default is dry-run)
        #[arg(long)]
        apply: bool,
    },

    /// List State properties that have no mirror in the proxy object
    Check {
        /// Files or directories (supports multiple paths and glob patterns)
        #[arg(short, long, num_args = 1.., required = true)]
        paths: Vec<PathBuf>,

        /// Exclude paths matching these patterns (can be used multiple times)
        #[arg(long, num_args = 0..)]
        exclude: Vec<String>,
    },

    /// Print the syntax tree of a file and the mirror status of its State properties
    Inspect {
        /// Kotlin source file
        #[arg(short, long)]
        path: PathBuf,
    },

    /// Show history of applied runs
    History {
        /// Number of recent runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Revert a specific run
    Revert {
        /// Run ID to revert (from history)
        run_id: String,

        /// Force revert even if files changed since
        #[arg(long)]
        force: bool,
    },

    /// Clean old state data
    Clean {
        /// Keep runs from last N days
        #[arg(long, default_value = "30")]
        keep_days: u32,
    },
}

/// What a `sync` invocation is asked to mirror.
enum SyncTarget {
    Property(String),
    Caret(usize),
    All,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Available { path, line, column, offset } => {
            let config = SyncConfig::load(cli.config.as_deref())?;
            let document = load_document(path)?;
            let offset = caret_offset(document.tree(), *line, *column, *offset)?;
            let intention = MirrorPropertyIntention::new(config);

            let available = document
                .tree()
                .token_at_offset(offset)
                .is_some_and(|caret| intention.is_available(document.tree(), caret));
            if available {
                println!("{}", intention.presentation().text);
            } else {
                println!("not available");
            }
        }

        Commands::Sync { path, property, line, column, offset, all, output, apply } => {
            let config = SyncConfig::load(cli.config.as_deref())?;
            let target = if *all {
                SyncTarget::All
            } else if let Some(name) = property {
                SyncTarget::Property(name.clone())
            } else if line.is_some() || offset.is_some() {
                let document = load_document(path)?;
                SyncTarget::Caret(caret_offset(document.tree(), *line, *column, *offset)?)
            } else {
                bail!("Nothing to sync: pass --property, --line/--column, --offset or --all");
            };
            execute_sync(&cli, config, path, target, output.as_deref(), *apply)?;
        }

        Commands::Check { paths, exclude } => {
            let config = SyncConfig::load(cli.config.as_deref())?;
            let files = collect_kotlin_files_with_exclusions(paths, exclude)?;
            let missing = check_files(&files, &config)?;
            if missing > 0 {
                eprintln!("\n{} propert{} without a mirror", missing, if missing == 1 { "y" } else { "ies" });
                std::process::exit(1);
            }
            println!("✓ All State properties are mirrored ({} file(s) checked)", files.len());
        }

        Commands::Inspect { path } => {
            let config = SyncConfig::load(cli.config.as_deref())?;
            let document = load_document(path)?;
            inspect(document.tree(), &config);
        }

        Commands::History { limit } => {
            let state_dir = get_state_dir(cli.local_state)?;
            show_history(*limit, &state_dir)?;
        }

        Commands::Revert { run_id, force } => {
            let state_dir = get_state_dir(cli.local_state)?;
            revert_run(run_id, *force, &state_dir)?;
        }

        Commands::Clean { keep_days } => {
            let state_dir = get_state_dir(cli.local_state)?;
            let cleaned = clean_old_state(*keep_days, &state_dir)?;
            println!("✓ Cleaned {} old run(s)", cleaned);
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_document(path: &Path) -> Result<Document> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Document::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn caret_offset(
    tree: &SyntaxTree,
    line: Option<usize>,
    column: Option<usize>,
    offset: Option<usize>,
) -> Result<usize> {
    match (offset, line, column) {
        (Some(offset), _, _) => Ok(offset),
        (None, Some(line), Some(column)) => tree
            .offset_at(line, column)
            .with_context(|| format!("Position {}:{} is outside the file", line, column)),
        _ => bail!("Specify the caret with --line and --column, or with --offset"),
    }
}

fn execute_sync(
    cli: &Cli,
    config: SyncConfig,
    path: &Path,
    target: SyncTarget,
    output: Option<&Path>,
    apply: bool,
) -> Result<()> {
    let original = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut document =
        Document::parse(&original).with_context(|| format!("Failed to parse {}", path.display()))?;
    let intention = MirrorPropertyIntention::new(config);

    let result = match &target {
        SyncTarget::All => sync_all(&mut document, &intention),
        SyncTarget::Property(name) => {
            let caret = find_state_property(document.tree(), name, intention.config())
                .with_context(|| unknown_property_message(document.tree(), name, intention.config()))?;
            document.run(&intention, caret).map(|outcome| vec![outcome])
        }
        SyncTarget::Caret(offset) => {
            let caret = document
                .tree()
                .token_at_offset(*offset)
                .filter(|&caret| intention.is_available(document.tree(), caret));
            let Some(caret) = caret else {
                println!("not available: the caret is not on a property of a `{}` class", intention.config().state_class);
                return Ok(());
            };
            document.run(&intention, caret).map(|outcome| vec![outcome])
        }
    };

    let outcomes = match result {
        Ok(outcomes) => outcomes,
        Err(SyncError::Locate(LocateError::NoPresenterClass { marker })) => {
            eprintln!(
                "note: {} has no class whose name contains \"{}\"; nothing to do",
                path.display(),
                marker
            );
            return Ok(());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to sync {}", path.display()));
        }
    };

    let mut inserted = Vec::new();
    for outcome in &outcomes {
        match outcome {
            SyncOutcome::Inserted { property, member } => {
                inserted.push(inserted_member(document.tree(), property, *member));
            }
            SyncOutcome::AlreadyMirrored { property } => {
                if !matches!(target, SyncTarget::All) {
                    println!("'{}' is already mirrored", property);
                }
            }
            SyncOutcome::NoProxyProperty { class } => {
                eprintln!(
                    "note: {} has no `{}` property; nothing to do",
                    class,
                    intention.config().proxy_property
                );
                return Ok(());
            }
        }
    }

    let modified = document.text();
    if inserted.is_empty() || modified == original {
        println!("No changes: {}", path.display());
        return Ok(());
    }

    let stats = match cli.format.as_str() {
        "diff" => print_diff(path, &original, &modified),
        "summary" => {
            let (lines, stats) = added_lines(path, &original, &modified);
            for line in lines {
                println!("{}", line);
            }
            stats
        }
        _ => DiffStats::default(),
    };

    if let Some(output) = output {
        fs::write(output, &modified)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("✓ Wrote: {}", output.display());
        return Ok(());
    }

    if !apply {
        if cli.format == "default" {
            for member in &inserted {
                println!("Would add '{}' at {}:{}:{}", member.property, path.display(), member.line, member.column);
            }
        }
        println!("Would modify: {}", path.display());
        println!("\nRun with --apply to write changes");
        return Ok(());
    }

    let state_dir = get_state_dir(cli.local_state)?;
    let command = std::env::args().collect::<Vec<_>>().join(" ");
    let operation = match &target {
        SyncTarget::All => "sync --all".to_string(),
        _ => format!("sync {}", inserted.iter().map(|m| m.property.as_str()).collect::<Vec<_>>().join(",")),
    };
    let mut run = RunMetadata::new(command, operation);
    let count = inserted.len();
    record_modification(&mut run, path, &original, &modified, inserted, &state_dir)?;

    fs::write(path, &modified).with_context(|| format!("Failed to write {}", path.display()))?;
    save_run_metadata(&run, &state_dir)?;

    if cli.format != "diff" {
        println!("✓ Modified: {} ({} member(s) added)", path.display(), count);
    } else {
        stats.print_summary();
    }
    println!("Run ID: {} (revert with: viewstate-sync revert {})", run.run_id, run.run_id);
    Ok(())
}

fn inserted_member(tree: &SyntaxTree, property: &str, member: NodeId) -> InsertedMember {
    let (line, column) = tree
        .text_range(member)
        .map(|range| tree.line_col(range.start))
        .unwrap_or((0, 0));
    InsertedMember {
        property: property.to_string(),
        line,
        column,
    }
}

fn unknown_property_message(tree: &SyntaxTree, name: &str, config: &SyncConfig) -> String {
    let candidates: Vec<&str> = state_properties(tree, config)
        .into_iter()
        .filter_map(|p| p.name(tree))
        .collect();
    let mut message = format!("No property '{}' in a `{}` class", name, config.state_class);
    if let Some(suggestion) = closest_match(name, &candidates) {
        message.push_str(&format!(" (did you mean '{}'?)", suggestion));
    }
    message
}

fn closest_match<'a>(name: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&candidate| (strsim::jaro_winkler(name, candidate), candidate))
        .filter(|(score, _)| *score >= 0.8)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate)
}

/// Prints every State property without a mirror. Returns how many there are.
fn check_files(files: &[PathBuf], config: &SyncConfig) -> Result<usize> {
    let mut missing_total = 0;
    for file in files {
        let document = match load_document(file) {
            Ok(document) => document,
            Err(e) => {
                warn!("Skipping {}: {:#}", file.display(), e);
                continue;
            }
        };

        match missing_mirrors(document.tree(), config) {
            Ok(missing) => {
                for name in &missing {
                    let location = find_state_property(document.tree(), name, config)
                        .and_then(|leaf| document.tree().text_range(leaf))
                        .map(|range| document.tree().line_col(range.start));
                    match location {
                        Some((line, column)) => {
                            println!("{}:{}:{}: '{}' is not mirrored", file.display(), line, column, name)
                        }
                        None => println!("{}: '{}' is not mirrored", file.display(), name),
                    }
                }
                missing_total += missing.len();
            }
            Err(LocateError::NoPresenterClass { .. } | LocateError::NoProxyProperty { .. }) => {
                debug!("{} has no presenter proxy", file.display());
            }
            Err(err) => {
                eprintln!("{}: {}", file.display(), err);
            }
        }
    }
    Ok(missing_total)
}

fn inspect(tree: &SyntaxTree, config: &SyncConfig) {
    print!("{}", tree.dump(tree.root()));

    let properties = state_properties(tree, config);
    if properties.is_empty() {
        return;
    }
    println!("\n{} properties:", config.state_class);
    let body = locate_targets(tree, "", config).ok().map(|target| target.body);
    for property in properties {
        let Some(name) = property.name(tree) else {
            continue;
        };
        let status = match body {
            Some(body) if has_member(tree, body, name) => "mirrored",
            Some(_) => "missing",
            None => "no proxy",
        };
        println!("  {:24} {}", name, status);
    }
}

fn collect_kotlin_files_with_exclusions(paths: &[PathBuf], exclude_patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        let path_str = path.to_string_lossy();

        if path_str.contains('*') || path_str.contains('?') || path_str.contains('[') {
            for entry in glob(&path_str).context("Failed to parse glob pattern")? {
                match entry {
                    Ok(file_path) => {
                        if file_path.is_file() && is_kotlin_file(&file_path) {
                            files.push(file_path);
                        }
                    }
                    Err(e) => warn!("Error reading glob entry: {}", e),
                }
            }
        } else if path.is_file() {
            if is_kotlin_file(path) {
                files.push(path.clone());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_kotlin_file(e.path()))
            {
                files.push(entry.path().to_path_buf());
            }
        } else {
            warn!("Path not found: {}", path.display());
        }
    }

    if !exclude_patterns.is_empty() {
        files.retain(|file| {
            let file_str = file.to_string_lossy();
            !exclude_patterns.iter().any(|pattern| {
                if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
                    glob::Pattern::new(pattern)
                        .map(|p| p.matches(&file_str))
                        .unwrap_or(false)
                } else {
                    file_str.contains(pattern.as_str())
                }
            })
        });
    }

    Ok(files)
}

fn is_kotlin_file(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("kt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exclude_belongs_to_check() {
        let cli = Cli::try_parse_from(["viewstate-sync", "check", "--paths", "app/src", "--exclude", "build"]).unwrap();
        match cli.command {
            Commands::Check { paths, exclude } => {
                assert_eq!(paths, vec![PathBuf::from("app/src")]);
                assert_eq!(exclude, vec!["build".to_string()]);
            }
            _ => panic!("expected check"),
        }

        let inspect = Cli::try_parse_from(["viewstate-sync", "inspect", "--path", "a.kt", "--exclude", "build"]);
        assert!(inspect.is_err());
    }

    #[test]
    fn test_closest_match() {
        let candidates = ["loading", "items", "error"];
        assert_eq!(closest_match("loadng", &candidates), Some("loading"));
        assert_eq!(closest_match("zzz", &candidates), None);
    }

    #[test]
    fn test_collect_kotlin_files_with_exclusions() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir_all(root.join("feed"))?;
        fs::create_dir_all(root.join("build"))?;
        fs::write(root.join("feed/FeedContract.kt"), "class State")?;
        fs::write(root.join("feed/notes.md"), "")?;
        fs::write(root.join("build/Generated.kt"), "")?;

        let files = collect_kotlin_files_with_exclusions(&[root.to_path_buf()], &["build".to_string()])?;
        assert_eq!(files, vec![root.join("feed/FeedContract.kt")]);
        Ok(())
    }

    #[test]
    fn test_check_files_counts_missing() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let file = temp_dir.path().join("A.kt");
        fs::write(
            &file,
            "class State {\n    val a = 1\n    val b = 2\n}\nclass APresenter {\n    val viewStateProxy = object : P {\n        override val a by owner.delegateFor(\"a\")\n    }\n}\n",
        )?;
        assert_eq!(check_files(&[file], &SyncConfig::default())?, 1);
        Ok(())
    }

    #[test]
    fn test_caret_offset() -> Result<()> {
        let document = Document::parse("class State {\n    val a = 1\n}\n")?;
        assert_eq!(caret_offset(document.tree(), Some(2), Some(9), None)?, 22);
        assert_eq!(caret_offset(document.tree(), None, None, Some(3))?, 3);
        assert!(caret_offset(document.tree(), None, None, None).is_err());
        Ok(())
    }
}

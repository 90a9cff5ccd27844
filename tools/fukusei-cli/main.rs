use clap::{Args, Parser, Subcommand};
use fukusei::prelude::*;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Duplicate and audit form trees stored in a snapshot file
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the records a duplication of ROOT would clone
    Closure(Target),
    /// Duplicate ROOT and write the updated snapshot
    Duplicate {
        #[command(flatten)]
        target: Target,

        /// Use this suffix instead of allocating the next free one
        #[arg(short, long)]
        suffix: Option<Suffix>,

        /// Attach the cloned root under this node instead of the original's parent
        #[arg(short, long)]
        parent: Option<String>,

        /// Append the suffix to cloned labels and display names
        #[arg(long)]
        labels: bool,

        /// Keep shared references on cloned nodes
        #[arg(long)]
        preserve_shared: bool,

        /// Skip the post-commit audit
        #[arg(long)]
        no_verify: bool,

        /// Options file (JSON); flags override its values
        #[arg(short, long)]
        config: Option<String>,

        /// Where to write the updated snapshot (defaults to the input file)
        #[arg(short, long)]
        output: Option<String>,

        /// Print the result as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check that the clone of ROOT matches its original
    Audit {
        #[command(flatten)]
        target: Target,

        /// Suffix the clone was produced with. Without it, ROOT is taken to be
        /// the clone and its last suffix segment is stripped.
        #[arg(short, long)]
        suffix: Option<Suffix>,

        /// Node the cloned root was attached under, if it was moved
        #[arg(short, long, requires = "suffix")]
        parent: Option<String>,

        /// Expect cloned nodes to have kept their shared references
        #[arg(long)]
        preserve_shared: bool,

        /// Print the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct Target {
    /// Snapshot file: `.bin` for bincode, anything else for JSON
    snapshot: String,
    /// Identity of the root node
    root: String,
    /// `node` or `subtree`
    #[arg(short, long, default_value = "subtree")]
    mode: DuplicationMode,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Closure(target) => run_closure(target),
        Command::Duplicate {
            target,
            suffix,
            parent,
            labels,
            preserve_shared,
            no_verify,
            config,
            output,
            json,
        } => {
            let mut options = match config {
                Some(path) => DuplicationOptions::from_file(&path).unwrap_or_else(|e| {
                    exit_with_error(&format!("Failed to load options: {}", e))
                }),
                None => DuplicationOptions::default(),
            };
            options.suffix_labels |= labels;
            options.preserve_shared_references |= preserve_shared;
            options.verify_after_commit &= !no_verify;

            let mut request = DuplicationRequest::new(target.root.as_str(), target.mode);
            request.suffix = suffix;
            request.target_parent = parent.map(Id::from);
            run_duplicate(&target.snapshot, request, options, output, json);
        }
        Command::Audit {
            target,
            suffix,
            parent,
            preserve_shared,
            json,
        } => run_audit(target, suffix, parent, preserve_shared, json),
    }
}

fn load_store(path: &str) -> MemoryStore {
    let snapshot = if path.ends_with(".bin") {
        StoreSnapshot::from_binary_file(path)
    } else {
        StoreSnapshot::from_json_file(path)
    }
    .unwrap_or_else(|e| exit_with_error(&format!("Failed to load snapshot: {}", e)));

    tracing::info!(records = snapshot.record_count(), path, "Loaded snapshot");
    MemoryStore::from_snapshot(snapshot)
        .unwrap_or_else(|e| exit_with_error(&format!("Invalid snapshot: {}", e)))
}

fn save_store(store: &MemoryStore, path: &str) {
    let snapshot = store
        .snapshot()
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to read store: {}", e)));
    let saved = if path.ends_with(".bin") {
        snapshot.save_binary(path)
    } else {
        snapshot.save_json(path)
    };
    saved.unwrap_or_else(|e| exit_with_error(&format!("Failed to save snapshot: {}", e)));
    tracing::info!(records = snapshot.record_count(), path, "Wrote snapshot");
}

fn run_closure(target: Target) {
    let store = load_store(&target.snapshot);
    let reader = store
        .reader()
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to read store: {}", e)));
    let closure = ClosureResolver::new(reader.as_ref())
        .resolve(&Id::from(target.root.as_str()), target.mode)
        .unwrap_or_else(|e| exit_with_error(&format!("Closure resolution failed: {}", e)));

    println!(
        "\nClosure of '{}' ({}): {} records",
        closure.root(),
        closure.mode(),
        closure.len()
    );
    for kind in EntityKind::ALL {
        let ids = closure.ids(kind);
        if !ids.is_empty() {
            let list: Vec<&str> = ids.iter().map(Id::as_str).collect();
            println!("  {:<15} {}", kind.as_str(), list.join(", "));
        }
    }
}

fn run_duplicate(
    snapshot: &str,
    request: DuplicationRequest,
    options: DuplicationOptions,
    output: Option<String>,
    json: bool,
) {
    let store = load_store(snapshot);
    let duplicator = Duplicator::builder(&store).with_options(options).build();

    let start = Instant::now();
    let result = duplicator.execute(&request).unwrap_or_else(|e| {
        exit_with_error(&format!("Duplication failed during {}: {}", e.stage(), e))
    });
    let duration = start.elapsed();

    if json {
        let text = serde_json::to_string_pretty(&result)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to encode result: {}", e)));
        println!("{}", text);
    } else {
        println!("\n{}", AuditFormatter::format_result(&result));
        println!("Duplication took {:?}", duration);
    }

    save_store(&store, output.as_deref().unwrap_or(snapshot));
    if !result.warnings.is_empty() {
        std::process::exit(2);
    }
}

fn run_audit(
    target: Target,
    suffix: Option<Suffix>,
    parent: Option<String>,
    preserve_shared: bool,
    json: bool,
) {
    let store = load_store(&target.snapshot);
    let root = Id::from(target.root.as_str());
    let mode = target.mode;
    let auditor = Auditor::new(&store).preserve_shared_references(preserve_shared);

    let report = match (&suffix, parent) {
        (Some(suffix), Some(parent)) => auditor.audit_placed(&root, mode, suffix, &Id::from(parent)),
        (Some(suffix), None) => auditor.audit(&root, mode, suffix),
        (None, _) => auditor.audit_lineage(&root, mode),
    }
    .unwrap_or_else(|e| exit_with_error(&format!("Audit failed: {}", e)));

    if json {
        let text = serde_json::to_string_pretty(&report)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to encode report: {}", e)));
        println!("{}", text);
    } else {
        println!("\n{}", AuditFormatter::format_report(&report));
    }
    if !report.is_clean() {
        std::process::exit(2);
    }
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}

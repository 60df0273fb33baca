//! `nereus index` command implementation.

use std::path::{Path, PathBuf};

use colored::Colorize;
use nereus::{BatchReport, Nereus};

const MAX_ERRORS_SHOWN: usize = 5;

/// Run the index command.
pub fn run(workspace: &Path, rebuild: bool, files: &[PathBuf]) -> Result<(), nereus::Error> {
    println!("{} {}...", "Indexing".cyan().bold(), workspace.display());

    let nereus = Nereus::new(workspace)?;

    if !files.is_empty() {
        let report = nereus.ingest_batch(files)?;
        print_batch(&report);
        return Ok(());
    }

    let report = if rebuild {
        println!("{}", "Rebuilding graph from scratch".yellow());
        nereus.rebuild()?
    } else {
        nereus.sync()?
    };

    print_batch(&report.batch);

    if !report.removed.is_empty() {
        println!(
            "{}: {} files no longer on disk",
            "Removed".yellow(),
            report.removed.len()
        );
    }
    if report.unsupported > 0 {
        println!(
            "{}: {} files (no extractor configured)",
            "Skipped".yellow(),
            report.unsupported
        );
    }
    if !report.directories_skipped.is_empty() {
        println!(
            "{}: {} directories (unreadable)",
            "Skipped".yellow(),
            report.directories_skipped.len()
        );
    }

    Ok(())
}

fn print_batch(report: &BatchReport) {
    println!();
    println!(
        "{} {} files ({} unchanged), {} symbols, {} relations",
        "Indexed".green().bold(),
        report.indexed(),
        report.unchanged(),
        report.stats.symbols_written,
        report.stats.relations_written
    );
    println!("{}: {:.2?}", "Duration".dimmed(), report.duration);

    if report.stats.unresolved > 0 {
        println!(
            "{}: {} (bound to the external placeholder)",
            "Unresolved relations".dimmed(),
            report.stats.unresolved
        );
    }

    let errors: Vec<_> = report.errors().collect();
    if !errors.is_empty() {
        println!();
        println!("{} ({}):", "Errors".red().bold(), errors.len());
        for err in errors.iter().take(MAX_ERRORS_SHOWN) {
            println!("  {} {}: {}", "•".red(), err.path.display(), err.message);
        }
        if errors.len() > MAX_ERRORS_SHOWN {
            println!("  ... and {} more", errors.len() - MAX_ERRORS_SHOWN);
        }
    }
}

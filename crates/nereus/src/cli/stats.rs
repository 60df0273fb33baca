//! `nereus stats` command implementation.

use std::path::Path;

use colored::Colorize;
use nereus::Nereus;

/// Run the stats command.
pub fn run(workspace: &Path, verify: bool) -> Result<(), nereus::Error> {
    let nereus = Nereus::new(workspace)?;

    let db_path = nereus.store().path();
    let db_size_str = match std::fs::metadata(db_path) {
        Ok(meta) => format_size(meta.len()),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => {
                tracing::debug!("Database file not found");
                "not created".to_string()
            }
            std::io::ErrorKind::PermissionDenied => {
                tracing::warn!(path = %db_path.display(), "Permission denied reading database");
                "permission denied".to_string()
            }
            _ => {
                tracing::debug!(error = %e, "Failed to get database file size");
                "size unknown".to_string()
            }
        },
    };

    let stats = nereus.stats()?;

    println!("{}", "Nereus Graph Statistics".cyan().bold());
    println!();

    println!(
        "  {}: {} ({})",
        "Database".white().bold(),
        db_path.display(),
        db_size_str
    );
    println!(
        "  {}: {}",
        "Store version".white().bold(),
        nereus.store_version()
    );
    println!();

    println!(
        "  {}: {} total, {} critical",
        "Files".white().bold(),
        stats.file_count.to_string().green(),
        stats.critical_file_count.to_string().yellow()
    );
    println!();

    println!(
        "  {}: {} total",
        "Symbols".white().bold(),
        stats.symbol_count.to_string().green()
    );

    // Sort by count descending, then by kind for deterministic output
    let mut kind_counts = stats.symbols_by_kind.clone();
    kind_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (kind, count) in kind_counts {
        println!("    {}: {}", kind.as_str().dimmed(), count);
    }
    println!();

    println!(
        "  {}: {} ({} unresolved)",
        "Relations".white().bold(),
        stats.relation_count.to_string().green(),
        stats.unresolved_relation_count
    );
    println!(
        "  {}: {}",
        "File relations".white().bold(),
        stats.file_relation_count.to_string().green()
    );

    if stats.skipped_unknown_kinds > 0 {
        println!();
        println!(
            "  {}: {} symbols with unknown kind",
            "Warning".yellow().bold(),
            stats.skipped_unknown_kinds.to_string().yellow()
        );
        println!(
            "    {}",
            "Database may be from a newer Nereus version. Consider rebuilding.".dimmed()
        );
    }

    if verify {
        println!();
        let violations = nereus.verify_integrity()?;
        if violations.is_empty() {
            println!("  {}: {}", "Integrity".white().bold(), "ok".green());
        } else {
            println!(
                "  {}: {} violations",
                "Integrity".white().bold(),
                violations.len().to_string().red().bold()
            );
            for v in &violations {
                println!("    {} {v}", "•".red());
            }
        }
    }

    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

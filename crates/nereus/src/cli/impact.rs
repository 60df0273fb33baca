//! `nereus impact` command implementation.

use std::path::Path;

use colored::Colorize;
use nereus::{ImpactEntry, Nereus};

use super::display::{print_flags, scope_label};

/// Run the impact command.
pub fn run(workspace: &Path, path: &Path, transitive: bool) -> Result<(), nereus::Error> {
    let nereus = Nereus::new(workspace)?;
    let impact = nereus.get_file_impact(path, transitive)?;

    println!(
        "Impact analysis for {}:",
        path.display().to_string().cyan().bold()
    );
    println!();

    let direct: Vec<_> = impact.direct().collect();
    println!(
        "  {} ({} files):",
        "Direct dependents".white().bold(),
        direct.len().to_string().green()
    );
    print_entries(&direct, "(none)");

    if transitive {
        println!();
        let indirect: Vec<_> = impact.transitive().collect();
        println!(
            "  {} ({} files):",
            "Transitive dependents".white().bold(),
            indirect.len().to_string().yellow()
        );
        print_entries(&indirect, "(none beyond direct)");
    }

    println!();
    print_flags(impact.depth_limited, false, impact.truncated, impact.max_depth);
    Ok(())
}

fn print_entries(entries: &[&ImpactEntry], empty_message: &str) {
    if entries.is_empty() {
        println!("    {}", empty_message.dimmed());
        return;
    }

    for entry in entries {
        let critical = if entry.critical {
            format!(" {}", "CRITICAL".red().bold())
        } else {
            String::new()
        };
        println!(
            "    {} {} {} [{}]{}",
            "•".dimmed(),
            entry.file.path.display(),
            format!("({}, depth {})", entry.reason.as_str(), entry.depth).dimmed(),
            scope_label(entry.scope),
            critical
        );
    }
}

//! `nereus cycles` command implementation.

use std::path::Path;

use colored::Colorize;
use nereus::Nereus;

/// Run the cycles command.
pub fn run(workspace: &Path) -> Result<(), nereus::Error> {
    let nereus = Nereus::new(workspace)?;

    let cycles = nereus.call_cycles()?;

    if cycles.is_empty() {
        println!("{}", "No call cycles detected.".green());
        return Ok(());
    }

    println!(
        "Found {} call cycles:",
        cycles.len().to_string().red().bold()
    );
    println!();

    for (i, cycle) in cycles.iter().enumerate() {
        println!(
            "  {} {} ({} symbols):",
            "Cycle".yellow().bold(),
            i + 1,
            cycle.members.len()
        );
        for (symbol, file) in &cycle.members {
            println!(
                "    {} {} {}",
                "•".dimmed(),
                symbol.name.white().bold(),
                format!("- {}:{}", file.path.display(), symbol.line_start).dimmed()
            );
        }
    }

    Ok(())
}

//! `nereus callers` and `nereus callees` command implementation.

use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use nereus::{CancelToken, Direction, Nereus};

use super::display::print_traversal;

/// Run the callers or callees command.
pub fn run(
    workspace: &Path,
    symbol: &str,
    file: Option<&Path>,
    depth: Option<u32>,
    timeout_ms: Option<u64>,
    direction: Direction,
) -> Result<(), nereus::Error> {
    let nereus = Nereus::new(workspace)?;
    let cancel = match timeout_ms {
        Some(ms) => CancelToken::with_timeout(Duration::from_millis(ms)),
        None => CancelToken::new(),
    };

    let (traversal, title, empty) = match direction {
        Direction::Callers => (
            nereus.get_callers_with(symbol, file, depth, &cancel)?,
            "Callers",
            "(no callers)",
        ),
        Direction::Callees => (
            nereus.get_callees_with(symbol, file, depth, &cancel)?,
            "Callees",
            "(no callees)",
        ),
    };

    println!(
        "{} of \"{}\" (up to depth {}):",
        title,
        symbol.cyan().bold(),
        traversal.max_depth
    );
    println!();
    print_traversal(&traversal, empty);

    let total = traversal.hits().count();
    let critical = traversal.hits().filter(|h| h.critical).count();
    println!(
        "{}: {} symbols, {} in critical files",
        "Total".dimmed(),
        total.to_string().green(),
        if critical > 0 {
            critical.to_string().red().bold()
        } else {
            critical.to_string().normal()
        }
    );

    Ok(())
}

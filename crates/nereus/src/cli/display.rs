//! Common display utilities for CLI commands.

use colored::{ColoredString, Colorize};
use nereus::{Scope, Traversal, TraversalHit};

const MAX_DISPLAY_ITEMS: usize = 25;

/// Colored label for a scope.
pub fn scope_label(scope: Scope) -> ColoredString {
    match scope {
        Scope::Local => scope.as_str().dimmed(),
        Scope::Module => scope.as_str().cyan(),
        Scope::Global => scope.as_str().yellow(),
    }
}

/// One traversal hit: name, location, scope, and critical marker.
fn print_hit(hit: &TraversalHit) {
    let location = match hit.line {
        Some(line) => format!("{}:{line}", hit.file.path.display()),
        None => hit.file.path.display().to_string(),
    };
    let critical = if hit.critical {
        format!(" {}", "CRITICAL".red().bold())
    } else {
        String::new()
    };
    println!(
        "      {} {} {} [{}]{}",
        "•".dimmed(),
        hit.symbol.name.white().bold(),
        format!("- {location}").dimmed(),
        scope_label(hit.scope),
        critical
    );
}

/// Print a traversal grouped by root, then by depth.
///
/// Each depth shows at most `MAX_DISPLAY_ITEMS` hits.
pub fn print_traversal(traversal: &Traversal, empty_message: &str) {
    if traversal.is_ambiguous() {
        println!(
            "  {}: {} symbols share this name; showing each",
            "note".yellow(),
            traversal.roots.len()
        );
        println!();
    }

    for root in &traversal.roots {
        println!(
            "  {} {}:",
            root.root.name.cyan().bold(),
            format!("({}:{})", root.file.path.display(), root.root.line_start).dimmed()
        );
        if root.levels.is_empty() {
            println!("    {}", empty_message.dimmed());
        }
        for (depth, level) in (1..).zip(&root.levels) {
            println!("    {} {depth}:", "depth".dimmed());
            for hit in level.iter().take(MAX_DISPLAY_ITEMS) {
                print_hit(hit);
            }
            if level.len() > MAX_DISPLAY_ITEMS {
                println!(
                    "      {} ... and {} more",
                    "•".dimmed(),
                    level.len() - MAX_DISPLAY_ITEMS
                );
            }
        }
        println!();
    }

    print_flags(
        traversal.depth_limited,
        traversal.depth_capped,
        traversal.truncated,
        traversal.max_depth,
    );
}

/// Explain why a result may be incomplete.
pub fn print_flags(depth_limited: bool, depth_capped: bool, truncated: bool, max_depth: u32) {
    if depth_capped {
        println!(
            "{}: requested depth exceeds the configured maximum; used {max_depth}",
            "note".yellow()
        );
    }
    if depth_limited {
        println!(
            "{}: more results exist beyond depth {max_depth}",
            "note".yellow()
        );
    }
    if truncated {
        println!(
            "{}: query was cancelled; showing completed levels only",
            "warning".yellow().bold()
        );
    }
}

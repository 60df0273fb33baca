//! `nereus search` command implementation.

use std::path::Path;

use colored::Colorize;
use nereus::{Nereus, SymbolKind};

const VALID_KINDS: &str = "function, method, struct, class, enum, union, typedef, interface, macro, variable, constant, field, module";

/// Run the search command.
pub fn run(
    workspace: &Path,
    pattern: &str,
    kind_filter: Option<&str>,
    limit: usize,
) -> Result<(), nereus::Error> {
    let nereus = Nereus::new(workspace)?;

    let kind = kind_filter
        .map(|k| {
            SymbolKind::parse(&k.to_lowercase()).ok_or_else(|| {
                nereus::Error::Config(format!(
                    "unknown symbol kind '{k}'. Valid kinds: {VALID_KINDS}"
                ))
            })
        })
        .transpose()?;

    let mut symbols = nereus.search_symbols(pattern, kind)?;
    symbols.truncate(limit);

    if symbols.is_empty() {
        println!("No symbols found matching \"{pattern}\"");

        let stats = nereus.stats()?;
        if stats.symbol_count == 0 {
            println!(
                "\n{}: The graph is empty. Run '{}' to index your workspace.",
                "hint".dimmed(),
                "nereus index".cyan()
            );
        } else if kind_filter.is_some() {
            println!(
                "\n{}: Try searching without the --kind filter, or check available symbol kinds with '{}'.",
                "hint".dimmed(),
                "nereus stats".cyan()
            );
        }
        return Ok(());
    }

    println!(
        "Found {} symbols matching \"{}\":",
        symbols.len().to_string().green().bold(),
        pattern.cyan()
    );
    println!();

    for (sym, file) in &symbols {
        let location = format!("{}:{}", file.path.display(), sym.line_start);
        println!(
            "  {} {} {}",
            sym.name.white().bold(),
            format!("({})", sym.kind).dimmed(),
            format!("- {location}").dimmed()
        );

        if let Some(sig) = &sym.signature {
            println!("    {}", sig.dimmed());
        }
    }

    Ok(())
}

//! Extract command implementation for snipcheck CLI.
//!
//! Lists the snippets of one document, a debugging aid for fence and
//! section detection.

use std::path::Path;

use snipcheck_core::{CompilerProfile, Snippet, extract};

use crate::check::OutputFormat;
use crate::colors;

/// Print the snippets of `file`.
///
/// The profile next to the file (if any) decides the section depth and
/// which languages count as checked.
pub fn execute(file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", file.display()))?;
    let dir = file.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let profile = CompilerProfile::discover(dir)?;

    let snippets: Vec<Snippet> = extract(&text)
        .with_section_depth(profile.section_depth)
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snippets)?),
        OutputFormat::Human => print_human(file, &snippets, &profile),
    }
    Ok(())
}

fn print_human(file: &Path, snippets: &[Snippet], profile: &CompilerProfile) {
    let color = colors::stdout_enabled();
    println!(
        "{} {} snippets",
        colors::paint(&file.display().to_string(), colors::BOLD, color),
        snippets.len()
    );

    for snippet in snippets {
        let status = if snippet.malformed {
            colors::paint("malformed", colors::RED, color)
        } else if snippet.attributes.ignore || !profile.is_checked_language(&snippet.language) {
            colors::paint("unchecked", colors::DIM, color)
        } else {
            colors::paint("checked", colors::GREEN, color)
        };
        let language = if snippet.language.is_empty() {
            "-"
        } else {
            snippet.language.as_str()
        };

        let mut line = format!(
            "  #{:<3} {:<10} lines {}-{}  section {}  {status}",
            snippet.index, language, snippet.span.start_line, snippet.span.end_line, snippet.section
        );
        if let Some(id) = &snippet.attributes.id {
            line.push_str(&format!("  id={id}"));
        }
        if let Some(target) = &snippet.attributes.continues {
            line.push_str(&format!("  continues={target}"));
        }
        if snippet.attributes.standalone {
            line.push_str("  standalone");
        }
        println!("{line}");
    }
}

//! Console interaction with the operator: listing sources and reading answers.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::catalog::Source;

/// Parse a comma-separated ordinal list. Entries that are not numbers are
/// skipped with a warning; range checks happen in `SourceCatalog::resolve`.
pub fn parse_selection(input: &str) -> Vec<u32> {
    input
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse::<u32>() {
            Ok(ordinal) => Some(ordinal),
            Err(_) => {
                log::warn!("ignoring selection entry '{}': not a number", entry);
                None
            }
        })
        .collect()
}

pub fn print_sources<W: Write>(output: &mut W, sources: &[Source]) -> Result<()> {
    writeln!(output, "Discovered sources:")?;
    for source in sources {
        writeln!(output, "  {}", source)?;
    }
    Ok(())
}

/// Ask `question` and return the trimmed answer, or `default` on a blank line
/// or end of input.
pub fn prompt_line<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    default: Option<&str>,
) -> Result<String> {
    match default {
        Some(default) => write!(output, "{} (default is {}): ", question, default)?,
        None => write!(output, "{}: ", question)?,
    }
    output.flush()?;

    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("failed to read operator input")?;
    let answer = line.trim();
    if answer.is_empty() {
        Ok(default.unwrap_or_default().to_string())
    } else {
        Ok(answer.to_string())
    }
}

/// List `sources` and ask which ordinals to monitor.
pub fn prompt_selection<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    sources: &[Source],
) -> Result<Vec<u32>> {
    print_sources(output, sources)?;
    let answer = prompt_line(
        input,
        output,
        "Enter the indices of sources to monitor (comma-separated)",
        None,
    )?;
    Ok(parse_selection(&answer))
}

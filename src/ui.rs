// UI layer: terminal input and output for the CLI. Kept apart from the
// client so the core never touches stdin/stdout directly.

use std::io::{self, BufRead, IsTerminal, Write};

use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result};
use crate::shares::Share;

const MIN_CELL_WIDTH: usize = 5;
const CELL_PADDING: usize = 2;

/// Print shares as `name  encryption  description`, columns aligned.
pub fn render_shares<W: Write>(out: &mut W, shares: &[Share]) -> io::Result<()> {
    let rows: Vec<[&str; 3]> = shares
        .iter()
        .map(|s| [s.name.as_str(), s.encryption.as_str(), s.description.as_str()])
        .collect();

    let width = |col: usize| {
        rows.iter()
            .map(|row| row[col].chars().count() + CELL_PADDING)
            .max()
            .unwrap_or(0)
            .max(MIN_CELL_WIDTH)
    };
    let (name_width, encryption_width) = (width(0), width(1));

    for [name, encryption, description] in rows {
        writeln!(
            out,
            "{name:<name_width$}{encryption:<encryption_width$}{description}"
        )?;
    }
    out.flush()
}

/// Read a password: a hidden prompt on a terminal, otherwise one line
/// from stdin.
pub fn read_password(prompt: &str) -> Result<String> {
    let stdin = io::stdin();
    let password = if stdin.is_terminal() {
        Password::new().with_prompt(prompt).interact()?
    } else {
        eprintln!("{prompt} (passing via stdin is also ok):");
        read_line(stdin.lock())?
    };
    if password.is_empty() {
        return Err(Error::validation("password"));
    }
    Ok(password)
}

/// Hidden prompt that only works on a terminal, for secrets that must not
/// be read from a stdin which may carry other input.
pub fn prompt_secret(prompt: &str) -> Result<String> {
    if !io::stdin().is_terminal() {
        return Err(Error::validation("account password (--password / SYNO_PASSWORD)"));
    }
    Ok(Password::new().with_prompt(prompt).interact()?)
}

/// One line from `reader`, without its line terminator.
pub fn read_line<R: BufRead>(mut reader: R) -> io::Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(line)
}

/// Progress bar for a batch of `len` unlocks, drawn on stderr.
pub fn batch_progress(len: usize) -> ProgressBar {
    let style = ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(len as u64).with_style(style)
}

//! CLI command that prints a program in canonical form.

#![allow(clippy::needless_pass_by_value)]

use super::{read_source, CliError};
use codevolve::syntax;
use std::path::PathBuf;

/// Execute the fmt command.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub(crate) fn execute(file: PathBuf, check: bool) -> Result<(), CliError> {
    let source = read_source(&file)?;
    let canonical = syntax::render(&syntax::parse(&source)?);
    if check {
        if canonical != source {
            return Err(CliError::new(format!(
                "{} is not in canonical form",
                file.display()
            )));
        }
        return Ok(());
    }
    print!("{canonical}");
    Ok(())
}

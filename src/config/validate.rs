// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{GuardFile, GuardSpec, RawGuardFile};
use crate::errors::{GuardError, Result};

impl TryFrom<RawGuardFile> for GuardFile {
    type Error = crate::errors::GuardError;

    fn try_from(raw: RawGuardFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_file(&raw)?;
        Ok(GuardFile::new_unchecked(raw.guard))
    }
}

fn validate_raw_file(file: &RawGuardFile) -> Result<()> {
    ensure_has_guards(file)?;
    for (idx, spec) in file.guard.iter().enumerate() {
        validate_guard(idx, spec)?;
    }
    Ok(())
}

fn ensure_has_guards(file: &RawGuardFile) -> Result<()> {
    if file.guard.is_empty() {
        return Err(GuardError::ConfigError(
            "config must contain at least one [[guard]] table".to_string(),
        ));
    }
    Ok(())
}

/// Check one guard; `idx` is its position in the file (0-based).
pub fn validate_guard(idx: usize, spec: &GuardSpec) -> Result<()> {
    match spec.cmd.first() {
        None => {
            return Err(GuardError::ConfigError(format!(
                "guard #{} has an empty `cmd`",
                idx + 1
            )));
        }
        Some(program) if program.trim().is_empty() => {
            return Err(GuardError::ConfigError(format!(
                "guard #{} has an empty program name in `cmd`",
                idx + 1
            )));
        }
        Some(_) => {}
    }

    if spec.kill_timeout == Duration::ZERO {
        return Err(GuardError::ConfigError(format!(
            "guard #{}: kill_timeout must be greater than zero",
            idx + 1
        )));
    }

    if let Some(pattern) = spec.patterns.iter().find(|p| p.trim().is_empty()) {
        return Err(GuardError::ConfigError(format!(
            "guard #{} has an empty pattern {pattern:?}",
            idx + 1
        )));
    }

    Ok(())
}

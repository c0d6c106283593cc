use log::{debug, warn};
use std::path::Path;
use std::process::Command;

#[derive(Debug, PartialEq, Eq)]
pub enum HookOutcome {
    /// No command configured.
    Skipped,
    /// Program path does not exist.
    Invalid,
    Ran(Option<i32>),
    SpawnFailed,
}

/// Run a pre/post command (`argv` list) if one is configured.
///
/// Hook problems are reported but never stop the backup.
pub fn run_if(cmd: &[String]) -> HookOutcome {
    let Some(program) = cmd.first() else {
        return HookOutcome::Skipped;
    };
    if !Path::new(program).exists() {
        eprintln!("invalid command: {cmd:?}");
        return HookOutcome::Invalid;
    }

    debug!("executing: {cmd:?}");
    match Command::new(program).args(&cmd[1..]).status() {
        Ok(status) => {
            if !status.success() {
                warn!("{cmd:?} exited with {status}");
            }
            HookOutcome::Ran(status.code())
        }
        Err(e) => {
            warn!("could not run {cmd:?}: {e}");
            HookOutcome::SpawnFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_skipped() {
        assert_eq!(run_if(&[]), HookOutcome::Skipped);
    }

    #[test]
    fn missing_program_is_invalid() {
        let cmd = vec!["/definitely/not/here".to_string(), "x".to_string()];
        assert_eq!(run_if(&cmd), HookOutcome::Invalid);
    }

    #[cfg(unix)]
    #[test]
    fn runs_existing_program() {
        let cmd = vec!["/bin/sh".to_string(), "-c".to_string(), "exit 3".to_string()];
        assert_eq!(run_if(&cmd), HookOutcome::Ran(Some(3)));
    }
}

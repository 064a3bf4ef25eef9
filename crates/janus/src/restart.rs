//! Graceful restart: start a fresh copy of this process.
//!
//! Runs after teardown, so the old listeners are already closed and the
//! replacement can bind the same ports.

use std::env;
use std::io;
use std::process::Command;

use tracing::info;

use crate::error::OrchestratorError;

/// Builds the command that re-runs the current binary with the same
/// arguments and environment.
pub(crate) fn restart_command() -> io::Result<Command> {
    let mut command = Command::new(env::current_exe()?);
    command.args(env::args_os().skip(1));
    Ok(command)
}

/// Spawns the replacement process and returns its pid.
pub(crate) fn spawn_replacement() -> Result<u32, OrchestratorError> {
    let child = restart_command()
        .and_then(|mut command| command.spawn())
        .map_err(OrchestratorError::Restart)?;

    info!(pid = child.id(), "Started replacement process");
    Ok(child.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_command_reuses_binary_and_arguments() {
        let command = restart_command().unwrap();

        assert_eq!(command.get_program(), env::current_exe().unwrap().as_os_str());

        let args: Vec<_> = command.get_args().collect();
        let expected: Vec<_> = env::args_os().skip(1).collect();
        assert_eq!(args.len(), expected.len());
        assert!(args.iter().zip(&expected).all(|(a, b)| *a == b.as_os_str()));
    }
}

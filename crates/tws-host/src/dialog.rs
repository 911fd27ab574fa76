//! External directory picker used by `openDirectoryDialog`.

use crate::command::CommandRunner;
use tracing::debug;
use tws_core::{TwsError, TwsResult};

/// Run the configured picker and return the chosen directory.
///
/// `Ok(None)` means the user cancelled: the picker exited non-zero or
/// printed nothing.
pub fn pick_directory(runner: &dyn CommandRunner, command: &[String]) -> TwsResult<Option<String>> {
    let Some((program, args)) = command.split_first() else {
        return Err(TwsError::Other("no directory picker configured".into()));
    };

    let output = runner
        .run(program, args)
        .map_err(|e| TwsError::Other(format!("directory picker {program} unavailable: {e}")))?;
    if !output.success {
        debug!(program = %program, stderr = %output.stderr.trim(), "directory picker cancelled");
        return Ok(None);
    }

    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::fake::FakeRunner;
    use crate::command::CommandOutput;

    fn picker() -> Vec<String> {
        vec!["zenity".into(), "--file-selection".into(), "--directory".into()]
    }

    #[test]
    fn chosen_directory_is_trimmed() {
        let runner = FakeRunner::returning(CommandOutput::ok("/home/u/thesis\n"));
        assert_eq!(
            pick_directory(&runner, &picker()).unwrap().as_deref(),
            Some("/home/u/thesis")
        );
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].0, "zenity");
        assert_eq!(calls[0].1, vec!["--file-selection", "--directory"]);
    }

    #[test]
    fn cancel_and_empty_output_yield_none() {
        let runner = FakeRunner::returning(CommandOutput::failed(""));
        assert_eq!(pick_directory(&runner, &picker()).unwrap(), None);

        let runner = FakeRunner::returning(CommandOutput::ok("\n"));
        assert_eq!(pick_directory(&runner, &picker()).unwrap(), None);
    }

    #[test]
    fn unconfigured_or_missing_picker_is_an_error() {
        let runner = FakeRunner::returning(CommandOutput::ok("/x"));
        assert!(pick_directory(&runner, &[]).is_err());

        let runner = FakeRunner::missing_binary();
        assert!(pick_directory(&runner, &picker()).is_err());
    }
}

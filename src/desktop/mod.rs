pub use account::Account;
pub use screen_resolution::ScreenResolution;
pub use display_server::DisplayServer;
pub use audio_server::AudioServer;

mod account;
mod screen_resolution;
mod display_server;
mod audio_server;

use crate::common::{CommandLine, Executor};

/// Kills the processes of a user matching a pattern with `pkill`.
///
/// # Arguments
/// * `pattern` - The process name (`exact`) or a pattern matched against the full command line.
///
/// # Returns
/// `true` if the command ran and either killed something or found nothing to kill.
pub fn kill_user_processes(executor: &dyn Executor, account: &Account, pattern: &str, exact: bool) -> bool {
    let command = CommandLine::new("pkill")
        .args(["-u", account.username()])
        .arg(if exact { "-x" } else { "-f" })
        .arg(pattern);

    match executor.run(&command) {
        // pkill exits with 1 when no process matched
        Ok(output) if output.code == Some(0) || output.code == Some(1) => {
            if output.success() {
                debug!("Killed {} processes of user {}", pattern, account.username());
            }
            true
        },
        Ok(output) => {
            warn!("Could not kill {} processes of user {}: {}", pattern, account.username(), output.diagnostic());
            false
        },
        Err(error) => {
            warn!("Could not kill {} processes of user {}: {}", pattern, account.username(), error);
            false
        }
    }
}

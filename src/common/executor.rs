use std::fmt;
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use nix::unistd::{Gid, Uid, setgid, setgroups, setuid};

use crate::common::{ProcessHandle, Result, System, WebdeskError};
use crate::desktop::Account;

/// A description of an external program invocation.
#[derive(Clone, Debug)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    user: Option<Account>,
    stdin: Option<Vec<u8>>,
}

impl CommandLine {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            user: None,
            stdin: None,
        }
    }

    /// Builds a command line from a program followed by its arguments, eg a configured command.
    pub fn from_parts(parts: &[String]) -> Result<Self> {
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| WebdeskError::SystemError("Empty command in settings".to_string()))?;
        Ok(Self::new(program).args(args))
    }

    pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self where I: IntoIterator<Item = S>, S: AsRef<str> {
        self.args.extend(args.into_iter().map(|arg| arg.as_ref().to_string()));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    /// Runs the command as the given account (uid, gid, supplementary groups and HOME).
    pub fn as_user(mut self, account: &Account) -> Self {
        self.user = Some(account.clone());
        self
    }

    pub fn stdin(mut self, input: &[u8]) -> Self {
        self.stdin = Some(input.to_vec());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn user(&self) -> Option<&Account> {
        self.user.as_ref()
    }

    pub fn input(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.program)?;
        for arg in &self.args {
            write!(formatter, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a command run to completion.
#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// A short diagnostic combining the exit code and stderr (or stdout when stderr is empty).
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr_text();
        let text = if stderr.trim().is_empty() { self.stdout_text() } else { stderr };
        let text = text.trim();
        match self.code {
            Some(code) => format!("exit code {}: {}", code, text),
            None => format!("terminated by signal: {}", text),
        }
    }
}

/// The `Executor` trait is the single seam through which every external program is invoked.
pub trait Executor: Send + Sync {
    /// Runs a command to completion and captures its output.
    /// An `Err` means the program could not be started at all.
    fn run(&self, command: &CommandLine) -> Result<CommandOutput>;

    /// Spawns a long-running command whose output is forwarded to the console.
    fn spawn(&self, name: &str, command: &CommandLine) -> Result<ProcessHandle>;

    /// Checks whether a binary is available on the PATH.
    fn has_binary(&self, binary: &str) -> bool;

    /// Runs a command and converts a non-zero exit status into an error built by `error`.
    fn run_checked(&self, command: &CommandLine, error: fn(String) -> WebdeskError) -> Result<CommandOutput> {
        let output = self.run(command).map_err(|err| error(format!("Failed to run \"{}\": {}", command, err)))?;
        if !output.success() {
            return Err(error(format!("\"{}\" failed with {}", command, output.diagnostic())));
        }
        Ok(output)
    }
}

/// Executes commands on the local system.
pub struct SystemExecutor {
}

impl SystemExecutor {
    pub fn new() -> Self {
        Self {
        }
    }

    fn build_command(&self, command_line: &CommandLine) -> Command {
        let mut command = Command::new(command_line.program());
        command.args(command_line.get_args());

        if let Some(account) = command_line.user() {
            command
                .env("HOME", account.home())
                .env("USER", account.username())
                .env("LOGNAME", account.username())
                .current_dir(account.home());

            // Switching identity is only possible (and only needed) when running as root
            if System::get_current_user_uid() == 0 && account.uid() != 0 {
                let gids: Vec<Gid> = account.groups().iter().map(|&g| Gid::from_raw(g)).collect();
                let uid = Uid::from_raw(account.uid());
                let gid = Gid::from_raw(account.gid());

                unsafe {
                    // Groups have to be set before dropping root with setuid
                    command
                        .pre_exec(move || {
                            setgroups(&gids)?;
                            setgid(gid)?;
                            setuid(uid)?;
                            Ok(())
                        });
                }
            }
        }

        for (key, value) in &command_line.envs {
            command.env(key, value);
        }

        command
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for SystemExecutor {
    fn run(&self, command_line: &CommandLine) -> Result<CommandOutput> {
        let mut command = self.build_command(command_line);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        trace!("Running command: {}", command_line);

        let output = match command_line.input() {
            Some(input) => {
                command.stdin(Stdio::piped());
                let mut child = command.spawn()?;
                if let Some(mut stdin) = child.stdin.take() {
                    stdin.write_all(input)?;
                }
                child.wait_with_output()?
            },
            None => command.stdin(Stdio::null()).output()?,
        };

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn spawn(&self, name: &str, command_line: &CommandLine) -> Result<ProcessHandle> {
        let mut command = self.build_command(command_line);
        command.stdin(Stdio::null());

        let process = ProcessHandle::new(name, &mut command)?;
        debug!("Spawned {} [pid={}]: {}", name, process.pid(), command_line);
        Ok(process)
    }

    fn has_binary(&self, binary: &str) -> bool {
        which::which(binary).is_ok()
    }
}

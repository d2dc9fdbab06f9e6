use std::fmt;

/// Quotes a word for a POSIX shell. Words made only of safe characters are left untouched.
pub fn quote(word: &str) -> String {
    let safe = !word.is_empty() && word.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if safe {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', "'\\''"))
}

fn command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(quote)
        .collect::<Vec<String>>()
        .join(" ")
}

/// The startup script executed by the VNC server when the display session begins.
#[derive(Clone, Debug, Default)]
pub struct StartupScript {
    lines: Vec<String>,
}

impl StartupScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unset(mut self, variable: &str) -> Self {
        self.lines.push(format!("unset {}", variable));
        self
    }

    pub fn export(mut self, variable: &str, value: &str) -> Self {
        self.lines.push(format!("export {}={}", variable, quote(value)));
        self
    }

    /// Runs a program in the background.
    pub fn spawn(mut self, program: &str, args: &[String]) -> Self {
        self.lines.push(format!("{} &", command(program, args)));
        self
    }

    /// Replaces the shell with a program: the session ends when it exits.
    pub fn exec(mut self, program: &str, args: &[String]) -> Self {
        self.lines.push(format!("exec {}", command(program, args)));
        self
    }
}

impl fmt::Display for StartupScript {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(formatter, "#!/bin/sh")?;
        for line in &self.lines {
            writeln!(formatter, "{}", line)?;
        }
        Ok(())
    }
}

use std::fmt;

use crate::common::{Result, WebdeskError};

/// Ordered `key: value` properties, as read by the gateway web application.
#[derive(Clone, Debug, Default)]
pub struct Properties {
    entries: Vec<(String, String)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property, replacing any previous value of the key.
    /// Keys and values spanning several lines are rejected since they would inject extra properties.
    pub fn set<V: ToString>(&mut self, key: &str, value: V) -> Result<()> {
        let value = value.to_string();
        if key.is_empty() || key.contains(&[':', '=', '\n', '\r'][..]) || key.contains(char::is_whitespace) {
            return Err(WebdeskError::ArtifactError(format!("Invalid property key \"{}\"", key.escape_debug())));
        }
        if value.contains(&['\n', '\r'][..]) {
            return Err(WebdeskError::ArtifactError(format!("Invalid value for property {}", key)));
        }

        match self.entries.iter_mut().find(|(existing, _)| existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(existing, _)| existing == key).map(|(_, value)| value.as_str())
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(formatter, "{}: {}", key, value)?;
        }
        Ok(())
    }
}

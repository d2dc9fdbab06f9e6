use std::fmt;
use std::path::PathBuf;

use crate::common::ProcessHandle;
use super::Teardown;

/// Something acquired during startup that has to be released on exit.
pub enum Resource {
    DisplayServer,
    AudioServer,
    Container(String),
    ProfileDirectory(PathBuf),
    LogFollower(ProcessHandle),
}

impl fmt::Display for Resource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::DisplayServer => write!(formatter, "display server"),
            Resource::AudioServer => write!(formatter, "audio server"),
            Resource::Container(name) => write!(formatter, "container {}", name),
            Resource::ProfileDirectory(path) => write!(formatter, "browser profile {}", path.display()),
            Resource::LogFollower(process) => write!(formatter, "log follower {}", process.name()),
        }
    }
}

/// Scoped ownership of the session resources. Resources are released in reverse acquisition
/// order when `release_all` is called or when the guard is dropped, so early returns, errors
/// and panics all clean up.
pub struct Resources {
    teardown: Teardown,
    acquired: Vec<Resource>,
}

impl Resources {
    pub fn new(teardown: Teardown) -> Self {
        Self {
            teardown,
            acquired: Vec::new(),
        }
    }

    pub fn acquire(&mut self, resource: Resource) {
        trace!("Acquired {}", resource);
        self.acquired.push(resource);
    }

    fn release(&self, resource: Resource) {
        debug!("Releasing {}", resource);
        match resource {
            Resource::DisplayServer => self.teardown.stop_display(),
            Resource::AudioServer => self.teardown.stop_audio(),
            Resource::Container(name) => self.teardown.stop_container(&name),
            Resource::ProfileDirectory(path) => self.teardown.remove_profile(&path),
            Resource::LogFollower(process) => {
                if let Err(error) = process.kill() {
                    warn!("Could not stop {}: {}", process.name(), error);
                }
            }
        }
    }

    /// Releases everything acquired so far. Calling it again does nothing.
    pub fn release_all(&mut self) {
        if self.acquired.is_empty() {
            return;
        }

        info!("Stopping the session");
        while let Some(resource) = self.acquired.pop() {
            self.release(resource);
        }
        info!("Session stopped");
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        self.release_all();
    }
}

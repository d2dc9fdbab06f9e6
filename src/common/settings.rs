use crate::common::{Result, WebdeskError, System};
use crate::desktop::ScreenResolution;

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Default locations searched for a settings file when none is given on the command line.
const DEFAULT_CONFIG_FILES: [&str; 2] = ["/etc/webdesk/webdesk-config.yml", "config.yml"];

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: Option<String>,
    pub console: Option<bool>,
    pub file: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
            console: Some(true),
            file: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplaySettings {
    pub number: u32,
    pub geometry: String,
    pub depth: u32,
    pub window_manager: String,
    pub browser: String,
    pub browser_args: Vec<String>,
    pub start_url: Option<String>,
    pub profile_root: String,
}

impl DisplaySettings {
    /// The X display identifier, eg ":1".
    pub fn display_id(&self) -> String {
        format!(":{}", self.number)
    }

    /// The VNC port is fixed by the display number.
    pub fn vnc_port(&self) -> u16 {
        5900 + self.number as u16
    }

    pub fn resolution(&self) -> Result<ScreenResolution> {
        self.geometry.parse()
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            number: 1,
            geometry: "1920x1080".to_string(),
            depth: 24,
            window_manager: "openbox-session".to_string(),
            browser: "google-chrome".to_string(),
            browser_args: vec!["--no-first-run".to_string(), "--start-maximized".to_string()],
            start_url: None,
            profile_root: "/tmp".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AudioSettings {
    pub port: u16,
    pub bridge_subnet: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            port: 4713,
            bridge_subnet: "172.16.0.0/12".to_string(),
        }
    }
}

/// How the gateway containers reach the display and audio servers running on the host.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Dedicated bridge network, the host is reached through an inserted host alias.
    Bridge,
    /// The containers share the host network namespace.
    Host,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReadinessSettings {
    pub interval_ms: u64,
    pub attempts: u32,
    pub backoff: f64,
    pub max_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub path: String,
    pub marker: String,
}

impl ReadinessSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            attempts: 30,
            backoff: 1.0,
            max_interval_ms: 10000,
            request_timeout_ms: 2000,
            path: "/guacamole/".to_string(),
            marker: "Guacamole".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContainerSettings {
    pub name: String,
    pub image: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GatewaySettings {
    pub engine: String,
    pub engine_group: String,
    pub daemon_start: Vec<String>,
    pub network_mode: NetworkMode,
    pub network: String,
    pub host_alias: String,
    pub backend: ContainerSettings,
    pub frontend: ContainerSettings,
    pub backend_port: u16,
    pub web_port: u16,
    pub internal_web_port: u16,
    pub home: String,
    pub username: String,
    pub password: Option<String>,
    pub log_tail: u32,
    pub readiness: ReadinessSettings,
}

impl GatewaySettings {
    /// Address of the host (display and audio servers) as seen from inside the gateway containers.
    pub fn host_address(&self) -> &str {
        match self.network_mode {
            NetworkMode::Bridge => &self.host_alias,
            NetworkMode::Host => "127.0.0.1",
        }
    }

    /// Address of the backend as seen from the frontend container.
    pub fn backend_address(&self) -> &str {
        match self.network_mode {
            NetworkMode::Bridge => &self.backend.name,
            NetworkMode::Host => "127.0.0.1",
        }
    }

    pub fn readiness_url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.web_port, self.readiness.path)
    }

    pub fn properties_path(&self) -> String {
        format!("{}/guacamole.properties", self.home)
    }

    pub fn user_mapping_path(&self) -> String {
        format!("{}/user-mapping.xml", self.home)
    }

    pub fn container_names(&self) -> [&str; 2] {
        [&self.frontend.name, &self.backend.name]
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            engine: "docker".to_string(),
            engine_group: "docker".to_string(),
            daemon_start: vec!["service".to_string(), "docker".to_string(), "start".to_string()],
            network_mode: NetworkMode::Bridge,
            network: "webdesk-net".to_string(),
            host_alias: "host.docker.internal".to_string(),
            backend: ContainerSettings {
                name: "webdesk-guacd".to_string(),
                image: "guacamole/guacd".to_string(),
            },
            frontend: ContainerSettings {
                name: "webdesk-guacamole".to_string(),
                image: "guacamole/guacamole".to_string(),
            },
            backend_port: 4822,
            web_port: 8080,
            internal_web_port: 8080,
            home: "/etc/webdesk/guacamole".to_string(),
            username: "webdesk".to_string(),
            password: None,
            log_tail: 50,
            readiness: ReadinessSettings::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PackageRequirement {
    pub binary: String,
    pub package: String,
}

impl PackageRequirement {
    pub fn new(binary: &str, package: &str) -> Self {
        Self {
            binary: binary.to_string(),
            package: package.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SetupSettings {
    pub update_command: Vec<String>,
    pub install_command: Vec<String>,
    pub packages: Vec<PackageRequirement>,
}

impl Default for SetupSettings {
    fn default() -> Self {
        Self {
            update_command: vec!["apt-get".to_string(), "update".to_string()],
            install_command: vec!["apt-get".to_string(), "install".to_string(), "-y".to_string()],
            packages: vec![
                PackageRequirement::new("vncserver", "tigervnc-standalone-server"),
                PackageRequirement::new("vncpasswd", "tigervnc-tools"),
                PackageRequirement::new("pulseaudio", "pulseaudio"),
                PackageRequirement::new("openbox-session", "openbox"),
                PackageRequirement::new("docker", "docker.io"),
                PackageRequirement::new("ss", "iproute2"),
                PackageRequirement::new("pkill", "procps"),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LimitSettings {
    pub enabled: bool,
    pub shm_path: String,
    pub shm_size: String,
    pub nofile: u64,
    pub nproc: u64,
    pub directory: String,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            shm_path: "/dev/shm".to_string(),
            shm_size: "2g".to_string(),
            nofile: 65536,
            nproc: 8192,
            directory: "/etc/security/limits.d".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingSettings,
    pub user: String,
    #[serde(default)]
    pub vnc_password: Option<String>,
    #[serde(default)]
    pub display: DisplaySettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub setup: SetupSettings,
    #[serde(default)]
    pub limits: LimitSettings,
}

impl Settings {
    /// Loads the settings from the given file (or the default locations when empty) and the process environment.
    pub fn new(config_path: &str) -> Result<Self> {
        let environment: HashMap<String, String> = std::env::vars().collect();
        let path = if config_path.is_empty() { None } else { Some(config_path) };
        Self::load(path, &environment)
    }

    /// Builds the settings from defaults, an optional YAML file and the given environment.
    ///
    /// Nested values are overridden with `WEBDESK_<SECTION>__<KEY>` variables. The flat variables
    /// `WEBDESK_USER`, `GEOMETRY`, `DEPTH`, `WEB_PORT`, `GUAC_USERNAME`, `GUAC_PASSWORD` and `VNC_PASSWORD`
    /// take precedence over everything else.
    pub fn load(config_path: Option<&str>, environment: &HashMap<String, String>) -> Result<Self> {
        let default_user = environment
            .get("SUDO_USER")
            .filter(|user| !user.is_empty())
            .cloned()
            .unwrap_or_else(|| "root".to_string());

        let mut builder = config::Config::builder().set_default("user", default_user)?;

        builder = match config_path {
            Some(path) => builder.add_source(config::File::new(path, config::FileFormat::Yaml)),
            None => DEFAULT_CONFIG_FILES.iter().fold(builder, |builder, path| {
                builder.add_source(config::File::new(path, config::FileFormat::Yaml).required(false))
            }),
        };

        let flat_overrides = [
            ("WEBDESK_USER", "user"),
            ("GEOMETRY", "display.geometry"),
            ("DEPTH", "display.depth"),
            ("WEB_PORT", "gateway.web_port"),
            ("GUAC_USERNAME", "gateway.username"),
            ("GUAC_PASSWORD", "gateway.password"),
            ("VNC_PASSWORD", "vnc_password"),
        ];

        builder = builder.add_source(
            config::Environment::with_prefix("WEBDESK")
                .prefix_separator("_")
                .separator("__")
                .source(Some(environment.clone())),
        );

        for (variable, key) in flat_overrides {
            let value = environment.get(variable).filter(|value| !value.is_empty()).cloned();
            builder = builder.set_override_option(key, value)?;
        }

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Checks that the settings are usable for launching a session. Logs every problem found.
    pub fn verify(&self) -> bool {
        // The launcher installs packages, remounts filesystems and switches users
        let uid = System::get_current_user_uid();
        if uid != 0 {
            error!("App has to be run as root");
            return false;
        }

        if let Err(error) = self.validate() {
            error!("{}", error);
            return false;
        }

        true
    }

    /// Validates the values of the settings independently of the current privileges.
    pub fn validate(&self) -> Result<()> {
        if self.user.is_empty() {
            return Err(WebdeskError::SystemError("Target user is missing from settings".to_string()));
        }

        self.display.resolution()?;

        if ![8, 16, 24, 32].contains(&self.display.depth) {
            return Err(WebdeskError::SystemError(format!("Unsupported display depth {}", self.display.depth)));
        }

        if self.display.number > 99 {
            return Err(WebdeskError::SystemError(format!("Display number {} is out of range", self.display.number)));
        }

        if self.gateway.readiness.attempts == 0 {
            return Err(WebdeskError::SystemError("Gateway readiness attempts must be greater than zero".to_string()));
        }

        if self.gateway.readiness.backoff < 1.0 {
            return Err(WebdeskError::SystemError(format!("Gateway readiness backoff {} must be at least 1.0", self.gateway.readiness.backoff)));
        }

        if self.gateway.network_mode == NetworkMode::Host && self.gateway.web_port != self.gateway.internal_web_port {
            return Err(WebdeskError::SystemError(format!(
                "The web port {} cannot be remapped in host network mode (the gateway listens on {})",
                self.gateway.web_port, self.gateway.internal_web_port
            )));
        }

        if self.gateway.home.is_empty() {
            return Err(WebdeskError::SystemError("Gateway home is missing from settings".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
impl Settings {
    /// Settings built from the defaults alone, whatever configuration files the host has.
    pub fn defaults() -> Self {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("empty.yml");
        std::fs::File::create(&path).unwrap();
        Settings::load(Some(path.to_str().unwrap()), &HashMap::new()).unwrap()
    }
}

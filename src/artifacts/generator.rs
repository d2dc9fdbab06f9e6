use std::net::IpAddr;
use std::sync::Arc;

use crate::common::{CommandLine, Executor, Result, Settings, WebdeskError};
use crate::desktop::Account;
use crate::fs::{create_owned_directory, write_file};
use super::{Properties, SessionCredentials, StartupScript, XmlElement};

/// Where the gateway home is mounted inside the frontend container.
pub const GATEWAY_CONTAINER_HOME: &str = "/etc/guacamole";

/// Prefix of the transient browser profile directories.
pub const PROFILE_DIRECTORY_PREFIX: &str = "webdesk-browser-";

/// Paths of the files written for one session.
#[derive(Clone, Debug)]
pub struct GeneratedArtifacts {
    pub password_file: String,
    pub startup_script: String,
    pub audio_acl: String,
    pub gateway_properties: String,
    pub user_mapping: String,
    pub profile_directory: String,
}

/// Path of the browser profile directory of a session.
pub fn profile_directory(profile_root: &str, session_id: &str) -> String {
    format!("{}/{}{}", profile_root.trim_end_matches('/'), PROFILE_DIRECTORY_PREFIX, session_id)
}

/// The `ArtifactGenerator` writes the credential and configuration files of a session:
/// the VNC password file, the display startup script, the audio access-control file and the
/// gateway properties and user mapping. Regenerating overwrites the previous files.
pub struct ArtifactGenerator {
    executor: Arc<dyn Executor>,
    settings: Settings,
}

impl ArtifactGenerator {
    pub fn new(executor: Arc<dyn Executor>, settings: &Settings) -> Self {
        Self {
            executor,
            settings: settings.clone(),
        }
    }

    /// Writes every artifact of a session.
    ///
    /// # Arguments
    /// * `account` - The account owning the files.
    /// * `credentials` - The passwords embedded in the artifacts.
    /// * `session_id` - Identifier used to name the transient browser profile.
    pub fn generate(&self, account: &Account, credentials: &SessionCredentials, session_id: &str) -> Result<GeneratedArtifacts> {
        let (uid, gid) = (account.uid(), account.gid());

        let vnc_directory = account.home_path(".vnc");
        create_owned_directory(&vnc_directory, 0o700, uid, gid)?;

        let password_file = format!("{}/passwd", vnc_directory);
        self.write_password_file(account, credentials, &password_file)?;

        let profile_directory = profile_directory(&self.settings.display.profile_root, session_id);
        create_owned_directory(&profile_directory, 0o700, uid, gid)?;

        let startup_script = format!("{}/xstartup", vnc_directory);
        write_file(&startup_script, self.startup_script(&profile_directory).to_string().as_bytes(), 0o755, uid, gid)?;

        let pulse_directory = account.home_path(".config/pulse");
        let config_directory = account.home_path(".config");
        if !std::path::Path::new(&config_directory).exists() {
            create_owned_directory(&config_directory, 0o755, uid, gid)?;
        }
        create_owned_directory(&pulse_directory, 0o700, uid, gid)?;
        let audio_acl = format!("{}/default.pa", pulse_directory);
        write_file(&audio_acl, self.audio_acl()?.as_bytes(), 0o644, uid, gid)?;

        // The gateway runs as an unprivileged container user: its files must stay readable
        let gateway = &self.settings.gateway;
        create_owned_directory(&gateway.home, 0o755, uid, gid)?;

        let gateway_properties = gateway.properties_path();
        write_file(&gateway_properties, self.gateway_properties()?.to_string().as_bytes(), 0o644, uid, gid)?;

        let user_mapping = gateway.user_mapping_path();
        write_file(&user_mapping, self.user_mapping(credentials).to_document().as_bytes(), 0o644, uid, gid)?;

        debug!("Generated session artifacts in {} and {}", vnc_directory, gateway.home);

        Ok(GeneratedArtifacts {
            password_file,
            startup_script,
            audio_acl,
            gateway_properties,
            user_mapping,
            profile_directory,
        })
    }

    /// Obfuscates the VNC password with `vncpasswd` and writes it readable by the owner only.
    fn write_password_file(&self, account: &Account, credentials: &SessionCredentials, path: &str) -> Result<()> {
        let input = format!("{}\n", credentials.vnc_password());
        let command = CommandLine::new("vncpasswd").arg("-f").stdin(input.as_bytes());
        let output = self.executor.run_checked(&command, WebdeskError::ArtifactError)?;
        if output.stdout.is_empty() {
            return Err(WebdeskError::ArtifactError("vncpasswd produced an empty password file".to_string()));
        }

        write_file(path, &output.stdout, 0o600, account.uid(), account.gid())
    }

    /// The display session: a window manager and a browser using a private profile directory.
    pub fn startup_script(&self, profile_directory: &str) -> StartupScript {
        let display = &self.settings.display;

        let mut browser_args = display.browser_args.clone();
        browser_args.push(format!("--user-data-dir={}", profile_directory));
        if let Some(url) = &display.start_url {
            browser_args.push(url.clone());
        }

        StartupScript::new()
            .unset("SESSION_MANAGER")
            .unset("DBUS_SESSION_BUS_ADDRESS")
            .export("PULSE_SERVER", &format!("tcp:127.0.0.1:{}", self.settings.audio.port))
            .spawn(&display.window_manager, &[])
            .exec(&display.browser, &browser_args)
    }

    /// PulseAudio configuration accepting native-protocol connections from the loopback
    /// interface and the container bridge subnet only.
    pub fn audio_acl(&self) -> Result<String> {
        let audio = &self.settings.audio;
        let subnet = parse_subnet(&audio.bridge_subnet)?;
        Ok(format!(
            ".include /etc/pulse/default.pa\n\
             load-module module-native-protocol-tcp port={} auth-ip-acl=127.0.0.1;{}\n",
            audio.port, subnet
        ))
    }

    pub fn gateway_properties(&self) -> Result<Properties> {
        let gateway = &self.settings.gateway;
        let mut properties = Properties::new();
        properties.set("guacd-hostname", gateway.backend_address())?;
        properties.set("guacd-port", gateway.backend_port)?;
        properties.set("user-mapping", format!("{}/user-mapping.xml", GATEWAY_CONTAINER_HOME))?;
        Ok(properties)
    }

    /// One authorized user with one VNC connection to the display, audio included.
    pub fn user_mapping(&self, credentials: &SessionCredentials) -> XmlElement {
        let host = self.settings.gateway.host_address();
        let param = |name: &str, value: &str| XmlElement::new("param").attribute("name", name).text(value);

        let connection = XmlElement::new("connection")
            .attribute("name", "desktop")
            .child(XmlElement::new("protocol").text("vnc"))
            .child(param("hostname", host))
            .child(param("port", &self.settings.display.vnc_port().to_string()))
            .child(param("password", credentials.vnc_password()))
            .child(param("color-depth", &self.settings.display.depth.to_string()))
            .child(param("enable-audio", "true"))
            .child(param("audio-servername", &format!("{}:{}", host, self.settings.audio.port)));

        XmlElement::new("user-mapping").child(
            XmlElement::new("authorize")
                .attribute("username", credentials.gateway_username())
                .attribute("password", credentials.gateway_password())
                .child(connection),
        )
    }
}

/// Parses an `address/prefix` network, as accepted by the PulseAudio IP ACL.
fn parse_subnet(subnet: &str) -> Result<String> {
    let invalid = || WebdeskError::ArtifactError(format!("Invalid audio bridge subnet \"{}\"", subnet.escape_debug()));

    let (address, prefix) = subnet.split_once('/').ok_or_else(invalid)?;
    let address: IpAddr = address.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let max_prefix = if address.is_ipv4() { 32 } else { 128 };
    if prefix > max_prefix {
        return Err(invalid());
    }

    Ok(format!("{}/{}", address, prefix))
}

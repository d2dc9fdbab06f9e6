pub use credentials::{SessionCredentials, create_random_string, GENERATED_PASSWORD_LENGTH};
pub use generator::{ArtifactGenerator, GeneratedArtifacts, profile_directory, GATEWAY_CONTAINER_HOME, PROFILE_DIRECTORY_PREFIX};
pub use properties::Properties;
pub use startup_script::StartupScript;
pub use xml::XmlElement;

mod credentials;
mod generator;
mod properties;
mod startup_script;
mod xml;

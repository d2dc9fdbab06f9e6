#[macro_use]
extern crate log;

use webdesk::{
    app::Application,
    common::Settings,
};

use structopt::StructOpt;
use dotenv::dotenv;
use std::process;

/// Command-line options for Webdesk.
#[derive(StructOpt, Debug)]
#[structopt(name = "webdesk")]
struct Opt {
    /// Path to the configuration file.
    #[structopt(short, long, default_value = "")]
    config: String,

    /// Stops the services and removes the transient files of a previous session, then exits.
    #[structopt(long)]
    cleanup: bool,
}

/// Entry point of Webdesk.
fn main() {
    dotenv().ok();

    // Parse command-line arguments.
    let opt = Opt::from_args();

    // Load application settings from the specified configuration file.
    let settings = match Settings::new(&opt.config) {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("Failed to load settings: {}", error);
            process::exit(1);
        }
    };

    // Initialize logging based on the settings.
    if let Err(error) = setup_logging(&settings) {
        eprintln!("Failed to initialize logging: {}", error);
        process::exit(1);
    }

    // Verify settings
    if !settings.verify() {
        error!("Settings are not valid");
        process::exit(1);
    }

    let application = Application::new();
    let result = if opt.cleanup {
        application.cleanup(&settings)
    } else {
        application.run(&settings)
    };

    if let Err(error) = result {
        error!("{}", error);
        process::exit(error.exit_code());
    }
}

fn setup_logging(settings: &Settings) -> Result<(), fern::InitError> {
    let logging_config = &settings.logging;

    let format_string = logging_config.format.clone();
    let mut base_config = fern::Dispatch::new()
        .format(move |out, message, record| {
            let format = format_string
                .as_deref()
                .unwrap_or("[{timestamp}][{level}] {message}");
            let formatted_message = format
                .replace("{timestamp}", &chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string())
                .replace("{level}", &record.level().to_string())
                .replace("{message}", &message.to_string());
            out.finish(format_args!("{}", formatted_message))
        })
        .level(logging_config.level.parse::<log::LevelFilter>().unwrap_or(log::LevelFilter::Info));

    // Enable console logging if configured.
    if logging_config.console.unwrap_or(true) {
        base_config = base_config.chain(std::io::stdout());
    }

    // Enable file logging if a path is configured.
    if let Some(file) = &logging_config.file {
        base_config = base_config.chain(fern::log_file(file)?);
    }

    // Apply the logging configuration.
    base_config.apply()?;
    Ok(())
}

use std::fs::{read_to_string, write};
use std::io;
use std::path::Path;
use std::process::exit;

use anyhow::{Context, Error};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{from_str, to_string_pretty};

/// Name of the configuration file.
pub(crate) const CONFIG_NAME: &str = "config.json";

/// Name of the login file.
pub(crate) const LOGIN_NAME: &str = "login.json";

/// Config that is used to do general setup.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct Config {
    /// Base folder the subreddit folders are created under.
    #[serde(rename = "downloadDirectory")]
    download_directory: String,
    /// Default number of images offered at the count prompt.
    #[serde(rename = "imageCount", default = "default_image_count")]
    image_count: usize,
}

fn default_image_count() -> usize {
    10
}

static CONFIG: OnceCell<Config> = OnceCell::new();

impl Config {
    /// Base folder the subreddit folders are created under.
    pub(crate) fn download_directory(&self) -> &str {
        &self.download_directory
    }

    /// Default number of images offered at the count prompt.
    pub(crate) fn image_count(&self) -> usize {
        self.image_count
    }

    /// Checks config and ensures it isn't missing.
    pub(crate) fn config_exists() -> bool {
        if !Path::new(CONFIG_NAME).exists() {
            trace!("config.json: does not exist!");
            return false;
        }

        true
    }

    /// Creates config file.
    pub(crate) fn create_config() -> Result<(), Error> {
        let json = to_string_pretty(&Config::default())?;
        write(Path::new(CONFIG_NAME), json)?;

        Ok(())
    }

    /// Get the global instance of the `Config`.
    pub(crate) fn get() -> &'static Self {
        CONFIG.get_or_init(|| match Self::get_config() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config: {}", e);
                emergency_exit("Configuration loading failed");
            }
        })
    }

    /// Loads and returns `config` for quick management and settings.
    fn get_config() -> Result<Self, Error> {
        let config_contents = read_to_string(CONFIG_NAME)
            .with_context(|| format!("Failed to read config file: {}", CONFIG_NAME))?;
        let config: Config = from_str(&config_contents)?;

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            download_directory: String::from("downloads/"),
            image_count: default_image_count(),
        }
    }
}

/// `Login` contains the credentials of the script app used to talk to reddit.
#[derive(Serialize, Deserialize, Clone)]
pub(crate) struct Login {
    /// Username of user.
    #[serde(rename = "Username")]
    username: String,
    /// Password of user.
    #[serde(rename = "Password")]
    password: String,
    /// Client id of the registered script app.
    #[serde(rename = "ClientId")]
    client_id: String,
    /// Client secret of the registered script app.
    #[serde(rename = "ClientSecret")]
    client_secret: String,
}

static LOGIN: OnceCell<Login> = OnceCell::new();

impl Login {
    /// Username of user.
    pub(crate) fn username(&self) -> &str {
        &self.username
    }

    /// Password of user.
    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// Client id of the registered script app.
    pub(crate) fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client secret of the registered script app.
    pub(crate) fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Gets the global instance of [Login].
    pub(crate) fn get() -> &'static Self {
        LOGIN.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                error!("Unable to load `login.json`. Error: {}", e);
                warn!("The program will use empty values, but it is highly recommended to check your login.json file to ensure that everything is correct.");
                Login::default()
            })
        })
    }

    /// Loads the login file or creates one if it doesn't exist.
    fn load() -> Result<Self, Error> {
        let mut login = Login::default();
        let login_path = Path::new(LOGIN_NAME);
        if login_path.exists() {
            login = from_str(&read_to_string(login_path)?)?;
        } else {
            login.create_login()?;
        }

        Ok(login)
    }

    /// Checks if any of the credential fields are empty.
    pub(crate) fn is_empty(&self) -> bool {
        self.username.is_empty()
            || self.password.is_empty()
            || self.client_id.is_empty()
            || self.client_secret.is_empty()
    }

    /// Creates a new login file.
    fn create_login(&self) -> Result<(), Error> {
        write(LOGIN_NAME, to_string_pretty(self)?)?;

        info!("The login file was created.");
        info!(
            "Fill in your reddit username and password along with the client id and secret of a registered script app."
        );
        info!(
            "Do not give out your client secret unless you trust this software completely, always treat it like your own password."
        );

        Ok(())
    }
}

impl Default for Login {
    /// The default state for the login if none exists.
    fn default() -> Self {
        Login {
            username: String::new(),
            password: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
        }
    }
}

/// Exits the program after a message explaining the error and prompting the user to press `ENTER`.
///
/// # Arguments
///
/// * `error`: The error message to print.
pub(crate) fn emergency_exit(error: &str) -> ! {
    error!("{}", error);
    println!("Press ENTER to close the application...");

    let mut line = String::new();
    io::stdin().read_line(&mut line).unwrap_or_default();

    exit(0x00FF);
}

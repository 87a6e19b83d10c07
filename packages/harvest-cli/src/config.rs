use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use feed_harvest::SecretString;
use std::env;
use std::path::PathBuf;

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub openai_api_key: Option<SecretString>,
    pub openai_model: Option<String>,
    /// Browser profile kept between runs so the login survives
    pub profile_dir: Option<PathBuf>,
    pub headless: bool,
    pub actions_per_second: Option<u32>,
}

impl CliConfig {
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            openai_api_key: env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty())
                .map(SecretString::from),
            openai_model: env::var("OPENAI_MODEL").ok(),
            profile_dir: env::var("HARVEST_PROFILE_DIR").ok().map(PathBuf::from),
            headless: match env::var("HARVEST_HEADLESS") {
                Ok(value) => parse_flag(&value).context("HARVEST_HEADLESS must be true or false")?,
                Err(_) => true,
            },
            actions_per_second: env::var("HARVEST_ACTIONS_PER_SECOND")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .context("HARVEST_ACTIONS_PER_SECOND must be a positive number")?,
        })
    }

    pub fn inference_enabled(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("unrecognized flag value `{}`", other),
    }
}

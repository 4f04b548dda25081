use keyring::Entry;
use log::info;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;

/// Canvas API credentials: the API root URL and a bearer token.
///
/// The blocking HTTP client lives here so every component issuing requests
/// shares one connection pool. The token is never serialized.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct CanvasCredentials {
    pub url_canvas: String,
    #[serde(skip)]
    pub token_canvas: String,
    #[serde(skip)]
    pub client: Client,
}

impl CanvasCredentials {
    pub fn new(url_canvas: impl Into<String>, token_canvas: impl Into<String>) -> CanvasCredentials {
        CanvasCredentials {
            url_canvas: url_canvas.into(),
            token_canvas: token_canvas.into(),
            client: Client::new(),
        }
    }

    /// Probes the API with a `GET /users/self` to confirm the token works.
    pub fn probe(&self) -> Result<(), u16> {
        let response = self
            .client
            .get(format!("{}/users/self", self.url_canvas))
            .bearer_auth(&self.token_canvas)
            .send();
        match response {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(response.status().as_u16()),
            Err(_) => Err(0),
        }
    }

    /// Loads credentials from `CANVAS_URL` / `CANVAS_TOKEN`.
    ///
    /// Only available behind the `use_env_credentials` feature so production
    /// builds do not pick up stray environment variables by accident.
    pub fn from_env() -> Result<CanvasCredentials, String> {
        #[cfg(not(feature = "use_env_credentials"))]
        {
            Err("use_env_credentials feature not enabled".to_string())
        }

        #[cfg(feature = "use_env_credentials")]
        {
            let url = std::env::var("CANVAS_URL")
                .map_err(|_| "CANVAS_URL not set in environment".to_string())?;
            let token = std::env::var("CANVAS_TOKEN")
                .map_err(|_| "CANVAS_TOKEN not set in environment".to_string())?;
            info!("credentials loaded from environment for {}", url);
            Ok(CanvasCredentials::new(url, token))
        }
    }

    /// Loads credentials previously stored in the system keyring.
    pub fn from_keyring() -> Result<CanvasCredentials, String> {
        let app_name = env!("CARGO_PKG_NAME");
        let url = Entry::new(app_name, "URL_CANVAS")
            .and_then(|entry| entry.get_password())
            .map_err(|_| "error retrieving URL from system keyring".to_string())?;
        let token = Entry::new(app_name, "TOKEN_CANVAS")
            .and_then(|entry| entry.get_password())
            .map_err(|_| "error retrieving token from system keyring".to_string())?;
        Ok(CanvasCredentials::new(url, token))
    }

    /// Stores credentials in the system keyring for later runs.
    pub fn store_in_keyring(&self) -> Result<(), Box<dyn Error>> {
        let app_name = env!("CARGO_PKG_NAME");
        Entry::new(app_name, "URL_CANVAS")?.set_password(&self.url_canvas)?;
        Entry::new(app_name, "TOKEN_CANVAS")?.set_password(&self.token_canvas)?;
        Ok(())
    }

    /// Obtains working credentials: environment first, then the keyring.
    ///
    /// Whatever source supplies them, the credentials are validated with a
    /// probe before being handed to the caller.
    pub fn obtain() -> Result<CanvasCredentials, Box<dyn Error>> {
        let credentials = Self::from_env().or_else(|_| Self::from_keyring())?;
        match credentials.probe() {
            Ok(()) => {
                info!("Canvas credentials validated for {}", credentials.url_canvas);
                Ok(credentials)
            }
            Err(status) => Err(format!(
                "stored credentials rejected by Canvas (status {})",
                status
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_hold_url_and_token() {
        let credentials = CanvasCredentials::new("https://canvas.test/api/v1", "secret-token");
        assert_eq!(credentials.url_canvas, "https://canvas.test/api/v1");
        assert_eq!(credentials.token_canvas, "secret-token");
    }

    #[test]
    fn token_is_not_serialized() {
        let credentials = CanvasCredentials::new("https://canvas.test/api/v1", "secret-token");
        let serialized = serde_json::to_string(&credentials).unwrap();
        assert!(!serialized.contains("secret-token"));
    }

    #[test]
    #[cfg(feature = "use_env_credentials")]
    fn from_env_requires_both_variables() {
        use std::env;

        env::set_var("CANVAS_URL", "https://canvas.test/api/v1");
        env::remove_var("CANVAS_TOKEN");
        assert!(CanvasCredentials::from_env().is_err());

        env::set_var("CANVAS_TOKEN", "secret-token");
        assert!(CanvasCredentials::from_env().is_ok());

        env::remove_var("CANVAS_URL");
        env::remove_var("CANVAS_TOKEN");
    }
}

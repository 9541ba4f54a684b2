// Connection settings. Every value can come from a flag or from the
// environment, so scripts can keep credentials out of the command line.

use clap::Args;

use crate::error::{Error, Result};
use crate::session::Credentials;
use crate::transport::{normalize_base, HttpTransport};

/// Where the NAS is and who to log in as.
#[derive(Args, Clone, Default)]
pub struct Config {
    /// Base URL of the NAS, e.g. https://nas.example:5001
    #[arg(long, env = "SYNO_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Account to log in with
    #[arg(long, env = "SYNO_USER", global = true)]
    pub user: Option<String>,

    /// Password of the account (prompted for when missing)
    #[arg(long, env = "SYNO_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Accept self-signed TLS certificates
    #[arg(long, env = "SYNO_INSECURE", global = true)]
    pub insecure: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("insecure", &self.insecure)
            .finish()
    }
}

impl Config {
    /// Check that the base URL is a usable http(s) address and a user is
    /// present, before anything is sent.
    pub fn validate(&self) -> Result<()> {
        let Some(base_url) = non_empty(&self.base_url) else {
            return Err(Error::validation("base URL (--base-url / SYNO_BASE_URL)"));
        };
        normalize_base(base_url)?;
        if non_empty(&self.user).is_none() {
            return Err(Error::validation("user (--user / SYNO_USER)"));
        }
        Ok(())
    }

    /// Build the HTTP transport for the configured NAS.
    pub fn transport(&self) -> Result<HttpTransport> {
        let base_url = non_empty(&self.base_url)
            .ok_or_else(|| Error::validation("base URL (--base-url / SYNO_BASE_URL)"))?;
        HttpTransport::new(base_url, self.insecure)
    }

    /// Credentials for login. `prompt` is only called when no password was
    /// configured.
    pub fn credentials<F>(&self, prompt: F) -> Result<Credentials>
    where
        F: FnOnce() -> Result<String>,
    {
        let user = non_empty(&self.user)
            .ok_or_else(|| Error::validation("user (--user / SYNO_USER)"))?;
        let password = match non_empty(&self.password) {
            Some(password) => password.to_string(),
            None => prompt()?,
        };
        if password.is_empty() {
            return Err(Error::validation("account password"));
        }
        Ok(Credentials::new(user, password))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str, user: &str, password: Option<&str>) -> Config {
        Config {
            base_url: Some(base_url.into()),
            user: Some(user.into()),
            password: password.map(Into::into),
            insecure: false,
        }
    }

    #[test]
    fn missing_values_fail_validation() {
        assert!(config("https://nas.example:5001", "admin", None).validate().is_ok());

        let err = config("", "admin", None).validate().unwrap_err();
        assert!(matches!(&err, Error::Validation { field, .. } if field.starts_with("base URL")));

        let err = config("https://nas.example:5001", " ", None).validate().unwrap_err();
        assert!(matches!(&err, Error::Validation { field, .. } if field.starts_with("user")));
    }

    #[test]
    fn malformed_base_url_fails_validation() {
        for raw in ["nas.example:5001", "not a url", "ftp://nas.example"] {
            let err = config(raw, "admin", None).validate().unwrap_err();
            assert!(
                matches!(&err, Error::Validation { field, .. } if field.starts_with("base URL")),
                "{raw}: {err:?}"
            );
            assert!(matches!(config(raw, "admin", None).transport(), Err(Error::Validation { .. })));
        }
        assert!(config("http://10.0.0.5:5000/", "admin", None).validate().is_ok());
    }

    #[test]
    fn configured_password_skips_prompt() {
        let creds = config("https://nas.example:5001", "admin", Some("s3cret"))
            .credentials(|| panic!("should not prompt"))
            .unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "s3cret");
    }

    #[test]
    fn missing_password_is_prompted() {
        let creds = config("https://nas.example:5001", "admin", None)
            .credentials(|| Ok("typed".into()))
            .unwrap();
        assert_eq!(creds.password, "typed");

        let err = config("https://nas.example:5001", "admin", None)
            .credentials(|| Ok(String::new()))
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn debug_output_hides_password() {
        let rendered = format!("{:?}", config("https://nas.example:5001", "admin", Some("s3cret")));
        assert!(!rendered.contains("s3cret"));
    }
}

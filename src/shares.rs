// Share service: one API call per operation, responses normalized into
// plain Rust types. Error codes from the NAS are passed through untouched.

use std::fmt;

use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::{Endpoint, Params, Transport};

/// Encryption state of a share as reported by the NAS.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Encryption {
    #[default]
    None,
    Encrypted,
    /// Any value we don't have a name for, kept as sent.
    Other(String),
}

impl Encryption {
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Encrypted => "encrypted",
            Self::Other(raw) => raw,
        }
    }

    fn from_code(code: i64) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Encrypted,
            other => Self::Other(other.to_string()),
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "none" => Self::None,
            "encrypted" => Self::Encrypted,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// DSM sends the encryption state as an integer; older firmware and our own
// fixtures use strings.
impl<'de> Deserialize<'de> for Encryption {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
            Flag(bool),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Code(code) => Self::from_code(code),
            Raw::Name(name) => Self::from_name(&name),
            Raw::Flag(true) => Self::Encrypted,
            Raw::Flag(false) => Self::None,
        })
    }
}

/// A shared folder on the NAS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Share {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub encryption: Encryption,
    #[serde(rename = "desc", alias = "description", default, deserialize_with = "null_as_default")]
    pub description: String,
}

// Missing and explicit `null` fields both fall back to the default.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
struct ShareList {
    shares: Vec<Share>,
}

/// All shares, in the order the NAS lists them.
pub fn list_shares<T: Transport>(session: &Session<'_, T>) -> Result<Vec<Share>> {
    let params: Params = vec![("additional", r#"["encryption"]"#.to_string())];
    let payload = session.call(Endpoint::ListShares, &params)?;
    let list: ShareList = serde_json::from_value(payload)
        .map_err(|err| Error::Protocol(format!("malformed share list: {err}")))?;
    Ok(list.shares)
}

/// Lock (unmount) the encrypted share `name`.
pub fn lock_share<T: Transport>(session: &Session<'_, T>, name: &str) -> Result<()> {
    require("share name", name)?;

    let params: Params = vec![("name", name.to_string())];
    session.call(Endpoint::LockShare, &params)?;
    info!(share = name, "share locked");
    Ok(())
}

/// Unlock (mount) the encrypted share `name` with `password`.
///
/// Empty names or passwords are rejected before anything is sent.
pub fn unlock_share<T: Transport>(session: &Session<'_, T>, name: &str, password: &str) -> Result<()> {
    require("share name", name)?;
    require("password", password)?;

    let params: Params = vec![
        ("name", name.to_string()),
        ("password", password.to_string()),
    ];
    session.call(Endpoint::UnlockShare, &params)?;
    info!(share = name, "share unlocked");
    Ok(())
}

pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Credentials, SessionManager};
    use crate::transport::testing::ScriptedTransport;
    use serde_json::{json, Value};

    fn scripted() -> ScriptedTransport {
        ScriptedTransport::new().login("sid-1")
    }

    fn logged_in(transport: ScriptedTransport) -> SessionManager<ScriptedTransport> {
        let mut manager = SessionManager::new(transport);
        manager.login(&Credentials::new("admin", "pw")).unwrap();
        manager
    }

    #[test]
    fn list_keeps_remote_order() {
        let manager = logged_in(scripted().ok(json!({
            "shares": [
                { "name": "zeta", "encryption": 0, "desc": "" },
                { "name": "alpha", "encryption": 1, "desc": "photos" },
                { "name": "mid", "encryption": 2, "desc": "old" },
            ],
            "total": 3
        })));

        let shares = list_shares(&manager.session()).unwrap();

        let names: Vec<_> = shares.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(shares[0].encryption, Encryption::None);
        assert_eq!(shares[1].encryption, Encryption::Encrypted);
        assert_eq!(shares[1].description, "photos");
        assert_eq!(shares[2].encryption.to_string(), "2");

        let calls = manager.transport().calls();
        assert_eq!(calls[1].endpoint, Endpoint::ListShares);
        assert_eq!(calls[1].sid.as_deref(), Some("sid-1"));
    }

    #[test]
    fn list_accepts_named_encryption() {
        let manager = logged_in(scripted().ok(json!({
            "shares": [{ "name": "vault", "encryption": "encrypted", "description": "secure" }]
        })));

        let shares = list_shares(&manager.session()).unwrap();
        assert_eq!(
            shares,
            vec![Share {
                name: "vault".into(),
                encryption: Encryption::Encrypted,
                description: "secure".into(),
            }]
        );
    }

    #[test]
    fn list_treats_null_fields_as_defaults() {
        let manager = logged_in(scripted().ok(json!({
            "shares": [
                { "name": "x", "encryption": null, "desc": null },
                { "name": "y" },
            ]
        })));

        let shares = list_shares(&manager.session()).unwrap();
        for share in &shares {
            assert_eq!(share.encryption, Encryption::None);
            assert_eq!(share.description, "");
        }
        assert_eq!(shares[1].name, "y");
    }

    #[test]
    fn list_rejects_unexpected_shape() {
        let manager = logged_in(scripted().ok(json!({ "items": [] })));
        let err = list_shares(&manager.session()).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "{err:?}");
    }

    #[test]
    fn lock_sends_share_name() {
        let manager = logged_in(scripted().ok(Value::Null));

        lock_share(&manager.session(), "vault").unwrap();

        let call = &manager.transport().calls()[1];
        assert_eq!(call.endpoint, Endpoint::LockShare);
        assert_eq!(call.param("name"), Some("vault"));
    }

    #[test]
    fn lock_error_code_is_passed_through() {
        let manager = logged_in(scripted().fail(Error::Api { code: 3300 }));
        let err = lock_share(&manager.session(), "plain").unwrap_err();
        assert!(matches!(err, Error::Api { code: 3300 }));
    }

    #[test]
    fn unlock_with_wrong_password_is_an_api_error() {
        let manager = logged_in(scripted().fail(Error::Api { code: 3301 }));

        let err = unlock_share(&manager.session(), "vault", "wrongpass").unwrap_err();

        assert!(matches!(err, Error::Api { code: 3301 }));
        let call = &manager.transport().calls()[1];
        assert_eq!(call.endpoint, Endpoint::UnlockShare);
        assert_eq!(call.param("password"), Some("wrongpass"));
    }

    #[test]
    fn unlock_validates_before_calling() {
        let manager = logged_in(scripted());

        let err = unlock_share(&manager.session(), "", "pw").unwrap_err();
        assert!(matches!(&err, Error::Validation { field, .. } if field == "share name"));

        let err = unlock_share(&manager.session(), "vault", "").unwrap_err();
        assert!(matches!(&err, Error::Validation { field, .. } if field == "password"));

        // only the login went out
        assert_eq!(manager.transport().endpoints(), vec![Endpoint::Login]);
    }
}

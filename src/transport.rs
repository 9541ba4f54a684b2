// Transport module: a small blocking HTTP client that talks to the DSM Web
// API. It knows how to address each endpoint and how to unwrap the JSON
// envelope every response comes in; it knows nothing about sessions beyond
// attaching the token it is handed.

use reqwest::blocking::Client;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Request parameters, in the order they should be sent.
pub type Params = Vec<(&'static str, String)>;

/// The DSM endpoints this client uses.
///
/// Each variant fixes the CGI path, API name, version, method name and HTTP
/// verb of one call. Calls carrying secrets are sent as form-encoded POSTs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Login,
    Logout,
    ListShares,
    LockShare,
    UnlockShare,
}

impl Endpoint {
    /// CGI path relative to `<base>/webapi/`.
    pub fn path(self) -> &'static str {
        match self {
            Self::Login | Self::Logout => "auth.cgi",
            Self::ListShares | Self::LockShare | Self::UnlockShare => "entry.cgi",
        }
    }

    pub fn api(self) -> &'static str {
        match self {
            Self::Login | Self::Logout => "SYNO.API.Auth",
            Self::ListShares => "SYNO.Core.Share",
            Self::LockShare | Self::UnlockShare => "SYNO.Core.Share.Crypto",
        }
    }

    pub fn version(self) -> u32 {
        match self {
            Self::Login => 3,
            _ => 1,
        }
    }

    /// The `method` query value understood by the NAS.
    pub fn method(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::ListShares => "list",
            Self::LockShare => "encrypt",
            Self::UnlockShare => "decrypt",
        }
    }

    pub fn http_method(self) -> Method {
        match self {
            Self::Login | Self::LockShare | Self::UnlockShare => Method::POST,
            Self::Logout | Self::ListShares => Method::GET,
        }
    }

    /// Whether a successful response must carry a `data` payload.
    pub fn expects_data(self) -> bool {
        matches!(self, Self::Login | Self::ListShares)
    }
}

/// Something that can perform one DSM API call.
///
/// Implementations return the decoded `data` payload on success
/// (`Value::Null` for endpoints without one) or a structured error.
pub trait Transport {
    fn call(&self, endpoint: Endpoint, params: &Params, sid: Option<&str>) -> Result<Value>;
}

/// Calls `endpoint` and decodes its payload into `T`.
pub fn call_typed<T, D>(transport: &T, endpoint: Endpoint, params: &Params, sid: Option<&str>) -> Result<D>
where
    T: Transport + ?Sized,
    D: DeserializeOwned,
{
    let payload = transport.call(endpoint, params, sid)?;
    serde_json::from_value(payload).map_err(|err| {
        Error::Protocol(format!("malformed {} payload: {err}", endpoint.method()))
    })
}

#[derive(Deserialize, Debug)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    #[serde(default)]
    code: i64,
}

/// Turns a raw response body into the payload or the API error it carries.
pub fn decode_envelope(endpoint: Endpoint, body: &str) -> Result<Value> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|err| Error::Protocol(format!("invalid JSON envelope: {err}")))?;

    if !envelope.success {
        return match envelope.error {
            Some(ErrorBody { code }) if code != 0 => Err(Error::Api { code }),
            _ => Err(Error::Protocol(
                "failure response without an error code".into(),
            )),
        };
    }

    match envelope.data {
        Some(Value::Null) | None if endpoint.expects_data() => Err(Error::Protocol(format!(
            "{} response has no data",
            endpoint.method()
        ))),
        Some(data) => Ok(data),
        None => Ok(Value::Null),
    }
}

/// HTTP implementation of [`Transport`] bound to one NAS.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Build a transport for `base_url`, e.g. `https://nas.example:5001`.
    ///
    /// With `accept_invalid_certs` the self-signed certificate most NAS
    /// units ship with is accepted.
    pub fn new(base_url: &str, accept_invalid_certs: bool) -> Result<Self> {
        let base_url = normalize_base(base_url)?;
        let client = Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Full URL of `endpoint`'s CGI script.
    pub fn endpoint_url(&self, endpoint: Endpoint) -> Result<Url> {
        self.base_url
            .join("webapi/")
            .and_then(|api| api.join(endpoint.path()))
            .map_err(|err| Error::Protocol(format!("cannot build endpoint URL: {err}")))
    }
}

/// Parses `raw` as an http(s) URL and makes sure its path ends with `/`
/// so relative joins append instead of replacing the last segment.
pub fn normalize_base(raw: &str) -> Result<Url> {
    let invalid = |reason: String| Error::invalid(format!("base URL '{raw}'"), reason);

    let mut url = Url::parse(raw.trim()).map_err(|err| invalid(format!("is not a URL: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() || url.host().is_none() {
        return Err(invalid("must be an http:// or https:// address".into()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

impl Transport for HttpTransport {
    fn call(&self, endpoint: Endpoint, params: &Params, sid: Option<&str>) -> Result<Value> {
        let url = self.endpoint_url(endpoint)?;

        let mut fields: Vec<(&str, String)> = vec![
            ("api", endpoint.api().to_string()),
            ("version", endpoint.version().to_string()),
            ("method", endpoint.method().to_string()),
        ];
        fields.extend(params.iter().cloned());
        if let Some(sid) = sid {
            fields.push(("_sid", sid.to_string()));
        }

        debug!(api = endpoint.api(), method = endpoint.method(), "calling NAS");

        let request = if endpoint.http_method() == Method::POST {
            self.client.post(url).form(&fields)
        } else {
            self.client.get(url).query(&fields)
        };

        let res = request.send()?;
        let status = res.status();
        if !status.is_success() {
            return Err(Error::Protocol(format!("HTTP status {status}")));
        }
        let body = res.text()?;
        decode_envelope(endpoint, &body)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    // Scripted in-memory transport for unit tests.

    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;

    /// One recorded call.
    #[derive(Debug, Clone)]
    pub struct Call {
        pub endpoint: Endpoint,
        pub params: Params,
        pub sid: Option<String>,
    }

    impl Call {
        pub fn param(&self, name: &str) -> Option<&str> {
            self.params
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.as_str())
        }
    }

    /// Answers calls from a queue of canned responses and records them.
    #[derive(Default)]
    pub struct ScriptedTransport {
        responses: RefCell<VecDeque<Result<Value>>>,
        calls: RefCell<Vec<Call>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn ok(self, payload: Value) -> Self {
            self.responses.borrow_mut().push_back(Ok(payload));
            self
        }

        pub fn fail(self, err: Error) -> Self {
            self.responses.borrow_mut().push_back(Err(err));
            self
        }

        /// A successful login handing out `sid`.
        pub fn login(self, sid: &str) -> Self {
            self.ok(serde_json::json!({ "sid": sid }))
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        pub fn endpoints(&self) -> Vec<Endpoint> {
            self.calls.borrow().iter().map(|c| c.endpoint).collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn call(&self, endpoint: Endpoint, params: &Params, sid: Option<&str>) -> Result<Value> {
            self.calls.borrow_mut().push(Call {
                endpoint,
                params: params.clone(),
                sid: sid.map(str::to_string),
            });
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("no scripted response for {endpoint:?}"))
        }
    }
}

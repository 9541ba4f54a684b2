// Session module: owns the one DSM session a process may hold. Commands
// never see the token directly; they get a borrowed `Session` handle that
// only exists while the manager is logged in.

use std::fmt;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{AuthStage, Error, Result};
use crate::transport::{call_typed, Endpoint, Params, Transport};

/// DSM session name requested at login.
const SESSION_NAME: &str = "Core";

/// Account name and password used to open a session.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Keep the password out of debug output and logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct LoginData {
    sid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Unauthenticated,
    Authenticated { sid: String },
}

/// Owns the transport and the session token obtained from it.
pub struct SessionManager<T: Transport> {
    transport: T,
    state: State,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: State::Unauthenticated,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, State::Authenticated { .. })
    }

    /// The current session token, if logged in.
    pub fn token(&self) -> Option<&str> {
        match &self.state {
            State::Authenticated { sid } => Some(sid),
            State::Unauthenticated => None,
        }
    }

    /// Open a session. Rejected credentials and unreachable hosts both
    /// surface as [`Error::Auth`].
    pub fn login(&mut self, credentials: &Credentials) -> Result<()> {
        if self.is_authenticated() {
            return Err(Error::SessionActive);
        }

        let params: Params = vec![
            ("account", credentials.username.clone()),
            ("passwd", credentials.password.clone()),
            ("session", SESSION_NAME.to_string()),
            ("format", "sid".to_string()),
        ];
        let data: LoginData = call_typed(&self.transport, Endpoint::Login, &params, None)
            .map_err(|err| auth_error(AuthStage::Login, err))?;
        if data.sid.is_empty() {
            return Err(auth_error(
                AuthStage::Login,
                Error::Protocol("login returned an empty session id".into()),
            ));
        }

        info!(user = %credentials.username, "logged in");
        self.state = State::Authenticated { sid: data.sid };
        Ok(())
    }

    /// Close the session on the NAS. The local token is dropped even when
    /// the NAS refuses, so the manager always ends up unauthenticated.
    /// Logging out without a session is a no-op.
    pub fn logout(&mut self) -> Result<()> {
        let State::Authenticated { sid } =
            std::mem::replace(&mut self.state, State::Unauthenticated)
        else {
            return Ok(());
        };

        let params: Params = vec![("session", SESSION_NAME.to_string())];
        self.transport
            .call(Endpoint::Logout, &params, Some(&sid))
            .map_err(|err| auth_error(AuthStage::Logout, err))?;
        info!("logged out");
        Ok(())
    }

    /// Handle for issuing share operations under the current session.
    ///
    /// # Panics
    ///
    /// Panics when called without an open session. Share operations are
    /// only issued between `login` and `logout`.
    pub fn session(&self) -> Session<'_, T> {
        match &self.state {
            State::Authenticated { sid } => Session {
                transport: &self.transport,
                sid,
            },
            State::Unauthenticated => panic!("share operation issued without an active session"),
        }
    }

    /// Log in, run `work` with the session, then log out on every path.
    ///
    /// If `work` fails and the logout fails too, both are reported in an
    /// [`Error::Teardown`]. If `work` panics, the logout is still attempted
    /// while unwinding.
    pub fn with_session<R, F>(&mut self, credentials: &Credentials, work: F) -> Result<R>
    where
        F: FnOnce(&Session<'_, T>) -> Result<R>,
    {
        self.login(credentials)?;

        let guard = LogoutGuard::new(self);
        let outcome = work(&guard.manager().session());
        let teardown = guard.finish();

        match (outcome, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(logout)) => Err(logout),
            (Err(primary), Ok(())) => Err(primary),
            (Err(primary), Err(logout)) => Err(Error::Teardown {
                primary: Box::new(primary),
                logout: Box::new(logout),
            }),
        }
    }
}

fn auth_error(stage: AuthStage, err: Error) -> Error {
    Error::Auth {
        stage,
        source: Box::new(err),
    }
}

/// Logs out on drop unless `finish` ran first.
struct LogoutGuard<'a, T: Transport> {
    manager: &'a mut SessionManager<T>,
    armed: bool,
}

impl<'a, T: Transport> LogoutGuard<'a, T> {
    fn new(manager: &'a mut SessionManager<T>) -> Self {
        Self {
            manager,
            armed: true,
        }
    }

    fn manager(&self) -> &SessionManager<T> {
        self.manager
    }

    fn finish(mut self) -> Result<()> {
        self.armed = false;
        self.manager.logout()
    }
}

impl<T: Transport> Drop for LogoutGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = self.manager.logout() {
                warn!("logout during unwind failed: {}", err.report());
            }
        }
    }
}

/// A live session: the transport plus the token to present with each call.
pub struct Session<'a, T: Transport> {
    transport: &'a T,
    sid: &'a str,
}

impl<T: Transport> Session<'_, T> {
    /// Issue an authenticated call.
    pub fn call(&self, endpoint: Endpoint, params: &Params) -> Result<serde_json::Value> {
        self.transport.call(endpoint, params, Some(self.sid))
    }

    pub fn sid(&self) -> &str {
        self.sid
    }
}

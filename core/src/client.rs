//! Blocking client for the REST API.
//!
//! # Design
//! `RestClient` wires the `Dispatcher` to the response parsers for the two
//! authentication bootstrap calls and exposes generic session-bound calls
//! that hand the raw response stream back to the caller. The client holds
//! no per-user state; sessions are passed in by reference.

use crate::config::ClientConfig;
use crate::dispatch::{Credentials, Dispatcher};
use crate::error::ApiError;
use crate::http::{FileUpload, HttpRequest};
use crate::method::Method;
use crate::response;
use crate::session::{AppCredentials, AuthToken, Session};
use crate::transport::{ConnectionPool, ResponseBody, Transport, UreqTransport};

pub struct RestClient<T: Transport = UreqTransport> {
    dispatcher: Dispatcher<T>,
}

impl RestClient<UreqTransport> {
    pub fn new(config: ClientConfig) -> Self {
        let transport = UreqTransport::new(&config);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> RestClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            dispatcher: Dispatcher::new(config, transport),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.dispatcher.config()
    }

    pub fn pool(&self) -> &ConnectionPool {
        self.dispatcher.pool()
    }

    /// `auth.createToken`, sent over HTTPS. The token is then presented to
    /// the user's login page and exchanged with [`RestClient::get_session`].
    pub fn create_token(&self, app: &AppCredentials) -> Result<AuthToken, ApiError> {
        let credentials = Credentials::application(&app.api_key, &app.secret, true);
        let body = self.dispatcher.call(
            &credentials,
            Method::AuthCreateToken.descriptor(),
            None,
            Vec::<(String, String)>::new(),
        )?;
        response::parse_auth_token(body)
    }

    /// `auth.getSession`: exchange a token for a session once the user has
    /// logged in. Desktop applications use HTTPS and receive a session
    /// secret that signs every later call.
    pub fn get_session(&self, app: &AppCredentials, token: &AuthToken) -> Result<Session, ApiError> {
        if token.as_str().is_empty() {
            return Err(ApiError::Validation("auth token is required".to_string()));
        }
        let credentials = Credentials::application(&app.api_key, &app.secret, app.is_desktop);
        let body = self.dispatcher.call(
            &credentials,
            Method::AuthGetSession.descriptor(),
            None,
            [("auth_token", token.as_str())],
        )?;
        response::parse_session(body, &app.api_key, &app.secret)
    }

    /// Call a session-bound method and return the unparsed response.
    pub fn call<I, K, V>(&self, session: &Session, method: Method, params: I) -> Result<ResponseBody, ApiError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        ensure_live(session)?;
        self.dispatcher
            .call(&Credentials::for_session(session), method.descriptor(), None, params)
    }

    /// Upload `file` with a method that takes one (`photos.upload`).
    pub fn upload<I, K, V>(
        &self,
        session: &Session,
        method: Method,
        file: &FileUpload,
        params: I,
    ) -> Result<ResponseBody, ApiError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        ensure_live(session)?;
        self.dispatcher
            .call(&Credentials::for_session(session), method.descriptor(), Some(file), params)
    }

    /// Call a session-bound method and parse its leaf elements.
    pub fn call_elements<I, K, V>(
        &self,
        session: &Session,
        method: Method,
        params: I,
    ) -> Result<response::Elements, ApiError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        response::parse_elements(self.call(session, method, params)?)
    }

    /// The signed request `call` would send, without sending it.
    pub fn build_call<I, K, V>(&self, session: &Session, method: Method, params: I) -> Result<HttpRequest, ApiError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        ensure_live(session)?;
        self.dispatcher
            .build_request(&Credentials::for_session(session), method.descriptor(), None, params)
    }
}

fn ensure_live(session: &Session) -> Result<(), ApiError> {
    if session.is_expired() {
        return Err(ApiError::Validation(format!(
            "session for user {} has expired",
            session.user_id()
        )));
    }
    Ok(())
}

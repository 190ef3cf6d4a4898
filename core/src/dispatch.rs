//! Building, signing and sending calls.
//!
//! # Design
//! `build_request` is pure: it assembles the parameter set, signs it and
//! renders the POST as an `HttpRequest`. `call` hands that request to the
//! `Transport` and maps any status of 400 or above to
//! `ApiError::HttpStatus` without reading the body. On success the caller
//! gets the body stream and must close (or drop) it to return the
//! connection.

use crate::config::{ClientConfig, API_VERSION};
use crate::error::ApiError;
use crate::http::{FileUpload, HttpRequest};
use crate::method::MethodDescriptor;
use crate::params::ParameterSet;
use crate::session::{CallIdSequence, Session};
use crate::signature;
use crate::transport::{ConnectionPool, ResponseBody, Transport};

/// Who is calling and how to sign.
#[derive(Clone, Copy)]
pub struct Credentials<'a> {
    pub api_key: &'a str,
    pub secret: &'a str,
    pub session_key: Option<&'a str>,
    /// Source of `call_id`; the dispatcher's own sequence is used when absent.
    pub call_ids: Option<&'a CallIdSequence>,
    pub use_https: bool,
}

impl<'a> Credentials<'a> {
    /// Credentials for a bootstrap call made before any session exists.
    pub fn application(api_key: &'a str, secret: &'a str, use_https: bool) -> Self {
        Self {
            api_key,
            secret,
            session_key: None,
            call_ids: None,
            use_https,
        }
    }

    pub fn for_session(session: &'a Session) -> Self {
        Self {
            api_key: session.api_key(),
            secret: session.secret(),
            session_key: Some(session.session_key()),
            call_ids: Some(session.call_ids()),
            use_https: false,
        }
    }
}

pub struct Dispatcher<T: Transport> {
    config: ClientConfig,
    transport: T,
    call_ids: CallIdSequence,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            call_ids: CallIdSequence::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn pool(&self) -> &ConnectionPool {
        self.transport.pool()
    }

    /// Assemble and sign the parameters for one call.
    ///
    /// # Panics
    /// If `params` contains `sig`; the signature is always computed here.
    pub fn sign_params<I, K, V>(
        &self,
        credentials: &Credentials<'_>,
        method: &MethodDescriptor,
        params: I,
    ) -> Result<ParameterSet, ApiError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if credentials.api_key.is_empty() {
            return Err(ApiError::Validation("api_key is required".to_string()));
        }
        if credentials.secret.is_empty() {
            return Err(ApiError::Validation("secret is required".to_string()));
        }

        let mut set = ParameterSet::new();
        set.insert("method", method.wire_name);
        set.insert("api_key", credentials.api_key);
        set.insert("v", API_VERSION);

        if method.requires_session {
            let session_key = credentials
                .session_key
                .filter(|key| !key.is_empty())
                .ok_or_else(|| {
                    ApiError::Validation(format!("{} requires a session", method.wire_name))
                })?;
            let call_id = credentials.call_ids.unwrap_or(&self.call_ids).next();
            set.insert("call_id", call_id.to_string());
            set.insert("session_key", session_key);
        }

        set.extend(params);

        assert!(!set.contains("sig"), "request parameters must not carry a signature");
        let sig = signature::compute(set.iter(), credentials.secret);
        set.insert("sig", sig);
        Ok(set)
    }

    /// Render the signed POST for one call without sending it.
    pub fn build_request<I, K, V>(
        &self,
        credentials: &Credentials<'_>,
        method: &MethodDescriptor,
        file: Option<&FileUpload>,
        params: I,
    ) -> Result<HttpRequest, ApiError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        match (method.takes_file, file) {
            (true, None) => {
                return Err(ApiError::Validation(format!("{} requires a file", method.wire_name)));
            }
            (false, Some(_)) => {
                return Err(ApiError::Validation(format!(
                    "{} does not accept a file",
                    method.wire_name
                )));
            }
            _ => {}
        }

        let signed = self.sign_params(credentials, method, params)?;
        let request = match file {
            Some(file) => HttpRequest::multipart(self.config.endpoint(false), &signed, file),
            None => HttpRequest::form(self.config.endpoint(credentials.use_https), &signed),
        };
        Ok(request)
    }

    /// Sign and send one call, returning the response body on success.
    pub fn call<I, K, V>(
        &self,
        credentials: &Credentials<'_>,
        method: &MethodDescriptor,
        file: Option<&FileUpload>,
        params: I,
    ) -> Result<ResponseBody, ApiError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let request = self.build_request(credentials, method, file, params)?;
        tracing::debug!(method = method.wire_name, url = %request.url, "dispatching call");

        let response = self.transport.execute(request)?;
        check_status(response.status, &response.reason)?;
        Ok(response.body)
    }
}

/// Statuses of 400 and above are transport failures; the body is dropped
/// unread, which releases the connection.
fn check_status(status: u16, reason: &str) -> Result<(), ApiError> {
    if status < 400 {
        return Ok(());
    }
    tracing::warn!(status, reason, "remote endpoint rejected the request");
    Err(ApiError::HttpStatus {
        status,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::method::Method;
    use crate::session::Expiry;
    use crate::transport::HttpResponse;

    /// Records requests and answers each with a canned status and body.
    struct CannedTransport {
        status: u16,
        body: &'static str,
        pool: ConnectionPool,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl CannedTransport {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                pool: ConnectionPool::new(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for CannedTransport {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.seen.lock().unwrap().push(request);
            Ok(HttpResponse {
                status: self.status,
                reason: if self.status < 400 { "OK" } else { "Service Unavailable" }.to_string(),
                body: ResponseBody::from_bytes(self.body, Some(self.pool.checkout())),
            })
        }

        fn pool(&self) -> &ConnectionPool {
            &self.pool
        }
    }

    fn dispatcher(status: u16, body: &'static str) -> Dispatcher<CannedTransport> {
        Dispatcher::new(ClientConfig::default(), CannedTransport::new(status, body))
    }

    fn no_params() -> Vec<(String, String)> {
        Vec::new()
    }

    fn form_fields(request: &HttpRequest) -> Vec<(String, String)> {
        url::form_urlencoded::parse(&request.body).into_owned().collect()
    }

    #[test]
    fn bootstrap_call_has_fixed_params_only() {
        let d = dispatcher(200, "");
        let creds = Credentials::application("key", "secret", true);
        let set = d.sign_params(&creds, Method::AuthCreateToken.descriptor(), no_params()).unwrap();

        let keys: Vec<&str> = set.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["api_key", "method", "sig", "v"]);
        assert_eq!(set.get("method"), Some("facebook.auth.createToken"));
        assert_eq!(set.get("v"), Some("1.0"));

        let expected = signature::compute(
            [("api_key", "key"), ("method", "facebook.auth.createToken"), ("v", "1.0")],
            "secret",
        );
        assert_eq!(set.get("sig"), Some(expected.as_str()));
    }

    #[test]
    fn session_call_adds_call_id_and_session_key() {
        let d = dispatcher(200, "");
        let session = Session::new("key", "secret", "sess-1", 8055, Expiry::Never, false);
        let creds = Credentials::for_session(&session);

        let first = d.sign_params(&creds, Method::FriendsGet.descriptor(), no_params()).unwrap();
        let second = d.sign_params(&creds, Method::FriendsGet.descriptor(), no_params()).unwrap();

        assert_eq!(first.get("session_key"), Some("sess-1"));
        let first_id: u64 = first.get("call_id").unwrap().parse().unwrap();
        let second_id: u64 = second.get("call_id").unwrap().parse().unwrap();
        assert!(second_id > first_id);
        assert_eq!(first.len(), Method::FriendsGet.descriptor().total_param_count() + 1);
    }

    #[test]
    fn caller_params_overwrite_and_are_signed() {
        let d = dispatcher(200, "");
        let creds = Credentials::application("key", "secret", false);
        let set = d
            .sign_params(
                &creds,
                Method::AuthGetSession.descriptor(),
                vec![("auth_token", "t1"), ("auth_token", "t2")],
            )
            .unwrap();

        assert_eq!(set.get("auth_token"), Some("t2"));
        assert_eq!(set.overwrites().len(), 1);
        let unsigned: Vec<(&str, &str)> = set.iter().filter(|(k, _)| *k != "sig").collect();
        assert!(signature::verify(unsigned, "secret", set.get("sig").unwrap()));
    }

    #[test]
    #[should_panic(expected = "must not carry a signature")]
    fn caller_supplied_sig_is_a_programmer_error() {
        let d = dispatcher(200, "");
        let creds = Credentials::application("key", "secret", false);
        let _ = d.sign_params(&creds, Method::AuthCreateToken.descriptor(), vec![("sig", "forged")]);
    }

    #[test]
    fn validation_happens_before_io() {
        let d = dispatcher(200, "");
        let app = Credentials::application("key", "secret", false);

        let err = d.call(&app, Method::FriendsGet.descriptor(), None, no_params()).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let keyless = Credentials::application("", "secret", false);
        assert!(matches!(
            d.call(&keyless, Method::AuthCreateToken.descriptor(), None, no_params()),
            Err(ApiError::Validation(_))
        ));

        let session = Session::new("key", "secret", "sess", 1, Expiry::Never, false);
        let creds = Credentials::for_session(&session);
        assert!(matches!(
            d.call(&creds, Method::PhotosUpload.descriptor(), None, no_params()),
            Err(ApiError::Validation(_))
        ));
        let file = FileUpload::new("a.jpg", "image/jpeg", vec![1, 2, 3]);
        assert!(matches!(
            d.call(&creds, Method::FriendsGet.descriptor(), Some(&file), no_params()),
            Err(ApiError::Validation(_))
        ));

        assert!(d.transport.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn https_only_when_requested() {
        let d = dispatcher(200, "");
        let secure = Credentials::application("key", "secret", true);
        let plain = Credentials::application("key", "secret", false);

        let req = d.build_request(&secure, Method::AuthCreateToken.descriptor(), None, no_params()).unwrap();
        assert!(req.url.starts_with("https://"));
        let req = d.build_request(&plain, Method::AuthCreateToken.descriptor(), None, no_params()).unwrap();
        assert!(req.url.starts_with("http://"));

        let fields = form_fields(&req);
        assert!(fields.iter().any(|(k, v)| k == "method" && v == "facebook.auth.createToken"));
        assert!(fields.iter().any(|(k, _)| k == "sig"));
    }

    #[test]
    fn upload_is_multipart_over_http() {
        let d = dispatcher(200, "");
        let mut session_creds = Credentials::application("key", "secret", true);
        session_creds.session_key = Some("sess");
        let file = FileUpload::new("a.jpg", "image/jpeg", vec![0xff, 0xd8]);

        let req = d
            .build_request(&session_creds, Method::PhotosUpload.descriptor(), Some(&file), vec![("caption", "hi")])
            .unwrap();
        assert!(req.url.starts_with("http://"));
        assert!(req.header("content-type").unwrap().starts_with("multipart/form-data; boundary="));
    }

    #[test]
    fn error_status_fails_and_releases_connection() {
        let d = dispatcher(503, "<html>down</html>");
        let creds = Credentials::application("key", "secret", false);
        let err = d.call(&creds, Method::AuthCreateToken.descriptor(), None, no_params()).unwrap_err();

        match err {
            ApiError::HttpStatus { status, reason } => {
                assert_eq!(status, 503);
                assert_eq!(reason, "Service Unavailable");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
        assert_eq!(d.pool().in_flight(), 0);
    }

    #[test]
    fn success_hands_over_the_stream() {
        let d = dispatcher(200, "<friends_get_response/>");
        let creds = Credentials::application("key", "secret", false);
        let body = d.call(&creds, Method::AuthCreateToken.descriptor(), None, no_params()).unwrap();
        assert_eq!(d.pool().in_flight(), 1);
        assert_eq!(body.into_string().unwrap(), "<friends_get_response/>");
        assert_eq!(d.pool().in_flight(), 0);
    }
}

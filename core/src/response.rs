//! Response parsing.
//!
//! # Design
//! One forward pass over the XML. The root element decides the outcome:
//! `error_response` routes every later element to the error collector,
//! the expected root routes them to the call's `ResponseShape`, anything
//! else is a format error. The result is a `Parsed` tagged union, so a
//! caller can never read a half-filled typed result out of an error
//! response; `Parsed::into_result` turns the error side into
//! `ApiError::Remote`.
//!
//! Leaf values are the trimmed text of the element.

use std::io::{BufReader, Read};
use std::str::FromStr;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{ApiError, ErrorResponse};
use crate::session::{AuthToken, Expiry, Session};

pub const ERROR_RESPONSE: &str = "error_response";
pub const AUTH_CREATE_TOKEN_RESPONSE: &str = "auth_createToken_response";
pub const AUTH_GET_SESSION_RESPONSE: &str = "auth_getSession_response";

/// Outcome of one parse run.
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed<T> {
    Result(T),
    Error(ErrorResponse),
}

impl<T> Parsed<T> {
    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            Parsed::Result(value) => Ok(value),
            Parsed::Error(response) => Err(ApiError::Remote(response)),
        }
    }
}

/// A closed element, delivered in document order (children before parents).
#[derive(Debug, Clone, Copy)]
pub struct ElementEnd<'a> {
    pub name: &'a str,
    pub text: &'a str,
    /// The root element has depth 0.
    pub depth: usize,
    pub has_children: bool,
}

/// What a typed parser extracts from the elements of one response kind.
pub trait ResponseShape {
    type Output;

    /// Expected root element name; `None` accepts any root.
    fn root(&self) -> Option<&'static str>;

    fn begin(&mut self, _root: &str) {}

    fn element(&mut self, element: ElementEnd<'_>) -> Result<(), ApiError>;

    fn finish(self) -> Result<Self::Output, ApiError>;
}

enum Route<S> {
    Typed(S),
    Error(ErrorCollector),
}

/// Parse `reader` with `shape`, detecting `error_response` first.
pub fn parse<S, R>(reader: R, shape: S) -> Result<Parsed<S::Output>, ApiError>
where
    S: ResponseShape,
    R: Read,
{
    let mut xml = Reader::from_reader(BufReader::new(reader));
    let mut buf = Vec::new();
    let mut text = String::new();
    // One entry per open element: whether it has had a child yet.
    let mut open: Vec<bool> = Vec::new();
    let mut pending = Some(shape);
    let mut route: Option<Route<S>> = None;

    loop {
        match xml.read_event_into(&mut buf).map_err(malformed)? {
            Event::Start(e) => {
                let name = element_name(e.local_name().as_ref())?;
                if open.is_empty() {
                    route = Some(choose_route(&mut pending, &name)?);
                }
                if let Some(parent) = open.last_mut() {
                    *parent = true;
                }
                open.push(false);
                text.clear();
            }
            Event::Empty(e) => {
                let name = element_name(e.local_name().as_ref())?;
                if open.is_empty() {
                    route = Some(choose_route(&mut pending, &name)?);
                }
                if let Some(parent) = open.last_mut() {
                    *parent = true;
                }
                let element = ElementEnd {
                    name: &name,
                    text: "",
                    depth: open.len(),
                    has_children: false,
                };
                deliver(route.as_mut(), element)?;
                text.clear();
            }
            Event::Text(e) => {
                text.push_str(&e.unescape().map_err(malformed)?);
            }
            Event::CData(e) => {
                let data = std::str::from_utf8(&e)
                    .map_err(|err| ApiError::Format(format!("CDATA is not UTF-8: {err}")))?;
                text.push_str(data);
            }
            Event::End(e) => {
                let name = element_name(e.local_name().as_ref())?;
                let has_children = open.pop().unwrap_or(false);
                let element = ElementEnd {
                    name: &name,
                    text: text.trim(),
                    depth: open.len(),
                    has_children,
                };
                deliver(route.as_mut(), element)?;
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !open.is_empty() {
        return Err(ApiError::Format(format!("response ends inside {} open element(s)", open.len())));
    }

    match route {
        Some(Route::Typed(shape)) => Ok(Parsed::Result(shape.finish()?)),
        Some(Route::Error(collector)) => {
            let response = collector.finish()?;
            tracing::warn!(
                code = response.code,
                message = %response.message,
                "remote service returned an error response"
            );
            Ok(Parsed::Error(response))
        }
        None => Err(ApiError::Format("response has no root element".to_string())),
    }
}

fn choose_route<S: ResponseShape>(pending: &mut Option<S>, root: &str) -> Result<Route<S>, ApiError> {
    let Some(mut shape) = pending.take() else {
        return Err(ApiError::Format("response has more than one root".to_string()));
    };
    if root == ERROR_RESPONSE {
        return Ok(Route::Error(ErrorCollector::default()));
    }
    match shape.root() {
        Some(expected) if expected != root => Err(ApiError::Format(format!(
            "expected <{expected}>, found <{root}>"
        ))),
        _ => {
            shape.begin(root);
            Ok(Route::Typed(shape))
        }
    }
}

fn deliver<S: ResponseShape>(route: Option<&mut Route<S>>, element: ElementEnd<'_>) -> Result<(), ApiError> {
    match route {
        Some(Route::Typed(shape)) => shape.element(element),
        Some(Route::Error(collector)) => collector.element(element),
        None => Ok(()),
    }
}

fn element_name(raw: &[u8]) -> Result<String, ApiError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| ApiError::Format(format!("element name is not UTF-8: {e}")))
}

fn malformed(err: quick_xml::Error) -> ApiError {
    ApiError::Format(format!("malformed XML: {err}"))
}

/// Parse an integer leaf, reporting the element name on failure.
pub fn parse_number<T: FromStr>(name: &str, text: &str) -> Result<T, ApiError> {
    text.parse()
        .map_err(|_| ApiError::Format(format!("<{name}>: expected an integer, found {text:?}")))
}

/// Accumulates `error_code`, `error_msg` and `request_args/arg/{key,value}`.
#[derive(Debug, Default)]
struct ErrorCollector {
    response: ErrorResponse,
    saw_code: bool,
    key: Option<String>,
    value: Option<String>,
}

impl ErrorCollector {
    fn element(&mut self, element: ElementEnd<'_>) -> Result<(), ApiError> {
        match element.name {
            "error_code" => {
                self.response.code = parse_number(element.name, element.text)?;
                self.saw_code = true;
            }
            "error_msg" => self.response.message = element.text.to_string(),
            "key" => self.key = Some(element.text.to_string()),
            "value" => self.value = Some(element.text.to_string()),
            "arg" => {
                if let Some(key) = self.key.take() {
                    let value = self.value.take().unwrap_or_default();
                    self.response.params.insert(key, value);
                }
                self.value = None;
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<ErrorResponse, ApiError> {
        if !self.saw_code {
            return Err(ApiError::Format("error_response without error_code".to_string()));
        }
        Ok(self.response)
    }
}

/// `auth.createToken`: the token is the text of the root element.
#[derive(Debug, Default)]
pub struct AuthTokenShape {
    token: Option<String>,
}

impl ResponseShape for AuthTokenShape {
    type Output = AuthToken;

    fn root(&self) -> Option<&'static str> {
        Some(AUTH_CREATE_TOKEN_RESPONSE)
    }

    fn element(&mut self, element: ElementEnd<'_>) -> Result<(), ApiError> {
        if element.depth == 0 {
            self.token = Some(element.text.to_string());
        }
        Ok(())
    }

    fn finish(self) -> Result<AuthToken, ApiError> {
        match self.token {
            Some(token) if !token.is_empty() => Ok(AuthToken::new(token)),
            _ => Err(ApiError::Format("auth token is empty".to_string())),
        }
    }
}

/// `auth.getSession`: `session_key`, `uid`, `expires` and, for desktop
/// applications only, a session `secret` that replaces the application
/// secret for signing later calls.
#[derive(Debug)]
pub struct SessionShape {
    api_key: String,
    app_secret: String,
    session_key: Option<String>,
    user_id: Option<u64>,
    expiry: Option<Expiry>,
    secret: Option<String>,
}

impl SessionShape {
    pub fn new(api_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            app_secret: app_secret.into(),
            session_key: None,
            user_id: None,
            expiry: None,
            secret: None,
        }
    }
}

impl ResponseShape for SessionShape {
    type Output = Session;

    fn root(&self) -> Option<&'static str> {
        Some(AUTH_GET_SESSION_RESPONSE)
    }

    fn element(&mut self, element: ElementEnd<'_>) -> Result<(), ApiError> {
        match element.name {
            "session_key" => self.session_key = Some(element.text.to_string()),
            "uid" => self.user_id = Some(parse_number(element.name, element.text)?),
            "expires" => {
                let seconds: u64 = parse_number(element.name, element.text)?;
                let expiry = Expiry::from_epoch_seconds(seconds)
                    .ok_or_else(|| ApiError::Format(format!("<expires>: {seconds} is out of range")))?;
                self.expiry = Some(expiry);
            }
            "secret" => self.secret = Some(element.text.to_string()),
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<Session, ApiError> {
        let missing = |name: &str| ApiError::Format(format!("session response is missing <{name}>"));
        let session_key = self.session_key.ok_or_else(|| missing("session_key"))?;
        let user_id = self.user_id.ok_or_else(|| missing("uid"))?;
        let expiry = self.expiry.ok_or_else(|| missing("expires"))?;

        let is_desktop = self.secret.is_some();
        let secret = self.secret.unwrap_or(self.app_secret);
        Ok(Session::new(self.api_key, secret, session_key, user_id, expiry, is_desktop))
    }
}

/// Any root; collects the leaf elements below it in document order.
#[derive(Debug, Default)]
pub struct ElementsShape {
    root: String,
    leaves: Vec<(String, String)>,
}

/// Root name and leaf values of a response with no dedicated parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elements {
    pub root: String,
    pub leaves: Vec<(String, String)>,
}

impl Elements {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.leaves.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.leaves.iter().filter(move |(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

impl ResponseShape for ElementsShape {
    type Output = Elements;

    fn root(&self) -> Option<&'static str> {
        None
    }

    fn begin(&mut self, root: &str) {
        self.root = root.to_string();
    }

    fn element(&mut self, element: ElementEnd<'_>) -> Result<(), ApiError> {
        if element.depth > 0 && !element.has_children {
            self.leaves.push((element.name.to_string(), element.text.to_string()));
        }
        Ok(())
    }

    fn finish(self) -> Result<Elements, ApiError> {
        Ok(Elements {
            root: self.root,
            leaves: self.leaves,
        })
    }
}

pub fn parse_auth_token<R: Read>(reader: R) -> Result<AuthToken, ApiError> {
    parse(reader, AuthTokenShape::default())?.into_result()
}

pub fn parse_session<R: Read>(reader: R, api_key: &str, app_secret: &str) -> Result<Session, ApiError> {
    parse(reader, SessionShape::new(api_key, app_secret))?.into_result()
}

pub fn parse_elements<R: Read>(reader: R) -> Result<Elements, ApiError> {
    parse(reader, ElementsShape::default())?.into_result()
}

/// Responses requested with `format=JSON`.
pub mod json {
    use std::collections::BTreeMap;
    use std::io::Read;

    use serde::de::DeserializeOwned;
    use serde::Deserialize;

    use crate::error::{ApiError, ErrorResponse};

    #[derive(Deserialize)]
    struct JsonError {
        error_code: i32,
        #[serde(default)]
        error_msg: String,
        #[serde(default)]
        request_args: Vec<JsonArg>,
    }

    #[derive(Deserialize)]
    struct JsonArg {
        key: String,
        #[serde(default)]
        value: serde_json::Value,
    }

    /// Deserialize a JSON body, surfacing the error object as
    /// `ApiError::Remote`.
    pub fn parse<T: DeserializeOwned, R: Read>(reader: R) -> Result<T, ApiError> {
        let value: serde_json::Value = serde_json::from_reader(reader)
            .map_err(|e| ApiError::Format(format!("malformed JSON: {e}")))?;

        if value.get("error_code").is_some() {
            let error: JsonError = serde_json::from_value(value)
                .map_err(|e| ApiError::Format(format!("malformed error object: {e}")))?;
            let params: BTreeMap<String, String> = error
                .request_args
                .into_iter()
                .map(|arg| {
                    let value = match arg.value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (arg.key, value)
                })
                .collect();
            tracing::warn!(code = error.error_code, message = %error.error_msg, "remote service returned an error object");
            return Err(ApiError::Remote(ErrorResponse {
                code: error.error_code,
                message: error.error_msg,
                params,
            }));
        }

        serde_json::from_value(value).map_err(|e| ApiError::Format(format!("unexpected JSON shape: {e}")))
    }
}

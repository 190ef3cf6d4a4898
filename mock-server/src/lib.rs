//! In-process stand-in for the platform REST endpoint.
//!
//! Serves `POST /restserver.php` with form or multipart bodies, checks the
//! API key, protocol version, MD5 signature and per-session `call_id`
//! ordering, and answers a handful of methods with XML. Logins are approved
//! as soon as a token is issued. `POST /unavailable` always answers 503.
//!
//! The signature check is written independently of the client crate so the
//! end-to-end tests catch drift between the two.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Router,
};
use md5::{Digest, Md5};
use quick_xml::escape::escape;
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const API_VERSION: &str = "1.0";

pub const WEB_API_KEY: &str = "web-app-key";
pub const WEB_SECRET: &str = "web-app-secret";
pub const DESKTOP_API_KEY: &str = "desktop-app-key";
pub const DESKTOP_SECRET: &str = "desktop-app-secret";

/// User every approved login belongs to.
pub const TEST_UID: u64 = 8055;
pub const FRIEND_UIDS: [u64; 2] = [222, 333];

/// Lifetime of web sessions; desktop sessions never expire.
const WEB_SESSION_SECS: u64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct RegisteredApp {
    pub api_key: String,
    pub secret: String,
    pub desktop: bool,
}

impl RegisteredApp {
    pub fn new(api_key: &str, secret: &str, desktop: bool) -> Self {
        Self {
            api_key: api_key.to_string(),
            secret: secret.to_string(),
            desktop,
        }
    }
}

#[derive(Debug)]
struct MockSession {
    api_key: String,
    uid: u64,
    secret: Option<String>,
    last_call_id: u64,
}

#[derive(Debug, Default)]
pub struct Registry {
    apps: HashMap<String, RegisteredApp>,
    /// Issued token → API key that asked for it.
    tokens: HashMap<String, String>,
    sessions: HashMap<String, MockSession>,
}

pub type Db = Arc<RwLock<Registry>>;

#[derive(Debug)]
struct UploadedFile {
    file_name: String,
    size: usize,
}

#[derive(Debug)]
struct Call {
    params: HashMap<String, String>,
    file: Option<UploadedFile>,
}

pub fn app() -> Router {
    app_with(vec![
        RegisteredApp::new(WEB_API_KEY, WEB_SECRET, false),
        RegisteredApp::new(DESKTOP_API_KEY, DESKTOP_SECRET, true),
    ])
}

pub fn app_with(apps: Vec<RegisteredApp>) -> Router {
    let registry = Registry {
        apps: apps.into_iter().map(|a| (a.api_key.clone(), a)).collect(),
        ..Registry::default()
    };
    let db: Db = Arc::new(RwLock::new(registry));
    Router::new()
        .route("/restserver.php", post(rest_call))
        .route("/unavailable", post(unavailable))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// The signature the platform expects: sorted `key=value` pairs, the
/// secret appended, MD5, lowercase hex.
pub fn sign(params: &HashMap<String, String>, secret: &str) -> String {
    let mut pairs: Vec<String> = params
        .iter()
        .filter(|(k, _)| k.as_str() != "sig")
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    pairs.sort();
    let mut payload = pairs.concat();
    payload.push_str(secret);
    hex::encode(Md5::digest(payload.as_bytes()))
}

async fn unavailable() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance")
}

async fn rest_call(State(db): State<Db>, request: Request) -> Response {
    let call = match read_call(request).await {
        Ok(call) => call,
        Err(status) => return status.into_response(),
    };
    let method = call.params.get("method").cloned().unwrap_or_default();
    let body = match handle(&db, &call).await {
        Ok(body) => body,
        Err((code, message)) => {
            tracing::debug!(%method, code, message, "rejected call");
            error_response(code, message, &call.params)
        }
    };
    ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], body).into_response()
}

async fn read_call(request: Request) -> Result<Call, StatusCode> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !is_multipart {
        let Form(params) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        return Ok(Call { params, file: None });
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let mut params = HashMap::new();
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                file = Some(UploadedFile {
                    file_name,
                    size: bytes.len(),
                });
            }
            None => {
                let value = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                params.insert(name, value);
            }
        }
    }
    Ok(Call { params, file })
}

type Rejection = (i32, &'static str);

async fn handle(db: &Db, call: &Call) -> Result<String, Rejection> {
    let params = &call.params;
    let param = |name: &str| params.get(name).map(String::as_str);

    let mut registry = db.write().await;
    let app = param("api_key")
        .and_then(|key| registry.apps.get(key))
        .cloned()
        .ok_or((101, "Invalid API key"))?;
    if param("v") != Some(API_VERSION) {
        return Err((100, "Invalid parameter"));
    }
    let method = param("method").ok_or((100, "Invalid parameter"))?;

    let session_key = param("session_key");
    let session_secret = session_key
        .and_then(|key| registry.sessions.get(key))
        .and_then(|s| s.secret.clone());
    let secret = session_secret.as_deref().unwrap_or(&app.secret);
    if param("sig") != Some(sign(params, secret).as_str()) {
        return Err((104, "Incorrect signature"));
    }

    match method {
        "facebook.auth.createToken" => {
            let token = Uuid::new_v4().simple().to_string();
            registry.tokens.insert(token.clone(), app.api_key.clone());
            return Ok(format!(
                "<auth_createToken_response>{token}</auth_createToken_response>"
            ));
        }
        "facebook.auth.getSession" => {
            let token = param("auth_token").ok_or((100, "Invalid parameter"))?;
            match registry.tokens.remove(token) {
                Some(owner) if owner == app.api_key => {}
                _ => return Err((100, "Invalid parameter")),
            }
            let session_key = format!("{}-{TEST_UID}", Uuid::new_v4().simple());
            let secret = app.desktop.then(|| Uuid::new_v4().simple().to_string());
            let expires = if app.desktop { 0 } else { now_secs() + WEB_SESSION_SECS };
            registry.sessions.insert(
                session_key.clone(),
                MockSession {
                    api_key: app.api_key.clone(),
                    uid: TEST_UID,
                    secret: secret.clone(),
                    last_call_id: 0,
                },
            );
            let secret_element = secret
                .map(|s| format!("<secret>{s}</secret>"))
                .unwrap_or_default();
            return Ok(format!(
                "<auth_getSession_response><session_key>{session_key}</session_key><uid>{TEST_UID}</uid><expires>{expires}</expires>{secret_element}</auth_getSession_response>"
            ));
        }
        _ => {}
    }

    let session = session_key
        .and_then(|key| registry.sessions.get_mut(key))
        .filter(|s| s.api_key == app.api_key)
        .ok_or((102, "Session key invalid or no longer valid"))?;
    let call_id: u64 = param("call_id")
        .and_then(|id| id.parse().ok())
        .ok_or((100, "Invalid parameter"))?;
    if call_id <= session.last_call_id {
        return Err((103, "Invalid call_id"));
    }
    session.last_call_id = call_id;
    let uid = session.uid;

    match method {
        "facebook.friends.get" => {
            let uids: String = FRIEND_UIDS.iter().map(|u| format!("<uid>{u}</uid>")).collect();
            Ok(format!(
                "<friends_get_response list=\"true\">{uids}</friends_get_response>"
            ))
        }
        "facebook.users.getLoggedInUser" => Ok(format!(
            "<users_getLoggedInUser_response>{uid}</users_getLoggedInUser_response>"
        )),
        "facebook.photos.upload" => {
            let file = call.file.as_ref().ok_or((100, "Invalid parameter"))?;
            let caption = escape(param("caption").unwrap_or_default());
            Ok(format!(
                "<photos_upload_response><pid>{pid}</pid><owner>{uid}</owner><caption>{caption}</caption><filename>{name}</filename><size>{size}</size></photos_upload_response>",
                pid = Uuid::new_v4().simple(),
                name = escape(&file.file_name),
                size = file.size,
            ))
        }
        _ => Err((3, "Unknown method")),
    }
}

fn error_response(code: i32, message: &str, params: &HashMap<String, String>) -> String {
    let sorted: BTreeMap<&String, &String> = params.iter().collect();
    let args: String = sorted
        .into_iter()
        .map(|(k, v)| format!("<arg><key>{}</key><value>{}</value></arg>", escape(k), escape(v)))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<error_response><error_code>{code}</error_code><error_msg>{}</error_msg><request_args list=\"true\">{args}</request_args></error_response>",
        escape(message)
    )
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

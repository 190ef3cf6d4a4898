//! Check signing, request building and response parsing against the JSON
//! vectors stored in `test-vectors/`.
//!
//! Expected signatures were computed independently of this crate. Request
//! bodies are compared as decoded parameter maps so encoding order does not
//! matter.

use std::collections::BTreeMap;

use f8_core::response::{parse_auth_token, parse_elements, parse_session};
use f8_core::{signature, ApiError, ClientConfig, Credentials, Dispatcher, Expiry, Method, UreqTransport};
use serde_json::Value;

fn pairs(value: &Value) -> Vec<(String, String)> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|pair| {
            (
                pair[0].as_str().unwrap().to_string(),
                pair[1].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

fn string_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.as_str().unwrap().to_string()))
        .collect()
}

fn assert_remote(name: &str, err: ApiError, expected: &Value) {
    let ApiError::Remote(remote) = err else {
        panic!("{name}: expected a remote error, got {err:?}");
    };
    assert_eq!(i64::from(remote.code), expected["code"].as_i64().unwrap(), "{name}: code");
    assert_eq!(remote.message, expected["message"].as_str().unwrap(), "{name}: message");
    assert_eq!(remote.params, string_map(&expected["params"]), "{name}: params");
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

#[test]
fn signature_test_vectors() {
    let raw = include_str!("../../test-vectors/signature.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let params = pairs(&case["params"]);
        let secret = case["secret"].as_str().unwrap();
        let expected = case["expected"].as_str().unwrap();

        let computed = signature::compute(params.iter().map(|(k, v)| (k.as_str(), v.as_str())), secret);
        assert_eq!(computed, expected, "{name}: signature");
        assert!(
            signature::verify(params.iter().map(|(k, v)| (k.as_str(), v.as_str())), secret, expected),
            "{name}: verify"
        );

        // Input order never matters.
        let reversed = signature::compute(params.iter().rev().map(|(k, v)| (k.as_str(), v.as_str())), secret);
        assert_eq!(reversed, expected, "{name}: reversed order");
    }
}

// ---------------------------------------------------------------------------
// Request building
// ---------------------------------------------------------------------------

#[test]
fn request_test_vectors() {
    let raw = include_str!("../../test-vectors/request.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    let config = ClientConfig::default();
    let dispatcher = Dispatcher::new(config.clone(), UreqTransport::new(&config));

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let method = Method::from_wire_name(case["method"].as_str().unwrap()).unwrap();
        let credentials = Credentials::application(
            case["api_key"].as_str().unwrap(),
            case["secret"].as_str().unwrap(),
            case["use_https"].as_bool().unwrap(),
        );
        let expected = &case["expected_request"];

        let req = dispatcher
            .build_request(&credentials, method.descriptor(), None, pairs(&case["params"]))
            .unwrap();
        assert_eq!(req.url, expected["url"].as_str().unwrap(), "{name}: url");
        assert_eq!(
            req.header("Content-Type"),
            expected["content_type"].as_str(),
            "{name}: content type"
        );

        let sent: BTreeMap<String, String> = url::form_urlencoded::parse(&req.body).into_owned().collect();
        assert_eq!(sent, string_map(&expected["params"]), "{name}: params");
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[test]
fn response_test_vectors() {
    let raw = include_str!("../../test-vectors/responses.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let body = case["body"].as_str().unwrap().as_bytes();
        let expected = &case["expected"];
        let expected_error = &case["expected_error"];

        match case["kind"].as_str().unwrap() {
            "token" => match parse_auth_token(body) {
                Ok(token) => assert_eq!(token.as_str(), expected["token"].as_str().unwrap(), "{name}"),
                Err(err) => assert_remote(name, err, expected_error),
            },
            "session" => {
                let api_key = case["api_key"].as_str().unwrap();
                match parse_session(body, api_key, case["app_secret"].as_str().unwrap()) {
                    Ok(session) => {
                        assert_eq!(session.api_key(), api_key, "{name}: api key");
                        assert_eq!(session.session_key(), expected["session_key"].as_str().unwrap(), "{name}: key");
                        assert_eq!(session.user_id(), expected["uid"].as_u64().unwrap(), "{name}: uid");
                        assert_eq!(
                            session.expiry(),
                            Expiry::from_epoch_seconds(expected["expires"].as_u64().unwrap()).unwrap(),
                            "{name}: expiry"
                        );
                        assert_eq!(session.secret(), expected["secret"].as_str().unwrap(), "{name}: secret");
                        assert_eq!(session.is_desktop(), expected["desktop"].as_bool().unwrap(), "{name}: desktop");
                    }
                    Err(err) => assert_remote(name, err, expected_error),
                }
            }
            "elements" => match parse_elements(body) {
                Ok(elements) => {
                    assert_eq!(elements.root, expected["root"].as_str().unwrap(), "{name}: root");
                    assert_eq!(elements.leaves, pairs(&expected["leaves"]), "{name}: leaves");
                }
                Err(err) => assert_remote(name, err, expected_error),
            },
            other => panic!("{name}: unknown kind {other}"),
        }
    }
}

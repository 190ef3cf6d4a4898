//! Request signatures.
//!
//! Every outbound request carries a `sig` parameter: the pairs rendered as
//! `key=value`, sorted as whole strings, concatenated without a separator,
//! followed by the shared secret, hashed with MD5 and rendered as lowercase
//! hex.
//!
//! # Security
//! Unsalted MD5 over `params || secret` is cryptographically obsolete. It is
//! kept byte-for-byte because the remote service verifies exactly this
//! construction; do not reuse it for anything that does not talk to that
//! service.
//!
//! Inbound requests from the platform (canvas pages, callbacks) carry the
//! same kind of signature in the `fb_sig` parameter, computed over the
//! `fb_sig_*` parameters with the prefix stripped.

use std::collections::HashMap;

use md5::{Digest, Md5};
use subtle::ConstantTimeEq;

/// Name of the signature parameter on inbound requests; also the prefix of
/// the signed namespace.
pub const SIGNATURE_PARAM: &str = "fb_sig";

const NAMESPACE_PREFIX: &str = "fb_sig_";

/// Compute the signature of `params` under `secret`.
pub fn compute<'a, I>(params: I, secret: &str) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut rendered: Vec<String> = params.into_iter().map(|(k, v)| format!("{k}={v}")).collect();
    rendered.sort_unstable();

    let mut payload = rendered.concat();
    // Values can carry session keys; log names only.
    let names: Vec<&str> = rendered.iter().filter_map(|pair| pair.split_once('=')).map(|(k, _)| k).collect();
    tracing::debug!(params = ?names, payload_len = payload.len(), "signing request parameters");
    payload.push_str(secret);

    let signature = hex::encode(Md5::digest(payload.as_bytes()));
    tracing::debug!(signature = %signature, "computed signature");
    signature
}

/// Check `expected` against the signature of `params` under `secret`.
///
/// An empty parameter set or an empty expected signature never matches.
pub fn verify<'a, I>(params: I, secret: &str, expected: &str) -> bool
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    if expected.is_empty() {
        return false;
    }
    let mut params = params.into_iter().peekable();
    if params.peek().is_none() {
        return false;
    }
    let computed = compute(params, secret);
    computed.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Whether `key` belongs to the signed `fb_sig` namespace.
pub fn is_in_namespace(key: &str) -> bool {
    key.starts_with(SIGNATURE_PARAM)
}

/// `fb_sig_user` → `user`; names outside the prefix are returned unchanged.
pub fn strip_signature_prefix(key: &str) -> &str {
    key.strip_prefix(NAMESPACE_PREFIX).unwrap_or(key)
}

/// Keep only the parameters in the signed namespace.
pub fn extract_namespace_params<K, V>(params: &HashMap<K, V>) -> HashMap<String, String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    params
        .iter()
        .filter(|(k, _)| is_in_namespace(k.as_ref()))
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
        .collect()
}

/// Like [`extract_namespace_params`] for multi-valued request maps: only the
/// first value of each parameter counts, and parameters without values are
/// dropped.
pub fn extract_first_values<K, V>(params: &HashMap<K, Vec<V>>) -> HashMap<String, String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    params
        .iter()
        .filter(|(k, _)| is_in_namespace(k.as_ref()))
        .filter_map(|(k, values)| {
            values
                .first()
                .map(|v| (k.as_ref().to_string(), v.as_ref().to_string()))
        })
        .collect()
}

/// Verify an inbound parameter map carrying its own `fb_sig`.
///
/// Only namespaced parameters participate; their `fb_sig_` prefix is
/// stripped before signing. A map without `fb_sig` does not verify.
pub fn verify_signed_params<K, V>(params: &HashMap<K, V>, secret: &str) -> bool
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut expected = None;
    let mut signed = Vec::with_capacity(params.len());
    for (key, value) in params {
        let key = key.as_ref();
        if key == SIGNATURE_PARAM {
            expected = Some(value.as_ref());
        } else if is_in_namespace(key) {
            signed.push((strip_signature_prefix(key), value.as_ref()));
        }
    }
    match expected {
        Some(expected) => verify(signed, secret, expected),
        None => false,
    }
}

/// Parameters the platform sends in the signed namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignedParam {
    User,
    SessionKey,
    Expires,
    InCanvas,
    InIframe,
    InProfile,
    Time,
    Friends,
    Added,
    ProfileUpdateTime,
    ApiKey,
}

impl SignedParam {
    pub const ALL: [SignedParam; 11] = [
        SignedParam::User,
        SignedParam::SessionKey,
        SignedParam::Expires,
        SignedParam::InCanvas,
        SignedParam::InIframe,
        SignedParam::InProfile,
        SignedParam::Time,
        SignedParam::Friends,
        SignedParam::Added,
        SignedParam::ProfileUpdateTime,
        SignedParam::ApiKey,
    ];

    /// Name used when signing, without the namespace prefix.
    pub fn signature_name(self) -> &'static str {
        match self {
            SignedParam::User => "user",
            SignedParam::SessionKey => "session_key",
            SignedParam::Expires => "expires",
            SignedParam::InCanvas => "in_canvas",
            SignedParam::InIframe => "in_iframe",
            SignedParam::InProfile => "profile",
            SignedParam::Time => "time",
            SignedParam::Friends => "friends",
            SignedParam::Added => "added",
            SignedParam::ProfileUpdateTime => "profile_update_time",
            SignedParam::ApiKey => "api_key",
        }
    }

    /// Full request parameter name, e.g. `fb_sig_user`.
    pub fn param_name(self) -> String {
        format!("{NAMESPACE_PREFIX}{}", self.signature_name())
    }

    pub fn from_param_name(name: &str) -> Option<SignedParam> {
        let short = name.strip_prefix(NAMESPACE_PREFIX)?;
        SignedParam::ALL.into_iter().find(|p| p.signature_name() == short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // md5("a=1b=2secret")
        let sig = compute([("b", "2"), ("a", "1")], "secret");
        assert_eq!(sig, hex::encode(Md5::digest(b"a=1b=2secret")));
        assert_eq!(sig.len(), 32);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let forward = compute([("method", "m"), ("api_key", "k"), ("v", "1.0")], "s");
        let backward = compute([("v", "1.0"), ("api_key", "k"), ("method", "m")], "s");
        assert_eq!(forward, backward);
    }

    #[test]
    fn sorts_whole_rendered_pairs() {
        // "a=2" < "ab=1" because '=' sorts before 'b'.
        let sig = compute([("ab", "1"), ("a", "2")], "x");
        assert_eq!(sig, hex::encode(Md5::digest(b"a=2ab=1x")));
    }

    #[test]
    fn any_value_change_changes_signature() {
        let base = compute([("a", "1"), ("b", "2")], "s");
        assert_ne!(base, compute([("a", "1"), ("b", "3")], "s"));
        assert_ne!(base, compute([("a", "0"), ("b", "2")], "s"));
    }

    #[test]
    fn verify_round_trips_only_with_same_secret() {
        let params = [("a", "1"), ("b", "2")];
        let sig = compute(params, "one");
        assert!(verify(params, "one", &sig));
        assert!(!verify(params, "two", &sig));
        assert!(!verify(params, "one", &compute(params, "two")));
    }

    #[test]
    fn empty_expected_or_params_never_verify() {
        assert!(!verify([("a", "1")], "s", ""));
        let none: [(&str, &str); 0] = [];
        assert!(!verify(none, "s", &compute(none, "s")));
    }

    #[test]
    fn namespace_helpers() {
        assert!(is_in_namespace("fb_sig"));
        assert!(is_in_namespace("fb_sig_user"));
        assert!(!is_in_namespace("auth_token"));
        assert_eq!(strip_signature_prefix("fb_sig_user"), "user");
        assert_eq!(strip_signature_prefix("auth_token"), "auth_token");
        assert_eq!(SignedParam::from_param_name("fb_sig_in_canvas"), Some(SignedParam::InCanvas));
        assert_eq!(SignedParam::from_param_name("fb_sig"), None);
        assert_eq!(SignedParam::Time.param_name(), "fb_sig_time");
    }

    #[test]
    fn extract_first_values_drops_empty_and_foreign() {
        let mut raw: HashMap<&str, Vec<&str>> = HashMap::new();
        raw.insert("fb_sig_user", vec!["8055", "9999"]);
        raw.insert("fb_sig_added", vec![]);
        raw.insert("page", vec!["2"]);

        let extracted = extract_first_values(&raw);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted["fb_sig_user"], "8055");
    }

    #[test]
    fn verifies_inbound_signed_params() {
        let secret = "app-secret";
        let sig = compute([("user", "8055"), ("time", "1173309298")], secret);

        let mut params: HashMap<String, String> = HashMap::new();
        params.insert("fb_sig_user".into(), "8055".into());
        params.insert("fb_sig_time".into(), "1173309298".into());
        params.insert("page".into(), "ignored".into());
        params.insert("fb_sig".into(), sig);

        let namespaced = extract_namespace_params(&params);
        assert!(!namespaced.contains_key("page"));
        assert!(verify_signed_params(&namespaced, secret));
        assert!(verify_signed_params(&params, secret));
        assert!(!verify_signed_params(&params, "other"));

        params.remove("fb_sig");
        assert!(!verify_signed_params(&params, secret));
    }
}

//! Request parameter assembly.
//!
//! A `ParameterSet` keeps one value per name. Inserting a name twice keeps
//! the later value; the collision is logged at debug level and recorded as
//! an `Overwrite` so callers and tests can inspect it. Iteration is in key
//! order, which is also the order the signature is computed in.

use std::collections::BTreeMap;

use crate::error::ApiError;

/// A value replaced by a later insertion for the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overwrite {
    pub name: String,
    pub previous: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    entries: BTreeMap<String, String>,
    overwrites: Vec<Overwrite>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `name`, returning the value it replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();
        let previous = self.entries.insert(name.clone(), value.clone())?;
        tracing::debug!(
            parameter = %name,
            previous = %previous,
            value = %value,
            "overwrote request parameter"
        );
        self.overwrites.push(Overwrite {
            name,
            previous: previous.clone(),
            value,
        });
        Some(previous)
    }

    pub fn extend<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in pairs {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Collisions seen so far, oldest first.
    pub fn overwrites(&self) -> &[Overwrite] {
        &self.overwrites
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = ParameterSet::new();
        set.extend(iter);
        set
    }
}

/// Response format requested with the optional `format` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Xml,
    Json,
}

impl ResponseFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseFormat::Xml => "XML",
            ResponseFormat::Json => "JSON",
        }
    }
}

/// The optional `format` and `callback` parameters most methods accept.
pub fn common_params(format: Option<ResponseFormat>, callback: Option<&str>) -> Vec<(String, String)> {
    let mut params = Vec::with_capacity(2);
    if let Some(format) = format {
        params.push(("format".to_string(), format.as_str().to_string()));
    }
    if let Some(callback) = callback {
        params.push(("callback".to_string(), callback.to_string()));
    }
    params
}

/// Render ids as the comma-delimited list the service expects.
pub fn join_ids<S: AsRef<str>>(ids: &[S]) -> Result<String, ApiError> {
    if ids.is_empty() {
        return Err(ApiError::Validation("at least one id is required".to_string()));
    }
    if ids.iter().any(|id| id.as_ref().trim().is_empty()) {
        return Err(ApiError::Validation("ids must not be blank".to_string()));
    }
    Ok(ids.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_value_wins_and_is_recorded() {
        let mut params = ParameterSet::new();
        assert_eq!(params.insert("a", "1"), None);
        assert_eq!(params.insert("a", "2"), Some("1".to_string()));

        assert_eq!(params.get("a"), Some("2"));
        assert_eq!(params.len(), 1);
        assert_eq!(
            params.overwrites(),
            &[Overwrite {
                name: "a".to_string(),
                previous: "1".to_string(),
                value: "2".to_string(),
            }]
        );
    }

    #[test]
    fn iterates_in_key_order() {
        let params: ParameterSet = [("v", "1.0"), ("api_key", "k"), ("method", "m")].into_iter().collect();
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["api_key", "method", "v"]);
        assert!(params.overwrites().is_empty());
    }

    #[test]
    fn common_params_skip_absent_values() {
        assert!(common_params(None, None).is_empty());
        assert_eq!(
            common_params(Some(ResponseFormat::Json), Some("cb")),
            vec![
                ("format".to_string(), "JSON".to_string()),
                ("callback".to_string(), "cb".to_string()),
            ]
        );
    }

    #[test]
    fn join_ids_rejects_empty_list() {
        let empty: [&str; 0] = [];
        assert!(matches!(join_ids(&empty), Err(ApiError::Validation(_))));
        assert!(matches!(join_ids(&["1", " "]), Err(ApiError::Validation(_))));
        assert_eq!(join_ids(&["1", "22", "333"]).unwrap(), "1,22,333");
    }
}

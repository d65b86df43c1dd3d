//! YAML loading for manifest-style CRD tests
//!
//! Parses with yaml-rust2 and converts into `serde_json::Value` so that the
//! CRD types only ever need their serde/JSON representation.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::{Error, Result};

/// Parse the first YAML document of `input` into a JSON value.
///
/// Empty input yields `Value::Null`.
pub fn parse_yaml(input: &str) -> Result<Value> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| yaml_error(e.to_string()))?;
    match docs.into_iter().next() {
        Some(doc) => yaml_to_json(doc),
        None => Ok(Value::Null),
    }
}

/// Parse YAML straight into a typed value (a CRD spec, a status fragment, ...)
pub fn from_yaml<T: DeserializeOwned>(input: &str) -> Result<T> {
    let value = parse_yaml(input)?;
    Ok(serde_json::from_value(value)?)
}

fn yaml_error(message: String) -> Error {
    Error::Serialization {
        message,
        kind: Some("yaml".to_string()),
    }
}

fn yaml_to_json(yaml: Yaml) -> Result<Value> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s.parse().map_err(|e: std::num::ParseFloatError| {
                yaml_error(format!("invalid float {s}: {e}"))
            })?;
            Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(items) => items
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Yaml::Hash(map) => map
            .into_iter()
            .map(|(k, v)| {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Boolean(b) => b.to_string(),
                    _ => return Err(yaml_error("unsupported YAML key type".to_string())),
                };
                yaml_to_json(v).map(|v| (key, v))
            })
            .collect::<Result<Map<String, Value>>>()
            .map(Value::Object),
        Yaml::Alias(_) => Err(yaml_error("YAML aliases not supported".to_string())),
        Yaml::BadValue => Err(yaml_error("bad YAML value".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_manifest() {
        let yaml = r#"
apiVersion: stash.appscode.com/v1beta1
kind: BackupSession
metadata:
  name: sample-1700000000
  namespace: demo
spec:
  retryLeft: 2
"#;
        let value = parse_yaml(yaml).unwrap();
        assert_eq!(value["kind"], "BackupSession");
        assert_eq!(value["metadata"]["namespace"], "demo");
        assert_eq!(value["spec"]["retryLeft"], 2);
    }

    #[test]
    fn test_empty_input_is_null() {
        assert_eq!(parse_yaml("").unwrap(), Value::Null);
    }

    #[test]
    fn test_invalid_yaml_is_serialization_error() {
        let err = parse_yaml("keepLast: [1, 2").unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn test_from_yaml_typed() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        #[serde(rename_all = "camelCase")]
        struct Policy {
            keep_last: i64,
            prune: bool,
        }

        let policy: Policy = from_yaml("keepLast: 5\nprune: true").unwrap();
        assert_eq!(
            policy,
            Policy {
                keep_last: 5,
                prune: true
            }
        );
    }
}

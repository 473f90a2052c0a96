use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Deadline, Error};

/// Arguments of a remote call: positional values followed by named values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Args {
    #[serde(default)]
    pub positional: Vec<Value>,
    #[serde(default)]
    pub named: Map<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            named: Map::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Append a named argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Append any serializable value as a positional argument.
    pub fn try_arg(self, value: impl Serialize) -> Result<Self, Error> {
        Ok(self.arg(serde_json::to_value(value)?))
    }

    /// Append any serializable value as a named argument.
    pub fn try_kwarg(self, name: impl Into<String>, value: impl Serialize) -> Result<Self, Error> {
        Ok(self.kwarg(name, serde_json::to_value(value)?))
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Value>, Map<String, Value>) {
        (self.positional, self.named)
    }
}

/// Build [`Args`] from positional values.
///
/// ```
/// let args = courier::args![4, 7];
/// assert_eq!(args.positional, vec![serde_json::json!(4), serde_json::json!(7)]);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Args::new()$(.arg($value))+
    };
}

/// Everything a transport needs to perform one call.
///
/// Built fresh for every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub deadline: Deadline,
    pub wait_for_ready: bool,
    pub compress: bool,
    pub chunk_tensors: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn serializable_arguments() {
        let args = Args::new()
            .try_arg(Point { x: 1, y: 2 })
            .unwrap()
            .try_kwarg("origin", Point { x: 0, y: 0 })
            .unwrap();

        let (positional, named) = args.into_parts();
        assert_eq!(positional, vec![json!({"x": 1, "y": 2})]);
        assert_eq!(named.get("origin"), Some(&json!({"x": 0, "y": 0})));
    }

    #[test]
    fn unserializable_argument_is_invalid() {
        let mut map = std::collections::BTreeMap::new();
        map.insert((1, 2), "tuple keys are not valid JSON object keys");

        let err = Args::new().try_arg(map).unwrap_err();
        assert_eq!(err.code(), crate::StatusCode::InvalidArgument);
    }

    #[test]
    fn macro_builds_positional_args() {
        assert!(crate::args![].is_empty());
        let args = crate::args![4, "seven"];
        assert_eq!(args.positional, vec![json!(4), json!("seven")]);
        assert!(args.named.is_empty());
    }
}

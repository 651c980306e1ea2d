//! Purpose: Model the small dynamic value carried by calls and outcomes.
//! Exports: `Value`.
//! Role: Typed stand-in for the untyped payloads exchanged with the UI.
//! Invariants: Only absent, bool, integer, float, string and bytes are representable.
//! Invariants: JSON arrays convert to bytes only when every element fits in `u8`.

use serde_json::{Number, Value as Json};

use super::error::{Error, ErrorKind};

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Absent,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Absent => "absent",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Absent => Json::Null,
            Value::Bool(value) => Json::Bool(*value),
            Value::Int(value) => Json::from(*value),
            // Non-finite floats have no JSON form.
            Value::Float(value) => Number::from_f64(*value)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(value) => Json::String(value.clone()),
            Value::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
        }
    }

    pub fn from_json(json: &Json) -> Result<Self, Error> {
        match json {
            Json::Null => Ok(Value::Absent),
            Json::Bool(value) => Ok(Value::Bool(*value)),
            Json::Number(number) => {
                if let Some(value) = number.as_i64() {
                    Ok(Value::Int(value))
                } else if let Some(value) = number.as_f64() {
                    Ok(Value::Float(value))
                } else {
                    Err(Error::new(ErrorKind::InvalidArgument)
                        .with_message(format!("number out of range: {number}")))
                }
            }
            Json::String(value) => Ok(Value::Str(value.clone())),
            Json::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|byte| u8::try_from(byte).ok())
                        .ok_or_else(|| {
                            Error::new(ErrorKind::InvalidArgument)
                                .with_message("arrays must contain only integers 0-255")
                        })
                })
                .collect::<Result<Vec<u8>, Error>>()
                .map(Value::Bytes),
            Json::Object(_) => Err(Error::new(ErrorKind::InvalidArgument)
                .with_message("objects are not supported as call arguments")),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Absent
    }
}

//! Control envelope codec.
//!
//! Wire format (field names are fixed for interop):
//!
//! ```text
//! call:  {"FunName":"examples","SharePath":"/tmp","ShareId":1,"ShareSize":16}
//! reply: {"Return":0}
//! ```
//!
//! Decoding never fails. Each field is read the way a JSON-C style
//! accessor reads it: missing or null fields become `""` / `0`, numeric
//! strings are parsed, floats truncate, booleans read as 0/1, and a
//! non-string value asked for as a string yields its JSON text. Text
//! that is not a JSON object decodes to the all-default envelope.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::kdebug;
use crate::shm::ShareKey;
use crate::status::{Status, STATUS_OK};

/// Describes one call: which function, and where its payload lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallEnvelope {
    #[serde(rename = "FunName")]
    pub fun_name: String,
    #[serde(flatten)]
    pub share_key: ShareKey,
    #[serde(rename = "ShareSize")]
    pub share_size: usize,
}

impl CallEnvelope {
    pub fn new(fun_name: impl Into<String>, share_key: ShareKey, share_size: usize) -> Self {
        Self {
            fun_name: fun_name.into(),
            share_key,
            share_size,
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Self {
        let Some(obj) = parse_object(text) else {
            kdebug!("call envelope is not a JSON object, using defaults: {:?}", text);
            return Self::default();
        };
        let share_size = lenient_int(&obj, "ShareSize");
        Self {
            fun_name: lenient_str(&obj, "FunName"),
            share_key: ShareKey::new(lenient_str(&obj, "SharePath"), clamp_i32(lenient_int(&obj, "ShareId"))),
            share_size: usize::try_from(share_size).unwrap_or(0),
        }
    }
}

/// Server's answer to a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplyEnvelope {
    #[serde(rename = "Return")]
    pub status: Status,
}

impl Default for ReplyEnvelope {
    fn default() -> Self {
        Self { status: STATUS_OK }
    }
}

impl ReplyEnvelope {
    pub fn new(status: Status) -> Self {
        Self { status }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Self {
        match parse_object(text) {
            Some(obj) => Self::new(clamp_i32(lenient_int(&obj, "Return"))),
            None => {
                kdebug!("reply envelope is not a JSON object, using defaults: {:?}", text);
                Self::default()
            }
        }
    }
}

/// True if `text` is a JSON object, i.e. something `decode` reads fields from.
pub fn is_object(text: &str) -> bool {
    parse_object(text).is_some()
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

fn lenient_str(obj: &Map<String, Value>, field: &str) -> String {
    match obj.get(field) {
        None | Some(Value::Null) => {
            kdebug!("envelope field {} missing, using \"\"", field);
            String::new()
        }
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn lenient_int(obj: &Map<String, Value>, field: &str) -> i64 {
    match obj.get(field) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        Some(Value::Bool(b)) => i64::from(*b),
        _ => {
            kdebug!("envelope field {} missing or not numeric, using 0", field);
            0
        }
    }
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

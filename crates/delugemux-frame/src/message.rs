use std::collections::BTreeMap;

use crate::error::{FrameError, Result};
use crate::rencode::Value;

/// Response discriminant: successful completion of a request.
pub const RPC_RESPONSE: i64 = 1;
/// Response discriminant: failed completion of a request.
pub const RPC_ERROR: i64 = 2;
/// Response discriminant: unsolicited server-pushed event.
pub const RPC_EVENT: i64 = 3;

/// Client-assigned integer correlating a request with its reply.
pub type Tag = u64;

/// An outgoing call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub tag: Tag,
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

impl Request {
    /// Build a request, rejecting an empty method name.
    pub fn new(
        tag: Tag,
        method: impl Into<String>,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<Self> {
        let method = method.into();
        if method.is_empty() {
            return Err(FrameError::InvalidMessage("empty method name".to_string()));
        }
        Ok(Self {
            tag,
            method,
            args,
            kwargs,
        })
    }

    /// The `(tag, method, args, kwargs)` tuple.
    pub fn to_value(&self) -> Value {
        Value::List(vec![
            tag_value(self.tag),
            Value::Str(self.method.clone()),
            Value::List(self.args.clone()),
            Value::Dict(self.kwargs.clone()),
        ])
    }

    /// Parse the `(tag, method, args, kwargs)` tuple.
    pub fn from_value(value: Value) -> Result<Self> {
        let items = match value {
            Value::List(items) => items,
            other => {
                return Err(invalid(format!(
                    "request must be a list, got {}",
                    other.type_name()
                )))
            }
        };
        let [tag, method, args, kwargs]: [Value; 4] =
            items.try_into().map_err(|items: Vec<Value>| {
                invalid(format!("request has {} fields, expected 4", items.len()))
            })?;

        let tag = parse_tag(&tag)?;
        let Value::Str(method) = method else {
            return Err(invalid("request method must be a string"));
        };
        let Value::List(args) = args else {
            return Err(invalid("request args must be a list"));
        };
        let Value::Dict(kwargs) = kwargs else {
            return Err(invalid("request kwargs must be a dict"));
        };
        Self::new(tag, method, args, kwargs)
    }
}

/// An unsolicited notification pushed by the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub args: Vec<Value>,
}

/// An incoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// `(1, tag, value)`
    Result { tag: Tag, value: Value },
    /// `(2, tag, error_value)`
    Fault { tag: Tag, error: Value },
    /// `(3, name, args)`
    Event(Event),
}

impl Response {
    /// The tag this response resolves, if it is not an event.
    pub fn tag(&self) -> Option<Tag> {
        match self {
            Response::Result { tag, .. } | Response::Fault { tag, .. } => Some(*tag),
            Response::Event(_) => None,
        }
    }

    /// Short kind name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Result { .. } => "result",
            Response::Fault { .. } => "fault",
            Response::Event(_) => "event",
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Response::Result { tag, value } => {
                Value::List(vec![Value::Int(RPC_RESPONSE), tag_value(*tag), value.clone()])
            }
            Response::Fault { tag, error } => {
                Value::List(vec![Value::Int(RPC_ERROR), tag_value(*tag), error.clone()])
            }
            Response::Event(event) => Value::List(vec![
                Value::Int(RPC_EVENT),
                Value::Str(event.name.clone()),
                Value::List(event.args.clone()),
            ]),
        }
    }

    /// Interpret a decoded envelope as a response.
    ///
    /// A response wrapped in a one-element list (the shape requests use) is
    /// unwrapped first.
    pub fn from_value(value: Value) -> Result<Self> {
        let items = match value {
            Value::List(items) => match <[Value; 1]>::try_from(items) {
                Ok([Value::List(inner)]) => inner,
                Ok([other]) => vec![other],
                Err(items) => items,
            },
            other => {
                return Err(invalid(format!(
                    "response must be a list, got {}",
                    other.type_name()
                )))
            }
        };

        let mut items = items.into_iter();
        let kind = match items.next() {
            Some(Value::Int(kind)) => kind,
            Some(other) => {
                return Err(invalid(format!(
                    "response type must be an int, got {}",
                    other.type_name()
                )))
            }
            None => return Err(invalid("empty response")),
        };

        let (Some(first), Some(second), None) = (items.next(), items.next(), items.next()) else {
            if !matches!(kind, RPC_RESPONSE | RPC_ERROR | RPC_EVENT) {
                return Err(FrameError::UnknownMessageType(kind));
            }
            return Err(invalid("response must have exactly 3 fields"));
        };

        match kind {
            RPC_RESPONSE => Ok(Response::Result {
                tag: parse_tag(&first)?,
                value: second,
            }),
            RPC_ERROR => Ok(Response::Fault {
                tag: parse_tag(&first)?,
                error: second,
            }),
            RPC_EVENT => {
                let Value::Str(name) = first else {
                    return Err(invalid("event name must be a string"));
                };
                let args = match second {
                    Value::List(args) => args,
                    Value::None => Vec::new(),
                    other => {
                        return Err(invalid(format!(
                            "event args must be a list, got {}",
                            other.type_name()
                        )))
                    }
                };
                Ok(Response::Event(Event { name, args }))
            }
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }
}

fn tag_value(tag: Tag) -> Value {
    // Tags come from a counter starting at zero; i64::MAX is never reached in practice.
    Value::Int(tag as i64)
}

fn parse_tag(value: &Value) -> Result<Tag> {
    match value {
        Value::Int(tag) if *tag >= 0 => Ok(*tag as Tag),
        Value::Int(tag) => Err(invalid(format!("negative request tag {tag}"))),
        other => Err(invalid(format!(
            "request tag must be an int, got {}",
            other.type_name()
        ))),
    }
}

fn invalid(reason: impl Into<String>) -> FrameError {
    FrameError::InvalidMessage(reason.into())
}

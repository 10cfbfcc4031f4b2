/*!
Types that travel over the transport: the chat envelopes we publish, the
Bayeux messages they arrive wrapped in, and the lifecycle events the
transport reports on its meta channel.
*/
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::Variant,
    error::Error,
};

/// The payload of one chat publish.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Envelope {
    Join{ user: String, chat: Option<String> },
    Leave{ user: String, chat: Option<String> },
    Chat{ from: String, text: Option<String>, to: Option<String> },
}

/// Wire form used by `Variant::Private` rooms.
#[derive(Debug, Default, Deserialize, Serialize)]
struct PrivateData {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
}

/// Wire form used by `Variant::Collapsing` rooms.
#[derive(Debug, Default, Deserialize, Serialize)]
struct CollapsingData {
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    join: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    leave: bool,
}

fn is_false(b: &bool) -> bool { !*b }

impl Envelope {
    /// Who sent it.
    pub fn sender(&self) -> &str {
        match self {
            Envelope::Join{ user, .. } => user,
            Envelope::Leave{ user, .. } => user,
            Envelope::Chat{ from, .. } => from,
        }
    }

    /// Join and leave announcements get special treatment when rendered.
    pub fn is_special(&self) -> bool {
        !matches!(self, Envelope::Chat{ .. })
    }

    /// Encode this envelope as the `data` of a publish.
    pub fn to_data(&self, variant: Variant) -> Result<Value, Error> {
        let v = match variant {
            Variant::Private => {
                let data = match self.clone() {
                    Envelope::Join{ user, chat } => PrivateData {
                        from: Some(user), chat, kind: Some("join".into()),
                        ..Default::default()
                    },
                    Envelope::Leave{ user, chat } => PrivateData {
                        from: Some(user), chat, kind: Some("leave".into()),
                        ..Default::default()
                    },
                    Envelope::Chat{ from, text, to } => PrivateData {
                        from: Some(from), chat: text, to, kind: None,
                    },
                };
                serde_json::to_value(data)?
            },
            Variant::Collapsing => {
                // These rooms have no private messages, so `to` is dropped.
                let data = match self.clone() {
                    Envelope::Join{ user, chat } => CollapsingData {
                        user: Some(user), chat, join: true, leave: false,
                    },
                    Envelope::Leave{ user, chat } => CollapsingData {
                        user: Some(user), chat, join: false, leave: true,
                    },
                    Envelope::Chat{ from, text, .. } => CollapsingData {
                        user: Some(from), chat: text, join: false, leave: false,
                    },
                };
                serde_json::to_value(data)?
            },
        };

        Ok(v)
    }

    /// Decode the `data` of a delivered message.
    ///
    /// Missing sender names decode as empty strings; unrecognized `type`s
    /// decode as plain chat.
    pub fn from_data(variant: Variant, data: &Value) -> Result<Envelope, Error> {
        let env = match variant {
            Variant::Private => {
                let d = PrivateData::deserialize(data)?;
                let user = d.from.unwrap_or_default();
                match d.kind.as_deref() {
                    Some("join") => Envelope::Join{ user, chat: d.chat },
                    Some("leave") => Envelope::Leave{ user, chat: d.chat },
                    _ => Envelope::Chat{ from: user, text: d.chat, to: d.to },
                }
            },
            Variant::Collapsing => {
                let d = CollapsingData::deserialize(data)?;
                let user = d.user.unwrap_or_default();
                if d.join {
                    Envelope::Join{ user, chat: d.chat }
                } else if d.leave {
                    Envelope::Leave{ user, chat: d.chat }
                } else {
                    Envelope::Chat{ from: user, text: d.chat, to: None }
                }
            },
        };

        Ok(env)
    }
}

/// A Bayeux message as handed to us by the transport.
///
/// By default, `serde` ignores the fields we don't care about.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Message {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl Message {
    pub fn new(channel: &str, data: Value) -> Message {
        Message {
            channel: channel.to_string(),
            data: Some(data),
            id: None,
            client_id: None,
        }
    }

    /// Pull the chat envelope out of this message's `data`.
    pub fn envelope(&self, variant: Variant) -> Result<Envelope, Error> {
        match &self.data {
            Some(data) => Envelope::from_data(variant, data),
            None => Err(Error::BadMessage(
                serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
            )),
        }
    }
}

/// What happened on the meta channel.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Handshake,
    Connect,
    /// Subscribe, disconnect, and friends; the room ignores these.
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MetaResponse {
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One event from the transport's meta channel.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LifecycleEvent {
    pub action: Action,
    pub successful: bool,
    #[serde(default)]
    pub response: MetaResponse,
}

impl LifecycleEvent {
    pub fn handshake_ok(client_id: &str) -> LifecycleEvent {
        LifecycleEvent {
            action: Action::Handshake,
            successful: true,
            response: MetaResponse {
                client_id: Some(client_id.to_string()),
                error: None,
            },
        }
    }

    pub fn handshake_failed(error: &str) -> LifecycleEvent {
        LifecycleEvent {
            action: Action::Handshake,
            successful: false,
            response: MetaResponse {
                client_id: None,
                error: Some(error.to_string()),
            },
        }
    }

    pub fn connect(successful: bool) -> LifecycleEvent {
        LifecycleEvent {
            action: Action::Connect,
            successful,
            response: MetaResponse::default(),
        }
    }
}

/// A Bayeux error string, `code:args:message`, picked apart.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerError {
    pub code: u16,
    pub args: Vec<String>,
    pub message: String,
}

impl ServerError {
    /// Returns `None` if `s` doesn't follow the `code:args:message` form.
    pub fn parse(s: &str) -> Option<ServerError> {
        let mut parts = s.splitn(3, ':');
        let code = parts.next()?.trim().parse::<u16>().ok()?;
        let args = parts.next()?;
        let message = parts.next()?.to_string();
        let args = if args.is_empty() {
            Vec::new()
        } else {
            args.split(',').map(String::from).collect()
        };

        Some(ServerError{ code, args, message })
    }
}

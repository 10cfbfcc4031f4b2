/*!
Which flavor of room we're in, what it's called, and where the Bayeux
endpoint lives.

Settings come from (in increasing order of precedence) built-in defaults,
an optional JSON file, and `CHAT_*` environment variables.
*/
use std::str::FromStr;

use serde::Deserialize;
use tracing::{event, Level};

use crate::error::Error;

static DEFAULT_ROOM: &str = "room0";
static DEFAULT_LOCATION: &str = "http://localhost:8080/chat/";
/// Appended to the page's base path to get the Bayeux endpoint.
static ENDPOINT_SUFFIX: &str = "/bayeux";

/// The two flavors of chat room.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Public channel plus one personal channel per user; supports private
    /// messages, and leaves the room when the connection drops.
    Private,
    /// A single room channel; consecutive lines from the same sender are
    /// collapsed when rendered.
    Collapsing,
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" | "1" => Ok(Variant::Private),
            "collapsing" | "2" => Ok(Variant::Collapsing),
            x => Err(Error::Config(format!("unknown variant {:?}", x))),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub variant: Variant,
    pub room: String,
    /// The location of the page hosting the client; the endpoint URL is
    /// derived from it.
    pub location: String,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            variant: Variant::Private,
            room: DEFAULT_ROOM.into(),
            location: DEFAULT_LOCATION.into(),
        }
    }
}

impl Config {
    /// Read the JSON file at `path` (if any), then apply environment
    /// overrides.
    pub fn load(path: Option<&str>) -> Result<Config, Error> {
        let mut cfg = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| Error::Config(
                    format!("unable to read {:?}: {}", path, &e)
                ))?;
                Config::from_json(&text)?
            },
            None => Config::default(),
        };

        cfg.apply_env(|k| std::env::var(k).ok())?;
        event!(Level::DEBUG, "loaded {:?}", &cfg);
        Ok(cfg)
    }

    pub fn from_json(text: &str) -> Result<Config, Error> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Override fields from `CHAT_VARIANT`, `CHAT_ROOM`, and
    /// `CHAT_LOCATION`, as looked up by `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>
    {
        if let Some(v) = var("CHAT_VARIANT") {
            self.variant = v.parse()?;
        }
        if let Some(room) = var("CHAT_ROOM") {
            if room.is_empty() || room.contains('/') {
                return Err(Error::Config(format!("bad room name {:?}", &room)));
            }
            self.room = room;
        }
        if let Some(loc) = var("CHAT_LOCATION") {
            self.location = loc;
        }
        Ok(())
    }

    /// The channel everybody in the room hears.
    pub fn public_channel(&self) -> String {
        match self.variant {
            Variant::Private => format!("/chat/{}/public", &self.room),
            Variant::Collapsing => format!("/chat/{}", &self.room),
        }
    }

    /// The channel only `user` listens on.
    pub fn personal_channel(&self, user: &str) -> String {
        format!("/chat/{}/{}", &self.room, user)
    }

    /// Derive the Bayeux endpoint from the page location.
    ///
    /// The `http://host` part is dropped, as is everything from the chat
    /// page's directory on.
    pub fn endpoint_url(&self) -> String {
        let path = strip_authority(&self.location);
        let base = match chat_tail(&path, self.variant) {
            Some(n) => &path[..n],
            None => path.as_str(),
        };
        format!("{}{}", base, ENDPOINT_SUFFIX)
    }
}

/// Remove the first `http://<authority>` from `loc`.
fn strip_authority(loc: &str) -> String {
    let start = match loc.find("http://") {
        Some(n) => n,
        None => return loc.to_string(),
    };
    let rest = start + "http://".len();
    let end = match loc[rest..].find('/') {
        Some(n) => rest + n,
        None => loc.len(),
    };
    format!("{}{}", &loc[..start], &loc[end..])
}

/// Index of the first `/chat/` (or, for `Private` rooms, `/chatN/` with a
/// single digit N) in `path`.
fn chat_tail(path: &str, variant: Variant) -> Option<usize> {
    for (n, _) in path.match_indices("/chat") {
        let after = &path.as_bytes()[n + "/chat".len()..];
        match after {
            [b'/', ..] => return Some(n),
            [d, b'/', ..] if variant == Variant::Private && d.is_ascii_digit() => {
                return Some(n);
            },
            _ => {},
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    fn cfg(variant: Variant, location: &str) -> Config {
        Config { variant, location: location.into(), ..Config::default() }
    }

    #[test]
    fn endpoints() {
        let c = cfg(Variant::Private, "http://localhost:8080/chat/index.html");
        assert_eq!(c.endpoint_url(), "/bayeux");

        let c = cfg(Variant::Private, "http://h/app/chat2/x.html");
        assert_eq!(c.endpoint_url(), "/app/bayeux");

        // Only the private flavor allows a digit after "chat".
        let c = cfg(Variant::Collapsing, "http://h/app/chat2/x.html");
        assert_eq!(c.endpoint_url(), "/app/chat2/x.html/bayeux");

        let c = cfg(Variant::Collapsing, "http://h:81/a/b/chat/c/d.html");
        assert_eq!(c.endpoint_url(), "/a/b/bayeux");

        // No path at all.
        let c = cfg(Variant::Private, "http://localhost");
        assert_eq!(c.endpoint_url(), "/bayeux");

        // "/chatroom/" isn't a chat directory.
        let c = cfg(Variant::Private, "http://h/chatroom/chat/");
        assert_eq!(c.endpoint_url(), "/chatroom/bayeux");
    }

    #[test]
    fn channels() {
        let c = cfg(Variant::Private, DEFAULT_LOCATION);
        assert_eq!(c.public_channel(), "/chat/room0/public");
        assert_eq!(c.personal_channel("alice"), "/chat/room0/alice");

        let c = cfg(Variant::Collapsing, DEFAULT_LOCATION);
        assert_eq!(c.public_channel(), "/chat/room0");
    }

    #[test]
    fn json_and_env() -> Result<(), Error> {
        let mut c = Config::from_json(r#"{ "variant": "collapsing" }"#)?;
        assert_eq!(c.variant, Variant::Collapsing);
        assert_eq!(&c.room, DEFAULT_ROOM);

        c.apply_env(|k| match k {
            "CHAT_VARIANT" => Some("private".into()),
            "CHAT_ROOM" => Some("lobby".into()),
            _ => None,
        })?;
        assert_eq!(c.variant, Variant::Private);
        assert_eq!(c.public_channel(), "/chat/lobby/public");

        assert!(c.apply_env(|k| match k {
            "CHAT_VARIANT" => Some("chatty".into()),
            _ => None,
        }).is_err());
        assert!(c.apply_env(|k| match k {
            "CHAT_ROOM" => Some("a/b".into()),
            _ => None,
        }).is_err());
        assert!(Config::from_json(r#"{ "variant": 3 }"#).is_err());

        Ok(())
    }
}

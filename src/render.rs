/*!
Turning envelopes into lines in the message log.
*/
use std::fmt::{Display, Formatter};

use tracing::{event, Level};

use crate::{
    config::Variant,
    error::Error,
    message::{Envelope, Message},
};

/// Shown instead of the sender's name when they're still talking.
static CONTINUED: &str = "...";

/// One rendered line of the log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Line {
    pub title: String,
    pub text: String,
    /// Join/leave and connection notices get highlighted.
    pub alert: bool,
}

impl Display for Line {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.alert {
            write!(f, "* {} {}", &self.title, &self.text)
        } else {
            write!(f, "{} {}", &self.title, &self.text)
        }
    }
}

/// Somewhere to put rendered lines.
pub trait Surface {
    fn append(&mut self, line: Line);
    /// Keep the newest line in view.
    fn scroll_to_bottom(&mut self) {}
}

pub struct Renderer {
    variant: Variant,
    /// Sender of the last ordinary line; only `Collapsing` rooms track this.
    last: String,
}

impl Renderer {
    pub fn new(variant: Variant) -> Renderer {
        Renderer { variant, last: String::new() }
    }

    /// Render a message delivered by the transport.
    ///
    /// A message without a `data` payload is an error and nothing is
    /// rendered.
    pub fn render<S: Surface>(&mut self, msg: &Message, surface: &mut S) -> Result<(), Error> {
        let env = msg.envelope(self.variant)?;
        self.show(&env, surface);
        Ok(())
    }

    /// Render an envelope that didn't come through the transport.
    pub fn show<S: Surface>(&mut self, env: &Envelope, surface: &mut S) {
        match self.format(env) {
            Some(line) => {
                event!(Level::TRACE, "rendering {:?}", &line);
                surface.append(line);
                surface.scroll_to_bottom();
            },
            None => {
                event!(Level::TRACE, "nothing to render for {:?}", env);
            },
        }
    }

    /// Returns `None` if there's no text to show.
    pub fn format(&mut self, env: &Envelope) -> Option<Line> {
        match self.variant {
            Variant::Private => format_private(env),
            Variant::Collapsing => self.format_collapsing(env),
        }
    }

    fn format_collapsing(&mut self, env: &Envelope) -> Option<Line> {
        let text = match env {
            Envelope::Join{ chat, .. } | Envelope::Leave{ chat, .. } => chat,
            Envelope::Chat{ text, .. } => text,
        };
        let text = match text {
            Some(t) if !t.is_empty() => t.clone(),
            _ => return None,
        };

        let from = env.sender();
        let special = env.is_special();
        // Nobody can continue an anonymous line.
        let title = if !special && !from.is_empty() && from == self.last {
            CONTINUED.to_string()
        } else {
            self.last = from.to_string();
            format!("{}:", from)
        };
        if special {
            self.last.clear();
        }

        Some(Line { title, text, alert: special })
    }
}

fn format_private(env: &Envelope) -> Option<Line> {
    let (from, text, to) = match env {
        Envelope::Join{ user, .. } => {
            (user, format!("{} has joined.", user), None)
        },
        Envelope::Leave{ user, .. } => {
            (user, format!("{} has left.", user), None)
        },
        Envelope::Chat{ from, text, to } => match text {
            Some(t) if !t.is_empty() => (from, t.clone(), to.as_deref()),
            _ => return None,
        },
    };

    let title = match to {
        Some(to) if !to.is_empty() => format!("{} to {}:", from, to),
        _ => format!("{}:", from),
    };

    Some(Line { title, text, alert: false })
}

/// Keeps every line it's given.
#[cfg(test)]
#[derive(Default)]
pub struct Transcript {
    pub lines: Vec<Line>,
    pub scrolls: usize,
}

#[cfg(test)]
impl Transcript {
    /// The lines as they'd be printed.
    pub fn printed(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.to_string()).collect()
    }
}

#[cfg(test)]
impl Surface for Transcript {
    fn append(&mut self, line: Line) { self.lines.push(line); }
    fn scroll_to_bottom(&mut self) { self.scrolls += 1; }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn chat(from: &str, text: &str) -> Envelope {
        Envelope::Chat{ from: from.into(), text: Some(text.into()), to: None }
    }

    #[test]
    fn private_lines() {
        let mut r = Renderer::new(Variant::Private);
        let mut log = Transcript::default();

        r.show(&Envelope::Join{ user: "alice".into(), chat: None }, &mut log);
        r.show(&chat("alice", "hello"), &mut log);
        r.show(&chat("alice", "again"), &mut log);
        r.show(&Envelope::Chat{
            from: "bob".into(),
            text: Some("psst".into()),
            to: Some("alice".into()),
        }, &mut log);
        r.show(&Envelope::Leave{ user: "bob".into(), chat: Some("bob has left".into()) }, &mut log);
        // Nothing to say, nothing rendered.
        r.show(&Envelope::Chat{ from: "bob".into(), text: None, to: None }, &mut log);
        r.show(&chat("bob", ""), &mut log);

        assert_eq!(
            log.printed(),
            vec![
                "alice: alice has joined.",
                "alice: hello",
                // No collapsing in these rooms.
                "alice: again",
                "bob to alice: psst",
                "bob: bob has left.",
            ]
        );
        assert_eq!(log.scrolls, 5);
    }

    #[test]
    fn collapsing_lines() {
        let mut r = Renderer::new(Variant::Collapsing);
        let mut log = Transcript::default();

        r.show(&chat("alice", "one"), &mut log);
        r.show(&chat("alice", "two"), &mut log);
        r.show(&chat("bob", "three"), &mut log);
        r.show(&chat("bob", "four"), &mut log);
        r.show(&Envelope::Join{
            user: "carol".into(),
            chat: Some("carol has joined".into()),
        }, &mut log);
        r.show(&chat("bob", "five"), &mut log);
        r.show(&chat("bob", "six"), &mut log);
        r.show(&Envelope::Leave{
            user: "carol".into(),
            chat: Some("carol has left".into()),
        }, &mut log);
        r.show(&chat("bob", "seven"), &mut log);

        assert_eq!(
            log.printed(),
            vec![
                "alice: one",
                "... two",
                "bob: three",
                "... four",
                "* carol: carol has joined",
                "bob: five",
                "... six",
                "* carol: carol has left",
                "bob: seven",
            ]
        );
    }

    #[test]
    fn collapsing_skips_empty_without_resetting() {
        let mut r = Renderer::new(Variant::Collapsing);
        let mut log = Transcript::default();

        r.show(&chat("alice", "one"), &mut log);
        // A join with no text renders nothing and leaves the tracking alone.
        r.show(&Envelope::Join{ user: "bob".into(), chat: None }, &mut log);
        r.show(&chat("alice", "two"), &mut log);

        assert_eq!(log.printed(), vec!["alice: one", "... two"]);
    }

    #[test]
    fn collapsing_anonymous_lines() -> Result<(), Error> {
        let mut r = Renderer::new(Variant::Collapsing);
        let mut log = Transcript::default();

        let msg = Message::new("/chat/room0", json!({ "chat": "who am i" }));
        r.render(&msg, &mut log)?;
        r.render(&msg, &mut log)?;
        r.show(&chat("alice", "me"), &mut log);

        assert_eq!(log.printed(), vec![": who am i", ": who am i", "alice: me"]);

        Ok(())
    }

    #[test]
    fn bad_messages() {
        let mut r = Renderer::new(Variant::Private);
        let mut log = Transcript::default();

        let msg = Message {
            channel: "/chat/room0/public".into(),
            data: None,
            id: None,
            client_id: None,
        };
        assert!(matches!(r.render(&msg, &mut log), Err(Error::BadMessage(_))));

        let msg = Message::new("/chat/room0/public", json!({ "from": "x", "chat": "ok" }));
        assert!(r.render(&msg, &mut log).is_ok());
        assert_eq!(log.printed(), vec!["x: ok"]);
    }
}

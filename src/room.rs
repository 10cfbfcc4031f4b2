/*!
The room session: who we are, whether we're in, and what to tell the
transport when that changes.
*/
use tracing::{event, Level};

use crate::{
    config::{Config, Variant},
    error::Error,
    message::{Action, Envelope, LifecycleEvent, ServerError},
    render::{Renderer, Surface},
    transport::{Inbound, MetaHandle, Transport},
};

/// Sender name on connection notices in `Private` rooms.
static SERVER_PRIVATE: &str = "server";
/// Sender name on connection notices in `Collapsing` rooms.
static SERVER_COLLAPSING: &str = "SERVER";

/// User names double as channel segments, so they can't hold a separator
/// or a wildcard.
fn check_channel_segment(name: &str) -> Result<(), Error> {
    if name.contains(&['/', '*'][..]) {
        return Err(Error::Validation("A userName can't contain '/' or '*'"));
    }
    Ok(())
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum State {
    Disconnected,
    /// Subscribed and announced, but the transport hasn't confirmed the
    /// connection yet.
    Joining(String),
    Joined(String),
}

/// Where a chat line goes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Delivery {
    Public,
    /// Only to the named user; `Private` rooms only.
    Private(String),
}

pub struct Room<T> {
    cfg: Config,
    transport: T,
    state: State,
    /// What the transport last told us about the connection.
    connected: bool,
    /// Our listener on the meta channel while we're in the room.
    meta: Option<MetaHandle>,
    /// Handshakes seen since joining.
    handshakes: usize,
    renderer: Renderer,
}

impl<T: Transport> Room<T> {
    pub fn new(cfg: Config, transport: T) -> Room<T> {
        let renderer = Renderer::new(cfg.variant);
        Room {
            cfg, transport, renderer,
            state: State::Disconnected,
            connected: false,
            meta: None,
            handshakes: 0,
        }
    }

    pub fn state(&self) -> &State { &self.state }

    pub fn variant(&self) -> Variant { self.cfg.variant }

    pub fn is_connected(&self) -> bool { self.connected }

    pub fn transport_mut(&mut self) -> &mut T { &mut self.transport }

    /// `Some` exactly when we've joined.
    pub fn user_name(&self) -> Option<&str> {
        match &self.state {
            State::Disconnected => None,
            State::Joining(name) | State::Joined(name) => Some(name.as_str()),
        }
    }

    pub fn join(&mut self, name: &str) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::Validation("Please enter a userName!"));
        }
        check_channel_segment(name)?;
        if self.user_name().is_some() {
            self.leave()?;
        }

        let variant = self.cfg.variant;
        let announcement = match variant {
            Variant::Private => Envelope::Join{ user: name.to_string(), chat: None },
            Variant::Collapsing => Envelope::Join{
                user: name.to_string(),
                chat: Some(format!("{} has joined", name)),
            },
        }.to_data(variant)?;
        let public = self.cfg.public_channel();
        let personal = match variant {
            Variant::Private => Some(self.cfg.personal_channel(name)),
            Variant::Collapsing => None,
        };

        let url = self.cfg.endpoint_url();
        event!(Level::DEBUG, "{} joining via {}", name, &url);
        self.transport.init(&url);
        self.connected = true;
        self.handshakes = 0;
        self.state = State::Joining(name.to_string());

        self.transport.batch(|t| {
            t.subscribe(&public);
            if let Some(ch) = &personal {
                t.subscribe(ch);
            }
            t.publish(&public, announcement);
        });

        self.meta = Some(self.transport.watch_meta());
        Ok(())
    }

    /// Does nothing if we're not in the room.
    pub fn leave(&mut self) -> Result<(), Error> {
        let name = match self.user_name() {
            Some(name) => name.to_string(),
            None => return Ok(()),
        };
        event!(Level::DEBUG, "{} leaving", &name);

        let variant = self.cfg.variant;
        let announcement = Envelope::Leave{
            chat: Some(format!("{} has left", &name)),
            user: name.clone(),
        }.to_data(variant)?;
        let public = self.cfg.public_channel();
        let personal = match variant {
            Variant::Private => Some(self.cfg.personal_channel(&name)),
            Variant::Collapsing => None,
        };

        if let Some(handle) = self.meta.take() {
            self.transport.release_meta(handle);
        }

        self.transport.batch(|t| {
            t.unsubscribe(&public);
            if let Some(ch) = &personal {
                t.unsubscribe(ch);
            }
            t.publish(&public, announcement);
        });

        self.state = State::Disconnected;
        self.transport.disconnect();
        Ok(())
    }

    /// Say `text`. Private messages not starting with `/` are also shown
    /// on `surface`, since we won't hear them back.
    pub fn chat<S: Surface>(
        &mut self,
        text: &str,
        delivery: &Delivery,
        surface: &mut S
    ) -> Result<(), Error> {
        if text.is_empty() {
            return Err(Error::Validation("Please enter some message"));
        }
        let from = self.user_name().ok_or(Error::NotJoined)?.to_string();
        let variant = self.cfg.variant;

        match delivery {
            Delivery::Public => {
                let env = Envelope::Chat{ from, text: Some(text.to_string()), to: None };
                let data = env.to_data(variant)?;
                self.transport.publish(&self.cfg.public_channel(), data);
            },

            Delivery::Private(_) if variant == Variant::Collapsing => {
                return Err(Error::Validation(
                    "Private messages aren't available in this room"
                ));
            },

            Delivery::Private(dest) => {
                if dest.is_empty() {
                    return Err(Error::Validation("Please enter the destination username"));
                }
                check_channel_segment(dest)?;
                let env = Envelope::Chat{
                    from,
                    text: Some(text.to_string()),
                    to: Some(dest.clone()),
                };
                let data = env.to_data(variant)?;
                if !text.starts_with('/') {
                    self.renderer.show(&env, surface);
                }
                self.transport.publish(&self.cfg.personal_channel(dest), data);
            },
        }

        Ok(())
    }

    /// Deal with something the transport sent us.
    pub fn handle<S: Surface>(&mut self, inbound: Inbound, surface: &mut S) -> Result<(), Error> {
        match inbound {
            Inbound::Deliver(msg) => {
                event!(Level::TRACE, "delivered {:?}", &msg);
                self.renderer.render(&msg, surface)
            },
            Inbound::Meta{ handle, event } => {
                if self.meta != Some(handle) {
                    event!(Level::TRACE, "ignoring {:?} for stale {:?}", &event, &handle);
                    return Ok(());
                }
                self.on_lifecycle(event, surface)
            },
        }
    }

    fn on_lifecycle<S: Surface>(&mut self, evt: LifecycleEvent, surface: &mut S) -> Result<(), Error> {
        event!(Level::DEBUG, "lifecycle {:?}", &evt);

        match evt.action {
            Action::Handshake => {
                if evt.successful {
                    self.handshakes += 1;
                    let id = evt.response.client_id.unwrap_or_default();
                    self.notice(
                        Action::Handshake,
                        format!("reinitialized client id: {}", &id),
                        surface
                    );
                    // The server drops the subscriptions of a client that
                    // has to handshake again.
                    if self.handshakes > 1 && self.cfg.variant == Variant::Collapsing {
                        self.transport.subscribe(&self.cfg.public_channel());
                    }
                    self.promote();
                } else {
                    let err = evt.response.error.unwrap_or_default();
                    match ServerError::parse(&err) {
                        Some(e) => event!(Level::WARN,
                            "handshake refused ({}): {} {:?}", e.code, &e.message, &e.args
                        ),
                        None => event!(Level::WARN, "handshake failed: {:?}", &err),
                    }
                    self.notice(Action::Handshake, err, surface);
                }
            },

            Action::Connect => {
                if evt.successful && !self.connected {
                    self.notice(Action::Connect, "reconnected!".into(), surface);
                }
                if !evt.successful && self.connected {
                    self.notice(Action::Connect, "disconnected!".into(), surface);
                    if self.cfg.variant == Variant::Private {
                        self.leave()?;
                    }
                }
                self.connected = evt.successful;
                if evt.successful {
                    self.promote();
                }
            },

            Action::Other => {},
        }

        Ok(())
    }

    /// Show a connection notice from the "server".
    fn notice<S: Surface>(&mut self, kind: Action, text: String, surface: &mut S) {
        let env = match (self.cfg.variant, kind) {
            (Variant::Private, _) => Envelope::Chat{
                from: SERVER_PRIVATE.into(), text: Some(text), to: None
            },
            (Variant::Collapsing, Action::Handshake) => Envelope::Join{
                user: SERVER_COLLAPSING.into(), chat: Some(text)
            },
            (Variant::Collapsing, _) => Envelope::Leave{
                user: SERVER_COLLAPSING.into(), chat: Some(text)
            },
        };
        self.renderer.show(&env, surface);
    }

    fn promote(&mut self) {
        if let State::Joining(name) = &self.state {
            self.state = State::Joined(name.clone());
        }
    }
}

/*!
The seam between the room and whatever actually speaks Bayeux.

A `Transport` takes fire-and-forget subscribe/publish calls. Everything it
has to say back (deliveries on subscribed channels and lifecycle events)
comes in asynchronously as `Inbound` values on an mpsc channel.
*/
use std::collections::BTreeSet;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{event, Level};

use crate::message::{LifecycleEvent, Message};

/// Names one listener on the transport's meta channel. Events are tagged
/// with the handle they were sent to, so a released handle can be told
/// apart from the current one.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct MetaHandle(usize);

/// Things a transport sends back to the room.
#[derive(Clone, Debug)]
pub enum Inbound {
    Deliver(Message),
    Meta{ handle: MetaHandle, event: LifecycleEvent },
}

pub trait Transport {
    /// Point the client at `url` and start the handshake.
    fn init(&mut self, url: &str);
    fn disconnect(&mut self);

    fn start_batch(&mut self);
    fn end_batch(&mut self);

    fn subscribe(&mut self, channel: &str);
    fn unsubscribe(&mut self, channel: &str);
    fn publish(&mut self, channel: &str, data: Value);

    /// Start listening for lifecycle events.
    fn watch_meta(&mut self) -> MetaHandle;
    /// Stop listening; no more events will be tagged with `handle`.
    fn release_meta(&mut self, handle: MetaHandle);

    /// Run `f` inside a batch, so everything it does reaches the server
    /// together.
    fn batch<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self),
        Self: Sized,
    {
        self.start_batch();
        f(self);
        self.end_batch();
    }
}

/// A queued operation, held back until its batch ends.
#[derive(Debug)]
enum Op {
    Subscribe(String),
    Unsubscribe(String),
    Publish(String, Value),
}

/// A single-process transport that hears its own publishes.
///
/// There's no server: whatever is published on a channel this client is
/// subscribed to comes straight back as a delivery. The handshake "completes"
/// once something is watching the meta channel.
pub struct Loopback {
    tx: UnboundedSender<Inbound>,
    url: Option<String>,
    client_id: Option<String>,
    /// Set by `init()`, cleared once the handshake has been announced.
    handshake_pending: bool,
    subscriptions: BTreeSet<String>,
    watchers: BTreeSet<MetaHandle>,
    next_handle: usize,
    n_handshakes: usize,
    n_messages: usize,
    batch_depth: usize,
    queued: Vec<Op>,
}

impl Loopback {
    pub fn new(tx: UnboundedSender<Inbound>) -> Loopback {
        Loopback {
            tx,
            url: None,
            client_id: None,
            handshake_pending: false,
            subscriptions: BTreeSet::new(),
            watchers: BTreeSet::new(),
            next_handle: 0,
            n_handshakes: 0,
            n_messages: 0,
            batch_depth: 0,
            queued: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool { self.url.is_some() }

    /// Tell every watcher about `evt`.
    fn announce(&self, evt: LifecycleEvent) {
        for &handle in self.watchers.iter() {
            let msg = Inbound::Meta{ handle, event: evt.clone() };
            if self.tx.send(msg).is_err() {
                event!(Level::WARN, "inbound channel closed; dropping {:?}", &evt);
                return;
            }
        }
    }

    fn handshake(&mut self) {
        self.n_handshakes += 1;
        let id = format!("{:08x}", self.n_handshakes);
        event!(Level::DEBUG, "loopback handshake as client {}", &id);
        self.announce(LifecycleEvent::handshake_ok(&id));
        self.announce(LifecycleEvent::connect(true));
        self.client_id = Some(id);
        self.handshake_pending = false;
    }

    /// Pretend the server has stopped answering connects.
    pub fn fail_connect(&mut self) {
        event!(Level::DEBUG, "loopback connect failing");
        self.announce(LifecycleEvent::connect(false));
    }

    /// Pretend the server forgot us and we had to handshake again.
    pub fn rehandshake(&mut self) {
        if self.is_connected() {
            self.handshake();
        }
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::Subscribe(ch) => {
                if !self.subscriptions.insert(ch.clone()) {
                    event!(Level::DEBUG, "already subscribed to {}", &ch);
                }
            },
            Op::Unsubscribe(ch) => {
                if !self.subscriptions.remove(&ch) {
                    event!(Level::DEBUG, "wasn't subscribed to {}", &ch);
                }
            },
            Op::Publish(ch, data) => {
                if !self.subscriptions.contains(&ch) {
                    event!(Level::TRACE, "nobody here listens on {}", &ch);
                    return;
                }
                self.n_messages += 1;
                let mut msg = Message::new(&ch, data);
                msg.id = Some(self.n_messages.to_string());
                msg.client_id = self.client_id.clone();
                if let Err(e) = self.tx.send(Inbound::Deliver(msg)) {
                    event!(Level::WARN, "inbound channel closed; dropping {:?}", &e.0);
                }
            },
        }
    }

    fn submit(&mut self, op: Op) {
        if !self.is_connected() {
            event!(Level::WARN, "not connected; dropping {:?}", &op);
            return;
        }
        if self.batch_depth > 0 {
            self.queued.push(op);
        } else {
            self.apply(op);
        }
    }
}

impl Transport for Loopback {
    fn init(&mut self, url: &str) {
        event!(Level::DEBUG, "loopback init at {}", url);
        self.url = Some(url.to_string());
        self.handshake_pending = true;
        if !self.watchers.is_empty() {
            self.handshake();
        }
    }

    fn disconnect(&mut self) {
        event!(Level::DEBUG, "loopback disconnect from {:?}", &self.url);
        self.url = None;
        self.client_id = None;
        self.handshake_pending = false;
        self.subscriptions.clear();
        self.queued.clear();
        self.batch_depth = 0;
    }

    fn start_batch(&mut self) {
        self.batch_depth += 1;
    }

    fn end_batch(&mut self) {
        if self.batch_depth == 0 {
            event!(Level::WARN, "end_batch() without start_batch()");
            return;
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            let ops = std::mem::take(&mut self.queued);
            event!(Level::TRACE, "flushing batch of {} ops", ops.len());
            for op in ops.into_iter() {
                self.apply(op);
            }
        }
    }

    fn subscribe(&mut self, channel: &str) {
        self.submit(Op::Subscribe(channel.to_string()));
    }

    fn unsubscribe(&mut self, channel: &str) {
        self.submit(Op::Unsubscribe(channel.to_string()));
    }

    fn publish(&mut self, channel: &str, data: Value) {
        self.submit(Op::Publish(channel.to_string(), data));
    }

    fn watch_meta(&mut self) -> MetaHandle {
        let handle = MetaHandle(self.next_handle);
        self.next_handle += 1;
        self.watchers.insert(handle);
        if self.handshake_pending && self.is_connected() {
            self.handshake();
        }
        handle
    }

    fn release_meta(&mut self, handle: MetaHandle) {
        if !self.watchers.remove(&handle) {
            event!(Level::WARN, "released unknown {:?}", &handle);
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    use crate::message::Action;

    fn drain(rx: &mut UnboundedReceiver<Inbound>) -> Vec<Inbound> {
        let mut v = Vec::new();
        while let Ok(x) = rx.try_recv() {
            v.push(x);
        }
        v
    }

    #[test]
    fn hears_itself() {
        let (tx, mut rx) = unbounded_channel();
        let mut t = Loopback::new(tx);

        // Not connected; this goes nowhere.
        t.publish("/chat/room0", json!({ "chat": "lost" }));
        assert!(drain(&mut rx).is_empty());

        t.init("/bayeux");
        t.subscribe("/chat/room0");
        t.publish("/chat/room0", json!({ "chat": "hi" }));
        t.publish("/chat/elsewhere", json!({ "chat": "nope" }));

        let got = drain(&mut rx);
        assert_eq!(got.len(), 1);
        match &got[0] {
            Inbound::Deliver(msg) => {
                assert_eq!(&msg.channel, "/chat/room0");
                assert_eq!(msg.data, Some(json!({ "chat": "hi" })));
            },
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn batches_hold_until_the_end() {
        let (tx, mut rx) = unbounded_channel();
        let mut t = Loopback::new(tx);
        t.init("/bayeux");

        t.start_batch();
        t.subscribe("/a");
        t.publish("/a", json!(1));
        assert!(drain(&mut rx).is_empty());
        t.end_batch();
        assert_eq!(drain(&mut rx).len(), 1);

        // Unsubscribed before the publish is applied, so nothing comes back.
        t.batch(|t| {
            t.unsubscribe("/a");
            t.publish("/a", json!(2));
        });
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn meta_handles() {
        let (tx, mut rx) = unbounded_channel();
        let mut t = Loopback::new(tx);
        t.init("/bayeux");

        let h = t.watch_meta();
        let got = drain(&mut rx);
        assert_eq!(got.len(), 2);
        match &got[0] {
            Inbound::Meta{ handle, event } => {
                assert_eq!(*handle, h);
                assert_eq!(event.action, Action::Handshake);
                assert!(event.successful);
            },
            x => panic!("unexpected {:?}", x),
        }

        t.fail_connect();
        assert_eq!(drain(&mut rx).len(), 1);

        t.release_meta(h);
        t.fail_connect();
        assert!(drain(&mut rx).is_empty());

        let h2 = t.watch_meta();
        assert_ne!(h, h2);
    }
}

/*!
Interface between the terminal and the room.

Lines starting with `:` are commands; anything else is said in the room.
*/
use std::io::{Stdout, Write};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc::{unbounded_channel, UnboundedReceiver},
};
use tracing::{event, Level};

use crate::{
    config::Config,
    error::Error,
    render::{Line, Surface},
    room::{Delivery, Room},
    transport::{Inbound, Loopback},
};

static HELP_TEXT: &str = "commands: :join <name>, :leave, :to <name>, :public, \
:drop, :rehandshake, :quit";

#[derive(Debug, Eq, PartialEq)]
pub enum Command {
    Join(String),
    Leave,
    /// Send subsequent lines privately to the given user.
    To(String),
    /// Back to talking to everybody.
    Public,
    /// Simulate a lost connection.
    Drop,
    /// Simulate the server making us handshake again.
    Rehandshake,
    Quit,
    Say(String),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let rest = match line.strip_prefix(':') {
            Some(rest) => rest,
            None => return Command::Say(line.to_string()),
        };

        let (cmd, arg) = match rest.split_once(' ') {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (rest, ""),
        };
        match cmd {
            "join" => Command::Join(arg.to_string()),
            "leave" => Command::Leave,
            "to" => Command::To(arg.to_string()),
            "public" => Command::Public,
            "drop" => Command::Drop,
            "rehandshake" => Command::Rehandshake,
            "quit" => Command::Quit,
            _ => Command::Unknown(cmd.to_string()),
        }
    }
}

/// The message log, printed to stdout.
pub struct Terminal {
    out: Stdout,
}

impl Terminal {
    pub fn new() -> Terminal {
        Terminal { out: std::io::stdout() }
    }

    /// The terminal's version of a blocking `alert()`.
    pub fn alert(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out.lock(), "! {}", text) {
            event!(Level::ERROR, "error writing to stdout: {}", &e);
        }
    }
}

impl Surface for Terminal {
    fn append(&mut self, line: Line) {
        if let Err(e) = writeln!(self.out.lock(), "{}", &line) {
            event!(Level::ERROR, "error writing to stdout: {}", &e);
        }
    }

    fn scroll_to_bottom(&mut self) {
        if let Err(e) = self.out.flush() {
            event!(Level::ERROR, "error flushing stdout: {}", &e);
        }
    }
}

pub struct Client {
    room: Room<Loopback>,
    from_transport: UnboundedReceiver<Inbound>,
    delivery: Delivery,
    screen: Terminal,
}

impl Client {
    pub fn new(cfg: Config) -> Client {
        let (tx, from_transport) = unbounded_channel();
        let room = Room::new(cfg, Loopback::new(tx));
        event!(Level::DEBUG, "client for a {:?} room", room.variant());

        Client {
            room, from_transport,
            delivery: Delivery::Public,
            screen: Terminal::new(),
        }
    }

    /// Act on one command; returns `false` once the user wants out.
    fn command(&mut self, cmd: Command) -> bool {
        event!(Level::TRACE, "command {:?}", &cmd);
        let res = match cmd {
            Command::Join(name) => self.room.join(&name),
            Command::Leave => self.room.leave(),
            Command::To(name) => {
                self.delivery = Delivery::Private(name);
                Ok(())
            },
            Command::Public => {
                self.delivery = Delivery::Public;
                Ok(())
            },
            Command::Drop => {
                if self.room.is_connected() {
                    self.room.transport_mut().fail_connect();
                } else {
                    self.screen.alert("not connected");
                }
                Ok(())
            },
            Command::Rehandshake => {
                self.room.transport_mut().rehandshake();
                Ok(())
            },
            Command::Quit => return false,
            Command::Say(text) => {
                self.room.chat(&text, &self.delivery, &mut self.screen)
            },
            Command::Unknown(cmd) => {
                self.screen.alert(&format!("unknown command {:?}", &cmd));
                self.screen.alert(HELP_TEXT);
                Ok(())
            },
        };

        if let Err(e) = res {
            self.screen.alert(&e.to_string());
        }
        true
    }

    async fn run(&mut self) -> Result<(), Error> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        self.screen.alert(HELP_TEXT);

        loop {
            tokio::select!{
                res = lines.next_line() => match res? {
                    // EOF
                    None => return Ok(()),
                    Some(line) => {
                        if !self.command(Command::parse(&line)) {
                            return Ok(());
                        }
                    },
                },

                inbound = self.from_transport.recv() => match inbound {
                    Some(inbound) => {
                        if let Err(e) = self.room.handle(inbound, &mut self.screen) {
                            event!(Level::WARN, "discarding message: {}", &e);
                            self.screen.alert(&e.to_string());
                        }
                    },
                    // The room's transport holds the sending end, so this
                    // shouldn't happen.
                    None => {
                        event!(Level::ERROR, "transport channel closed");
                        return Ok(());
                    },
                },
            }
        }
    }

    pub async fn start(mut self) {
        event!(Level::DEBUG, "client started");

        if let Err(e) = self.run().await {
            event!(Level::ERROR, "client: {}", &e);
        }
        // Leave on the way out, like a page unload would.
        if let Err(e) = self.room.leave() {
            event!(Level::ERROR, "error leaving room: {}", &e);
        }

        event!(Level::DEBUG, "client done");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse(":join alice\n"), Command::Join("alice".into()));
        assert_eq!(Command::parse(":join"), Command::Join(String::new()));
        assert_eq!(Command::parse(":to  bob "), Command::To("bob".into()));
        assert_eq!(Command::parse(":leave"), Command::Leave);
        assert_eq!(Command::parse(":public\r\n"), Command::Public);
        assert_eq!(Command::parse(":quit"), Command::Quit);
        assert_eq!(Command::parse(":drop"), Command::Drop);
        assert_eq!(Command::parse(":rehandshake"), Command::Rehandshake);
        assert_eq!(Command::parse(":dance now"), Command::Unknown("dance".into()));
        assert_eq!(Command::parse("/size"), Command::Say("/size".into()));
        assert_eq!(Command::parse("hello there\n"), Command::Say("hello there".into()));
        assert_eq!(Command::parse(""), Command::Say(String::new()));
    }

    #[test]
    fn commands_drive_the_room() {
        let mut client = Client::new(Config::default());

        assert!(client.command(Command::Join("alice".into())));
        assert_eq!(client.room.user_name(), Some("alice"));

        assert!(client.command(Command::To("bob".into())));
        assert_eq!(client.delivery, Delivery::Private("bob".into()));
        assert!(client.command(Command::Public));
        assert_eq!(client.delivery, Delivery::Public);

        // Connect failures show up as transport traffic, not right away.
        assert!(client.command(Command::Drop));
        assert_eq!(client.room.user_name(), Some("alice"));
        while let Ok(inbound) = client.from_transport.try_recv() {
            client.room.handle(inbound, &mut client.screen).unwrap();
        }
        assert_eq!(client.room.user_name(), None);
        assert!(!client.room.is_connected());
        // Nothing left to drop.
        assert!(client.command(Command::Drop));

        assert!(client.command(Command::Join("alice".into())));
        assert!(client.command(Command::Leave));
        assert_eq!(client.room.user_name(), None);

        assert!(!client.command(Command::Quit));
    }
}

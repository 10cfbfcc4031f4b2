/*!
Terminal client for a Bayeux chat room.

Join a room, talk, leave. The transport here is a loopback that hears only
this client's own publishes; a real Bayeux transport slots in behind the
same `Transport` trait.

```text
roomchat [config.json]
```

`CHAT_VARIANT`, `CHAT_ROOM`, and `CHAT_LOCATION` override the config file;
`RUST_LOG` sets the log level (logs go to stderr).
*/
use tracing::{event, Level};
use tracing_subscriber::{
    fmt::layer,
    filter::EnvFilter,
    prelude::*,
};

mod client;
mod config;
mod error;
mod message;
mod render;
mod room;
mod transport;

use crate::{
    client::Client,
    config::Config,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::registry()
        .with(layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let path = std::env::args().nth(1);
    let cfg = match Config::load(path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            event!(Level::ERROR, "{}", &e);
            eprintln!("{}", &e);
            std::process::exit(1);
        },
    };
    event!(Level::INFO,
        "{:?} room {:?}, endpoint {}",
        &cfg.variant, &cfg.room, &cfg.endpoint_url()
    );

    Client::new(cfg).start().await;
}

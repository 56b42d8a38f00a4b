#![forbid(unsafe_code)]

//! asynchronous HTTP/2 client for pushing short JSON notifications over a single,
//! mutually-authenticated, multiplexed connection.
//!
//! Open one [`Connection`] per upstream and call [`Connection::post`] from as many tasks as
//! you like; the connection multiplexes their requests over the wire and hands each caller
//! back its own response. [`Connection::blocked`] is an advisory hint for callers juggling a
//! pool of connections: when it's `true`, route the next notification elsewhere rather than
//! queuing behind this one.
//!
//! ```no_run
//! use apns_h2::{ClientIdentity, Config, Connection, Request};
//!
//! # async fn run() -> Result<(), apns_h2::Error> {
//! let config = Config::builder("https://api.push.apple.com")?
//!     .client_identity(ClientIdentity::new("client.pem", "client.key"))
//!     .build();
//! let connection = Connection::open(config).await?;
//!
//! let request = Request::builder("/3/device/abcd1234")
//!     .json(&serde_json::json!({"aps": {"alert": "hello"}}))?
//!     .timeout(std::time::Duration::from_secs(5))
//!     .build(connection.config())?;
//! let response = connection.post(request).await?;
//! println!("apns replied {}", response.status);
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod error;
mod flow;
mod request;
mod response;
mod stream_table;
mod tls;

pub use self::config::{ClientIdentity, Config, ConfigBuilder};
pub use self::connection::Connection;
pub use self::error::{Error, FormatError, InvalidUrl, TlsError};
pub use self::request::{Request, RequestBuilder};
pub use self::response::Response;
pub use self::tls::Io;

// re-export the wire types callers need to build requests without an extra `Cargo.toml` line.
pub use bytes;
pub use http;

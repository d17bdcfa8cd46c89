//! Generic query-string DDNS update protocol.
//!
//! One update is a single `GET` to
//! `{proto}://{username}:{token}@{url}?hostname=...&myip=...&` whose textual
//! response carries an HTML-wrapped status token such as `>OK<`.

mod client;
mod request;
mod response;


pub use client::{UpdateClient, REQUEST_TIMEOUT};
pub use request::{build_url, redacted_url, should_include};
pub use response::{classify, UpdateResult};

//! proxyfleet-link: Connection link handling
//!
//! Turns the `vless://`, `hysteria2://` and `vmess://` links printed by proxy backends into
//! protocol-agnostic `CanonicalProxyRecord`s, and finds those links inside
//! noisy terminal output.

pub mod error;
pub mod extract;
pub mod parser;
pub mod types;
mod vmess;

pub use error::LinkError;
pub use extract::{LinkMatch, find_link, strip_ansi};
pub use parser::{LinkScheme, parse, parse_link};
pub use types::{CanonicalProxyRecord, ProtocolKind, transport};

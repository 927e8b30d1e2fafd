//! Logging helpers.
//!
//! The library only emits `tracing` events; subscribers are installed by the
//! binary. RPC endpoints frequently embed provider keys, so anything derived
//! from a URL goes through [`redact_secrets`] before it is logged.

mod redact;

pub use redact::{REDACTED, redact_secrets, redact_url};

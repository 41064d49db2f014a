/// Identity Resolution
///
/// Asks a connected protocol client who it belongs to, with a narrow
/// fixed-delay retry for transient reconnect races.

pub mod resolver;

pub use resolver::{IdentityResolver, RetryPolicy};

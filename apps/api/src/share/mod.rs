// Share-target ingestion: OS share sheet -> interception -> live receiver or pending store.
// Implements: attachment codec, pending-share store (memory/Redis), receiver registry,
// interception, reconciliation, HTTP handlers.
// Receivers only ever see shares through ShareMessage or the store; never raw multipart.

pub mod codec;
pub mod handlers;
pub mod intercept;
pub mod models;
pub mod receivers;
pub mod reconcile;
pub mod redis_store;
pub mod store;

#[cfg(test)]
mod test_support;

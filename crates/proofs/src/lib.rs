//! Property checks for the vault engine
//!
//! Random operation sequences are generated, bounded by the sanitizer and
//! replayed against a regtest node through its RPC surface. The properties
//! then assert what must hold whatever the sequence did: supply
//! conservation, rollback exactness and the interest arithmetic bounds.

pub mod adversary;
pub mod generators;
pub mod harness;
pub mod sanitizer;

#[cfg(test)]
mod properties;

//! Dispatch module - Maps request uris to 64-bit answers
//!
//! The session loop hands every decoded Request to a [`Dispatcher`]. The
//! contract is explicit about unrecognized uris: a dispatcher reports
//! [`Resolution::Unknown`] instead of overloading the payload value zero,
//! so callers never have to guess whether 0 means "no answer".

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Uri selector: current time in milliseconds since the Unix epoch
pub const URI_GET_TIME: u64 = 0x1;

/// Uri selector: a pseudo-random 64-bit number
pub const URI_GET_RANDOM_NUMBER: u64 = 0x2;

/// Uri selector: the fixed server name word
pub const URI_GET_SERVER_NAME: u64 = 0x3;

/// "SrverNme" packed into a 64-bit word
const SERVER_NAME_WORD: u64 = 0x5372_7672_4e6d_6500;

/// Outcome of resolving a request uri
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The uri resolved to a value; 0 is a legitimate answer
    Value(u64),
    /// The uri selects no known capability
    Unknown,
}

/// A server-side capability table
///
/// `resolve` is synchronous and blocks the calling session until it
/// returns; implementations stay cheap.
pub trait Dispatcher: Send + Sync {
    fn resolve(&self, uri: u64) -> Resolution;
}

/// The built-in dispatcher: time, random number, server name
#[derive(Debug, Default, Clone)]
pub struct StandardDispatcher;

impl StandardDispatcher {
    pub fn new() -> Self {
        Self
    }

    fn timestamp_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl Dispatcher for StandardDispatcher {
    fn resolve(&self, uri: u64) -> Resolution {
        match uri {
            URI_GET_TIME => {
                tracing::debug!("Resolving current timestamp");
                Resolution::Value(self.timestamp_ms())
            }
            URI_GET_RANDOM_NUMBER => {
                tracing::debug!("Resolving random number");
                Resolution::Value(rand::thread_rng().gen::<u64>())
            }
            URI_GET_SERVER_NAME => {
                tracing::debug!("Resolving server name");
                Resolution::Value(SERVER_NAME_WORD)
            }
            _ => Resolution::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_uris_resolve() {
        let dispatcher = StandardDispatcher::new();

        match dispatcher.resolve(URI_GET_TIME) {
            Resolution::Value(ms) => assert!(ms > 1_600_000_000_000),
            Resolution::Unknown => panic!("time uri must resolve"),
        }

        assert_eq!(
            dispatcher.resolve(URI_GET_SERVER_NAME),
            Resolution::Value(SERVER_NAME_WORD)
        );

        assert!(matches!(
            dispatcher.resolve(URI_GET_RANDOM_NUMBER),
            Resolution::Value(_)
        ));
    }

    #[test]
    fn unrecognized_uri_is_explicit() {
        let dispatcher = StandardDispatcher::new();
        assert_eq!(dispatcher.resolve(0xDEAD), Resolution::Unknown);
    }
}

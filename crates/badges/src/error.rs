//! Badge service error types

use nostr::Nip01Error;
use nostr_client::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BadgeError {
    /// Caller input was missing or malformed
    #[error("{0}")]
    Validation(String),

    /// The relay list is empty
    #[error("Please set up the list of relays first.")]
    NoRelays,

    /// A referenced badge record does not exist on any relay
    #[error("{0}")]
    NotFound(String),

    /// Building or signing an event failed
    #[error("An error occurred in event creation: {0}")]
    EventCreation(String),

    #[error(transparent)]
    Client(ClientError),
}

impl From<ClientError> for BadgeError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NoRelays => BadgeError::NoRelays,
            ClientError::InvalidEvent(msg) => BadgeError::EventCreation(msg),
            other => BadgeError::Client(other),
        }
    }
}

impl From<Nip01Error> for BadgeError {
    fn from(err: Nip01Error) -> Self {
        BadgeError::EventCreation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BadgeError>;

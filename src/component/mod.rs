//! HTTP components hosting a scheduler in either protocol role.
//!
//! A [`ListenerComponent`] waits for clients to POST specifications; an
//! [`InitiatorComponent`] connects out to a supervisor, registers its
//! capabilities and polls for work. Both share a [`BaseComponent`].

pub mod base;
pub mod error;
pub mod identity;
pub mod initiator;
pub mod listener;

pub use base::BaseComponent;
pub use error::ComponentError;
pub use identity::{identity_from_config, ForgedIdentity, HeaderIdentity, PeerIdentity, ANONYMOUS};
pub use initiator::{InitiatorComponent, PollOutcome, RegistrationOutcome, RegistrationStatus};
pub use listener::{router, ListenerComponent, ListenerState};

pub mod crypto;
pub mod dpop;
pub mod envelope;

pub use envelope::{FapiSecurityEnvelope, InboundRequest, Principal};

//! Request context and response envelope.
//!
//! Hosts hand the router an [`InboundEvent`] (the API-gateway style JSON
//! payload a serverless runtime delivers) and receive an [`OutboundResponse`].
//! Between the two, every pipeline stage works on a decoded [`Request`] and a
//! mutable [`Response`].

pub mod request;
pub mod response;

pub use request::{InboundEvent, Request};
pub use response::{ErrorEntry, OutboundResponse, Response};

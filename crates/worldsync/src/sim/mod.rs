mod client;
pub mod request;

#[cfg(test)]
pub(crate) use client::fake;
pub use client::{Endpoint, GzServiceClient, ServiceReply, ServiceRequest, SimulatorService};
pub use request::TextMessage;

//! Domain logic: envelopes, the live subscriber registry, fan-out, retention

pub mod envelope;
pub mod fanout;
pub mod registry;
pub mod retention;

pub use envelope::{Envelope, PublishRequest};
pub use fanout::ChannelService;
pub use registry::{ALL_CHANNELS, Frame, SubscriberRegistry};

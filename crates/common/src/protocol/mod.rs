// Wire protocol for the banter-sync.v1 push channel.

pub mod topic;
pub mod ws;

pub use topic::{ChannelKind, Topic};
pub use ws::WsFrame;

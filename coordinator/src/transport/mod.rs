mod channel;
mod in_process;
mod link;

pub use channel::{ChannelLink, accept_all};
pub use in_process::InProcessLink;
pub use link::{ClientLink, LocalClientLink};

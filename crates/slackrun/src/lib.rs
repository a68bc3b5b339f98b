pub mod blocks;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod layout;
pub mod logs;
pub mod observer;
pub mod sink;
pub mod summary;
pub mod transport;

pub use dispatcher::{ChannelResult, DispatchError, DispatchOptions, Dispatcher};
pub use transport::{MessageTransport, SlackWebTransport};

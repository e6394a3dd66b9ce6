//! 连接请求与连接：生命周期状态机的主干。

mod connection;
mod event;
mod request;

pub use connection::Connection;
pub use event::ConnectionEvent;
pub use request::ConnectionRequest;

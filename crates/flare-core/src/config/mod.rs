//! 不可变配置记录：连接、共享接收队列与远端对等体能力。
//!
//! 默认值集中在各记录的 `Default` 实现里，调用点不重复默认；记录按引用
//! 传入构造函数，构造后不再变化。

mod conn;
mod remote;
mod srq;

pub use conn::ConnectionConfig;
pub use remote::RemotePeerConfig;
pub use srq::SrqConfig;

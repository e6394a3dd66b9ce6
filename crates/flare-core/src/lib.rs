#![warn(missing_docs)]

//! `flare-core` 是面向远程持久内存的 RDMA 访问库核心。
//!
//! # 教案背景（Why）
//! - 库暴露单侧（读、写、原子写、冲刷）与两侧（send、接收）RDMA 操作，
//!   对持久内存是头等支持：冲刷给出的是持久性保证而不只是可见性；
//! - 最难也最核心的子系统是连接与数据路径的状态引擎——对等体、连接
//!   请求、连接、完成队列（含共享接收路径）与内存注册的生命周期编排，
//!   它在严格的顺序、归属与所有权约束下驱动一个 RDMA Provider，并把
//!   Provider 错误翻译为稳定的类型化错误面；
//! - 与之不可分的两块一并收录：远端内存区域描述符的位精确线缆编码，
//!   以及注册时二选一的冲刷引擎。
//!
//! # 使用概览（How）
//! - 从文本地址解析设备并构造 [`Peer`]；经它注册 [`LocalMr`]（各自可
//!   导出线缆描述符），然后要么 [`Endpoint::listen`] 产出入站
//!   [`ConnectionRequest`]，要么 [`ConnectionRequest::new`] 发起出站；
//! - 请求提升为 [`Connection`] 后交换一小段私有数据（习惯上装一个
//!   远端区域描述符），在连接上投递数据路径操作并在完成队列上收割；
//! - 关停是对称的：断开、排空事件、删除。
//!
//! # 合约说明（What）
//! - 库内不派生线程；仅有的阻塞点是 Provider 的建连、事件等待与完成
//!   等待，有界等待经 fd 访问器由调用方外部轮询实现；
//! - 错误是封闭枚举 [`FlareError`]；Provider 失败携带现场捕获的
//!   `errno`；回收路径的次生失败不掩盖首要错误；
//! - 日志经 `tracing` 发布，库不持有任何落地端。
//!
//! # 风险提示（Trade-offs）
//! - 同一连接的数据路径不支持并发投递（单投递者纪律）；
//! - 完成队列遵守单轮询者纪律；跨 CQ 的统一等待走连接级共享通道。

pub mod config;
pub mod conn;
mod cq;
mod ep;
mod error;
mod flush;
mod guard;
pub mod mr;
mod peer;
mod srq;

pub use config::{ConnectionConfig, RemotePeerConfig, SrqConfig};
pub use conn::{Connection, ConnectionEvent, ConnectionRequest};
pub use cq::CompletionQueue;
pub use ep::Endpoint;
pub use error::{last_provider_errno, FlareError};
pub use flush::FlushType;
pub use mr::{mr_descriptor_size, LocalMr, MrDescriptor, MrUsage, RemoteMr, MR_DESCRIPTOR_SIZE};
pub use peer::Peer;
pub use srq::Srq;

// 数据路径与完成路径共用的 Provider 值类型，转发导出以便调用方单点引用。
pub use flare_verbs::{CompletionFlags, TransportType, WcDetail, WcStatus, WorkCompletion};

/// 库统一的返回别名；错误固定为 [`FlareError`]。
pub type Result<T> = core::result::Result<T, FlareError>;

#![warn(missing_docs)]

//! `flare-verbs` 是 flare 框架的 RDMA Provider 契约层。
//!
//! # 教案背景（Why）
//! - 远程持久内存访问的核心难点在连接与数据路径的状态编排，而非 verbs 本身；
//!   将 Provider（设备枚举、能力探测、工作请求投递、完成轮询）收敛为一个窄接口，
//!   可以让 `flare-core` 的生命周期逻辑在没有真实 RNIC 的环境下被完整验证；
//! - 接口保持对象安全（`Arc<dyn RdmaProvider>`），上层对象只持有不透明句柄，
//!   热路径不做句柄再校验。
//!
//! # 合约说明（What）
//! - [`RdmaProvider`]：Provider 的全部能力入口，涵盖设备/PD/MR/CQ/SRQ/QP/CM 的
//!   生命周期、事件与完成等待、以及工作请求投递；
//! - 句柄（[`DeviceHandle`] 等）是不透明的 `u64` 新类型，仅对发放它的 Provider
//!   有意义；
//! - 值类型（[`WorkCompletion`]、[`CmEvent`]、[`SendRequest`] 等）是纯数据，
//!   跨越契约边界时按值复制；
//! - 每个可失败操作返回 [`VerbsError`]，在任何后续调用之前捕获原始 `errno`。
//!
//! # 实现策略（How）
//! - 生产实现预期封装 libibverbs/librdmacm；本 crate 同时附带
//!   [`test_stubs::MockProvider`]——官方维护的内存态实现，支持脚本化事件、
//!   按调用注入故障与句柄泄漏核算，供上层契约测试复用。
//!
//! # 风险提示（Trade-offs）
//! - 契约把 `rdma_getaddrinfo` 一类的多步解析折叠为单个操作，牺牲了对中间态的
//!   控制，换取上层状态机的简洁；需要细粒度控制的实现应在 Provider 内部自行组合。

mod access;
mod caps;
mod cm;
mod error;
mod handles;
mod provider;
pub mod test_stubs;
mod wc;
mod wr;

pub use access::AccessFlags;
pub use caps::{DeviceCaps, TransportType};
pub use cm::{CmEvent, CmEventKind};
pub use error::VerbsError;
pub use handles::{
    CmEventHandle, CmIdHandle, CompChannelHandle, CqHandle, DeviceHandle, EventChannelHandle,
    MrHandle, PdHandle, SrqHandle,
};
pub use provider::{MrReg, QpConfig, RdmaProvider};
pub use wc::{WcDetail, WcStatus, WorkCompletion};
pub use wr::{CompletionFlags, FlushLevel, RecvRequest, SendRequest};

/// 契约层统一的返回别名；错误固定为 [`VerbsError`]。
pub type Result<T> = core::result::Result<T, VerbsError>;

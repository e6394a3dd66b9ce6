use crate::handles::{CmEventHandle, CmIdHandle};

/// CM 事件类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmEventKind {
    /// 入站连接请求到达监听 id。
    ConnectRequest,
    /// 连接建立完成。
    Established,
    /// 对端或本地断开。
    Disconnected,
    /// 建立过程中的传输错误。
    ConnectError,
    /// 对端拒绝。
    Rejected,
    /// 对端不可达。
    Unreachable,
    /// 地址解析失败。
    AddrError,
    /// 路由解析失败。
    RouteError,
    /// 连接退出 timewait。
    TimewaitExit,
    /// 设备被移除。
    DeviceRemoval,
    /// 其他未建模事件，保留原始值。
    Other(u32),
}

/// 一条已取回的 CM 事件。
///
/// # 契约说明（What）
/// - 私有数据在取回时即从 Provider 复制进 `private_data`，之后与底层
///   事件对象的生命周期无关；
/// - `handle` 用于事后确认（ack）；每条事件必须恰好确认一次，确认前
///   Provider 有权阻塞同通道的后续取回。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CmEvent {
    /// 事件句柄，用于 ack。
    pub handle: CmEventHandle,
    /// 事件关联的 CM id（入站连接请求时是新 id）。
    pub id: CmIdHandle,
    /// 事件类型。
    pub kind: CmEventKind,
    /// 随事件到达的连接私有数据，无则为空。
    pub private_data: Vec<u8>,
}

/// 连接可观察到的事件。
///
/// 状态机主干是 `Established → Closed`；`Rejected`、`Lost`、`Unreachable`
/// 可能在建立前出现。`Closed` 是终态，其后只有删除是合法操作。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// 保留值，不会由事件流返回。
    Undefined,
    /// 连接建立完成。
    Established,
    /// 对端或本地断开，终态。
    Closed,
    /// 建立过程中连接丢失。
    Lost,
    /// 对端拒绝。
    Rejected,
    /// 对端不可达。
    Unreachable,
}

impl ConnectionEvent {
    /// 返回事件的稳定名称。
    pub const fn as_str(self) -> &'static str {
        match self {
            ConnectionEvent::Undefined => "UNDEFINED",
            ConnectionEvent::Established => "ESTABLISHED",
            ConnectionEvent::Closed => "CLOSED",
            ConnectionEvent::Lost => "LOST",
            ConnectionEvent::Rejected => "REJECTED",
            ConnectionEvent::Unreachable => "UNREACHABLE",
        }
    }
}

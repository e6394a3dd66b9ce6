/// 设备传输类型。
///
/// iWARP 的读目的地注册需要额外的远程写权限，上层据此修正访问掩码，
/// 因此传输类型必须在能力探测时一次性取得并缓存。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportType {
    /// InfiniBand（含 RoCE）。
    Ib,
    /// iWARP。
    Iwarp,
    /// 其他可靠连接传输。
    Other,
}

/// 设备能力快照。
///
/// # 契约说明（What）
/// - 在 Peer 构造时一次性查询并缓存；此后访问掩码计算与 QP 初始化属性
///   均以缓存值为准，Provider 不会被重复询问；
/// - `native_flush` 为真时上层选择原生 FLUSH 动词，否则构造软件模拟的
///   冲刷引擎。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceCaps {
    /// 传输类型。
    pub transport: TransportType,
    /// 是否支持按需分页（ODP）。
    pub odp: bool,
    /// 是否支持原生原子写动词。
    pub atomic_write: bool,
    /// 是否支持原生 FLUSH 动词。
    pub native_flush: bool,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            transport: TransportType::Ib,
            odp: false,
            atomic_write: false,
            native_flush: false,
        }
    }
}

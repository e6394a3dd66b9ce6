//! Provider 句柄新类型。
//!
//! 所有句柄都是不透明的 `u64`：仅对发放它的 Provider 实例有意义，跨 Provider
//! 传递属于调用方错误。句柄可自由复制，释放责任由上层包装对象承担。

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name(#[doc = "底层原始值。"] pub u64);

        impl $name {
            /// 读取底层原始值，仅供 Provider 实现与日志使用。
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

handle! {
    /// 设备上下文句柄，由文本地址解析得到。
    DeviceHandle
}
handle! {
    /// 保护域句柄。
    PdHandle
}
handle! {
    /// 已注册内存区域句柄。
    MrHandle
}
handle! {
    /// 完成队列句柄。
    CqHandle
}
handle! {
    /// 完成通道句柄（CQ 通知所走的通道）。
    CompChannelHandle
}
handle! {
    /// 共享接收队列句柄。
    SrqHandle
}
handle! {
    /// 连接管理（CM）标识句柄；QP 附着其上。
    CmIdHandle
}
handle! {
    /// CM 事件通道句柄。
    EventChannelHandle
}
handle! {
    /// 单个 CM 事件的句柄，用于事后确认（ack）。
    CmEventHandle
}

use bitflags::bitflags;

bitflags! {
    /// 内存注册访问掩码。
    ///
    /// # 契约说明（What）
    /// - 与 verbs 的 `IBV_ACCESS_*` 语义一一对应，但取值空间由本契约自治，
    ///   Provider 实现负责翻译到自己的常量；
    /// - `ON_DEMAND` 表示按需分页（ODP）注册，只在设备声明该能力后使用。
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct AccessFlags: u32 {
        /// 本地写入（接收、读目的地等都需要它）。
        const LOCAL_WRITE = 1 << 0;
        /// 允许对端远程读取。
        const REMOTE_READ = 1 << 1;
        /// 允许对端远程写入。
        const REMOTE_WRITE = 1 << 2;
        /// 按需分页注册。
        const ON_DEMAND = 1 << 3;
    }
}

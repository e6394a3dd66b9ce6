use bitflags::bitflags;

bitflags! {
    /// 内存区域的用途位集。
    ///
    /// # 契约说明（What）
    /// - 注册时非空；访问掩码由用途与传输类型确定性推导（见 Peer）；
    /// - 位值是线缆契约的一部分：描述符以 `u32` 原样携带它，超出
    ///   已定义集合的位在反序列化时被拒绝。
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MrUsage: u32 {
        /// 单侧读的源。
        const READ_SRC = 1 << 0;
        /// 单侧读的目的地。
        const READ_DST = 1 << 1;
        /// 单侧写的源。
        const WRITE_SRC = 1 << 2;
        /// 单侧写的目的地。
        const WRITE_DST = 1 << 3;
        /// 可见性冲刷的目标。
        const FLUSH_VISIBILITY = 1 << 4;
        /// 持久性冲刷的目标。
        const FLUSH_PERSISTENT = 1 << 5;
        /// 两侧 send 的源。
        const SEND = 1 << 6;
        /// 两侧接收的目的地。
        const RECV = 1 << 7;
        /// 原子写的目的地。
        const ATOMIC_WRITE_DST = 1 << 8;
    }
}

/// 工作请求的完成通知策略。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionFlags {
    /// 不请求完成通知。
    None,
    /// 仅在出错时产生完成。
    OnError,
    /// 总是产生完成。
    Always,
}

/// 原生 FLUSH 动词的作用级别。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushLevel {
    /// 全局可见性：先行写入对后续远程读可见。
    Global,
    /// 持久性：先行写入已落到目标的非易失介质。
    Persistent,
}

/// 发送方向的工作请求。
///
/// # 契约说明（What）
/// - 各变体携带完整的地址/密钥/长度信息，Provider 不回查 MR 对象；
/// - `flags` 与 `wr_id` 对所有变体统一：前者决定完成通知策略，后者是
///   调用方解复用完成所用的不透明标识；
/// - 长度为 0 的 `Read` 合法，是软件模拟冲刷的载体。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendRequest {
    /// 单侧读：远端 `raddr` → 本地 `laddr`。
    Read {
        /// 本地目的地址。
        laddr: u64,
        /// 本地密钥。
        lkey: u32,
        /// 远端源地址。
        raddr: u64,
        /// 远端密钥。
        rkey: u32,
        /// 字节数，可为 0。
        len: u64,
        /// 完成通知策略。
        flags: CompletionFlags,
        /// 工作请求标识。
        wr_id: u64,
    },
    /// 单侧写：本地 `laddr` → 远端 `raddr`。
    Write {
        /// 本地源地址。
        laddr: u64,
        /// 本地密钥。
        lkey: u32,
        /// 远端目的地址。
        raddr: u64,
        /// 远端密钥。
        rkey: u32,
        /// 字节数。
        len: u64,
        /// 随写携带的立即数；存在时对端以接收完成形式观察到它。
        imm: Option<u32>,
        /// 完成通知策略。
        flags: CompletionFlags,
        /// 工作请求标识。
        wr_id: u64,
    },
    /// 原生原子写：8 字节负载内联投递。
    AtomicWrite {
        /// 远端目的地址，必须 8 字节对齐。
        raddr: u64,
        /// 远端密钥。
        rkey: u32,
        /// 内联负载。
        payload: [u8; 8],
        /// 完成通知策略。
        flags: CompletionFlags,
        /// 工作请求标识。
        wr_id: u64,
    },
    /// 两侧 send，可携带立即数。
    Send {
        /// 本地源地址；零长度发送时为 0。
        laddr: u64,
        /// 本地密钥；零长度发送时为 0。
        lkey: u32,
        /// 字节数，可为 0。
        len: u64,
        /// 立即数。
        imm: Option<u32>,
        /// 完成通知策略。
        flags: CompletionFlags,
        /// 工作请求标识。
        wr_id: u64,
    },
    /// 原生 FLUSH 动词。
    Flush {
        /// 远端起始地址。
        raddr: u64,
        /// 远端密钥。
        rkey: u32,
        /// 覆盖的字节数。
        len: u64,
        /// 作用级别。
        level: FlushLevel,
        /// 完成通知策略。
        flags: CompletionFlags,
        /// 工作请求标识。
        wr_id: u64,
    },
}

impl SendRequest {
    /// 读取请求携带的工作请求标识。
    pub const fn wr_id(&self) -> u64 {
        match self {
            SendRequest::Read { wr_id, .. }
            | SendRequest::Write { wr_id, .. }
            | SendRequest::AtomicWrite { wr_id, .. }
            | SendRequest::Send { wr_id, .. }
            | SendRequest::Flush { wr_id, .. } => *wr_id,
        }
    }
}

/// 接收方向的工作请求。
///
/// 零长度接收（`laddr == 0 && lkey == 0 && len == 0`）合法，仅用于携带
/// `wr_id` 等待对端的零长度 send。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecvRequest {
    /// 本地目的地址。
    pub laddr: u64,
    /// 本地密钥。
    pub lkey: u32,
    /// 缓冲长度。
    pub len: u64,
    /// 工作请求标识。
    pub wr_id: u64,
}

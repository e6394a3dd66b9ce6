/// 工作完成状态。
///
/// 覆盖可靠连接传输上会出现的主要状态；未建模的提供方状态折叠为
/// [`WcStatus::GeneralErr`]。调用方通过 [`WcStatus::as_str`] 取得可读名称。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WcStatus {
    /// 操作成功完成。
    Success,
    /// 本地长度错误。
    LocLenErr,
    /// 本地保护错误：散布表引用的 MR 对该操作无效。
    LocProtErr,
    /// QP 进入错误态时在途请求被冲刷。
    WrFlushErr,
    /// 对端访问权限错误。
    RemAccessErr,
    /// 对端执行错误。
    RemOpErr,
    /// 应答方超时。
    RespTimeoutErr,
    /// 其他错误。
    GeneralErr,
}

impl WcStatus {
    /// 返回状态的稳定名称。
    pub const fn as_str(self) -> &'static str {
        match self {
            WcStatus::Success => "SUCCESS",
            WcStatus::LocLenErr => "LOC_LEN_ERR",
            WcStatus::LocProtErr => "LOC_PROT_ERR",
            WcStatus::WrFlushErr => "WR_FLUSH_ERR",
            WcStatus::RemAccessErr => "REM_ACCESS_ERR",
            WcStatus::RemOpErr => "REM_OP_ERR",
            WcStatus::RespTimeoutErr => "RESP_TIMEOUT_ERR",
            WcStatus::GeneralErr => "GENERAL_ERR",
        }
    }
}

/// 完成记录中依操作码区分的负载。
///
/// 仅对部分操作码有意义的字段（接收长度、立即数）放进对应变体，
/// 避免调用方在错误的操作码上读到未定义内容。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WcDetail {
    /// 两侧 send 完成。
    Send,
    /// 单侧读完成。
    RdmaRead,
    /// 单侧写完成。
    RdmaWrite,
    /// 原子写完成。
    AtomicWrite,
    /// 冲刷完成。
    Flush,
    /// 接收完成。
    Recv {
        /// 实际落地的字节数。
        byte_len: u32,
        /// 随 send-with-imm 到达的立即数。
        imm: Option<u32>,
    },
    /// 携带立即数的远程写触发的接收完成。
    RecvRdmaWithImm {
        /// 实际落地的字节数。
        byte_len: u32,
        /// 立即数。
        imm: u32,
    },
}

/// 一条工作完成记录。
///
/// # 契约说明（What）
/// - `wr_id` 是投递时调用方给定的不透明标识，同一连接、同一标识至多
///   产生一条完成；
/// - 记录从 Provider 原样复制给调用方，状态与操作码由调用方解释。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkCompletion {
    /// 投递时携带的工作请求标识。
    pub wr_id: u64,
    /// 完成状态。
    pub status: WcStatus,
    /// 操作码相关负载。
    pub detail: WcDetail,
}

impl Default for WorkCompletion {
    /// 轮询输出缓冲的占位值，本身不代表任何已发生的完成。
    fn default() -> Self {
        Self {
            wr_id: 0,
            status: WcStatus::Success,
            detail: WcDetail::Send,
        }
    }
}

use thiserror::Error;

/// Provider 层错误：携带失败操作名与原始 `errno`。
///
/// # 设计背景（Why）
/// - 上层的稳定错误域要求 Provider 失败坍缩为单一类别，同时保留原始
///   `errno` 供排障与错误翻译（`ENOMEM`、`EAGAIN`、`EOPNOTSUPP` 有
///   专门语义）；
/// - `op` 固定为 `'static` 操作名，避免热路径上的堆分配。
///
/// # 契约说明（What）
/// - `errno` 必须在任何后续 Provider 调用之前捕获；
/// - 值可自由复制，实现 `std::error::Error`，可挂在上层错误的因果链上。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("provider operation {op} failed: errno {errno}")]
pub struct VerbsError {
    /// 失败的契约操作名，如 `"reg_mr"`。
    pub op: &'static str,
    /// 原始 `errno`。
    pub errno: i32,
}

impl VerbsError {
    /// 以操作名与 `errno` 构造。
    pub const fn new(op: &'static str, errno: i32) -> Self {
        Self { op, errno }
    }
}

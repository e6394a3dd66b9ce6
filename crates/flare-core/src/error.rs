use std::cell::Cell;

use flare_verbs::VerbsError;
use thiserror::Error;

/// 库的公开错误域：封闭枚举，语义稳定。
///
/// # 设计背景（Why）
/// - 调用方的重试/放弃决策只应依赖错误类别，不应解析消息文本；
/// - Provider 失败坍缩为单一 [`FlareError::Provider`] 变体，原始 `errno`
///   与操作名直接携带在值上，不再要求调用方查询线程局部状态（兼容
///   取值器 [`last_provider_errno`] 仍然保留）。
///
/// # 契约说明（What）
/// - 参数错误（`Inval`）在任何资源获取之前检出，保证无副作用；
/// - 暂态错误（`Again`、`NoCompletion`、`NoEvent`）预期由调用方重试；
/// - 形状错误（`SharedChannel`、`NotSharedChannel`）指示 CQ 与完成通道
///   的配置组合不匹配；
/// - 回收路径上的次生失败不会覆盖首要错误：首要调用已失败时次生失败
///   经 `tracing` 告警，首要调用成功时次生失败就是回收函数的返回值。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum FlareError {
    /// 非法参数。
    #[error("invalid argument")]
    Inval,
    /// 内存不足。
    #[error("out of memory")]
    NoMem,
    /// Provider 调用失败；`errno` 为失败现场捕获的原始值。
    #[error("provider operation {op} failed: errno {errno}")]
    Provider {
        /// 失败的 Provider 操作名。
        op: &'static str,
        /// 原始 `errno`。
        errno: i32,
    },
    /// 请求合法但传输/对端/配置不支持。
    #[error("operation not supported")]
    NoSupp,
    /// 暂时不可用，请重试。
    #[error("temporarily unavailable")]
    Again,
    /// 完成队列当前没有完成记录。
    #[error("no completion available")]
    NoCompletion,
    /// 事件通道当前没有事件。
    #[error("no event available")]
    NoEvent,
    /// 该完成队列建在共享通道上，应使用连接级等待。
    #[error("completion channel is shared")]
    SharedChannel,
    /// 连接未配置共享完成通道。
    #[error("completion channel is not shared")]
    NotSharedChannel,
    /// 未知失败（含 Provider 报告超出请求条数的防御性拦截）。
    #[error("unknown error")]
    Unknown,
    /// 超时为负值。
    #[error("negative timeout")]
    NegativeTimeout,
    /// 端点未处于监听状态。
    #[error("endpoint is not listening")]
    NotListening,
    /// 取到了无法处理的事件类型。
    #[error("unhandled event")]
    UnhandledEvent,
    /// 事件归属的连接未知。
    #[error("unknown connection")]
    UnknownConnection,
}

impl FlareError {
    /// 返回错误的稳定名称。
    pub const fn name(self) -> &'static str {
        match self {
            FlareError::Inval => "INVAL",
            FlareError::NoMem => "NOMEM",
            FlareError::Provider { .. } => "PROVIDER",
            FlareError::NoSupp => "NOSUPP",
            FlareError::Again => "AGAIN",
            FlareError::NoCompletion => "NO_COMPLETION",
            FlareError::NoEvent => "NO_EVENT",
            FlareError::SharedChannel => "SHARED_CHANNEL",
            FlareError::NotSharedChannel => "NOT_SHARED_CHANNEL",
            FlareError::Unknown => "UNKNOWN",
            FlareError::NegativeTimeout => "NEGATIVE_TIMEOUT",
            FlareError::NotListening => "NOT_LISTENING",
            FlareError::UnhandledEvent => "UNHANDLED_EVENT",
            FlareError::UnknownConnection => "UNKNOWN_CONNECTION",
        }
    }
}

thread_local! {
    static LAST_PROVIDER_ERRNO: Cell<i32> = const { Cell::new(0) };
}

/// 当前线程最近一次 Provider 失败的 `errno`。
///
/// 兼容性取值器：新代码应直接读取 [`FlareError::Provider`] 上携带的值。
pub fn last_provider_errno() -> i32 {
    LAST_PROVIDER_ERRNO.with(Cell::get)
}

impl From<VerbsError> for FlareError {
    /// Provider 错误翻译：`ENOMEM` 有统一的资源语义，其余保留为
    /// `Provider`；`EAGAIN` 的"暂无"语义依赖等待现场，由调用点处理。
    fn from(err: VerbsError) -> Self {
        LAST_PROVIDER_ERRNO.with(|slot| slot.set(err.errno));
        if err.errno == libc::ENOMEM {
            FlareError::NoMem
        } else {
            FlareError::Provider {
                op: err.op,
                errno: err.errno,
            }
        }
    }
}

/// 记录回收链路上的一步：首个失败保留为结果，其余只告警。
pub(crate) fn record_teardown(
    first: &mut core::result::Result<(), FlareError>,
    step: core::result::Result<(), FlareError>,
) {
    if let Err(err) = step {
        if first.is_ok() {
            *first = Err(err);
        } else {
            tracing::warn!(error = %err, "secondary teardown failure");
        }
    }
}

/// 等待类调用的 `EAGAIN` 翻译：暂无完成。
pub(crate) fn map_wait_no_completion(err: VerbsError) -> FlareError {
    if err.errno == libc::EAGAIN {
        FlareError::NoCompletion
    } else {
        err.into()
    }
}

/// 等待类调用的 `EAGAIN` 翻译：暂无事件。
pub(crate) fn map_wait_no_event(err: VerbsError) -> FlareError {
    if err.errno == libc::EAGAIN {
        FlareError::NoEvent
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert_eq!(FlareError::NoCompletion.name(), "NO_COMPLETION");
        assert_eq!(
            FlareError::Provider { op: "reg_mr", errno: 5 }.name(),
            "PROVIDER"
        );
    }

    #[test]
    fn enomem_collapses_to_nomem() {
        let err: FlareError = VerbsError::new("reg_mr", libc::ENOMEM).into();
        assert_eq!(err, FlareError::NoMem);
        assert_eq!(last_provider_errno(), libc::ENOMEM);
    }

    #[test]
    fn provider_errno_is_preserved() {
        let err: FlareError = VerbsError::new("create_cq", libc::EIO).into();
        assert_eq!(
            err,
            FlareError::Provider {
                op: "create_cq",
                errno: libc::EIO
            }
        );
        assert_eq!(last_provider_errno(), libc::EIO);
    }

    #[test]
    fn eagain_maps_per_wait_site() {
        let again = VerbsError::new("get_cq_event", libc::EAGAIN);
        assert_eq!(map_wait_no_completion(again), FlareError::NoCompletion);
        let again = VerbsError::new("get_cm_event", libc::EAGAIN);
        assert_eq!(map_wait_no_event(again), FlareError::NoEvent);
    }
}

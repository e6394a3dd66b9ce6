use std::os::fd::RawFd;
use std::sync::Arc;

use flare_verbs::{CompChannelHandle, CqHandle, DeviceHandle, RdmaProvider, WorkCompletion};

use crate::error::{map_wait_no_completion, record_teardown, FlareError};
use crate::Result;

/// 完成队列：Provider CQ 加（自有或共享的）完成通道。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 通知武装是 CQ 正确性的隐形负担：漏掉一次重新武装，下一次等待就
///   永远不醒。包装层把"创建即武装、每次成功等待后重新武装"固化成
///   不可绕过的行为；
/// - 通道有两种归属：自有（包装层创建并销毁）与共享（连接级统一等待，
///   归属在拥有它的连接），形状不匹配的等待以形状错误拒绝。
///
/// ## 契约说明（What）
/// - 单轮询者纪律：同一时刻至多一个线程对同一 CQ 调用
///   [`wait`](Self::wait) 或 [`poll`](Self::poll)；
/// - [`poll`](Self::poll) 原样复制 Provider 的完成记录，状态与操作码由
///   调用方解释；
/// - [`fd`](Self::fd) 暴露通道描述符：库内等待是阻塞的，有界等待由
///   调用方把描述符设为非阻塞并自行轮询。
pub struct CompletionQueue {
    provider: Arc<dyn RdmaProvider>,
    cq: CqHandle,
    channel: CompChannelHandle,
    owns_channel: bool,
    shared: bool,
    released: bool,
}

impl CompletionQueue {
    /// 创建给定深度的 CQ；未传入共享通道时创建并持有自己的通道。
    /// 新建的 CQ 立即为下一次通知武装。
    pub(crate) fn new(
        provider: Arc<dyn RdmaProvider>,
        dev: DeviceHandle,
        depth: u32,
        shared_channel: Option<CompChannelHandle>,
    ) -> Result<Self> {
        let (channel, owns_channel) = match shared_channel {
            Some(ch) => (ch, false),
            None => (provider.create_comp_channel(dev)?, true),
        };

        let unwind_channel = |provider: &Arc<dyn RdmaProvider>| {
            if owns_channel
                && let Err(err) = provider.destroy_comp_channel(channel)
            {
                tracing::warn!(error = %err, "completion channel teardown failed while unwinding");
            }
        };

        let cq = match provider.create_cq(dev, depth, channel) {
            Ok(cq) => cq,
            Err(err) => {
                unwind_channel(&provider);
                return Err(err.into());
            }
        };
        if let Err(err) = provider.req_notify_cq(cq) {
            if let Err(secondary) = provider.destroy_cq(cq) {
                tracing::warn!(error = %secondary, "cq teardown failed while unwinding");
            }
            unwind_channel(&provider);
            return Err(err.into());
        }

        Ok(Self {
            provider,
            cq,
            channel,
            owns_channel,
            shared: shared_channel.is_some(),
            released: false,
        })
    }

    /// 阻塞等待下一次完成通知；成功返回前确认事件并重新武装。
    ///
    /// # 错误（What）
    /// - [`FlareError::SharedChannel`]：本 CQ 建在共享通道上，应使用
    ///   连接级等待；
    /// - [`FlareError::NoCompletion`]：通道返回而没有事件（描述符被设为
    ///   非阻塞时的 `EAGAIN`）；
    /// - [`FlareError::Provider`]：重新武装失败。
    pub fn wait(&self) -> Result<()> {
        if self.shared {
            return Err(FlareError::SharedChannel);
        }
        let fired = self
            .provider
            .get_cq_event(self.channel)
            .map_err(map_wait_no_completion)?;
        self.ack_and_rearm_handle(fired)
    }

    /// 轮询完成记录到 `out` 前缀，返回条数。
    ///
    /// # 错误（What）
    /// - [`FlareError::Inval`]：`out` 为空；
    /// - [`FlareError::NoCompletion`]：CQ 为空；
    /// - [`FlareError::Unknown`]：Provider 报告的条数超过 `out.len()`——
    ///   防御性拦截，调用方看不到任何记录；行为记录为未定义，调用方
    ///   应把缓冲开到足够大而不是依赖重试。
    pub fn poll(&self, out: &mut [WorkCompletion]) -> Result<usize> {
        if out.is_empty() {
            return Err(FlareError::Inval);
        }
        let n = self.provider.poll_cq(self.cq, out)?;
        if n == 0 {
            return Err(FlareError::NoCompletion);
        }
        if n > out.len() {
            return Err(FlareError::Unknown);
        }
        Ok(n)
    }

    /// 完成通道的文件描述符，供外部有界轮询。
    pub fn fd(&self) -> RawFd {
        self.provider.comp_channel_fd(self.channel)
    }

    pub(crate) fn handle(&self) -> CqHandle {
        self.cq
    }

    /// 连接级共享通道等待命中本 CQ 后的确认与重新武装。
    pub(crate) fn ack_and_rearm(&self) -> Result<()> {
        self.ack_and_rearm_handle(self.cq)
    }

    fn ack_and_rearm_handle(&self, fired: CqHandle) -> Result<()> {
        self.provider.ack_cq_event(fired);
        self.provider
            .req_notify_cq(self.cq)
            .map_err(FlareError::from)
    }

    pub(crate) fn teardown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let mut first = Ok(());
        record_teardown(&mut first, self.provider.destroy_cq(self.cq).map_err(Into::into));
        if self.owns_channel {
            record_teardown(
                &mut first,
                self.provider
                    .destroy_comp_channel(self.channel)
                    .map_err(Into::into),
            );
        }
        first
    }

    /// 显式销毁：先 CQ，再自有通道；首个失败作为返回值，其余告警。
    pub fn delete(mut self) -> Result<()> {
        self.teardown()
    }
}

impl Drop for CompletionQueue {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            tracing::warn!(error = %err, "completion queue teardown failed on drop");
        }
    }
}

impl std::fmt::Debug for CompletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("cq", &self.cq)
            .field("channel", &self.channel)
            .field("owns_channel", &self.owns_channel)
            .field("shared", &self.shared)
            .finish()
    }
}

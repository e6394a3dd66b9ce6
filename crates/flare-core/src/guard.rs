//! 多步构造的作用域守卫。
//!
//! 守卫在被显式解除武装（commit）之前持有释放责任；构造中途任何 `?`
//! 返回都会让局部变量按声明逆序析构，恰好得到逆序回收。析构中的失败
//! 只能告警，不会掩盖首要错误。

use std::sync::Arc;

use flare_verbs::{CmIdHandle, CompChannelHandle, EventChannelHandle, RdmaProvider};

pub(crate) struct CmIdGuard<'a> {
    provider: &'a Arc<dyn RdmaProvider>,
    id: CmIdHandle,
    armed: bool,
}

impl<'a> CmIdGuard<'a> {
    pub(crate) fn new(provider: &'a Arc<dyn RdmaProvider>, id: CmIdHandle) -> Self {
        Self {
            provider,
            id,
            armed: true,
        }
    }

    pub(crate) fn id(&self) -> CmIdHandle {
        self.id
    }

    pub(crate) fn commit(mut self) -> CmIdHandle {
        self.armed = false;
        self.id
    }
}

impl Drop for CmIdGuard<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Err(err) = self.provider.destroy_cm_id(self.id)
        {
            tracing::warn!(error = %err, "cm id teardown failed while unwinding");
        }
    }
}

/// QP 附着在 CM id 上，守卫只负责 `destroy_qp`。
pub(crate) struct QpGuard<'a> {
    provider: &'a Arc<dyn RdmaProvider>,
    id: CmIdHandle,
    armed: bool,
}

impl<'a> QpGuard<'a> {
    pub(crate) fn new(provider: &'a Arc<dyn RdmaProvider>, id: CmIdHandle) -> Self {
        Self {
            provider,
            id,
            armed: true,
        }
    }

    pub(crate) fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for QpGuard<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Err(err) = self.provider.destroy_qp(self.id)
        {
            tracing::warn!(error = %err, "qp teardown failed while unwinding");
        }
    }
}

pub(crate) struct CompChannelGuard<'a> {
    provider: &'a Arc<dyn RdmaProvider>,
    ch: CompChannelHandle,
    armed: bool,
}

impl<'a> CompChannelGuard<'a> {
    pub(crate) fn new(provider: &'a Arc<dyn RdmaProvider>, ch: CompChannelHandle) -> Self {
        Self {
            provider,
            ch,
            armed: true,
        }
    }

    pub(crate) fn ch(&self) -> CompChannelHandle {
        self.ch
    }

    pub(crate) fn commit(mut self) -> CompChannelHandle {
        self.armed = false;
        self.ch
    }
}

impl Drop for CompChannelGuard<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Err(err) = self.provider.destroy_comp_channel(self.ch)
        {
            tracing::warn!(error = %err, "completion channel teardown failed while unwinding");
        }
    }
}

pub(crate) struct EventChannelGuard<'a> {
    provider: &'a Arc<dyn RdmaProvider>,
    ch: EventChannelHandle,
    armed: bool,
}

impl<'a> EventChannelGuard<'a> {
    pub(crate) fn new(provider: &'a Arc<dyn RdmaProvider>, ch: EventChannelHandle) -> Self {
        Self {
            provider,
            ch,
            armed: true,
        }
    }

    pub(crate) fn ch(&self) -> EventChannelHandle {
        self.ch
    }

    pub(crate) fn commit(mut self) -> EventChannelHandle {
        self.armed = false;
        self.ch
    }
}

impl Drop for EventChannelGuard<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Err(err) = self.provider.destroy_event_channel(self.ch)
        {
            tracing::warn!(error = %err, "event channel teardown failed while unwinding");
        }
    }
}

use std::os::fd::RawFd;
use std::sync::Arc;

use flare_verbs::{CmEventKind, CmIdHandle, EventChannelHandle};

use crate::config::ConnectionConfig;
use crate::conn::ConnectionRequest;
use crate::error::{map_wait_no_event, record_teardown, FlareError};
use crate::guard::{CmIdGuard, EventChannelGuard};
use crate::peer::Peer;
use crate::Result;

/// 被动端点：在一个地址上监听入站连接请求。
///
/// # 契约说明（What）
/// - 生命周期：`listen` →（产出入站请求）* → `shutdown`；
/// - [`next_conn_req`](Self::next_conn_req) 阻塞等待下一条事件；取到的
///   事件不是连接请求时先确认再以 [`FlareError::UnhandledEvent`] 上报；
/// - [`fd`](Self::fd) 暴露事件通道描述符：把它设为非阻塞即可在外部
///   实现有界等待，此时暂无事件以 [`FlareError::NoEvent`] 返回。
pub struct Endpoint {
    peer: Arc<Peer>,
    id: CmIdHandle,
    ch: EventChannelHandle,
    released: bool,
}

impl Endpoint {
    /// 绑定地址并进入监听。
    pub fn listen(peer: &Arc<Peer>, addr: &str, port: &str) -> Result<Endpoint> {
        let provider = peer.provider();
        let ch = EventChannelGuard::new(provider, provider.create_event_channel()?);
        let id = CmIdGuard::new(provider, provider.create_cm_id(Some(ch.ch()))?);
        provider.bind_and_listen(id.id(), addr, port)?;
        Ok(Self {
            peer: Arc::clone(peer),
            id: id.commit(),
            ch: ch.commit(),
            released: false,
        })
    }

    /// 阻塞等待下一条入站连接请求。
    pub fn next_conn_req(&self, cfg: &ConnectionConfig) -> Result<ConnectionRequest> {
        let provider = self.peer.provider();
        let event = provider.get_cm_event(self.ch).map_err(map_wait_no_event)?;
        if event.kind != CmEventKind::ConnectRequest {
            if let Err(err) = provider.ack_cm_event(event.handle) {
                tracing::warn!(error = %err, "cm event ack failed");
            }
            return Err(FlareError::UnhandledEvent);
        }
        ConnectionRequest::from_cm_event(&self.peer, event, cfg)
    }

    /// 监听事件通道的文件描述符，供外部有界轮询。
    pub fn fd(&self) -> RawFd {
        self.peer.provider().event_channel_fd(self.ch)
    }

    fn teardown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let provider = Arc::clone(self.peer.provider());
        let mut first = Ok(());
        record_teardown(&mut first, provider.destroy_cm_id(self.id).map_err(Into::into));
        record_teardown(
            &mut first,
            provider.destroy_event_channel(self.ch).map_err(Into::into),
        );
        first
    }

    /// 停止监听并释放端点。
    pub fn shutdown(mut self) -> Result<()> {
        self.teardown()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            tracing::warn!(error = %err, "endpoint teardown failed on drop");
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("event_channel", &self.ch)
            .finish()
    }
}

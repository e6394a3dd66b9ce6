use std::sync::Arc;

use flare_verbs::{RecvRequest, SrqHandle};

use crate::config::SrqConfig;
use crate::cq::CompletionQueue;
use crate::error::{record_teardown, FlareError};
use crate::mr::LocalMr;
use crate::peer::Peer;
use crate::Result;

/// 共享接收队列：多条连接共用的接收侧。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 大量连接各备一条接收队列浪费且难以均衡；SRQ 把接收缓冲集中投递，
///   完成由任一绑定连接的流量触发，调用方以工作请求标识解复用；
/// - 配置了接收 CQ 深度时，SRQ 自带一条私有接收 CQ（绝不建在共享通道
///   上），绑定它的连接直接借用，而不是另建一条。
///
/// ## 契约说明（What）
/// - 以 `Arc<Srq>` 共享给各连接配置；SRQ 凭引用计数晚于全部使用者释放；
/// - [`recv`](Self::recv) 可被多线程并发调用，解复用由调用方的
///   工作请求标识保证；
/// - 销毁顺序：先自有接收 CQ，后 Provider SRQ；任一步失败上报但不阻止
///   另一步。
pub struct Srq {
    peer: Arc<Peer>,
    srq: SrqHandle,
    rcq: Option<CompletionQueue>,
    released: bool,
}

impl Srq {
    /// 按配置创建 SRQ；`rcq_size > 0` 时附带私有接收 CQ。
    pub fn new(peer: &Arc<Peer>, cfg: &SrqConfig) -> Result<Arc<Self>> {
        let (srq, rcq) = peer.create_srq_parts(cfg)?;
        Ok(Arc::new(Self {
            peer: Arc::clone(peer),
            srq,
            rcq,
            released: false,
        }))
    }

    /// 投递一条接收请求。
    ///
    /// `mr` 为空时 `offset` 与 `len` 必须为零：零长度接收只携带
    /// 工作请求标识，用于等待对端的零长度 send。
    pub fn recv(&self, mr: Option<&LocalMr>, offset: u64, len: u64, wr_id: u64) -> Result<()> {
        let req = match mr {
            Some(mr) => RecvRequest {
                laddr: mr.addr() + offset,
                lkey: mr.lkey(),
                len,
                wr_id,
            },
            None => {
                if offset != 0 || len != 0 {
                    return Err(FlareError::Inval);
                }
                RecvRequest {
                    laddr: 0,
                    lkey: 0,
                    len: 0,
                    wr_id,
                }
            }
        };
        self.peer
            .provider()
            .post_srq_recv(self.srq, &req)
            .map_err(FlareError::from)
    }

    /// SRQ 自带的接收 CQ；未配置时为空。
    pub fn rcq(&self) -> Option<&CompletionQueue> {
        self.rcq.as_ref()
    }

    pub(crate) fn handle(&self) -> SrqHandle {
        self.srq
    }

    fn teardown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let mut first = Ok(());
        if let Some(rcq) = &mut self.rcq {
            record_teardown(&mut first, rcq.teardown());
        }
        record_teardown(
            &mut first,
            self.peer
                .provider()
                .destroy_srq(self.srq)
                .map_err(Into::into),
        );
        first
    }
}

impl Drop for Srq {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            tracing::warn!(error = %err, "shared receive queue teardown failed on drop");
        }
    }
}

impl std::fmt::Debug for Srq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Srq")
            .field("srq", &self.srq)
            .field("has_rcq", &self.rcq.is_some())
            .finish()
    }
}

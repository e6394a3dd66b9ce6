use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use flare_verbs::{
    CmEventKind, CmIdHandle, CompChannelHandle, CompletionFlags, EventChannelHandle, RdmaProvider,
    RecvRequest, SendRequest,
};

use crate::config::RemotePeerConfig;
use crate::conn::ConnectionEvent;
use crate::cq::CompletionQueue;
use crate::error::{map_wait_no_event, map_wait_no_completion, record_teardown, FlareError};
use crate::flush::{FlushEngine, FlushType};
use crate::mr::{LocalMr, MrUsage, RemoteMr};
use crate::peer::Peer;
use crate::srq::Srq;
use crate::Result;

/// 已建立的 RDMA 通道：QP、完成队列与连接事件流的所有者。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 数据路径（投递）与事件路径（`next_event`/`disconnect`）分属不同
///   线程是常态，二者之间只共享一个私有数据槽、一个终态标志与一个
///   远端能力位，全部以内部可变性承载，方法一律 `&self`；
/// - 连接独占一条事件通道（id 在提升时迁移进来），事件在返回调用方
///   之前完成确认，确认义务不逃逸出库。
///
/// ## 契约说明（What）
/// - 状态机主干 `Established → Closed`；观察到 `Closed` 后仅删除合法，
///   此后的 [`disconnect`](Self::disconnect) 是空操作成功；
/// - 数据路径各动词把完成标志与不透明工作请求标识透传给 Provider，
///   同一连接的并发投递不安全（单投递者纪律），但可与事件路径并发；
/// - 删除顺序：QP → 冲刷引擎 → 自有 rCQ → CQ → 自有共享通道 → id →
///   事件通道；每步都执行，首个失败作为结果返回。
pub struct Connection {
    peer: Arc<Peer>,
    id: CmIdHandle,
    cq: CompletionQueue,
    rcq: Option<CompletionQueue>,
    srq: Option<Arc<Srq>>,
    shared_ch: Option<CompChannelHandle>,
    evch: EventChannelHandle,
    flush: FlushEngine,
    pdata: Mutex<Vec<u8>>,
    closed: AtomicBool,
    direct_write_to_pmem: AtomicBool,
    released: bool,
}

impl Connection {
    /// 由已提交的部件组装连接；不做任何 Provider 调用。
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        peer: Arc<Peer>,
        id: CmIdHandle,
        cq: CompletionQueue,
        rcq: Option<CompletionQueue>,
        srq: Option<Arc<Srq>>,
        shared_ch: Option<CompChannelHandle>,
        evch: EventChannelHandle,
        flush: FlushEngine,
        pdata: Vec<u8>,
    ) -> Self {
        Self {
            peer,
            id,
            cq,
            rcq,
            srq,
            shared_ch,
            evch,
            flush,
            pdata: Mutex::new(pdata),
            closed: AtomicBool::new(false),
            direct_write_to_pmem: AtomicBool::new(false),
            released: false,
        }
    }

    fn provider(&self) -> &Arc<dyn RdmaProvider> {
        self.peer.provider()
    }

    // ---- 事件路径 ----

    /// 阻塞取回下一条连接事件。
    ///
    /// 事件在返回前被确认；`Established` 附带的入站私有数据先转移进
    /// 连接的可读槽。归属其他 id 的事件以
    /// [`FlareError::UnknownConnection`] 拒绝，未建模的事件类型以
    /// [`FlareError::UnhandledEvent`] 拒绝（两者都已确认事件）。
    pub fn next_event(&self) -> Result<ConnectionEvent> {
        let event = self
            .provider()
            .get_cm_event(self.evch)
            .map_err(map_wait_no_event)?;
        if event.id != self.id {
            self.ack_logged(event.handle);
            return Err(FlareError::UnknownConnection);
        }
        let mapped = match event.kind {
            CmEventKind::Established => {
                if !event.private_data.is_empty() {
                    let mut slot = self.pdata.lock().unwrap_or_else(|e| e.into_inner());
                    *slot = event.private_data.clone();
                }
                ConnectionEvent::Established
            }
            CmEventKind::Disconnected => ConnectionEvent::Closed,
            CmEventKind::ConnectError | CmEventKind::DeviceRemoval => ConnectionEvent::Lost,
            CmEventKind::Rejected => ConnectionEvent::Rejected,
            CmEventKind::Unreachable | CmEventKind::AddrError | CmEventKind::RouteError => {
                ConnectionEvent::Unreachable
            }
            _ => {
                self.ack_logged(event.handle);
                return Err(FlareError::UnhandledEvent);
            }
        };
        self.provider().ack_cm_event(event.handle)?;
        if mapped == ConnectionEvent::Closed {
            self.closed.store(true, Ordering::Release);
        }
        Ok(mapped)
    }

    fn ack_logged(&self, handle: flare_verbs::CmEventHandle) {
        if let Err(err) = self.provider().ack_cm_event(handle) {
            tracing::warn!(error = %err, "cm event ack failed");
        }
    }

    /// 当前可读的私有数据：入站请求捕获的，或 `Established` 转移进来的。
    pub fn private_data(&self) -> Vec<u8> {
        self.pdata
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 断开连接。观察到 `Closed` 之后调用是空操作成功。
    pub fn disconnect(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.provider()
            .disconnect(self.id)
            .map_err(FlareError::from)
    }

    /// 采纳远端对等体声明的能力集。
    ///
    /// 当前唯一的能力位影响软件冲刷在投递时对持久性语义的放行。
    pub fn apply_remote_peer_cfg(&self, cfg: &RemotePeerConfig) {
        self.direct_write_to_pmem
            .store(cfg.direct_write_to_pmem(), Ordering::Release);
    }

    // ---- 访问器 ----

    /// 主完成队列。
    pub fn cq(&self) -> &CompletionQueue {
        &self.cq
    }

    /// 接收完成队列：自有的，或借自绑定 SRQ 的；可能不存在。
    pub fn rcq(&self) -> Option<&CompletionQueue> {
        self.rcq
            .as_ref()
            .or_else(|| self.srq.as_ref().and_then(|srq| srq.rcq()))
    }

    /// 连接事件通道的文件描述符，供外部有界轮询。
    pub fn event_fd(&self) -> RawFd {
        self.provider().event_channel_fd(self.evch)
    }

    /// 共享完成通道的文件描述符。
    ///
    /// 连接未配置共享通道时返回 [`FlareError::NotSharedChannel`]。
    pub fn completion_fd(&self) -> Result<RawFd> {
        let ch = self.shared_ch.ok_or(FlareError::NotSharedChannel)?;
        Ok(self.provider().comp_channel_fd(ch))
    }

    /// 在共享完成通道上等待，返回命中的 CQ 及其是否为接收 CQ。
    ///
    /// 命中的 CQ 在返回前完成确认并重新武装。连接未配置共享通道时
    /// 返回 [`FlareError::NotSharedChannel`]。
    pub fn wait(&self) -> Result<(&CompletionQueue, bool)> {
        let ch = self.shared_ch.ok_or(FlareError::NotSharedChannel)?;
        let fired = self
            .provider()
            .get_cq_event(ch)
            .map_err(map_wait_no_completion)?;
        if fired == self.cq.handle() {
            self.cq.ack_and_rearm()?;
            return Ok((&self.cq, false));
        }
        if let Some(rcq) = &self.rcq
            && fired == rcq.handle()
        {
            rcq.ack_and_rearm()?;
            return Ok((rcq, true));
        }
        Err(FlareError::Unknown)
    }

    // ---- 数据路径 ----

    /// 单侧读：远端区域 → 本地区域。
    #[allow(clippy::too_many_arguments)]
    pub fn read(
        &self,
        dst: &LocalMr,
        dst_offset: u64,
        src: &RemoteMr,
        src_offset: u64,
        len: u64,
        flags: CompletionFlags,
        wr_id: u64,
    ) -> Result<()> {
        self.provider()
            .post_send(
                self.id,
                &SendRequest::Read {
                    laddr: dst.addr() + dst_offset,
                    lkey: dst.lkey(),
                    raddr: src.raddr() + src_offset,
                    rkey: src.rkey(),
                    len,
                    flags,
                    wr_id,
                },
            )
            .map_err(FlareError::from)
    }

    /// 单侧写：本地区域 → 远端区域。
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &self,
        dst: &RemoteMr,
        dst_offset: u64,
        src: &LocalMr,
        src_offset: u64,
        len: u64,
        flags: CompletionFlags,
        wr_id: u64,
    ) -> Result<()> {
        self.provider()
            .post_send(
                self.id,
                &SendRequest::Write {
                    laddr: src.addr() + src_offset,
                    lkey: src.lkey(),
                    raddr: dst.raddr() + dst_offset,
                    rkey: dst.rkey(),
                    len,
                    imm: None,
                    flags,
                    wr_id,
                },
            )
            .map_err(FlareError::from)
    }

    /// 原生原子写：8 字节负载原子落地到远端。
    ///
    /// # 错误（What）
    /// - [`FlareError::NoSupp`]：设备无原生原子写能力；
    /// - [`FlareError::Inval`]：目的偏移不是 8 字节对齐。
    pub fn atomic_write(
        &self,
        dst: &RemoteMr,
        dst_offset: u64,
        payload: &[u8; 8],
        flags: CompletionFlags,
        wr_id: u64,
    ) -> Result<()> {
        if !self.peer.atomic_write_capable() {
            return Err(FlareError::NoSupp);
        }
        if dst_offset % 8 != 0 {
            return Err(FlareError::Inval);
        }
        self.provider()
            .post_send(
                self.id,
                &SendRequest::AtomicWrite {
                    raddr: dst.raddr() + dst_offset,
                    rkey: dst.rkey(),
                    payload: *payload,
                    flags,
                    wr_id,
                },
            )
            .map_err(FlareError::from)
    }

    /// 两侧 send。`src` 为空时 `offset` 与 `len` 必须为零（零长度发送）。
    pub fn send(
        &self,
        src: Option<&LocalMr>,
        offset: u64,
        len: u64,
        flags: CompletionFlags,
        wr_id: u64,
    ) -> Result<()> {
        self.send_inner(src, offset, len, None, flags, wr_id)
    }

    /// 携带立即数的两侧 send。
    #[allow(clippy::too_many_arguments)]
    pub fn send_with_imm(
        &self,
        src: Option<&LocalMr>,
        offset: u64,
        len: u64,
        imm: u32,
        flags: CompletionFlags,
        wr_id: u64,
    ) -> Result<()> {
        self.send_inner(src, offset, len, Some(imm), flags, wr_id)
    }

    fn send_inner(
        &self,
        src: Option<&LocalMr>,
        offset: u64,
        len: u64,
        imm: Option<u32>,
        flags: CompletionFlags,
        wr_id: u64,
    ) -> Result<()> {
        let (laddr, lkey) = scatter(src, offset, len)?;
        self.provider()
            .post_send(
                self.id,
                &SendRequest::Send {
                    laddr,
                    lkey,
                    len,
                    imm,
                    flags,
                    wr_id,
                },
            )
            .map_err(FlareError::from)
    }

    /// 投递接收。`dst` 为空时 `offset` 与 `len` 必须为零（零长度接收）。
    pub fn recv(&self, dst: Option<&LocalMr>, offset: u64, len: u64, wr_id: u64) -> Result<()> {
        let (laddr, lkey) = scatter(dst, offset, len)?;
        self.provider()
            .post_recv(
                self.id,
                &RecvRequest {
                    laddr,
                    lkey,
                    len,
                    wr_id,
                },
            )
            .map_err(FlareError::from)
    }

    /// 冲刷远端区域的一段。
    ///
    /// # 错误（What）
    /// - [`FlareError::NoSupp`]：远端区域的用途位集没有对应的冲刷用途；
    ///   或软件冲刷上请求持久性语义而远端能力未声明写入直达持久介质
    ///   （后者不投递任何工作请求）。
    #[allow(clippy::too_many_arguments)]
    pub fn flush(
        &self,
        dst: &RemoteMr,
        dst_offset: u64,
        len: u64,
        flush_type: FlushType,
        flags: CompletionFlags,
        wr_id: u64,
    ) -> Result<()> {
        let required = match flush_type {
            FlushType::Visibility => MrUsage::FLUSH_VISIBILITY,
            FlushType::Persistent => MrUsage::FLUSH_PERSISTENT,
        };
        if !dst.usage().contains(required) {
            return Err(FlareError::NoSupp);
        }
        self.flush.submit(
            self.provider(),
            self.id,
            dst,
            dst_offset,
            len,
            flush_type,
            flags,
            wr_id,
            self.direct_write_to_pmem.load(Ordering::Acquire),
        )
    }

    // ---- 生命周期 ----

    fn teardown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let provider = Arc::clone(self.peer.provider());
        let mut first = Ok(());

        record_teardown(&mut first, provider.destroy_qp(self.id).map_err(Into::into));
        record_teardown(&mut first, self.flush.teardown());
        if let Some(rcq) = &mut self.rcq {
            record_teardown(&mut first, rcq.teardown());
        }
        record_teardown(&mut first, self.cq.teardown());
        if let Some(ch) = self.shared_ch.take() {
            record_teardown(
                &mut first,
                provider.destroy_comp_channel(ch).map_err(Into::into),
            );
        }
        record_teardown(&mut first, provider.destroy_cm_id(self.id).map_err(Into::into));
        record_teardown(
            &mut first,
            provider.destroy_event_channel(self.evch).map_err(Into::into),
        );
        first
    }

    /// 显式删除连接；每一步都执行，首个失败作为返回值。
    pub fn delete(mut self) -> Result<()> {
        self.teardown()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            tracing::warn!(error = %err, "connection teardown failed on drop");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("event_channel", &self.evch)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// 可选 MR 的散布参数推导；空 MR 仅允许零偏移零长度。
fn scatter(mr: Option<&LocalMr>, offset: u64, len: u64) -> Result<(u64, u32)> {
    match mr {
        Some(mr) => Ok((mr.addr() + offset, mr.lkey())),
        None => {
            if offset != 0 || len != 0 {
                return Err(FlareError::Inval);
            }
            Ok((0, 0))
        }
    }
}

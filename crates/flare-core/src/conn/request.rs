use std::mem;
use std::sync::Arc;

use flare_verbs::{
    CmEvent, CmEventHandle, CmEventKind, CmIdHandle, CompChannelHandle, RdmaProvider,
};

use crate::config::ConnectionConfig;
use crate::conn::Connection;
use crate::cq::CompletionQueue;
use crate::error::{record_teardown, FlareError};
use crate::flush::FlushEngine;
use crate::guard::{CmIdGuard, CompChannelGuard, EventChannelGuard, QpGuard};
use crate::peer::Peer;
use crate::srq::Srq;
use crate::Result;

enum RequestKind {
    Outgoing,
    Incoming { event: CmEvent },
}

/// 半成品连接：出站（地址/路由已解析）或入站（监听事件捕获）。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 建连是库里资源获取最密集的路径（CM id、完成通道、一到两条 CQ、QP、
///   冲刷引擎），任何一步失败都必须按获取的逆序回收；构造中以作用域
///   守卫承载释放责任，`?` 返回即得到逆序回收，提交后守卫解除武装；
/// - 请求被 [`connect`](Self::connect) 按值消耗：成功或失败之后调用方
///   手里都不再有请求，这由移动语义在编译期保证。
///
/// ## 契约说明（What）
/// - 出站：[`new`](Self::new) 解析地址与路由、建 CQ/QP/冲刷引擎；
/// - 入站：[`from_cm_event`](Self::from_cm_event) 针对 `ConnectRequest`
///   事件的 id 建同样的数据路径并捕获私有数据，不做地址/路由解析；
/// - 未经连接直接丢弃或显式 [`delete`](Self::delete)：出站销毁 id，
///   入站拒绝 id 并确认事件；各步失败不阻止后续步骤，首个失败作为
///   返回值，其余经 `tracing` 告警。
pub struct ConnectionRequest {
    peer: Arc<Peer>,
    kind: Option<RequestKind>,
    id: CmIdHandle,
    cq: Option<CompletionQueue>,
    rcq: Option<CompletionQueue>,
    srq: Option<Arc<Srq>>,
    shared_ch: Option<CompChannelHandle>,
    flush: Option<FlushEngine>,
    pdata: Vec<u8>,
    consumed: bool,
}

type DataPathParts = (
    Option<CompChannelHandle>,
    CompletionQueue,
    Option<CompletionQueue>,
    FlushEngine,
);

impl ConnectionRequest {
    /// 发起出站连接请求。
    ///
    /// 步骤：配置校验 → CM id → 地址解析 → 路由解析 → 完成通道/CQ →
    /// QP → 冲刷引擎。任一步失败触发严格逆序回收，首要错误原样返回。
    pub fn new(
        peer: &Arc<Peer>,
        addr: &str,
        port: &str,
        cfg: &ConnectionConfig,
    ) -> Result<Self> {
        cfg.validate()?;
        let provider = Arc::clone(peer.provider());
        let id = CmIdGuard::new(&provider, provider.create_cm_id(None)?);
        provider.resolve_addr(id.id(), addr, port, cfg.timeout_ms())?;
        provider.resolve_route(id.id(), cfg.timeout_ms())?;
        let (shared_ch, cq, rcq, flush) = Self::build_data_path(peer, &provider, id.id(), cfg)?;
        Ok(Self {
            peer: Arc::clone(peer),
            kind: Some(RequestKind::Outgoing),
            id: id.commit(),
            cq: Some(cq),
            rcq,
            srq: cfg.srq().cloned(),
            shared_ch,
            flush: Some(flush),
            pdata: Vec::new(),
            consumed: false,
        })
    }

    /// 从监听端取回的 CM 事件构造入站连接请求。
    ///
    /// 事件类型必须是 `ConnectRequest`，否则在触碰任何资源之前以
    /// [`FlareError::Inval`] 拒绝。事件的所有权随调用转移：构造失败时
    /// 入站 id 被拒绝、事件被确认。
    pub fn from_cm_event(
        peer: &Arc<Peer>,
        event: CmEvent,
        cfg: &ConnectionConfig,
    ) -> Result<Self> {
        if event.kind != CmEventKind::ConnectRequest {
            return Err(FlareError::Inval);
        }
        cfg.validate()?;
        let provider = Arc::clone(peer.provider());
        match Self::build_data_path(peer, &provider, event.id, cfg) {
            Ok((shared_ch, cq, rcq, flush)) => Ok(Self {
                peer: Arc::clone(peer),
                id: event.id,
                pdata: event.private_data.clone(),
                kind: Some(RequestKind::Incoming { event }),
                cq: Some(cq),
                rcq,
                srq: cfg.srq().cloned(),
                shared_ch,
                flush: Some(flush),
                consumed: false,
            }),
            Err(err) => {
                // 入站 id 不会再被提升，就地收回。
                if let Err(secondary) = provider.reject(event.id) {
                    tracing::warn!(error = %secondary, "incoming id reject failed while unwinding");
                }
                ack_event_logged(&provider, event.handle);
                Err(err)
            }
        }
    }

    /// 入站事件捕获的私有数据；出站请求为空。
    pub fn private_data(&self) -> &[u8] {
        &self.pdata
    }

    /// 完成通道/CQ/QP/冲刷引擎的公共构造段。
    ///
    /// 守卫与包装对象按声明序获取，失败时按逆序析构回收。
    fn build_data_path(
        peer: &Arc<Peer>,
        provider: &Arc<dyn RdmaProvider>,
        id: CmIdHandle,
        cfg: &ConnectionConfig,
    ) -> Result<DataPathParts> {
        let shared_guard = if cfg.shared_comp_channel() {
            Some(CompChannelGuard::new(
                provider,
                provider.create_comp_channel(peer.dev())?,
            ))
        } else {
            None
        };
        let shared_handle = shared_guard.as_ref().map(|g| g.ch());

        let cq = CompletionQueue::new(
            Arc::clone(provider),
            peer.dev(),
            cfg.cq_size(),
            shared_handle,
        )?;
        let rcq = match cfg.srq() {
            Some(srq) if srq.rcq().is_some() => None,
            _ if cfg.rcq_size() > 0 => Some(CompletionQueue::new(
                Arc::clone(provider),
                peer.dev(),
                cfg.rcq_size(),
                shared_handle,
            )?),
            _ => None,
        };

        let recv_cq = cfg
            .srq()
            .and_then(|srq| srq.rcq())
            .map(CompletionQueue::handle)
            .or_else(|| rcq.as_ref().map(CompletionQueue::handle));
        peer.setup_qp(id, cq.handle(), recv_cq, cfg.srq().map(|s| s.handle()), cfg)?;
        let qp = QpGuard::new(provider, id);

        let flush = FlushEngine::new(peer)?;

        qp.commit();
        Ok((shared_guard.map(CompChannelGuard::commit), cq, rcq, flush))
    }

    /// 把请求提升为连接，消耗请求本身。
    ///
    /// # 契约说明（What）
    /// - `pdata` 为 `Some(&[])` 是非法参数；`None` 表示不携带私有数据；
    /// - 入站：`accept` → 新事件通道并迁移 id → 组装连接 → 最后确认
    ///   原始事件；出站：新事件通道并迁移 id → `connect` → 组装连接；
    /// - 失败路径销毁半成品连接、rCQ、CQ 与 id；成功与否请求都已被
    ///   消耗（移动语义）。
    pub fn connect(mut self, pdata: Option<&[u8]>) -> Result<Connection> {
        if let Some(bytes) = pdata
            && bytes.is_empty()
        {
            return Err(FlareError::Inval);
        }
        let bytes = pdata.unwrap_or(&[]);

        self.consumed = true;
        let provider = Arc::clone(self.peer.provider());
        let peer = Arc::clone(&self.peer);
        let srq = self.srq.take();
        let pdata_slot = mem::take(&mut self.pdata);
        let kind = match self.kind.take() {
            Some(kind) => kind,
            None => return Err(FlareError::Unknown),
        };

        // 声明序决定失败时的回收序：QP → 冲刷 → rCQ → CQ → 共享通道 →
        // id → 事件通道。事件通道虽然最后创建，也必须在 id 之后销毁，
        // 因此槽位先于 id 守卫声明。
        let mut evch_slot: Option<EventChannelGuard<'_>> = None;
        let id_guard = CmIdGuard::new(&provider, self.id);
        let shared_guard = self
            .shared_ch
            .take()
            .map(|ch| CompChannelGuard::new(&provider, ch));
        let cq = match self.cq.take() {
            Some(cq) => cq,
            None => return Err(FlareError::Unknown),
        };
        let rcq = self.rcq.take();
        let flush = match self.flush.take() {
            Some(flush) => flush,
            None => return Err(FlareError::Unknown),
        };
        let qp_guard = QpGuard::new(&provider, self.id);

        match kind {
            RequestKind::Incoming { event } => {
                if let Err(err) = provider.accept(self.id, bytes) {
                    let primary = FlareError::from(err);
                    ack_event_logged(&provider, event.handle);
                    return Err(primary);
                }
                let ch = match provider.create_event_channel() {
                    Ok(ch) => ch,
                    Err(err) => {
                        let primary = FlareError::from(err);
                        ack_event_logged(&provider, event.handle);
                        return Err(primary);
                    }
                };
                evch_slot = Some(EventChannelGuard::new(&provider, ch));
                if let Err(err) = provider.migrate_id(self.id, ch) {
                    let primary = FlareError::from(err);
                    ack_event_logged(&provider, event.handle);
                    return Err(primary);
                }

                qp_guard.commit();
                let evch = match evch_slot.take() {
                    Some(guard) => guard.commit(),
                    None => return Err(FlareError::Unknown),
                };
                let conn = Connection::assemble(
                    peer,
                    id_guard.commit(),
                    cq,
                    rcq,
                    srq,
                    shared_guard.map(CompChannelGuard::commit),
                    evch,
                    flush,
                    pdata_slot,
                );
                if let Err(err) = provider.ack_cm_event(event.handle) {
                    let primary = FlareError::from(err);
                    if let Err(secondary) = conn.delete() {
                        tracing::warn!(error = %secondary, "connection teardown failed while unwinding");
                    }
                    return Err(primary);
                }
                Ok(conn)
            }
            RequestKind::Outgoing => {
                let ch = provider.create_event_channel()?;
                evch_slot = Some(EventChannelGuard::new(&provider, ch));
                provider.migrate_id(self.id, ch)?;
                provider.connect(self.id, bytes)?;

                qp_guard.commit();
                let evch = match evch_slot.take() {
                    Some(guard) => guard.commit(),
                    None => return Err(FlareError::Unknown),
                };
                Ok(Connection::assemble(
                    peer,
                    id_guard.commit(),
                    cq,
                    rcq,
                    srq,
                    shared_guard.map(CompChannelGuard::commit),
                    evch,
                    flush,
                    pdata_slot,
                ))
            }
        }
    }

    /// 不建连，直接销毁请求。
    ///
    /// 各步失败不阻止后续步骤；首个失败作为返回值。
    pub fn delete(mut self) -> Result<()> {
        self.delete_inner()
    }

    fn delete_inner(&mut self) -> Result<()> {
        if self.consumed {
            return Ok(());
        }
        self.consumed = true;
        let provider = Arc::clone(self.peer.provider());
        let mut first = Ok(());

        record_teardown(&mut first, provider.destroy_qp(self.id).map_err(Into::into));
        if let Some(flush) = &mut self.flush {
            record_teardown(&mut first, flush.teardown());
        }
        if let Some(rcq) = &mut self.rcq {
            record_teardown(&mut first, rcq.teardown());
        }
        if let Some(cq) = &mut self.cq {
            record_teardown(&mut first, cq.teardown());
        }
        if let Some(ch) = self.shared_ch.take() {
            record_teardown(
                &mut first,
                provider.destroy_comp_channel(ch).map_err(Into::into),
            );
        }
        match self.kind.take() {
            Some(RequestKind::Incoming { event }) => {
                record_teardown(&mut first, provider.reject(self.id).map_err(Into::into));
                record_teardown(
                    &mut first,
                    provider.ack_cm_event(event.handle).map_err(Into::into),
                );
            }
            Some(RequestKind::Outgoing) | None => {
                record_teardown(&mut first, provider.destroy_cm_id(self.id).map_err(Into::into));
            }
        }
        first
    }
}

impl Drop for ConnectionRequest {
    fn drop(&mut self) {
        if let Err(err) = self.delete_inner() {
            tracing::warn!(error = %err, "connection request teardown failed on drop");
        }
    }
}

impl std::fmt::Debug for ConnectionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            Some(RequestKind::Outgoing) => "outgoing",
            Some(RequestKind::Incoming { .. }) => "incoming",
            None => "consumed",
        };
        f.debug_struct("ConnectionRequest")
            .field("id", &self.id)
            .field("kind", &kind)
            .field("private_data_len", &self.pdata.len())
            .finish()
    }
}

fn ack_event_logged(provider: &Arc<dyn RdmaProvider>, ev: CmEventHandle) {
    if let Err(err) = provider.ack_cm_event(ev) {
        tracing::warn!(error = %err, "cm event ack failed while unwinding");
    }
}

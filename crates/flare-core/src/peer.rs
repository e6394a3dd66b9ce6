use std::sync::Arc;

use flare_verbs::{
    AccessFlags, CmIdHandle, CqHandle, DeviceCaps, DeviceHandle, MrReg, PdHandle, QpConfig,
    RdmaProvider, SrqHandle, TransportType,
};

use crate::config::{ConnectionConfig, SrqConfig};
use crate::cq::CompletionQueue;
use crate::error::FlareError;
use crate::mr::MrUsage;
use crate::Result;

/// 设备上下文与保护域的所有者，库内一切派生资源的工厂。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 访问掩码推导与 QP 初始化属性都取决于设备能力（ODP、原生原子写、
///   原生冲刷、传输类型），这些能力必须在构造时一次性探测并缓存，
///   此后整个生命周期不再询问 Provider；
/// - 派生对象（MR、QP、SRQ、连接）统一持有 `Arc<Peer>`：保护域先于
///   依赖者释放在结构上不可能发生，热路径也无需回查。
///
/// ## 契约说明（What）
/// - 构造后不可变，可跨线程自由共享；
/// - 保护域随最后一个 `Arc` 释放，失败经 `tracing` 告警。
pub struct Peer {
    provider: Arc<dyn RdmaProvider>,
    dev: DeviceHandle,
    pd: PdHandle,
    caps: DeviceCaps,
}

impl Peer {
    /// 在给定设备上创建 Peer：先探测能力，再分配保护域。
    pub fn new(provider: Arc<dyn RdmaProvider>, dev: DeviceHandle) -> Result<Arc<Self>> {
        let caps = provider.query_device(dev)?;
        let pd = provider.alloc_pd(dev)?;
        Ok(Arc::new(Self {
            provider,
            dev,
            pd,
            caps,
        }))
    }

    /// 把文本地址解析为设备上下文并在其上创建 Peer。
    ///
    /// 这是库执行的唯一一种"发现"：更复杂的路由与寻址是非目标。
    pub fn resolve(provider: Arc<dyn RdmaProvider>, addr: &str) -> Result<Arc<Self>> {
        let dev = provider.resolve_device(addr)?;
        Self::new(provider, dev)
    }

    /// 设备是否支持按需分页。
    pub fn odp_capable(&self) -> bool {
        self.caps.odp
    }

    /// 设备是否支持原生原子写动词。
    pub fn atomic_write_capable(&self) -> bool {
        self.caps.atomic_write
    }

    /// 设备是否支持原生冲刷动词。
    pub fn native_flush_capable(&self) -> bool {
        self.caps.native_flush
    }

    /// 设备的传输类型。
    pub fn transport(&self) -> TransportType {
        self.caps.transport
    }

    pub(crate) fn provider(&self) -> &Arc<dyn RdmaProvider> {
        &self.provider
    }

    pub(crate) fn dev(&self) -> DeviceHandle {
        self.dev
    }

    /// 用途位集到 Provider 访问掩码的确定性推导。
    ///
    /// iWARP 的读目的地还需要远程写权限，这是传输层的怪癖而不是本库的
    /// 选择；传输类型在构造时缓存，在此兑现。
    pub(crate) fn access_for(&self, usage: MrUsage) -> AccessFlags {
        let mut access = AccessFlags::empty();
        if usage.intersects(
            MrUsage::READ_DST
                | MrUsage::WRITE_SRC
                | MrUsage::RECV
                | MrUsage::FLUSH_VISIBILITY
                | MrUsage::FLUSH_PERSISTENT,
        ) {
            access |= AccessFlags::LOCAL_WRITE;
        }
        if usage.contains(MrUsage::READ_SRC) {
            access |= AccessFlags::REMOTE_READ;
        }
        if usage.contains(MrUsage::WRITE_DST) {
            access |= AccessFlags::REMOTE_WRITE | AccessFlags::LOCAL_WRITE;
        }
        if self.caps.transport == TransportType::Iwarp && usage.contains(MrUsage::READ_DST) {
            access |= AccessFlags::REMOTE_WRITE;
        }
        access
    }

    /// 注册内存区域，带 ODP 回退。
    ///
    /// Provider 以 `EOPNOTSUPP` 拒绝且设备声明 ODP 时，恰好重试一次，
    /// 仅追加 `ON_DEMAND` 标志；无 ODP 能力则拒绝即终局。
    pub(crate) fn setup_mr_reg(&self, addr: u64, len: u64, usage: MrUsage) -> Result<MrReg> {
        let access = self.access_for(usage);
        match self.provider.reg_mr(self.pd, addr, len, access) {
            Ok(reg) => Ok(reg),
            Err(err) if err.errno == libc::EOPNOTSUPP && self.caps.odp => self
                .provider
                .reg_mr(self.pd, addr, len, access | AccessFlags::ON_DEMAND)
                .map_err(FlareError::from),
            Err(err) => Err(err.into()),
        }
    }

    /// 在 CM id 上创建 QP。
    ///
    /// 接收完成落点由调用方决定（私有 rCQ、SRQ 的 rCQ 或主 CQ）；设备
    /// 声明原生原子写时在发送操作集中申请它。
    pub(crate) fn setup_qp(
        &self,
        id: CmIdHandle,
        cq: CqHandle,
        rcq: Option<CqHandle>,
        srq: Option<SrqHandle>,
        cfg: &ConnectionConfig,
    ) -> Result<()> {
        let qp_cfg = QpConfig {
            send_cq: cq,
            recv_cq: rcq.unwrap_or(cq),
            srq,
            sq_size: cfg.sq_size(),
            rq_size: cfg.rq_size(),
            atomic_write: self.caps.atomic_write,
        };
        self.provider
            .create_qp(id, self.pd, &qp_cfg)
            .map_err(FlareError::from)
    }

    /// 创建 Provider SRQ 与（可选的）私有接收 CQ。
    pub(crate) fn create_srq_parts(
        &self,
        cfg: &SrqConfig,
    ) -> Result<(SrqHandle, Option<CompletionQueue>)> {
        let srq = self.provider.create_srq(self.pd, cfg.rq_size())?;
        if cfg.rcq_size() == 0 {
            return Ok((srq, None));
        }
        match CompletionQueue::new(Arc::clone(&self.provider), self.dev, cfg.rcq_size(), None) {
            Ok(rcq) => Ok((srq, Some(rcq))),
            Err(err) => {
                if let Err(secondary) = self.provider.destroy_srq(srq) {
                    tracing::warn!(error = %secondary, "srq teardown failed while unwinding");
                }
                Err(err)
            }
        }
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        if let Err(err) = self.provider.dealloc_pd(self.pd) {
            tracing::warn!(error = %err, "protection domain release failed on drop");
        }
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("dev", &self.dev)
            .field("pd", &self.pd)
            .field("caps", &self.caps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flare_verbs::test_stubs::MockProvider;

    fn peer_on(provider: &Arc<MockProvider>, caps: DeviceCaps) -> Arc<Peer> {
        let dev = provider.add_device(caps);
        Peer::new(Arc::clone(provider) as Arc<dyn RdmaProvider>, dev).expect("peer construction")
    }

    fn ib_peer(provider: &Arc<MockProvider>) -> Arc<Peer> {
        peer_on(provider, DeviceCaps::default())
    }

    fn iwarp_peer(provider: &Arc<MockProvider>) -> Arc<Peer> {
        peer_on(
            provider,
            DeviceCaps {
                transport: TransportType::Iwarp,
                ..DeviceCaps::default()
            },
        )
    }

    #[test]
    fn usage_to_access_mapping_non_iwarp() {
        let provider = Arc::new(MockProvider::new());
        let peer = ib_peer(&provider);
        let cases = [
            (MrUsage::READ_SRC, AccessFlags::REMOTE_READ),
            (MrUsage::READ_DST, AccessFlags::LOCAL_WRITE),
            (MrUsage::WRITE_SRC, AccessFlags::LOCAL_WRITE),
            (
                MrUsage::WRITE_DST,
                AccessFlags::LOCAL_WRITE | AccessFlags::REMOTE_WRITE,
            ),
            (MrUsage::RECV, AccessFlags::LOCAL_WRITE),
            (MrUsage::SEND, AccessFlags::empty()),
            (MrUsage::FLUSH_VISIBILITY, AccessFlags::LOCAL_WRITE),
            (MrUsage::FLUSH_PERSISTENT, AccessFlags::LOCAL_WRITE),
        ];
        for (usage, expected) in cases {
            assert_eq!(peer.access_for(usage), expected, "usage {usage:?}");
        }
    }

    #[test]
    fn usage_to_access_mapping_iwarp() {
        let provider = Arc::new(MockProvider::new());
        let peer = iwarp_peer(&provider);
        // 只有读目的地受 iWARP 怪癖影响。
        assert_eq!(
            peer.access_for(MrUsage::READ_DST),
            AccessFlags::LOCAL_WRITE | AccessFlags::REMOTE_WRITE
        );
        assert_eq!(peer.access_for(MrUsage::READ_SRC), AccessFlags::REMOTE_READ);
        assert_eq!(peer.access_for(MrUsage::WRITE_SRC), AccessFlags::LOCAL_WRITE);
        assert_eq!(
            peer.access_for(MrUsage::WRITE_DST),
            AccessFlags::LOCAL_WRITE | AccessFlags::REMOTE_WRITE
        );
        assert_eq!(peer.access_for(MrUsage::RECV), AccessFlags::LOCAL_WRITE);
    }

    #[test]
    fn odp_fallback_retries_once_and_preserves_mask() {
        let provider = Arc::new(MockProvider::new());
        let peer = peer_on(
            &provider,
            DeviceCaps {
                odp: true,
                ..DeviceCaps::default()
            },
        );
        provider.fail("reg_mr", libc::EOPNOTSUPP);

        peer.setup_mr_reg(0x1000, 64, MrUsage::WRITE_DST)
            .expect("odp retry should succeed");

        assert_eq!(provider.calls("reg_mr"), 2);
        let log = provider.reg_mr_access_log();
        let base = AccessFlags::LOCAL_WRITE | AccessFlags::REMOTE_WRITE;
        assert_eq!(log, vec![base, base | AccessFlags::ON_DEMAND]);
    }

    #[test]
    fn no_odp_capability_means_no_retry() {
        let provider = Arc::new(MockProvider::new());
        let peer = ib_peer(&provider);
        provider.fail("reg_mr", libc::EOPNOTSUPP);

        let err = peer
            .setup_mr_reg(0x1000, 64, MrUsage::READ_SRC)
            .expect_err("refusal is final without odp");
        assert_eq!(
            err,
            FlareError::Provider {
                op: "reg_mr",
                errno: libc::EOPNOTSUPP
            }
        );
        assert_eq!(provider.calls("reg_mr"), 1);
    }

    #[test]
    fn enomem_registration_collapses_to_nomem() {
        let provider = Arc::new(MockProvider::new());
        let peer = ib_peer(&provider);
        provider.fail("reg_mr", libc::ENOMEM);

        let err = peer
            .setup_mr_reg(0x1000, 64, MrUsage::READ_SRC)
            .expect_err("injected ENOMEM");
        assert_eq!(err, FlareError::NoMem);
    }

    #[test]
    fn resolve_builds_a_peer_from_a_textual_address() {
        let provider = Arc::new(MockProvider::new());
        let _dev = provider.add_device_at("10.0.0.9", DeviceCaps::default());
        let peer = Peer::resolve(Arc::clone(&provider) as Arc<dyn RdmaProvider>, "10.0.0.9")
            .expect("resolve by address");
        assert_eq!(provider.calls("resolve_device"), 1);
        drop(peer);
        assert_eq!(provider.outstanding(), 0);
    }

    #[test]
    fn capabilities_are_cached_at_construction() {
        let provider = Arc::new(MockProvider::new());
        let peer = peer_on(
            &provider,
            DeviceCaps {
                odp: true,
                atomic_write: true,
                native_flush: true,
                transport: TransportType::Iwarp,
            },
        );
        assert!(peer.odp_capable());
        assert!(peer.atomic_write_capable());
        assert!(peer.native_flush_capable());
        assert_eq!(peer.transport(), TransportType::Iwarp);
        assert_eq!(provider.calls("query_device"), 1);
    }
}

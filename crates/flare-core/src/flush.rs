use std::io;
use std::ptr;
use std::sync::Arc;

use flare_verbs::{CmIdHandle, CompletionFlags, FlushLevel, RdmaProvider, SendRequest};

use crate::error::{record_teardown, FlareError};
use crate::mr::{LocalMr, MrUsage};
use crate::peer::Peer;
use crate::RemoteMr;
use crate::Result;

/// 冲刷语义。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushType {
    /// 可见性：先行写入对后续远程读可见。
    Visibility,
    /// 持久性：先行写入已落到目标的非易失介质。
    Persistent,
}

/// 软件模拟冲刷的回读缓冲长度（字节）。
const BOUNCE_LEN: u64 = 8;

/// 按页对齐的私有匿名映射，承载软件冲刷的回读缓冲。
///
/// 单独建一整页映射而不是从堆上切，保证缓冲不与任何调用方数据同页。
struct BounceBuffer {
    addr: u64,
    map_len: usize,
    released: bool,
}

impl BounceBuffer {
    fn map() -> Result<Self> {
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page <= 0 {
            let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(FlareError::Provider {
                op: "sysconf",
                errno,
            });
        }
        let map_len = page as usize;
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(FlareError::NoMem);
        }
        Ok(Self {
            addr: ptr as usize as u64,
            map_len,
            released: false,
        })
    }

    fn addr(&self) -> u64 {
        self.addr
    }

    fn unmap(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let rc = unsafe { libc::munmap(self.addr as usize as *mut libc::c_void, self.map_len) };
        if rc != 0 {
            return Err(FlareError::Inval);
        }
        Ok(())
    }
}

impl Drop for BounceBuffer {
    fn drop(&mut self) {
        if let Err(err) = self.unmap() {
            tracing::warn!(error = %err, "bounce buffer unmap failed on drop");
        }
    }
}

/// 软件模拟的冲刷实现。
///
/// 向目标地址发一条长度为零、落入回读缓冲的单侧读：远端适配器必须先
/// 排干先行写入才能应答读，由此得到冲刷语义。
pub(crate) struct ApmFlush {
    mr: LocalMr,
    raw: BounceBuffer,
}

/// 连接携带的冲刷资源，按 Peer 能力在连接请求构造时二选一。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 原生 FLUSH 动词与软件模拟（回读法）互斥且在握手后不再改变，
///   以带标签变体而不是函数指针承载选择，公开类型不暴露实现细节；
/// - 软件实现的回读缓冲与其注册随引擎同生同灭：连接请求失败时随请求
///   回收，连接删除时随连接回收。
///
/// ## 契约说明（What）
/// - 软件实现上，持久性冲刷仅在连接采纳的远端能力声明"写入直达持久
///   介质"后才被允许，否则以 [`FlareError::NoSupp`] 拒绝且不投递任何
///   工作请求；可见性冲刷总是允许；
/// - 原生实现无条件使用原生动词，两种语义分别映射为 Global/Persistent
///   级别。
pub(crate) enum FlushEngine {
    Native,
    Apm(ApmFlush),
}

impl FlushEngine {
    /// 按 Peer 的原生冲刷能力选择实现。
    pub(crate) fn new(peer: &Arc<Peer>) -> Result<Self> {
        if peer.native_flush_capable() {
            return Ok(Self::Native);
        }
        let raw = BounceBuffer::map()?;
        let mr = LocalMr::reg(peer, raw.addr(), BOUNCE_LEN, MrUsage::READ_DST)?;
        Ok(Self::Apm(ApmFlush { mr, raw }))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn submit(
        &self,
        provider: &Arc<dyn RdmaProvider>,
        id: CmIdHandle,
        dst: &RemoteMr,
        dst_offset: u64,
        len: u64,
        flush_type: FlushType,
        flags: CompletionFlags,
        wr_id: u64,
        direct_write_to_pmem: bool,
    ) -> Result<()> {
        match self {
            Self::Native => {
                let level = match flush_type {
                    FlushType::Visibility => FlushLevel::Global,
                    FlushType::Persistent => FlushLevel::Persistent,
                };
                provider
                    .post_send(
                        id,
                        &SendRequest::Flush {
                            raddr: dst.raddr() + dst_offset,
                            rkey: dst.rkey(),
                            len,
                            level,
                            flags,
                            wr_id,
                        },
                    )
                    .map_err(FlareError::from)
            }
            Self::Apm(apm) => {
                if flush_type == FlushType::Persistent && !direct_write_to_pmem {
                    return Err(FlareError::NoSupp);
                }
                provider
                    .post_send(
                        id,
                        &SendRequest::Read {
                            laddr: apm.mr.addr(),
                            lkey: apm.mr.lkey(),
                            raddr: dst.raddr() + dst_offset,
                            rkey: dst.rkey(),
                            len: 0,
                            flags,
                            wr_id,
                        },
                    )
                    .map_err(FlareError::from)
            }
        }
    }

    pub(crate) fn teardown(&mut self) -> Result<()> {
        match self {
            Self::Native => Ok(()),
            Self::Apm(apm) => {
                let mut first = Ok(());
                record_teardown(&mut first, apm.mr.teardown());
                record_teardown(&mut first, apm.raw.unmap());
                first
            }
        }
    }
}

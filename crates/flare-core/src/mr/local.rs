use std::sync::Arc;

use crate::error::FlareError;
use crate::mr::{MrDescriptor, MrUsage};
use crate::peer::Peer;
use crate::Result;

/// 已注册、可直接使用的本地内存区域。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 注册产物以单一所有者包装承载：作用域结束自动注销，错误路径无需
///   手工回滚；
/// - 持有 `Arc<Peer>`，保证保护域先于任何存活的注册被释放在结构上不可能。
///
/// ## 契约说明（What）
/// - 注册后不可变；描述符可被任意多个线程并发导出；
/// - 调用方必须保证缓冲区本身存活到引用它的在途工作请求全部完成；
/// - [`delete`](Self::delete) 显式注销并上报失败；直接丢弃则尽力注销，
///   失败经 `tracing` 告警。
pub struct LocalMr {
    peer: Arc<Peer>,
    mr: flare_verbs::MrHandle,
    lkey: u32,
    rkey: u32,
    addr: u64,
    len: u64,
    usage: MrUsage,
    released: bool,
}

impl LocalMr {
    /// 注册一块本地缓冲。
    ///
    /// 长度为零或用途为空在任何 Provider 调用之前以
    /// [`FlareError::Inval`] 拒绝。
    pub fn reg(peer: &Arc<Peer>, addr: u64, len: u64, usage: MrUsage) -> Result<Self> {
        if len == 0 || usage.is_empty() {
            return Err(FlareError::Inval);
        }
        let reg = peer.setup_mr_reg(addr, len, usage)?;
        Ok(Self {
            peer: Arc::clone(peer),
            mr: reg.mr,
            lkey: reg.lkey,
            rkey: reg.rkey,
            addr,
            len,
            usage,
            released: false,
        })
    }

    /// 区域起始地址。
    pub fn addr(&self) -> u64 {
        self.addr
    }

    /// 区域长度（字节）。
    pub fn len(&self) -> u64 {
        self.len
    }

    /// 区域长度是否为零（注册拒绝零长，恒为假）。
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 注册时声明的用途位集。
    pub fn usage(&self) -> MrUsage {
        self.usage
    }

    /// 导出线缆描述符。
    pub fn descriptor(&self) -> MrDescriptor {
        MrDescriptor::encode(self.addr, self.len, self.rkey, self.usage)
    }

    pub(crate) fn lkey(&self) -> u32 {
        self.lkey
    }

    pub(crate) fn teardown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.peer
            .provider()
            .dereg_mr(self.mr)
            .map_err(FlareError::from)
    }

    /// 显式注销；失败作为返回值上报。
    pub fn delete(mut self) -> Result<()> {
        self.teardown()
    }
}

impl Drop for LocalMr {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            tracing::warn!(error = %err, "memory region deregistration failed on drop");
        }
    }
}

impl std::fmt::Debug for LocalMr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMr")
            .field("addr", &self.addr)
            .field("len", &self.len)
            .field("usage", &self.usage)
            .field("lkey", &self.lkey)
            .field("rkey", &self.rkey)
            .finish()
    }
}

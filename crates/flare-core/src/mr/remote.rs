use crate::error::FlareError;
use crate::mr::descriptor;
use crate::mr::MrUsage;
use crate::Result;

/// 远端内存区域句柄。
///
/// # 契约说明（What）
/// - 由线缆描述符反序列化而来，纯数据：不持有任何 Provider 资源，
///   生命周期只与使用它的连接相关；
/// - 不可变，可跨线程自由共享。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteMr {
    raddr: u64,
    len: u64,
    rkey: u32,
    usage: MrUsage,
}

impl RemoteMr {
    /// 从线缆描述符构造。
    ///
    /// # 错误（What）
    /// - 长度不恰为 [`MR_DESCRIPTOR_SIZE`](crate::mr::MR_DESCRIPTOR_SIZE)
    ///   → [`FlareError::NoSupp`]（线缆格式不匹配，区别于参数错误）；
    /// - 用途位集含未定义位 → [`FlareError::NoSupp`]。
    pub fn from_descriptor(buf: &[u8]) -> Result<Self> {
        let (raddr, len, rkey, usage_bits) = descriptor::decode(buf)?;
        let usage = MrUsage::from_bits(usage_bits).ok_or(FlareError::NoSupp)?;
        Ok(Self {
            raddr,
            len,
            rkey,
            usage,
        })
    }

    /// 区域长度（字节）。
    pub fn len(&self) -> u64 {
        self.len
    }

    /// 区域长度是否为零。
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 对端声明的用途位集。
    pub fn usage(&self) -> MrUsage {
        self.usage
    }

    pub(crate) fn raddr(&self) -> u64 {
        self.raddr
    }

    pub(crate) fn rkey(&self) -> u32 {
        self.rkey
    }
}

use bytes::{Buf, BufMut};

use crate::error::FlareError;
use crate::mr::MrUsage;

/// 内存区域线缆描述符的固定长度（字节）。
pub const MR_DESCRIPTOR_SIZE: usize = 24;

/// [`MR_DESCRIPTOR_SIZE`] 的运行期取值器。
pub fn mr_descriptor_size() -> usize {
    MR_DESCRIPTOR_SIZE
}

/// 远端内存区域的线缆描述符。
///
/// # 契约说明（What）
/// - 固定 24 字节小端布局：`raddr u64 | len u64 | rkey u32 | usage u32`；
/// - 自包含、无需成帧；对传输不透明，发送方自行决定承载方式
///   （典型做法是塞进连接私有数据）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MrDescriptor {
    bytes: [u8; MR_DESCRIPTOR_SIZE],
}

impl MrDescriptor {
    pub(crate) fn encode(raddr: u64, len: u64, rkey: u32, usage: MrUsage) -> Self {
        let mut bytes = [0u8; MR_DESCRIPTOR_SIZE];
        let mut cursor = &mut bytes[..];
        cursor.put_u64_le(raddr);
        cursor.put_u64_le(len);
        cursor.put_u32_le(rkey);
        cursor.put_u32_le(usage.bits());
        Self { bytes }
    }

    /// 描述符的原始字节。
    pub fn as_bytes(&self) -> &[u8; MR_DESCRIPTOR_SIZE] {
        &self.bytes
    }
}

impl AsRef<[u8]> for MrDescriptor {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// 解码描述符字段。
///
/// 长度不恰为 24 视为线缆格式不匹配（`NoSupp`），与参数错误区分。
pub(crate) fn decode(buf: &[u8]) -> Result<(u64, u64, u32, u32), FlareError> {
    if buf.len() != MR_DESCRIPTOR_SIZE {
        return Err(FlareError::NoSupp);
    }
    let mut cursor = buf;
    let raddr = cursor.get_u64_le();
    let len = cursor.get_u64_le();
    let rkey = cursor.get_u32_le();
    let usage = cursor.get_u32_le();
    Ok((raddr, len, rkey, usage))
}

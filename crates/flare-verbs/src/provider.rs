use std::os::fd::RawFd;

use crate::access::AccessFlags;
use crate::caps::DeviceCaps;
use crate::cm::CmEvent;
use crate::handles::{
    CmEventHandle, CmIdHandle, CompChannelHandle, CqHandle, DeviceHandle, EventChannelHandle,
    MrHandle, PdHandle, SrqHandle,
};
use crate::wc::WorkCompletion;
use crate::wr::{RecvRequest, SendRequest};
use crate::Result;

/// 内存注册的结果：句柄加本地/远程密钥。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MrReg {
    /// MR 句柄。
    pub mr: MrHandle,
    /// 本地密钥。
    pub lkey: u32,
    /// 远程密钥。
    pub rkey: u32,
}

/// QP 初始化属性。
///
/// 接收完成落点的取舍（私有 rCQ、SRQ 的 rCQ 或主 CQ）由上层在填表前
/// 决定；Provider 只照表建队。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QpConfig {
    /// 发送方向完成落点。
    pub send_cq: CqHandle,
    /// 接收方向完成落点。
    pub recv_cq: CqHandle,
    /// 绑定的共享接收队列。
    pub srq: Option<SrqHandle>,
    /// 发送队列深度。
    pub sq_size: u32,
    /// 接收队列深度。
    pub rq_size: u32,
    /// 是否在发送操作集中申请原生原子写。
    pub atomic_write: bool,
}

/// RDMA Provider 的窄契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 连接状态机、资源编排与错误翻译是库的核心资产，必须能脱离真实
///   RNIC 验证；本契约把 Provider 依赖压缩为一组可注入的操作；
/// - 对象安全（全程 `&self`、无泛型方法），上层以 `Arc<dyn RdmaProvider>`
///   持有，句柄在各包装对象之间自由传递。
///
/// ## 契约说明（What）
/// - **句柄所有权**：本契约只发放句柄，不追踪归属；每个句柄由恰好一个
///   上层包装对象负责释放，重复释放属调用方错误；
/// - **errno**：任何失败都以 [`VerbsError`](crate::VerbsError) 返回，
///   其中 `errno` 在失败现场捕获；`EAGAIN` 在事件/完成等待上有
///   "暂无"的约定语义，由调用方翻译；
/// - **阻塞点**：`get_cq_event` 与 `get_cm_event` 是仅有的阻塞操作；
///   调用方若需要有界等待，应通过 fd 访问器把底层描述符设为非阻塞并
///   自行轮询；
/// - **投递原子性**：`post_send`/`post_recv`/`post_srq_recv` 对单条
///   请求是原子的，允许多线程对不同 QP/SRQ 并发投递。
///
/// ## 风险提示（Trade-offs）
/// - 地址解析被折叠为单个 `resolve_device`/`resolve_addr`，Provider 内部
///   自行组合 `getaddrinfo` 等步骤；中间失败统一以该操作名上报。
pub trait RdmaProvider: Send + Sync {
    // ---- 设备 ----

    /// 把文本地址解析为设备上下文。
    fn resolve_device(&self, addr: &str) -> Result<DeviceHandle>;

    /// 查询设备能力快照。
    fn query_device(&self, dev: DeviceHandle) -> Result<DeviceCaps>;

    // ---- 保护域 ----

    /// 在设备上分配保护域。
    fn alloc_pd(&self, dev: DeviceHandle) -> Result<PdHandle>;

    /// 释放保护域。
    fn dealloc_pd(&self, pd: PdHandle) -> Result<()>;

    // ---- 内存区域 ----

    /// 注册内存区域。
    fn reg_mr(&self, pd: PdHandle, addr: u64, len: u64, access: AccessFlags) -> Result<MrReg>;

    /// 注销内存区域。
    fn dereg_mr(&self, mr: MrHandle) -> Result<()>;

    // ---- 完成通道与完成队列 ----

    /// 创建完成通道。
    fn create_comp_channel(&self, dev: DeviceHandle) -> Result<CompChannelHandle>;

    /// 销毁完成通道。
    fn destroy_comp_channel(&self, ch: CompChannelHandle) -> Result<()>;

    /// 完成通道的文件描述符，供外部轮询。
    fn comp_channel_fd(&self, ch: CompChannelHandle) -> RawFd;

    /// 在通道上创建给定深度的完成队列。
    fn create_cq(&self, dev: DeviceHandle, depth: u32, ch: CompChannelHandle) -> Result<CqHandle>;

    /// 销毁完成队列。
    fn destroy_cq(&self, cq: CqHandle) -> Result<()>;

    /// 武装下一次完成通知。
    fn req_notify_cq(&self, cq: CqHandle) -> Result<()>;

    /// 阻塞等待通道上的完成通知，返回触发的 CQ。
    ///
    /// 描述符被设为非阻塞且暂无事件时，以 `EAGAIN` 失败。
    fn get_cq_event(&self, ch: CompChannelHandle) -> Result<CqHandle>;

    /// 确认一次完成通知。
    fn ack_cq_event(&self, cq: CqHandle);

    /// 轮询完成队列，把记录写入 `out` 前缀并返回 Provider 报告的条数。
    ///
    /// 报告条数多于 `out.len()` 属 Provider 缺陷，防御性检查由调用方执行。
    fn poll_cq(&self, cq: CqHandle, out: &mut [WorkCompletion]) -> Result<usize>;

    // ---- 共享接收队列 ----

    /// 创建共享接收队列。
    fn create_srq(&self, pd: PdHandle, rq_size: u32) -> Result<SrqHandle>;

    /// 销毁共享接收队列。
    fn destroy_srq(&self, srq: SrqHandle) -> Result<()>;

    /// 向共享接收队列投递接收请求。
    fn post_srq_recv(&self, srq: SrqHandle, req: &RecvRequest) -> Result<()>;

    // ---- 连接管理 ----

    /// 创建 CM 事件通道。
    fn create_event_channel(&self) -> Result<EventChannelHandle>;

    /// 销毁 CM 事件通道。
    fn destroy_event_channel(&self, ch: EventChannelHandle) -> Result<()>;

    /// CM 事件通道的文件描述符。
    fn event_channel_fd(&self, ch: EventChannelHandle) -> RawFd;

    /// 创建 CM id；`ch` 为空时 id 走 Provider 内部的同步伪通道。
    fn create_cm_id(&self, ch: Option<EventChannelHandle>) -> Result<CmIdHandle>;

    /// 销毁 CM id。
    fn destroy_cm_id(&self, id: CmIdHandle) -> Result<()>;

    /// 解析目的地址并把设备上下文附着到 id，返回该设备。
    fn resolve_addr(
        &self,
        id: CmIdHandle,
        addr: &str,
        port: &str,
        timeout_ms: u32,
    ) -> Result<DeviceHandle>;

    /// 解析到目的地的路由。
    fn resolve_route(&self, id: CmIdHandle, timeout_ms: u32) -> Result<()>;

    /// 绑定本地地址并进入监听。
    fn bind_and_listen(&self, id: CmIdHandle, addr: &str, port: &str) -> Result<()>;

    /// 阻塞等待通道上的下一条 CM 事件。
    ///
    /// 私有数据在返回前复制进事件；描述符非阻塞且暂无事件时以 `EAGAIN`
    /// 失败。
    fn get_cm_event(&self, ch: EventChannelHandle) -> Result<CmEvent>;

    /// 确认一条 CM 事件。
    fn ack_cm_event(&self, ev: CmEventHandle) -> Result<()>;

    /// 把 id 迁移到另一条事件通道。
    fn migrate_id(&self, id: CmIdHandle, ch: EventChannelHandle) -> Result<()>;

    /// 发起主动连接，携带私有数据。
    fn connect(&self, id: CmIdHandle, private_data: &[u8]) -> Result<()>;

    /// 接受入站连接请求，携带私有数据。
    fn accept(&self, id: CmIdHandle, private_data: &[u8]) -> Result<()>;

    /// 拒绝入站连接请求（不附带私有数据），id 随之失效。
    fn reject(&self, id: CmIdHandle) -> Result<()>;

    /// 断开连接。
    fn disconnect(&self, id: CmIdHandle) -> Result<()>;

    // ---- 队列对 ----

    /// 在 id 上创建 QP（QP 的生命周期附着于 id）。
    fn create_qp(&self, id: CmIdHandle, pd: PdHandle, cfg: &QpConfig) -> Result<()>;

    /// 销毁 id 上的 QP。
    fn destroy_qp(&self, id: CmIdHandle) -> Result<()>;

    // ---- 投递 ----

    /// 投递一条发送方向的工作请求。
    fn post_send(&self, id: CmIdHandle, req: &SendRequest) -> Result<()>;

    /// 投递一条接收方向的工作请求。
    fn post_recv(&self, id: CmIdHandle, req: &RecvRequest) -> Result<()>;
}

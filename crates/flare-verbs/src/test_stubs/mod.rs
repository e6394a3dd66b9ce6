//! 官方维护的 Provider 测试桩。
//!
//! # 设计背景（Why）
//! - 上层的连接状态机与资源编排必须在没有 RNIC 的环境下可验证，且要能在
//!   任意一次 Provider 调用上注入失败来检查逆序回收的对称性；
//! - 集中维护一份内存态实现，避免各测试各自手搓半吊子假件；契约演进时
//!   单点同步。
//!
//! # 使用方式（How）
//! - `MockProvider::new()` 后先用 [`MockProvider::add_device`] 登记设备能力，
//!   再把 `Arc<MockProvider>` 交给上层构造；
//! - 事件与完成用 `push_*` 系列预先脚本化；等待类操作在队列为空时以
//!   `EAGAIN` 返回，对应上层的"暂无"语义；
//! - 故障注入：[`MockProvider::fail`]（某操作的下一次调用）、
//!   [`MockProvider::fail_nth`]（某操作的第 n 次后续调用）、
//!   [`MockProvider::fail_call`]（全局第 n 次可失败调用）；
//! - 泄漏核算：[`MockProvider::outstanding`] 统计仍然存活的句柄，
//!   [`MockProvider::calls`] 统计操作次数。
//!
//! # 风险提示（Trade-offs）
//! - 句柄表做了比真实 Provider 更严格的校验（悬空句柄、乱序销毁直接报错），
//!   这是有意的：测试里宁可早失败。

use std::collections::{HashMap, HashSet, VecDeque};
use std::os::fd::RawFd;

use parking_lot::Mutex;

use crate::{
    AccessFlags, CmEvent, CmEventHandle, CmEventKind, CmIdHandle, CompChannelHandle, CqHandle,
    DeviceCaps, DeviceHandle, EventChannelHandle, MrHandle, MrReg, PdHandle, QpConfig,
    RdmaProvider, RecvRequest, Result, SendRequest, SrqHandle, VerbsError, WorkCompletion,
};

#[derive(Debug)]
struct MrRecord {
    pd: u64,
    #[allow(dead_code)]
    addr: u64,
    #[allow(dead_code)]
    len: u64,
    #[allow(dead_code)]
    access: AccessFlags,
}

#[derive(Debug, Default)]
struct CompChannelRecord {
    events: VecDeque<u64>,
}

#[derive(Debug)]
struct CqRecord {
    channel: u64,
    #[allow(dead_code)]
    depth: u32,
    armed: bool,
    pending: VecDeque<WorkCompletion>,
    overdeliver: Option<usize>,
}

#[derive(Debug)]
struct SrqRecord {
    pd: u64,
    #[allow(dead_code)]
    rq_size: u32,
    recvs: Vec<RecvRequest>,
}

#[derive(Debug, Default)]
struct CmIdRecord {
    channel: Option<u64>,
    dev: Option<u64>,
    qp: Option<QpConfig>,
    qp_pd: Option<u64>,
    addr_resolved: bool,
    route_resolved: bool,
    #[allow(dead_code)]
    listening: bool,
    connected: bool,
    conn_pdata: Option<Vec<u8>>,
    sends: Vec<SendRequest>,
    recvs: Vec<RecvRequest>,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    call_seq: u64,
    fail_at: Option<(u64, i32)>,
    fail_op: HashMap<&'static str, VecDeque<Option<i32>>>,
    calls: HashMap<&'static str, u64>,
    devices: HashMap<u64, DeviceCaps>,
    device_addrs: HashMap<String, u64>,
    pds: HashMap<u64, u64>,
    mrs: HashMap<u64, MrRecord>,
    comp_channels: HashMap<u64, CompChannelRecord>,
    cqs: HashMap<u64, CqRecord>,
    srqs: HashMap<u64, SrqRecord>,
    event_channels: HashMap<u64, VecDeque<CmEvent>>,
    cm_ids: HashMap<u64, CmIdRecord>,
    unacked_events: HashSet<u64>,
    reg_mr_log: Vec<AccessFlags>,
}

impl State {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// 统一的可失败调用闸口：计数并套用注入脚本。
    fn gate(&mut self, op: &'static str) -> Result<()> {
        let seq = self.call_seq;
        self.call_seq += 1;
        *self.calls.entry(op).or_default() += 1;

        if let Some((n, errno)) = self.fail_at
            && n == seq
        {
            self.fail_at = None;
            return Err(VerbsError::new(op, errno));
        }
        if let Some(queue) = self.fail_op.get_mut(op)
            && let Some(planned) = queue.pop_front()
            && let Some(errno) = planned
        {
            return Err(VerbsError::new(op, errno));
        }
        Ok(())
    }
}

/// 内存态 Provider 测试桩。
pub struct MockProvider {
    state: Mutex<State>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// 创建空白桩；使用前需至少登记一台设备。
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// 登记一台设备并返回句柄。
    pub fn add_device(&self, caps: DeviceCaps) -> DeviceHandle {
        let mut st = self.state.lock();
        let h = st.handle();
        st.devices.insert(h, caps);
        DeviceHandle(h)
    }

    /// 登记一台绑定到指定文本地址的设备。
    pub fn add_device_at(&self, addr: &str, caps: DeviceCaps) -> DeviceHandle {
        let dev = self.add_device(caps);
        self.state
            .lock()
            .device_addrs
            .insert(addr.to_owned(), dev.raw());
        dev
    }

    /// 让 `op` 的下一次调用以 `errno` 失败。
    pub fn fail(&self, op: &'static str, errno: i32) {
        self.fail_nth(op, 1, errno);
    }

    /// 让 `op` 从现在起的第 `n` 次调用（1 起）以 `errno` 失败。
    pub fn fail_nth(&self, op: &'static str, n: usize, errno: i32) {
        assert!(n >= 1, "n is 1-based");
        let mut st = self.state.lock();
        let queue = st.fail_op.entry(op).or_default();
        while queue.len() < n - 1 {
            queue.push_back(None);
        }
        queue.push_back(Some(errno));
    }

    /// 让全局第 `n` 次可失败调用（0 起）以 `errno` 失败。
    pub fn fail_call(&self, n: u64, errno: i32) {
        self.state.lock().fail_at = Some((n, errno));
    }

    /// 清空所有未触发的注入脚本。
    pub fn clear_injections(&self) {
        let mut st = self.state.lock();
        st.fail_at = None;
        st.fail_op.clear();
    }

    /// 是否还有未触发的注入脚本。
    pub fn injection_pending(&self) -> bool {
        let st = self.state.lock();
        st.fail_at.is_some()
            || st
                .fail_op
                .values()
                .any(|q| q.iter().any(|entry| entry.is_some()))
    }

    /// 仍然存活（未被释放或确认）的句柄总数。
    pub fn outstanding(&self) -> usize {
        let st = self.state.lock();
        let qps = st.cm_ids.values().filter(|rec| rec.qp.is_some()).count();
        st.pds.len()
            + st.mrs.len()
            + st.comp_channels.len()
            + st.cqs.len()
            + st.srqs.len()
            + st.event_channels.len()
            + st.cm_ids.len()
            + qps
            + st.unacked_events.len()
    }

    /// `op` 至今被调用的次数。
    pub fn calls(&self, op: &'static str) -> u64 {
        self.state.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// 历次 `reg_mr` 收到的访问掩码。
    pub fn reg_mr_access_log(&self) -> Vec<AccessFlags> {
        self.state.lock().reg_mr_log.clone()
    }

    /// 向事件通道脚本化一条 CM 事件。
    pub fn push_cm_event(
        &self,
        ch: EventChannelHandle,
        kind: CmEventKind,
        id: CmIdHandle,
        private_data: &[u8],
    ) -> CmEventHandle {
        let mut st = self.state.lock();
        let handle = CmEventHandle(st.handle());
        let event = CmEvent {
            handle,
            id,
            kind,
            private_data: private_data.to_vec(),
        };
        st.event_channels
            .get_mut(&ch.raw())
            .expect("push_cm_event: unknown event channel")
            .push_back(event);
        handle
    }

    /// 脚本化一条入站连接请求：创建新 id 并在通道上排队对应事件。
    pub fn push_incoming_request(
        &self,
        ch: EventChannelHandle,
        dev: DeviceHandle,
        private_data: &[u8],
    ) -> CmIdHandle {
        let id = {
            let mut st = self.state.lock();
            let id = st.handle();
            st.cm_ids.insert(
                id,
                CmIdRecord {
                    dev: Some(dev.raw()),
                    ..CmIdRecord::default()
                },
            );
            CmIdHandle(id)
        };
        self.push_cm_event(ch, CmEventKind::ConnectRequest, id, private_data);
        id
    }

    /// 向完成通道脚本化一次通知。
    pub fn push_cq_event(&self, ch: CompChannelHandle, cq: CqHandle) {
        self.state
            .lock()
            .comp_channels
            .get_mut(&ch.raw())
            .expect("push_cq_event: unknown completion channel")
            .events
            .push_back(cq.raw());
    }

    /// 向完成队列脚本化一条完成记录。
    pub fn push_completion(&self, cq: CqHandle, wc: WorkCompletion) {
        self.state
            .lock()
            .cqs
            .get_mut(&cq.raw())
            .expect("push_completion: unknown cq")
            .pending
            .push_back(wc);
    }

    /// 强制 `poll_cq` 无视缓冲区报告 `n` 条记录（模拟 Provider 超发缺陷）。
    pub fn set_poll_overdeliver(&self, cq: CqHandle, n: usize) {
        self.state
            .lock()
            .cqs
            .get_mut(&cq.raw())
            .expect("set_poll_overdeliver: unknown cq")
            .overdeliver = Some(n);
    }

    /// id 上已投递的发送请求。
    pub fn sends(&self, id: CmIdHandle) -> Vec<SendRequest> {
        self.state.lock().cm_ids[&id.raw()].sends.clone()
    }

    /// id 上已投递的接收请求。
    pub fn recvs(&self, id: CmIdHandle) -> Vec<RecvRequest> {
        self.state.lock().cm_ids[&id.raw()].recvs.clone()
    }

    /// SRQ 上已投递的接收请求。
    pub fn srq_recvs(&self, srq: SrqHandle) -> Vec<RecvRequest> {
        self.state.lock().srqs[&srq.raw()].recvs.clone()
    }

    /// id 上 QP 的初始化属性。
    pub fn qp_config(&self, id: CmIdHandle) -> Option<QpConfig> {
        self.state.lock().cm_ids.get(&id.raw()).and_then(|r| r.qp)
    }

    /// id 是否已连接（`connect`/`accept` 成功过）。
    pub fn connected(&self, id: CmIdHandle) -> bool {
        self.state
            .lock()
            .cm_ids
            .get(&id.raw())
            .is_some_and(|r| r.connected)
    }

    /// `connect`/`accept` 时携带的私有数据。
    pub fn conn_private_data(&self, id: CmIdHandle) -> Option<Vec<u8>> {
        self.state
            .lock()
            .cm_ids
            .get(&id.raw())
            .and_then(|r| r.conn_pdata.clone())
    }

    /// CQ 当前是否处于武装状态。
    pub fn cq_armed(&self, cq: CqHandle) -> bool {
        self.state.lock().cqs.get(&cq.raw()).is_some_and(|r| r.armed)
    }

    /// 仍然存活的 CM id，按句柄升序。
    pub fn cm_ids(&self) -> Vec<CmIdHandle> {
        let st = self.state.lock();
        let mut ids: Vec<u64> = st.cm_ids.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().map(CmIdHandle).collect()
    }

    /// id 当前所在的事件通道。
    pub fn cm_channel(&self, id: CmIdHandle) -> Option<EventChannelHandle> {
        self.state
            .lock()
            .cm_ids
            .get(&id.raw())
            .and_then(|rec| rec.channel)
            .map(EventChannelHandle)
    }

    /// CQ 挂接的完成通道。
    pub fn cq_channel(&self, cq: CqHandle) -> Option<CompChannelHandle> {
        self.state
            .lock()
            .cqs
            .get(&cq.raw())
            .map(|rec| CompChannelHandle(rec.channel))
    }
}

const EINVAL: i32 = libc::EINVAL;
const EBUSY: i32 = libc::EBUSY;
const EAGAIN: i32 = libc::EAGAIN;
const ENODEV: i32 = libc::ENODEV;

fn check(cond: bool, op: &'static str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(VerbsError::new(op, EINVAL))
    }
}

impl RdmaProvider for MockProvider {
    fn resolve_device(&self, addr: &str) -> Result<DeviceHandle> {
        let mut st = self.state.lock();
        st.gate("resolve_device")?;
        if let Some(dev) = st.device_addrs.get(addr) {
            return Ok(DeviceHandle(*dev));
        }
        if st.devices.len() == 1 {
            let dev = *st.devices.keys().next().expect("one device");
            return Ok(DeviceHandle(dev));
        }
        Err(VerbsError::new("resolve_device", ENODEV))
    }

    fn query_device(&self, dev: DeviceHandle) -> Result<DeviceCaps> {
        let mut st = self.state.lock();
        st.gate("query_device")?;
        st.devices
            .get(&dev.raw())
            .copied()
            .ok_or(VerbsError::new("query_device", EINVAL))
    }

    fn alloc_pd(&self, dev: DeviceHandle) -> Result<PdHandle> {
        let mut st = self.state.lock();
        st.gate("alloc_pd")?;
        check(st.devices.contains_key(&dev.raw()), "alloc_pd")?;
        let h = st.handle();
        st.pds.insert(h, dev.raw());
        Ok(PdHandle(h))
    }

    fn dealloc_pd(&self, pd: PdHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("dealloc_pd")?;
        check(st.pds.contains_key(&pd.raw()), "dealloc_pd")?;
        let in_use = st.mrs.values().any(|mr| mr.pd == pd.raw())
            || st.srqs.values().any(|srq| srq.pd == pd.raw())
            || st.cm_ids.values().any(|id| id.qp_pd == Some(pd.raw()));
        if in_use {
            return Err(VerbsError::new("dealloc_pd", EBUSY));
        }
        st.pds.remove(&pd.raw());
        Ok(())
    }

    fn reg_mr(&self, pd: PdHandle, addr: u64, len: u64, access: AccessFlags) -> Result<MrReg> {
        let mut st = self.state.lock();
        st.reg_mr_log.push(access);
        st.gate("reg_mr")?;
        check(st.pds.contains_key(&pd.raw()), "reg_mr")?;
        let h = st.handle();
        st.mrs.insert(
            h,
            MrRecord {
                pd: pd.raw(),
                addr,
                len,
                access,
            },
        );
        Ok(MrReg {
            mr: MrHandle(h),
            lkey: h as u32,
            rkey: (h as u32).wrapping_add(0x100),
        })
    }

    fn dereg_mr(&self, mr: MrHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("dereg_mr")?;
        check(st.mrs.remove(&mr.raw()).is_some(), "dereg_mr")
    }

    fn create_comp_channel(&self, dev: DeviceHandle) -> Result<CompChannelHandle> {
        let mut st = self.state.lock();
        st.gate("create_comp_channel")?;
        check(st.devices.contains_key(&dev.raw()), "create_comp_channel")?;
        let h = st.handle();
        st.comp_channels.insert(h, CompChannelRecord::default());
        Ok(CompChannelHandle(h))
    }

    fn destroy_comp_channel(&self, ch: CompChannelHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("destroy_comp_channel")?;
        check(st.comp_channels.contains_key(&ch.raw()), "destroy_comp_channel")?;
        if st.cqs.values().any(|cq| cq.channel == ch.raw()) {
            return Err(VerbsError::new("destroy_comp_channel", EBUSY));
        }
        st.comp_channels.remove(&ch.raw());
        Ok(())
    }

    fn comp_channel_fd(&self, ch: CompChannelHandle) -> RawFd {
        ch.raw() as RawFd
    }

    fn create_cq(&self, dev: DeviceHandle, depth: u32, ch: CompChannelHandle) -> Result<CqHandle> {
        let mut st = self.state.lock();
        st.gate("create_cq")?;
        check(st.devices.contains_key(&dev.raw()), "create_cq")?;
        check(st.comp_channels.contains_key(&ch.raw()), "create_cq")?;
        let h = st.handle();
        st.cqs.insert(
            h,
            CqRecord {
                channel: ch.raw(),
                depth,
                armed: false,
                pending: VecDeque::new(),
                overdeliver: None,
            },
        );
        Ok(CqHandle(h))
    }

    fn destroy_cq(&self, cq: CqHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("destroy_cq")?;
        check(st.cqs.contains_key(&cq.raw()), "destroy_cq")?;
        let referenced = st.cm_ids.values().any(|id| {
            id.qp
                .is_some_and(|qp| qp.send_cq == cq || qp.recv_cq == cq)
        });
        if referenced {
            return Err(VerbsError::new("destroy_cq", EBUSY));
        }
        st.cqs.remove(&cq.raw());
        Ok(())
    }

    fn req_notify_cq(&self, cq: CqHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("req_notify_cq")?;
        let rec = st
            .cqs
            .get_mut(&cq.raw())
            .ok_or(VerbsError::new("req_notify_cq", EINVAL))?;
        rec.armed = true;
        Ok(())
    }

    fn get_cq_event(&self, ch: CompChannelHandle) -> Result<CqHandle> {
        let mut st = self.state.lock();
        st.gate("get_cq_event")?;
        let rec = st
            .comp_channels
            .get_mut(&ch.raw())
            .ok_or(VerbsError::new("get_cq_event", EINVAL))?;
        match rec.events.pop_front() {
            Some(cq) => Ok(CqHandle(cq)),
            None => Err(VerbsError::new("get_cq_event", EAGAIN)),
        }
    }

    fn ack_cq_event(&self, cq: CqHandle) {
        if let Some(rec) = self.state.lock().cqs.get_mut(&cq.raw()) {
            rec.armed = false;
        }
    }

    fn poll_cq(&self, cq: CqHandle, out: &mut [WorkCompletion]) -> Result<usize> {
        let mut st = self.state.lock();
        st.gate("poll_cq")?;
        let rec = st
            .cqs
            .get_mut(&cq.raw())
            .ok_or(VerbsError::new("poll_cq", EINVAL))?;
        if let Some(n) = rec.overdeliver {
            return Ok(n);
        }
        let n = rec.pending.len().min(out.len());
        for slot in out.iter_mut().take(n) {
            *slot = rec.pending.pop_front().expect("bounded by len");
        }
        Ok(n)
    }

    fn create_srq(&self, pd: PdHandle, rq_size: u32) -> Result<SrqHandle> {
        let mut st = self.state.lock();
        st.gate("create_srq")?;
        check(st.pds.contains_key(&pd.raw()), "create_srq")?;
        let h = st.handle();
        st.srqs.insert(
            h,
            SrqRecord {
                pd: pd.raw(),
                rq_size,
                recvs: Vec::new(),
            },
        );
        Ok(SrqHandle(h))
    }

    fn destroy_srq(&self, srq: SrqHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("destroy_srq")?;
        check(st.srqs.remove(&srq.raw()).is_some(), "destroy_srq")
    }

    fn post_srq_recv(&self, srq: SrqHandle, req: &RecvRequest) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("post_srq_recv")?;
        let rec = st
            .srqs
            .get_mut(&srq.raw())
            .ok_or(VerbsError::new("post_srq_recv", EINVAL))?;
        rec.recvs.push(*req);
        Ok(())
    }

    fn create_event_channel(&self) -> Result<EventChannelHandle> {
        let mut st = self.state.lock();
        st.gate("create_event_channel")?;
        let h = st.handle();
        st.event_channels.insert(h, VecDeque::new());
        Ok(EventChannelHandle(h))
    }

    fn destroy_event_channel(&self, ch: EventChannelHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("destroy_event_channel")?;
        check(st.event_channels.contains_key(&ch.raw()), "destroy_event_channel")?;
        if st.cm_ids.values().any(|id| id.channel == Some(ch.raw())) {
            return Err(VerbsError::new("destroy_event_channel", EBUSY));
        }
        st.event_channels.remove(&ch.raw());
        Ok(())
    }

    fn event_channel_fd(&self, ch: EventChannelHandle) -> RawFd {
        ch.raw() as RawFd
    }

    fn create_cm_id(&self, ch: Option<EventChannelHandle>) -> Result<CmIdHandle> {
        let mut st = self.state.lock();
        st.gate("create_cm_id")?;
        if let Some(ch) = ch {
            check(st.event_channels.contains_key(&ch.raw()), "create_cm_id")?;
        }
        let h = st.handle();
        st.cm_ids.insert(
            h,
            CmIdRecord {
                channel: ch.map(|c| c.raw()),
                ..CmIdRecord::default()
            },
        );
        Ok(CmIdHandle(h))
    }

    fn destroy_cm_id(&self, id: CmIdHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("destroy_cm_id")?;
        let rec = st
            .cm_ids
            .get(&id.raw())
            .ok_or(VerbsError::new("destroy_cm_id", EINVAL))?;
        if rec.qp.is_some() {
            return Err(VerbsError::new("destroy_cm_id", EBUSY));
        }
        st.cm_ids.remove(&id.raw());
        Ok(())
    }

    fn resolve_addr(
        &self,
        id: CmIdHandle,
        addr: &str,
        _port: &str,
        _timeout_ms: u32,
    ) -> Result<DeviceHandle> {
        let mut st = self.state.lock();
        st.gate("resolve_addr")?;
        let dev = match st.device_addrs.get(addr) {
            Some(dev) => *dev,
            None if st.devices.len() == 1 => *st.devices.keys().next().expect("one device"),
            None => return Err(VerbsError::new("resolve_addr", ENODEV)),
        };
        let rec = st
            .cm_ids
            .get_mut(&id.raw())
            .ok_or(VerbsError::new("resolve_addr", EINVAL))?;
        rec.dev = Some(dev);
        rec.addr_resolved = true;
        Ok(DeviceHandle(dev))
    }

    fn resolve_route(&self, id: CmIdHandle, _timeout_ms: u32) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("resolve_route")?;
        let rec = st
            .cm_ids
            .get_mut(&id.raw())
            .ok_or(VerbsError::new("resolve_route", EINVAL))?;
        check(rec.addr_resolved, "resolve_route")?;
        rec.route_resolved = true;
        Ok(())
    }

    fn bind_and_listen(&self, id: CmIdHandle, _addr: &str, _port: &str) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("bind_and_listen")?;
        let rec = st
            .cm_ids
            .get_mut(&id.raw())
            .ok_or(VerbsError::new("bind_and_listen", EINVAL))?;
        rec.listening = true;
        Ok(())
    }

    fn get_cm_event(&self, ch: EventChannelHandle) -> Result<CmEvent> {
        let mut st = self.state.lock();
        st.gate("get_cm_event")?;
        let queue = st
            .event_channels
            .get_mut(&ch.raw())
            .ok_or(VerbsError::new("get_cm_event", EINVAL))?;
        match queue.pop_front() {
            Some(event) => {
                st.unacked_events.insert(event.handle.raw());
                Ok(event)
            }
            None => Err(VerbsError::new("get_cm_event", EAGAIN)),
        }
    }

    fn ack_cm_event(&self, ev: CmEventHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("ack_cm_event")?;
        check(st.unacked_events.remove(&ev.raw()), "ack_cm_event")
    }

    fn migrate_id(&self, id: CmIdHandle, ch: EventChannelHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("migrate_id")?;
        check(st.event_channels.contains_key(&ch.raw()), "migrate_id")?;
        let rec = st
            .cm_ids
            .get_mut(&id.raw())
            .ok_or(VerbsError::new("migrate_id", EINVAL))?;
        rec.channel = Some(ch.raw());
        Ok(())
    }

    fn connect(&self, id: CmIdHandle, private_data: &[u8]) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("connect")?;
        let rec = st
            .cm_ids
            .get_mut(&id.raw())
            .ok_or(VerbsError::new("connect", EINVAL))?;
        check(rec.route_resolved && rec.qp.is_some(), "connect")?;
        rec.connected = true;
        rec.conn_pdata = Some(private_data.to_vec());
        Ok(())
    }

    fn accept(&self, id: CmIdHandle, private_data: &[u8]) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("accept")?;
        let rec = st
            .cm_ids
            .get_mut(&id.raw())
            .ok_or(VerbsError::new("accept", EINVAL))?;
        check(rec.qp.is_some(), "accept")?;
        rec.connected = true;
        rec.conn_pdata = Some(private_data.to_vec());
        Ok(())
    }

    fn reject(&self, id: CmIdHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("reject")?;
        check(st.cm_ids.remove(&id.raw()).is_some(), "reject")
    }

    fn disconnect(&self, id: CmIdHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("disconnect")?;
        let rec = st
            .cm_ids
            .get_mut(&id.raw())
            .ok_or(VerbsError::new("disconnect", EINVAL))?;
        check(rec.connected, "disconnect")?;
        rec.connected = false;
        Ok(())
    }

    fn create_qp(&self, id: CmIdHandle, pd: PdHandle, cfg: &QpConfig) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("create_qp")?;
        check(st.pds.contains_key(&pd.raw()), "create_qp")?;
        check(st.cqs.contains_key(&cfg.send_cq.raw()), "create_qp")?;
        check(st.cqs.contains_key(&cfg.recv_cq.raw()), "create_qp")?;
        if let Some(srq) = cfg.srq {
            check(st.srqs.contains_key(&srq.raw()), "create_qp")?;
        }
        let rec = st
            .cm_ids
            .get_mut(&id.raw())
            .ok_or(VerbsError::new("create_qp", EINVAL))?;
        check(rec.qp.is_none(), "create_qp")?;
        rec.qp = Some(*cfg);
        rec.qp_pd = Some(pd.raw());
        Ok(())
    }

    fn destroy_qp(&self, id: CmIdHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("destroy_qp")?;
        let rec = st
            .cm_ids
            .get_mut(&id.raw())
            .ok_or(VerbsError::new("destroy_qp", EINVAL))?;
        check(rec.qp.take().is_some(), "destroy_qp")?;
        rec.qp_pd = None;
        Ok(())
    }

    fn post_send(&self, id: CmIdHandle, req: &SendRequest) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("post_send")?;
        let rec = st
            .cm_ids
            .get_mut(&id.raw())
            .ok_or(VerbsError::new("post_send", EINVAL))?;
        check(rec.qp.is_some(), "post_send")?;
        rec.sends.push(*req);
        Ok(())
    }

    fn post_recv(&self, id: CmIdHandle, req: &RecvRequest) -> Result<()> {
        let mut st = self.state.lock();
        st.gate("post_recv")?;
        let rec = st
            .cm_ids
            .get_mut(&id.raw())
            .ok_or(VerbsError::new("post_recv", EINVAL))?;
        check(rec.qp.is_some(), "post_recv")?;
        rec.recvs.push(*req);
        Ok(())
    }
}

/// 共享接收队列构造配置。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SrqConfig {
    rq_size: u32,
    rcq_size: u32,
}

impl Default for SrqConfig {
    fn default() -> Self {
        Self {
            rq_size: 10,
            rcq_size: 10,
        }
    }
}

impl SrqConfig {
    /// 以默认值创建配置。
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置接收队列深度。
    pub fn with_rq_size(mut self, rq_size: u32) -> Self {
        self.rq_size = rq_size;
        self
    }

    /// 设置接收 CQ 深度；0 表示 SRQ 不带接收 CQ。
    pub fn with_rcq_size(mut self, rcq_size: u32) -> Self {
        self.rcq_size = rcq_size;
        self
    }

    /// 接收队列深度。
    pub fn rq_size(&self) -> u32 {
        self.rq_size
    }

    /// 接收 CQ 深度。
    pub fn rcq_size(&self) -> u32 {
        self.rcq_size
    }
}

use std::sync::Arc;
use std::time::Duration;

use crate::error::FlareError;
use crate::srq::Srq;
use crate::Result;

/// 连接构造配置。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把建连超时、队列深度与完成落点的全部取舍收进一个不可变记录，
///   构造函数按引用接收，默认值只在这里维护一份；
/// - 共享完成通道与 SRQ 自带 rCQ 是互斥的完成落点方案，互斥性在
///   连接请求构造时、任何 Provider 资源分配之前检查。
///
/// ## 契约说明（What）
/// - `rcq_size == 0` 表示不建独立接收 CQ，接收完成落在主 CQ；
/// - 绑定 SRQ 且 SRQ 自带 rCQ 时，连接借用该 rCQ；SRQ 不带 rCQ 时
///   连接也不得配置独立 rCQ；
/// - `shared_comp_channel` 为真时主 CQ 与 rCQ 共用一条完成通道，
///   等待须走连接级 [`Connection::wait`](crate::conn::Connection::wait)。
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    timeout: Duration,
    sq_size: u32,
    rq_size: u32,
    cq_size: u32,
    rcq_size: u32,
    shared_comp_channel: bool,
    srq: Option<Arc<Srq>>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            sq_size: 10,
            rq_size: 10,
            cq_size: 10,
            rcq_size: 0,
            shared_comp_channel: false,
            srq: None,
        }
    }
}

impl ConnectionConfig {
    /// 以默认值创建配置。
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置连接建立超时。
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 以毫秒设置连接建立超时；负值以 [`FlareError::NegativeTimeout`] 拒绝。
    pub fn with_timeout_ms(self, timeout_ms: i64) -> Result<Self> {
        if timeout_ms < 0 {
            return Err(FlareError::NegativeTimeout);
        }
        Ok(self.with_timeout(Duration::from_millis(timeout_ms as u64)))
    }

    /// 设置发送队列深度。
    pub fn with_sq_size(mut self, sq_size: u32) -> Self {
        self.sq_size = sq_size;
        self
    }

    /// 设置接收队列深度。
    pub fn with_rq_size(mut self, rq_size: u32) -> Self {
        self.rq_size = rq_size;
        self
    }

    /// 设置主 CQ 深度。
    pub fn with_cq_size(mut self, cq_size: u32) -> Self {
        self.cq_size = cq_size;
        self
    }

    /// 设置接收 CQ 深度；0 表示不建独立接收 CQ。
    pub fn with_rcq_size(mut self, rcq_size: u32) -> Self {
        self.rcq_size = rcq_size;
        self
    }

    /// 主 CQ 与接收 CQ 是否共用一条完成通道。
    pub fn with_shared_comp_channel(mut self, shared: bool) -> Self {
        self.shared_comp_channel = shared;
        self
    }

    /// 绑定共享接收队列。
    pub fn with_srq(mut self, srq: Arc<Srq>) -> Self {
        self.srq = Some(srq);
        self
    }

    /// 连接建立超时。
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 发送队列深度。
    pub fn sq_size(&self) -> u32 {
        self.sq_size
    }

    /// 接收队列深度。
    pub fn rq_size(&self) -> u32 {
        self.rq_size
    }

    /// 主 CQ 深度。
    pub fn cq_size(&self) -> u32 {
        self.cq_size
    }

    /// 接收 CQ 深度。
    pub fn rcq_size(&self) -> u32 {
        self.rcq_size
    }

    /// 是否共用完成通道。
    pub fn shared_comp_channel(&self) -> bool {
        self.shared_comp_channel
    }

    /// 绑定的共享接收队列。
    pub fn srq(&self) -> Option<&Arc<Srq>> {
        self.srq.as_ref()
    }

    pub(crate) fn timeout_ms(&self) -> u32 {
        self.timeout.as_millis().min(u128::from(u32::MAX)) as u32
    }

    /// 完成落点组合的合法性检查；不分配任何资源。
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(srq) = &self.srq {
            // SRQ 自带 rCQ 时它取代共享通道方案。
            if self.shared_comp_channel && srq.rcq().is_some() {
                return Err(FlareError::Inval);
            }
            // SRQ 不带 rCQ 的连接也不得配置独立 rCQ。
            if srq.rcq().is_none() && self.rcq_size > 0 {
                return Err(FlareError::Inval);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_contract() {
        let cfg = ConnectionConfig::default();
        assert_eq!(cfg.timeout(), Duration::from_millis(1000));
        assert_eq!(cfg.sq_size(), 10);
        assert_eq!(cfg.rq_size(), 10);
        assert_eq!(cfg.cq_size(), 10);
        assert_eq!(cfg.rcq_size(), 0);
        assert!(!cfg.shared_comp_channel());
        assert!(cfg.srq().is_none());
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let err = ConnectionConfig::new()
            .with_timeout_ms(-1)
            .expect_err("negative timeout must fail");
        assert_eq!(err, FlareError::NegativeTimeout);
        let cfg = ConnectionConfig::new()
            .with_timeout_ms(250)
            .expect("non-negative timeout");
        assert_eq!(cfg.timeout(), Duration::from_millis(250));
    }
}

//! 集成测试共用的装配件：桩 Provider、Peer 与已建立的连接。

#![allow(dead_code)]

use std::sync::Arc;

use flare_core::{Connection, ConnectionConfig, ConnectionRequest, Peer};
use flare_verbs::test_stubs::MockProvider;
use flare_verbs::{CmIdHandle, DeviceCaps, RdmaProvider};

pub const ADDR: &str = "192.168.0.1";
pub const PORT: &str = "7204";

pub fn provider() -> Arc<MockProvider> {
    Arc::new(MockProvider::new())
}

pub fn peer_with(provider: &Arc<MockProvider>, caps: DeviceCaps) -> Arc<Peer> {
    let dev = provider.add_device_at(ADDR, caps);
    Peer::new(Arc::clone(provider) as Arc<dyn RdmaProvider>, dev).expect("peer construction")
}

pub fn peer(provider: &Arc<MockProvider>) -> Arc<Peer> {
    peer_with(provider, DeviceCaps::default())
}

/// 建一条出站连接并返回它与底层 CM id（供桩侧断言投递记录）。
pub fn outgoing_connection(
    provider: &Arc<MockProvider>,
    peer: &Arc<Peer>,
    cfg: &ConnectionConfig,
) -> (Connection, CmIdHandle) {
    let req = ConnectionRequest::new(peer, ADDR, PORT, cfg).expect("outgoing request");
    let id = *provider.cm_ids().last().expect("request created an id");
    let conn = req.connect(None).expect("connect");
    (conn, id)
}

//! 共享接收队列的构造、投递与绑定测试。

mod common;

use std::sync::Arc;

use flare_core::{ConnectionConfig, FlareError, LocalMr, MrUsage, Srq, SrqConfig};

#[test]
fn srq_with_rcq_owns_a_private_completion_queue() {
    let provider = common::provider();
    let peer = common::peer(&provider);

    let srq = Srq::new(&peer, &SrqConfig::default()).expect("srq with rcq");
    assert!(srq.rcq().is_some());
    assert_eq!(provider.calls("create_srq"), 1);
    assert_eq!(provider.calls("create_cq"), 1);

    drop(srq);
    drop(peer);
    assert_eq!(provider.outstanding(), 0);
}

#[test]
fn srq_without_rcq_creates_no_completion_queue() {
    let provider = common::provider();
    let peer = common::peer(&provider);

    let srq = Srq::new(&peer, &SrqConfig::new().with_rcq_size(0)).expect("srq without rcq");
    assert!(srq.rcq().is_none());
    assert_eq!(provider.calls("create_cq"), 0);
}

#[test]
fn recv_posts_land_on_the_srq() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let srq = Srq::new(&peer, &SrqConfig::default()).expect("srq");
    let mr = LocalMr::reg(&peer, 0x3000, 512, MrUsage::RECV).expect("recv buffer");

    srq.recv(Some(&mr), 64, 128, 0x1234).expect("posted recv");
    srq.recv(None, 0, 0, 0x5678).expect("zero-length recv");

    let srq_handle = {
        // SRQ 句柄未公开；经 QP 配置取得。
        let cfg = ConnectionConfig::new().with_srq(Arc::clone(&srq));
        let (_conn, id) = common::outgoing_connection(&provider, &peer, &cfg);
        provider.qp_config(id).expect("qp exists").srq.expect("qp bound to srq")
    };
    let recvs = provider.srq_recvs(srq_handle);
    assert_eq!(recvs.len(), 2);
    assert_eq!(recvs[0].laddr, 0x3000 + 64);
    assert_eq!(recvs[0].len, 128);
    assert_eq!(recvs[0].wr_id, 0x1234);
    assert_eq!(recvs[1].laddr, 0);
    assert_eq!(recvs[1].lkey, 0);
    assert_eq!(recvs[1].wr_id, 0x5678);
}

#[test]
fn zero_length_recv_rejects_nonzero_offset_or_len() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let srq = Srq::new(&peer, &SrqConfig::default()).expect("srq");

    assert_eq!(srq.recv(None, 8, 0, 1), Err(FlareError::Inval));
    assert_eq!(srq.recv(None, 0, 8, 2), Err(FlareError::Inval));
    assert_eq!(provider.calls("post_srq_recv"), 0);
}

#[test]
fn bound_connection_borrows_the_srq_rcq() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let srq = Srq::new(&peer, &SrqConfig::default()).expect("srq");

    let cfg = ConnectionConfig::new().with_srq(Arc::clone(&srq));
    let (conn, id) = common::outgoing_connection(&provider, &peer, &cfg);

    let qp = provider.qp_config(id).expect("qp exists");
    assert_ne!(qp.recv_cq, qp.send_cq, "recv completions land on the srq rcq");
    assert!(qp.srq.is_some());
    assert!(conn.rcq().is_some(), "rcq accessor exposes the borrowed cq");

    // 连接删除不得动 SRQ 的 rCQ：先删连接再删 SRQ。
    conn.delete().expect("connection delete");
    assert!(srq.rcq().is_some());
    drop(cfg);
    drop(srq);
    drop(peer);
    assert_eq!(provider.outstanding(), 0);
}

#[test]
fn srq_without_rcq_bound_connection_uses_the_main_cq() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let srq = Srq::new(&peer, &SrqConfig::new().with_rcq_size(0)).expect("srq without rcq");

    let cfg = ConnectionConfig::new().with_srq(Arc::clone(&srq));
    let (conn, id) = common::outgoing_connection(&provider, &peer, &cfg);

    let qp = provider.qp_config(id).expect("qp exists");
    assert_eq!(qp.recv_cq, qp.send_cq);
    assert!(conn.rcq().is_none());
}

#[test]
fn srq_teardown_failure_does_not_skip_the_other_step() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let srq = Srq::new(&peer, &SrqConfig::default()).expect("srq");

    provider.fail("destroy_cq", libc::EIO);
    drop(srq);
    // rCQ 销毁失败，但 Provider SRQ 仍然被销毁。
    assert_eq!(provider.calls("destroy_srq"), 1);
}

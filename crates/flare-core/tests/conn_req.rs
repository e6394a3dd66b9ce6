//! 连接请求的构造、提升与拆除对称性测试。

mod common;

use std::sync::Arc;

use flare_core::{
    ConnectionConfig, ConnectionEvent, ConnectionRequest, Endpoint, FlareError, Peer, Srq,
    SrqConfig,
};
use flare_verbs::test_stubs::MockProvider;
use flare_verbs::{CmEvent, CmEventHandle, CmEventKind, CmIdHandle, RdmaProvider};

#[test]
fn shared_channel_with_srq_rcq_is_inval_before_any_allocation() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let srq = Srq::new(&peer, &SrqConfig::default()).expect("srq with rcq");

    let cfg = ConnectionConfig::new()
        .with_shared_comp_channel(true)
        .with_srq(Arc::clone(&srq));
    let before = provider.outstanding();

    let err = ConnectionRequest::new(&peer, common::ADDR, common::PORT, &cfg)
        .expect_err("mutually exclusive completion schemes");
    assert_eq!(err, FlareError::Inval);
    assert_eq!(provider.outstanding(), before, "nothing may be allocated");
    assert_eq!(provider.calls("create_cm_id"), 0);
}

#[test]
fn srq_without_rcq_forbids_a_private_rcq() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let srq = Srq::new(&peer, &SrqConfig::new().with_rcq_size(0)).expect("srq without rcq");

    let cfg = ConnectionConfig::new()
        .with_srq(Arc::clone(&srq))
        .with_rcq_size(4);
    let err = ConnectionRequest::new(&peer, common::ADDR, common::PORT, &cfg)
        .expect_err("srq without rcq forbids private rcq");
    assert_eq!(err, FlareError::Inval);
}

#[test]
fn outgoing_request_builds_the_expected_data_path() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let req = ConnectionRequest::new(&peer, common::ADDR, common::PORT, &ConnectionConfig::default())
        .expect("outgoing request");
    assert!(req.private_data().is_empty());

    let id = *provider.cm_ids().last().expect("cm id created");
    let qp = provider.qp_config(id).expect("qp created");
    assert_eq!(qp.sq_size, 10);
    assert_eq!(qp.rq_size, 10);
    assert_eq!(qp.recv_cq, qp.send_cq, "rcq disabled by default");
    assert!(qp.srq.is_none());

    req.delete().expect("delete unconnected request");
    drop(peer);
    assert_eq!(provider.outstanding(), 0);
}

#[test]
fn outgoing_request_with_private_rcq_uses_a_second_cq() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let cfg = ConnectionConfig::new().with_rcq_size(4);
    let req =
        ConnectionRequest::new(&peer, common::ADDR, common::PORT, &cfg).expect("outgoing request");

    let id = *provider.cm_ids().last().expect("cm id created");
    let qp = provider.qp_config(id).expect("qp created");
    assert_ne!(qp.recv_cq, qp.send_cq);

    req.delete().expect("delete unconnected request");
    drop(peer);
    assert_eq!(provider.outstanding(), 0);
}

#[test]
fn scenario_outgoing_connect_with_private_data() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let req = ConnectionRequest::new(&peer, common::ADDR, common::PORT, &ConnectionConfig::default())
        .expect("outgoing request");
    let id = *provider.cm_ids().last().expect("cm id created");

    let conn = req.connect(Some(b"Hello server!")).expect("connect");
    assert!(provider.connected(id));
    assert_eq!(
        provider.conn_private_data(id).expect("pdata recorded"),
        b"Hello server!"
    );
    // id 已迁移到连接私有的事件通道。
    let evch = provider.cm_channel(id).expect("migrated channel");

    provider.push_cm_event(evch, CmEventKind::Established, id, b"pool descriptor");
    assert_eq!(conn.next_event(), Ok(ConnectionEvent::Established));
    assert_eq!(conn.private_data(), b"pool descriptor");

    conn.delete().expect("connection delete");
    drop(peer);
    assert_eq!(provider.outstanding(), 0);
}

#[test]
fn empty_private_data_slice_is_inval() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let req = ConnectionRequest::new(&peer, common::ADDR, common::PORT, &ConnectionConfig::default())
        .expect("outgoing request");

    let err = req.connect(Some(&[])).expect_err("empty pdata slice");
    assert_eq!(err, FlareError::Inval);
    // 请求已被消耗，资源随之回收。
    drop(peer);
    assert_eq!(provider.outstanding(), 0);
}

#[test]
fn failed_connect_consumes_the_request_and_releases_everything() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let req = ConnectionRequest::new(&peer, common::ADDR, common::PORT, &ConnectionConfig::default())
        .expect("outgoing request");

    provider.fail("connect", libc::ECONNREFUSED);
    let err = req.connect(None).expect_err("injected connect failure");
    assert_eq!(
        err,
        FlareError::Provider {
            op: "connect",
            errno: libc::ECONNREFUSED
        }
    );
    drop(peer);
    assert_eq!(provider.outstanding(), 0);
}

#[test]
fn scenario_incoming_happy_path() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let dev = provider.add_device_at("127.0.0.1", Default::default());
    let ep = Endpoint::listen(&peer, "127.0.0.1", "1234").expect("listen");
    let listen_id = *provider.cm_ids().last().expect("listen id");
    let listen_ch = provider.cm_channel(listen_id).expect("listen channel");

    let incoming_id = provider.push_incoming_request(listen_ch, dev, b"Hello server!\0");
    let req = ep
        .next_conn_req(&ConnectionConfig::default())
        .expect("incoming request");
    assert_eq!(req.private_data().len(), 14);
    let qp = provider.qp_config(incoming_id).expect("qp created");
    assert_eq!(qp.sq_size, 10);

    let conn = req.connect(None).expect("accept");
    assert!(provider.connected(incoming_id));
    assert_eq!(
        provider.conn_private_data(incoming_id).expect("accept pdata"),
        Vec::<u8>::new(),
        "accept carries no private data"
    );
    assert_eq!(conn.private_data(), b"Hello server!\0");

    conn.delete().expect("connection delete");
    ep.shutdown().expect("endpoint shutdown");
    drop(peer);
    assert_eq!(provider.outstanding(), 0);
}

#[test]
fn incoming_delete_rejects_the_id_and_acks_the_event() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let dev = provider.add_device_at("127.0.0.1", Default::default());
    let ep = Endpoint::listen(&peer, "127.0.0.1", "1234").expect("listen");
    let listen_id = *provider.cm_ids().last().expect("listen id");
    let listen_ch = provider.cm_channel(listen_id).expect("listen channel");

    let incoming_id = provider.push_incoming_request(listen_ch, dev, b"ignored");
    let req = ep
        .next_conn_req(&ConnectionConfig::default())
        .expect("incoming request");

    req.delete().expect("reject unpromoted request");
    assert_eq!(provider.calls("reject"), 1);
    assert!(!provider.cm_ids().contains(&incoming_id));

    ep.shutdown().expect("endpoint shutdown");
    drop(peer);
    assert_eq!(provider.outstanding(), 0);
}

#[test]
fn from_cm_event_rejects_foreign_event_kinds_without_side_effects() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let before = provider.outstanding();

    let event = CmEvent {
        handle: CmEventHandle(0),
        id: CmIdHandle(0),
        kind: CmEventKind::Established,
        private_data: Vec::new(),
    };
    let err = ConnectionRequest::from_cm_event(&peer, event, &ConnectionConfig::default())
        .expect_err("only connect requests can be promoted");
    assert_eq!(err, FlareError::Inval);
    assert_eq!(provider.outstanding(), before);
    assert_eq!(provider.calls("create_cq"), 0);
}

/// 对构造路径上的每一次 Provider 调用注入失败，验证已获取的句柄被
/// 恰好释放一次（对称拆除）。
#[test]
fn teardown_symmetry_under_exhaustive_failure_injection() {
    let cfg_variants: [fn() -> ConnectionConfig; 3] = [
        ConnectionConfig::new,
        || ConnectionConfig::new().with_rcq_size(4),
        || ConnectionConfig::new().with_shared_comp_channel(true).with_rcq_size(4),
    ];

    for (variant, make_cfg) in cfg_variants.iter().enumerate() {
        let mut call = 0u64;
        loop {
            let provider = Arc::new(MockProvider::new());
            let dev = provider.add_device_at(common::ADDR, Default::default());
            provider.fail_call(call, libc::EIO);

            let build = Peer::new(Arc::clone(&provider) as Arc<dyn RdmaProvider>, dev)
                .and_then(|peer| {
                    ConnectionRequest::new(&peer, common::ADDR, common::PORT, &make_cfg())
                        .map(|req| (peer, req))
                });
            let fired = !provider.injection_pending();
            provider.clear_injections();

            match build {
                Ok((peer, req)) => {
                    req.delete().expect("clean delete after surviving injection");
                    drop(peer);
                }
                Err(_) => {}
            }

            assert_eq!(
                provider.outstanding(),
                0,
                "leak with failure at call {call} (variant {variant})"
            );
            if !fired {
                break;
            }
            call += 1;
        }
        // 至少要覆盖 peer 构造之后的若干步骤。
        assert!(call > 4, "injection loop ended too early (variant {variant})");
    }
}

//! 完成队列的等待/轮询契约测试（经由连接构造 CQ）。

mod common;

use flare_core::{
    ConnectionConfig, FlareError, WcDetail, WcStatus, WorkCompletion,
};

#[test]
fn poll_on_fresh_cq_reports_no_completion() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let (conn, _id) = common::outgoing_connection(&provider, &peer, &ConnectionConfig::default());

    let mut buf = [WorkCompletion::default(); 1];
    assert_eq!(conn.cq().poll(&mut buf), Err(FlareError::NoCompletion));
}

#[test]
fn poll_with_empty_buffer_is_inval() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let (conn, _id) = common::outgoing_connection(&provider, &peer, &ConnectionConfig::default());

    let mut buf: [WorkCompletion; 0] = [];
    assert_eq!(conn.cq().poll(&mut buf), Err(FlareError::Inval));
}

#[test]
fn poll_over_delivery_is_defensively_unknown() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let (conn, id) = common::outgoing_connection(&provider, &peer, &ConnectionConfig::default());
    let cq = provider.qp_config(id).expect("qp exists").send_cq;

    provider.set_poll_overdeliver(cq, 3);
    let mut buf = [WorkCompletion::default(); 2];
    assert_eq!(conn.cq().poll(&mut buf), Err(FlareError::Unknown));
}

#[test]
fn poll_copies_provider_records_verbatim() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let (conn, id) = common::outgoing_connection(&provider, &peer, &ConnectionConfig::default());
    let cq = provider.qp_config(id).expect("qp exists").send_cq;

    let first = WorkCompletion {
        wr_id: 7,
        status: WcStatus::Success,
        detail: WcDetail::RdmaRead,
    };
    let second = WorkCompletion {
        wr_id: 8,
        status: WcStatus::WrFlushErr,
        detail: WcDetail::Recv {
            byte_len: 13,
            imm: Some(0xfeed),
        },
    };
    provider.push_completion(cq, first);
    provider.push_completion(cq, second);

    let mut buf = [WorkCompletion::default(); 4];
    let got = conn.cq().poll(&mut buf).expect("two completions queued");
    assert_eq!(got, 2);
    assert_eq!(buf[0], first);
    assert_eq!(buf[1], second);
}

#[test]
fn wait_acks_the_event_and_rearms() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let (conn, id) = common::outgoing_connection(&provider, &peer, &ConnectionConfig::default());
    let cq = provider.qp_config(id).expect("qp exists").send_cq;
    let channel = provider.cq_channel(cq).expect("cq has a channel");

    // 构造即武装。
    assert!(provider.cq_armed(cq));
    let rearms_before = provider.calls("req_notify_cq");

    provider.push_cq_event(channel, cq);
    conn.cq().wait().expect("scripted notification");

    assert!(provider.cq_armed(cq), "wait must rearm");
    assert_eq!(provider.calls("req_notify_cq"), rearms_before + 1);
}

#[test]
fn wait_without_pending_event_maps_to_no_completion() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let (conn, _id) = common::outgoing_connection(&provider, &peer, &ConnectionConfig::default());

    assert_eq!(conn.cq().wait(), Err(FlareError::NoCompletion));
}

#[test]
fn wait_on_shared_channel_cq_is_a_shape_error() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let cfg = ConnectionConfig::new().with_shared_comp_channel(true);
    let (conn, _id) = common::outgoing_connection(&provider, &peer, &cfg);

    assert_eq!(conn.cq().wait(), Err(FlareError::SharedChannel));
}

#[test]
fn connection_wait_requires_a_shared_channel() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let (conn, _id) = common::outgoing_connection(&provider, &peer, &ConnectionConfig::default());

    assert!(matches!(conn.wait(), Err(FlareError::NotSharedChannel)));
    assert_eq!(conn.completion_fd(), Err(FlareError::NotSharedChannel));
}

#[test]
fn connection_wait_identifies_the_fired_cq() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let cfg = ConnectionConfig::new()
        .with_shared_comp_channel(true)
        .with_rcq_size(4);
    let (conn, id) = common::outgoing_connection(&provider, &peer, &cfg);
    let qp = provider.qp_config(id).expect("qp exists");
    let shared = provider.cq_channel(qp.send_cq).expect("shared channel");
    assert_eq!(
        provider.cq_channel(qp.recv_cq),
        Some(shared),
        "both cqs share one channel"
    );

    provider.push_cq_event(shared, qp.recv_cq);
    let (_cq, is_rcq) = conn.wait().expect("scripted notification");
    assert!(is_rcq);
    assert!(provider.cq_armed(qp.recv_cq), "fired cq must be rearmed");

    provider.push_cq_event(shared, qp.send_cq);
    let (_cq, is_rcq) = conn.wait().expect("scripted notification");
    assert!(!is_rcq);
    assert!(conn.completion_fd().is_ok());
}

#[test]
fn cq_fd_exposes_the_channel_descriptor() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let (conn, id) = common::outgoing_connection(&provider, &peer, &ConnectionConfig::default());
    let cq = provider.qp_config(id).expect("qp exists").send_cq;
    let channel = provider.cq_channel(cq).expect("cq has a channel");

    assert_eq!(conn.cq().fd(), channel.raw() as std::os::fd::RawFd);
}

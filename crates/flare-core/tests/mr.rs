//! 内存区域注册与线缆描述符的契约测试。

mod common;

use flare_core::{
    mr_descriptor_size, FlareError, LocalMr, MrUsage, RemoteMr, MR_DESCRIPTOR_SIZE,
};

#[test]
fn reg_rejects_degenerate_inputs_without_provider_calls() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let before = provider.calls("reg_mr");

    let err = LocalMr::reg(&peer, 0x1000, 0, MrUsage::READ_SRC).expect_err("zero length");
    assert_eq!(err, FlareError::Inval);
    let err = LocalMr::reg(&peer, 0x1000, 64, MrUsage::empty()).expect_err("empty usage");
    assert_eq!(err, FlareError::Inval);

    assert_eq!(provider.calls("reg_mr"), before);
}

#[test]
fn descriptor_round_trips_through_remote_mr() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let usage = MrUsage::WRITE_DST | MrUsage::FLUSH_PERSISTENT | MrUsage::FLUSH_VISIBILITY;
    let mr = LocalMr::reg(&peer, 0x4000, 4096, usage).expect("registration");

    let desc = mr.descriptor();
    assert_eq!(desc.as_bytes().len(), MR_DESCRIPTOR_SIZE);

    let remote = RemoteMr::from_descriptor(desc.as_bytes()).expect("deserialize own descriptor");
    assert_eq!(remote.len(), 4096);
    assert_eq!(remote.usage(), usage);
}

#[test]
fn scenario_bytes_deserialize_to_expected_tuple() {
    let bytes: [u8; 24] = [
        0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, 0x00, // raddr
        0x0f, 0x0e, 0x0d, 0x0c, 0x0b, 0x0a, 0x09, 0x08, // len
        0x13, 0x12, 0x11, 0x10, // rkey
        0x01, 0x00, 0x00, 0x00, // usage
    ];
    let remote = RemoteMr::from_descriptor(&bytes).expect("literal descriptor");
    assert_eq!(remote.len(), 0x0809_0a0b_0c0d_0e0f);
    assert_eq!(remote.usage(), MrUsage::READ_SRC);
}

#[test]
fn every_other_descriptor_length_is_nosupp() {
    for n in [0usize, 1, 8, 16, 23, 25, 32, 56] {
        let buf = vec![0u8; n];
        assert_eq!(
            RemoteMr::from_descriptor(&buf),
            Err(FlareError::NoSupp),
            "length {n}"
        );
    }
}

#[test]
fn unknown_usage_bits_are_nosupp() {
    let mut bytes = [0u8; 24];
    bytes[20] = 0x01;
    bytes[21] = 0x02; // 1 << 9 之上的未定义位
    assert_eq!(RemoteMr::from_descriptor(&bytes), Err(FlareError::NoSupp));
}

#[test]
fn descriptor_size_is_public_and_stable() {
    assert_eq!(MR_DESCRIPTOR_SIZE, 24);
    assert_eq!(mr_descriptor_size(), MR_DESCRIPTOR_SIZE);
}

#[test]
fn delete_and_drop_both_release_the_registration() {
    let provider = common::provider();
    let peer = common::peer(&provider);

    let mr = LocalMr::reg(&peer, 0x4000, 64, MrUsage::READ_SRC).expect("registration");
    mr.delete().expect("explicit deregistration");
    assert_eq!(provider.calls("dereg_mr"), 1);

    {
        let _mr = LocalMr::reg(&peer, 0x5000, 64, MrUsage::READ_SRC).expect("registration");
    }
    assert_eq!(provider.calls("dereg_mr"), 2);

    drop(peer);
    assert_eq!(provider.outstanding(), 0);
}

#[test]
fn dereg_failure_surfaces_on_delete() {
    let provider = common::provider();
    let peer = common::peer(&provider);
    let mr = LocalMr::reg(&peer, 0x4000, 64, MrUsage::READ_SRC).expect("registration");

    provider.fail("dereg_mr", libc::EIO);
    let err = mr.delete().expect_err("injected dereg failure");
    assert_eq!(
        err,
        FlareError::Provider {
            op: "dereg_mr",
            errno: libc::EIO
        }
    );
}

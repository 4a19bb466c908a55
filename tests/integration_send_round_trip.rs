//! End-to-end send/receive/reply scenarios over one in-process driver.

use anyhow::Result;
use ipc_rendezvous::{Driver, Error, Wait};
use std::sync::Arc;
use std::thread;

/// Happy path: one message, one reply, payloads preserved both ways.
#[test]
fn send_receive_reply_round_trip() -> Result<()> {
    let driver = Driver::new();
    let session = Arc::new(driver.open(100)?);
    let chid = session.channel_create(0)?;
    let coid = session.connect_attach(100, chid)?;

    let receiver = {
        let session = Arc::clone(&session);
        thread::spawn(move || -> Result<()> {
            let mut buf = [0xFFu8; 80];
            let (rcvid, info) = session.msg_receive(chid, &mut buf, Wait::forever())?;
            assert!(rcvid > 0);
            assert_eq!(info.nd, 0);
            assert_eq!(info.pid, 100);
            assert_eq!(info.chid, chid);
            assert_eq!(info.msglen, 11);
            assert_eq!(info.srcmsglen, 11);
            assert_eq!(&buf[..11], b"Hallo Welt\0");

            session.msg_reply(rcvid, 0, b"OK\0")?;
            Ok(())
        })
    };

    let mut reply = [0u8; 80];
    let status = session.msg_send(coid, b"Hallo Welt\0", &mut reply, Wait::forever())?;
    assert_eq!(status, 0);
    assert_eq!(&reply[..3], b"OK\0");

    receiver.join().unwrap()?;
    session.connect_detach(coid)?;
    session.channel_destroy(chid)?;
    Ok(())
}

/// An error reply surfaces the replier's errno as the sender's result.
#[test]
fn error_reply_reaches_sender() -> Result<()> {
    let driver = Driver::new();
    let session = Arc::new(driver.open(100)?);
    let chid = session.channel_create(0)?;
    let coid = session.connect_attach(100, chid)?;

    let receiver = {
        let session = Arc::clone(&session);
        thread::spawn(move || -> Result<()> {
            let mut buf = [0u8; 16];
            let (rcvid, _) = session.msg_receive(chid, &mut buf, Wait::forever())?;
            session.msg_error(rcvid, libc::EINVAL)?;
            Ok(())
        })
    };

    let mut reply = [0u8; 16];
    let err = session
        .msg_send(coid, b"request", &mut reply, Wait::forever())
        .unwrap_err();
    assert_eq!(err.errno(), -libc::EINVAL);

    receiver.join().unwrap()?;
    Ok(())
}

/// A receiver with a small buffer pulls the message tail via msg_read.
#[test]
fn partial_receive_then_msg_read() -> Result<()> {
    let driver = Driver::new();
    let session = Arc::new(driver.open(100)?);
    let chid = session.channel_create(0)?;
    let coid = session.connect_attach(100, chid)?;

    let payload: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
    let expected_tail = payload[16..].to_vec();

    let receiver = {
        let session = Arc::clone(&session);
        thread::spawn(move || -> Result<()> {
            let mut head = [0u8; 16];
            let (rcvid, info) = session.msg_receive(chid, &mut head, Wait::forever())?;
            assert_eq!(info.msglen, 1024);

            let mut tail = vec![0u8; 1008];
            let read = session.msg_read(rcvid, 16, &mut tail)?;
            assert_eq!(read, 1008);
            assert_eq!(tail, expected_tail);

            // out-of-range offset and unknown rcvid fail cleanly
            assert_eq!(
                session.msg_read(rcvid, 1025, &mut tail).unwrap_err(),
                Error::Invalid
            );
            assert_eq!(
                session.msg_read(rcvid + 999, 0, &mut tail).unwrap_err(),
                Error::NotFound
            );

            session.msg_reply(rcvid, 0, b"")?;
            Ok(())
        })
    };

    let mut reply = [0u8; 4];
    let status = session.msg_send(coid, &payload, &mut reply, Wait::forever())?;
    assert_eq!(status, 0);

    receiver.join().unwrap()?;
    Ok(())
}

/// The sender observes min(replier bytes, its own capacity) of the reply.
#[test]
fn reply_clamps_to_sender_capacity() -> Result<()> {
    let driver = Driver::new();
    let session = Arc::new(driver.open(100)?);
    let chid = session.channel_create(0)?;
    let coid = session.connect_attach(100, chid)?;

    let receiver = {
        let session = Arc::clone(&session);
        thread::spawn(move || -> Result<()> {
            let mut buf = [0u8; 16];
            let (rcvid, info) = session.msg_receive(chid, &mut buf, Wait::forever())?;
            assert_eq!(info.dstmsglen, 4);
            session.msg_reply(rcvid, 100, b"abcdefgh")?;
            Ok(())
        })
    };

    let mut reply = [0u8; 4];
    let status = session.msg_send(coid, b"req", &mut reply, Wait::forever())?;
    // the replier asked for 100, clamped to the bytes it actually supplied
    assert_eq!(status, 8);
    assert_eq!(&reply, b"abcd");

    receiver.join().unwrap()?;
    Ok(())
}

/// Messages queued on one channel are delivered in enqueue order.
#[test]
fn fifo_delivery_order() -> Result<()> {
    let driver = Driver::new();
    let session = driver.open(100)?;
    let chid = session.channel_create(0)?;
    let coid = session.connect_attach(100, chid)?;

    for tag in 0..8u8 {
        session.msg_send_noreply(coid, &[tag])?;
    }

    let mut buf = [0u8; 4];
    for tag in 0..8u8 {
        let (rcvid, _) = session.msg_receive(chid, &mut buf, Wait::immediate())?;
        assert!(rcvid > 0);
        assert_eq!(buf[0], tag);
    }
    Ok(())
}

/// Scatter/gather sends see the same bytes as their scalar twins.
#[test]
fn sendv_gathers_and_scatters() -> Result<()> {
    let driver = Driver::new();
    let session = Arc::new(driver.open(100)?);
    let chid = session.channel_create(0)?;
    let coid = session.connect_attach(100, chid)?;

    let receiver = {
        let session = Arc::clone(&session);
        thread::spawn(move || -> Result<()> {
            let mut buf = [0u8; 32];
            let (rcvid, info) = session.msg_receive(chid, &mut buf, Wait::forever())?;
            assert_eq!(info.msglen, 10);
            assert_eq!(&buf[..10], b"helloworld");
            session.msg_reply(rcvid, 0, b"wide reply")?;
            Ok(())
        })
    };

    let mut first = [0u8; 4];
    let mut second = [0u8; 16];
    let status = {
        let parts: Vec<&[u8]> = vec![b"hello", b"world"];
        let mut reply_parts: Vec<&mut [u8]> = vec![&mut first, &mut second];
        session.msg_sendv(coid, &parts, &mut reply_parts, Wait::forever())?
    };
    assert_eq!(status, 0);
    assert_eq!(&first, b"wide");
    assert_eq!(&second[..6], b" reply");

    receiver.join().unwrap()?;
    Ok(())
}

/// Each delivered message carries a distinct rcvid.
#[test]
fn rcvids_are_unique() -> Result<()> {
    let driver = Driver::new();
    let session = driver.open(100)?;
    let chid = session.channel_create(0)?;
    let coid = session.connect_attach(100, chid)?;

    let mut seen = std::collections::HashSet::new();
    let mut buf = [0u8; 4];
    for round in 0..64u8 {
        session.msg_send_noreply(coid, &[round])?;
        let (rcvid, _) = session.msg_receive(chid, &mut buf, Wait::immediate())?;
        assert!(seen.insert(rcvid), "rcvid {} was reused", rcvid);
    }
    Ok(())
}

//! Timeouts, interruption, and the sender-abort interlock under load.

use anyhow::Result;
use ipc_rendezvous::{Driver, Error, Interrupt, Wait};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A send with no receiver expires after its timeout and leaves the
/// channel queue empty.
#[test]
fn send_timeout_with_no_receiver() -> Result<()> {
    let driver = Driver::new();
    let session = driver.open(100)?;
    let chid = session.channel_create(0)?;
    let coid = session.connect_attach(100, chid)?;

    let mut reply = [0u8; 8];
    let started = Instant::now();
    assert_eq!(
        session
            .msg_send(coid, b"anyone?", &mut reply, Wait::for_ms(50))
            .unwrap_err(),
        Error::TimedOut
    );
    assert!(started.elapsed() >= Duration::from_millis(50));

    // the aborted record was revoked from the queue
    let mut buf = [0u8; 8];
    assert_eq!(
        session
            .msg_receive(chid, &mut buf, Wait::immediate())
            .unwrap_err(),
        Error::TimedOut
    );
    Ok(())
}

/// A receive with nothing queued and a zero timeout returns at once.
#[test]
fn receive_immediate_empty() -> Result<()> {
    let driver = Driver::new();
    let session = driver.open(100)?;
    let chid = session.channel_create(0)?;

    let mut buf = [0u8; 8];
    let started = Instant::now();
    assert_eq!(
        session
            .msg_receive(chid, &mut buf, Wait::immediate())
            .unwrap_err(),
        Error::TimedOut
    );
    assert!(started.elapsed() < Duration::from_millis(100));
    Ok(())
}

/// A receive deadline expires when no sender shows up.
#[test]
fn receive_timeout_elapses() -> Result<()> {
    let driver = Driver::new();
    let session = driver.open(100)?;
    let chid = session.channel_create(0)?;

    let mut buf = [0u8; 8];
    let started = Instant::now();
    assert_eq!(
        session
            .msg_receive(chid, &mut buf, Wait::for_ms(50))
            .unwrap_err(),
        Error::TimedOut
    );
    assert!(started.elapsed() >= Duration::from_millis(50));
    Ok(())
}

/// Raising an interrupt token cancels a blocked send and receive.
#[test]
fn interrupt_cancels_blocking_calls() -> Result<()> {
    let driver = Driver::new();
    let session = Arc::new(driver.open(100)?);
    let chid = session.channel_create(0)?;
    let coid = session.connect_attach(100, chid)?;

    let interrupt = Interrupt::new();
    let raiser = {
        let interrupt = interrupt.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            interrupt.raise();
        })
    };

    let mut reply = [0u8; 8];
    assert_eq!(
        session
            .msg_send(
                coid,
                b"cancel me",
                &mut reply,
                Wait::forever().interruptible(&interrupt)
            )
            .unwrap_err(),
        Error::Interrupted
    );
    raiser.join().unwrap();

    interrupt.clear();
    let raiser = {
        let interrupt = interrupt.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            interrupt.raise();
        })
    };

    let mut buf = [0u8; 8];
    assert_eq!(
        session
            .msg_receive(chid, &mut buf, Wait::forever().interruptible(&interrupt))
            .unwrap_err(),
        Error::Interrupted
    );
    raiser.join().unwrap();
    Ok(())
}

/// When the sender times out while its message is pending, exactly one
/// side wins: the sender revokes the record (late reply sees NotFound),
/// or the reply lands first (the sender adopts it).
#[test]
fn timeout_races_reply_on_pending_record() -> Result<()> {
    let driver = Driver::new();
    let session = Arc::new(driver.open(100)?);
    let chid = session.channel_create(0)?;
    let coid = session.connect_attach(100, chid)?;

    for round in 0..40u64 {
        let receiver = {
            let session = Arc::clone(&session);
            thread::spawn(move || -> Result<bool> {
                let mut buf = [0u8; 8];
                let (rcvid, _) = session.msg_receive(chid, &mut buf, Wait::forever())?;
                // land the reply right around the sender's deadline
                thread::sleep(Duration::from_millis(10 + round % 3));
                match session.msg_reply(rcvid, 0, b"late") {
                    Ok(()) => Ok(true),
                    Err(Error::NotFound) => Ok(false),
                    Err(other) => Err(other.into()),
                }
            })
        };

        let mut reply = [0u8; 8];
        let send_result = session.msg_send(coid, b"race", &mut reply, Wait::for_ms(10));
        let replied = receiver.join().unwrap()?;

        match send_result {
            Ok(status) => {
                // the reply won the race and must be fully visible
                assert_eq!(status, 0);
                assert!(replied, "sender saw a reply nobody sent (round {round})");
                assert_eq!(&reply[..4], b"late");
            }
            Err(Error::TimedOut) => {
                assert!(!replied, "reply and timeout both claimed round {round}");
            }
            Err(other) => panic!("unexpected send outcome: {other:?}"),
        }
    }
    Ok(())
}

/// A timed-out sender whose message is being received at that very
/// moment still resolves: it waits out RECEIVING and revokes or adopts.
#[test]
fn timeout_races_receive_window() -> Result<()> {
    let driver = Driver::new();
    let session = Arc::new(driver.open(100)?);
    let chid = session.channel_create(0)?;
    let coid = session.connect_attach(100, chid)?;

    for _ in 0..40 {
        let receiver = {
            let session = Arc::clone(&session);
            thread::spawn(move || -> Result<()> {
                let mut buf = [0u8; 8];
                match session.msg_receive(chid, &mut buf, Wait::for_ms(50)) {
                    Ok((rcvid, _)) => {
                        let _ = session.msg_reply(rcvid, 0, b"ok");
                        Ok(())
                    }
                    Err(Error::TimedOut) => Ok(()),
                    Err(other) => Err(other.into()),
                }
            })
        };

        let mut reply = [0u8; 8];
        match session.msg_send(coid, b"spin", &mut reply, Wait::for_ms(1)) {
            Ok(0) | Err(Error::TimedOut) => {}
            other => panic!("unexpected send outcome: {other:?}"),
        }
        receiver.join().unwrap()?;
    }
    Ok(())
}

//! PAIR Integration Tests

use portal::prelude::*;
use std::time::Duration;

fn config(broker: &Broker) -> PortalConfig {
    PortalConfig::new().with_broker(broker.clone())
}

/// Bind, connect, exchange in both directions, then close the binder while
/// the connector is blocked in `recv`.
#[compio::test]
async fn test_pair_exchange_and_close() -> Result<()> {
    portal::dev_tracing::init_tracing();
    let broker = Broker::new();
    let p0 = portal::pair::new(config(&broker));
    let p1 = portal::pair::new(config(&broker));

    p0.bind("/x")?;
    p1.connect("/x").await?;

    let (sent, got) = futures::join!(p0.send("a"), p1.recv());
    sent?;
    assert_eq!(got?, Some(Bytes::from_static(b"a")));

    let (sent, got) = futures::join!(p1.send("b"), p0.recv());
    sent?;
    assert_eq!(got?, Some(Bytes::from_static(b"b")));

    // `join!` polls the receive first, so it is already waiting when the
    // binder closes.
    let closer = async {
        p0.close();
    };
    let (got, ()) = futures::join!(p1.recv(), closer);
    assert_eq!(got, Ok(None));
    assert!(!p1.is_ready());
    Ok(())
}

#[compio::test]
async fn test_pair_rejects_extra_peer() -> Result<()> {
    let broker = Broker::new();
    let p0 = portal::pair::new(config(&broker));
    let p1 = portal::pair::new(config(&broker));
    let p2 = portal::pair::new(config(&broker));

    p0.bind("/pair-exclusive")?;
    p1.connect("/pair-exclusive").await?;
    p2.connect("/pair-exclusive").await?;

    compio::time::sleep(Duration::from_millis(20)).await;
    assert!(p0.protocol().is_paired());
    assert!(!p2.protocol().is_paired(), "rejected peer still paired");

    // The original peer is unaffected.
    let (sent, got) = futures::join!(p1.send("still here"), p0.recv());
    sent?;
    assert_eq!(got?, Some(Bytes::from_static(b"still here")));

    // Nothing reaches the rejected portal.
    let lost = compio::time::timeout(Duration::from_millis(30), p2.recv()).await;
    assert!(lost.is_err());
    Ok(())
}

#[compio::test]
async fn test_pair_not_ready_before_bind() {
    let p = portal::pair::new(PortalConfig::default());
    assert_eq!(p.send("early").await, Err(PortalError::NotReady));
    assert_eq!(p.recv().await, Err(PortalError::NotReady));
}

#[compio::test]
async fn test_pair_async_send_queues() -> Result<()> {
    let broker = Broker::new();
    let p0 = portal::pair::new(config(&broker).with_capacity(4));
    let p1 = portal::pair::new(config(&broker));

    p0.bind("/pair-async")?;
    p1.connect("/pair-async").await?;

    // Returns without anyone receiving.
    let sent = compio::time::timeout(Duration::from_millis(100), p0.send("queued")).await;
    assert!(matches!(sent, Ok(Ok(()))));

    assert_eq!(p1.recv().await?, Some(Bytes::from_static(b"queued")));
    Ok(())
}

#[compio::test]
async fn test_pair_send_unblocks_on_close() -> Result<()> {
    let broker = Broker::new();
    let p0 = portal::pair::new(config(&broker));
    let p1 = portal::pair::new(config(&broker));

    p0.bind("/pair-send-close")?;
    p1.connect("/pair-send-close").await?;

    let closer = async {
        p0.close();
    };
    let (sent, ()) = futures::join!(p0.send("never read"), closer);
    assert_eq!(sent, Ok(()));
    Ok(())
}

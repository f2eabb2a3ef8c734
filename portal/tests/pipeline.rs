//! PUSH/PULL Integration Tests
//!
//! Load balancing from one pusher to several pullers, and fair fan-in from
//! several pushers to one puller.

use portal::prelude::*;
use std::collections::BTreeSet;
use std::time::Duration;

fn config(broker: &Broker) -> PortalConfig {
    PortalConfig::new().with_broker(broker.clone())
}

/// Receive until the pipeline goes quiet.
async fn drain(pull: &ReadOnly<portal::pull::Pull>) -> Vec<Bytes> {
    let mut got = Vec::new();
    while let Ok(Ok(Some(value))) =
        compio::time::timeout(Duration::from_millis(100), pull.recv()).await
    {
        got.push(value);
    }
    got
}

#[compio::test]
async fn test_push_pull_delivers() -> Result<()> {
    portal::dev_tracing::init_tracing();
    let broker = Broker::new();
    let pull = portal::pull::new(config(&broker));
    let push = portal::push::new(config(&broker));

    pull.bind("/pipeline")?;
    push.connect("/pipeline").await?;

    let (sent, got) = futures::join!(push.send("job-1"), pull.recv());
    sent?;
    assert_eq!(got?, Some(Bytes::from_static(b"job-1")));
    Ok(())
}

#[compio::test]
async fn test_push_delivers_each_message_once() -> Result<()> {
    let broker = Broker::new();
    let pull_a = portal::pull::new(config(&broker));
    let pull_b = portal::pull::new(config(&broker));
    let push = portal::push::new(config(&broker).with_capacity(8));

    pull_a.bind("/workers-a")?;
    pull_b.bind("/workers-b")?;
    push.connect("/workers-a").await?;
    push.connect("/workers-b").await?;
    assert_eq!(push.protocol().peer_count(), 2);

    let expected: BTreeSet<Bytes> = (0..6).map(|i| Bytes::from(format!("job-{i}"))).collect();
    for value in &expected {
        push.send(value.clone()).await?;
    }

    let (a, b) = futures::join!(drain(&pull_a), drain(&pull_b));
    assert_eq!(a.len() + b.len(), expected.len(), "a={a:?} b={b:?}");

    let received: BTreeSet<Bytes> = a.into_iter().chain(b).collect();
    assert_eq!(received, expected);
    Ok(())
}

#[compio::test]
async fn test_pull_fans_in() -> Result<()> {
    let broker = Broker::new();
    let pull = portal::pull::new(config(&broker));
    let push_a = portal::push::new(config(&broker).with_capacity(1));
    let push_b = portal::push::new(config(&broker).with_capacity(1));

    pull.bind("/fan-in")?;
    push_a.connect("/fan-in").await?;
    push_b.connect("/fan-in").await?;

    push_a.send("from-a").await?;
    push_b.send("from-b").await?;

    let received: BTreeSet<Bytes> = drain(&pull).await.into_iter().collect();
    let expected: BTreeSet<Bytes> = [Bytes::from_static(b"from-a"), Bytes::from_static(b"from-b")]
        .into_iter()
        .collect();
    assert_eq!(received, expected);
    Ok(())
}

#[compio::test]
async fn test_push_recv_returns_nothing() -> Result<()> {
    let broker = Broker::new();
    let pull = portal::pull::new(config(&broker));
    let push = portal::push::new(config(&broker)).into_inner();

    pull.bind("/push-recv")?;
    push.connect("/push-recv").await?;

    // The receive side of a push portal is closed at init.
    let got = compio::time::timeout(Duration::from_secs(1), push.recv()).await;
    assert!(matches!(got, Ok(Ok(None))));
    Ok(())
}

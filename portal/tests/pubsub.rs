//! PUB/SUB Integration Tests
//!
//! Subscriber-side topic filtering: `All`, `None`, prefixes, custom
//! predicates, and what unsubscribing does to queued values.

use portal::prelude::*;
use std::time::Duration;

fn config(broker: &Broker) -> PortalConfig {
    PortalConfig::new().with_broker(broker.clone())
}

#[compio::test]
async fn test_topic_all_and_none() -> Result<()> {
    portal::dev_tracing::init_tracing();
    let broker = Broker::new();
    let publisher = portal::publisher::new(config(&broker));
    let sub_all = portal::subscriber::new(config(&broker));
    let sub_none = portal::subscriber::new(config(&broker));

    sub_all.subscribe(Topic::All)?;
    sub_none.subscribe(Topic::None)?;

    publisher.bind("/news")?;
    sub_all.connect("/news").await?;
    sub_none.connect("/news").await?;
    assert_eq!(publisher.protocol().peer_count(), 2);

    let (sent, got) = futures::join!(publisher.send("x"), sub_all.recv());
    sent?;
    assert_eq!(got?, Some(Bytes::from_static(b"x")));

    let nothing = compio::time::timeout(Duration::from_millis(50), sub_none.recv()).await;
    assert!(nothing.is_err(), "TopicNone received a value");
    Ok(())
}

#[compio::test]
async fn test_prefix_topic_filters() -> Result<()> {
    let broker = Broker::new();
    let publisher = portal::publisher::new(config(&broker).with_capacity(4));
    let sub = portal::subscriber::new(config(&broker));

    sub.subscribe(Topic::prefix("news."))?;
    publisher.bind("/prefixed")?;
    sub.connect("/prefixed").await?;

    publisher.send("weather.today").await?;
    publisher.send("news.today").await?;

    let got = compio::time::timeout(Duration::from_secs(1), sub.recv()).await;
    assert!(matches!(got, Ok(Ok(Some(ref v))) if v.as_ref() == b"news.today"));
    Ok(())
}

#[compio::test]
async fn test_custom_topic() -> Result<()> {
    let broker = Broker::new();
    let publisher = portal::publisher::new(config(&broker).with_capacity(4));
    let sub = portal::subscriber::new(config(&broker));

    sub.subscribe(Topic::custom(|value: &[u8]| value.len() > 3))?;
    publisher.bind("/custom")?;
    sub.connect("/custom").await?;

    publisher.send("abc").await?;
    publisher.send("abcd").await?;

    let got = compio::time::timeout(Duration::from_secs(1), sub.recv()).await;
    assert!(matches!(got, Ok(Ok(Some(ref v))) if v.as_ref() == b"abcd"));
    Ok(())
}

#[compio::test]
async fn test_duplicate_subscription_rejected() -> Result<()> {
    let sub = portal::subscriber::new(PortalConfig::default());
    sub.subscribe(Topic::prefix("a"))?;
    assert_eq!(
        sub.subscribe(Topic::prefix("a")),
        Err(PortalError::AlreadySubscribed)
    );
    sub.subscribe(Topic::prefix("b"))?;
    assert_eq!(sub.protocol().subscription_count(), 2);
    Ok(())
}

#[compio::test]
async fn test_unsubscribe_keeps_queued_values() -> Result<()> {
    let broker = Broker::new();
    let publisher = portal::publisher::new(config(&broker).with_capacity(4));
    let sub = portal::subscriber::new(config(&broker).with_capacity(4));

    sub.subscribe(Topic::All)?;
    publisher.bind("/unsubscribe")?;
    sub.connect("/unsubscribe").await?;

    publisher.send("one").await?;
    compio::time::sleep(Duration::from_millis(30)).await;

    sub.unsubscribe(&Topic::All);
    publisher.send("two").await?;

    assert_eq!(sub.recv().await?, Some(Bytes::from_static(b"one")));
    let later = compio::time::timeout(Duration::from_millis(50), sub.recv()).await;
    assert!(later.is_err(), "value published after unsubscribe arrived");
    Ok(())
}

#[compio::test]
async fn test_sync_publish_waits_for_every_subscriber() -> Result<()> {
    let broker = Broker::new();
    let publisher = portal::publisher::new(config(&broker));
    let first = portal::subscriber::new(config(&broker));
    let second = portal::subscriber::new(config(&broker));

    first.subscribe(Topic::All)?;
    second.subscribe(Topic::All)?;
    publisher.bind("/fanout")?;
    first.connect("/fanout").await?;
    second.connect("/fanout").await?;

    // Only one subscriber reads: the send stays pending.
    let (sent, got) = futures::join!(
        compio::time::timeout(Duration::from_millis(50), publisher.send("tick")),
        first.recv()
    );
    assert!(sent.is_err());
    assert_eq!(got?, Some(Bytes::from_static(b"tick")));

    assert_eq!(second.recv().await?, Some(Bytes::from_static(b"tick")));
    Ok(())
}

#[compio::test]
async fn test_publish_without_subscribers() -> Result<()> {
    let broker = Broker::new();
    let publisher = portal::publisher::new(config(&broker));
    publisher.bind("/empty-room")?;

    let sent = compio::time::timeout(Duration::from_secs(1), publisher.send("void")).await;
    assert!(matches!(sent, Ok(Ok(()))));
    Ok(())
}

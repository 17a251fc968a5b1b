use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// One message addressed to one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub message: String,
}

impl Notification {
    pub fn new(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to write notifications: {0}")]
    Io(#[from] std::io::Error),

    #[error("Notification receiver has been dropped")]
    Closed,
}

/// Delivers a cycle's notifications. Receives the whole ordered batch in one
/// call so the implementation can batch or throttle; delivery is not retried
/// by the caller.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, batch: Vec<Notification>) -> Result<(), DispatchError>;
}

/// Prints `<channel> <message>` lines on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutDispatcher;

#[async_trait]
impl Dispatcher for StdoutDispatcher {
    async fn dispatch(&self, batch: Vec<Notification>) -> Result<(), DispatchError> {
        let mut out = String::new();
        for n in &batch {
            out.push_str(&n.channel);
            out.push(' ');
            out.push_str(&n.message);
            out.push('\n');
        }
        let mut stdout = tokio::io::stdout();
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// Forwards each batch to a host over a channel.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<Vec<Notification>>,
}

impl ChannelDispatcher {
    pub fn new(tx: mpsc::Sender<Vec<Notification>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Dispatcher for ChannelDispatcher {
    async fn dispatch(&self, batch: Vec<Notification>) -> Result<(), DispatchError> {
        self.tx.send(batch).await.map_err(|_| DispatchError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_dispatcher_forwards_batch() {
        let (tx, mut rx) = mpsc::channel(4);
        let dispatcher = ChannelDispatcher::new(tx);

        let batch = vec![
            Notification::new("#a", "one"),
            Notification::new("#b", "two"),
        ];
        dispatcher.dispatch(batch.clone()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), batch);
    }

    #[tokio::test]
    async fn test_channel_dispatcher_reports_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let dispatcher = ChannelDispatcher::new(tx);

        let result = dispatcher.dispatch(vec![Notification::new("#a", "x")]).await;
        assert!(matches!(result, Err(DispatchError::Closed)));
    }
}

pub use chatcore::net::{Transport, TransportEvent, TransportFactory};
pub use chatsync_tokio_transport::TokioWebSocketTransportFactory;

#[cfg(test)]
pub mod mock {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// Records every frame it is asked to send.
    #[derive(Default)]
    pub struct MockTransport {
        pub sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, text: &str) -> Result<(), anyhow::Error> {
            self.sent
                .lock()
                .expect("mutex should not be poisoned")
                .push(text.to_string());
            Ok(())
        }

        async fn disconnect(&self) {}
    }

    /// Hands out one connection per call and keeps the server side of each
    /// so tests can push frames or drop the link.
    #[derive(Default)]
    pub struct MockTransportFactory {
        pub connections: Mutex<Vec<(Arc<MockTransport>, mpsc::Sender<TransportEvent>)>>,
        pub urls: Mutex<Vec<String>>,
    }

    impl MockTransportFactory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn latest(&self) -> Option<(Arc<MockTransport>, mpsc::Sender<TransportEvent>)> {
            self.connections
                .lock()
                .expect("mutex should not be poisoned")
                .last()
                .cloned()
        }
    }

    #[async_trait]
    impl TransportFactory for MockTransportFactory {
        async fn create_transport(
            &self,
            url: &str,
        ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
            let (tx, rx) = mpsc::channel(32);
            let transport = Arc::new(MockTransport::default());
            let _ = tx.send(TransportEvent::Connected).await;
            self.urls
                .lock()
                .expect("mutex should not be poisoned")
                .push(url.to_string());
            self.connections
                .lock()
                .expect("mutex should not be poisoned")
                .push((transport.clone(), tx));
            Ok((transport, rx))
        }
    }
}

//! # Request / Reply Flows
//!
//! A client endpoint sends requests to a server endpoint whose handler
//! replies through the owning bus.
//!
//! ## Flows Tested
//!
//! 1. **Round trip**: reply lands in the client queue, correlated to the request
//! 2. **Reply outside a handler**: rejected, nothing reaches the network
//! 3. **Transactional sends**: a failing handler's outgoing messages are discarded

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use courier_bus::adapters::{InMemoryNetwork, MessageHandler};
    use courier_bus::{BusConfig, BusError, BusHandle, PipelineError, TransactionContext};
    use courier_types::{headers, LogicalMessage};

    use crate::integration::support::{
        endpoint, eventually, Collector, Request, Responder, CLIENT, SERVER,
    };

    const LIMIT: Duration = Duration::from_secs(10);

    /// Forwards a request to the server, then fails.
    struct ForwardThenFail;

    #[async_trait]
    impl MessageHandler for ForwardThenFail {
        async fn handle(
            &self,
            _message: &LogicalMessage,
            context: &TransactionContext,
        ) -> Result<(), PipelineError> {
            BusHandle::from_context(context)?
                .send(&Request { id: 99 })
                .await?;
            Err(PipelineError::Handler("downstream rejected".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_reply_round_trip() {
        let network = InMemoryNetwork::new();
        let collector = Arc::new(Collector::default());

        let server = endpoint(
            &network,
            SERVER,
            Arc::new(Responder { work: Duration::from_millis(20) }),
            BusConfig::default(),
            None,
        );
        let client = endpoint(&network, CLIENT, collector.clone(), BusConfig::default(), None);

        server.start(2).await.unwrap();
        client.start(1).await.unwrap();

        for id in 0..3 {
            client.send(&Request { id }).await.unwrap();
        }

        assert!(eventually(LIMIT, || collector.len() == 3).await);

        let replies = collector.seen.lock().clone();
        for reply in &replies {
            assert!(reply.header(headers::CORRELATION_ID).is_some());
            assert_eq!(reply.header(headers::RETURN_ADDRESS), Some(SERVER));
        }
        let mut ids: Vec<u32> = replies
            .iter()
            .map(|r| r.payload::<crate::integration::support::Response>().unwrap().id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);

        client.shutdown().await.unwrap();
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reply_outside_handler_is_rejected() {
        let network = InMemoryNetwork::new();
        let client = endpoint(
            &network,
            CLIENT,
            Arc::new(Collector::default()),
            BusConfig::default(),
            None,
        );
        client.start(1).await.unwrap();

        let result = client.reply(&"not inside a handler").await;

        assert!(matches!(result, Err(BusError::NotInsideHandler)));
        assert_eq!(network.delivered_count(), 0);
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_outside_handler_delivers_immediately() {
        let network = InMemoryNetwork::new();
        network.create_queue(SERVER);
        let client = endpoint(
            &network,
            CLIENT,
            Arc::new(Collector::default()),
            BusConfig::default(),
            None,
        );

        client.send(&Request { id: 1 }).await.unwrap();

        assert_eq!(network.queue_len(SERVER), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_handler_discards_outgoing_messages() {
        let network = InMemoryNetwork::new();
        network.create_queue(SERVER);

        let relay = endpoint(
            &network,
            "it.relay",
            Arc::new(ForwardThenFail),
            BusConfig::default(),
            None,
        );
        relay.start(1).await.unwrap();

        network.deliver("it.relay", network_message(&Request { id: 2 }));
        assert!(eventually(LIMIT, || network.queue_len("it.relay") == 0).await);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(network.queue_len(SERVER), 0);
        relay.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_enlisted_send_waits_for_commit() {
        let network = InMemoryNetwork::new();
        network.create_queue(SERVER);
        let client = endpoint(
            &network,
            CLIENT,
            Arc::new(Collector::default()),
            BusConfig::default(),
            None,
        );

        let context = TransactionContext::new();
        client.send_within(&context, &Request { id: 7 }).await.unwrap();
        assert_eq!(network.queue_len(SERVER), 0);

        context.commit().unwrap();
        assert_eq!(network.queue_len(SERVER), 1);
    }

    fn network_message(request: &Request) -> courier_types::TransportMessage {
        use courier_bus::adapters::JsonSerializer;
        use courier_bus::Serializer;

        let logical = LogicalMessage::from_payload(request).unwrap();
        JsonSerializer.serialize(&logical).unwrap()
    }
}

//! # Scaling Flows
//!
//! Worker pool resizing and the shared parallelism ceiling, observed
//! through a tracker step in the pipeline.
//!
//! ## Flows Tested
//!
//! 1. **Resize**: grow, shrink (most recent first), repeat idempotently
//! 2. **Ceiling**: more workers than slots never exceeds the slot count
//! 3. **Serial**: a ceiling of one processes strictly one at a time

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use courier_bus::adapters::InMemoryNetwork;
    use courier_bus::BusConfig;

    use crate::integration::support::{
        endpoint, endpoint_with_tracker, eventually, Collector, ConcurrencyTracker, Request, SERVER,
    };

    const LIMIT: Duration = Duration::from_secs(30);

    fn names(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
        range.map(|n| format!("courier worker {n}")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_converges_and_removes_newest_first() {
        let network = InMemoryNetwork::new();
        let bus = endpoint(
            &network,
            SERVER,
            Arc::new(Collector::default()),
            BusConfig::default(),
            None,
        );

        bus.start(5).await.unwrap();
        assert_eq!(bus.worker_names().await, names(1..=5));

        bus.set_worker_count(2).await.unwrap();
        assert_eq!(bus.worker_names().await, names(1..=2));

        bus.set_worker_count(2).await.unwrap();
        assert_eq!(bus.worker_names().await, names(1..=2));

        bus.set_worker_count(4).await.unwrap();
        assert_eq!(bus.worker_names().await, names(1..=4));

        bus.set_worker_count(0).await.unwrap();
        assert_eq!(bus.worker_count().await, 0);

        bus.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallelism_ceiling_holds_with_surplus_workers() {
        let network = InMemoryNetwork::new();
        let tracker = ConcurrencyTracker::holding(Duration::from_millis(50));
        let bus = endpoint_with_tracker(
            &network,
            SERVER,
            Arc::new(Collector::default()),
            BusConfig::default().with_max_parallelism(2),
            None,
            Some(tracker.clone()),
        );

        bus.start(6).await.unwrap();
        for id in 0..10 {
            bus.send(&Request { id }).await.unwrap();
        }

        assert!(eventually(LIMIT, || tracker.finished() == 10).await);
        assert!(tracker.peak() <= 2);
        assert!(tracker.peak() >= 1);

        bus.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_of_one_serializes_processing() {
        let network = InMemoryNetwork::new();
        let tracker = ConcurrencyTracker::holding(Duration::from_millis(100));
        let bus = endpoint_with_tracker(
            &network,
            SERVER,
            Arc::new(Collector::default()),
            BusConfig::default().with_max_parallelism(1),
            None,
            Some(tracker.clone()),
        );

        bus.start(3).await.unwrap();
        let started = tokio::time::Instant::now();
        bus.send(&Request { id: 1 }).await.unwrap();
        bus.send(&Request { id: 2 }).await.unwrap();

        assert!(eventually(LIMIT, || tracker.finished() == 2).await);
        assert_eq!(tracker.peak(), 1);
        assert!(started.elapsed() >= Duration::from_millis(200));

        bus.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_scaling_while_processing_loses_nothing() {
        let network = InMemoryNetwork::new();
        let collector = Arc::new(Collector::default());
        let bus = endpoint(
            &network,
            SERVER,
            collector.clone(),
            BusConfig::default().with_max_parallelism(3),
            None,
        );

        bus.start(1).await.unwrap();
        for id in 0..5 {
            bus.send(&Request { id }).await.unwrap();
        }
        bus.set_worker_count(4).await.unwrap();
        for id in 5..10 {
            bus.send(&Request { id }).await.unwrap();
        }
        bus.set_worker_count(1).await.unwrap();

        assert!(eventually(LIMIT, || collector.len() == 10).await);
        bus.shutdown().await.unwrap();
    }
}

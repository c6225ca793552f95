use resequencer::{
    ConfigError, NaturalOrder, ResequencerConfig, ResequencerEngine, ResequencerError,
    SequenceNumberStrategy, SinkError, StreamResequencer,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_engine() -> (ResequencerEngine<u64, NaturalOrder>, Arc<Mutex<Vec<u64>>>) {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let engine = ResequencerEngine::new(
            SequenceNumberStrategy::natural(),
            move |n: u64| -> Result<(), SinkError> {
                sink.lock().unwrap().push(n);
                Ok(())
            },
        );
        (engine, delivered)
    }

    #[derive(Debug, Clone)]
    struct Packet {
        seq: Option<u64>,
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_delivers_in_order() {
        let (engine, delivered) = recording_engine();
        let stream = StreamResequencer::new(engine, &ResequencerConfig::default()).unwrap();
        let handle = stream.start().unwrap();

        for n in [3, 1, 2] {
            stream.insert(n).await.unwrap();
        }
        assert!(delivered.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(*delivered.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(stream.engine().size(), 0);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_delivers_immediately_when_signalled() {
        let (engine, delivered) = recording_engine();
        engine.set_last_delivered(Some(0));
        let stream = StreamResequencer::new(engine, &ResequencerConfig::default()).unwrap();
        let handle = stream.start().unwrap();

        stream.insert(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*delivered.lock().unwrap(), vec![1]);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_applies_config() {
        let (engine, _delivered) = recording_engine();
        let config = ResequencerConfig::default()
            .with_timeout(Duration::from_millis(300))
            .with_reject_old(true)
            .with_capacity(8);
        let stream = StreamResequencer::new(engine, &config).unwrap();

        assert_eq!(stream.engine().timeout(), Duration::from_millis(300));
        assert!(stream.engine().is_reject_old());
        assert_eq!(stream.capacity(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_capacity_backpressure() {
        let (engine, delivered) = recording_engine();
        let config = ResequencerConfig::default().with_capacity(2);
        let stream = StreamResequencer::new(engine, &config).unwrap();
        let handle = stream.start().unwrap();

        stream.insert(10).await.unwrap();
        stream.insert(11).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(500), stream.insert(12)).await;
        assert!(blocked.is_err());
        assert_eq!(stream.engine().size(), 2);

        // 10 times out, the loop drains 10 and 11, and the producer proceeds.
        stream.insert(12).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(*delivered.lock().unwrap(), vec![10, 11, 12]);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_ignore_invalid() {
        let config = ResequencerConfig::default().with_ignore_invalid(true);
        let engine: ResequencerEngine<Packet, _> = ResequencerEngine::new(
            SequenceNumberStrategy::new(|p: &Packet| p.seq),
            |_: Packet| -> Result<(), SinkError> { Ok(()) },
        );
        let stream = StreamResequencer::new(engine, &config).unwrap();

        stream.insert(Packet { seq: None }).await.unwrap();
        assert_eq!(stream.engine().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_surfaces_invalid_by_default() {
        let engine: ResequencerEngine<Packet, _> = ResequencerEngine::new(
            SequenceNumberStrategy::new(|p: &Packet| p.seq),
            |_: Packet| -> Result<(), SinkError> { Ok(()) },
        );
        let stream = StreamResequencer::new(engine, &ResequencerConfig::default()).unwrap();

        let result = stream.insert(Packet { seq: None }).await;
        assert!(matches!(result, Err(ResequencerError::InvalidItem)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_keeps_delivering_after_sink_failure() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let engine: ResequencerEngine<u64, NaturalOrder> = ResequencerEngine::new(
            SequenceNumberStrategy::natural(),
            move |n: u64| -> Result<(), SinkError> {
                if n == 2 {
                    return Err(SinkError::Closed);
                }
                sink.lock().unwrap().push(n);
                Ok(())
            },
        );
        engine.set_last_delivered(Some(0));
        let stream = StreamResequencer::new(engine, &ResequencerConfig::default()).unwrap();
        let handle = stream.start().unwrap();

        for n in [1, 2, 3] {
            stream.insert(n).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*delivered.lock().unwrap(), vec![1, 3]);
        assert_eq!(stream.engine().last_delivered(), Some(3));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_shutdown_stops_engine() {
        let (engine, delivered) = recording_engine();
        let stream = StreamResequencer::new(engine, &ResequencerConfig::default()).unwrap();
        let handle = stream.start().unwrap();
        assert!(stream.engine().is_started());

        stream.insert(7).await.unwrap();
        handle.shutdown().await.unwrap();

        assert!(!stream.engine().is_started());
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert!(delivered.lock().unwrap().is_empty());
        assert_eq!(stream.engine().size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_waiting_producers() {
        let (engine, delivered) = recording_engine();
        let config = ResequencerConfig::default().with_capacity(1);
        let stream = StreamResequencer::new(engine, &config).unwrap();
        let handle = stream.start().unwrap();

        stream.insert(10).await.unwrap();

        let producer = {
            let stream = stream.clone();
            tokio::spawn(async move { stream.insert(20).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!producer.is_finished());

        handle.shutdown().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .expect("waiting producer should be released by shutdown")
            .unwrap();
        assert!(matches!(result, Err(ResequencerError::NotStarted)));

        let late = stream.insert(30).await;
        assert!(matches!(late, Err(ResequencerError::NotStarted)));
        assert_eq!(stream.engine().size(), 1);
        assert!(delivered.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_restarts_after_shutdown() {
        let (engine, delivered) = recording_engine();
        let stream = StreamResequencer::new(engine, &ResequencerConfig::default()).unwrap();

        let handle = stream.start().unwrap();
        stream.insert(1).await.unwrap();
        handle.shutdown().await.unwrap();

        let handle = stream.start().unwrap();
        stream.insert(2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(*delivered.lock().unwrap(), vec![1, 2]);

        handle.shutdown().await.unwrap();
    }

    #[test]
    fn test_stream_rejects_invalid_config() {
        let (engine, _delivered) = recording_engine();
        let config = ResequencerConfig::default().with_capacity(0);

        let result = StreamResequencer::new(engine, &config);
        assert!(matches!(result, Err(ConfigError::Invalid { field: "capacity", .. })));
    }
}

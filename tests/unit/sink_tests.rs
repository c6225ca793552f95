use resequencer::resequencer::{SinkWorker, WorkerSummary};
use resequencer::{
    DeliverySink, NaturalOrder, QueueSink, ResequencerEngine, SequenceNumberStrategy, SinkError,
};
use std::sync::{Arc, Mutex};

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_queue(capacity: usize) -> (QueueSink<u64>, SinkWorker, Arc<Mutex<Vec<u64>>>) {
        let processed = Arc::new(Mutex::new(Vec::new()));
        let log = processed.clone();
        let (sink, worker) = QueueSink::spawn(capacity, move |n: u64| -> Result<(), SinkError> {
            if n % 2 == 1 {
                return Err(SinkError::Rejected {
                    reason: format!("odd item {n}"),
                });
            }
            log.lock().unwrap().push(n);
            Ok(())
        });
        (sink, worker, processed)
    }

    #[tokio::test]
    async fn test_worker_survives_processing_failures() {
        let (sink, worker, processed) = recording_queue(16);

        for n in 1..=10 {
            sink.send_item(n).unwrap();
        }
        sink.close().await.unwrap();

        let summary = worker.join().await.unwrap();
        assert_eq!(
            summary,
            WorkerSummary {
                processed: 5,
                failed: 5
            }
        );
        assert_eq!(*processed.lock().unwrap(), vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn test_items_after_sentinel_are_not_processed() {
        let (sink, worker, processed) = recording_queue(16);

        sink.send_item(2).unwrap();
        sink.close().await.unwrap();
        let _ = sink.send_item(4);

        let summary = worker.join().await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(*processed.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_full_queue_reported() {
        let (sink, worker, _processed) = recording_queue(1);

        // The worker has not run yet on this single-threaded runtime.
        sink.send_item(2).unwrap();
        assert_eq!(sink.remaining_capacity(), 0);
        assert_eq!(sink.send_item(4), Err(SinkError::QueueFull));

        sink.close().await.unwrap();
        worker.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_worker_closes_queue() {
        let (sink, worker, _processed) = recording_queue(4);

        worker.cancel();
        let err = worker.join().await.unwrap_err();
        assert!(err.is_cancelled());

        assert_eq!(sink.send_item(2), Err(SinkError::Closed));
        assert_eq!(sink.close().await, Err(SinkError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_delivers_through_queue() {
        let (sink, worker, processed) = recording_queue(16);
        let engine: ResequencerEngine<u64, NaturalOrder> =
            ResequencerEngine::new(SequenceNumberStrategy::natural(), sink.clone());
        engine.start().unwrap();
        engine.set_last_delivered(Some(0));

        for n in [4, 2, 3, 1] {
            engine.insert(n).unwrap();
        }
        assert_eq!(engine.deliver().unwrap(), 4);

        sink.close().await.unwrap();
        let summary = worker.join().await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(*processed.lock().unwrap(), vec![2, 4]);
    }
}

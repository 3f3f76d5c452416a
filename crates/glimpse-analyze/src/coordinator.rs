use crate::{AnalysisBackend, AnalysisResult};
use glimpse_capture::CapturedFrame;
use log::{debug, info};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Monotonic tag of one analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

/// A finished request. `applied` is false when a newer request had
/// already been issued and the result was discarded.
#[derive(Debug, Clone)]
pub struct Completion {
    pub id: RequestId,
    pub result: Arc<AnalysisResult>,
    pub applied: bool,
}

/// Single-flight coordinator: the latest issued request id wins.
///
/// No cancellation happens on the wire; superseded responses are simply
/// not applied.
pub struct AnalysisCoordinator<B> {
    backend: B,
    issued: Mutex<u64>,
    latest: watch::Sender<Option<Arc<AnalysisResult>>>,
    busy: watch::Sender<bool>,
}

impl<B: AnalysisBackend> AnalysisCoordinator<B> {
    pub fn new(backend: B) -> Self {
        let (latest, _) = watch::channel(None);
        let (busy, _) = watch::channel(false);
        Self {
            backend,
            issued: Mutex::new(0),
            latest,
            busy,
        }
    }

    /// Most recently applied result, swapped atomically as one `Arc`.
    pub fn results(&self) -> watch::Receiver<Option<Arc<AnalysisResult>>> {
        self.latest.subscribe()
    }

    pub fn latest(&self) -> Option<Arc<AnalysisResult>> {
        self.latest.borrow().clone()
    }

    /// True while the newest request is outstanding.
    pub fn busy(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    /// Issue a new request id, superseding any request still in flight.
    pub fn issue(&self) -> RequestId {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        *issued += 1;
        self.busy.send_replace(true);
        RequestId(*issued)
    }

    /// Apply `result` if `id` is still the newest request.
    pub fn apply(&self, id: RequestId, result: Arc<AnalysisResult>) -> bool {
        let issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        if *issued != id.0 {
            debug!("discarding result of request {} (latest is {})", id.0, *issued);
            return false;
        }
        self.latest.send_replace(Some(result));
        self.busy.send_replace(false);
        true
    }

    /// Clear `busy` for a request that will never answer, unless a newer
    /// one has taken over since.
    fn abandon(&self, id: RequestId) {
        let issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        if *issued == id.0 {
            debug!("request {} abandoned", id.0);
            self.busy.send_replace(false);
        }
    }

    /// Send one frame and apply the answer under the request-id rule.
    /// The frame is consumed here and dropped once the call completes.
    ///
    /// Dropping the future before it completes clears `busy` if this was
    /// still the newest request; the latest result is left untouched.
    pub async fn analyze(&self, frame: CapturedFrame) -> Completion {
        let id = self.issue();
        let mut inflight = InFlight { coordinator: self, id, finished: false };
        debug!("request {} issued ({}x{})", id.0, frame.width(), frame.height());

        let result = Arc::new(self.backend.analyze(&frame).await);
        drop(frame);

        let applied = self.apply(id, Arc::clone(&result));
        inflight.finished = true;
        if applied {
            info!(
                "request {} applied: {} detections{}",
                id.0,
                result.detections().len(),
                if result.is_failure() { " (failed)" } else { "" }
            );
        }
        Completion { id, result, applied }
    }
}

struct InFlight<'a, B: AnalysisBackend> {
    coordinator: &'a AnalysisCoordinator<B>,
    id: RequestId,
    finished: bool,
}

impl<B: AnalysisBackend> Drop for InFlight<'_, B> {
    fn drop(&mut self) {
        if !self.finished {
            self.coordinator.abandon(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Detection;
    use glimpse_capture::CaptureOptions;
    use image::DynamicImage;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Each call waits for the next queued answer.
    struct Gated {
        answers: Mutex<VecDeque<oneshot::Receiver<AnalysisResult>>>,
    }

    impl Gated {
        fn new(n: usize) -> (Self, Vec<oneshot::Sender<AnalysisResult>>) {
            let (txs, rxs): (Vec<_>, VecDeque<_>) = (0..n).map(|_| oneshot::channel()).unzip();
            (Self { answers: Mutex::new(rxs) }, txs)
        }
    }

    impl AnalysisBackend for Gated {
        async fn analyze(&self, _frame: &CapturedFrame) -> AnalysisResult {
            let rx = self.answers.lock().unwrap().pop_front().expect("unexpected call");
            rx.await.unwrap_or_else(|_| AnalysisResult::failure("gone", "sender dropped"))
        }
    }

    fn frame() -> CapturedFrame {
        CapturedFrame::from_image(&DynamicImage::new_rgb8(8, 8), &CaptureOptions::default()).unwrap()
    }

    fn named(summary: &str) -> AnalysisResult {
        AnalysisResult::success(vec![Detection::default()], summary)
    }

    #[tokio::test]
    async fn single_request_applies_and_clears_busy() {
        let (backend, mut txs) = Gated::new(1);
        let coord = AnalysisCoordinator::new(backend);
        let busy = coord.busy();
        assert!(!*busy.borrow());

        let tx = txs.remove(0);
        let (done, ()) = tokio::join!(coord.analyze(frame()), async {
            tokio::task::yield_now().await;
            assert!(coord.is_busy());
            tx.send(named("only")).unwrap();
        });

        assert!(done.applied);
        assert_eq!(done.id, RequestId(1));
        assert!(!coord.is_busy());
        assert_eq!(coord.latest().unwrap().summary_text(), "only");
    }

    #[tokio::test]
    async fn older_response_never_overwrites_newer() {
        let (backend, mut txs) = Gated::new(2);
        let coord = AnalysisCoordinator::new(backend);
        let tx_b = txs.pop().unwrap();
        let tx_a = txs.pop().unwrap();

        let (a, b, ()) = tokio::join!(coord.analyze(frame()), coord.analyze(frame()), async {
            tokio::task::yield_now().await;
            tx_b.send(named("B")).unwrap();
            tokio::task::yield_now().await;
            tx_a.send(named("A")).unwrap();
        });

        // the second-issued request is the one answered by tx_b
        let (newer, older) = if a.id > b.id { (a, b) } else { (b, a) };
        assert_eq!(newer.id, RequestId(2));
        assert_eq!(newer.result.summary_text(), "B");
        assert!(newer.applied);
        assert!(!older.applied);
        assert_eq!(coord.latest().unwrap().summary_text(), "B");
        assert!(!coord.is_busy());
    }

    #[tokio::test]
    async fn early_stale_response_keeps_busy_until_latest_lands() {
        let (backend, mut txs) = Gated::new(2);
        let coord = AnalysisCoordinator::new(backend);
        let tx_b = txs.pop().unwrap();
        let tx_a = txs.pop().unwrap();

        let (a, b, ()) = tokio::join!(coord.analyze(frame()), coord.analyze(frame()), async {
            tokio::task::yield_now().await;
            tx_a.send(named("A")).unwrap();
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            assert!(coord.is_busy());
            assert!(coord.latest().is_none());
            tx_b.send(named("B")).unwrap();
        });

        let (newer, older) = if a.id > b.id { (a, b) } else { (b, a) };
        assert!(newer.applied);
        assert!(!older.applied);
        assert_eq!(coord.latest().unwrap().summary_text(), "B");
    }

    #[test]
    fn apply_checks_the_latest_id() {
        let (backend, _txs) = Gated::new(0);
        let coord = AnalysisCoordinator::new(backend);
        let first = coord.issue();
        let second = coord.issue();
        assert!(coord.apply(second, Arc::new(named("2"))));
        assert!(!coord.apply(first, Arc::new(named("1"))));
        assert_eq!(coord.latest().unwrap().summary_text(), "2");
    }

    #[tokio::test]
    async fn dropped_request_clears_busy() {
        let (backend, _txs) = Gated::new(1);
        let coord = AnalysisCoordinator::new(backend);

        let gave_up = tokio::time::timeout(Duration::from_millis(20), coord.analyze(frame())).await;
        assert!(gave_up.is_err());
        assert!(!coord.is_busy());
        assert!(coord.latest().is_none());
    }

    #[tokio::test]
    async fn dropping_an_older_request_keeps_busy() {
        let (backend, mut txs) = Gated::new(2);
        let coord = AnalysisCoordinator::new(backend);
        let tx_b = txs.pop().unwrap();

        let mut first = Box::pin(coord.analyze(frame()));
        assert!(tokio::time::timeout(Duration::from_millis(5), &mut first).await.is_err());
        let mut second = Box::pin(coord.analyze(frame()));
        assert!(tokio::time::timeout(Duration::from_millis(5), &mut second).await.is_err());

        drop(first);
        assert!(coord.is_busy());

        tx_b.send(named("B")).unwrap();
        let done = second.await;
        assert!(done.applied);
        assert_eq!(done.id, RequestId(2));
        assert!(!coord.is_busy());
    }
}

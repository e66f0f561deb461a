use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::delivery::Deliver;
use crate::error::TranslateError;
use crate::events::{UiEvent, UiHandle};
use crate::session::{ActivePopup, Generation, Job};
use crate::translator::Translate;

/// How long a worker waits for the UI thread to tear the popup down before giving up on the paste.
const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs submitted jobs on short-lived worker threads and routes results back to the UI.
pub struct Orchestrator<T, D> {
    inner: Arc<Inner<T, D>>,
}

impl<T, D> Clone for Orchestrator<T, D> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct Inner<T, D> {
    translator: T,
    delivery: D,
    runtime: Handle,
    ui: UiHandle,
    active: ActivePopup,
    paste_delay: Duration,
}

impl<T: Translate, D: Deliver> Orchestrator<T, D> {
    pub fn new(
        translator: T,
        delivery: D,
        runtime: Handle,
        ui: UiHandle,
        active: ActivePopup,
        paste_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner { translator, delivery, runtime, ui, active, paste_delay }),
        }
    }

    /// Spawns the worker for `job`. The job's busy guard moves into the worker.
    pub fn submit(&self, job: Job) -> Option<thread::JoinHandle<()>> {
        let generation = job.generation;
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("translate-{}", generation))
            .spawn(move || inner.run(job));
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                // The closure, and with it the busy guard, was dropped by the failed spawn.
                error!("Failed to spawn translation worker: {}", e);
                self.inner.ui.send(UiEvent::TranslationFailed {
                    generation,
                    message: format!("Could not start translation: {}", e),
                });
                None
            }
        }
    }
}

impl<T: Translate, D: Deliver> Inner<T, D> {
    fn run(&self, job: Job) {
        let Job { generation, text, guard: _busy } = job;
        info!("Translating {} chars for popup #{}", text.chars().count(), generation);

        match self.runtime.block_on(self.translator.translate(&text)) {
            Ok(out) if out.trim().is_empty() => self.report(generation, &TranslateError::EmptyResult),
            Ok(out) => self.deliver(generation, &out),
            Err(e) => self.report(generation, &e),
        }
        info!("Worker for popup #{} finished", generation);
    }

    fn deliver(&self, generation: Generation, text: &str) {
        if !self.active.is_current(generation) {
            info!("Popup #{} was superseded; discarding its translation", generation);
            return;
        }
        if let Err(e) = self.delivery.copy(text) {
            warn!("Clipboard write failed: {:#}", e);
            self.fail(generation, format!("Could not copy the translation: {}", e));
            return;
        }
        info!("Translation copied to clipboard ({} chars)", text.chars().count());

        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if !self.ui.send(UiEvent::ClosePopup { generation, ack: ack_tx }) {
            warn!("UI is gone; skipping paste");
            return;
        }
        match ack_rx.recv_timeout(CLOSE_ACK_TIMEOUT) {
            Ok(true) => {}
            Ok(false) => {
                info!("Popup #{} replaced before close; skipping paste", generation);
                return;
            }
            Err(_) => {
                warn!("UI did not confirm popup close; skipping paste");
                return;
            }
        }

        thread::sleep(self.paste_delay);
        match self.delivery.emit(text) {
            Ok(()) => info!("Translation emitted into focused window"),
            Err(e) => {
                warn!("Synthetic input failed: {:#}", e);
                self.fail(generation, format!("Translation is on the clipboard but could not be pasted: {}", e));
            }
        }
    }

    fn report(&self, generation: Generation, err: &TranslateError) {
        warn!("Translation for popup #{} failed: {}", generation, err);
        self.fail(generation, format!("Translation failed: {}", err));
    }

    fn fail(&self, generation: Generation, message: String) {
        self.ui.send(UiEvent::TranslationFailed { generation, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{BusyFlag, Session, SubmitOutcome};
    use crossbeam_channel::Receiver;
    use futures_util::future::BoxFuture;
    use std::sync::Mutex;

    enum Reply {
        Text(&'static str),
        Transport,
        Panic,
    }

    struct FakeTranslator {
        reply: Reply,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTranslator {
        fn new(reply: Reply) -> Self {
            Self { reply, calls: Mutex::new(Vec::new()) }
        }
    }

    impl Translate for Arc<FakeTranslator> {
        fn translate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<String, TranslateError>> {
            self.calls.lock().unwrap().push(text.to_string());
            Box::pin(async move {
                match self.reply {
                    Reply::Text(t) => Ok(t.to_string()),
                    Reply::Transport => {
                        // A builder error is a genuine reqwest::Error without touching the network.
                        let err = reqwest::Client::new().get("http://[::1").build().unwrap_err();
                        Err(TranslateError::Network(err))
                    }
                    Reply::Panic => panic!("translator blew up"),
                }
            })
        }
    }

    #[derive(Default)]
    struct RecordingDelivery {
        copied: Mutex<Vec<String>>,
        emitted: Mutex<Vec<String>>,
    }

    impl Deliver for Arc<RecordingDelivery> {
        fn copy(&self, text: &str) -> anyhow::Result<()> {
            self.copied.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn emit(&self, text: &str) -> anyhow::Result<()> {
            self.emitted.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct Harness {
        _rt: tokio::runtime::Runtime,
        session: Session,
        busy: BusyFlag,
        delivery: Arc<RecordingDelivery>,
        events: Receiver<UiEvent>,
        orchestrator: Orchestrator<Arc<FakeTranslator>, Arc<RecordingDelivery>>,
        translator: Arc<FakeTranslator>,
    }

    fn harness(reply: Reply) -> Harness {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let session = Session::new();
        let (ui, events) = UiHandle::channel();
        let translator = Arc::new(FakeTranslator::new(reply));
        let delivery = Arc::new(RecordingDelivery::default());
        let orchestrator = Orchestrator::new(
            Arc::clone(&translator),
            Arc::clone(&delivery),
            rt.handle().clone(),
            ui,
            session.active(),
            Duration::ZERO,
        );
        Harness {
            busy: session.busy(),
            _rt: rt,
            session,
            delivery,
            events,
            orchestrator,
            translator,
        }
    }

    fn submit_text(h: &mut Harness, text: &str) -> thread::JoinHandle<()> {
        h.session.open();
        h.session.popup_mut().unwrap().buffer.push_str(text);
        match h.session.submit() {
            SubmitOutcome::Started(job) => h.orchestrator.submit(job).expect("worker spawned"),
            _ => panic!("submission did not start"),
        }
    }

    fn next_event(events: &Receiver<UiEvent>) -> UiEvent {
        events.recv_timeout(Duration::from_secs(5)).expect("worker sent nothing")
    }

    #[test]
    fn success_copies_closes_then_pastes() {
        let mut h = harness(Reply::Text("Hello"));
        let worker = submit_text(&mut h, " 안녕 ");
        assert!(h.busy.is_busy());

        match next_event(&h.events) {
            UiEvent::ClosePopup { generation, ack } => {
                assert_eq!(h.delivery.copied.lock().unwrap().as_slice(), ["Hello"]);
                assert!(h.delivery.emitted.lock().unwrap().is_empty());
                ack.send(h.session.finish(generation)).unwrap();
            }
            other => panic!("unexpected {:?}", other),
        }
        worker.join().unwrap();

        assert_eq!(h.translator.calls.lock().unwrap().as_slice(), ["안녕"]);
        assert_eq!(h.delivery.emitted.lock().unwrap().as_slice(), ["Hello"]);
        assert!(!h.session.is_open());
        assert!(!h.busy.is_busy());
    }

    #[test]
    fn network_error_keeps_popup_and_skips_clipboard() {
        let mut h = harness(Reply::Transport);
        let worker = submit_text(&mut h, "안녕");
        worker.join().unwrap();

        match next_event(&h.events) {
            UiEvent::TranslationFailed { generation, message } => {
                assert!(message.contains("network error"), "{}", message);
                assert!(h.session.fail(generation, message));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(h.delivery.copied.lock().unwrap().is_empty());
        assert!(h.delivery.emitted.lock().unwrap().is_empty());
        assert!(!h.busy.is_busy());
        assert_eq!(h.session.popup().unwrap().buffer, "안녕");
        assert!(matches!(h.session.submit(), SubmitOutcome::Started(_)));
    }

    #[test]
    fn empty_translation_is_reported_not_delivered() {
        let mut h = harness(Reply::Text("   "));
        submit_text(&mut h, "안녕").join().unwrap();

        assert!(matches!(next_event(&h.events), UiEvent::TranslationFailed { .. }));
        assert!(h.delivery.copied.lock().unwrap().is_empty());
        assert!(!h.busy.is_busy());
    }

    #[test]
    fn panicking_translator_still_releases_busy() {
        let mut h = harness(Reply::Panic);
        let worker = submit_text(&mut h, "안녕");
        assert!(worker.join().is_err());
        assert!(!h.busy.is_busy());
        assert!(h.delivery.copied.lock().unwrap().is_empty());
    }

    #[test]
    fn superseded_popup_discards_result() {
        let mut h = harness(Reply::Text("Hello"));
        h.session.open();
        h.session.popup_mut().unwrap().buffer.push_str("안녕");
        let job = match h.session.submit() {
            SubmitOutcome::Started(job) => job,
            _ => panic!("submission did not start"),
        };
        h.session.open();

        h.orchestrator.submit(job).unwrap().join().unwrap();

        assert!(h.events.try_recv().is_err());
        assert!(h.delivery.copied.lock().unwrap().is_empty());
        assert!(!h.busy.is_busy());
        assert!(h.session.is_open());
    }

    #[test]
    fn rejected_close_skips_paste() {
        let mut h = harness(Reply::Text("Hello"));
        let worker = submit_text(&mut h, "안녕");

        match next_event(&h.events) {
            UiEvent::ClosePopup { ack, .. } => ack.send(false).unwrap(),
            other => panic!("unexpected {:?}", other),
        }
        worker.join().unwrap();

        assert_eq!(h.delivery.copied.lock().unwrap().len(), 1);
        assert!(h.delivery.emitted.lock().unwrap().is_empty());
        assert!(!h.busy.is_busy());
    }
}

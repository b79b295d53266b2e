//! Publish capability and the bundled sinks.

use std::io::Write;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("outgoing queue full")]
    QueueFull,
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Best-effort `publish(topic, payload)`. Implementations must not block for
/// long; failed messages are reported and dropped by the caller.
pub trait Publish {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError>;

    /// Last message before shutdown. Sinks that may refuse work under load
    /// wait up to `timeout` for room instead of dropping it.
    fn publish_final(
        &mut self,
        topic: &str,
        payload: &str,
        timeout: Duration,
    ) -> Result<(), PublishError> {
        let _ = timeout;
        self.publish(topic, payload)
    }
}

impl<P: Publish + ?Sized> Publish for Box<P> {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        (**self).publish(topic, payload)
    }

    fn publish_final(
        &mut self,
        topic: &str,
        payload: &str,
        timeout: Duration,
    ) -> Result<(), PublishError> {
        (**self).publish_final(topic, payload, timeout)
    }
}

/// Writes `topic<TAB>payload` lines.
#[derive(Debug)]
pub struct WriterPublisher<W: Write> {
    out: W,
}

impl<W: Write> WriterPublisher<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Publish for WriterPublisher<W> {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        writeln!(self.out, "{topic}\t{payload}")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps every message in memory; clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct RecordingPublisher {
    log: Arc<Mutex<Vec<(String, String)>>>,
    offline: Arc<Mutex<bool>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a lost connection: publishes fail until set back.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut flag) = self.offline.lock() {
            *flag = offline;
        }
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl Publish for RecordingPublisher {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        if self.offline.lock().map(|f| *f).unwrap_or(false) {
            return Err(PublishError::Unavailable("recorder offline".into()));
        }
        let mut log = self
            .log
            .lock()
            .map_err(|_| PublishError::Unavailable("recorder poisoned".into()))?;
        log.push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

/// Hands messages to a worker thread through a bounded queue.
///
/// `publish` never blocks: a full queue or a dead worker drops the message.
/// `publish_final` waits a bounded time for queue room. Dropping the
/// publisher drains the queue and joins the worker.
pub struct BackgroundPublisher {
    tx: Option<SyncSender<(String, String)>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundPublisher {
    pub fn spawn<P>(mut sink: P, capacity: usize) -> std::io::Result<Self>
    where
        P: Publish + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<(String, String)>(capacity.max(1));
        let worker = std::thread::Builder::new()
            .name("fieldtrack-publish".into())
            .spawn(move || {
                for (topic, payload) in rx {
                    if let Err(err) = sink.publish(&topic, &payload) {
                        log::warn!("background publish to {topic} failed: {err}");
                    }
                }
            })?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

impl Publish for BackgroundPublisher {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        let Some(tx) = &self.tx else {
            return Err(PublishError::Unavailable("publisher closed".into()));
        };
        match tx.try_send((topic.to_string(), payload.to_string())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PublishError::QueueFull),
            Err(TrySendError::Disconnected(_)) => {
                Err(PublishError::Unavailable("publish worker stopped".into()))
            }
        }
    }

    fn publish_final(
        &mut self,
        topic: &str,
        payload: &str,
        timeout: Duration,
    ) -> Result<(), PublishError> {
        let Some(tx) = &self.tx else {
            return Err(PublishError::Unavailable("publisher closed".into()));
        };
        let deadline = Instant::now() + timeout;
        let mut item = (topic.to_string(), payload.to_string());
        loop {
            match tx.try_send(item) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Disconnected(_)) => {
                    return Err(PublishError::Unavailable("publish worker stopped".into()))
                }
                Err(TrySendError::Full(back)) => {
                    if Instant::now() >= deadline {
                        return Err(PublishError::QueueFull);
                    }
                    item = back;
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

impl Drop for BackgroundPublisher {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("publish worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for BackgroundPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundPublisher")
            .field("open", &self.tx.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_emits_tab_separated_lines() {
        let mut w = WriterPublisher::new(Vec::new());
        w.publish("ball/goal_status", "{\"a\":1}").expect("write");
        w.publish("t", "x").expect("write");
        let text = String::from_utf8(w.into_inner()).expect("utf8");
        assert_eq!(text, "ball/goal_status\t{\"a\":1}\nt\tx\n");
    }

    #[test]
    fn background_publisher_delivers_in_order() {
        let rec = RecordingPublisher::new();
        {
            let mut bg = BackgroundPublisher::spawn(rec.clone(), 16).expect("spawn");
            for i in 0..5 {
                bg.publish("t", &i.to_string()).expect("queued");
            }
        }
        let got: Vec<String> = rec.messages().into_iter().map(|(_, p)| p).collect();
        assert_eq!(got, vec!["0", "1", "2", "3", "4"]);
    }

    struct Stalled(std::sync::mpsc::Receiver<()>);

    impl Publish for Stalled {
        fn publish(&mut self, _topic: &str, _payload: &str) -> Result<(), PublishError> {
            let _ = self.0.recv();
            Ok(())
        }
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (release, gate) = std::sync::mpsc::channel();
        let mut bg = BackgroundPublisher::spawn(Stalled(gate), 1).expect("spawn");

        let mut full = 0;
        for _ in 0..10 {
            if matches!(bg.publish("t", "p"), Err(PublishError::QueueFull)) {
                full += 1;
            }
        }
        assert!(full >= 8, "only {full} drops");

        drop(release);
        drop(bg);
    }

    /// Records messages, but each one waits for the gate first.
    struct Gated {
        gate: std::sync::mpsc::Receiver<()>,
        rec: RecordingPublisher,
    }

    impl Publish for Gated {
        fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
            let _ = self.gate.recv();
            self.rec.publish(topic, payload)
        }
    }

    #[test]
    fn final_message_waits_for_queue_room() {
        let rec = RecordingPublisher::new();
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let mut bg = BackgroundPublisher::spawn(
            Gated {
                gate,
                rec: rec.clone(),
            },
            1,
        )
        .expect("spawn");

        let mut full = false;
        for i in 0..5 {
            full |= matches!(
                bg.publish("t", &i.to_string()),
                Err(PublishError::QueueFull)
            );
        }
        assert!(full);

        let opener = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            drop(release);
        });
        bg.publish_final("t", "offline", Duration::from_secs(5))
            .expect("final message queued");
        drop(bg);
        opener.join().expect("opener");

        let msgs = rec.messages();
        assert_eq!(msgs.last().map(|(_, p)| p.as_str()), Some("offline"));
    }

    #[test]
    fn final_message_gives_up_after_timeout() {
        let (release, gate) = std::sync::mpsc::channel();
        let mut bg = BackgroundPublisher::spawn(Stalled(gate), 1).expect("spawn");
        for _ in 0..4 {
            let _ = bg.publish("t", "p");
        }
        let started = Instant::now();
        assert!(matches!(
            bg.publish_final("t", "offline", Duration::from_millis(30)),
            Err(PublishError::QueueFull)
        ));
        assert!(started.elapsed() >= Duration::from_millis(30));
        drop(release);
        drop(bg);
    }

    #[test]
    fn offline_recorder_reports_unavailable() {
        let mut rec = RecordingPublisher::new();
        rec.set_offline(true);
        assert!(matches!(
            rec.publish("t", "p"),
            Err(PublishError::Unavailable(_))
        ));
        rec.set_offline(false);
        rec.publish("t", "p").expect("online");
        assert_eq!(rec.messages().len(), 1);
    }
}

//! In-process render pipeline and viewer
//!
//! [`LoopbackViewer::new`] creates one [`LoopbackPipeline`] per rank plus the
//! viewer handle that plays the remote side: it observes everything the
//! pipelines publish as [`ViewerEvent`]s and sends steering messages back.
//!
//! Rendering is reduced to a sampling pass over the registered sources so
//! that the data path and its timings are exercised end to end.

use super::{PipelineTimings, RenderPipeline};
use crate::config::ReconnectPolicy;
use crate::error::{Result, VisError};
use crate::source::SourceRegistry;
use crate::topology::NeighbourTable;
use crate::types::{FeatureVector, Int3};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Channel capacity for messages (viewer → pipeline)
const CMD_CHANNEL_CAPACITY: usize = 256;
/// Channel capacity for events (pipelines → viewer)
const MSG_CHANNEL_CAPACITY: usize = 10_000;

/// Everything a pipeline publishes to the viewer
#[derive(Debug, Clone)]
pub enum ViewerEvent {
    Connected {
        rank: u32,
        policy: ReconnectPolicy,
    },
    Disconnected {
        rank: u32,
    },
    Quality {
        rank: u32,
        quality: u32,
    },
    Position {
        rank: u32,
        offset: Int3,
    },
    Neighbours {
        rank: u32,
        table: NeighbourTable,
    },
    /// A message queued by the session (handshake, camera feedback)
    Message {
        rank: u32,
        message: Value,
    },
    Frame {
        rank: u32,
        step: u32,
        paused: bool,
        meta: Map<String, Value>,
        /// Source names with the sample at the first physical cell
        samples: Vec<(String, Option<FeatureVector>)>,
        /// Particles visible across all particle sources
        particles: usize,
    },
}

impl ViewerEvent {
    pub fn rank(&self) -> u32 {
        match self {
            ViewerEvent::Connected { rank, .. }
            | ViewerEvent::Disconnected { rank }
            | ViewerEvent::Quality { rank, .. }
            | ViewerEvent::Position { rank, .. }
            | ViewerEvent::Neighbours { rank, .. }
            | ViewerEvent::Message { rank, .. }
            | ViewerEvent::Frame { rank, .. } => *rank,
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, ViewerEvent::Frame { .. })
    }
}

/// The remote side of a set of loopback pipelines
pub struct LoopbackViewer {
    inbound: Vec<Sender<Value>>,
    events: Receiver<ViewerEvent>,
    reachable: Arc<AtomicBool>,
}

impl LoopbackViewer {
    /// Create the viewer and one pipeline per rank, index = rank
    pub fn new(ranks: u32) -> (Self, Vec<LoopbackPipeline>) {
        let (event_tx, event_rx) = bounded(MSG_CHANNEL_CAPACITY);
        let reachable = Arc::new(AtomicBool::new(true));

        let mut inbound = Vec::with_capacity(ranks as usize);
        let mut pipelines = Vec::with_capacity(ranks as usize);
        for rank in 0..ranks {
            let (tx, rx) = bounded(CMD_CHANNEL_CAPACITY);
            inbound.push(tx);
            pipelines.push(LoopbackPipeline {
                rank,
                inbound: rx,
                events: event_tx.clone(),
                reachable: Arc::clone(&reachable),
                connected: false,
                policy: ReconnectPolicy::default(),
                quality: 0,
                outbox: Vec::new(),
                timings: PipelineTimings::default(),
                frames: 0,
            });
        }

        (
            Self {
                inbound,
                events: event_rx,
                reachable,
            },
            pipelines,
        )
    }

    /// Send a message to every rank
    pub fn send(&self, message: Value) -> bool {
        self.inbound
            .iter()
            .all(|tx| tx.send(message.clone()).is_ok())
    }

    /// Send a message to one rank
    pub fn send_to(&self, rank: u32, message: Value) -> bool {
        self.inbound
            .get(rank as usize)
            .map(|tx| tx.send(message).is_ok())
            .unwrap_or(false)
    }

    /// Send a message received as text to every rank
    ///
    /// Text that is not valid JSON is rejected before anything is sent.
    pub fn send_text(&self, text: &str) -> Result<bool> {
        let message: Value = serde_json::from_str(text)?;
        Ok(self.send(message))
    }

    /// Make later `connect` calls succeed or fail
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Drain all pending events
    pub fn drain(&self) -> Vec<ViewerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ViewerEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Wait until `rank` publishes a frame, collecting everything before it
    pub fn wait_for_frame(&self, rank: u32, timeout: Duration) -> Option<Vec<ViewerEvent>> {
        let deadline = Instant::now() + timeout;
        let mut seen = Vec::new();
        loop {
            let left = deadline.checked_duration_since(Instant::now())?;
            let event = self.events.recv_timeout(left).ok()?;
            let done = event.is_frame() && event.rank() == rank;
            seen.push(event);
            if done {
                return Some(seen);
            }
        }
    }
}

/// One rank's end of the loopback
pub struct LoopbackPipeline {
    rank: u32,
    inbound: Receiver<Value>,
    events: Sender<ViewerEvent>,
    reachable: Arc<AtomicBool>,
    connected: bool,
    policy: ReconnectPolicy,
    quality: u32,
    outbox: Vec<Value>,
    timings: PipelineTimings,
    frames: u64,
}

impl LoopbackPipeline {
    pub fn rank(&self) -> u32 {
        self.rank
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Frames rendered since creation
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn quality(&self) -> u32 {
        self.quality
    }

    fn publish(&self, event: ViewerEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("Viewer event queue full on rank {}, dropping event", self.rank)
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn sampling_pass(sources: &SourceRegistry) -> (Vec<(String, Option<FeatureVector>)>, usize) {
        let mut samples = Vec::with_capacity(sources.len());
        let mut particles = 0;
        for source in sources.iter() {
            let name = source.descriptor().name.clone();
            match source.as_particles() {
                Some(p) => {
                    if let Some(arena) = p.arena() {
                        arena.for_each_particle(|_, _| particles += 1);
                    }
                    samples.push((name, None));
                }
                None => samples.push((name, source.sample([0, 0, 0]))),
            }
        }
        (samples, particles)
    }
}

impl RenderPipeline for LoopbackPipeline {
    fn connect(&mut self, policy: ReconnectPolicy) -> Result<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(VisError::Connection(format!(
                "loopback viewer unreachable from rank {}",
                self.rank
            )));
        }
        self.connected = true;
        self.policy = policy;
        self.publish(ViewerEvent::Connected {
            rank: self.rank,
            policy,
        });
        info!("Rank {} connected to loopback viewer", self.rank);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.publish(ViewerEvent::Disconnected { rank: self.rank });
        }
    }

    fn set_quality(&mut self, quality: u32) {
        self.quality = quality;
        self.publish(ViewerEvent::Quality {
            rank: self.rank,
            quality,
        });
    }

    fn update_position(&mut self, offset: Int3) {
        self.publish(ViewerEvent::Position {
            rank: self.rank,
            offset,
        });
    }

    fn update_neighbours(&mut self, table: &NeighbourTable) {
        self.publish(ViewerEvent::Neighbours {
            rank: self.rank,
            table: *table,
        });
    }

    fn push_message(&mut self, message: Value) {
        self.outbox.push(message);
    }

    fn render(
        &mut self,
        step: u32,
        sources: &SourceRegistry,
        meta: &Map<String, Value>,
        paused: bool,
    ) -> Result<Option<Value>> {
        if !self.connected {
            return Err(VisError::Connection(format!(
                "rank {} is not connected",
                self.rank
            )));
        }

        let kernel_start = Instant::now();
        let (samples, particles) = Self::sampling_pass(sources);
        let kernel = kernel_start.elapsed();

        let send_start = Instant::now();
        for message in std::mem::take(&mut self.outbox) {
            self.publish(ViewerEvent::Message {
                rank: self.rank,
                message,
            });
        }
        self.publish(ViewerEvent::Frame {
            rank: self.rank,
            step,
            paused,
            meta: meta.clone(),
            samples,
            particles,
        });
        let video_send = send_start.elapsed();

        self.frames += 1;
        self.timings = PipelineTimings {
            kernel: kernel.as_micros() as u64,
            video_send: video_send.as_micros() as u64,
            ..Default::default()
        };

        if paused {
            // a paused renderer idles until the viewer speaks
            match self.inbound.recv() {
                Ok(reply) => Ok(Some(reply)),
                Err(_) => {
                    self.connected = false;
                    Err(VisError::Connection("viewer closed while paused".into()))
                }
            }
        } else {
            Ok(self.inbound.try_recv().ok())
        }
    }

    fn timings(&self) -> PipelineTimings {
        self.timings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_respects_reachability() {
        let (viewer, mut pipelines) = LoopbackViewer::new(1);
        viewer.set_reachable(false);
        assert!(pipelines[0].connect(ReconnectPolicy::FailFast).is_err());
        viewer.set_reachable(true);
        assert!(pipelines[0].connect(ReconnectPolicy::FailFast).is_ok());
        assert!(matches!(
            viewer.drain().as_slice(),
            [ViewerEvent::Connected { rank: 0, .. }]
        ));
    }

    #[test]
    fn test_send_text_rejects_invalid_json() {
        let (viewer, mut pipelines) = LoopbackViewer::new(1);
        pipelines[0].connect(ReconnectPolicy::FailFast).unwrap();

        let err = viewer.send_text("{\"pause\": tru").unwrap_err();
        assert!(matches!(err, VisError::Json(_)));
        assert!(viewer.send_text("{\"pause\": true}").unwrap());
        assert_eq!(
            pipelines[0]
                .render(0, &SourceRegistry::new(), &Map::new(), false)
                .unwrap(),
            Some(json!({"pause": true}))
        );
    }

    #[test]
    fn test_render_requires_connection() {
        let (_viewer, mut pipelines) = LoopbackViewer::new(1);
        let sources = SourceRegistry::new();
        let err = pipelines[0]
            .render(0, &sources, &Map::new(), false)
            .unwrap_err();
        assert!(matches!(err, VisError::Connection(_)));
    }

    #[test]
    fn test_render_returns_one_reply_per_call() {
        let (viewer, mut pipelines) = LoopbackViewer::new(2);
        let p = &mut pipelines[1];
        p.connect(ReconnectPolicy::RetryOnRender).unwrap();
        let sources = SourceRegistry::new();

        assert!(viewer.send_to(1, json!({"interval": 2})));
        assert!(viewer.send_to(1, json!({"pause": true})));
        assert_eq!(
            p.render(0, &sources, &Map::new(), false).unwrap(),
            Some(json!({"interval": 2}))
        );
        assert_eq!(
            p.render(1, &sources, &Map::new(), false).unwrap(),
            Some(json!({"pause": true}))
        );
        assert_eq!(p.render(2, &sources, &Map::new(), false).unwrap(), None);
        assert_eq!(p.frames(), 3);
    }

    #[test]
    fn test_queued_messages_precede_frame() {
        let (viewer, mut pipelines) = LoopbackViewer::new(1);
        let p = &mut pipelines[0];
        p.connect(ReconnectPolicy::RetryOnRender).unwrap();
        p.push_message(json!({"rotation axis": [1.0, 0.0, 0.0, 1.0]}));
        p.render(5, &SourceRegistry::new(), &Map::new(), false)
            .unwrap();

        let events = viewer.wait_for_frame(0, Duration::from_secs(1)).unwrap();
        assert!(matches!(events[0], ViewerEvent::Connected { .. }));
        assert!(matches!(events[1], ViewerEvent::Message { .. }));
        assert!(matches!(events[2], ViewerEvent::Frame { step: 5, .. }));
    }

    #[test]
    fn test_paused_render_blocks_until_message() {
        let (viewer, mut pipelines) = LoopbackViewer::new(1);
        let mut p = pipelines.remove(0);
        p.connect(ReconnectPolicy::RetryOnRender).unwrap();

        let handle = std::thread::spawn(move || {
            p.render(0, &SourceRegistry::new(), &Map::new(), true)
                .unwrap()
        });
        // the frame is published before blocking
        assert!(viewer.wait_for_frame(0, Duration::from_secs(1)).is_some());
        viewer.send(json!({"pause": true}));
        assert_eq!(handle.join().unwrap(), Some(json!({"pause": true})));
    }

    #[test]
    fn test_viewer_gone_while_paused() {
        let (viewer, mut pipelines) = LoopbackViewer::new(1);
        let p = &mut pipelines[0];
        p.connect(ReconnectPolicy::RetryOnRender).unwrap();
        drop(viewer);
        assert!(p.render(0, &SourceRegistry::new(), &Map::new(), true).is_err());
        assert!(!p.is_connected());
    }
}

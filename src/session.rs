//! Call session orchestration
//!
//! One `CallSession` per call. It acquires the capture resource and the
//! channel while `Connecting`, runs three concurrent loops while `Active`
//! (audio send, video send, event receive), and tears everything down in
//! order through `Ending` to the terminal `Ended` state. Local hangup and
//! remote close race safely: the first teardown request wins.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::capture::{AudioBlock, CaptureGuard, MediaCapture};
use crate::channel::ChannelConnector;
use crate::codec::PcmEncoder;
use crate::config::CallConfig;
use crate::error::{CaptureError, ChannelError, Error, PlaybackError, SessionError};
use crate::playback::{PlaybackScheduler, PlaybackSink};
use crate::protocol::{ChannelEvent, OutboundMedia};
use crate::video::VideoFrameSampler;

/// What kind of call this is; fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    VoiceOnly,
    VoiceAndVideo,
}

/// Session lifecycle state (linear, no cycles)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Connecting,
    Active,
    Ending,
    Ended,
}

/// Why the session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// Local user hung up
    Hangup,
    /// Remote endpoint closed the channel (graceful)
    RemoteClosed(Option<String>),
    /// Transport-level failure
    ChannelError(String),
    /// The capture stream stopped delivering audio
    CaptureFailed(String),
}

/// Observable status events, broadcast to UI subscribers.
///
/// In-flight problems after `Active` surface only here; they are never
/// thrown into caller code paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(CallState),
    /// Remote audio is arriving faster than real time allows playback
    Degraded { queued_ms: u64 },
    /// An outbound chunk could not be transmitted and was dropped
    TransmitDropped,
    Error(String),
}

/// State shared between the session handle and its loops
struct SessionShared {
    id: Uuid,
    state_tx: watch::Sender<CallState>,
    events_tx: broadcast::Sender<SessionEvent>,
    muted: AtomicBool,
    video_suspended: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    end_reason: Mutex<Option<EndReason>>,
    capture_guard: Mutex<Option<CaptureGuard>>,
}

impl SessionShared {
    fn set_state(&self, state: CallState) {
        let old = self.state_tx.send_replace(state);
        if old != state {
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn state(&self) -> CallState {
        *self.state_tx.borrow()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Begin teardown. Idempotent: only the first caller records a reason
    /// and flips the shutdown signal.
    fn request_teardown(&self, reason: EndReason) -> bool {
        {
            let mut guard = self.end_reason.lock();
            if guard.is_some() {
                return false;
            }
            *guard = Some(reason.clone());
        }
        tracing::info!(id = %self.id, ?reason, "call session ending");
        self.set_state(CallState::Ending);
        let _ = self.shutdown_tx.send(true);
        true
    }

    /// Release the capture resource. Unconditional and idempotent.
    fn release_capture(&self) {
        if let Some(mut guard) = self.capture_guard.lock().take() {
            guard.release();
        }
    }
}

/// A live call with a remote conversational agent.
///
/// Exclusively owns the capture resource and the channel handle; releases
/// both exactly once during teardown no matter how many times teardown is
/// triggered or from which side.
pub struct CallSession {
    shared: Arc<SessionShared>,
    state_rx: watch::Receiver<CallState>,
    mode: CallMode,
}

impl CallSession {
    /// Connect a new session: acquire capture, open the channel, go Active.
    ///
    /// Capture-acquisition and channel-open failures (including the connect
    /// timeout) propagate synchronously to the caller and leave the session
    /// `Ended` without ever reaching `Active`. No retries are attempted;
    /// that decision belongs to the caller.
    pub async fn connect<S, C>(
        config: CallConfig,
        mode: CallMode,
        capture: &dyn MediaCapture,
        sink: S,
        connector: &C,
    ) -> Result<CallSession, Error>
    where
        S: PlaybackSink + 'static,
        C: ChannelConnector,
    {
        let id = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(CallState::Connecting);
        let (events_tx, _) = broadcast::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(SessionShared {
            id,
            state_tx,
            events_tx,
            muted: AtomicBool::new(false),
            video_suspended: AtomicBool::new(false),
            shutdown_tx,
            end_reason: Mutex::new(None),
            capture_guard: Mutex::new(None),
        });

        tracing::info!(%id, ?mode, "call session connecting");

        let wants_video = mode == CallMode::VoiceAndVideo;
        let mut handle = match capture.acquire(wants_video) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(%id, "capture acquisition failed: {}", e);
                shared.set_state(CallState::Ended);
                return Err(e.into());
            }
        };

        let channel = match tokio::time::timeout(config.connect_timeout(), connector.open()).await
        {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                tracing::error!(%id, "channel open failed: {}", e);
                handle.guard.release();
                shared.set_state(CallState::Ended);
                return Err(e.into());
            }
            Err(_) => {
                tracing::error!(%id, "channel open timed out");
                handle.guard.release();
                shared.set_state(CallState::Ended);
                return Err(ChannelError::Timeout.into());
            }
        };

        let (outbound, events) = channel.split();
        let blocks = handle.blocks;
        let errors = handle.errors;
        let sampler = handle.camera.map(|camera| {
            VideoFrameSampler::new(
                camera,
                config.video.width,
                config.video.height,
                config.video.jpeg_quality,
            )
        });
        *shared.capture_guard.lock() = Some(handle.guard);

        shared.set_state(CallState::Active);
        tracing::info!(%id, "call session active");

        let encoder = PcmEncoder::new(config.audio.input_sample_rate, config.audio.channels);
        let scheduler = PlaybackScheduler::new(sink, config.max_buffered());

        let send_task = tokio::spawn(audio_send_loop(
            shared.clone(),
            blocks,
            errors,
            encoder,
            outbound.clone(),
            shutdown_rx.clone(),
        ));
        let video_task = tokio::spawn(video_send_loop(
            shared.clone(),
            sampler,
            outbound,
            config.video_interval(),
            shutdown_rx.clone(),
        ));
        let recv_task = tokio::spawn(event_recv_loop(
            shared.clone(),
            events,
            scheduler,
            shutdown_rx.clone(),
        ));

        tokio::spawn(supervise(
            shared.clone(),
            send_task,
            video_task,
            recv_task,
            shutdown_rx,
        ));

        Ok(CallSession {
            shared,
            state_rx,
            mode,
        })
    }

    /// Session identifier used in logs
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Call mode fixed at creation
    pub fn mode(&self) -> CallMode {
        self.mode
    }

    /// Current lifecycle state
    pub fn state(&self) -> CallState {
        *self.state_rx.borrow()
    }

    /// Observable state for UI rendering
    pub fn watch_state(&self) -> watch::Receiver<CallState> {
        self.state_rx.clone()
    }

    /// Subscribe to status events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Whether outbound audio is currently suppressed
    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::SeqCst)
    }

    /// Whether outbound video is currently suppressed
    pub fn is_video_suspended(&self) -> bool {
        self.shared.video_suspended.load(Ordering::SeqCst)
    }

    /// Toggle outbound audio suppression.
    ///
    /// Only affects whether the send loop transmits on its next tick;
    /// capture keeps running so un-muting is instant. Returns the new flag.
    pub fn toggle_mute(&self) -> Result<bool, SessionError> {
        self.ensure_not_ended()?;
        let was = self.shared.muted.fetch_xor(true, Ordering::SeqCst);
        tracing::debug!(id = %self.shared.id, muted = !was, "mute toggled");
        Ok(!was)
    }

    /// Toggle outbound video suppression. Returns the new flag.
    pub fn toggle_video(&self) -> Result<bool, SessionError> {
        self.ensure_not_ended()?;
        let was = self.shared.video_suspended.fetch_xor(true, Ordering::SeqCst);
        tracing::debug!(id = %self.shared.id, suspended = !was, "video toggled");
        Ok(!was)
    }

    /// Hang up. Identical in effect to a remote-initiated close and safe
    /// to call any number of times; resources are torn down exactly once.
    pub fn hangup(&self) {
        self.shared.request_teardown(EndReason::Hangup);
    }

    /// Why the session ended, once it has
    pub fn end_reason(&self) -> Option<EndReason> {
        self.shared.end_reason.lock().clone()
    }

    /// Wait for the terminal state
    pub async fn wait_ended(&self) {
        let mut rx = self.state_rx.clone();
        loop {
            if *rx.borrow() == CallState::Ended {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn ensure_not_ended(&self) -> Result<(), SessionError> {
        match self.state() {
            CallState::Ending | CallState::Ended => Err(SessionError::Ended),
            _ => Ok(()),
        }
    }
}

enum SendOutcome {
    Sent,
    Failed,
    Shutdown,
}

/// Send one chunk unless teardown begins first
async fn send_media(
    outbound: &mpsc::Sender<OutboundMedia>,
    media: OutboundMedia,
    shutdown: &mut watch::Receiver<bool>,
) -> SendOutcome {
    tokio::select! {
        _ = shutdown.changed() => SendOutcome::Shutdown,
        result = outbound.send(media) => {
            if result.is_ok() {
                SendOutcome::Sent
            } else {
                SendOutcome::Failed
            }
        }
    }
}

/// Audio producer: capture block -> encode -> transmit.
///
/// Muted blocks are consumed and discarded so the capture queue keeps
/// draining. A single failed transmit drops that chunk and continues; it
/// must not end the call.
async fn audio_send_loop(
    shared: Arc<SessionShared>,
    mut blocks: mpsc::Receiver<AudioBlock>,
    errors: Option<crossbeam_channel::Receiver<CaptureError>>,
    mut encoder: PcmEncoder,
    outbound: mpsc::Sender<OutboundMedia>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let block = tokio::select! {
            _ = shutdown.changed() => break,
            block = blocks.recv() => block,
        };

        let Some(block) = block else {
            shared.request_teardown(EndReason::CaptureFailed(
                "capture stream ended".to_string(),
            ));
            break;
        };

        if let Some(rx) = &errors {
            while let Ok(e) = rx.try_recv() {
                tracing::warn!(id = %shared.id, "capture stream error: {}", e);
                shared.emit(SessionEvent::Error(e.to_string()));
            }
        }

        if shared.muted.load(Ordering::SeqCst) {
            continue;
        }

        let chunk = encoder.encode(&block);
        match send_media(&outbound, OutboundMedia::Audio(chunk), &mut shutdown).await {
            SendOutcome::Sent => {}
            SendOutcome::Failed => {
                tracing::warn!(id = %shared.id, "audio transmit failed, chunk dropped");
                shared.emit(SessionEvent::TransmitDropped);
            }
            SendOutcome::Shutdown => break,
        }
    }
}

/// Video producer: fixed timer -> sample -> transmit.
///
/// Idles when the session has no camera (voice-only mode or no device);
/// skips ticks while suspended or not active.
async fn video_send_loop(
    shared: Arc<SessionShared>,
    sampler: Option<VideoFrameSampler>,
    outbound: mpsc::Sender<OutboundMedia>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let Some(mut sampler) = sampler else {
        let _ = shutdown.changed().await;
        return;
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; the call has barely started, skip it
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if shared.state() != CallState::Active {
                    continue;
                }
                if shared.video_suspended.load(Ordering::SeqCst) {
                    continue;
                }
                let Some(chunk) = sampler.sample() else {
                    continue;
                };
                match send_media(&outbound, OutboundMedia::Video(chunk), &mut shutdown).await {
                    SendOutcome::Sent => {}
                    SendOutcome::Failed => {
                        tracing::warn!(id = %shared.id, "video transmit failed, frame dropped");
                        shared.emit(SessionEvent::TransmitDropped);
                    }
                    SendOutcome::Shutdown => break,
                }
            }
        }
    }
}

/// Event consumer: dispatch inbound channel events.
///
/// Audio goes to the scheduler, interruption clears it, close and error
/// end the session. The transport dropping its end counts as an abrupt
/// close.
async fn event_recv_loop<S: PlaybackSink>(
    shared: Arc<SessionShared>,
    mut events: mpsc::Receiver<ChannelEvent>,
    mut scheduler: PlaybackScheduler<S>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => break,
            event = events.recv() => event,
        };

        match event {
            Some(ChannelEvent::Audio(chunk)) => match scheduler.enqueue(&chunk) {
                Ok(_) => {}
                Err(PlaybackError::Backpressure { queued_ms }) => {
                    shared.emit(SessionEvent::Degraded { queued_ms });
                }
                Err(e) => {
                    tracing::warn!(id = %shared.id, "inbound chunk rejected: {}", e);
                    shared.emit(SessionEvent::Error(e.to_string()));
                }
            },
            Some(ChannelEvent::Interrupted) => {
                tracing::debug!(id = %shared.id, "barge-in, discarding queued playback");
                scheduler.interrupt();
            }
            Some(ChannelEvent::Closed { reason }) => {
                shared.request_teardown(EndReason::RemoteClosed(reason));
                break;
            }
            Some(ChannelEvent::Error { detail }) => {
                shared.emit(SessionEvent::Error(detail.clone()));
                shared.request_teardown(EndReason::ChannelError(detail));
                break;
            }
            None => {
                shared.request_teardown(EndReason::RemoteClosed(None));
                break;
            }
        }
    }

    // Nothing queued should be heard after the call ends
    scheduler.interrupt();
}

/// Waits for teardown, joins all three loops, then releases resources.
///
/// Ordering matters: loops are cancelled before the capture resource is
/// released, and the outbound senders dropping as the loops exit is the
/// close handshake toward the transport.
async fn supervise(
    shared: Arc<SessionShared>,
    send_task: JoinHandle<()>,
    video_task: JoinHandle<()>,
    recv_task: JoinHandle<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    if !*shutdown.borrow() {
        let _ = shutdown.changed().await;
    }

    let _ = send_task.await;
    let _ = video_task.await;
    let _ = recv_task.await;

    shared.release_capture();
    shared.set_state(CallState::Ended);
    tracing::info!(id = %shared.id, reason = ?shared.end_reason.lock().clone(), "call session ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureHandle, RawFrame};
    use crate::channel::{channel_pair, ChannelHandle, TransportEndpoint};
    use crate::protocol::AudioChunk;
    use bytes::Bytes;
    use std::future::Future;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Counts drops of the underlying capture resource
    struct ReleaseProbe(Arc<AtomicUsize>);

    impl Drop for ReleaseProbe {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockCapture {
        handle: Mutex<Option<CaptureHandle>>,
        fail: bool,
    }

    impl MockCapture {
        /// Returns the capture, the block sender feeding it, and a counter
        /// of how many times the resource was released
        fn new(with_camera: bool) -> (Self, mpsc::Sender<AudioBlock>, Arc<AtomicUsize>) {
            let (block_tx, block_rx) = mpsc::channel(2);
            let releases = Arc::new(AtomicUsize::new(0));
            let camera: Option<Box<dyn crate::capture::CameraSource>> = if with_camera {
                Some(Box::new(SolidCamera))
            } else {
                None
            };
            let handle = CaptureHandle {
                blocks: block_rx,
                camera,
                guard: CaptureGuard::new(Box::new(ReleaseProbe(releases.clone()))),
                errors: None,
            };
            (
                Self {
                    handle: Mutex::new(Some(handle)),
                    fail: false,
                },
                block_tx,
                releases,
            )
        }

        fn failing() -> Self {
            Self {
                handle: Mutex::new(None),
                fail: true,
            }
        }

        /// Like `new` but with a stream-error channel the test can feed
        fn with_error_channel() -> (
            Self,
            mpsc::Sender<AudioBlock>,
            crossbeam_channel::Sender<CaptureError>,
            Arc<AtomicUsize>,
        ) {
            let (block_tx, block_rx) = mpsc::channel(2);
            let (error_tx, error_rx) = crossbeam_channel::bounded(4);
            let releases = Arc::new(AtomicUsize::new(0));
            let handle = CaptureHandle {
                blocks: block_rx,
                camera: None,
                guard: CaptureGuard::new(Box::new(ReleaseProbe(releases.clone()))),
                errors: Some(error_rx),
            };
            (
                Self {
                    handle: Mutex::new(Some(handle)),
                    fail: false,
                },
                block_tx,
                error_tx,
                releases,
            )
        }
    }

    impl MediaCapture for MockCapture {
        fn acquire(&self, _wants_video: bool) -> Result<CaptureHandle, CaptureError> {
            if self.fail {
                return Err(CaptureError::Unavailable("permission denied".into()));
            }
            Ok(self.handle.lock().take().expect("capture already acquired"))
        }
    }

    struct SolidCamera;

    impl crate::capture::CameraSource for SolidCamera {
        fn capture_frame(&mut self) -> Option<RawFrame> {
            Some(RawFrame {
                width: 8,
                height: 8,
                pixels: vec![200u8; 8 * 8 * 3],
            })
        }
    }

    struct MockConnector {
        handle: Mutex<Option<ChannelHandle>>,
    }

    impl MockConnector {
        fn new() -> (Self, TransportEndpoint) {
            let (handle, endpoint) = channel_pair(16);
            (
                Self {
                    handle: Mutex::new(Some(handle)),
                },
                endpoint,
            )
        }
    }

    impl ChannelConnector for MockConnector {
        fn open(&self) -> impl Future<Output = Result<ChannelHandle, ChannelError>> + Send {
            let handle = self.handle.lock().take();
            async move { handle.ok_or_else(|| ChannelError::OpenFailed("already open".into())) }
        }
    }

    /// Connector whose open never resolves (for the timeout path)
    struct NeverConnector;

    impl ChannelConnector for NeverConnector {
        fn open(&self) -> impl Future<Output = Result<ChannelHandle, ChannelError>> + Send {
            std::future::pending()
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        scheduled: Arc<Mutex<Vec<(usize, Instant)>>>,
        stops: Arc<AtomicUsize>,
    }

    impl PlaybackSink for RecordingSink {
        fn schedule(
            &mut self,
            samples: Vec<f32>,
            start: Instant,
        ) -> Result<(), PlaybackError> {
            self.scheduled.lock().push((samples.len(), start));
            Ok(())
        }

        fn stop_all(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn reply_chunk_ms(ms: u64) -> AudioChunk {
        let samples = 24_000 * ms as usize / 1000;
        AudioChunk {
            data: Bytes::from(vec![0u8; samples * 2]),
            sample_rate: 24_000,
            channels: 1,
        }
    }

    fn fast_config() -> CallConfig {
        CallConfig {
            connect_timeout_ms: 200,
            ..CallConfig::default()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn capture_failure_ends_before_active() {
        let capture = MockCapture::failing();
        let (connector, _endpoint) = MockConnector::new();

        let result = CallSession::connect(
            fast_config(),
            CallMode::VoiceOnly,
            &capture,
            RecordingSink::default(),
            &connector,
        )
        .await;

        match result {
            Err(Error::Capture(CaptureError::Unavailable(_))) => {}
            other => panic!("expected capture error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn connect_timeout_releases_capture() {
        let (capture, _block_tx, releases) = MockCapture::new(false);

        let result = CallSession::connect(
            fast_config(),
            CallMode::VoiceOnly,
            &capture,
            RecordingSink::default(),
            &NeverConnector,
        )
        .await;

        match result {
            Err(Error::Channel(ChannelError::Timeout)) => {}
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn captured_audio_is_encoded_and_transmitted() {
        let (capture, block_tx, _releases) = MockCapture::new(false);
        let (connector, mut endpoint) = MockConnector::new();

        let session = CallSession::connect(
            fast_config(),
            CallMode::VoiceOnly,
            &capture,
            RecordingSink::default(),
            &connector,
        )
        .await
        .unwrap();
        assert_eq!(session.state(), CallState::Active);

        block_tx.send(vec![0.5f32; 160]).await.unwrap();
        let media = endpoint.outbound.recv().await.unwrap();
        let OutboundMedia::Audio(chunk) = media else {
            panic!("expected audio");
        };
        assert_eq!(chunk.data.len(), 320);
        assert_eq!(chunk.sample_rate, 16_000);

        session.hangup();
        session.wait_ended().await;
    }

    #[tokio::test]
    async fn mute_suppresses_transmission_but_keeps_consuming() {
        let (capture, block_tx, releases) = MockCapture::new(false);
        let (connector, mut endpoint) = MockConnector::new();

        let session = CallSession::connect(
            fast_config(),
            CallMode::VoiceOnly,
            &capture,
            RecordingSink::default(),
            &connector,
        )
        .await
        .unwrap();

        assert!(session.toggle_mute().unwrap());
        settle().await;

        // More blocks than the capacity-2 capture queue: they only fit if
        // the loop keeps draining them while muted
        for _ in 0..6 {
            block_tx.send(vec![0.1f32; 16]).await.unwrap();
        }
        settle().await;

        assert!(endpoint.outbound.try_recv().is_err());
        // Capture resource is still held
        assert_eq!(releases.load(Ordering::SeqCst), 0);

        // Un-mute: next tick transmits again
        assert!(!session.toggle_mute().unwrap());
        block_tx.send(vec![0.1f32; 16]).await.unwrap();
        assert!(endpoint.outbound.recv().await.is_some());

        session.hangup();
        session.wait_ended().await;
    }

    #[tokio::test]
    async fn hangup_twice_tears_down_once() {
        let (capture, _block_tx, releases) = MockCapture::new(false);
        let (connector, _endpoint) = MockConnector::new();

        let session = CallSession::connect(
            fast_config(),
            CallMode::VoiceOnly,
            &capture,
            RecordingSink::default(),
            &connector,
        )
        .await
        .unwrap();

        session.hangup();
        session.hangup();
        session.wait_ended().await;

        assert_eq!(session.state(), CallState::Ended);
        assert_eq!(session.end_reason(), Some(EndReason::Hangup));
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        // Controls after the end fail without resurrecting the session
        assert!(matches!(session.toggle_mute(), Err(SessionError::Ended)));
        assert!(matches!(session.toggle_video(), Err(SessionError::Ended)));
    }

    #[tokio::test]
    async fn remote_close_ends_gracefully() {
        let (capture, _block_tx, releases) = MockCapture::new(false);
        let (connector, endpoint) = MockConnector::new();

        let session = CallSession::connect(
            fast_config(),
            CallMode::VoiceOnly,
            &capture,
            RecordingSink::default(),
            &connector,
        )
        .await
        .unwrap();

        endpoint
            .events
            .send(ChannelEvent::Closed {
                reason: Some("bye".into()),
            })
            .await
            .unwrap();
        session.wait_ended().await;

        assert_eq!(
            session.end_reason(),
            Some(EndReason::RemoteClosed(Some("bye".into())))
        );
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        // A racing local hangup after the remote close is a no-op
        session.hangup();
        assert_eq!(
            session.end_reason(),
            Some(EndReason::RemoteClosed(Some("bye".into())))
        );
    }

    #[tokio::test]
    async fn voice_call_scenario_with_barge_in() {
        let (capture, _block_tx, _releases) = MockCapture::new(false);
        let (connector, endpoint) = MockConnector::new();
        let sink = RecordingSink::default();

        let session = CallSession::connect(
            fast_config(),
            CallMode::VoiceOnly,
            &capture,
            sink.clone(),
            &connector,
        )
        .await
        .unwrap();
        assert_eq!(session.state(), CallState::Active);

        // Two 500ms reply chunks lay out back-to-back
        endpoint
            .events
            .send(ChannelEvent::Audio(reply_chunk_ms(500)))
            .await
            .unwrap();
        endpoint
            .events
            .send(ChannelEvent::Audio(reply_chunk_ms(500)))
            .await
            .unwrap();
        settle().await;

        {
            let scheduled = sink.scheduled.lock();
            assert_eq!(scheduled.len(), 2);
            assert_eq!(scheduled[1].1 - scheduled[0].1, Duration::from_millis(500));
        }

        // Barge-in: queued audio is discarded and the clock snaps to now
        endpoint.events.send(ChannelEvent::Interrupted).await.unwrap();
        settle().await;
        assert!(sink.stops.load(Ordering::SeqCst) >= 1);

        endpoint
            .events
            .send(ChannelEvent::Audio(reply_chunk_ms(100)))
            .await
            .unwrap();
        settle().await;

        let scheduled = sink.scheduled.lock();
        assert_eq!(scheduled.len(), 3);
        // The new chunk starts immediately, not at the stale clock
        // (first + 1000ms); well under the 500ms mark proves the snap
        assert!(scheduled[2].1 < scheduled[0].1 + Duration::from_millis(500));

        session.hangup();
        session.wait_ended().await;
    }

    #[tokio::test]
    async fn video_frames_flow_on_their_own_cadence() {
        let (capture, _block_tx, _releases) = MockCapture::new(true);
        let (connector, mut endpoint) = MockConnector::new();

        let mut config = fast_config();
        config.video.interval_ms = 30;

        let session = CallSession::connect(
            config,
            CallMode::VoiceAndVideo,
            &capture,
            RecordingSink::default(),
            &connector,
        )
        .await
        .unwrap();

        let media = endpoint.outbound.recv().await.unwrap();
        let OutboundMedia::Video(chunk) = media else {
            panic!("expected video");
        };
        assert_eq!(chunk.mime_type, "image/jpeg");

        // Suspend: ticks stop producing frames
        assert!(session.toggle_video().unwrap());
        settle().await;
        while endpoint.outbound.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(endpoint.outbound.try_recv().is_err());

        session.hangup();
        session.wait_ended().await;
    }

    #[tokio::test]
    async fn transport_drop_counts_as_abrupt_close() {
        let (capture, _block_tx, releases) = MockCapture::new(false);
        let (connector, endpoint) = MockConnector::new();

        let session = CallSession::connect(
            fast_config(),
            CallMode::VoiceOnly,
            &capture,
            RecordingSink::default(),
            &connector,
        )
        .await
        .unwrap();

        drop(endpoint);
        session.wait_ended().await;

        assert_eq!(session.end_reason(), Some(EndReason::RemoteClosed(None)));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn capture_stream_end_triggers_teardown() {
        let (capture, block_tx, releases) = MockCapture::new(false);
        let (connector, _endpoint) = MockConnector::new();

        let session = CallSession::connect(
            fast_config(),
            CallMode::VoiceOnly,
            &capture,
            RecordingSink::default(),
            &connector,
        )
        .await
        .unwrap();
        assert_eq!(session.state(), CallState::Active);

        // The microphone stream dying underneath us ends the call
        drop(block_tx);
        session.wait_ended().await;

        assert!(matches!(
            session.end_reason(),
            Some(EndReason::CaptureFailed(_))
        ));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backpressure_surfaces_degraded_event() {
        let (capture, _block_tx, _releases) = MockCapture::new(false);
        let (connector, endpoint) = MockConnector::new();

        let mut config = fast_config();
        config.max_buffered_ms = 100;

        let session = CallSession::connect(
            config,
            CallMode::VoiceOnly,
            &capture,
            RecordingSink::default(),
            &connector,
        )
        .await
        .unwrap();
        let mut events = session.subscribe();

        // Second chunk exceeds the 100ms cap and is dropped
        endpoint
            .events
            .send(ChannelEvent::Audio(reply_chunk_ms(200)))
            .await
            .unwrap();
        endpoint
            .events
            .send(ChannelEvent::Audio(reply_chunk_ms(200)))
            .await
            .unwrap();
        settle().await;

        let mut degraded = None;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Degraded { queued_ms } = event {
                degraded = Some(queued_ms);
            }
        }
        let queued_ms = degraded.expect("degraded event");
        assert!(queued_ms > 100);

        session.hangup();
        session.wait_ended().await;
    }

    #[tokio::test]
    async fn capture_stream_errors_surface_as_status_events() {
        let (capture, block_tx, error_tx, _releases) = MockCapture::with_error_channel();
        let (connector, _endpoint) = MockConnector::new();

        let session = CallSession::connect(
            fast_config(),
            CallMode::VoiceOnly,
            &capture,
            RecordingSink::default(),
            &connector,
        )
        .await
        .unwrap();
        let mut events = session.subscribe();

        // Stream errors are drained when the next block arrives
        error_tx.send(CaptureError::QueueOverflow).unwrap();
        block_tx.send(vec![0.0f32; 16]).await.unwrap();
        settle().await;

        let mut saw_overflow = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Error(detail) = event {
                if detail.contains("overflow") {
                    saw_overflow = true;
                }
            }
        }
        assert!(saw_overflow);

        session.hangup();
        session.wait_ended().await;
    }

    #[tokio::test]
    async fn status_events_report_state_changes() {
        let (capture, _block_tx, _releases) = MockCapture::new(false);
        let (connector, _endpoint) = MockConnector::new();

        let session = CallSession::connect(
            fast_config(),
            CallMode::VoiceOnly,
            &capture,
            RecordingSink::default(),
            &connector,
        )
        .await
        .unwrap();

        let mut events = session.subscribe();
        session.hangup();
        session.wait_ended().await;

        let mut saw_ending = false;
        let mut saw_ended = false;
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::StateChanged(CallState::Ending) => saw_ending = true,
                SessionEvent::StateChanged(CallState::Ended) => saw_ended = true,
                _ => {}
            }
        }
        assert!(saw_ending && saw_ended);
    }
}

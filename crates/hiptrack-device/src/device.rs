//! The phone-backed hip tracker.
//!
//! [`PhoneTracker`] is the host-facing handle. The sockets, liveness tracker,
//! calibration session and pose calculator live in a [`Session`] owned by a
//! named polling thread while the device is initialized. The thread hands the
//! session back through its `JoinHandle` on shutdown so the listener is only
//! ever set up once.
//!
//! The host talks to the loop through an unbounded command channel and reads
//! its results from `watch` channels, so neither side blocks the other.

use crate::calibration::{CalibrationEvent, CalibrationSession, CalibrationState, CalibrationTiming};
use crate::host::{HmdSource, JointState, TrackedJoint, TrackingDevice};
use crate::liveness::{LivenessTracker, Verdict, DEFAULT_RETRY_THRESHOLD};
use crate::status::DeviceStatus;
use crate::{DeviceError, TICK};
use hiptrack_config::{CalibrationOffsets, ConfigStore, PredictionConfig};
use hiptrack_net::{ChannelTiming, DataChannel, DiscoveryResponder};
use hiptrack_pose::{CaptureKind, PoseCalculator, TrackerPose};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Haptic pattern sent on `signal()`: seconds, frequency, amplitude.
const BUZZ_PATTERN: (f64, f64, f64) = (0.7, 100.0, 0.5);

const JOINT_NAME: &str = "Default";

/// Requests from the host, applied by the polling loop at the start of a tick.
#[derive(Debug)]
enum DeviceCommand {
    BeginCalibration(CaptureKind),
    Buzz,
    SetTrackerHeight(f64),
    SetPrediction(PredictionConfig),
}

/// Calibration progress as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationView {
    pub state: CalibrationState,
    pub instructions: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Polling loop period.
    pub tick: Duration,
    pub channel: ChannelTiming,
    pub calibration: CalibrationTiming,
    /// Empty polls before the status is demoted.
    pub retry_threshold: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            tick: TICK,
            channel: ChannelTiming::default(),
            calibration: CalibrationTiming::default(),
            retry_threshold: DEFAULT_RETRY_THRESHOLD,
        }
    }
}

/// State shared between the host handle and the polling thread.
struct SharedState {
    initialized: AtomicBool,
    /// Set by the host when it requests a capture, cleared by the loop.
    pending: AtomicBool,
    status: watch::Sender<DeviceStatus>,
    pose: watch::Sender<TrackerPose>,
    calibration: watch::Sender<CalibrationView>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            status: watch::channel(DeviceStatus::NotStarted).0,
            pose: watch::channel(TrackerPose::default()).0,
            calibration: watch::channel(CalibrationView::default()).0,
        }
    }

    fn set_status(&self, next: DeviceStatus) {
        self.status.send_if_modified(|status| {
            if *status == next {
                return false;
            }
            info!(from = %status, to = %next, "Device status changed");
            *status = next;
            true
        });
    }
}

/// Lock the settings store, recovering from a poisoned lock.
fn lock_store(store: &Mutex<ConfigStore>) -> MutexGuard<'_, ConfigStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything the polling loop owns.
struct Session<H> {
    channel: DataChannel,
    discovery: DiscoveryResponder,
    liveness: LivenessTracker,
    calibration: CalibrationSession,
    calculator: PoseCalculator,
    /// Working copy of the persisted offsets.
    offsets: CalibrationOffsets,
    hmd: H,
    commands: mpsc::UnboundedReceiver<DeviceCommand>,
    store: Arc<Mutex<ConfigStore>>,
    tick_period: Duration,
    ticks: u64,
}

impl<H: HmdSource> Session<H> {
    fn run(mut self, shared: &SharedState) -> Self {
        info!(port = self.channel.port(), "Polling loop started");
        self.liveness.reset();

        while shared.initialized.load(Ordering::Acquire) {
            let started = Instant::now();
            self.tick(shared, started);
            if let Some(rest) = self.tick_period.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }

        if self.calibration.abort() {
            info!("Calibration aborted, offsets left unchanged");
        }
        // Requests still queued must not replay on the next start.
        while let Ok(command) = self.commands.try_recv() {
            self.apply_setting(command);
        }
        shared.pending.store(false, Ordering::Release);
        self.publish_calibration(shared);
        info!(ticks = self.ticks, "Polling loop stopped");
        self
    }

    fn tick(&mut self, shared: &SharedState, now: Instant) {
        self.ticks += 1;
        self.drain_commands(shared, now);

        if let Err(e) = self.discovery.tick() {
            warn!(%e, "Discovery responder error");
        }
        if let Err(e) = self.channel.tick_at(now) {
            error!(%e, "Data channel error");
        }

        let verdict = self.liveness.observe(
            self.channel.is_data_available(),
            self.channel.is_connection_alive_at(now),
        );
        self.channel.reset_data_available();

        match verdict {
            Verdict::Fresh => {
                let pose = self.compute_pose();
                shared.pose.send_replace(pose);
                shared.set_status(DeviceStatus::Ok);
            }
            Verdict::Quiet => {}
            Verdict::Lost(status) => {
                shared.pose.send_modify(|pose| pose.tracked = false);
                shared.set_status(status);
            }
        }

        self.advance_calibration(shared, now);

        if self.ticks % 1000 == 0 {
            let status = *shared.status.borrow();
            debug!(ticks = self.ticks, %status, "Polling loop alive");
        }
    }

    fn compute_pose(&mut self) -> TrackerPose {
        let hmd = self.hmd.hmd_pose();
        let raw = self.channel.sample().rotation;

        match self.calibration.capture() {
            Some((kind, candidate)) => {
                self.calculator
                    .compute(raw, candidate, Some(kind), &hmd, &self.channel)
            }
            None => self
                .calculator
                .compute(raw, &mut self.offsets, None, &hmd, &self.channel),
        }
    }

    fn drain_commands(&mut self, shared: &SharedState, now: Instant) {
        while let Ok(command) = self.commands.try_recv() {
            debug!(?command, "Applying command");
            match command {
                DeviceCommand::BeginCalibration(kind) => {
                    if self.calibration.begin(kind, now) {
                        info!(?kind, "Calibration started");
                    } else {
                        warn!(?kind, "Calibration already running, request dropped");
                    }
                    self.publish_calibration(shared);
                }
                DeviceCommand::Buzz => {
                    let (duration, frequency, amplitude) = BUZZ_PATTERN;
                    if let Err(e) = self.channel.buzz(duration, frequency, amplitude) {
                        warn!(%e, "Failed to send buzz");
                    }
                }
                setting => self.apply_setting(setting),
            }
        }
    }

    /// Apply a settings change. One-shot requests reaching here were queued
    /// across a shutdown and are dropped.
    fn apply_setting(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::SetTrackerHeight(height) => {
                self.offsets.tracker_offset.y = -height;
                if let Some((_, candidate)) = self.calibration.capture() {
                    candidate.tracker_offset.y = -height;
                }
                info!(height, "Tracker height updated");
                self.persist_offsets();
            }
            DeviceCommand::SetPrediction(prediction) => {
                self.calculator.set_prediction(prediction);
                let mut store = lock_store(&self.store);
                store.config_mut().prediction = prediction;
                if let Err(e) = store.save() {
                    warn!(?e, "Failed to save prediction settings");
                }
                info!(enabled = prediction.enabled, strength = prediction.strength, "Prediction updated");
            }
            DeviceCommand::BeginCalibration(_) | DeviceCommand::Buzz => {
                debug!(?command, "Dropping request queued before shutdown");
            }
        }
    }

    fn advance_calibration(&mut self, shared: &SharedState, now: Instant) {
        match self.calibration.advance(now, &self.offsets) {
            Some(CalibrationEvent::CaptureStarted(kind)) => {
                info!(?kind, "Capture window open");
            }
            Some(CalibrationEvent::Completed(kind, offsets)) => {
                self.offsets = offsets;
                self.persist_offsets();
                self.publish_calibration(shared);
                shared.pending.store(false, Ordering::Release);
                info!(?kind, "Calibration step completed");
                return;
            }
            None => return,
        }
        self.publish_calibration(shared);
    }

    fn publish_calibration(&self, shared: &SharedState) {
        shared.calibration.send_replace(CalibrationView {
            state: self.calibration.state(),
            instructions: self.calibration.instructions(),
        });
    }

    fn persist_offsets(&self) {
        let mut store = lock_store(&self.store);
        store.config_mut().offsets = self.offsets;
        if let Err(e) = store.save() {
            warn!(?e, "Failed to save calibration offsets");
        }
    }
}

/// A single hip tracker fed by a phone over UDP.
pub struct PhoneTracker<H: HmdSource> {
    shared: Arc<SharedState>,
    store: Arc<Mutex<ConfigStore>>,
    settings: PollSettings,
    commands: mpsc::UnboundedSender<DeviceCommand>,
    /// Held until the first successful start builds the session.
    parts: Option<(mpsc::UnboundedReceiver<DeviceCommand>, H)>,
    /// The session while the loop is stopped.
    session: Option<Session<H>>,
    worker: Option<JoinHandle<Session<H>>>,
    ports: Option<(u16, u16)>,
    joints: Vec<TrackedJoint>,
}

impl<H: HmdSource> PhoneTracker<H> {
    pub fn new(store: ConfigStore, hmd: H) -> Self {
        Self::with_settings(store, hmd, PollSettings::default())
    }

    pub fn with_settings(store: ConfigStore, hmd: H, settings: PollSettings) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(SharedState::new()),
            store: Arc::new(Mutex::new(store)),
            settings,
            commands,
            parts: Some((command_rx, hmd)),
            session: None,
            worker: None,
            ports: None,
            joints: vec![TrackedJoint::new(JOINT_NAME)],
        }
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        let session = match self.session.take() {
            Some(session) => session,
            None => self.build_session()?,
        };

        self.shared.set_status(DeviceStatus::ConnectionDead);
        self.shared.initialized.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let worker = thread::Builder::new()
            .name("hiptrack-poll".into())
            .spawn(move || session.run(&shared))
            .map_err(DeviceError::Spawn)?;
        self.worker = Some(worker);
        Ok(())
    }

    fn build_session(&mut self) -> Result<Session<H>, DeviceError> {
        let config = lock_store(&self.store).config().clone();
        let network = &config.network;

        let mut channel = DataChannel::bind(network.bind_address, network.base_port)?
            .with_timing(self.settings.channel);
        channel.start_listening()?;
        let discovery = DiscoveryResponder::bind(
            network.bind_address,
            network.discovery_port,
            channel.port(),
            &network.tracker_name,
        )?;
        self.ports = Some((channel.port(), discovery.port()));

        match hiptrack_net::primary_local_ip() {
            Ok(ip) => info!(%ip, port = channel.port(), "Point the phone app at this address"),
            Err(e) => debug!(%e, "Could not determine the local address"),
        }

        let (commands, hmd) = self.parts.take().ok_or(DeviceError::SessionLost)?;
        Ok(Session {
            channel,
            discovery,
            liveness: LivenessTracker::new(self.settings.retry_threshold),
            calibration: CalibrationSession::new(self.settings.calibration),
            calculator: PoseCalculator::new(config.prediction),
            offsets: config.offsets,
            hmd,
            commands,
            store: Arc::clone(&self.store),
            tick_period: self.settings.tick,
            ticks: 0,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    /// Latest pose computed by the polling loop.
    pub fn pose(&self) -> TrackerPose {
        *self.shared.pose.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<DeviceStatus> {
        self.shared.status.subscribe()
    }

    pub fn calibration(&self) -> CalibrationView {
        *self.shared.calibration.borrow()
    }

    pub fn is_calibration_pending(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Request a guided capture. Rejected while stopped or while another is pending.
    pub fn begin_calibration(&self, kind: CaptureKind) -> bool {
        if !self.is_initialized() {
            debug!(?kind, "Calibration requested while stopped");
            return false;
        }
        if self
            .shared
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(?kind, "Calibration already pending");
            return false;
        }
        if self.commands.send(DeviceCommand::BeginCalibration(kind)).is_err() {
            self.shared.pending.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Distance from the sensor down to the virtual joint, applied on the next tick.
    pub fn set_tracker_height(&self, meters: f64) {
        let _ = self.commands.send(DeviceCommand::SetTrackerHeight(meters));
    }

    pub fn set_prediction(&self, prediction: PredictionConfig) {
        let _ = self.commands.send(DeviceCommand::SetPrediction(prediction));
    }

    /// Data port actually bound, once the listener has started.
    pub fn data_port(&self) -> Option<u16> {
        self.ports.map(|(data, _)| data)
    }

    pub fn discovery_port(&self) -> Option<u16> {
        self.ports.map(|(_, discovery)| discovery)
    }

    /// Snapshot of the persisted settings.
    pub fn config(&self) -> hiptrack_config::AppConfig {
        lock_store(&self.store).config().clone()
    }
}

impl<H: HmdSource> TrackingDevice for PhoneTracker<H> {
    fn initialize(&mut self) {
        if self.worker.is_some() {
            debug!("Device already initialized");
            return;
        }
        if self.status() == DeviceStatus::InitFailed {
            warn!("Listener failed to start earlier, not retrying");
            return;
        }

        if let Err(e) = self.start() {
            error!(%e, "Failed to start the data listener");
            self.shared.initialized.store(false, Ordering::Release);
            self.shared.set_status(DeviceStatus::InitFailed);
        }
    }

    fn update(&mut self) {
        if !self.is_initialized() {
            return;
        }
        let status = self.status();
        let pose = self.pose();
        let Some(joint) = self.joints.first_mut() else {
            return;
        };
        if status.is_ok() {
            joint.apply(&pose);
        } else {
            joint.state = JointState::NotTracked;
        }
    }

    fn shutdown(&mut self) {
        self.shared.initialized.store(false, Ordering::Release);

        match self.worker.take() {
            Some(worker) => match worker.join() {
                Ok(session) => {
                    session.persist_offsets();
                    self.session = Some(session);
                }
                Err(_) => error!("Polling thread panicked"),
            },
            None => {
                if let Err(e) = lock_store(&self.store).save() {
                    warn!(?e, "Failed to save settings");
                }
            }
        }

        self.shared.pending.store(false, Ordering::Release);
        if self.status() != DeviceStatus::InitFailed {
            self.shared.set_status(DeviceStatus::NotStarted);
        }
        if let Some(joint) = self.joints.first_mut() {
            joint.state = JointState::NotTracked;
        }
    }

    fn signal(&mut self, joint_id: usize) {
        if joint_id >= self.joints.len() {
            debug!(joint_id, "Signal for unknown joint");
            return;
        }
        let _ = self.commands.send(DeviceCommand::Buzz);
    }

    fn status(&self) -> DeviceStatus {
        *self.shared.status.borrow()
    }

    fn joints(&self) -> &[TrackedJoint] {
        &self.joints
    }
}

impl<H: HmdSource> Drop for PhoneTracker<H> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shutdown();
        }
    }
}

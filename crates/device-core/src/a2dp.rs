//! A2DP profile device
//!
//! The role is fixed by the device id: the output device is the source
//! (encoder) and the input device is the sink (decoder). Concurrent
//! sessions share one stack stream; only the first start brings the link
//! up and runs the pipeline, and only the last stop tears it down.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use bluedsp_codec_core::CodecFormat;

use crate::codec_state::CodecState;
use crate::collaborators::{A2dpSinkControl, A2dpSourceControl, SessionParam, StackCodecConfig};
use crate::device::{BluetoothDevice, DeviceContext};
use crate::error::{DeviceError, Result};
use crate::feedback::{AbrChannel, AbrRelease};
use crate::payload::ModuleTag;
use crate::types::{
    A2dpParams, BtProfile, ConnectionState, DeviceAttributes, DeviceId, DeviceParam, MediaConfig,
    ParamId, ParamValue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum A2dpRole {
    Source,
    Sink,
}

/// Link state of the A2DP stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum A2dpLinkState {
    Disconnected,
    Connected,
    Started,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartOutcome {
    Started,
    /// Accepted while suspended; the link comes up on resume
    Deferred,
}

// Stack surface driving the stream for this device's role
enum StreamControl {
    Source(Arc<dyn A2dpSourceControl>),
    Sink(Arc<dyn A2dpSinkControl>),
}

impl StreamControl {
    fn start(&self) -> Result<()> {
        match self {
            Self::Source(source) => source.start(),
            Self::Sink(sink) => sink.start_capture(),
        }
    }

    fn stop(&self) {
        let result = match self {
            Self::Source(source) => source.stop(),
            Self::Sink(sink) => sink.stop_capture(),
        };
        if let Err(e) = result {
            error!(error = %e, "Stop stream to BT stack failed");
        }
    }

    fn codec_config(&self) -> Option<StackCodecConfig> {
        match self {
            Self::Source(source) => source.encoder_config(),
            Self::Sink(sink) => sink.decoder_config(),
        }
    }

    fn is_ready(&self) -> bool {
        match self {
            Self::Source(source) => source.is_ready(),
            Self::Sink(sink) => sink.is_ready(),
        }
    }
}

#[derive(Debug)]
struct A2dpState {
    codec: CodecState,
    link: A2dpLinkState,
    sessions: u32,
    params: A2dpParams,
}

impl A2dpState {
    fn reset_connection(&mut self) {
        self.sessions = 0;
        self.params.suspended = false;
        self.params.reconfig = false;
        self.params.latency = 0;
        self.link = A2dpLinkState::Disconnected;
    }
}

pub struct BtA2dp {
    id: DeviceId,
    role: A2dpRole,
    dummy_sink: bool,
    ctx: Arc<DeviceContext>,
    state: Mutex<A2dpState>,
    abr: AbrChannel,
}

impl BtA2dp {
    /// Create the device for an A2DP id.
    ///
    /// A source device runs the stack pre-init, waits the configured
    /// settle delay and opens the source.
    pub fn new(id: DeviceId, ctx: Arc<DeviceContext>) -> Result<Self> {
        if id.profile() != BtProfile::A2dp {
            return Err(DeviceError::invalid_param(format!("{} is not an A2DP device", id)));
        }

        let role = if id.is_output() {
            A2dpRole::Source
        } else {
            A2dpRole::Sink
        };
        let dummy_sink = role == A2dpRole::Sink && ctx.stack.uses_dummy_sink();
        let offload = ctx.config.a2dp_offload_enabled();
        debug!(device = %id, offload, "A2DP offload supported = {}", offload);

        let params = A2dpParams {
            reconfig_supported: offload,
            ..Default::default()
        };
        let device = Self {
            id,
            role,
            dummy_sink,
            state: Mutex::new(A2dpState {
                codec: CodecState::new(id),
                link: A2dpLinkState::Disconnected,
                sessions: 0,
                params,
            }),
            abr: AbrChannel::new(id),
            ctx,
        };

        match role {
            A2dpRole::Source => device.init_source(),
            A2dpRole::Sink if dummy_sink => {
                debug!(device = %id, "No sink control library, using the source library")
            }
            A2dpRole::Sink if device.ctx.stack.sink.is_none() => {
                error!(device = %id, "No BT control library for A2DP sink")
            }
            A2dpRole::Sink => {}
        }

        Ok(device)
    }

    pub fn role(&self) -> A2dpRole {
        self.role
    }

    /// Capture runs through the source control library
    pub fn is_dummy_sink(&self) -> bool {
        self.dummy_sink
    }

    pub fn link_state(&self) -> A2dpLinkState {
        self.state.lock().link
    }

    /// Number of sessions currently started on the device
    pub fn session_count(&self) -> u32 {
        self.state.lock().sessions
    }

    pub fn codec_format(&self) -> CodecFormat {
        self.state.lock().codec.format
    }

    /// Custom payload handed to the last device start
    pub fn custom_payload(&self) -> bytes::Bytes {
        self.state.lock().codec.custom_payload()
    }

    pub fn abr(&self) -> &AbrChannel {
        &self.abr
    }

    fn init_source(&self) {
        let Some(source) = self.ctx.stack.source.as_ref() else {
            error!(device = %self.id, "No BT control library for A2DP source");
            return;
        };

        debug!("Calling BT module pre-init");
        source.pre_init();
        let delay = self.ctx.config.stack_pre_init_delay_ms;
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }

        let mut state = self.state.lock();
        self.open_source(&mut state);
    }

    fn open_source(&self, state: &mut A2dpState) {
        let Some(source) = self.ctx.stack.source.as_ref() else {
            return;
        };
        if state.link != A2dpLinkState::Disconnected {
            debug!(link = ?state.link, "A2DP open with improper state");
            return;
        }
        if let Err(e) = source.open() {
            error!(error = %e, "Failed to open source stream for A2DP");
        }
        state.link = A2dpLinkState::Connected;
    }

    fn close_source(&self, state: &mut A2dpState) -> Result<()> {
        let source = self.ctx.stack.source.as_ref().ok_or_else(|| {
            error!("A2DP source control missing, ignoring close request");
            DeviceError::StackUnavailable { role: "source" }
        })?;
        if state.link != A2dpLinkState::Disconnected {
            debug!("Calling BT source stream close");
            if let Err(e) = source.close() {
                error!(error = %e, "Failed to close A2DP source control path");
            }
        }
        state.reset_connection();
        Ok(())
    }

    fn stream_control(&self) -> Result<StreamControl> {
        let uses_source = self.role == A2dpRole::Source || self.dummy_sink;
        if uses_source {
            self.ctx
                .stack
                .source
                .clone()
                .map(StreamControl::Source)
                .ok_or(DeviceError::StackUnavailable { role: "source" })
        } else {
            self.ctx
                .stack
                .sink
                .clone()
                .map(StreamControl::Sink)
                .ok_or(DeviceError::StackUnavailable { role: "sink" })
        }
    }

    fn configure_codec(&self, codec: &mut CodecState) -> Result<()> {
        codec.update_device_metadata(&self.ctx)?;
        codec.configure_encoder_decoder(&self.ctx)
    }

    fn start_stream(&self, state: &mut A2dpState) -> Result<StartOutcome> {
        let control = self.stream_control().inspect_err(|_| {
            error!(device = %self.id, "A2DP handle is not identified, ignoring start request")
        })?;

        if self.role == A2dpRole::Source && state.params.suspended {
            info!(device = %self.id, "A2DP start requested during suspend state");
            return Ok(StartOutcome::Deferred);
        }

        if state.link != A2dpLinkState::Started && state.sessions == 0 {
            state.codec.format = CodecFormat::Invalid;
            debug!(device = %self.id, "Calling BT module stream start");
            control
                .start()
                .inspect_err(|e| error!(error = %e, "BT controller start failed"))?;

            let Some(config) = control.codec_config().filter(|c| c.format.is_valid()) else {
                error!(device = %self.id, "Invalid codec config from BT stack");
                control.stop();
                return Err(DeviceError::invalid_param("invalid codec config from BT stack"));
            };
            state.codec.format = config.format;
            state.codec.metadata = config.metadata;

            if let StreamControl::Source(source) = &control {
                if config.format == CodecFormat::AptxDualMono {
                    if let Some(mono) = source.tws_mono_mode_enabled() {
                        state.codec.tws_mono = mono;
                    }
                }
            }

            if let Err(e) = self.configure_codec(&mut state.codec) {
                error!(device = %self.id, error = %e, "Unable to configure DSP codec");
                control.stop();
                return Err(e);
            }

            // Routing for AAC changes once ABR is known
            if state.codec.format == CodecFormat::Aac && state.codec.abr_enabled {
                state.codec.update_device_metadata(&self.ctx)?;
            }

            if let StreamControl::Sink(sink) = &control {
                let latency = self.ctx.config.sink_setup_latency_ms;
                if let Err(e) = sink.session_setup_complete(latency) {
                    error!(error = %e, "Sink session setup complete failed");
                    control.stop();
                    state.codec.is_configured = false;
                    state.codec.release_plugin();
                    return Err(DeviceError::SetupTimeout);
                }
            }

            state.link = A2dpLinkState::Started;
        } else {
            // Module tagging depends on the codec already negotiated
            state.codec.update_device_metadata(&self.ctx)?;
        }

        state.sessions += 1;
        debug!(device = %self.id, sessions = state.sessions, "A2DP session started");
        Ok(StartOutcome::Started)
    }

    fn stop_stream(&self, state: &mut A2dpState) -> Result<()> {
        let control = self.stream_control().inspect_err(|_| {
            error!(device = %self.id, "A2DP handle is not identified, ignoring stop request")
        })?;

        if state.sessions > 0 {
            state.sessions -= 1;
        } else {
            error!(device = %self.id, "No active session requests on A2DP");
        }

        if state.link == A2dpLinkState::Started && state.sessions == 0 {
            debug!(device = %self.id, "Calling BT module stream stop");
            control.stop();
            state.codec.is_configured = false;
            state.link = A2dpLinkState::Stopped;
            state.codec.metadata = Default::default();
            state.codec.format = CodecFormat::Invalid;
            if !state.params.suspended {
                state.codec.tws_mono = false;
                state.codec.lc3_mono = false;
            }
            state.codec.release_plugin();
        }

        debug!(device = %self.id, sessions = state.sessions, "A2DP session stopped");
        Ok(())
    }

    fn set_suspended(&self, state: &mut A2dpState, suspended: bool) -> Result<()> {
        let Some(source) = self.ctx.stack.source.as_ref() else {
            return Ok(());
        };
        if state.params.suspended == suspended {
            return Ok(());
        }

        if suspended {
            state.params.suspended = true;
            if state.link == A2dpLinkState::Disconnected {
                return Ok(());
            }
            self.ctx.platform.a2dp_suspend();
            if let Err(e) = source.suspend() {
                warn!(error = %e, "BT stack suspend failed");
            }
        } else {
            source.clear_suspend_flag();
            state.params.suspended = false;
            if state.sessions > 0 {
                source
                    .start()
                    .inspect_err(|e| error!(error = %e, "BT controller start failed"))?;
            }
            self.ctx.platform.a2dp_resume();
        }
        info!(device = %self.id, suspended, "A2DP suspend state changed");
        Ok(())
    }

    fn push_session_param(&self, state: &A2dpState, param: SessionParam) -> Result<()> {
        if state.link != A2dpLinkState::Started {
            return Ok(());
        }
        let session = self.ctx.platform.active_session(self.id).map_err(|e| {
            error!(device = %self.id, error = %e, "No active stream available");
            DeviceError::NoActiveStream { device: self.id }
        })?;
        session.set_parameters(ModuleTag::PlaceholderEncoder, &param)
    }

    fn base_latency(&self, state: &A2dpState) -> u32 {
        if state.link == A2dpLinkState::Disconnected {
            return 0;
        }
        // Remote latency is reported by the source library for either role
        self.ctx
            .stack
            .source
            .as_ref()
            .and_then(|source| source.sink_latency())
            .unwrap_or(0)
    }
}

impl BluetoothDevice for BtA2dp {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn start(&self) -> Result<()> {
        let abr_request = {
            let mut state = self.state.lock();
            state.codec.clear_custom_payload();

            if self.start_stream(&mut state)? == StartOutcome::Deferred {
                return Ok(());
            }

            let attributes = state.codec.attributes.clone();
            let payload = state.codec.custom_payload();
            if let Err(e) = self.ctx.platform.start_device(self.id, &attributes, &payload) {
                error!(device = %self.id, error = %e, "Device start failed");
                self.stop_stream(&mut state)?;
                return Err(e);
            }
            state.codec.abr_request(self.abr.epoch())
        };

        if let Some(request) = abr_request {
            if let Err(e) = self.abr.start(&self.ctx, &request) {
                error!(device = %self.id, error = %e, "Feedback path unavailable, continuing without ABR");
            }
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let abr_enabled = self.state.lock().codec.abr_enabled;
        if abr_enabled && self.abr.stop(&self.ctx) == AbrRelease::TornDown {
            self.state.lock().codec.abr_enabled = false;
        }

        let mut state = self.state.lock();
        if state.sessions == 0 {
            warn!(device = %self.id, "Stop without a started session");
            return Ok(());
        }
        if let Err(e) = self.ctx.platform.stop_device(self.id) {
            warn!(device = %self.id, error = %e, "Device stop failed");
        }
        self.stop_stream(&mut state)
    }

    fn is_device_ready(&self) -> bool {
        let state = self.state.lock();
        if state.params.suspended
            || state.link == A2dpLinkState::Disconnected
            || !self.ctx.config.a2dp_offload_enabled()
        {
            return false;
        }
        self.stream_control().is_ok_and(|control| control.is_ready())
    }

    fn set_device_parameter(&self, param: &DeviceParam) -> Result<()> {
        if !self.ctx.config.a2dp_offload_enabled() {
            debug!("No supported encoders identified, ignoring A2DP set param");
            return Err(DeviceError::invalid_param("A2DP offload not supported"));
        }

        let mut state = self.state.lock();
        match param {
            DeviceParam::Connection(ConnectionState::Connected) => match self.role {
                A2dpRole::Source => self.open_source(&mut state),
                A2dpRole::Sink => state.link = A2dpLinkState::Connected,
            },
            DeviceParam::Connection(ConnectionState::Disconnected) => match self.role {
                A2dpRole::Source => self.close_source(&mut state)?,
                A2dpRole::Sink => state.reset_connection(),
            },
            DeviceParam::A2dpReconfig(reconfig) => {
                if state.link != A2dpLinkState::Disconnected {
                    state.params.reconfig = *reconfig;
                }
            }
            DeviceParam::A2dpSuspended(suspended) => self.set_suspended(&mut state, *suspended)?,
            DeviceParam::TwsMonoMode(mono_on) => {
                state.codec.tws_mono = *mono_on;
                let format = state.codec.format;
                self.push_session_param(
                    &state,
                    SessionParam::TwsMonoMode {
                        mono_on: *mono_on,
                        format,
                    },
                )?;
            }
            DeviceParam::Lc3MonoMode(mono_on) => {
                state.codec.lc3_mono = *mono_on;
                self.push_session_param(&state, SessionParam::Lc3MonoMode { mono_on: *mono_on })?;
            }
            other => {
                return Err(DeviceError::invalid_param(format!(
                    "{:?} is not an A2DP parameter",
                    other
                )));
            }
        }
        Ok(())
    }

    fn get_device_parameter(&self, id: ParamId) -> Result<ParamValue> {
        let mut state = self.state.lock();
        match id {
            ParamId::A2dpReconfig | ParamId::A2dpReconfigSupported | ParamId::A2dpSuspended => {}
            ParamId::A2dpEncoderLatency | ParamId::A2dpDecoderLatency => {
                let base = self.base_latency(&state);
                state.params.latency = state.codec.codec_latency(base);
            }
            ParamId::A2dpForceSwitch => {
                state.params.force_switch =
                    state.params.reconfig || state.link != A2dpLinkState::Started;
            }
        }
        Ok(ParamValue::A2dp(state.params.clone()))
    }

    fn codec_config(&self) -> Option<MediaConfig> {
        self.state.lock().codec.configured_codec()
    }

    fn device_attributes(&self) -> DeviceAttributes {
        self.state.lock().codec.attributes.clone()
    }

    fn set_device_attributes(&self, attributes: DeviceAttributes) {
        self.state.lock().codec.attributes = attributes;
    }
}

impl fmt::Debug for BtA2dp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BtA2dp")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("dummy_sink", &self.dummy_sink)
            .field("link", &state.link)
            .field("sessions", &state.sessions)
            .field("codec", &state.codec.format)
            .finish()
    }
}

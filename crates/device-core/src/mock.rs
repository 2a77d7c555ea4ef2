//! In-memory collaborators
//!
//! Drive the Bluetooth devices without audio hardware or a vendor stack.
//! Every call is recorded in an [`EventLog`] so tests can assert on the
//! order of routing, module resolution and stream operations.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::collaborators::{
    A2dpSinkControl, A2dpSourceControl, AudioPlatform, HostlessPcm, Mixer, ModuleSession,
    SessionParam, StackCodecConfig,
};
use crate::error::{DeviceError, Result};
use crate::metadata::RoutingKeySet;
use crate::payload::ModuleTag;
use crate::types::{
    DeviceAttributes, DeviceId, HostlessDirection, MediaConfig, PcmConfig, StreamAttributes,
};

/// Calls observed by the mock platform
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    DeviceMetadata { backend: String, keys: RoutingKeySet },
    DeviceMediaConfig { backend: String, config: MediaConfig },
    ResolveModule { backend: String, tag: ModuleTag },
    SessionParam { device: DeviceId, tag: ModuleTag, param: SessionParam },
    AllocateFrontEnds(Vec<u32>),
    FreeFrontEnds(Vec<u32>),
    MixerEnum { control: String, value: String },
    MixerValue { control: String, value: i64 },
    CustomPayload { backend: String, payload: Bytes },
    PcmOpen { front_end: u32, direction: HostlessDirection, config: PcmConfig },
    PcmStart(u32),
    PcmStop(u32),
    PcmClose(u32),
    StartDevice { device: DeviceId, attributes: DeviceAttributes, payload: Bytes },
    StopDevice(DeviceId),
    A2dpSuspend,
    A2dpResume,
}

/// Shared, ordered record of platform calls
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<PlatformEvent>>,
}

impl EventLog {
    fn push(&self, event: PlatformEvent) {
        self.events.lock().push(event);
    }

    pub fn snapshot(&self) -> Vec<PlatformEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&PlatformEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    /// Index of the first event matching `pred`
    pub fn position(&self, pred: impl Fn(&PlatformEvent) -> bool) -> Option<usize> {
        self.events.lock().iter().position(pred)
    }
}

fn module_instance_id(tag: ModuleTag) -> u32 {
    0x4000 + (tag.raw() & 0xFF)
}

#[derive(Debug, Default)]
struct PlatformFaults {
    missing_modules: HashSet<ModuleTag>,
    inactive_devices: HashSet<DeviceId>,
    pcm_not_ready: bool,
    start_device_status: Option<i32>,
}

/// Audio platform backed by memory
#[derive(Debug)]
pub struct MockPlatform {
    log: Arc<EventLog>,
    faults: Arc<Mutex<PlatformFaults>>,
    free_front_ends: Mutex<Vec<u32>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            log: Arc::new(EventLog::default()),
            faults: Arc::new(Mutex::new(PlatformFaults::default())),
            free_front_ends: Mutex::new(vec![10, 11]),
        }
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn events(&self) -> Vec<PlatformEvent> {
        self.log.snapshot()
    }

    /// Remove a module from every session graph
    pub fn remove_module(&self, tag: ModuleTag) {
        self.faults.lock().missing_modules.insert(tag);
    }

    /// Report no active stream on `device`
    pub fn deactivate(&self, device: DeviceId) {
        self.faults.lock().inactive_devices.insert(device);
    }

    pub fn set_front_ends(&self, ids: Vec<u32>) {
        *self.free_front_ends.lock() = ids;
    }

    pub fn set_pcm_not_ready(&self, not_ready: bool) {
        self.faults.lock().pcm_not_ready = not_ready;
    }

    /// Fail the generic device start with `status`
    pub fn fail_start_device(&self, status: Option<i32>) {
        self.faults.lock().start_device_status = status;
    }

    pub fn module_instance_id(tag: ModuleTag) -> u32 {
        module_instance_id(tag)
    }

    fn resolve(&self, backend: &str, tag: ModuleTag) -> Result<u32> {
        self.log.push(PlatformEvent::ResolveModule {
            backend: backend.to_string(),
            tag,
        });
        if self.faults.lock().missing_modules.contains(&tag) {
            return Err(DeviceError::module_not_found(backend, tag.raw()));
        }
        Ok(module_instance_id(tag))
    }
}

impl AudioPlatform for MockPlatform {
    fn backend_name(&self, device: DeviceId) -> Result<String> {
        Ok(match device {
            DeviceId::A2dpOut => "BT_A2DP_RX",
            DeviceId::A2dpIn => "BT_A2DP_TX",
            DeviceId::ScoOut => "BT_SCO_RX",
            DeviceId::ScoInHeadset => "BT_SCO_TX",
        }
        .to_string())
    }

    fn set_device_metadata(&self, backend: &str, keys: &RoutingKeySet) -> Result<()> {
        self.log.push(PlatformEvent::DeviceMetadata {
            backend: backend.to_string(),
            keys: keys.clone(),
        });
        Ok(())
    }

    fn set_device_media_config(&self, backend: &str, config: &MediaConfig) -> Result<()> {
        self.log.push(PlatformEvent::DeviceMediaConfig {
            backend: backend.to_string(),
            config: config.clone(),
        });
        Ok(())
    }

    fn active_session(&self, device: DeviceId) -> Result<Arc<dyn ModuleSession>> {
        if self.faults.lock().inactive_devices.contains(&device) {
            return Err(DeviceError::NoActiveStream { device });
        }
        Ok(Arc::new(MockSession {
            device,
            log: Arc::clone(&self.log),
            faults: Arc::clone(&self.faults),
        }))
    }

    fn allocate_front_end_ids(&self, _attributes: &StreamAttributes) -> Vec<u32> {
        let mut free = self.free_front_ends.lock();
        let take = free.len().min(1);
        let ids: Vec<u32> = free.drain(..take).collect();
        self.log.push(PlatformEvent::AllocateFrontEnds(ids.clone()));
        ids
    }

    fn free_front_end_ids(&self, ids: &[u32], _attributes: &StreamAttributes) {
        self.free_front_ends.lock().extend_from_slice(ids);
        self.log.push(PlatformEvent::FreeFrontEnds(ids.to_vec()));
    }

    fn mixer(&self) -> Result<Arc<dyn Mixer>> {
        Ok(Arc::new(MockMixer {
            log: Arc::clone(&self.log),
        }))
    }

    fn front_end_module_instance_id(&self, _front_end: u32, backend: &str, tag: ModuleTag) -> Result<u32> {
        self.resolve(backend, tag)
    }

    fn set_device_custom_payload(&self, backend: &str, payload: &[u8]) -> Result<()> {
        self.log.push(PlatformEvent::CustomPayload {
            backend: backend.to_string(),
            payload: Bytes::copy_from_slice(payload),
        });
        Ok(())
    }

    fn open_hostless_pcm(
        &self,
        front_end: u32,
        direction: HostlessDirection,
        config: &PcmConfig,
    ) -> Result<Box<dyn HostlessPcm>> {
        self.log.push(PlatformEvent::PcmOpen {
            front_end,
            direction,
            config: config.clone(),
        });
        Ok(Box::new(MockHostlessPcm {
            front_end,
            ready: !self.faults.lock().pcm_not_ready,
            log: Arc::clone(&self.log),
        }))
    }

    fn start_device(&self, device: DeviceId, attributes: &DeviceAttributes, custom_payload: &[u8]) -> Result<()> {
        self.log.push(PlatformEvent::StartDevice {
            device,
            attributes: attributes.clone(),
            payload: Bytes::copy_from_slice(custom_payload),
        });
        match self.faults.lock().start_device_status {
            Some(status) => Err(DeviceError::platform("start_device", status)),
            None => Ok(()),
        }
    }

    fn stop_device(&self, device: DeviceId) -> Result<()> {
        self.log.push(PlatformEvent::StopDevice(device));
        Ok(())
    }

    fn a2dp_suspend(&self) {
        self.log.push(PlatformEvent::A2dpSuspend);
    }

    fn a2dp_resume(&self) {
        self.log.push(PlatformEvent::A2dpResume);
    }
}

/// Session of a device on the mock platform
#[derive(Debug)]
pub struct MockSession {
    device: DeviceId,
    log: Arc<EventLog>,
    faults: Arc<Mutex<PlatformFaults>>,
}

impl ModuleSession for MockSession {
    fn module_instance_id(&self, backend: &str, tag: ModuleTag) -> Result<u32> {
        self.log.push(PlatformEvent::ResolveModule {
            backend: backend.to_string(),
            tag,
        });
        if self.faults.lock().missing_modules.contains(&tag) {
            return Err(DeviceError::module_not_found(backend, tag.raw()));
        }
        Ok(module_instance_id(tag))
    }

    fn set_parameters(&self, tag: ModuleTag, param: &SessionParam) -> Result<()> {
        self.log.push(PlatformEvent::SessionParam {
            device: self.device,
            tag,
            param: param.clone(),
        });
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockMixer {
    log: Arc<EventLog>,
}

impl Mixer for MockMixer {
    fn set_enum_by_name(&self, control: &str, value: &str) -> Result<()> {
        self.log.push(PlatformEvent::MixerEnum {
            control: control.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn set_value(&self, control: &str, _index: u32, value: i64) -> Result<()> {
        self.log.push(PlatformEvent::MixerValue {
            control: control.to_string(),
            value,
        });
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockHostlessPcm {
    front_end: u32,
    ready: bool,
    log: Arc<EventLog>,
}

impl HostlessPcm for MockHostlessPcm {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn start(&mut self) -> Result<()> {
        self.log.push(PlatformEvent::PcmStart(self.front_end));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.log.push(PlatformEvent::PcmStop(self.front_end));
        Ok(())
    }
}

impl Drop for MockHostlessPcm {
    fn drop(&mut self) {
        self.log.push(PlatformEvent::PcmClose(self.front_end));
    }
}

/// Calls observed by the mock stack controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackCall {
    PreInit,
    Open,
    Close,
    Start,
    Stop,
    Suspend,
    ClearSuspendFlag,
    StartCapture,
    StopCapture,
    SetupComplete(u32),
}

#[derive(Debug, Default)]
struct StackCalls {
    calls: Mutex<Vec<StackCall>>,
}

impl StackCalls {
    fn push(&self, call: StackCall) {
        self.calls.lock().push(call);
    }

    fn count(&self, call: StackCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    fn snapshot(&self) -> Vec<StackCall> {
        self.calls.lock().clone()
    }
}

/// Vendor A2DP source control backed by memory
#[derive(Debug)]
pub struct MockSourceControl {
    calls: StackCalls,
    encoder: Mutex<Option<StackCodecConfig>>,
    start_status: Mutex<Option<i32>>,
    ready: AtomicBool,
    sink_latency: Mutex<Option<u32>>,
    tws_mono: Mutex<Option<bool>>,
}

impl MockSourceControl {
    pub fn new(encoder: Option<StackCodecConfig>) -> Self {
        Self {
            calls: StackCalls::default(),
            encoder: Mutex::new(encoder),
            start_status: Mutex::new(None),
            ready: AtomicBool::new(true),
            sink_latency: Mutex::new(None),
            tws_mono: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<StackCall> {
        self.calls.snapshot()
    }

    pub fn count(&self, call: StackCall) -> usize {
        self.calls.count(call)
    }

    pub fn set_encoder_config(&self, encoder: Option<StackCodecConfig>) {
        *self.encoder.lock() = encoder;
    }

    pub fn fail_start(&self, status: Option<i32>) {
        *self.start_status.lock() = status;
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_sink_latency(&self, latency_ms: Option<u32>) {
        *self.sink_latency.lock() = latency_ms;
    }

    pub fn set_tws_mono(&self, mono: Option<bool>) {
        *self.tws_mono.lock() = mono;
    }
}

impl A2dpSourceControl for MockSourceControl {
    fn pre_init(&self) {
        self.calls.push(StackCall::PreInit);
    }

    fn open(&self) -> Result<()> {
        self.calls.push(StackCall::Open);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.calls.push(StackCall::Close);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.calls.push(StackCall::Start);
        match *self.start_status.lock() {
            Some(status) => Err(DeviceError::stack("audio_start_stream", status)),
            None => Ok(()),
        }
    }

    fn stop(&self) -> Result<()> {
        self.calls.push(StackCall::Stop);
        Ok(())
    }

    fn suspend(&self) -> Result<()> {
        self.calls.push(StackCall::Suspend);
        Ok(())
    }

    fn clear_suspend_flag(&self) {
        self.calls.push(StackCall::ClearSuspendFlag);
    }

    fn encoder_config(&self) -> Option<StackCodecConfig> {
        self.encoder.lock().clone()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn sink_latency(&self) -> Option<u32> {
        *self.sink_latency.lock()
    }

    fn tws_mono_mode_enabled(&self) -> Option<bool> {
        *self.tws_mono.lock()
    }
}

/// Vendor A2DP sink control backed by memory
#[derive(Debug)]
pub struct MockSinkControl {
    calls: StackCalls,
    decoder: Mutex<Option<StackCodecConfig>>,
    setup_status: Mutex<Option<i32>>,
    ready: AtomicBool,
}

impl MockSinkControl {
    pub fn new(decoder: Option<StackCodecConfig>) -> Self {
        Self {
            calls: StackCalls::default(),
            decoder: Mutex::new(decoder),
            setup_status: Mutex::new(None),
            ready: AtomicBool::new(true),
        }
    }

    pub fn calls(&self) -> Vec<StackCall> {
        self.calls.snapshot()
    }

    pub fn count(&self, call: StackCall) -> usize {
        self.calls.count(call)
    }

    /// Fail session-setup-complete with `status`
    pub fn fail_setup_complete(&self, status: Option<i32>) {
        *self.setup_status.lock() = status;
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl A2dpSinkControl for MockSinkControl {
    fn start_capture(&self) -> Result<()> {
        self.calls.push(StackCall::StartCapture);
        Ok(())
    }

    fn stop_capture(&self) -> Result<()> {
        self.calls.push(StackCall::StopCapture);
        Ok(())
    }

    fn decoder_config(&self) -> Option<StackCodecConfig> {
        self.decoder.lock().clone()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn session_setup_complete(&self, latency_ms: u32) -> Result<()> {
        self.calls.push(StackCall::SetupComplete(latency_ms));
        match *self.setup_status.lock() {
            Some(status) => Err(DeviceError::stack("audio_sink_session_setup_complete", status)),
            None => Ok(()),
        }
    }
}

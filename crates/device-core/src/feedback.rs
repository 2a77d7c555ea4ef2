//! Adaptive bitrate feedback channel
//!
//! Each primary device owns one [`AbrChannel`]. The first start opens a
//! hostless front end bound to the feedback backend and configures the
//! feedback modules; later starts only count. The DSP state of a
//! feedback device is shared across owners through a [`FeedbackLink`].
//!
//! The channel lock is never taken while the owning device's lock is
//! held. Link locks are leaves.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use bluedsp_codec_core::error::errno;
use bluedsp_codec_core::{CodecDirection, CodecFormat};

use crate::codec_state::AbrRequest;
use crate::collaborators::{
    front_end_connect_control, AudioPlatform, HostlessPcm, Mixer, MIXER_SET_FEEDBACK_CHANNEL,
};
use crate::device::DeviceContext;
use crate::error::{DeviceError, Result};
use crate::metadata::{feedback_device_attributes, feedback_device_for, feedback_routing_keys};
use crate::payload::{ModuleTag, PayloadBuilder};
use crate::types::{
    BtProfile, ChannelInfo, DeviceId, HostlessDirection, MediaConfig, PcmConfig, PcmFormat,
    StreamAttributes,
};

#[derive(Debug, Default)]
struct LinkState {
    owners: HashSet<DeviceId>,
    configured: bool,
    codec_config: Option<MediaConfig>,
}

/// DSP state of one feedback device, shared by the primaries using it
#[derive(Debug)]
pub struct FeedbackLink {
    device: DeviceId,
    state: Mutex<LinkState>,
}

impl FeedbackLink {
    fn new(device: DeviceId) -> Self {
        Self {
            device,
            state: Mutex::new(LinkState::default()),
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn is_configured(&self) -> bool {
        self.state.lock().configured
    }

    /// Feedback codec configuration, present while configured
    pub fn codec_config(&self) -> Option<MediaConfig> {
        let state = self.state.lock();
        if state.configured {
            state.codec_config.clone()
        } else {
            None
        }
    }

    pub fn owner_count(&self) -> usize {
        self.state.lock().owners.len()
    }

    pub fn is_owned_by(&self, owner: DeviceId) -> bool {
        self.state.lock().owners.contains(&owner)
    }

    /// Register `owner` and mark the link configured
    pub fn acquire(&self, owner: DeviceId, codec_config: Option<MediaConfig>) {
        let mut state = self.state.lock();
        state.owners.insert(owner);
        state.configured = true;
        if codec_config.is_some() {
            state.codec_config = codec_config;
        }
        debug!(link = %self.device, %owner, owners = state.owners.len(), "Feedback link acquired");
    }

    /// Drop `owner`; the link is unconfigured once no owner remains.
    ///
    /// Returns false when `owner` did not hold the link.
    pub fn release(&self, owner: DeviceId) -> bool {
        let mut state = self.state.lock();
        if !state.owners.remove(&owner) {
            return false;
        }
        if state.owners.is_empty() {
            state.configured = false;
            state.codec_config = None;
        }
        debug!(link = %self.device, %owner, owners = state.owners.len(), "Feedback link released");
        true
    }
}

/// One [`FeedbackLink`] per feedback device
#[derive(Debug, Default)]
pub struct FeedbackLinks {
    links: DashMap<DeviceId, Arc<FeedbackLink>>,
}

impl FeedbackLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link for `device`, created on first use
    pub fn link(&self, device: DeviceId) -> Arc<FeedbackLink> {
        self.links
            .entry(device)
            .or_insert_with(|| Arc::new(FeedbackLink::new(device)))
            .clone()
    }

    pub fn get(&self, device: DeviceId) -> Option<Arc<FeedbackLink>> {
        self.links.get(&device).map(|link| link.clone())
    }
}

/// Allocated front ends, freed on drop
struct FrontEndLease {
    platform: Arc<dyn AudioPlatform>,
    ids: Vec<u32>,
    attributes: StreamAttributes,
}

impl FrontEndLease {
    fn allocate(platform: &Arc<dyn AudioPlatform>, attributes: StreamAttributes) -> Result<Self> {
        let ids = platform.allocate_front_end_ids(&attributes);
        if ids.is_empty() {
            error!("Front end allocation for feedback path failed");
            return Err(DeviceError::resource_exhausted("no hostless front end available"));
        }
        Ok(Self {
            platform: Arc::clone(platform),
            ids,
            attributes,
        })
    }

    fn primary(&self) -> u32 {
        self.ids[0]
    }
}

impl Drop for FrontEndLease {
    fn drop(&mut self) {
        self.platform.free_front_end_ids(&self.ids, &self.attributes);
    }
}

/// BT feedback usecase flag, cleared on drop unless committed
struct FeedbackUsecase {
    mixer: Arc<dyn Mixer>,
    committed: bool,
}

impl FeedbackUsecase {
    fn enable(mixer: Arc<dyn Mixer>) -> Result<Self> {
        mixer
            .set_value(MIXER_SET_FEEDBACK_CHANNEL, 0, 1)
            .inspect_err(|e| error!(error = %e, "Failed to set BT feedback usecase"))?;
        Ok(Self {
            mixer,
            committed: false,
        })
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for FeedbackUsecase {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self.mixer.set_value(MIXER_SET_FEEDBACK_CHANNEL, 0, 0) {
            error!(error = %e, "Failed to reset BT feedback usecase");
        }
    }
}

struct ActiveFeedback {
    feedback_device: DeviceId,
    pcm: Box<dyn HostlessPcm>,
    link: Option<Arc<FeedbackLink>>,
    front_ends: FrontEndLease,
}

#[derive(Default)]
struct AbrState {
    ref_count: u32,
    active: Option<ActiveFeedback>,
}

/// Outcome of [`AbrChannel::stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbrRelease {
    /// Last reference dropped; the feedback path is closed
    TornDown,
    /// Other sessions still reference the path
    StillReferenced(u32),
    /// No feedback path was open
    NotActive,
}

/// Reference-counted feedback path of one primary device
pub struct AbrChannel {
    owner: DeviceId,
    state: Mutex<AbrState>,
    // Bumped under the state lock by a stop that found no open path
    epoch: AtomicU64,
}

impl AbrChannel {
    pub fn new(owner: DeviceId) -> Self {
        Self {
            owner,
            state: Mutex::new(AbrState::default()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Current start epoch, captured into [`AbrRequest`] by the owner
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn ref_count(&self) -> u32 {
        self.state.lock().ref_count
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active.is_some()
    }

    /// Feedback device of the open path
    pub fn feedback_device(&self) -> Option<DeviceId> {
        self.state.lock().active.as_ref().map(|a| a.feedback_device)
    }

    /// Open the feedback path or take another reference to it.
    ///
    /// On failure everything acquired is released and the count is left
    /// untouched. A request captured before a stop that found no open
    /// path is discarded and returns 0.
    pub fn start(&self, ctx: &DeviceContext, request: &AbrRequest) -> Result<u32> {
        let mut state = self.state.lock();
        if request.epoch != self.epoch.load(Ordering::Acquire) {
            warn!(owner = %self.owner, "Session stopped before its feedback path opened");
            return Ok(0);
        }
        if state.ref_count > 0 {
            state.ref_count += 1;
            debug!(owner = %self.owner, refs = state.ref_count, "Feedback path already open");
            return Ok(state.ref_count);
        }

        let active = open_feedback(ctx, request)?;
        info!(
            owner = %self.owner,
            feedback = %active.feedback_device,
            codec = %request.format,
            "Feedback device started"
        );
        state.active = Some(active);
        state.ref_count = 1;
        Ok(1)
    }

    /// Drop one reference; the last one closes the path
    pub fn stop(&self, ctx: &DeviceContext) -> AbrRelease {
        let mut state = self.state.lock();
        if state.active.is_none() {
            warn!(owner = %self.owner, "Feedback path not open");
            // A start still on its way to this lock belongs to a stopped session
            self.epoch.fetch_add(1, Ordering::AcqRel);
            return AbrRelease::NotActive;
        }

        state.ref_count = state.ref_count.saturating_sub(1);
        if state.ref_count > 0 {
            debug!(owner = %self.owner, refs = state.ref_count, "Feedback path still referenced");
            return AbrRelease::StillReferenced(state.ref_count);
        }

        if let Some(active) = state.active.take() {
            close_feedback(ctx, self.owner, active);
        }
        AbrRelease::TornDown
    }
}

impl fmt::Debug for AbrChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbrChannel")
            .field("owner", &self.owner)
            .field("refs", &self.ref_count())
            .finish()
    }
}

// Link bookkeeping applies to speech codecs and to LC3 on a SCO feedback device
fn uses_shared_link(format: CodecFormat, feedback: DeviceId) -> bool {
    format == CodecFormat::AptxAdaptiveSpeech
        || (format == CodecFormat::Lc3 && feedback.profile() == BtProfile::Sco)
}

fn open_feedback(ctx: &DeviceContext, request: &AbrRequest) -> Result<ActiveFeedback> {
    let platform = &ctx.platform;
    let owner_direction = request.owner.codec_direction();
    let feedback_device = feedback_device_for(request.owner, request.format);
    let attributes = feedback_device_attributes(request.format);
    let keys = feedback_routing_keys(feedback_device, request.format);

    let backend = platform.backend_name(feedback_device)?;
    platform
        .set_device_metadata(&backend, &keys)
        .inspect_err(|e| error!(error = %e, "setDeviceMetadata for feedback device failed"))?;
    platform
        .set_device_media_config(&backend, &attributes)
        .inspect_err(|e| error!(error = %e, "setDeviceMediaConfig for feedback device failed"))?;

    let direction = if feedback_device.is_output() {
        HostlessDirection::RxHostless
    } else {
        HostlessDirection::TxHostless
    };
    let stream = StreamAttributes {
        low_latency: true,
        direction,
        media: attributes,
    };
    let front_ends = FrontEndLease::allocate(platform, stream)?;
    let front_end = front_ends.primary();

    let mixer = platform.mixer()?;
    mixer.set_enum_by_name(&front_end_connect_control(front_end), &backend)?;
    let usecase = FeedbackUsecase::enable(mixer)?;

    let builder = PayloadBuilder::new();
    let shared = uses_shared_link(request.format, feedback_device);
    let link = shared.then(|| ctx.feedback_links.link(feedback_device));
    let mut feedback_codec = None;

    if request.format == CodecFormat::AptxAdaptiveSpeech {
        if link.as_ref().is_some_and(|l| l.is_configured()) {
            info!(feedback = %feedback_device, "Feedback path is already configured");
        } else {
            let tag = ModuleTag::placeholder(owner_direction.inverse());
            let miid = platform.front_end_module_instance_id(front_end, &backend, tag)?;
            let (plugin, package) = ctx
                .gateway
                .load_codec_payload(request.format, owner_direction.inverse(), &request.metadata)?
                .into_parts();
            drop(plugin);

            // Speech feedback codecs carry a single parameter block
            let [block] = package.blocks.as_slice() else {
                error!(blocks = package.blocks.len(), "Incorrect feedback block count");
                return Err(DeviceError::invalid_param(format!(
                    "feedback codec returned {} blocks, expected 1",
                    package.blocks.len()
                )));
            };
            let payload = builder.custom_param(miid, block.param_id, block.payload.clone());
            platform.set_device_custom_payload(&backend, &payload.to_bytes())?;
            feedback_codec = Some(MediaConfig::pcm(
                package.sample_rate,
                package.bit_width,
                ChannelInfo::with_channels(package.channel_count),
            ));
        }
    } else if request.format == CodecFormat::Lc3 && owner_direction == CodecDirection::Encoder {
        let miid = platform.front_end_module_instance_id(front_end, &backend, ModuleTag::CopDepacketizerV2)?;
        // Depacketizer takes the same stream info as the packetizer
        let payload = builder.cop_v2_pack_config(miid, request.metadata.lc3())?;
        platform.set_device_custom_payload(&backend, &payload.to_bytes())?;
    }

    let feedback = &ctx.config.feedback;
    let pcm_config = PcmConfig {
        rate: feedback.sample_rate,
        channels: 1,
        format: PcmFormat::S16Le,
        period_size: feedback.period_size,
        period_count: feedback.period_count,
        start_threshold: 0,
        stop_threshold: 0,
        silence_threshold: 0,
    };
    let mut pcm = platform.open_hostless_pcm(front_end, direction, &pcm_config)?;
    if !pcm.is_ready() {
        error!(front_end, "Feedback PCM not ready");
        return Err(DeviceError::platform("pcm_open", -errno::EINVAL));
    }
    pcm.start()
        .inspect_err(|e| error!(error = %e, "Feedback PCM start failed"))?;

    if let Some(link) = &link {
        link.acquire(request.owner, feedback_codec);
    }
    usecase.commit();

    Ok(ActiveFeedback {
        feedback_device,
        pcm,
        link,
        front_ends,
    })
}

fn close_feedback(ctx: &DeviceContext, owner: DeviceId, active: ActiveFeedback) {
    let ActiveFeedback {
        feedback_device,
        mut pcm,
        link,
        front_ends,
    } = active;

    if let Err(e) = pcm.stop() {
        warn!(error = %e, "Feedback PCM stop failed");
    }
    drop(pcm);

    match ctx.platform.mixer() {
        Ok(mixer) => {
            if let Err(e) = mixer.set_value(MIXER_SET_FEEDBACK_CHANNEL, 0, 0) {
                error!(error = %e, "Failed to reset BT feedback usecase");
            }
        }
        Err(e) => error!(error = %e, "Mixer unavailable on feedback teardown"),
    }

    if let Some(link) = link {
        link.release(owner);
    }

    drop(front_ends);
    info!(%owner, feedback = %feedback_device, "Feedback device stopped");
}

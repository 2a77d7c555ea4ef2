//! # Device-Core: Bluetooth audio devices for DSP offload
//!
//! This library drives Bluetooth A2DP and SCO audio through an offloaded
//! DSP graph:
//!
//! - **Routing metadata**: key/value pairs that select the DSP graph for a
//!   codec, profile and direction ([`metadata`])
//! - **Pipeline configuration**: resolving graph modules and staging their
//!   parameter payloads ([`pipeline`], [`payload`])
//! - **Profile devices**: the A2DP ([`BtA2dp`]) and SCO ([`BtSco`]) state
//!   machines behind the [`BluetoothDevice`] interface
//! - **Feedback channel**: the reference-counted adaptive-bitrate
//!   feedback path ([`feedback`])
//!
//! The audio platform and the vendor Bluetooth stack are reached through
//! the traits in [`collaborators`]; [`mock`] provides in-memory versions.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use bluedsp_codec_core::plugin::StaticPluginLoader;
//! use bluedsp_device_core::mock::MockPlatform;
//! use bluedsp_device_core::{BluetoothDevice, BtStack, DeviceConfig, DeviceContext, DeviceId, DeviceParam, DeviceRegistry};
//!
//! let config = DeviceConfig {
//!     stack_pre_init_delay_ms: 0,
//!     ..Default::default()
//! };
//! let ctx = DeviceContext::with_loader(
//!     Arc::new(MockPlatform::new()),
//!     BtStack::default(),
//!     Arc::new(StaticPluginLoader::new()),
//!     config,
//! );
//! let registry = DeviceRegistry::new(ctx);
//!
//! let sco = registry.sco(DeviceId::ScoOut)?;
//! sco.set_device_parameter(&DeviceParam::ScoOn(true))?;
//! assert!(sco.is_device_ready());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod a2dp;
pub mod codec_state;
pub mod collaborators;
pub mod config;
pub mod device;
pub mod error;
pub mod feedback;
pub mod logging;
pub mod metadata;
pub mod mock;
pub mod payload;
pub mod pipeline;
pub mod registry;
pub mod sco;
pub mod types;

// Re-export commonly used types
pub use a2dp::{A2dpLinkState, A2dpRole, BtA2dp};
pub use collaborators::{
    A2dpSinkControl, A2dpSourceControl, AudioPlatform, BtStack, HostlessPcm, Mixer,
    ModuleSession, SessionParam, StackCodecConfig,
};
pub use config::{DeviceConfig, FeedbackConfig};
pub use device::{BluetoothDevice, DeviceContext};
pub use error::{DeviceError, ErrorCategory, Result};
pub use feedback::{AbrChannel, AbrRelease};
pub use logging::{LoggingConfig, setup_logging};
pub use metadata::{RoutingKeySet, compute_routing_keys, derive_device_attributes};
pub use payload::{ModulePayload, ModuleTag, PayloadBuilder};
pub use pipeline::{DspPipelineConfigurator, PipelineRequest, StagedPayload};
pub use registry::DeviceRegistry;
pub use sco::BtSco;
pub use types::{
    A2dpParams, AudioFormat, ChannelInfo, ConnectionState, DeviceAttributes, DeviceId,
    DeviceParam, MediaConfig, ParamId, ParamValue,
};

/// Version information for the device library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

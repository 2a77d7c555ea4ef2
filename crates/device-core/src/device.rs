//! Device context and the interface shared by the Bluetooth devices

use std::fmt;
use std::sync::Arc;

use bluedsp_codec_core::plugin::PluginLoader;
use bluedsp_codec_core::CodecPluginGateway;

use crate::collaborators::{AudioPlatform, BtStack};
use crate::config::DeviceConfig;
use crate::error::Result;
use crate::feedback::FeedbackLinks;
use crate::types::{DeviceAttributes, DeviceId, DeviceParam, MediaConfig, ParamId, ParamValue};

/// Services shared by every Bluetooth device of a process
pub struct DeviceContext {
    pub platform: Arc<dyn AudioPlatform>,
    pub stack: BtStack,
    pub gateway: CodecPluginGateway,
    pub config: DeviceConfig,
    pub feedback_links: FeedbackLinks,
}

impl DeviceContext {
    pub fn new(
        platform: Arc<dyn AudioPlatform>,
        stack: BtStack,
        gateway: CodecPluginGateway,
        config: DeviceConfig,
    ) -> Self {
        Self {
            platform,
            stack,
            gateway,
            config,
            feedback_links: FeedbackLinks::new(),
        }
    }

    /// Build the plugin gateway from the configured plugin mappings
    pub fn with_loader(
        platform: Arc<dyn AudioPlatform>,
        stack: BtStack,
        loader: Arc<dyn PluginLoader>,
        config: DeviceConfig,
    ) -> Self {
        let gateway = CodecPluginGateway::new(config.plugin_registry(), loader);
        Self::new(platform, stack, gateway, config)
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("stack", &self.stack)
            .field("plugins", &self.gateway.registry().len())
            .field("config", &self.config)
            .finish()
    }
}

/// Operations exposed by a Bluetooth profile device
pub trait BluetoothDevice: Send + Sync {
    fn id(&self) -> DeviceId;

    /// Start one logical session on the device
    fn start(&self) -> Result<()>;

    /// Stop one logical session on the device
    fn stop(&self) -> Result<()>;

    fn is_device_ready(&self) -> bool;

    fn set_device_parameter(&self, param: &DeviceParam) -> Result<()>;

    fn get_device_parameter(&self, id: ParamId) -> Result<ParamValue>;

    /// Codec configuration snapshot; `None` until a configuration pass
    /// completed
    fn codec_config(&self) -> Option<MediaConfig>;

    fn device_attributes(&self) -> DeviceAttributes;

    /// Replace the base attributes, as chosen by the generic device layer
    fn set_device_attributes(&self, attributes: DeviceAttributes);
}

//! Shared fixtures for the device integration tests
//!
//! Builds a [`DeviceRegistry`] over the in-memory platform, stack controls
//! and codec plugins, and keeps handles to all of them for assertions.

#![allow(dead_code)]

use std::sync::Arc;

use bluedsp_codec_core::plugin::{CodecPluginGateway, InMemoryLibrary, PluginRegistry, StaticPluginLoader};
use bluedsp_codec_core::{
    CodecConfigPackage, CodecDirection, CodecFormat, CodecMetadata, ConfigBlock, Lc3CodecConfig,
    Lc3ScoParams,
};
use bluedsp_device_core::mock::{MockPlatform, MockSinkControl, MockSourceControl, PlatformEvent};
use bluedsp_device_core::{
    A2dpSinkControl, A2dpSourceControl, BtStack, DeviceConfig, DeviceContext, DeviceRegistry,
    ModulePayload, ModuleTag, StackCodecConfig,
};

/// Parameter id carried by the plugin-provided block
pub const CODEC_BLOCK_PARAM: u32 = 0x0800_10A1;

/// Everything a device test needs to drive and observe devices
pub struct TestHarness {
    pub platform: Arc<MockPlatform>,
    pub source: Option<Arc<MockSourceControl>>,
    pub sink: Option<Arc<MockSinkControl>>,
    pub loader: Arc<StaticPluginLoader>,
    pub registry: DeviceRegistry,
}

impl TestHarness {
    pub fn source(&self) -> &MockSourceControl {
        self.source.as_deref().expect("harness built without a source control")
    }

    pub fn sink(&self) -> &MockSinkControl {
        self.sink.as_deref().expect("harness built without a sink control")
    }

    pub fn events(&self) -> Vec<PlatformEvent> {
        self.platform.events()
    }

    /// Module tags resolved on `backend`, in order
    pub fn resolved_tags(&self, backend: &str) -> Vec<ModuleTag> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlatformEvent::ResolveModule { backend: b, tag } if b == backend => Some(tag),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&PlatformEvent) -> bool) -> usize {
        self.platform.log().count(pred)
    }
}

pub struct HarnessBuilder {
    source: Option<Arc<MockSourceControl>>,
    sink: Option<Arc<MockSinkControl>>,
    plugins: Vec<(CodecFormat, CodecDirection, Arc<InMemoryLibrary>)>,
    config: DeviceConfig,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            sink: None,
            plugins: Vec::new(),
            config: DeviceConfig {
                stack_pre_init_delay_ms: 0,
                ..Default::default()
            },
        }
    }

    /// Source control negotiating `codec`
    pub fn source(mut self, codec: Option<StackCodecConfig>) -> Self {
        self.source = Some(Arc::new(MockSourceControl::new(codec)));
        self
    }

    /// Sink control negotiating `codec`
    pub fn sink(mut self, codec: Option<StackCodecConfig>) -> Self {
        self.sink = Some(Arc::new(MockSinkControl::new(codec)));
        self
    }

    pub fn plugin(mut self, format: CodecFormat, direction: CodecDirection, library: Arc<InMemoryLibrary>) -> Self {
        self.plugins.push((format, direction, library));
        self
    }

    pub fn config(mut self, update: impl FnOnce(&mut DeviceConfig)) -> Self {
        update(&mut self.config);
        self
    }

    pub fn build(self) -> TestHarness {
        let loader = Arc::new(StaticPluginLoader::new());
        let registry = PluginRegistry::new();
        for (format, direction, library) in self.plugins {
            let path = format!("/vendor/lib/lib{}_{}.so", format.name().to_lowercase(), direction);
            loader.register(&path, library);
            registry.register(format, direction, &path);
        }

        let platform = Arc::new(MockPlatform::new());
        let stack = BtStack::new(
            self.source.clone().map(|s| s as Arc<dyn A2dpSourceControl>),
            self.sink.clone().map(|s| s as Arc<dyn A2dpSinkControl>),
        );
        let gateway = CodecPluginGateway::new(registry, loader.clone());
        let ctx = DeviceContext::new(platform.clone(), stack, gateway, self.config);

        TestHarness {
            platform,
            source: self.source,
            sink: self.sink,
            loader,
            registry: DeviceRegistry::new(ctx),
        }
    }
}

pub fn stack_codec(format: CodecFormat, metadata: CodecMetadata) -> Option<StackCodecConfig> {
    Some(StackCodecConfig { format, metadata })
}

/// Package with a single plugin block
pub fn codec_package(sample_rate: u32, channels: u16) -> CodecConfigPackage {
    CodecConfigPackage::new(sample_rate, 16, channels)
        .with_block(ConfigBlock::new(CODEC_BLOCK_PARAM, vec![0xA5u8; 8]))
}

pub fn library(name: &str, package: CodecConfigPackage) -> Arc<InMemoryLibrary> {
    Arc::new(InMemoryLibrary::with_package(name, package))
}

pub fn lc3_params(stream_map: &str) -> Lc3ScoParams {
    Lc3ScoParams {
        rx_config_index: 5,
        tx_config_index: 5,
        frame_duration: None,
        api_version: 21,
        num_blocks: 1,
        stream_map: stream_map.into(),
    }
}

pub fn lc3_config() -> Lc3CodecConfig {
    Lc3CodecConfig::from_sco_params(&lc3_params("0,0,M")).expect("valid LC3 parameters")
}

/// Parameter ids of a staged custom payload, in order
pub fn param_ids(payload: bytes::Bytes) -> Vec<u32> {
    ModulePayload::parse_all(payload)
        .expect("well-formed custom payload")
        .into_iter()
        .map(|record| record.param_id)
        .collect()
}

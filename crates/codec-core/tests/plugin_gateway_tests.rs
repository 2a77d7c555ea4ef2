//! Codec plugin gateway tests
//!
//! Exercise every outcome of a plugin payload request and check that no
//! codec instance is left open afterwards.

use std::sync::Arc;

use bluedsp_codec_core::plugin::{
    CodecPluginGateway, InMemoryLibrary, PluginRegistry, StaticPluginLoader,
};
use bluedsp_codec_core::{
    CodecConfigPackage, CodecDirection, CodecError, CodecFormat, CodecMetadata, ConfigBlock,
};

const AAC_LIB: &str = "/vendor/lib/libaac_plugin.so";

fn aac_package() -> CodecConfigPackage {
    CodecConfigPackage::new(48000, 16, 2)
        .with_block(ConfigBlock::new(0x0800_10A1, vec![0xAAu8; 12]))
        .with_abr()
}

fn gateway_with(library: Arc<InMemoryLibrary>) -> (CodecPluginGateway, Arc<StaticPluginLoader>) {
    let loader = Arc::new(StaticPluginLoader::new());
    loader.register(AAC_LIB, library);

    let registry = PluginRegistry::new();
    registry.register(CodecFormat::Aac, CodecDirection::Encoder, AAC_LIB);

    (CodecPluginGateway::new(registry, loader.clone()), loader)
}

mod gateway_tests {
    use super::*;

    #[test]
    fn test_successful_load_returns_package() {
        let library = Arc::new(InMemoryLibrary::with_package("aac", aac_package()));
        let (gateway, loader) = gateway_with(library.clone());

        let loaded = gateway
            .load_codec_payload(
                CodecFormat::Aac,
                CodecDirection::Encoder,
                &CodecMetadata::Opaque(vec![1u8, 2, 3].into()),
            )
            .unwrap();

        assert_eq!(loaded.package, aac_package());
        assert_eq!(loaded.codec.format(), CodecFormat::Aac);
        assert_eq!(loader.load_count(), 1);
        assert_eq!(library.counters().open_instances(), 1);
        assert_eq!(
            library.last_metadata(),
            Some(CodecMetadata::Opaque(vec![1u8, 2, 3].into()))
        );

        let (codec, _package) = loaded.into_parts();
        drop(codec);
        assert_eq!(library.counters().open_instances(), 0);
        assert_eq!(library.counters().closes(), 1);
    }

    #[test]
    fn test_missing_mapping_is_not_supported() {
        let library = Arc::new(InMemoryLibrary::with_package("aac", aac_package()));
        let (gateway, loader) = gateway_with(library.clone());

        let err = gateway
            .load_codec_payload(CodecFormat::Aac, CodecDirection::Decoder, &CodecMetadata::None)
            .unwrap_err();

        assert!(matches!(err, CodecError::NotSupported { .. }));
        assert_eq!(loader.load_count(), 0);
        assert_eq!(library.counters().opens(), 0);
    }

    #[test]
    fn test_unknown_library_is_load_error() {
        let loader = Arc::new(StaticPluginLoader::new());
        let registry = PluginRegistry::new();
        registry.register(CodecFormat::Ldac, CodecDirection::Encoder, "/missing/libldac.so");
        let gateway = CodecPluginGateway::new(registry, loader);

        let err = gateway
            .load_codec_payload(CodecFormat::Ldac, CodecDirection::Encoder, &CodecMetadata::None)
            .unwrap_err();
        assert!(matches!(err, CodecError::LoadError { .. }));
    }

    #[test]
    fn test_missing_entry_point_is_load_error() {
        let library = Arc::new(InMemoryLibrary::with_package("aac", aac_package()).without_entry_point());
        let (gateway, _loader) = gateway_with(library.clone());

        let err = gateway
            .load_codec_payload(CodecFormat::Aac, CodecDirection::Encoder, &CodecMetadata::None)
            .unwrap_err();

        assert!(matches!(err, CodecError::LoadError { .. }));
        assert_eq!(library.counters().opens(), 0);
    }

    #[test]
    fn test_open_refusal_is_plugin_open_error() {
        let library = Arc::new(InMemoryLibrary::with_package("aac", aac_package()));
        library.set_open_status(-12);
        let (gateway, _loader) = gateway_with(library.clone());

        let err = gateway
            .load_codec_payload(CodecFormat::Aac, CodecDirection::Encoder, &CodecMetadata::None)
            .unwrap_err();

        assert_eq!(err, CodecError::plugin_open(CodecFormat::Aac, -12));
        assert_eq!(err.status(), -12);
        assert_eq!(library.counters().open_instances(), 0);
    }

    #[test]
    fn test_populate_failure_closes_codec() {
        let library = Arc::new(InMemoryLibrary::new("aac", |_, _, _| Err(-71)));
        let (gateway, _loader) = gateway_with(library.clone());

        let err = gateway
            .load_codec_payload(CodecFormat::Aac, CodecDirection::Encoder, &CodecMetadata::None)
            .unwrap_err();

        assert!(matches!(err, CodecError::PayloadError { status: -71, .. }));
        assert_eq!(library.counters().opens(), 1);
        assert_eq!(library.counters().populates(), 1);
        assert_eq!(library.counters().closes(), 1);
    }

    #[test]
    fn test_codec_latency_passes_through_plugin() {
        let library = Arc::new(InMemoryLibrary::with_package("aac", aac_package()));
        library.set_latency(35);
        let (gateway, _loader) = gateway_with(library);

        let loaded = gateway
            .load_codec_payload(CodecFormat::Aac, CodecDirection::Encoder, &CodecMetadata::None)
            .unwrap();
        assert_eq!(loaded.codec.codec_latency(100), 135);
    }
}

//! SCO device integration tests

mod device_test_utils;

use bluedsp_codec_core::{CodecConfigPackage, CodecDirection, CodecFormat, CodecMetadata, ConfigBlock};
use bluedsp_device_core::metadata::{KeyCategory, KeyValue, SPEECH_CODEC_SAMPLE_RATE};
use bluedsp_device_core::mock::PlatformEvent;
use bluedsp_device_core::payload::{
    PARAM_ID_COP_V2_DEPACKETIZER_STREAM_MAP_IN, PARAM_ID_COP_V2_DEPACKETIZER_STREAM_MAP_OUT,
    PARAM_ID_LC3_ENC_DOWNMIX_2_MONO,
};
use bluedsp_device_core::types::HostlessDirection;
use bluedsp_device_core::{
    AudioFormat, BluetoothDevice, DeviceError, DeviceId, DeviceParam, ModuleTag, ParamId,
};
use device_test_utils::*;

const RENDER_BACKEND: &str = "BT_SCO_RX";
const CAPTURE_BACKEND: &str = "BT_SCO_TX";
const FEEDBACK_BLOCK_PARAM: u32 = 0x0800_20B2;

#[test]
fn test_narrowband_mirrors_device_attributes() {
    let harness = HarnessBuilder::new().build();
    let sco = harness.registry.sco(DeviceId::ScoOut).unwrap();
    assert!(!sco.is_device_ready());
    sco.set_device_parameter(&DeviceParam::ScoOn(true)).unwrap();
    assert!(sco.is_device_ready());

    sco.start().unwrap();

    let config = sco.codec_config().unwrap();
    assert_eq!(config, sco.device_attributes());
    assert_eq!(config.audio_format, AudioFormat::Pcm);
    assert_eq!(config.sample_rate, 8000);
    assert!(harness.resolved_tags(RENDER_BACKEND).is_empty());
    assert!(sco.custom_payload().is_empty());

    let keys = harness
        .events()
        .into_iter()
        .find_map(|e| match e {
            PlatformEvent::DeviceMetadata { keys, .. } => Some(keys),
            _ => None,
        })
        .unwrap();
    assert!(keys.contains(KeyCategory::BtProfile, KeyValue::Sco));
    assert_eq!(keys.value_of(KeyCategory::BtFormat), None);

    sco.stop().unwrap();
    assert!(sco.codec_config().is_none());
    assert!(harness.events().contains(&PlatformEvent::StopDevice(DeviceId::ScoOut)));
}

#[test]
fn test_preferred_sample_rate() {
    let harness = HarnessBuilder::new().build();
    let sco = harness.registry.sco(DeviceId::ScoOut).unwrap();
    assert_eq!(sco.preferred_sample_rate(), 8000);

    sco.set_device_parameter(&DeviceParam::ScoWideband(true)).unwrap();
    assert_eq!(sco.preferred_sample_rate(), 16000);

    sco.set_device_parameter(&DeviceParam::ScoWideband(false)).unwrap();
    sco.set_device_parameter(&DeviceParam::ScoSuperWideband {
        enabled: true,
        speech_mode: 4,
    })
    .unwrap();
    assert_eq!(sco.preferred_sample_rate(), SPEECH_CODEC_SAMPLE_RATE);
}

#[test]
fn test_parameter_reads_unsupported() {
    let harness = HarnessBuilder::new().build();
    let sco = harness.registry.sco(DeviceId::ScoInHeadset).unwrap();

    let err = sco.get_device_parameter(ParamId::A2dpSuspended).unwrap_err();
    assert!(matches!(err, DeviceError::InvalidParam { .. }));
    let err = sco.set_device_parameter(&DeviceParam::A2dpReconfig(true)).unwrap_err();
    assert!(matches!(err, DeviceError::InvalidParam { .. }));
}

mod swb_tests {
    use super::*;

    fn speech_package() -> CodecConfigPackage {
        CodecConfigPackage::new(SPEECH_CODEC_SAMPLE_RATE, 16, 1)
            .with_block(ConfigBlock::new(CODEC_BLOCK_PARAM, vec![0x5Au8; 12]))
            .with_abr()
    }

    fn speech_harness() -> (TestHarness, std::sync::Arc<bluedsp_codec_core::plugin::InMemoryLibrary>) {
        let feedback = library(
            "aptx_speech_dec",
            CodecConfigPackage::new(32000, 16, 1)
                .with_block(ConfigBlock::new(FEEDBACK_BLOCK_PARAM, vec![0x11u8; 4])),
        );
        let harness = HarnessBuilder::new()
            .plugin(
                CodecFormat::AptxAdaptiveSpeech,
                CodecDirection::Encoder,
                library("aptx_speech_enc", speech_package()),
            )
            .plugin(CodecFormat::AptxAdaptiveSpeech, CodecDirection::Decoder, feedback.clone())
            .build();
        (harness, feedback)
    }

    fn enable_swb(device: &dyn BluetoothDevice) {
        device.set_device_parameter(&DeviceParam::ScoOn(true)).unwrap();
        device
            .set_device_parameter(&DeviceParam::ScoSuperWideband {
                enabled: true,
                speech_mode: 4,
            })
            .unwrap();
    }

    #[test]
    fn test_speech_pipeline_stops_after_plugin_blocks() {
        let (harness, _feedback) = speech_harness();
        let sco = harness.registry.sco(DeviceId::ScoOut).unwrap();
        enable_swb(sco.as_ref());

        sco.start().unwrap();

        assert_eq!(sco.codec_format(), CodecFormat::AptxAdaptiveSpeech);
        assert_eq!(
            harness.resolved_tags(RENDER_BACKEND),
            vec![ModuleTag::PlaceholderEncoder]
        );
        assert_eq!(param_ids(sco.custom_payload()), vec![CODEC_BLOCK_PARAM]);

        let routed_swb = harness.count(|e| {
            matches!(e, PlatformEvent::DeviceMetadata { backend, keys }
                if backend == RENDER_BACKEND && keys.contains(KeyCategory::BtFormat, KeyValue::Swb))
        });
        assert_eq!(routed_swb, 1);
    }

    #[test]
    fn test_speech_feedback_configures_paired_device() {
        let (harness, feedback) = speech_harness();
        let sco_out = harness.registry.sco(DeviceId::ScoOut).unwrap();
        let sco_in = harness.registry.sco(DeviceId::ScoInHeadset).unwrap();
        enable_swb(sco_out.as_ref());
        enable_swb(sco_in.as_ref());

        sco_out.start().unwrap();

        assert_eq!(sco_out.abr().feedback_device(), Some(DeviceId::ScoInHeadset));
        assert_eq!(harness.resolved_tags(CAPTURE_BACKEND), vec![ModuleTag::PlaceholderDecoder]);
        let feedback_payload = harness.events().into_iter().find_map(|e| match e {
            PlatformEvent::CustomPayload { backend, payload } if backend == CAPTURE_BACKEND => Some(payload),
            _ => None,
        });
        assert_eq!(param_ids(feedback_payload.unwrap()), vec![FEEDBACK_BLOCK_PARAM]);
        assert_eq!(feedback.last_metadata(), Some(CodecMetadata::SpeechMode(4)));
        assert_eq!(feedback.counters().open_instances(), 0);

        let pcm = harness.events().into_iter().find_map(|e| match e {
            PlatformEvent::PcmOpen { direction, config, .. } => Some((direction, config)),
            _ => None,
        });
        let (direction, config) = pcm.unwrap();
        assert_eq!(direction, HostlessDirection::TxHostless);
        assert_eq!(config.rate, 8000);
        assert_eq!(config.channels, 1);

        // The capture device reports the feedback codec and skips its own pass
        assert_eq!(sco_in.codec_config().unwrap().sample_rate, 32000);
        sco_in.start().unwrap();
        assert_eq!(harness.resolved_tags(CAPTURE_BACKEND), vec![ModuleTag::PlaceholderDecoder]);
        sco_in.stop().unwrap();
        assert!(sco_in.codec_config().is_some());

        sco_out.stop().unwrap();
        assert!(!sco_out.abr().is_active());
        assert!(sco_in.codec_config().is_none());
        assert!(sco_out.codec_config().is_none());
        assert_eq!(sco_out.codec_format(), CodecFormat::Invalid);
    }

    #[test]
    fn test_feedback_with_extra_blocks_is_rejected() {
        let harness = HarnessBuilder::new()
            .plugin(
                CodecFormat::AptxAdaptiveSpeech,
                CodecDirection::Encoder,
                library("aptx_speech_enc", speech_package()),
            )
            .plugin(
                CodecFormat::AptxAdaptiveSpeech,
                CodecDirection::Decoder,
                library("aptx_speech_dec", codec_package(32000, 1).with_block(ConfigBlock::new(1, vec![0u8]))),
            )
            .build();
        let sco = harness.registry.sco(DeviceId::ScoOut).unwrap();
        enable_swb(sco.as_ref());

        // Feedback failure does not fail the primary start
        sco.start().unwrap();

        assert!(!sco.abr().is_active());
        assert_eq!(harness.count(|e| matches!(e, PlatformEvent::CustomPayload { .. })), 0);
        assert_eq!(harness.count(|e| matches!(e, PlatformEvent::FreeFrontEnds(_))), 1);
    }
}

mod lc3_tests {
    use super::*;

    #[test]
    fn test_enable_requires_parameters() {
        let harness = HarnessBuilder::new().build();
        let sco = harness.registry.sco(DeviceId::ScoInHeadset).unwrap();

        let err = sco
            .set_device_parameter(&DeviceParam::ScoLc3 {
                enabled: true,
                params: None,
            })
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidParam { .. }));
        assert!(sco.lc3_config().is_none());
        assert_eq!(sco.preferred_sample_rate(), 8000);
    }

    #[test]
    fn test_malformed_stream_map_rejected() {
        let harness = HarnessBuilder::new().build();
        let sco = harness.registry.sco(DeviceId::ScoInHeadset).unwrap();

        let err = sco
            .set_device_parameter(&DeviceParam::ScoLc3 {
                enabled: true,
                params: Some(lc3_params("7,9,X")),
            })
            .unwrap_err();
        assert!(matches!(err, DeviceError::Codec(_)));
    }

    #[test]
    fn test_lc3_capture_configures_depacketizer() {
        let lc3 = library("lc3_dec", codec_package(32000, 1));
        let harness = HarnessBuilder::new()
            .plugin(CodecFormat::Lc3, CodecDirection::Decoder, lc3.clone())
            .build();
        let sco = harness.registry.sco(DeviceId::ScoInHeadset).unwrap();
        sco.set_device_parameter(&DeviceParam::ScoLc3 {
            enabled: true,
            params: Some(lc3_params("0,0,M")),
        })
        .unwrap();
        assert_eq!(sco.preferred_sample_rate(), SPEECH_CODEC_SAMPLE_RATE);
        assert_eq!(sco.lc3_config().unwrap().encoder.to_air.sampling_freq, 24000);

        sco.start().unwrap();

        assert_eq!(sco.codec_format(), CodecFormat::Lc3);
        assert_eq!(
            harness.resolved_tags(CAPTURE_BACKEND),
            vec![ModuleTag::PlaceholderDecoder, ModuleTag::CopDepacketizerV2]
        );
        assert_eq!(
            param_ids(sco.custom_payload()),
            vec![
                CODEC_BLOCK_PARAM,
                PARAM_ID_LC3_ENC_DOWNMIX_2_MONO,
                PARAM_ID_COP_V2_DEPACKETIZER_STREAM_MAP_OUT,
                PARAM_ID_COP_V2_DEPACKETIZER_STREAM_MAP_IN,
            ]
        );
        assert!(matches!(lc3.last_metadata(), Some(CodecMetadata::Lc3(_))));

        sco.stop().unwrap();
        assert_eq!(lc3.counters().open_instances(), 0);
        assert_eq!(sco.codec_format(), CodecFormat::Invalid);
    }
}

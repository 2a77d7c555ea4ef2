//! Routing keys and device attribute derivation
//!
//! Pure functions: nothing here touches a collaborator. The routing key
//! set selects the backend graph for a device; it must be recomputed
//! whenever direction, profile or codec changes and pushed before any
//! module instance on that backend is resolved.

use std::fmt;

use bluedsp_codec_core::{CodecDirection, CodecFormat};
use tracing::error;

use crate::types::{AudioFormat, BtProfile, ChannelInfo, DeviceAttributes, DeviceId, MediaConfig};

/// Sample rate used by speech-class codecs and their feedback paths
pub const SPEECH_CODEC_SAMPLE_RATE: u32 = 96000;
/// Sample rate of a feedback path for non-speech codecs
pub const FEEDBACK_SAMPLE_RATE: u32 = 8000;

/// Routing key category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCategory {
    DeviceRx,
    DeviceTx,
    BtProfile,
    BtFormat,
}

/// Routing key value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyValue {
    BtRx,
    BtTx,
    A2dp,
    Sco,
    Ldac,
    AptxAdaptive,
    Lc3,
    AacAbr,
    Swb,
    Generic,
}

/// One (category, value) routing pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    pub category: KeyCategory,
    pub value: KeyValue,
}

impl RoutingKey {
    pub const fn new(category: KeyCategory, value: KeyValue) -> Self {
        Self { category, value }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}={:?}", self.category, self.value)
    }
}

/// Ordered routing key collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RoutingKeySet {
    keys: Vec<RoutingKey>,
}

impl RoutingKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: KeyCategory, value: KeyValue) {
        self.keys.push(RoutingKey::new(category, value));
    }

    pub fn contains(&self, category: KeyCategory, value: KeyValue) -> bool {
        self.keys.contains(&RoutingKey::new(category, value))
    }

    /// Value of the first key in `category`
    pub fn value_of(&self, category: KeyCategory) -> Option<KeyValue> {
        self.keys
            .iter()
            .find(|key| key.category == category)
            .map(|key| key.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoutingKey> {
        self.keys.iter()
    }

    pub fn as_slice(&self) -> &[RoutingKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn push_direction_key(keys: &mut RoutingKeySet, renders: bool) {
    if renders {
        keys.push(KeyCategory::DeviceRx, KeyValue::BtRx);
    } else {
        keys.push(KeyCategory::DeviceTx, KeyValue::BtTx);
    }
}

/// Routing keys for a primary Bluetooth device.
///
/// A2DP always carries a format tag, falling back to `Generic`. SCO only
/// carries one for super-wideband and LC3 speech.
pub fn compute_routing_keys(
    profile: BtProfile,
    direction: CodecDirection,
    format: CodecFormat,
    abr_enabled: bool,
) -> RoutingKeySet {
    let mut keys = RoutingKeySet::new();
    push_direction_key(&mut keys, direction == CodecDirection::Encoder);

    match profile {
        BtProfile::A2dp => {
            keys.push(KeyCategory::BtProfile, KeyValue::A2dp);
            let tag = match format {
                CodecFormat::Ldac => KeyValue::Ldac,
                CodecFormat::AptxAdaptive => KeyValue::AptxAdaptive,
                CodecFormat::Lc3 => KeyValue::Lc3,
                CodecFormat::Aac if abr_enabled => KeyValue::AacAbr,
                _ => KeyValue::Generic,
            };
            keys.push(KeyCategory::BtFormat, tag);
        }
        BtProfile::Sco => {
            keys.push(KeyCategory::BtProfile, KeyValue::Sco);
            match format {
                CodecFormat::AptxAdaptiveSpeech => keys.push(KeyCategory::BtFormat, KeyValue::Swb),
                CodecFormat::Lc3 => keys.push(KeyCategory::BtFormat, KeyValue::Lc3),
                _ => {}
            }
        }
    }

    keys
}

/// Physical stream attributes implied by a negotiated codec.
///
/// Starts from `base` with the codec sample rate, then applies the codec
/// overrides: AAC/SBC decoders and LDAC/aptX-Adaptive encoders run the
/// endpoint at twice 44.1/48 kHz, speech-class codecs run compressed at
/// 96 kHz.
pub fn derive_device_attributes(
    format: CodecFormat,
    direction: CodecDirection,
    codec_sample_rate: u32,
    base: &DeviceAttributes,
) -> DeviceAttributes {
    let mut attributes = base.clone();
    attributes.sample_rate = codec_sample_rate;

    let doubles = matches!(codec_sample_rate, 44100 | 48000);
    match format {
        CodecFormat::Aac | CodecFormat::Sbc if direction == CodecDirection::Decoder && doubles => {
            attributes.sample_rate = codec_sample_rate * 2;
        }
        CodecFormat::Ldac | CodecFormat::AptxAdaptive
            if direction == CodecDirection::Encoder && doubles =>
        {
            attributes.sample_rate = codec_sample_rate * 2;
        }
        CodecFormat::AptxAdaptiveSpeech | CodecFormat::Lc3 => {
            attributes.sample_rate = SPEECH_CODEC_SAMPLE_RATE;
            attributes.audio_format = AudioFormat::DefaultCompressed;
        }
        _ => {}
    }

    attributes
}

/// Attributes of the feedback endpoint: mono, 16-bit, compressed
pub fn feedback_device_attributes(format: CodecFormat) -> DeviceAttributes {
    let sample_rate = if format.is_speech_class() {
        SPEECH_CODEC_SAMPLE_RATE
    } else {
        FEEDBACK_SAMPLE_RATE
    };

    MediaConfig {
        sample_rate,
        bit_width: 16,
        channel_info: ChannelInfo::mono(),
        audio_format: AudioFormat::DefaultCompressed,
    }
}

/// Device carrying the feedback path of `owner`.
///
/// A capture owner gets its feedback on a render device and vice versa.
pub fn feedback_device_for(owner: DeviceId, format: CodecFormat) -> DeviceId {
    match owner.codec_direction() {
        CodecDirection::Decoder if format == CodecFormat::AptxAdaptiveSpeech => DeviceId::ScoOut,
        CodecDirection::Decoder => DeviceId::A2dpOut,
        CodecDirection::Encoder if owner == DeviceId::A2dpOut => DeviceId::A2dpIn,
        CodecDirection::Encoder => DeviceId::ScoInHeadset,
    }
}

/// Routing keys for a feedback device
pub fn feedback_routing_keys(feedback: DeviceId, format: CodecFormat) -> RoutingKeySet {
    let mut keys = RoutingKeySet::new();
    push_direction_key(&mut keys, feedback.is_output());

    match feedback.profile() {
        BtProfile::A2dp => {
            if format == CodecFormat::Lc3 {
                keys.push(KeyCategory::BtProfile, KeyValue::A2dp);
            }
        }
        BtProfile::Sco => match format {
            CodecFormat::AptxAdaptiveSpeech => {
                keys.push(KeyCategory::BtProfile, KeyValue::Sco);
                keys.push(KeyCategory::BtFormat, KeyValue::Swb);
            }
            CodecFormat::Lc3 => {
                keys.push(KeyCategory::BtProfile, KeyValue::Sco);
                keys.push(KeyCategory::BtFormat, KeyValue::Lc3);
            }
            other => {
                error!(device = %feedback, codec = %other, "Unsupported codec for SCO feedback path");
            }
        },
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn a2dp_base() -> DeviceAttributes {
        MediaConfig::default_for(DeviceId::A2dpOut)
    }

    #[test]
    fn test_a2dp_keys() {
        let keys = compute_routing_keys(BtProfile::A2dp, CodecDirection::Encoder, CodecFormat::Ldac, false);
        assert_eq!(
            keys.as_slice(),
            &[
                RoutingKey::new(KeyCategory::DeviceRx, KeyValue::BtRx),
                RoutingKey::new(KeyCategory::BtProfile, KeyValue::A2dp),
                RoutingKey::new(KeyCategory::BtFormat, KeyValue::Ldac),
            ]
        );

        let keys = compute_routing_keys(BtProfile::A2dp, CodecDirection::Decoder, CodecFormat::Aac, true);
        assert_eq!(keys.value_of(KeyCategory::DeviceTx), Some(KeyValue::BtTx));
        assert_eq!(keys.value_of(KeyCategory::BtFormat), Some(KeyValue::AacAbr));

        let keys = compute_routing_keys(BtProfile::A2dp, CodecDirection::Encoder, CodecFormat::Aac, false);
        assert_eq!(keys.value_of(KeyCategory::BtFormat), Some(KeyValue::Generic));
    }

    #[test]
    fn test_sco_keys() {
        let keys = compute_routing_keys(BtProfile::Sco, CodecDirection::Encoder, CodecFormat::Invalid, false);
        assert_eq!(keys.len(), 2);
        assert!(keys.value_of(KeyCategory::BtFormat).is_none());

        let keys = compute_routing_keys(
            BtProfile::Sco,
            CodecDirection::Decoder,
            CodecFormat::AptxAdaptiveSpeech,
            false,
        );
        assert!(keys.contains(KeyCategory::BtFormat, KeyValue::Swb));
    }

    #[test]
    fn test_rate_doubling() {
        let attrs = derive_device_attributes(CodecFormat::Sbc, CodecDirection::Decoder, 44100, &a2dp_base());
        assert_eq!(attrs.sample_rate, 88200);

        let attrs = derive_device_attributes(CodecFormat::Sbc, CodecDirection::Encoder, 44100, &a2dp_base());
        assert_eq!(attrs.sample_rate, 44100);

        let attrs = derive_device_attributes(CodecFormat::Ldac, CodecDirection::Encoder, 48000, &a2dp_base());
        assert_eq!(attrs.sample_rate, 96000);

        let attrs = derive_device_attributes(CodecFormat::Ldac, CodecDirection::Encoder, 96000, &a2dp_base());
        assert_eq!(attrs.sample_rate, 96000);
        assert_eq!(attrs.audio_format, AudioFormat::Pcm);
    }

    #[test]
    fn test_speech_class_attributes() {
        let base = MediaConfig::default_for(DeviceId::ScoOut);
        let attrs = derive_device_attributes(CodecFormat::Lc3, CodecDirection::Encoder, 32000, &base);
        assert_eq!(attrs.sample_rate, SPEECH_CODEC_SAMPLE_RATE);
        assert_eq!(attrs.audio_format, AudioFormat::DefaultCompressed);
        assert_eq!(attrs.channel_info, base.channel_info);
    }

    #[test]
    fn test_feedback_device_selection() {
        assert_eq!(
            feedback_device_for(DeviceId::ScoInHeadset, CodecFormat::AptxAdaptiveSpeech),
            DeviceId::ScoOut
        );
        assert_eq!(feedback_device_for(DeviceId::A2dpIn, CodecFormat::Aac), DeviceId::A2dpOut);
        assert_eq!(feedback_device_for(DeviceId::A2dpOut, CodecFormat::Aac), DeviceId::A2dpIn);
        assert_eq!(feedback_device_for(DeviceId::ScoOut, CodecFormat::Lc3), DeviceId::ScoInHeadset);
    }

    #[test]
    fn test_feedback_keys() {
        let keys = feedback_routing_keys(DeviceId::ScoInHeadset, CodecFormat::Lc3);
        assert_eq!(
            keys.as_slice(),
            &[
                RoutingKey::new(KeyCategory::DeviceTx, KeyValue::BtTx),
                RoutingKey::new(KeyCategory::BtProfile, KeyValue::Sco),
                RoutingKey::new(KeyCategory::BtFormat, KeyValue::Lc3),
            ]
        );

        let keys = feedback_routing_keys(DeviceId::A2dpIn, CodecFormat::Aac);
        assert_eq!(keys.len(), 1);

        let keys = feedback_routing_keys(DeviceId::A2dpOut, CodecFormat::Lc3);
        assert!(keys.contains(KeyCategory::BtProfile, KeyValue::A2dp));
    }

    #[test]
    fn test_feedback_attributes() {
        let attrs = feedback_device_attributes(CodecFormat::Aac);
        assert_eq!(attrs.sample_rate, FEEDBACK_SAMPLE_RATE);
        assert_eq!(attrs.channels(), 1);
        assert_eq!(feedback_device_attributes(CodecFormat::Lc3).sample_rate, 96000);
    }

    fn any_format() -> impl Strategy<Value = CodecFormat> {
        proptest::sample::select(CodecFormat::ALL.to_vec())
    }

    fn any_direction() -> impl Strategy<Value = CodecDirection> {
        prop_oneof![Just(CodecDirection::Encoder), Just(CodecDirection::Decoder)]
    }

    proptest! {
        #[test]
        fn prop_derivation_is_pure(
            format in any_format(),
            direction in any_direction(),
            rate in prop_oneof![Just(16000u32), Just(32000), Just(44100), Just(48000), Just(96000), 1u32..200_000],
        ) {
            let base = a2dp_base();
            let first = derive_device_attributes(format, direction, rate, &base);
            let second = derive_device_attributes(format, direction, rate, &base);
            prop_assert_eq!(&first, &second);

            // Feeding the result back with the same inputs is stable too
            let again = derive_device_attributes(format, direction, rate, &first);
            prop_assert_eq!(first.sample_rate, again.sample_rate);
        }

        #[test]
        fn prop_routing_keys_are_deterministic(
            format in any_format(),
            direction in any_direction(),
            abr in any::<bool>(),
        ) {
            for profile in [BtProfile::A2dp, BtProfile::Sco] {
                prop_assert_eq!(
                    compute_routing_keys(profile, direction, format, abr),
                    compute_routing_keys(profile, direction, format, abr)
                );
            }
        }
    }
}

//! LC3 codec metadata
//!
//! Converts the LC3 parameters negotiated for a SCO/LE link into the
//! encoder and decoder configuration consumed by the LC3 plugin and the
//! COPv2 packetizer stages, including the textual stream map.
//!
//! A stream map is a sequence of `<stream-id>,<direction>,<M|L|R>` triples
//! separated by commas and/or whitespace, for example `"0,0,L 1,1,R"`.

use nom::{
    bytes::complete::take_while1,
    character::complete::{one_of, satisfy},
    combinator::map,
    sequence::{preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CodecError, Result};

type ParseResult<'a, O> = IResult<&'a [u8], O>;

/// LC3 bit depth used by every standard configuration
pub const LC3_BIT_DEPTH: u8 = 24;

/// Size of the vendor-specific area in an LC3 frame configuration
pub const LC3_VENDOR_BYTES: usize = 16;

/// Spatial location of an LC3 stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum AudioLocation {
    Mono = 0,
    Left = 1,
    Right = 2,
}

impl AudioLocation {
    fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'M' => Some(Self::Mono),
            'L' => Some(Self::Left),
            'R' => Some(Self::Right),
            _ => None,
        }
    }

    pub fn raw(&self) -> u32 {
        *self as u32
    }
}

/// One parsed stream-map triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lc3StreamMapEntry {
    pub audio_location: AudioLocation,
    pub stream_id: u8,
    pub direction: u8,
}

/// Channel layout the LC3 decoder produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoderOutputChannel {
    Mono,
    Stereo,
}

impl DecoderOutputChannel {
    pub fn channel_count(&self) -> u32 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

/// Over-the-air frame configuration for one LC3 direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lc3FrameConfig {
    /// Sampling frequency in Hz
    pub sampling_freq: u32,
    pub max_octets_per_frame: u16,
    /// Frame duration in microseconds
    pub frame_duration: u32,
    pub bit_depth: u8,
    pub api_version: u32,
    pub num_blocks: u32,
    pub default_q_level: u8,
    pub mode: u8,
    pub vendor_specific: [u8; LC3_VENDOR_BYTES],
}

/// Encoder half: what goes to the air
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lc3EncoderConfig {
    pub to_air: Lc3FrameConfig,
    pub stream_map_out: Vec<Lc3StreamMapEntry>,
}

/// Decoder half: what comes from the air
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lc3DecoderConfig {
    pub from_air: Lc3FrameConfig,
    pub stream_map_in: Vec<Lc3StreamMapEntry>,
    pub decoder_output_channel: DecoderOutputChannel,
}

/// Complete LC3 codec configuration handed to the plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lc3CodecConfig {
    pub encoder: Lc3EncoderConfig,
    pub decoder: Lc3DecoderConfig,
}

/// Standard codec-specific configuration entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lc3CscEntry {
    pub name: &'static str,
    pub sampling_freq: u32,
    pub frame_duration: u32,
    pub max_octets_per_frame: u16,
}

const fn csc(
    name: &'static str,
    sampling_freq: u32,
    frame_duration: u32,
    max_octets_per_frame: u16,
) -> Lc3CscEntry {
    Lc3CscEntry {
        name,
        sampling_freq,
        frame_duration,
        max_octets_per_frame,
    }
}

/// BAP codec-specific configurations, indexed by the stack's config index
pub const LC3_CSC: [Lc3CscEntry; 16] = [
    csc("8_1", 8000, 7500, 26),
    csc("8_2", 8000, 10000, 30),
    csc("16_1", 16000, 7500, 30),
    csc("16_2", 16000, 10000, 40),
    csc("24_1", 24000, 7500, 45),
    csc("24_2", 24000, 10000, 60),
    csc("32_1", 32000, 7500, 60),
    csc("32_2", 32000, 10000, 80),
    csc("441_1", 44100, 7500, 97),
    csc("441_2", 44100, 10000, 130),
    csc("48_1", 48000, 7500, 75),
    csc("48_2", 48000, 10000, 100),
    csc("48_3", 48000, 7500, 90),
    csc("48_4", 48000, 10000, 120),
    csc("48_5", 48000, 7500, 117),
    csc("48_6", 48000, 10000, 155),
];

/// LC3 parameters as delivered with the SCO LC3 enable request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lc3ScoParams {
    /// Index into [`LC3_CSC`] for the to-air direction
    pub rx_config_index: usize,
    /// Index into [`LC3_CSC`] for the from-air direction
    pub tx_config_index: usize,
    /// Overrides the table frame duration when present
    #[serde(default)]
    pub frame_duration: Option<u32>,
    pub api_version: u32,
    pub num_blocks: u32,
    pub stream_map: String,
}

impl Lc3ScoParams {
    fn frame_config(&self, index: usize) -> Result<Lc3FrameConfig> {
        let entry = LC3_CSC.get(index).ok_or_else(|| {
            CodecError::invalid_config(format!("LC3 config index {} out of range", index))
        })?;

        Ok(Lc3FrameConfig {
            sampling_freq: entry.sampling_freq,
            max_octets_per_frame: entry.max_octets_per_frame,
            frame_duration: self.frame_duration.unwrap_or(entry.frame_duration),
            bit_depth: LC3_BIT_DEPTH,
            api_version: self.api_version,
            num_blocks: self.num_blocks,
            default_q_level: 0,
            mode: 0x1,
            vendor_specific: [0; LC3_VENDOR_BYTES],
        })
    }
}

impl Lc3CodecConfig {
    /// Build the codec configuration for an LC3 SCO link.
    ///
    /// Each parsed stream-map entry occupies exactly one slot in both the
    /// encoder and the decoder map.
    pub fn from_sco_params(params: &Lc3ScoParams) -> Result<Self> {
        let to_air = params.frame_config(params.rx_config_index)?;
        let from_air = params.frame_config(params.tx_config_index)?;
        let stream_map = parse_stream_map(&params.stream_map)?;

        let decoder_output_channel = match stream_map.first() {
            Some(entry) if entry.audio_location == AudioLocation::Mono => DecoderOutputChannel::Mono,
            _ => DecoderOutputChannel::Stereo,
        };

        debug!(
            entries = stream_map.len(),
            output = ?decoder_output_channel,
            "Converted LC3 SCO configuration"
        );

        Ok(Self {
            encoder: Lc3EncoderConfig {
                to_air,
                stream_map_out: stream_map.clone(),
            },
            decoder: Lc3DecoderConfig {
                from_air,
                stream_map_in: stream_map,
                decoder_output_channel,
            },
        })
    }
}

fn is_map_separator(c: u8) -> bool {
    c == b',' || c.is_ascii_whitespace()
}

fn map_separator(input: &[u8]) -> ParseResult<&[u8]> {
    take_while1(is_map_separator)(input)
}

fn map_digit(input: &[u8]) -> ParseResult<u8> {
    map(satisfy(|c: char| c.is_ascii_digit()), |c: char| (c as u8) - b'0')(input)
}

// digit sep+ digit sep+ [MLR]
fn stream_map_triple(input: &[u8]) -> ParseResult<(u8, u8, char)> {
    tuple((
        map_digit,
        preceded(map_separator, map_digit),
        preceded(map_separator, one_of("MLR")),
    ))(input)
}

/// Parse a stream-map descriptor.
///
/// The scan is permissive: text that does not form a triple is skipped a
/// byte at a time, and triples whose stream id or direction exceed 1 are
/// discarded with a warning. Fails only when no valid entry remains.
pub fn parse_stream_map(text: &str) -> Result<Vec<Lc3StreamMapEntry>> {
    let mut input = text.as_bytes();
    let mut entries = Vec::new();

    while !input.is_empty() {
        match stream_map_triple(input) {
            Ok((rest, (stream_id, direction, tag))) => {
                input = rest;
                let location = match AudioLocation::from_tag(tag) {
                    Some(location) if stream_id <= 1 && direction <= 1 => location,
                    _ => {
                        warn!(
                            stream_id,
                            direction,
                            location = %tag,
                            "Invalid LC3 stream info, entry skipped"
                        );
                        continue;
                    }
                };
                entries.push(Lc3StreamMapEntry {
                    audio_location: location,
                    stream_id,
                    direction,
                });
            }
            Err(_) => input = &input[1..],
        }
    }

    if entries.is_empty() {
        return Err(CodecError::invalid_config(format!(
            "stream map {:?} has no valid entries",
            text
        )));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tracing_test::traced_test;

    fn sco_params(stream_map: &str) -> Lc3ScoParams {
        Lc3ScoParams {
            rx_config_index: 11,
            tx_config_index: 3,
            frame_duration: None,
            api_version: 21,
            num_blocks: 1,
            stream_map: stream_map.to_string(),
        }
    }

    #[test]
    fn test_two_entry_map() {
        let entries = parse_stream_map("0,0,L 1,1,R").unwrap();
        assert_eq!(
            entries,
            vec![
                Lc3StreamMapEntry {
                    audio_location: AudioLocation::Left,
                    stream_id: 0,
                    direction: 0
                },
                Lc3StreamMapEntry {
                    audio_location: AudioLocation::Right,
                    stream_id: 1,
                    direction: 1
                },
            ]
        );
    }

    #[traced_test]
    #[test]
    fn test_out_of_range_entry_is_skipped() {
        let entries = parse_stream_map("9,0,L 0,1,M").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].audio_location, AudioLocation::Mono);
        assert!(logs_contain("Invalid LC3 stream info"));
    }

    #[test]
    fn test_only_invalid_entries_fail() {
        assert!(matches!(
            parse_stream_map("9,0,L"),
            Err(CodecError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_garbage_and_empty_fail() {
        assert!(parse_stream_map("").is_err());
        assert!(parse_stream_map("hello, world").is_err());
        assert!(parse_stream_map("0;0;L").is_err());
    }

    #[test]
    fn test_mixed_separators() {
        let entries = parse_stream_map("0 ,\t0 , M,1,1,L").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].audio_location, AudioLocation::Left);
    }

    #[test]
    fn test_from_sco_params_fills_one_slot_per_entry() {
        let config = Lc3CodecConfig::from_sco_params(&sco_params("0,0,L 1,1,R")).unwrap();
        assert_eq!(config.encoder.stream_map_out.len(), 2);
        assert_eq!(config.decoder.stream_map_in.len(), 2);
        assert_eq!(config.decoder.stream_map_in[1].stream_id, 1);
        assert_eq!(config.decoder.decoder_output_channel, DecoderOutputChannel::Stereo);

        assert_eq!(config.encoder.to_air.sampling_freq, 48000);
        assert_eq!(config.encoder.to_air.frame_duration, 10000);
        assert_eq!(config.decoder.from_air.sampling_freq, 16000);
        assert_eq!(config.decoder.from_air.mode, 1);
        assert_eq!(config.decoder.from_air.default_q_level, 0);
    }

    #[test]
    fn test_mono_output_and_frame_override() {
        let mut params = sco_params("0,0,M");
        params.frame_duration = Some(7500);
        let config = Lc3CodecConfig::from_sco_params(&params).unwrap();
        assert_eq!(config.decoder.decoder_output_channel, DecoderOutputChannel::Mono);
        assert_eq!(config.encoder.to_air.frame_duration, 7500);
        assert_eq!(config.decoder.from_air.frame_duration, 7500);
    }

    #[test]
    fn test_bad_config_index() {
        let mut params = sco_params("0,0,M");
        params.tx_config_index = LC3_CSC.len();
        assert!(Lc3CodecConfig::from_sco_params(&params).is_err());
    }

    proptest! {
        #[test]
        fn prop_parser_never_panics(text in ".{0,64}") {
            let _ = parse_stream_map(&text);
        }

        #[test]
        fn prop_parsed_entries_are_in_range(text in "[0-9MLR, ]{0,40}") {
            if let Ok(entries) = parse_stream_map(&text) {
                for entry in entries {
                    prop_assert!(entry.stream_id <= 1);
                    prop_assert!(entry.direction <= 1);
                }
            }
        }
    }
}

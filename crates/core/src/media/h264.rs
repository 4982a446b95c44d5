use std::sync::Arc;

use base64::prelude::{BASE64_STANDARD, Engine as _};
use parking_lot::RwLock;

/// `profile-level-id` advertised before an SPS has been seen
/// (Constrained Baseline, level 3.0).
pub const DEFAULT_PROFILE_LEVEL_ID: &str = "42001e";

const NAL_TYPE_MASK: u8 = 0x1f;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;

/// Parameter sets shared between the video pump (writer) and DESCRIBE (reader).
pub type SharedParameterSets = Arc<RwLock<ParameterSets>>;

/// H.264 SPS/PPS captured from the encoder output.
///
/// Video is sent as raw byte-stream chunks, so clients rely on the SDP
/// `fmtp` line to learn the stream parameters (RFC 6184 §8.1):
///
/// - `profile-level-id`: bytes 1–3 of the SPS (profile_idc,
///   constraint flags, level_idc).
/// - `sprop-parameter-sets`: base64 SPS and PPS, comma separated.
///
/// Both are captured once, from the first access unit that carries them
/// (normally the first keyframe).
#[derive(Debug, Default, Clone)]
pub struct ParameterSets {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl ParameterSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedParameterSets {
        Arc::new(RwLock::new(Self::new()))
    }

    /// `true` once both SPS and PPS have been captured.
    pub fn is_complete(&self) -> bool {
        self.sps.is_some() && self.pps.is_some()
    }

    /// Scan an Annex B access unit and keep the first SPS/PPS found.
    pub fn observe(&mut self, access_unit: &[u8]) {
        if self.is_complete() {
            return;
        }
        for nal in extract_nal_units(access_unit) {
            match nal[0] & NAL_TYPE_MASK {
                NAL_SPS if self.sps.is_none() => {
                    tracing::debug!(len = nal.len(), "H.264 SPS captured from bitstream");
                    self.sps = Some(nal.to_vec());
                }
                NAL_PPS if self.pps.is_none() => {
                    tracing::debug!(len = nal.len(), "H.264 PPS captured from bitstream");
                    self.pps = Some(nal.to_vec());
                }
                _ => {}
            }
        }
    }

    /// `profile-level-id` from the SPS, or [`DEFAULT_PROFILE_LEVEL_ID`].
    pub fn profile_level_id(&self) -> String {
        match self.sps.as_deref() {
            Some(sps) if sps.len() >= 4 => format!("{:02x}{:02x}{:02x}", sps[1], sps[2], sps[3]),
            _ => DEFAULT_PROFILE_LEVEL_ID.to_string(),
        }
    }

    /// `sprop-parameter-sets` value, once both sets are known.
    pub fn sprop_parameter_sets(&self) -> Option<String> {
        let sps = self.sps.as_deref()?;
        let pps = self.pps.as_deref()?;
        Some(format!(
            "{},{}",
            BASE64_STANDARD.encode(sps),
            BASE64_STANDARD.encode(pps)
        ))
    }

    /// Value of the SDP `a=fmtp` line after the payload type.
    pub fn fmtp(&self) -> String {
        let mut fmtp = format!("packetization-mode=1;profile-level-id={}", self.profile_level_id());
        if let Some(sprop) = self.sprop_parameter_sets() {
            fmtp.push_str(";sprop-parameter-sets=");
            fmtp.push_str(&sprop);
        }
        fmtp
    }
}

/// Extract NAL units from an H.264 Annex B bitstream.
///
/// Scans for start codes (both 4-byte `00 00 00 01` and 3-byte
/// `00 00 01`) and returns the NAL data between them, excluding
/// the start codes themselves. Empty NAL units are skipped.
pub fn extract_nal_units(data: &[u8]) -> Vec<&[u8]> {
    let mut i = 0usize;

    // (nal_data_start_index, start_code_length)
    let mut start_entries: Vec<(usize, usize)> = Vec::new();

    while i < data.len() {
        if i + 3 < data.len() && data[i..i + 4] == [0, 0, 0, 1] {
            start_entries.push((i + 4, 4));
            i += 4;
        } else if i + 2 < data.len() && data[i..i + 3] == [0, 0, 1] {
            start_entries.push((i + 3, 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut nal_units = Vec::with_capacity(start_entries.len());
    for (idx, &(start, _)) in start_entries.iter().enumerate() {
        let end = match start_entries.get(idx + 1) {
            Some(&(next_start, next_sc_len)) => next_start - next_sc_len,
            None => data.len(),
        };
        if start < end {
            nal_units.push(&data[start..end]);
        }
    }
    nal_units
}

/// Split an Annex B elementary stream into access units.
///
/// An access unit is closed after each VCL NAL unit (types 1–5), so
/// parameter sets and SEI travel with the picture that follows them.
/// Each returned unit keeps 4-byte start codes in front of every NAL, the
/// way a hardware encoder hands frames out.
pub fn split_access_units(stream: &[u8]) -> Vec<Vec<u8>> {
    let mut units = Vec::new();
    let mut current = Vec::new();

    for nal in extract_nal_units(stream) {
        current.extend_from_slice(&[0, 0, 0, 1]);
        current.extend_from_slice(nal);
        if (1..=5).contains(&(nal[0] & NAL_TYPE_MASK)) {
            units.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        units.push(current);
    }
    units
}

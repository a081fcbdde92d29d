//! Encode profiles and the profile registry.
//!
//! A profile is a ladder of video renditions plus HLS packaging parameters.
//! Rendition order is significant: it fixes the rendition index used in
//! every output file name and the order of variants in the master playlist.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use streamforge_core::{Error, Result};

/// A bitrate in kilobits per second, rendered as `"<n>k"` for ffmpeg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bitrate(u32);

impl Bitrate {
    pub const fn kbps(kbps: u32) -> Self {
        Self(kbps)
    }

    pub fn as_kbps(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.0)
    }
}

impl Serialize for Bitrate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One fixed-resolution output of the source video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rendition {
    pub width: u32,
    pub height: u32,
    pub video_bitrate: Bitrate,
    pub video_maxrate: Bitrate,
    pub video_buffer_size: Bitrate,
    pub audio_bitrate: Bitrate,
}

impl Rendition {
    const fn new(
        width: u32,
        height: u32,
        bitrate: u32,
        maxrate: u32,
        bufsize: u32,
        audio: u32,
    ) -> Self {
        Self {
            width,
            height,
            video_bitrate: Bitrate::kbps(bitrate),
            video_maxrate: Bitrate::kbps(maxrate),
            video_buffer_size: Bitrate::kbps(bufsize),
            audio_bitrate: Bitrate::kbps(audio),
        }
    }
}

/// HLS segmenting parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Packaging {
    pub segment_duration_secs: u32,
    pub playlist_window: u32,
    /// `-hls_flags` values, joined with `+` on the command line.
    pub flags: Vec<String>,
}

/// An immutable, named encode profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodeProfile {
    pub name: String,
    pub renditions: Vec<Rendition>,
    pub packaging: Packaging,
}

impl EncodeProfile {
    /// Build a profile, checking its invariants.
    pub fn new(
        name: impl Into<String>,
        renditions: Vec<Rendition>,
        packaging: Packaging,
    ) -> Result<Self> {
        let profile = Self {
            name: name.into(),
            renditions,
            packaging,
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Check that the ladder is non-empty and every maxrate covers its
    /// target bitrate.
    pub fn validate(&self) -> Result<()> {
        if self.renditions.is_empty() {
            return Err(Error::Validation(format!(
                "profile '{}' has no renditions",
                self.name
            )));
        }
        for (i, r) in self.renditions.iter().enumerate() {
            if r.video_maxrate < r.video_bitrate {
                return Err(Error::Validation(format!(
                    "profile '{}' rendition {i}: maxrate {} is below bitrate {}",
                    self.name, r.video_maxrate, r.video_bitrate
                )));
            }
            if r.width == 0 || r.height == 0 {
                return Err(Error::Validation(format!(
                    "profile '{}' rendition {i}: zero dimension",
                    self.name
                )));
            }
        }
        if self.packaging.segment_duration_secs == 0 {
            return Err(Error::Validation(format!(
                "profile '{}' has a zero segment duration",
                self.name
            )));
        }
        Ok(())
    }

    /// Three renditions with 4 second segments for general playback.
    pub fn adaptive() -> Self {
        Self {
            name: "adaptive".into(),
            renditions: vec![
                Rendition::new(1920, 1080, 4500, 5000, 9000, 128),
                Rendition::new(1280, 720, 2500, 2750, 5000, 128),
                Rendition::new(854, 480, 1200, 1320, 2400, 96),
            ],
            packaging: Packaging {
                segment_duration_secs: 4,
                playlist_window: 6,
                flags: vec!["independent_segments".into(), "omit_endlist".into()],
            },
        }
    }

    /// Two renditions with short segments and a tight window.
    pub fn low_latency() -> Self {
        Self {
            name: "low_latency".into(),
            renditions: vec![
                Rendition::new(1280, 720, 2000, 2200, 4000, 128),
                Rendition::new(854, 480, 1000, 1100, 2000, 96),
            ],
            packaging: Packaging {
                segment_duration_secs: 2,
                playlist_window: 3,
                flags: vec![
                    "independent_segments".into(),
                    "omit_endlist".into(),
                    "delete_segments".into(),
                ],
            },
        }
    }
}

/// Read-only mapping from profile name to profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, EncodeProfile>,
}

impl ProfileRegistry {
    /// Registry holding the `adaptive` and `low_latency` profiles.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for profile in [EncodeProfile::adaptive(), EncodeProfile::low_latency()] {
            registry.profiles.insert(profile.name.clone(), profile);
        }
        registry
    }

    /// Add a profile after validating it. Later registrations replace
    /// earlier ones with the same name.
    pub fn with_profile(mut self, profile: EncodeProfile) -> Result<Self> {
        profile.validate()?;
        self.profiles.insert(profile.name.clone(), profile);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<&EncodeProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| Error::UnknownProfile(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncodeProfile> {
        self.profiles.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_valid() {
        let registry = ProfileRegistry::builtin();
        for profile in registry.iter() {
            profile.validate().unwrap();
        }
        assert_eq!(registry.names(), vec!["adaptive", "low_latency"]);
    }

    #[test]
    fn adaptive_ladder() {
        let p = EncodeProfile::adaptive();
        let heights: Vec<u32> = p.renditions.iter().map(|r| r.height).collect();
        assert_eq!(heights, vec![1080, 720, 480]);
        assert_eq!(p.renditions[0].video_bitrate.to_string(), "4500k");
        assert_eq!(p.renditions[2].audio_bitrate.to_string(), "96k");
        assert_eq!(p.packaging.segment_duration_secs, 4);
        assert_eq!(p.packaging.playlist_window, 6);
        assert_eq!(p.packaging.flags, vec!["independent_segments", "omit_endlist"]);
    }

    #[test]
    fn low_latency_ladder() {
        let p = EncodeProfile::low_latency();
        assert_eq!(p.renditions.len(), 2);
        assert_eq!(p.renditions[0].video_bitrate, Bitrate::kbps(2000));
        assert_eq!(p.packaging.segment_duration_secs, 2);
        assert_eq!(p.packaging.playlist_window, 3);
        assert!(p.packaging.flags.iter().any(|f| f == "delete_segments"));
    }

    #[test]
    fn unknown_profile() {
        let registry = ProfileRegistry::builtin();
        let err = registry.get("ultra").unwrap_err();
        assert!(matches!(err, Error::UnknownProfile(ref n) if n == "ultra"));
    }

    #[test]
    fn empty_ladder_rejected() {
        let err = EncodeProfile::new("empty", vec![], EncodeProfile::adaptive().packaging)
            .unwrap_err();
        assert!(err.to_string().contains("no renditions"));
    }

    #[test]
    fn maxrate_below_bitrate_rejected() {
        let bad = Rendition::new(640, 360, 800, 700, 1600, 64);
        let err = EncodeProfile::new("bad", vec![bad], EncodeProfile::adaptive().packaging)
            .unwrap_err();
        assert!(err.to_string().contains("maxrate 700k is below bitrate 800k"));
    }

    #[test]
    fn custom_profile_registration() {
        let single = EncodeProfile::new(
            "mobile",
            vec![Rendition::new(640, 360, 800, 880, 1600, 64)],
            Packaging {
                segment_duration_secs: 6,
                playlist_window: 5,
                flags: vec![],
            },
        )
        .unwrap();
        let registry = ProfileRegistry::builtin().with_profile(single).unwrap();
        assert!(registry.contains("mobile"));
        assert_eq!(registry.get("mobile").unwrap().renditions.len(), 1);
    }

    #[test]
    fn bitrate_serializes_as_string() {
        let json = serde_json::to_value(EncodeProfile::adaptive()).unwrap();
        assert_eq!(json["renditions"][1]["videoMaxrate"], "2750k");
        assert_eq!(json["packaging"]["playlistWindow"], 6);
    }
}

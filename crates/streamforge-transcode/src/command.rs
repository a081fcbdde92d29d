//! ffmpeg argument construction for multi-rendition HLS output.
//!
//! Output naming inside the stream directory:
//! - `seg_<rendition>_<nnn>.ts` media segments
//! - `stream_<rendition>.m3u8` media playlists
//! - `master.m3u8` master playlist

use std::path::Path;

use streamforge_core::StreamKey;

use crate::profile::EncodeProfile;

/// Master playlist file name inside each stream directory.
pub const MASTER_PLAYLIST: &str = "master.m3u8";

/// Frames between forced keyframes. Identical across renditions so segment
/// boundaries line up for adaptive switching.
const GOP_FRAMES: &str = "48";
const VIDEO_CODEC: &str = "libx264";
const VIDEO_PRESET: &str = "veryfast";
const AUDIO_CODEC: &str = "aac";

/// Resolve the encoder input for a stream from a `{key}` template.
pub fn input_url(template: &str, key: &StreamKey) -> String {
    template.replace("{key}", key.as_str())
}

/// Build the `-filter_complex` graph: one split into N branches, then a
/// scale per branch that never upscales and forces square pixels.
fn filter_graph(profile: &EncodeProfile) -> String {
    let n = profile.renditions.len();
    let split_outputs: String = (0..n).map(|i| format!("[v{i}]")).collect();

    let mut graph = format!("[0:v]split={n}{split_outputs}");
    for (i, r) in profile.renditions.iter().enumerate() {
        graph.push_str(&format!(
            "; [v{i}]scale=w={}:h={}:force_original_aspect_ratio=decrease,setsar=1[v{i}out]",
            r.width, r.height
        ));
    }
    graph
}

/// Pair every video rendition with the audio encoded for it. Without a
/// source audio track each variant is video only; naming an `a:<i>` that
/// was never mapped makes the HLS muxer refuse to start.
fn var_stream_map(n: usize, audio: bool) -> String {
    (0..n)
        .map(|i| {
            if audio {
                format!("v:{i},a:{i}")
            } else {
                format!("v:{i}")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive the complete ffmpeg argument list.
///
/// Pure and deterministic: identical inputs always produce identical output,
/// with renditions emitted in ladder order. `output_dir` must already exist.
/// When `audio` is false the source is treated as video only and no audio
/// streams are mapped or encoded.
pub fn build_args(
    profile: &EncodeProfile,
    input: &str,
    output_dir: &Path,
    audio: bool,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-filter_complex".into(),
        filter_graph(profile),
    ];

    for (i, r) in profile.renditions.iter().enumerate() {
        args.extend([
            "-map".into(),
            format!("[v{i}out]"),
        ]);
        if audio {
            args.extend(["-map".into(), "0:a?".into()]);
        }
        args.extend([
            format!("-c:v:{i}"),
            VIDEO_CODEC.into(),
            "-preset".into(),
            VIDEO_PRESET.into(),
            format!("-b:v:{i}"),
            r.video_bitrate.to_string(),
            format!("-maxrate:v:{i}"),
            r.video_maxrate.to_string(),
            format!("-bufsize:v:{i}"),
            r.video_buffer_size.to_string(),
            "-g".into(),
            GOP_FRAMES.into(),
            "-keyint_min".into(),
            GOP_FRAMES.into(),
            "-sc_threshold".into(),
            "0".into(),
        ]);
        if audio {
            args.extend([
                format!("-c:a:{i}"),
                AUDIO_CODEC.into(),
                format!("-b:a:{i}"),
                r.audio_bitrate.to_string(),
            ]);
        }
    }

    let packaging = &profile.packaging;
    args.extend([
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        packaging.segment_duration_secs.to_string(),
        "-hls_list_size".into(),
        packaging.playlist_window.to_string(),
    ]);
    if !packaging.flags.is_empty() {
        args.extend(["-hls_flags".into(), packaging.flags.join("+")]);
    }
    args.extend([
        "-hls_segment_filename".into(),
        output_dir.join("seg_%v_%03d.ts").to_string_lossy().into_owned(),
        "-master_pl_name".into(),
        MASTER_PLAYLIST.into(),
        "-var_stream_map".into(),
        var_stream_map(profile.renditions.len(), audio),
        output_dir.join("stream_%v.m3u8").to_string_lossy().into_owned(),
    ]);

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Bitrate, Packaging, Rendition};
    use std::path::PathBuf;

    fn out() -> PathBuf {
        PathBuf::from("/srv/hls/alpha")
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let pos = args
            .iter()
            .position(|a| a == flag)
            .unwrap_or_else(|| panic!("missing {flag}"));
        &args[pos + 1]
    }

    #[test]
    fn deterministic() {
        let profile = EncodeProfile::adaptive();
        let a = build_args(&profile, "rtmp://127.0.0.1/live/alpha", &out(), true);
        let b = build_args(&profile, "rtmp://127.0.0.1/live/alpha", &out(), true);
        assert_eq!(a, b);
    }

    #[test]
    fn input_and_overwrite_come_first() {
        let args = build_args(&EncodeProfile::adaptive(), "rtmp://host/live/k", &out(), true);
        assert_eq!(&args[..3], &["-y", "-i", "rtmp://host/live/k"]);
    }

    #[test]
    fn filter_graph_splits_and_scales_in_order() {
        let args = build_args(&EncodeProfile::adaptive(), "in", &out(), true);
        assert_eq!(
            value_after(&args, "-filter_complex"),
            "[0:v]split=3[v0][v1][v2]; \
             [v0]scale=w=1920:h=1080:force_original_aspect_ratio=decrease,setsar=1[v0out]; \
             [v1]scale=w=1280:h=720:force_original_aspect_ratio=decrease,setsar=1[v1out]; \
             [v2]scale=w=854:h=480:force_original_aspect_ratio=decrease,setsar=1[v2out]"
        );
    }

    #[test]
    fn per_rendition_encoding_follows_ladder() {
        let args = build_args(&EncodeProfile::adaptive(), "in", &out(), true);
        assert_eq!(value_after(&args, "-b:v:0"), "4500k");
        assert_eq!(value_after(&args, "-maxrate:v:0"), "5000k");
        assert_eq!(value_after(&args, "-bufsize:v:0"), "9000k");
        assert_eq!(value_after(&args, "-b:v:1"), "2500k");
        assert_eq!(value_after(&args, "-b:v:2"), "1200k");
        assert_eq!(value_after(&args, "-b:a:2"), "96k");
        assert_eq!(value_after(&args, "-c:v:1"), "libx264");
        assert_eq!(value_after(&args, "-c:a:1"), "aac");

        let maps: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "-map")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(
            maps,
            vec!["[v0out]", "0:a?", "[v1out]", "0:a?", "[v2out]", "0:a?"]
        );

        let gops = args.windows(2).filter(|w| w[0] == "-g" && w[1] == "48").count();
        assert_eq!(gops, 3);
        let sc = args
            .windows(2)
            .filter(|w| w[0] == "-sc_threshold" && w[1] == "0")
            .count();
        assert_eq!(sc, 3);
    }

    #[test]
    fn packaging_arguments() {
        let args = build_args(&EncodeProfile::low_latency(), "in", &out(), true);
        assert_eq!(value_after(&args, "-f"), "hls");
        assert_eq!(value_after(&args, "-hls_time"), "2");
        assert_eq!(value_after(&args, "-hls_list_size"), "3");
        assert_eq!(
            value_after(&args, "-hls_flags"),
            "independent_segments+omit_endlist+delete_segments"
        );
        assert_eq!(
            value_after(&args, "-hls_segment_filename"),
            "/srv/hls/alpha/seg_%v_%03d.ts"
        );
        assert_eq!(value_after(&args, "-master_pl_name"), "master.m3u8");
        assert_eq!(value_after(&args, "-var_stream_map"), "v:0,a:0 v:1,a:1");
        assert_eq!(args.last().unwrap(), "/srv/hls/alpha/stream_%v.m3u8");
    }

    #[test]
    fn single_rendition_still_splits() {
        let profile = EncodeProfile::new(
            "single",
            vec![Rendition {
                width: 640,
                height: 360,
                video_bitrate: Bitrate::kbps(800),
                video_maxrate: Bitrate::kbps(880),
                video_buffer_size: Bitrate::kbps(1600),
                audio_bitrate: Bitrate::kbps(64),
            }],
            Packaging {
                segment_duration_secs: 6,
                playlist_window: 5,
                flags: vec![],
            },
        )
        .unwrap();
        let args = build_args(&profile, "in", &out(), true);
        assert!(value_after(&args, "-filter_complex").starts_with("[0:v]split=1[v0]; [v0]scale="));
        assert!(!args.iter().any(|a| a == "-hls_flags"));
        assert_eq!(value_after(&args, "-var_stream_map"), "v:0,a:0");
    }

    #[test]
    fn video_only_source_maps_no_audio() {
        let args = build_args(&EncodeProfile::adaptive(), "in", &out(), false);
        assert_eq!(value_after(&args, "-var_stream_map"), "v:0 v:1 v:2");

        let maps: Vec<&str> = args
            .windows(2)
            .filter(|w| w[0] == "-map")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(maps, vec!["[v0out]", "[v1out]", "[v2out]"]);
        assert!(!args.iter().any(|a| a.starts_with("-c:a") || a.starts_with("-b:a")));
        assert_eq!(value_after(&args, "-b:v:2"), "1200k");
        assert_eq!(args.last().unwrap(), "/srv/hls/alpha/stream_%v.m3u8");
    }

    #[test]
    fn input_url_substitutes_key() {
        let key = StreamKey::sanitize("a/../b");
        assert_eq!(
            input_url("rtmp://127.0.0.1/live/{key}", &key),
            "rtmp://127.0.0.1/live/a___b"
        );
    }
}

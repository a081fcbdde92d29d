//! Best-effort parsing of ffmpeg's stderr status lines.

use regex::Regex;
use std::sync::LazyLock;

static FPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"fps=\s*(\d+)").expect("static regex is valid"));
static BITRATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bitrate=\s*([\d.]+\w+)").expect("static regex is valid"));

/// Encoder throughput reported on a single status line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub fps: Option<u32>,
    /// Bitrate as printed by ffmpeg, e.g. `"2150.3kbits"`.
    pub bitrate: Option<String>,
}

/// Extract frame rate and bitrate from one line of encoder output.
///
/// Returns `None` when neither token is present.
pub fn parse_progress(line: &str) -> Option<Progress> {
    let fps = FPS_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    let bitrate = BITRATE_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    if fps.is_none() && bitrate.is_none() {
        return None;
    }
    Some(Progress { fps, bitrate })
}

/// Split a chunk of stderr into lines. ffmpeg terminates status lines with
/// `\r`, everything else with `\n`.
pub(crate) fn split_lines(chunk: &str) -> impl Iterator<Item = &str> {
    chunk
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
}

//! Progress estimation from the engine's textual log.
//!
//! The engine reports nothing structured: completion and progress are
//! scraped from ffmpeg's human-readable stderr. The format is undocumented
//! and unversioned, so everything here is best-effort and keyed on the
//! exact prefixes ffmpeg prints:
//!
//! ```text
//!   Duration: 00:01:40.00, start: 0.000000, bitrate: 1205 kb/s
//!     Stream #0:0(und): Video: h264 (High), yuv420p, 1280x720, 25 fps, ...
//! frame=  1250 fps=310 q=28.0 size=    1024kB time=00:00:50.00 bitrate=...
//! video:2048kB audio:160kB subtitle:0kB other streams:0kB global headers:0kB
//! FFMPEG_END
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Line the engine prints once a command has fully finished.
pub const END_OF_RUN: &str = "FFMPEG_END";

/// A progress update derived from one log line.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Progress {
    /// Estimated completion, nominally 0..1.
    pub ratio: f64,
    /// Processed media time in seconds (frame/size lines).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    /// Input duration in seconds (duration lines).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// What a log line meant, if anything.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedLine {
    Progress(Progress),
    /// The sentinel: the running command has finished.
    EndOfRun,
}

/// Estimates accumulated over one command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressState {
    /// Estimated total duration in seconds; 0 when unknown.
    pub duration: f64,
    /// Estimated total frame count; 0 disables frame-based estimation.
    pub total_frames: f64,
    /// Last processed time seen, in seconds.
    pub time: f64,
    /// Last computed ratio.
    pub ratio: f64,
    /// The next `Stream` line carries the frame rate.
    pub expect_stream: bool,
}

/// Incremental parser over engine log lines.
#[derive(Debug, Default)]
pub struct ProgressParser {
    state: ProgressState,
}

fn fps_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([\d.]+) fps").expect("fps pattern is valid"))
}

fn frame_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"frame=\s*(\d+)").expect("frame pattern is valid"))
}

/// Parse `HH:MM:SS.ms` into seconds.
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let mut parts = s.trim().split(':');
    let h: f64 = parts.next()?.parse().ok()?;
    let m: f64 = parts.next()?.parse().ok()?;
    let sec: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(h * 3600.0 + m * 60.0 + sec)
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything learned from the previous command.
    pub fn reset(&mut self) {
        self.state = ProgressState::default();
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    /// Feed one log line.
    pub fn parse_line(&mut self, line: &str) -> Option<ParsedLine> {
        if line.trim_end() == END_OF_RUN {
            return Some(ParsedLine::EndOfRun);
        }

        let state = &mut self.state;

        if line.starts_with("  Duration") {
            let field = line.split(", ").next()?.split(": ").nth(1)?;
            let duration = parse_timestamp(field)?;
            let update = Progress {
                ratio: state.ratio,
                time: None,
                duration: Some(duration),
            };
            // Multiple inputs: the shortest one bounds the output.
            if state.duration == 0.0 || state.duration > duration {
                state.duration = duration;
                state.expect_stream = true;
            }
            return Some(ParsedLine::Progress(update));
        }

        if state.expect_stream && line.starts_with("    Stream") {
            state.total_frames = fps_regex()
                .captures(line)
                .and_then(|c| c[1].parse::<f64>().ok())
                .map(|fps| state.duration * fps)
                .unwrap_or(0.0);
            state.expect_stream = false;
            return None;
        }

        if line.starts_with("frame") || line.starts_with("size") {
            // `time=N/A` is common for outputs without timestamps.
            let time = line
                .split("time=")
                .nth(1)
                .and_then(|rest| rest.split(' ').next())
                .and_then(parse_timestamp);
            let frame = frame_regex()
                .captures(line)
                .and_then(|c| c[1].parse::<f64>().ok());

            match (frame, time) {
                (Some(frame), _) if state.total_frames > 0.0 => {
                    state.ratio = (frame / state.total_frames).min(1.0);
                }
                (_, Some(time)) if state.duration > 0.0 => {
                    state.ratio = time / state.duration;
                }
                // Nothing to estimate from: keep the last ratio.
                _ => {}
            }
            if let Some(time) = time {
                state.time = time;
            }

            return Some(ParsedLine::Progress(Progress {
                ratio: state.ratio,
                time,
                duration: None,
            }));
        }

        if line.starts_with("video:") {
            state.ratio = 1.0;
            state.duration = 0.0;
            return Some(ParsedLine::Progress(Progress {
                ratio: 1.0,
                time: None,
                duration: None,
            }));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DURATION_LINE: &str =
        "  Duration: 00:01:40.00, start: 0.000000, bitrate: 1205 kb/s";
    const STREAM_LINE: &str =
        "    Stream #0:0(und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 1280x720, 1000 kb/s, 25 fps, 25 tbr, 12800 tbn (default)";

    #[test]
    fn timestamp_to_seconds() {
        assert_eq!(parse_timestamp("00:01:40.00"), Some(100.0));
        assert_eq!(parse_timestamp("01:00:00.50"), Some(3600.5));
        assert_eq!(parse_timestamp("N/A"), None);
        assert_eq!(parse_timestamp("1:2"), None);
    }

    #[test]
    fn duration_line_sets_duration() {
        let mut p = ProgressParser::new();
        let parsed = p.parse_line(DURATION_LINE);
        assert_eq!(
            parsed,
            Some(ParsedLine::Progress(Progress {
                ratio: 0.0,
                time: None,
                duration: Some(100.0),
            }))
        );
        assert_eq!(p.state().duration, 100.0);
        assert!(p.state().expect_stream);
    }

    #[test]
    fn shorter_duration_wins() {
        let mut p = ProgressParser::new();
        p.parse_line(DURATION_LINE);
        p.parse_line("  Duration: 00:00:30.00, start: 0.000000");
        assert_eq!(p.state().duration, 30.0);
        p.parse_line("  Duration: 00:05:00.00, start: 0.000000");
        assert_eq!(p.state().duration, 30.0);
    }

    #[test]
    fn unparseable_duration_ignored() {
        let mut p = ProgressParser::new();
        assert_eq!(p.parse_line("  Duration: N/A, bitrate: N/A"), None);
        assert_eq!(p.state().duration, 0.0);
    }

    #[test]
    fn stream_line_estimates_frames() {
        let mut p = ProgressParser::new();
        p.parse_line(DURATION_LINE);
        assert_eq!(p.parse_line(STREAM_LINE), None);
        assert_eq!(p.state().total_frames, 2500.0);
        assert!(!p.state().expect_stream);
    }

    #[test]
    fn stream_line_without_fps_disables_frames() {
        let mut p = ProgressParser::new();
        p.parse_line(DURATION_LINE);
        p.parse_line("    Stream #0:0: Audio: aac (LC), 44100 Hz, stereo, fltp");
        assert_eq!(p.state().total_frames, 0.0);
        // Only the first stream line after a duration counts.
        p.parse_line(STREAM_LINE);
        assert_eq!(p.state().total_frames, 0.0);
    }

    #[test]
    fn frame_based_ratio() {
        let mut p = ProgressParser::new();
        p.parse_line(DURATION_LINE);
        p.parse_line(STREAM_LINE);
        let parsed = p.parse_line(
            "frame=  1250 fps=310 q=28.0 size=    1024kB time=00:00:50.00 bitrate= 167.8kbits/s speed=12.4x",
        );
        assert_eq!(
            parsed,
            Some(ParsedLine::Progress(Progress {
                ratio: 0.5,
                time: Some(50.0),
                duration: None,
            }))
        );
    }

    #[test]
    fn frame_ratio_is_capped() {
        let mut p = ProgressParser::new();
        p.parse_line(DURATION_LINE);
        p.parse_line(STREAM_LINE);
        p.parse_line("frame= 3000 fps=310 q=28.0 size=    1024kB time=00:02:00.00 bitrate=x");
        assert_eq!(p.state().ratio, 1.0);
    }

    #[test]
    fn time_based_ratio_without_frames() {
        let mut p = ProgressParser::new();
        p.parse_line(DURATION_LINE);
        p.parse_line("    Stream #0:0: Audio: mp3, 44100 Hz, stereo");
        let parsed = p.parse_line("size=     512kB time=00:00:25.00 bitrate= 167.8kbits/s");
        assert_eq!(
            parsed,
            Some(ParsedLine::Progress(Progress {
                ratio: 0.25,
                time: Some(25.0),
                duration: None,
            }))
        );
    }

    #[test]
    fn frame_ratio_without_time() {
        let mut p = ProgressParser::new();
        p.parse_line(DURATION_LINE);
        p.parse_line(STREAM_LINE);
        let parsed =
            p.parse_line("frame= 1250 fps=310 q=28.0 size=N/A time=N/A bitrate=N/A speed=N/A");
        assert_eq!(
            parsed,
            Some(ParsedLine::Progress(Progress {
                ratio: 0.5,
                time: None,
                duration: None,
            }))
        );
        assert_eq!(p.state().time, 0.0);
    }

    #[test]
    fn progress_line_without_time_keeps_ratio() {
        let mut p = ProgressParser::new();
        p.parse_line(DURATION_LINE);
        let parsed = p.parse_line("frame=  10 fps=0.0 q=0.0 size=0kB");
        assert_eq!(
            parsed,
            Some(ParsedLine::Progress(Progress {
                ratio: 0.0,
                time: None,
                duration: None,
            }))
        );
    }

    #[test]
    fn unknown_duration_keeps_ratio() {
        let mut p = ProgressParser::new();
        let parsed = p.parse_line("frame=  10 fps=0.0 q=0.0 size=0kB time=00:00:01.00 bitrate=N/A");
        assert_eq!(
            parsed,
            Some(ParsedLine::Progress(Progress {
                ratio: 0.0,
                time: Some(1.0),
                duration: None,
            }))
        );
    }

    #[test]
    fn summary_line_completes_ratio() {
        let mut p = ProgressParser::new();
        p.parse_line(DURATION_LINE);
        let parsed = p.parse_line("video:2048kB audio:160kB subtitle:0kB other streams:0kB");
        assert_eq!(
            parsed,
            Some(ParsedLine::Progress(Progress {
                ratio: 1.0,
                time: None,
                duration: None,
            }))
        );
        assert_eq!(p.state().duration, 0.0);
    }

    #[test]
    fn sentinel_detected() {
        let mut p = ProgressParser::new();
        assert_eq!(p.parse_line("FFMPEG_END"), Some(ParsedLine::EndOfRun));
        assert_eq!(p.parse_line("FFMPEG_END\r"), Some(ParsedLine::EndOfRun));
        assert_eq!(p.parse_line("not FFMPEG_END"), None);
    }

    #[test]
    fn reset_clears_state() {
        let mut p = ProgressParser::new();
        p.parse_line(DURATION_LINE);
        p.parse_line(STREAM_LINE);
        p.reset();
        assert_eq!(p.state(), &ProgressState::default());
    }
}

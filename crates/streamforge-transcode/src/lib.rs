//! streamforge-transcode: encode profiles, ffmpeg invocation, and the
//! transcoding supervisor.
//!
//! - [`ProfileRegistry`] maps profile names to immutable [`EncodeProfile`]s.
//! - [`build_args`] derives the full ffmpeg argument list for a profile.
//! - [`Worker`] is the capability wrapping one encoder process; [`FfmpegWorker`]
//!   is the production implementation.
//! - [`Supervisor`] owns every worker and stream record and enforces the
//!   concurrency ceiling.

pub mod command;
pub mod ffmpeg;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod profile;
pub mod progress;
pub mod supervisor;
pub mod worker;

pub use command::build_args;
pub use ffmpeg::{FfmpegWorker, FfmpegWorkerFactory};
pub use profile::{Bitrate, EncodeProfile, Packaging, ProfileRegistry, Rendition};
pub use progress::{parse_progress, Progress};
pub use supervisor::{Supervisor, SupervisorSettings};
pub use worker::{Worker, WorkerError, WorkerEvent, WorkerFactory, WorkerSpec, WorkerStatus};

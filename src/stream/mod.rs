// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Live progress observation over `text/event-stream` connections.

mod decoder;
mod log;
mod tracker;

pub use decoder::{parse_frame, FrameDecoder};
pub use log::{EventLog, EventPayload, EventSummary, StreamEvent};
pub use tracker::{EventTracker, TrackedStream, DEFAULT_STREAM_TIMEOUT};

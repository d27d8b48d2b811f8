//! Core logic for facewatch: who is in front of the camera, and are they
//! physically present right now.
//!
//! The crate is deliberately free of any vision stack. Camera acquisition,
//! face detection, landmark extraction, and embedding computation are
//! external collaborators behind the [`pipeline::FrameAnalyzer`] trait; this
//! crate owns only the decision logic that runs on their outputs:
//!
//! - [`geometry`] — eye-aspect-ratio estimation from eye contour points.
//! - [`matcher`] — nearest-neighbor identity matching against an enrolled
//!   embedding gallery.
//! - [`liveness`] — the per-slot blink/motion state machine with a
//!   time-decayed live signal.
//! - [`pipeline`] — the frame orchestrator that ties identity and presence
//!   into a per-face verdict.

pub mod geometry;
pub mod liveness;
pub mod matcher;
pub mod pipeline;

pub use geometry::{eye_aspect_ratio, face_openness, GeometryError, Point};
pub use liveness::{ClosurePhase, LivenessConfig, SlotState};
pub use matcher::{Embedding, EmbeddingGallery, EuclideanMatcher, GalleryEntry, Matcher};
pub use pipeline::{
    BoundingBox, FaceLandmarks, FaceVerdict, FrameAnalyzer, RecognitionSchedule, Session,
    SessionConfig, Verdict,
};

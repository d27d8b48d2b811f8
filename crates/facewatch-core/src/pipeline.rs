//! Per-frame orchestration: correlate detections to slots, recognize at a
//! reduced cadence, advance liveness every frame, merge into verdicts.
//!
//! Slot identity is positional: a face's slot is its index within one
//! frame's ordered detection list, valid only for that frame. Liveness state
//! persists across frames under the same index, which silently misattributes
//! history when two faces swap ordering between frames. That limitation is
//! inherited deliberately; there is no identity tracker at this layer.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::geometry::{self, Point};
use crate::liveness::{LivenessConfig, SlotState};
use crate::matcher::{Embedding, EmbeddingGallery, EuclideanMatcher, Matcher};

/// Face bounding box in reduced-frame coordinates, `(top, right, bottom,
/// left)` ordering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl BoundingBox {
    /// Map back to display coordinates, e.g. `scaled(4.0)` for a frame that
    /// was downscaled by 0.25 before detection.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
            left: self.left * factor,
        }
    }
}

/// Landmark geometry for one detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub left_eye: [Point; 6],
    pub right_eye: [Point; 6],
    pub nose_tip: [Point; 5],
}

impl FaceLandmarks {
    /// The nose anchor used for motion tracking is the middle of the five
    /// nose-tip points.
    pub fn nose_anchor(&self) -> Point {
        self.nose_tip[2]
    }
}

/// External vision collaborators: detection, landmark extraction, and
/// embedding computation over an opaque frame type.
///
/// All three return one entry per detection box, in box order. A `None`
/// landmark entry means the extractor produced nothing for that face this
/// frame; the corresponding slot is simply not advanced.
pub trait FrameAnalyzer {
    type Frame;
    type Error: std::error::Error + Send + Sync + 'static;

    fn detect_faces(&mut self, frame: &Self::Frame) -> Result<Vec<BoundingBox>, Self::Error>;

    fn extract_landmarks(
        &mut self,
        frame: &Self::Frame,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Option<FaceLandmarks>>, Self::Error>;

    fn compute_embeddings(
        &mut self,
        frame: &Self::Frame,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Embedding>, Self::Error>;
}

/// Rate limiter for identity recomputation: fires on the first frame and
/// every `interval`th frame after.
///
/// An interval of 0 is clamped to 1 (recognize every frame) rather than
/// rejected.
#[derive(Debug)]
pub struct RecognitionSchedule {
    interval: u32,
    countdown: u32,
}

impl RecognitionSchedule {
    pub fn every(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            countdown: 0,
        }
    }

    /// Advance by one frame; returns whether labels are due this frame.
    pub fn tick(&mut self) -> bool {
        if self.countdown == 0 {
            self.countdown = self.interval - 1;
            true
        } else {
            self.countdown -= 1;
            false
        }
    }
}

/// Session tunables; liveness thresholds nest the tracker's own config.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Recompute identity labels every Nth frame.
    pub recognition_interval: u32,
    /// Maximum embedding distance for a positive identity match.
    pub match_tolerance: f32,
    pub liveness: LivenessConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recognition_interval: 5,
            match_tolerance: 0.5,
            liveness: LivenessConfig::default(),
        }
    }
}

/// Display verdict for one face slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    /// No identity match; liveness is irrelevant.
    Unknown,
    /// Matched an enrolled label and the live signal has not decayed.
    VerifiedLive { label: String },
    /// Matched an enrolled label but no recent blink or movement.
    VerifiedNotLive { label: String },
}

/// One orchestrator output entry: box plus merged verdict, consumed by an
/// external rendering/reporting collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceVerdict {
    pub bounds: BoundingBox,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Per-run orchestration state. Owns the liveness slot map, the cached label
/// list, and the recognition schedule; the gallery is read-only for the
/// whole run.
pub struct Session {
    config: SessionConfig,
    gallery: EmbeddingGallery,
    matcher: EuclideanMatcher,
    schedule: RecognitionSchedule,
    slots: HashMap<usize, SlotState>,
    /// Labels from the most recent recognition pass, positional by slot.
    /// `None` = no gallery match ("unknown").
    labels: Vec<Option<String>>,
}

impl Session {
    pub fn new(config: SessionConfig, gallery: EmbeddingGallery) -> Self {
        Self {
            schedule: RecognitionSchedule::every(config.recognition_interval),
            config,
            gallery,
            matcher: EuclideanMatcher,
            slots: HashMap::new(),
            labels: Vec::new(),
        }
    }

    /// Process one frame end to end and return a verdict per detected face.
    ///
    /// On frames where the recognition schedule does not fire, the previous
    /// label list is reused positionally; a slot beyond the cached list
    /// renders `Unknown` until the next recognition pass.
    pub fn process_frame<A: FrameAnalyzer>(
        &mut self,
        analyzer: &mut A,
        frame: &A::Frame,
        now: Instant,
    ) -> Result<Vec<FaceVerdict>, A::Error> {
        let boxes = analyzer.detect_faces(frame)?;

        if self.schedule.tick() {
            let embeddings = analyzer.compute_embeddings(frame, &boxes)?;
            self.labels = embeddings
                .iter()
                .map(|embedding| {
                    self.matcher
                        .best_match(&self.gallery, embedding, self.config.match_tolerance)
                        .map(str::to_string)
                })
                .collect();
            tracing::debug!(
                faces = boxes.len(),
                recognized = self.labels.iter().filter(|l| l.is_some()).count(),
                "identity labels recomputed"
            );
        }

        // Presence reset: a detection gap discards all per-slot history,
        // since "who was slot 0" does not survive the gap
        if boxes.is_empty() {
            if !self.slots.is_empty() {
                tracing::debug!("no detections; clearing liveness state");
                self.slots.clear();
            }
            return Ok(Vec::new());
        }

        let landmarks = analyzer.extract_landmarks(frame, &boxes)?;
        for (slot, entry) in landmarks.iter().enumerate() {
            let Some(marks) = entry else {
                // No landmarks for this face this frame: state persists, stale
                continue;
            };
            // Degenerate eye geometry means openness is unknown this frame;
            // the tracker skips the blink test for it
            let openness = geometry::face_openness(&marks.left_eye, &marks.right_eye).ok();
            self.slots
                .entry(slot)
                .or_default()
                .advance(&self.config.liveness, openness, marks.nose_anchor(), now);
        }

        Ok(boxes
            .iter()
            .enumerate()
            .map(|(slot, bounds)| {
                let label = self.labels.get(slot).and_then(|l| l.as_deref());
                let verdict = match label {
                    None => Verdict::Unknown,
                    Some(label) => {
                        let live = self
                            .slots
                            .get(&slot)
                            .is_some_and(|state| state.is_live(now));
                        if live {
                            Verdict::VerifiedLive {
                                label: label.to_string(),
                            }
                        } else {
                            Verdict::VerifiedNotLive {
                                label: label.to_string(),
                            }
                        }
                    }
                };
                FaceVerdict {
                    bounds: *bounds,
                    verdict,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::GalleryEntry;
    use std::convert::Infallible;
    use std::time::Duration;

    /// Scripted observations for one frame; the mock analyzer just reads
    /// them back.
    #[derive(Clone, Default)]
    struct Script {
        boxes: Vec<BoundingBox>,
        landmarks: Vec<Option<FaceLandmarks>>,
        embeddings: Vec<Embedding>,
    }

    #[derive(Default)]
    struct MockAnalyzer {
        embed_calls: usize,
    }

    impl FrameAnalyzer for MockAnalyzer {
        type Frame = Script;
        type Error = Infallible;

        fn detect_faces(&mut self, frame: &Script) -> Result<Vec<BoundingBox>, Infallible> {
            Ok(frame.boxes.clone())
        }

        fn extract_landmarks(
            &mut self,
            frame: &Script,
            _boxes: &[BoundingBox],
        ) -> Result<Vec<Option<FaceLandmarks>>, Infallible> {
            Ok(frame.landmarks.clone())
        }

        fn compute_embeddings(
            &mut self,
            frame: &Script,
            _boxes: &[BoundingBox],
        ) -> Result<Vec<Embedding>, Infallible> {
            self.embed_calls += 1;
            Ok(frame.embeddings.clone())
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox {
            top: 10.0,
            right: 50.0,
            bottom: 50.0,
            left: 10.0,
        }
    }

    fn eye(half_gap: f32) -> [Point; 6] {
        [
            Point::new(0.0, 0.0),
            Point::new(1.0, half_gap),
            Point::new(3.0, half_gap),
            Point::new(4.0, 0.0),
            Point::new(3.0, -half_gap),
            Point::new(1.0, -half_gap),
        ]
    }

    /// Landmarks with a chosen eye openness (EAR = half_gap / 2) and nose
    /// anchor position.
    fn marks(half_gap: f32, nose: Point) -> FaceLandmarks {
        FaceLandmarks {
            left_eye: eye(half_gap),
            right_eye: eye(half_gap),
            nose_tip: [nose; 5],
        }
    }

    const OPEN: f32 = 1.2; // EAR 0.6
    const CLOSED: f32 = 0.4; // EAR 0.2

    fn face_frame(half_gap: f32, embedding: Vec<f32>) -> Script {
        Script {
            boxes: vec![bbox()],
            landmarks: vec![Some(marks(half_gap, Point::new(20.0, 20.0)))],
            embeddings: vec![Embedding::new(embedding)],
        }
    }

    fn alice_gallery() -> EmbeddingGallery {
        EmbeddingGallery::new(vec![GalleryEntry {
            label: "alice".to_string(),
            embedding: Embedding::new(vec![0.0, 0.0]),
        }])
    }

    fn at(base: Instant, secs: f64) -> Instant {
        base + Duration::from_secs_f64(secs)
    }

    #[test]
    fn blink_promotes_known_face_to_live() {
        let mut session = Session::new(SessionConfig::default(), alice_gallery());
        let mut analyzer = MockAnalyzer::default();
        let base = Instant::now();

        let frames = [
            face_frame(CLOSED, vec![0.0, 0.0]),
            face_frame(CLOSED, vec![0.0, 0.0]),
            face_frame(OPEN, vec![0.0, 0.0]),
        ];
        let mut last = Vec::new();
        for (i, frame) in frames.iter().enumerate() {
            last = session
                .process_frame(&mut analyzer, frame, at(base, i as f64 * 0.03))
                .unwrap();
        }

        assert_eq!(last.len(), 1);
        assert_eq!(
            last[0].verdict,
            Verdict::VerifiedLive {
                label: "alice".to_string()
            }
        );
    }

    #[test]
    fn known_face_without_signals_is_not_live() {
        let mut session = Session::new(SessionConfig::default(), alice_gallery());
        let mut analyzer = MockAnalyzer::default();
        let base = Instant::now();

        let frame = face_frame(OPEN, vec![0.0, 0.0]);
        let mut last = Vec::new();
        for i in 0..4 {
            last = session
                .process_frame(&mut analyzer, &frame, at(base, i as f64 * 0.03))
                .unwrap();
        }
        assert_eq!(
            last[0].verdict,
            Verdict::VerifiedNotLive {
                label: "alice".to_string()
            }
        );
    }

    #[test]
    fn unmatched_face_is_unknown_even_when_live() {
        let mut session = Session::new(SessionConfig::default(), alice_gallery());
        let mut analyzer = MockAnalyzer::default();
        let base = Instant::now();

        // Far from every gallery entry, but blinking
        let frames = [
            face_frame(CLOSED, vec![9.0, 9.0]),
            face_frame(CLOSED, vec![9.0, 9.0]),
            face_frame(OPEN, vec![9.0, 9.0]),
        ];
        let mut last = Vec::new();
        for (i, frame) in frames.iter().enumerate() {
            last = session
                .process_frame(&mut analyzer, frame, at(base, i as f64 * 0.03))
                .unwrap();
        }
        assert_eq!(last[0].verdict, Verdict::Unknown);
    }

    #[test]
    fn empty_gallery_always_unknown() {
        let mut session = Session::new(SessionConfig::default(), EmbeddingGallery::default());
        let mut analyzer = MockAnalyzer::default();

        let out = session
            .process_frame(&mut analyzer, &face_frame(OPEN, vec![0.0, 0.0]), Instant::now())
            .unwrap();
        assert_eq!(out[0].verdict, Verdict::Unknown);
    }

    #[test]
    fn recognition_runs_on_schedule_only() {
        let config = SessionConfig {
            recognition_interval: 3,
            ..SessionConfig::default()
        };
        let mut session = Session::new(config, alice_gallery());
        let mut analyzer = MockAnalyzer::default();
        let base = Instant::now();

        let frame = face_frame(OPEN, vec![0.0, 0.0]);
        for i in 0..6 {
            session
                .process_frame(&mut analyzer, &frame, at(base, i as f64 * 0.03))
                .unwrap();
        }
        // Fires on frames 0 and 3 only
        assert_eq!(analyzer.embed_calls, 2);
    }

    #[test]
    fn skipped_frames_reuse_cached_labels() {
        let config = SessionConfig {
            recognition_interval: 100,
            ..SessionConfig::default()
        };
        let mut session = Session::new(config, alice_gallery());
        let mut analyzer = MockAnalyzer::default();
        let base = Instant::now();

        session
            .process_frame(&mut analyzer, &face_frame(OPEN, vec![0.0, 0.0]), base)
            .unwrap();

        // Later frames carry no embeddings at all; the cached label holds
        let mut frame = face_frame(OPEN, vec![0.0, 0.0]);
        frame.embeddings.clear();
        let out = session
            .process_frame(&mut analyzer, &frame, at(base, 0.03))
            .unwrap();
        assert_eq!(
            out[0].verdict,
            Verdict::VerifiedNotLive {
                label: "alice".to_string()
            }
        );
    }

    #[test]
    fn slot_beyond_label_cache_renders_unknown() {
        let config = SessionConfig {
            recognition_interval: 100,
            ..SessionConfig::default()
        };
        let mut session = Session::new(config, alice_gallery());
        let mut analyzer = MockAnalyzer::default();
        let base = Instant::now();

        // Frame 0: one face, recognized
        session
            .process_frame(&mut analyzer, &face_frame(OPEN, vec![0.0, 0.0]), base)
            .unwrap();

        // Frame 1 (recognition skipped): a second face appears
        let two_faces = Script {
            boxes: vec![bbox(), bbox()],
            landmarks: vec![
                Some(marks(OPEN, Point::new(20.0, 20.0))),
                Some(marks(OPEN, Point::new(80.0, 20.0))),
            ],
            embeddings: vec![],
        };
        let out = session
            .process_frame(&mut analyzer, &two_faces, at(base, 0.03))
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0].verdict, Verdict::VerifiedNotLive { .. }));
        assert_eq!(out[1].verdict, Verdict::Unknown);
    }

    #[test]
    fn detection_gap_resets_liveness_history() {
        let mut session = Session::new(SessionConfig::default(), alice_gallery());
        let mut analyzer = MockAnalyzer::default();
        let base = Instant::now();

        // Blink to live
        for (i, frame) in [
            face_frame(CLOSED, vec![0.0, 0.0]),
            face_frame(CLOSED, vec![0.0, 0.0]),
            face_frame(OPEN, vec![0.0, 0.0]),
        ]
        .iter()
        .enumerate()
        {
            session
                .process_frame(&mut analyzer, frame, at(base, i as f64 * 0.03))
                .unwrap();
        }

        // Gap: zero detections clears every slot
        let out = session
            .process_frame(&mut analyzer, &Script::default(), at(base, 0.1))
            .unwrap();
        assert!(out.is_empty());

        // Reappearance starts from scratch: one closed frame and a reopen is
        // below the blink minimum, so no liveness despite the earlier blink
        for (i, frame) in [
            face_frame(CLOSED, vec![0.0, 0.0]),
            face_frame(OPEN, vec![0.0, 0.0]),
        ]
        .iter()
        .enumerate()
        {
            let out = session
                .process_frame(&mut analyzer, frame, at(base, 0.2 + i as f64 * 0.03))
                .unwrap();
            assert!(matches!(
                out[0].verdict,
                Verdict::VerifiedNotLive { .. } | Verdict::Unknown
            ));
        }
    }

    #[test]
    fn missing_landmarks_leave_slot_state_intact() {
        let mut session = Session::new(SessionConfig::default(), alice_gallery());
        let mut analyzer = MockAnalyzer::default();
        let base = Instant::now();

        for (i, frame) in [
            face_frame(CLOSED, vec![0.0, 0.0]),
            face_frame(CLOSED, vec![0.0, 0.0]),
            face_frame(OPEN, vec![0.0, 0.0]),
        ]
        .iter()
        .enumerate()
        {
            session
                .process_frame(&mut analyzer, frame, at(base, i as f64 * 0.03))
                .unwrap();
        }

        // Box detected but landmark extraction came up empty: the slot is
        // not advanced, and the earlier liveness window still holds
        let mut frame = face_frame(OPEN, vec![0.0, 0.0]);
        frame.landmarks = vec![None];
        let out = session
            .process_frame(&mut analyzer, &frame, at(base, 0.5))
            .unwrap();
        assert_eq!(
            out[0].verdict,
            Verdict::VerifiedLive {
                label: "alice".to_string()
            }
        );
    }

    #[test]
    fn degenerate_eyes_still_allow_motion_liveness() {
        let mut session = Session::new(SessionConfig::default(), alice_gallery());
        let mut analyzer = MockAnalyzer::default();
        let base = Instant::now();

        let degenerate = |nose: Point| FaceLandmarks {
            left_eye: [Point::new(2.0, 0.0); 6],
            right_eye: [Point::new(2.0, 0.0); 6],
            nose_tip: [nose; 5],
        };

        let frame_at = |nose: Point| Script {
            boxes: vec![bbox()],
            landmarks: vec![Some(degenerate(nose))],
            embeddings: vec![Embedding::new(vec![0.0, 0.0])],
        };

        session
            .process_frame(&mut analyzer, &frame_at(Point::new(0.0, 0.0)), base)
            .unwrap();
        let out = session
            .process_frame(&mut analyzer, &frame_at(Point::new(10.0, 0.0)), at(base, 0.03))
            .unwrap();
        assert_eq!(
            out[0].verdict,
            Verdict::VerifiedLive {
                label: "alice".to_string()
            }
        );
    }

    #[test]
    fn schedule_fires_first_frame_then_every_nth() {
        let mut schedule = RecognitionSchedule::every(5);
        let fired: Vec<bool> = (0..11).map(|_| schedule.tick()).collect();
        assert_eq!(
            fired,
            vec![true, false, false, false, false, true, false, false, false, false, true]
        );
    }

    #[test]
    fn schedule_interval_zero_means_every_frame() {
        let mut schedule = RecognitionSchedule::every(0);
        assert!(schedule.tick());
        assert!(schedule.tick());
    }

    #[test]
    fn bounding_box_scales_back_to_display_coordinates() {
        let scaled = bbox().scaled(4.0);
        assert_eq!(scaled.top, 40.0);
        assert_eq!(scaled.right, 200.0);
        assert_eq!(scaled.bottom, 200.0);
        assert_eq!(scaled.left, 40.0);
    }
}

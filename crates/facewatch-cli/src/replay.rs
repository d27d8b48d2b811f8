//! Replay frontend: drives the pipeline from recorded observations instead
//! of a live camera.
//!
//! The vision stack (detection, landmarks, embeddings) runs out of process;
//! its per-frame outputs are recorded as JSON lines, one frame per line, and
//! fed to `facewatch run`. Each line mirrors the collaborator contracts:
//!
//! ```json
//! {"detections": [{"box": {"top": 10, "right": 50, "bottom": 50, "left": 10},
//!   "landmarks": {"left_eye": [...6 points], "right_eye": [...6 points],
//!   "nose_tip": [...5 points]}, "embedding": [...128 floats]}]}
//! ```
//!
//! `landmarks` may be null when extraction produced nothing for a face, and
//! `embedding` may be omitted on frames where recognition is known to be
//! skipped.

use serde::Deserialize;
use thiserror::Error;

use facewatch_core::{BoundingBox, Embedding, FaceLandmarks, FrameAnalyzer};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("malformed frame record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("detection {slot} has no embedding but recognition is due this frame")]
    MissingEmbedding { slot: usize },
}

/// One recorded detection: box, optional landmarks, optional embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionRecord {
    #[serde(rename = "box")]
    pub bounds: BoundingBox,
    #[serde(default)]
    pub landmarks: Option<FaceLandmarks>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// One recorded frame's worth of observations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameRecord {
    #[serde(default)]
    pub detections: Vec<DetectionRecord>,
}

/// Parse one JSON line into a frame record.
pub fn parse_frame(line: &str) -> Result<FrameRecord, ReplayError> {
    Ok(serde_json::from_str(line)?)
}

/// [`FrameAnalyzer`] over recorded frames: every contract reads straight
/// from the record.
#[derive(Debug, Default)]
pub struct ReplayAnalyzer;

impl FrameAnalyzer for ReplayAnalyzer {
    type Frame = FrameRecord;
    type Error = ReplayError;

    fn detect_faces(&mut self, frame: &FrameRecord) -> Result<Vec<BoundingBox>, ReplayError> {
        Ok(frame.detections.iter().map(|d| d.bounds).collect())
    }

    fn extract_landmarks(
        &mut self,
        frame: &FrameRecord,
        _boxes: &[BoundingBox],
    ) -> Result<Vec<Option<FaceLandmarks>>, ReplayError> {
        Ok(frame.detections.iter().map(|d| d.landmarks.clone()).collect())
    }

    fn compute_embeddings(
        &mut self,
        frame: &FrameRecord,
        _boxes: &[BoundingBox],
    ) -> Result<Vec<Embedding>, ReplayError> {
        frame
            .detections
            .iter()
            .enumerate()
            .map(|(slot, d)| {
                d.embedding
                    .clone()
                    .map(Embedding::new)
                    .ok_or(ReplayError::MissingEmbedding { slot })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_FRAME: &str = r#"{
        "detections": [{
            "box": {"top": 10.0, "right": 50.0, "bottom": 50.0, "left": 10.0},
            "landmarks": {
                "left_eye": [{"x": 0, "y": 0}, {"x": 1, "y": 1}, {"x": 3, "y": 1},
                             {"x": 4, "y": 0}, {"x": 3, "y": -1}, {"x": 1, "y": -1}],
                "right_eye": [{"x": 10, "y": 0}, {"x": 11, "y": 1}, {"x": 13, "y": 1},
                              {"x": 14, "y": 0}, {"x": 13, "y": -1}, {"x": 11, "y": -1}],
                "nose_tip": [{"x": 7, "y": 5}, {"x": 7.5, "y": 5}, {"x": 8, "y": 5},
                             {"x": 8.5, "y": 5}, {"x": 9, "y": 5}]
            },
            "embedding": [0.25, -0.5]
        }]
    }"#;

    #[test]
    fn parses_full_record() {
        let frame = parse_frame(FULL_FRAME).unwrap();
        assert_eq!(frame.detections.len(), 1);
        let det = &frame.detections[0];
        assert_eq!(det.bounds.top, 10.0);
        let marks = det.landmarks.as_ref().unwrap();
        assert_eq!(marks.nose_anchor().x, 8.0);
        assert_eq!(det.embedding.as_deref(), Some(&[0.25, -0.5][..]));
    }

    #[test]
    fn empty_object_is_an_empty_frame() {
        let frame = parse_frame("{}").unwrap();
        assert!(frame.detections.is_empty());
    }

    #[test]
    fn missing_optional_fields_default_to_none() {
        let frame = parse_frame(
            r#"{"detections": [{"box": {"top": 0, "right": 1, "bottom": 1, "left": 0}}]}"#,
        )
        .unwrap();
        assert!(frame.detections[0].landmarks.is_none());
        assert!(frame.detections[0].embedding.is_none());
    }

    #[test]
    fn garbage_line_is_rejected() {
        assert!(matches!(
            parse_frame("not json").unwrap_err(),
            ReplayError::Malformed(_)
        ));
    }

    #[test]
    fn analyzer_reads_back_observations() {
        let frame = parse_frame(FULL_FRAME).unwrap();
        let mut analyzer = ReplayAnalyzer;

        let boxes = analyzer.detect_faces(&frame).unwrap();
        assert_eq!(boxes.len(), 1);
        let marks = analyzer.extract_landmarks(&frame, &boxes).unwrap();
        assert!(marks[0].is_some());
        let embeddings = analyzer.compute_embeddings(&frame, &boxes).unwrap();
        assert_eq!(embeddings[0].values, vec![0.25, -0.5]);
    }

    #[test]
    fn missing_embedding_fails_only_when_asked() {
        let frame = parse_frame(
            r#"{"detections": [{"box": {"top": 0, "right": 1, "bottom": 1, "left": 0}}]}"#,
        )
        .unwrap();
        let mut analyzer = ReplayAnalyzer;
        assert!(matches!(
            analyzer.compute_embeddings(&frame, &[]).unwrap_err(),
            ReplayError::MissingEmbedding { slot: 0 }
        ));
    }
}

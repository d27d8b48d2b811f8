//! The `run` command: drive the per-frame pipeline over a recorded
//! observation stream and report one verdict line per frame.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;

use facewatch_core::{FaceVerdict, Session};

use crate::config::Config;
use crate::replay::{self, ReplayAnalyzer};
use crate::store::GalleryStore;

/// Per-frame report written to stdout as one JSON line. Bounding boxes are
/// scaled back up to display coordinates.
#[derive(Serialize)]
struct FrameReport {
    frame: usize,
    faces: Vec<FaceVerdict>,
}

pub fn run(config: &Config, input: Option<PathBuf>) -> Result<()> {
    let store = GalleryStore::open(&config.db_path)
        .with_context(|| format!("opening gallery at {}", config.db_path.display()))?;
    let gallery = store.load_gallery().context("loading gallery")?;
    tracing::info!(entries = gallery.len(), "gallery loaded");

    let mut session = Session::new(config.session_config(), gallery);
    let mut analyzer = ReplayAnalyzer;
    let display_scale = config.display_scale();

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(&path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut frame_no = 0usize;

    for line in reader.lines() {
        let line = line.context("reading frame stream")?;
        if line.trim().is_empty() {
            continue;
        }

        let frame = replay::parse_frame(&line)
            .with_context(|| format!("frame {frame_no}"))?;
        let verdicts = session.process_frame(&mut analyzer, &frame, Instant::now())?;

        let report = FrameReport {
            frame: frame_no,
            faces: verdicts
                .into_iter()
                .map(|face| FaceVerdict {
                    bounds: face.bounds.scaled(display_scale),
                    verdict: face.verdict,
                })
                .collect(),
        };
        serde_json::to_writer(&mut out, &report)?;
        writeln!(out)?;

        frame_no += 1;
    }

    // End of stream: the loop simply stops requesting frames
    tracing::info!(frames = frame_no, "end of stream");
    Ok(())
}

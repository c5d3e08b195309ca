//! Refinement result summary: per-stage pose deltas keyed by timestamp.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use log::warn;
use serde::Serialize;

use crate::core::Transform;
use crate::error::Result;

/// Rotation/translation delta between a pose before and after a stage.
///
/// Derived, never stored on the map itself, and never fed back into
/// optimization: purely a diagnostic.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct RegistrationDelta {
    /// Angle of the relative rotation, in degrees (non-negative).
    #[serde(rename = "dR_deg")]
    pub rotation_deg: f64,

    /// Euclidean norm of the relative translation, in millimeters.
    #[serde(rename = "dt_mm")]
    pub translation_mm: f64,
}

impl RegistrationDelta {
    /// Compute the delta between two poses.
    pub fn between(before: &Transform, after: &Transform) -> Self {
        let diff = before.between(after);
        Self {
            rotation_deg: diff.rotation_angle_deg(),
            translation_mm: diff.translation_norm_mm(),
        }
    }
}

#[derive(Serialize)]
struct SummaryEntry {
    stamp_us: u64,
    #[serde(flatten)]
    delta: RegistrationDelta,
}

#[derive(Serialize)]
struct SummaryDocument {
    submap_refinement: Vec<SummaryEntry>,
    submap_alignment: Vec<SummaryEntry>,
}

/// Accumulated registration deltas for the refinement and alignment stages.
///
/// Append-only: entries grow monotonically across a run and persist until
/// explicitly cleared or the summary is dropped. Keys are unique timestamps;
/// a stage never records the same timestamp twice.
#[derive(Clone, Debug, Default)]
pub struct RefinementSummary {
    refinement: BTreeMap<u64, RegistrationDelta>,
    alignment: BTreeMap<u64, RegistrationDelta>,
}

impl RefinementSummary {
    /// Create an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submap-refinement delta keyed by keyframe timestamp.
    pub fn record_refinement(&mut self, stamp_us: u64, delta: RegistrationDelta) {
        if self.refinement.insert(stamp_us, delta).is_some() {
            warn!("refinement summary already held an entry for stamp {stamp_us}");
        }
    }

    /// Record a submap-alignment delta keyed by submap timestamp.
    pub fn record_alignment(&mut self, stamp_us: u64, delta: RegistrationDelta) {
        if self.alignment.insert(stamp_us, delta).is_some() {
            warn!("alignment summary already held an entry for stamp {stamp_us}");
        }
    }

    /// Refinement deltas keyed by keyframe timestamp.
    pub fn refinement(&self) -> &BTreeMap<u64, RegistrationDelta> {
        &self.refinement
    }

    /// Alignment deltas keyed by submap timestamp.
    pub fn alignment(&self) -> &BTreeMap<u64, RegistrationDelta> {
        &self.alignment
    }

    /// Drop all recorded entries.
    pub fn clear(&mut self) {
        self.refinement.clear();
        self.alignment.clear();
    }

    /// Write `summary.json` into the given directory.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let document = SummaryDocument {
            submap_refinement: self
                .refinement
                .iter()
                .map(|(&stamp_us, &delta)| SummaryEntry { stamp_us, delta })
                .collect(),
            submap_alignment: self
                .alignment
                .iter()
                .map(|(&stamp_us, &delta)| SummaryEntry { stamp_us, delta })
                .collect(),
        };
        let file = File::create(dir.join("summary.json"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &document)?;
        Ok(())
    }
}

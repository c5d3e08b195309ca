//! JSON persistence for submap stores and trajectories.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::core::{Keyframe, PointCloud, Submap, SubmapStore, Transform};
use crate::error::Result;

#[derive(Serialize, Deserialize)]
struct KeyframeRecord {
    timestamp_us: u64,
    local_pose: Transform,
    points: Vec<[f64; 3]>,
}

#[derive(Serialize, Deserialize)]
struct SubmapRecord {
    stamp_us: u64,
    pose: Transform,
    pose_init: Transform,
    keyframes: Vec<KeyframeRecord>,
}

#[derive(Serialize, Deserialize)]
struct StoreRecord {
    submaps: Vec<SubmapRecord>,
}

impl From<&Submap> for SubmapRecord {
    fn from(s: &Submap) -> Self {
        SubmapRecord {
            stamp_us: s.stamp_us(),
            pose: s.pose(),
            pose_init: s.pose_init(),
            keyframes: s
                .keyframes()
                .iter()
                .map(|kf| KeyframeRecord {
                    timestamp_us: kf.timestamp_us(),
                    local_pose: kf.local_pose(),
                    points: kf.cloud().points().iter().map(|p| [p.x, p.y, p.z]).collect(),
                })
                .collect(),
        }
    }
}

impl From<SubmapRecord> for Submap {
    fn from(r: SubmapRecord) -> Self {
        let keyframes = r
            .keyframes
            .into_iter()
            .map(|kf| {
                let points = kf
                    .points
                    .into_iter()
                    .map(|[x, y, z]| Point3::new(x, y, z))
                    .collect();
                Keyframe::new(kf.timestamp_us, kf.local_pose, PointCloud::from_points(points))
            })
            .collect();
        Submap::from_parts(r.stamp_us, r.pose, r.pose_init, keyframes)
    }
}

/// Load a submap store from a JSON file.
pub fn load_store(path: &Path) -> Result<SubmapStore> {
    let file = File::open(path)?;
    let record: StoreRecord = serde_json::from_reader(BufReader::new(file))?;
    let mut store = SubmapStore::new();
    for r in record.submaps {
        store.push(r.into());
    }
    Ok(store)
}

/// Save a submap store to a JSON file.
pub fn save_store(store: &SubmapStore, path: &Path) -> Result<()> {
    let record = StoreRecord {
        submaps: store.submaps().iter().map(SubmapRecord::from).collect(),
    };
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &record)?;
    Ok(())
}

#[derive(Serialize)]
struct TrajectoryEntry {
    stamp_us: u64,
    pose: Transform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pose_init: Option<Transform>,
}

/// Save the per-submap world poses as a JSON trajectory.
///
/// When `save_initial` is set, the pre-refinement pose is included per entry.
pub fn save_trajectory(store: &SubmapStore, path: &Path, save_initial: bool) -> Result<()> {
    let entries: Vec<TrajectoryEntry> = store
        .submaps()
        .iter()
        .map(|s| TrajectoryEntry {
            stamp_us: s.stamp_us(),
            pose: s.pose(),
            pose_init: save_initial.then(|| s.pose_init()),
        })
        .collect();
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &entries)?;
    Ok(())
}

//! Snaps object placements in converted map scenes onto the destination
//! terrain mesh.
//!
//! Pipeline: [`mesh`] reads the terrain GLB into a point cloud,
//! [`heightfield`] resamples it onto a queryable grid, and [`snap`] walks a
//! scene's placements through the category strategies and the post-snap
//! validator.

pub mod config;
pub mod error;
pub mod heightfield;
pub mod mesh;
pub mod snap;

pub use config::SnapConfig;
pub use error::{Result, SnapError};
pub use heightfield::{HeightGrid, HeightSampler, TerrainBounds};
pub use snap::{SceneSnapper, SnapOptions, SnapStatistics};

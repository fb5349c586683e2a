use std::fmt;

use serde::{Deserialize, Serialize};

/// Inputs of the meshing stage: point sampling and peak selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshParams {
    pub point_count: usize,
    pub seed: u64,
    pub peak_count: usize,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            point_count: 4000,
            seed: 42,
            peak_count: 8,
        }
    }
}

/// Elevation shaping weights, exposed as sliders in the frontend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationParams {
    pub seed: u64,
    pub mountain_jaggedness: f32,
    pub mountain_sharpness: f32,
    pub hill_height: f32,
    pub noisy_coastlines: f32,
    pub ocean_depth: f32,
}

impl Default for ElevationParams {
    fn default() -> Self {
        Self {
            seed: 42,
            mountain_jaggedness: 1.0,
            mountain_sharpness: 0.8,
            hill_height: 0.3,
            noisy_coastlines: 0.5,
            ocean_depth: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiverParams {
    /// Water added per land triangle.
    #[serde(alias = "flow")]
    pub rainfall: f32,
    /// Segments whose smaller endpoint carries less than this are not rivers.
    pub min_flow: f32,
    /// Stroke scale for renderers; the accumulation never reads it.
    pub river_width: f32,
}

impl Default for RiverParams {
    fn default() -> Self {
        Self {
            rainfall: 1.0,
            min_flow: 8.0,
            river_width: 0.25,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintLayer {
    Regions,
    Triangles,
}

impl fmt::Display for ConstraintLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintLayer::Regions => f.write_str("region"),
            ConstraintLayer::Triangles => f.write_str("triangle"),
        }
    }
}

/// Hand-painted elevation overrides. `None` entries leave the computed value alone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub layer: ConstraintLayer,
    pub values: Vec<Option<f32>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub overlay: Option<Overlay>,
    /// Land/water threshold. Stored on the mesh, never baked into elevation.
    pub sea_level: f32,
}

impl Constraints {
    pub fn with_sea_level(sea_level: f32) -> Self {
        Self {
            overlay: None,
            sea_level,
        }
    }

    pub fn regions(values: Vec<Option<f32>>, sea_level: f32) -> Self {
        Self {
            overlay: Some(Overlay {
                layer: ConstraintLayer::Regions,
                values,
            }),
            sea_level,
        }
    }

    pub fn triangles(values: Vec<Option<f32>>, sea_level: f32) -> Self {
        Self {
            overlay: Some(Overlay {
                layer: ConstraintLayer::Triangles,
                values,
            }),
            sea_level,
        }
    }
}

/// Everything one pipeline run needs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub mesh: MeshParams,
    pub elevation: ElevationParams,
    pub constraints: Constraints,
    pub rivers: RiverParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let req: GenerationRequest =
            serde_json::from_str(r#"{"mesh":{"point_count":500},"rivers":{"flow":2.0}}"#).unwrap();
        assert_eq!(req.mesh.point_count, 500);
        assert_eq!(req.mesh.seed, MeshParams::default().seed);
        assert_eq!(req.rivers.rainfall, 2.0);
        assert_eq!(req.elevation, ElevationParams::default());
        assert!(req.constraints.overlay.is_none());
    }

    #[test]
    fn overlay_nulls_are_absent_entries() {
        let c: Constraints = serde_json::from_str(
            r#"{"overlay":{"layer":"regions","values":[null,0.5,null]},"sea_level":0.1}"#,
        )
        .unwrap();
        let overlay = c.overlay.unwrap();
        assert_eq!(overlay.layer, ConstraintLayer::Regions);
        assert_eq!(overlay.values, vec![None, Some(0.5), None]);
    }
}

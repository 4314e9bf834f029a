//! Per-grid-point weight fields that bias candidate selection.
//!
//! A [`Gradient`] is built once from a [`GradientMode`] over the tagged grid. Raw
//! values are rescaled to `[0, 1]` (optionally inverted) and then turned into a
//! point choice by a [`WeightSelection`].
use glam::Vec3;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::compartment::{Compartment, CompartmentId};
use crate::error::{Error, Result};
use crate::grid::Grid;

pub mod selection;

pub use selection::{select_point, WeightSelection};

/// Shape of the weight field.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GradientMode {
    /// `w = t^exponent` with `t` the normalized projection on `axis`.
    AxisLinear { axis: Vec3, exponent: f32 },
    /// Gaussian in the normalized projection, centered on the axis midpoint.
    AxisGauss { axis: Vec3, sigma: f32 },
    /// Linear falloff with distance from `center`, zero at `radius`
    /// (default: farthest grid point).
    Radial { center: Vec3, radius: Option<f32> },
    /// `w = exp(-d / decay_length)` with `d` the distance to a compartment surface.
    Surface {
        /// Left at 0 in recipes that name the compartment instead.
        #[serde(default)]
        compartment: CompartmentId,
        decay_length: f32,
    },
}

impl GradientMode {
    fn validate(&self, compartments: &[Compartment]) -> Result<()> {
        let bad = |msg: String| Err(Error::InvalidRecipe(msg));
        match self {
            GradientMode::AxisLinear { axis, exponent } => {
                if axis.try_normalize().is_none() {
                    return bad("axis-linear gradient needs a non-zero axis".into());
                }
                if !exponent.is_finite() || *exponent <= 0.0 {
                    return bad(format!("gradient exponent must be > 0, got {exponent}"));
                }
            }
            GradientMode::AxisGauss { axis, sigma } => {
                if axis.try_normalize().is_none() {
                    return bad("axis-gauss gradient needs a non-zero axis".into());
                }
                if !sigma.is_finite() || *sigma <= 0.0 {
                    return bad(format!("gradient sigma must be > 0, got {sigma}"));
                }
            }
            GradientMode::Radial { center, radius } => {
                if !center.is_finite() || radius.is_some_and(|r| !r.is_finite() || r <= 0.0) {
                    return bad("radial gradient needs a finite center and radius > 0".into());
                }
            }
            GradientMode::Surface {
                compartment,
                decay_length,
            } => {
                if *compartment == 0 || *compartment as usize > compartments.len() {
                    return bad(format!(
                        "surface gradient names unknown compartment {compartment}"
                    ));
                }
                if !decay_length.is_finite() || *decay_length <= 0.0 {
                    return bad(format!(
                        "gradient decay length must be > 0, got {decay_length}"
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A named, normalized weight field over the grid.
#[derive(Clone, Debug)]
pub struct Gradient {
    name: String,
    mode: GradientMode,
    selection: WeightSelection,
    invert: bool,
    weights: Vec<f32>,
}

impl Gradient {
    /// Evaluates `mode` on every grid point and normalizes to `[0, 1]`.
    pub fn build(
        name: impl Into<String>,
        mode: GradientMode,
        selection: WeightSelection,
        invert: bool,
        grid: &Grid,
        compartments: &[Compartment],
    ) -> Result<Self> {
        mode.validate(compartments)?;
        let positions = grid.positions();
        let raw: Vec<f32> = match &mode {
            GradientMode::AxisLinear { axis, exponent } => {
                let t = axis_fraction(positions, *axis);
                t.into_iter().map(|t| t.powf(*exponent)).collect()
            }
            GradientMode::AxisGauss { axis, sigma } => {
                let t = axis_fraction(positions, *axis);
                t.into_iter()
                    .map(|t| {
                        let z = (t - 0.5) / sigma;
                        (-0.5 * z * z).exp()
                    })
                    .collect()
            }
            GradientMode::Radial { center, radius } => {
                let r = radius.unwrap_or_else(|| {
                    positions
                        .iter()
                        .map(|p| p.distance(*center))
                        .fold(0.0, f32::max)
                });
                positions
                    .iter()
                    .map(|p| {
                        if r > 0.0 {
                            (1.0 - p.distance(*center) / r).max(0.0)
                        } else {
                            1.0
                        }
                    })
                    .collect()
            }
            GradientMode::Surface {
                compartment,
                decay_length,
            } => {
                let c = &compartments[*compartment as usize - 1];
                positions
                    .iter()
                    .map(|&p| (-c.nearest_surface_distance(p) / decay_length).exp())
                    .collect()
            }
        };

        let mut weights = normalize(raw);
        if invert {
            for w in &mut weights {
                *w = 1.0 - *w;
            }
        }
        Ok(Self {
            name: name.into(),
            mode,
            selection,
            invert,
            weights,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> &GradientMode {
        &self.mode
    }

    pub fn selection(&self) -> WeightSelection {
        self.selection
    }

    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn weight(&self, index: u32) -> f32 {
        self.weights[index as usize]
    }

    /// Picks a candidate by weight; `None` when every candidate weighs zero.
    pub fn pick_point(&self, allowed: &[u32], rng: &mut dyn RngCore) -> Option<u32> {
        select_point(self.selection, allowed, &self.weights, rng)
    }

    /// Unit direction of increasing weight at `p`, used to orient gradient ingredients.
    pub fn direction_at(&self, p: Vec3, compartments: &[Compartment]) -> Option<Vec3> {
        let dir = match &self.mode {
            GradientMode::AxisLinear { axis, .. } | GradientMode::AxisGauss { axis, .. } => *axis,
            GradientMode::Radial { center, .. } => *center - p,
            GradientMode::Surface { compartment, .. } => {
                let c = compartments.get(*compartment as usize - 1)?;
                c.nearest_surface(p).point - p
            }
        };
        let dir = if self.invert { -dir } else { dir };
        dir.try_normalize()
    }
}

/// Projection of each position on `axis`, rescaled to `[0, 1]` over the grid.
fn axis_fraction(positions: &[Vec3], axis: Vec3) -> Vec<f32> {
    let axis = axis.normalize_or_zero();
    let projected: Vec<f32> = positions.iter().map(|p| p.dot(axis)).collect();
    let lo = projected.iter().copied().fold(f32::INFINITY, f32::min);
    let hi = projected.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let span = hi - lo;
    projected
        .into_iter()
        .map(|v| if span > 0.0 { (v - lo) / span } else { 1.0 })
        .collect()
}

/// Rescales to `[0, 1]`; a constant field becomes all ones.
fn normalize(raw: Vec<f32>) -> Vec<f32> {
    let lo = raw.iter().copied().fold(f32::INFINITY, f32::min);
    let hi = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let span = hi - lo;
    if span.is_nan() || span <= 0.0 {
        return vec![1.0; raw.len()];
    }
    raw.into_iter().map(|v| (v - lo) / span).collect()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::geometry::{BoundingBox, Mesh};
    use crate::grid::GridStyle;

    fn grid() -> Grid {
        Grid::new(
            BoundingBox::new(Vec3::ZERO, Vec3::splat(100.0)),
            10.0,
            GridStyle::Linspace,
        )
        .expect("grid")
    }

    #[test]
    fn axis_linear_spans_unit_interval() {
        let g = grid();
        let gradient = Gradient::build(
            "x",
            GradientMode::AxisLinear {
                axis: Vec3::X,
                exponent: 1.0,
            },
            WeightSelection::RandomWeighted,
            false,
            &g,
            &[],
        )
        .expect("gradient");
        assert_eq!(gradient.weight(g.index_from_ijk(0, 3, 3)), 0.0);
        assert_eq!(gradient.weight(g.index_from_ijk(10, 3, 3)), 1.0);
        assert!((gradient.weight(g.index_from_ijk(5, 0, 0)) - 0.5).abs() < 1e-6);
        assert_eq!(gradient.direction_at(Vec3::ZERO, &[]), Some(Vec3::X));
    }

    #[test]
    fn inverted_gradient_flips_weights_and_direction() {
        let g = grid();
        let gradient = Gradient::build(
            "x",
            GradientMode::AxisLinear {
                axis: Vec3::X,
                exponent: 2.0,
            },
            WeightSelection::MaxWeight,
            true,
            &g,
            &[],
        )
        .expect("gradient");
        assert_eq!(gradient.weight(g.index_from_ijk(0, 0, 0)), 1.0);
        assert_eq!(gradient.direction_at(Vec3::ZERO, &[]), Some(-Vec3::X));
        let all: Vec<u32> = (0..g.len() as u32).collect();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(gradient.pick_point(&all, &mut rng), Some(0));
    }

    #[test]
    fn radial_and_gauss_peak_where_expected() {
        let g = grid();
        let center = Vec3::splat(50.0);
        let radial = Gradient::build(
            "r",
            GradientMode::Radial {
                center,
                radius: None,
            },
            WeightSelection::MaxWeight,
            false,
            &g,
            &[],
        )
        .expect("gradient");
        assert_eq!(radial.weight(g.index_from_point(center)), 1.0);
        assert_eq!(radial.weight(0), 0.0);

        let gauss = Gradient::build(
            "g",
            GradientMode::AxisGauss {
                axis: Vec3::Y,
                sigma: 0.2,
            },
            WeightSelection::MaxWeight,
            false,
            &g,
            &[],
        )
        .expect("gradient");
        assert_eq!(gauss.weight(g.index_from_ijk(2, 5, 7)), 1.0);
        assert!(gauss.weight(g.index_from_ijk(2, 0, 7)) < 0.1);
    }

    #[test]
    fn surface_gradient_is_highest_at_the_membrane() {
        let g = grid();
        let compartment =
            Compartment::new(1, "cube", Mesh::cuboid(Vec3::splat(30.0), Vec3::splat(70.0)))
                .expect("mesh");
        let compartments = vec![compartment];
        let gradient = Gradient::build(
            "s",
            GradientMode::Surface {
                compartment: 1,
                decay_length: 10.0,
            },
            WeightSelection::MaxWeight,
            false,
            &g,
            &compartments,
        )
        .expect("gradient");
        let on_face = g.index_from_point(Vec3::new(30.0, 50.0, 50.0));
        let far = g.index_from_point(Vec3::ZERO);
        assert_eq!(gradient.weight(on_face), 1.0);
        assert!(gradient.weight(far) < gradient.weight(on_face));

        let dir = gradient
            .direction_at(Vec3::new(10.0, 50.0, 50.0), &compartments)
            .expect("direction");
        assert!((dir - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn rejects_unknown_compartment_and_bad_parameters() {
        let g = grid();
        let err = Gradient::build(
            "s",
            GradientMode::Surface {
                compartment: 2,
                decay_length: 1.0,
            },
            WeightSelection::default(),
            false,
            &g,
            &[],
        );
        assert!(matches!(err, Err(Error::InvalidRecipe(_))));
        let err = Gradient::build(
            "x",
            GradientMode::AxisLinear {
                axis: Vec3::ZERO,
                exponent: 1.0,
            },
            WeightSelection::default(),
            false,
            &g,
            &[],
        );
        assert!(err.is_err());
    }
}

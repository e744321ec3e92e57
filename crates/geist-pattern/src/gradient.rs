//! Named gradients: ordered pattern lists indexed by position.

use std::collections::HashMap;
use std::fmt;

use geist_blocks::BlockRegistry;
use geist_geom::{IVec3, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::context::EvalContext;
use crate::error::Result;
use crate::pattern::Pattern;

/// How a gradient maps a block position to `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GradientKind {
    /// Along the dominant axis of the facing direction.
    #[default]
    Linear,
    /// Outward from the nearest stroke centre.
    Radial,
    /// Outward from the placement point.
    Lit,
}

impl GradientKind {
    pub fn from_suffix(s: &str) -> Option<Self> {
        Some(match s {
            "cardinal" | "linear" => GradientKind::Linear,
            "rad" => GradientKind::Radial,
            "lit" => GradientKind::Lit,
            _ => return None,
        })
    }

    pub fn suffix(self) -> Option<&'static str> {
        match self {
            GradientKind::Linear => None,
            GradientKind::Radial => Some("rad"),
            GradientKind::Lit => Some("lit"),
        }
    }
}

impl fmt::Display for GradientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix().unwrap_or("cardinal"))
    }
}

#[derive(Clone, Debug)]
pub struct Gradient {
    /// Fraction of the gradient's length an index may randomly drift by.
    pub dither: f32,
    pub patterns: Vec<Pattern>,
}

impl Gradient {
    pub fn new(dither: f32, patterns: Vec<Pattern>) -> Self {
        Self {
            dither: dither.clamp(0.0, 1.0),
            patterns,
        }
    }

    /// Pattern for normalised position `t`, after dithering.
    pub(crate) fn pick(&self, t: f32, rng: &mut impl Rng) -> Option<&Pattern> {
        let n = self.patterns.len();
        if n == 0 {
            return None;
        }
        let mut t = if t.is_finite() { t } else { 0.0 };
        if self.dither > 0.0 {
            t += rng.gen_range(-self.dither..=self.dither);
        }
        let idx = (t * n as f32).floor().clamp(0.0, (n - 1) as f32) as usize;
        self.patterns.get(idx)
    }
}

/// Gradient definition as written in `wedit.toml`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GradientConfig {
    #[serde(default)]
    pub dither: f32,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct GradientRegistry {
    gradients: HashMap<String, Gradient>,
}

impl GradientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured gradient, parsing its patterns.
    pub fn from_configs(configs: &HashMap<String, GradientConfig>, registry: &BlockRegistry) -> Result<Self> {
        let mut out = Self::new();
        for (name, cfg) in configs {
            let patterns = cfg
                .patterns
                .iter()
                .map(|src| Pattern::parse(src, registry))
                .collect::<Result<Vec<_>>>()?;
            out.insert(name.clone(), Gradient::new(cfg.dither, patterns));
        }
        Ok(out)
    }

    pub fn insert(&mut self, name: impl Into<String>, gradient: Gradient) -> Option<Gradient> {
        self.gradients.insert(name.into(), gradient)
    }

    pub fn get(&self, name: &str) -> Option<&Gradient> {
        self.gradients.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Gradient> {
        self.gradients.remove(name)
    }

    pub fn len(&self) -> usize {
        self.gradients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gradients.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.gradients.keys().map(String::as_str)
    }
}

/// Normalised position of `pos` for a gradient of `kind`.
///
/// Without a working range every position maps to 0.
pub(crate) fn position(kind: GradientKind, pos: IVec3, cx: &EvalContext<'_>) -> f32 {
    let p = pos.center();
    match kind {
        GradientKind::Linear => {
            let Some(range) = cx.range else { return 0.0 };
            let f = cx.facing;
            let comps = [f.x, f.y, f.z];
            let mut axis = 0;
            for i in 1..3 {
                if comps[i].abs() > comps[axis].abs() {
                    axis = i;
                }
            }
            let lo = range.min.get(axis) as f32;
            let len = range.size().get(axis).max(1) as f32;
            let along = [p.x, p.y, p.z][axis];
            let t = (along - lo) / len;
            if comps[axis] < 0.0 { 1.0 - t } else { t }
        }
        GradientKind::Radial => {
            let (center, radius) = match cx.radial_override {
                Some(o) => o,
                None => {
                    let bounds = cx.range.map(|r| r.as_aabb());
                    let center = cx
                        .nearest_stroke(p)
                        .or_else(|| bounds.map(|b| b.center()))
                        .unwrap_or(p);
                    (center, bounds.map_or(0.0, |b| b.diagonal() * 0.5))
                }
            };
            if radius <= 0.0 {
                return 0.0;
            }
            (cx.distance)(center, p) / radius
        }
        GradientKind::Lit => {
            let Some(range) = cx.range else { return 0.0 };
            let origin = cx.placement.center();
            let radius = range
                .as_aabb()
                .corners()
                .iter()
                .map(|c| (cx.distance)(origin, *c))
                .fold(0.0f32, f32::max);
            if radius <= 0.0 {
                return 0.0;
            }
            (cx.distance)(origin, p) / radius
        }
    }
}

/// Half-diagonal and centre of a cell box, for gradients nested in blobs.
pub(crate) fn local_radius(min: Vec3, max: Vec3) -> (Vec3, f32) {
    let center = (min + max) * 0.5;
    (center, min.distance(max) * 0.5)
}

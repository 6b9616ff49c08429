//! Per-model fixed-parameter vocabularies.
//!
//! The numeric codes match the bitmask persisted in calibration records so
//! files written by earlier tools keep their meaning.

use serde::{Deserialize, Serialize};

use crate::distortion::{Distortion, PINHOLE_COEFFS, WIDE_ANGLE_COEFFS};

/// Which pinhole parameters are held constant during estimation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PinholeFlags {
    /// Fixed `fx / fy` ratio; `None` lets both focal lengths float.
    pub fix_aspect_ratio: Option<f64>,
    pub fix_principal_point: bool,
    pub zero_tangent_dist: bool,
    /// `k1..k5`, where `k4`/`k5` are the first two rational denominator terms.
    pub fix_k: [bool; 5],
}

impl PinholeFlags {
    pub const USE_INTRINSIC_GUESS: i32 = 1;
    pub const FIX_ASPECT_RATIO: i32 = 2;
    pub const FIX_PRINCIPAL_POINT: i32 = 4;
    pub const ZERO_TANGENT_DIST: i32 = 8;
    pub const FIX_K1: i32 = 32;
    pub const FIX_K2: i32 = 64;
    pub const FIX_K3: i32 = 128;
    pub const FIX_K4: i32 = 2048;
    pub const FIX_K5: i32 = 4096;
    /// Solver hint; never persisted.
    pub const USE_LU: i32 = 1 << 17;

    const FIX_K: [i32; 5] = [
        Self::FIX_K1,
        Self::FIX_K2,
        Self::FIX_K3,
        Self::FIX_K4,
        Self::FIX_K5,
    ];

    pub fn bits(&self) -> i32 {
        let mut bits = 0;
        if self.fix_aspect_ratio.is_some() {
            bits |= Self::FIX_ASPECT_RATIO;
        }
        if self.fix_principal_point {
            bits |= Self::FIX_PRINCIPAL_POINT;
        }
        if self.zero_tangent_dist {
            bits |= Self::ZERO_TANGENT_DIST;
        }
        for (fixed, code) in self.fix_k.iter().zip(Self::FIX_K) {
            if *fixed {
                bits |= code;
            }
        }
        bits
    }

    pub fn annotation(&self) -> String {
        let bits = self.bits();
        let mut out = String::from("flags:");
        for (code, label) in [
            (Self::USE_INTRINSIC_GUESS, " +use_intrinsic_guess"),
            (Self::FIX_ASPECT_RATIO, " +fix_aspectRatio"),
            (Self::FIX_PRINCIPAL_POINT, " +fix_principal_point"),
            (Self::ZERO_TANGENT_DIST, " +zero_tangent_dist"),
            (Self::FIX_K1, " +fix_k1"),
            (Self::FIX_K2, " +fix_k2"),
            (Self::FIX_K3, " +fix_k3"),
            (Self::FIX_K4, " +fix_k4"),
            (Self::FIX_K5, " +fix_k5"),
        ] {
            if bits & code != 0 {
                out.push_str(label);
            }
        }
        out
    }

    /// Per-coefficient "held constant" mask over `[k1, k2, p1, p2, k3, k4, k5, k6]`.
    ///
    /// The rational terms `k4..k6` are always held at their initial zero;
    /// `FIX_K4`/`FIX_K5` only change the persisted bitmask.
    pub fn distortion_mask(&self) -> [bool; PINHOLE_COEFFS] {
        [
            self.fix_k[0],
            self.fix_k[1],
            self.zero_tangent_dist,
            self.zero_tangent_dist,
            self.fix_k[2],
            true,
            true,
            true,
        ]
    }
}

/// Which wide-angle parameters are held constant during estimation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WideAngleFlags {
    pub fix_principal_point: bool,
    pub fix_k: [bool; 4],
}

impl WideAngleFlags {
    pub const USE_INTRINSIC_GUESS: i32 = 1;
    pub const RECOMPUTE_EXTRINSIC: i32 = 2;
    pub const FIX_SKEW: i32 = 8;
    pub const FIX_K1: i32 = 16;
    pub const FIX_K2: i32 = 32;
    pub const FIX_K3: i32 = 64;
    pub const FIX_K4: i32 = 128;
    pub const FIX_PRINCIPAL_POINT: i32 = 512;

    const FIX_K: [i32; 4] = [Self::FIX_K1, Self::FIX_K2, Self::FIX_K3, Self::FIX_K4];

    pub fn bits(&self) -> i32 {
        let mut bits = Self::FIX_SKEW | Self::RECOMPUTE_EXTRINSIC;
        for (fixed, code) in self.fix_k.iter().zip(Self::FIX_K) {
            if *fixed {
                bits |= code;
            }
        }
        if self.fix_principal_point {
            bits |= Self::FIX_PRINCIPAL_POINT;
        }
        bits
    }

    pub fn annotation(&self) -> String {
        let bits = self.bits();
        let mut out = String::from("flags:");
        for (code, label) in [
            (Self::FIX_SKEW, " +fix_skew"),
            (Self::FIX_K1, " +fix_k1"),
            (Self::FIX_K2, " +fix_k2"),
            (Self::FIX_K3, " +fix_k3"),
            (Self::FIX_K4, " +fix_k4"),
            (Self::RECOMPUTE_EXTRINSIC, " +recompute_extrinsic"),
        ] {
            if bits & code != 0 {
                out.push_str(label);
            }
        }
        out
    }

    pub fn distortion_mask(&self) -> [bool; WIDE_ANGLE_COEFFS] {
        self.fix_k
    }
}

/// Camera model family together with its fixed-parameter vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelVariant {
    Pinhole(PinholeFlags),
    WideAngle(WideAngleFlags),
}

impl ModelVariant {
    pub fn coefficient_count(&self) -> usize {
        match self {
            ModelVariant::Pinhole(_) => PINHOLE_COEFFS,
            ModelVariant::WideAngle(_) => WIDE_ANGLE_COEFFS,
        }
    }

    pub fn is_wide_angle(&self) -> bool {
        matches!(self, ModelVariant::WideAngle(_))
    }

    /// Object-point release with a fixed reference point is pinhole-only.
    pub fn supports_fixed_point(&self) -> bool {
        matches!(self, ModelVariant::Pinhole(_))
    }

    pub fn zero_distortion(&self) -> Distortion {
        match self {
            ModelVariant::Pinhole(_) => Distortion::zero_pinhole(),
            ModelVariant::WideAngle(_) => Distortion::zero_wide_angle(),
        }
    }

    pub fn flag_bits(&self) -> i32 {
        match self {
            ModelVariant::Pinhole(f) => f.bits(),
            ModelVariant::WideAngle(f) => f.bits(),
        }
    }

    /// Human readable flag list, `None` when no flag is set.
    pub fn flag_annotation(&self) -> Option<String> {
        if self.flag_bits() == 0 {
            return None;
        }
        Some(match self {
            ModelVariant::Pinhole(f) => f.annotation(),
            ModelVariant::WideAngle(f) => f.annotation(),
        })
    }

    pub fn fix_principal_point(&self) -> bool {
        match self {
            ModelVariant::Pinhole(f) => f.fix_principal_point,
            ModelVariant::WideAngle(f) => f.fix_principal_point,
        }
    }

    pub fn fixed_aspect_ratio(&self) -> Option<f64> {
        match self {
            ModelVariant::Pinhole(f) => f.fix_aspect_ratio,
            ModelVariant::WideAngle(_) => None,
        }
    }

    pub fn distortion_mask(&self) -> Vec<bool> {
        match self {
            ModelVariant::Pinhole(f) => f.distortion_mask().to_vec(),
            ModelVariant::WideAngle(f) => f.distortion_mask().to_vec(),
        }
    }
}

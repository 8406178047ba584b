//! Unit newtypes for capacities.
//!
//! Nameplate ratings in a multi-carrier model come in three flavours: active
//! power of generators and links (MW), apparent power of AC lines (MVA) and
//! energy content of stores (MWh). Keeping them apart catches the classic
//! mistake of comparing a store's energy capacity against a link's rating.
//!
//! ```
//! use ies_core::units::{Megawatts, MegawattHours};
//!
//! let rating = Megawatts(20.0);
//! let energy: MegawattHours = rating.over_hours(6.0);
//! assert_eq!(energy, MegawattHours(120.0));
//! ```

use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Sub};

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<$type> for $type {
            type Output = f64;
            fn div(self, rhs: $type) -> Self::Output {
                self.0 / rhs.0
            }
        }

        impl Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|v| v.0).sum())
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.3} {}", self.0, $unit_name)
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }

            /// Finite value, or `cap` when the rating is unbounded.
            #[inline]
            pub fn finite_or(self, cap: f64) -> f64 {
                if self.0.is_finite() {
                    self.0
                } else {
                    cap
                }
            }
        }
    };
}

/// Active power rating.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megawatts(pub f64);

/// Apparent power rating of an AC line.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MegavoltAmperes(pub f64);

/// Energy content of a store.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MegawattHours(pub f64);

impl_unit_ops!(Megawatts, "MW");
impl_unit_ops!(MegavoltAmperes, "MVA");
impl_unit_ops!(MegawattHours, "MWh");

impl Megawatts {
    /// Energy delivered at this rating over `hours`.
    pub fn over_hours(self, hours: f64) -> MegawattHours {
        MegawattHours(self.0 * hours)
    }
}

impl From<MegavoltAmperes> for Megawatts {
    /// DC approximation: unity power factor.
    fn from(s: MegavoltAmperes) -> Self {
        Megawatts(s.0)
    }
}

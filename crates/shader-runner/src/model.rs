//! Shader models, model masks and compile-variant selection
//!
//! Shader models form an ordered list of capability tiers. Qualifier
//! expressions restrict directives to subsets of that list, represented as a
//! [`ModelMask`], and compile-only runs use [`select_variants`] to avoid
//! compiling every shader at every model.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An HLSL shader model, ordered from oldest to newest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderModel {
    Sm2_0,
    Sm3_0,
    Sm4_0,
    Sm4_1,
    Sm5_0,
    Sm5_1,
    Sm6_0,
    Sm6_2,
}

impl ShaderModel {
    /// Number of known shader models
    pub const COUNT: usize = 8;

    /// Every known shader model in ascending order
    pub const ALL: [ShaderModel; Self::COUNT] = [
        ShaderModel::Sm2_0,
        ShaderModel::Sm3_0,
        ShaderModel::Sm4_0,
        ShaderModel::Sm4_1,
        ShaderModel::Sm5_0,
        ShaderModel::Sm5_1,
        ShaderModel::Sm6_0,
        ShaderModel::Sm6_2,
    ];

    /// The oldest known shader model
    pub const MIN: ShaderModel = ShaderModel::Sm2_0;
    /// The newest known shader model
    pub const MAX: ShaderModel = ShaderModel::Sm6_2;

    /// First model of the SM4/5 era
    pub const FIRST_SM4: ShaderModel = ShaderModel::Sm4_0;
    /// First model of the SM6 era
    pub const FIRST_SM6: ShaderModel = ShaderModel::Sm6_0;

    /// Ordinal of this model, usable as a bit index in a [`ModelMask`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns the model with the given ordinal
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the next older model, if any
    pub fn prev(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    /// Returns the next newer model, if any
    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// Major and minor version numbers
    pub fn version(self) -> (u32, u32) {
        match self {
            ShaderModel::Sm2_0 => (2, 0),
            ShaderModel::Sm3_0 => (3, 0),
            ShaderModel::Sm4_0 => (4, 0),
            ShaderModel::Sm4_1 => (4, 1),
            ShaderModel::Sm5_0 => (5, 0),
            ShaderModel::Sm5_1 => (5, 1),
            ShaderModel::Sm6_0 => (6, 0),
            ShaderModel::Sm6_2 => (6, 2),
        }
    }

    /// Whether this model predates SM4
    pub fn is_legacy(self) -> bool {
        self < Self::FIRST_SM4
    }

    /// Whether this model belongs to the SM4/5 era
    pub fn is_sm4_5(self) -> bool {
        self >= Self::FIRST_SM4 && self < Self::FIRST_SM6
    }

    /// Whether this model belongs to the SM6 era
    pub fn is_sm6(self) -> bool {
        self >= Self::FIRST_SM6
    }
}

impl FromStr for ShaderModel {
    type Err = ShaderModelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (s, "0"),
        };

        let major = major.parse::<u32>().map_err(|_| ShaderModelParseError::InvalidFormat)?;
        let minor = minor.parse::<u32>().map_err(|_| ShaderModelParseError::InvalidFormat)?;

        Self::ALL
            .iter()
            .copied()
            .find(|model| model.version() == (major, minor))
            .ok_or(ShaderModelParseError::UnknownModel(major, minor))
    }
}

impl fmt::Display for ShaderModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor) = self.version();
        write!(f, "{major}.{minor}")
    }
}

impl Serialize for ShaderModel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ShaderModel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error types for shader model parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderModelParseError {
    /// The text is not of the form "N" or "N.M"
    InvalidFormat,
    /// The version is well-formed but not a known shader model
    UnknownModel(u32, u32),
}

impl fmt::Display for ShaderModelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat => write!(f, "Invalid shader model format"),
            Self::UnknownModel(major, minor) => write!(f, "Unknown shader model {major}.{minor}"),
        }
    }
}

impl std::error::Error for ShaderModelParseError {}

/// A set of shader models, one bit per model ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModelMask(u32);

impl ModelMask {
    /// No models
    pub const EMPTY: ModelMask = ModelMask(0);
    /// Every known model
    pub const ALL: ModelMask = ModelMask((1 << ShaderModel::COUNT) - 1);

    /// Builds a mask from raw bits, discarding bits beyond the known models
    pub fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Raw bits of the mask
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Mask containing only the given model
    pub fn only(model: ShaderModel) -> Self {
        Self(1 << model.index())
    }

    /// Mask of every model at or above `model`
    pub fn at_least(model: ShaderModel) -> Self {
        Self(Self::ALL.0 & !((1 << model.index()) - 1))
    }

    /// Mask of every model strictly below `model`
    pub fn below(model: ShaderModel) -> Self {
        Self((1 << model.index()) - 1)
    }

    /// Whether the mask contains `model`
    pub fn contains(self, model: ShaderModel) -> bool {
        self.0 & (1 << model.index()) != 0
    }

    /// Whether the mask contains no models
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Models in ascending order
    pub fn iter(self) -> impl Iterator<Item = ShaderModel> {
        ShaderModel::ALL.into_iter().filter(move |model| self.contains(*model))
    }
}

impl std::ops::BitAnd for ModelMask {
    type Output = ModelMask;

    fn bitand(self, rhs: Self) -> Self::Output {
        ModelMask(self.0 & rhs.0)
    }
}

impl std::ops::BitAndAssign for ModelMask {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl std::ops::BitOr for ModelMask {
    type Output = ModelMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        ModelMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ModelMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A value stored per shader model, indexed by model ordinal
pub type PerModel<T> = [T; ShaderModel::COUNT];

/// Selects the shader models worth compiling in compile-only mode
///
/// Behaviour is piecewise constant across model eras, so compiling every
/// model in `[min, max]` is redundant. The selection keeps `min`, both sides
/// of every change in `expected`, and one representative of each era the
/// range reaches.
///
/// # Arguments
/// * `min` - Lowest model of the range
/// * `max` - Highest model of the range
/// * `expected` - Expected compile result for every model
///
/// # Returns
/// The selected models in ascending order; empty if `max < min`
pub fn select_variants<T: PartialEq>(min: ShaderModel, max: ShaderModel, expected: &PerModel<T>) -> Vec<ShaderModel> {
    if max < min {
        return Vec::new();
    }

    let mut selected = ModelMask::only(min);

    // Both sides of every behaviour change
    let mut previous = min;
    while let Some(model) = previous.next().filter(|model| *model <= max) {
        if expected[previous.index()] != expected[model.index()] {
            selected |= ModelMask::only(previous) | ModelMask::only(model);
        }
        previous = model;
    }

    if !selected.iter().any(ShaderModel::is_legacy) && min.is_legacy() {
        selected |= ModelMask::only(min);
    }

    if !selected.iter().any(ShaderModel::is_sm4_5) && max >= ShaderModel::FIRST_SM4 && min < ShaderModel::FIRST_SM6 {
        selected |= ModelMask::only(min.max(ShaderModel::FIRST_SM4));
    }

    if max >= ShaderModel::FIRST_SM6 {
        selected |= ModelMask::only(min.max(ShaderModel::FIRST_SM6));
    }

    selected.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_model_parsing() {
        assert_eq!("4.0".parse::<ShaderModel>().unwrap(), ShaderModel::Sm4_0);
        assert_eq!("4.1".parse::<ShaderModel>().unwrap(), ShaderModel::Sm4_1);
        assert_eq!("6".parse::<ShaderModel>().unwrap(), ShaderModel::Sm6_0);
        assert_eq!("6.2".parse::<ShaderModel>().unwrap(), ShaderModel::Sm6_2);

        assert_eq!("6.1".parse::<ShaderModel>(), Err(ShaderModelParseError::UnknownModel(6, 1)));
        assert_eq!("sm6".parse::<ShaderModel>(), Err(ShaderModelParseError::InvalidFormat));
        assert_eq!(ShaderModel::Sm5_1.to_string(), "5.1");
    }

    #[test]
    fn test_model_eras() {
        assert!(ShaderModel::Sm3_0.is_legacy());
        assert!(ShaderModel::Sm4_0.is_sm4_5());
        assert!(ShaderModel::Sm5_1.is_sm4_5());
        assert!(ShaderModel::Sm6_0.is_sm6());
        assert_eq!(ShaderModel::MIN.prev(), None);
        assert_eq!(ShaderModel::MAX.next(), None);
    }

    #[test]
    fn test_model_masks() {
        let mask = ModelMask::at_least(ShaderModel::Sm5_0);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![ShaderModel::Sm5_0, ShaderModel::Sm5_1, ShaderModel::Sm6_0, ShaderModel::Sm6_2]);

        let mask = ModelMask::below(ShaderModel::Sm4_0);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![ShaderModel::Sm2_0, ShaderModel::Sm3_0]);

        assert_eq!(ModelMask::at_least(ShaderModel::MIN), ModelMask::ALL);
        assert!(ModelMask::below(ShaderModel::MIN).is_empty());
        assert_eq!(ModelMask::from_bits(u32::MAX), ModelMask::ALL);
    }

    #[test]
    fn test_uniform_expectations_select_one_model_per_era() {
        let expected = [0u32; ShaderModel::COUNT];
        let selected = select_variants(ShaderModel::MIN, ShaderModel::MAX, &expected);
        assert_eq!(selected, vec![ShaderModel::Sm2_0, ShaderModel::Sm4_0, ShaderModel::Sm6_0]);
    }

    #[test]
    fn test_behaviour_changes_are_selected() {
        let mut expected = [false; ShaderModel::COUNT];
        expected[ShaderModel::Sm5_0.index()] = true;
        expected[ShaderModel::Sm5_1.index()] = true;
        expected[ShaderModel::Sm6_0.index()] = true;
        expected[ShaderModel::Sm6_2.index()] = true;

        let selected = select_variants(ShaderModel::Sm4_0, ShaderModel::MAX, &expected);
        assert_eq!(selected, vec![ShaderModel::Sm4_0, ShaderModel::Sm4_1, ShaderModel::Sm5_0, ShaderModel::Sm6_0]);
    }

    #[test]
    fn test_restricted_ranges() {
        let expected = [(); ShaderModel::COUNT];

        assert_eq!(select_variants(ShaderModel::Sm6_0, ShaderModel::Sm6_2, &expected), vec![ShaderModel::Sm6_0]);
        assert_eq!(select_variants(ShaderModel::Sm2_0, ShaderModel::Sm3_0, &expected), vec![ShaderModel::Sm2_0]);
        assert_eq!(select_variants(ShaderModel::Sm4_1, ShaderModel::Sm6_2, &expected), vec![ShaderModel::Sm4_1, ShaderModel::Sm6_0]);
        assert!(select_variants(ShaderModel::Sm6_0, ShaderModel::Sm4_0, &expected).is_empty());
    }
}

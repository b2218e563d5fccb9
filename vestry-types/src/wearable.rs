//! Wearable classification and capacity limits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of simultaneously worn clothing-layer items.
pub const MAX_CLOTHING_LAYERS: usize = 60;

/// Maximum number of simultaneously attached objects.
pub const MAX_ATTACHED_OBJECTS: usize = 38;

/// Maximum parent-chain depth walked when testing containment.
pub const MAX_ANCESTOR_DEPTH: usize = 255;

/// What slot a wearable occupies on the avatar.
///
/// The four body-part types are mandatory: a valid outfit wears exactly
/// one of each. Clothing types stack, up to [`MAX_CLOTHING_LAYERS`]
/// across all types combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WearableType {
    // Mandatory body parts
    Shape,
    Skin,
    Hair,
    Eyes,
    // Clothing layers
    Shirt,
    Pants,
    Shoes,
    Socks,
    Jacket,
    Gloves,
    Undershirt,
    Underpants,
    Skirt,
    Alpha,
    Tattoo,
    Physics,
}

/// The body-part types every outfit must fill.
pub const MANDATORY_BODY_PARTS: [WearableType; 4] = [
    WearableType::Shape,
    WearableType::Skin,
    WearableType::Hair,
    WearableType::Eyes,
];

impl WearableType {
    /// Whether this type is a mandatory body part (one-per-type,
    /// never detachable).
    #[must_use]
    pub fn is_body_part(&self) -> bool {
        matches!(
            self,
            WearableType::Shape | WearableType::Skin | WearableType::Hair | WearableType::Eyes
        )
    }

    /// All known wearable types, body parts first.
    pub fn all() -> &'static [WearableType] {
        use WearableType::*;
        &[
            Shape, Skin, Hair, Eyes, Shirt, Pants, Shoes, Socks, Jacket, Gloves, Undershirt,
            Underpants, Skirt, Alpha, Tattoo, Physics,
        ]
    }
}

impl fmt::Display for WearableType {
    // Matches the serde snake_case form (no multi-word variants).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = format!("{self:?}").to_lowercase();
        write!(f, "{s}")
    }
}

/// A named avatar attachment point (chest, left hand, HUD slots, ...).
///
/// The engine only compares points for equality; the numbering is the
/// server's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachPoint(pub u8);

/// "Wherever it was last attached" sentinel.
pub const ATTACH_DEFAULT: AttachPoint = AttachPoint(0);

impl fmt::Display for AttachPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attach[{}]", self.0)
    }
}

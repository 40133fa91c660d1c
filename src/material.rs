use serde::{Deserialize, Serialize};

use crate::foundation::core::unit_interval;

/// Texture slots a material can reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Albedo,
    Metalness,
    Detail,
    Emissive,
}

impl TextureSlot {
    /// All slots, in persistence order.
    pub const ALL: [TextureSlot; 4] = [
        TextureSlot::Albedo,
        TextureSlot::Metalness,
        TextureSlot::Detail,
        TextureSlot::Emissive,
    ];

    /// Stable key used in CSV headers and on the command line.
    pub fn key(self) -> &'static str {
        match self {
            TextureSlot::Albedo => "albedo_map",
            TextureSlot::Metalness => "metalness_map",
            TextureSlot::Detail => "detail_map",
            TextureSlot::Emissive => "emissive_map",
        }
    }

    /// Inverse of [`TextureSlot::key`]; also accepts the bare slot name (`albedo`).
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        let bare = key.strip_suffix("_map").unwrap_or(&key);
        match bare {
            "albedo" => Some(TextureSlot::Albedo),
            "metalness" => Some(TextureSlot::Metalness),
            "detail" => Some(TextureSlot::Detail),
            "emissive" | "emmissive" => Some(TextureSlot::Emissive),
            _ => None,
        }
    }
}

/// One authored PBR material.
///
/// `name` is unique within a project and doubles as the key of the material's folder.
/// Texture references are project-relative paths; an empty string means "no texture".
/// Serialized column names follow the established `materials.csv` layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    pub albedo_r: f32,
    pub albedo_g: f32,
    pub albedo_b: f32,
    #[serde(rename = "smoothness_multiplier", alias = "smoothness")]
    pub smoothness: f32,
    #[serde(rename = "metalness_multiplier", alias = "metalness")]
    pub metalness: f32,
    #[serde(default)]
    pub albedo_map: String,
    #[serde(default)]
    pub metalness_map: String,
    #[serde(default)]
    pub detail_map: String,
    #[serde(default, rename = "emmissive_map", alias = "emissive_map")]
    pub emissive_map: String,
}

impl Material {
    /// A new material with white albedo, half smoothness, no metalness and no textures.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            albedo_r: 1.0,
            albedo_g: 1.0,
            albedo_b: 1.0,
            smoothness: 0.5,
            metalness: 0.0,
            albedo_map: String::new(),
            metalness_map: String::new(),
            detail_map: String::new(),
            emissive_map: String::new(),
        }
    }

    pub fn albedo(&self) -> [f32; 3] {
        [self.albedo_r, self.albedo_g, self.albedo_b]
    }

    pub fn set_albedo(&mut self, rgb: [f32; 3]) {
        self.albedo_r = unit_interval(rgb[0]);
        self.albedo_g = unit_interval(rgb[1]);
        self.albedo_b = unit_interval(rgb[2]);
    }

    pub fn set_smoothness(&mut self, v: f32) {
        self.smoothness = unit_interval(v);
    }

    pub fn set_metalness(&mut self, v: f32) {
        self.metalness = unit_interval(v);
    }

    pub fn texture(&self, slot: TextureSlot) -> &str {
        match slot {
            TextureSlot::Albedo => &self.albedo_map,
            TextureSlot::Metalness => &self.metalness_map,
            TextureSlot::Detail => &self.detail_map,
            TextureSlot::Emissive => &self.emissive_map,
        }
    }

    pub fn set_texture(&mut self, slot: TextureSlot, path: impl Into<String>) {
        let path = path.into();
        match slot {
            TextureSlot::Albedo => self.albedo_map = path,
            TextureSlot::Metalness => self.metalness_map = path,
            TextureSlot::Detail => self.detail_map = path,
            TextureSlot::Emissive => self.emissive_map = path,
        }
    }

    /// Clamp every scalar back into `[0, 1]` (used after loading untrusted rows).
    pub fn sanitize(&mut self) {
        self.set_albedo(self.albedo());
        self.set_smoothness(self.smoothness);
        self.set_metalness(self.metalness);
    }
}

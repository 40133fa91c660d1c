//! Text formats of the mailbox files.
//!
//! All tuples are comma-separated with no escaping, so neither paths nor names may contain the
//! delimiter. Encoders refuse such values instead of writing a tuple the reader would misparse.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::foundation::error::{SwatchError, SwatchResult};

const DELIM: char = ',';
const REQUIRED_FIELDS: usize = 5;
const MAX_FIELDS: usize = 7;

/// Scalar/path tuple the daemon applies to its preview material.
///
/// Wire form: `r,g,b,smoothness,metalness[,albedo_map[,metalness_map]]`.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialParams {
    pub albedo: [f32; 3],
    pub smoothness: f32,
    pub metalness: f32,
    pub albedo_map: Option<PathBuf>,
    pub metalness_map: Option<PathBuf>,
}

impl MaterialParams {
    /// Params without texture maps.
    pub fn solid(albedo: [f32; 3], smoothness: f32, metalness: f32) -> Self {
        Self {
            albedo,
            smoothness,
            metalness,
            albedo_map: None,
            metalness_map: None,
        }
    }

    /// Encode into the wire tuple. Trailing empty map fields are omitted.
    pub fn encode(&self) -> SwatchResult<String> {
        let scalars = [
            ("r", self.albedo[0]),
            ("g", self.albedo[1]),
            ("b", self.albedo[2]),
            ("smoothness", self.smoothness),
            ("metalness", self.metalness),
        ];
        let mut fields = Vec::with_capacity(MAX_FIELDS);
        for (label, v) in scalars {
            check_unit(label, v).map_err(|e| SwatchError::validation(e.to_string()))?;
            fields.push(v.to_string());
        }

        let albedo = encode_path("albedo_map", self.albedo_map.as_deref())?;
        let metalness = encode_path("metalness_map", self.metalness_map.as_deref())?;
        if !metalness.is_empty() {
            fields.push(albedo);
            fields.push(metalness);
        } else if !albedo.is_empty() {
            fields.push(albedo);
        }

        Ok(fields.join(","))
    }

    /// Parse a wire tuple. Short tuples (5 or 6 fields) are valid; missing maps mean "none".
    pub fn parse(s: &str) -> SwatchResult<Self> {
        let fields: Vec<&str> = s.trim().split(DELIM).map(str::trim).collect();
        if fields.len() < REQUIRED_FIELDS || fields.len() > MAX_FIELDS {
            return Err(SwatchError::malformed(format!(
                "material config has {} fields, expected {REQUIRED_FIELDS}..={MAX_FIELDS}: '{}'",
                fields.len(),
                s.trim()
            )));
        }

        let mut scalars = [0.0f32; REQUIRED_FIELDS];
        let labels = ["r", "g", "b", "smoothness", "metalness"];
        for (i, label) in labels.iter().enumerate() {
            let v = parse_float(label, fields[i])?;
            check_unit(label, v)?;
            scalars[i] = v;
        }

        let map_at = |i: usize| -> Option<PathBuf> {
            fields
                .get(i)
                .filter(|f| !f.is_empty())
                .map(|f| PathBuf::from(*f))
        };

        Ok(Self {
            albedo: [scalars[0], scalars[1], scalars[2]],
            smoothness: scalars[3],
            metalness: scalars[4],
            albedo_map: map_at(5),
            metalness_map: map_at(6),
        })
    }
}

/// Built-in preview shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    Sphere,
    Cube,
    Cylinder,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Sphere => "sphere",
            Primitive::Cube => "cube",
            Primitive::Cylinder => "cylinder",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sphere" => Some(Primitive::Sphere),
            "cube" => Some(Primitive::Cube),
            "cylinder" => Some(Primitive::Cylinder),
            _ => None,
        }
    }
}

/// What the daemon puts in front of the camera.
///
/// Wire form: `primitive:<sphere|cube|cylinder>` or a bare filename of an asset copied into the
/// mailbox `preview_model/` directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PreviewModel {
    Primitive(Primitive),
    Asset(String),
}

impl Default for PreviewModel {
    fn default() -> Self {
        PreviewModel::Primitive(Primitive::Sphere)
    }
}

impl PreviewModel {
    const PRIMITIVE_PREFIX: &'static str = "primitive:";

    pub fn encode(&self) -> String {
        match self {
            PreviewModel::Primitive(p) => format!("{}{}", Self::PRIMITIVE_PREFIX, p.name()),
            PreviewModel::Asset(file) => file.clone(),
        }
    }

    pub fn parse(s: &str) -> SwatchResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SwatchError::malformed("empty preview model descriptor"));
        }
        if let Some(name) = s.strip_prefix(Self::PRIMITIVE_PREFIX) {
            return Primitive::from_name(name)
                .map(PreviewModel::Primitive)
                .ok_or_else(|| SwatchError::malformed(format!("unknown primitive '{name}'")));
        }
        if s == "." || s == ".." || s.contains(['/', '\\']) {
            return Err(SwatchError::malformed(format!(
                "preview model must be a bare filename, got '{s}'"
            )));
        }
        Ok(PreviewModel::Asset(s.to_string()))
    }
}

impl TryFrom<String> for PreviewModel {
    type Error = SwatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PreviewModel::parse(&value)
    }
}

impl From<PreviewModel> for String {
    fn from(value: PreviewModel) -> Self {
        value.encode()
    }
}

/// Camera placement and key-light angle.
///
/// Wire form: `camera_x,camera_y,camera_z,light_rotation_degrees`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub light_rotation_deg: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, -2.5, 2.0],
            light_rotation_deg: 45.0,
        }
    }
}

impl CameraConfig {
    pub fn encode(&self) -> String {
        format!(
            "{},{},{},{}",
            self.position[0], self.position[1], self.position[2], self.light_rotation_deg
        )
    }

    pub fn parse(s: &str) -> SwatchResult<Self> {
        let fields: Vec<&str> = s.trim().split(DELIM).map(str::trim).collect();
        if fields.len() != 4 {
            return Err(SwatchError::malformed(format!(
                "camera config has {} fields, expected 4",
                fields.len()
            )));
        }
        let x = parse_float("camera_x", fields[0])?;
        let y = parse_float("camera_y", fields[1])?;
        let z = parse_float("camera_z", fields[2])?;
        let light = parse_float("light_rotation", fields[3])?;
        if x == 0.0 && y == 0.0 && z == 0.0 {
            return Err(SwatchError::malformed("camera cannot sit at the origin"));
        }
        Ok(Self {
            position: [x, y, z],
            light_rotation_deg: light,
        })
    }
}

fn parse_float(label: &str, field: &str) -> SwatchResult<f32> {
    let v: f32 = field
        .parse()
        .map_err(|_| SwatchError::malformed(format!("{label}: '{field}' is not a number")))?;
    if !v.is_finite() {
        return Err(SwatchError::malformed(format!("{label}: '{field}' is not finite")));
    }
    Ok(v)
}

fn check_unit(label: &str, v: f32) -> SwatchResult<()> {
    if !(0.0..=1.0).contains(&v) {
        return Err(SwatchError::malformed(format!(
            "{label}: {v} is outside [0, 1]"
        )));
    }
    Ok(())
}

fn encode_path(label: &str, path: Option<&Path>) -> SwatchResult<String> {
    let Some(path) = path else {
        return Ok(String::new());
    };
    let s = path.to_str().ok_or_else(|| {
        SwatchError::validation(format!("{label}: path '{}' is not UTF-8", path.display()))
    })?;
    if s.contains(DELIM) || s.contains(['\n', '\r']) {
        return Err(SwatchError::validation(format!(
            "{label}: path '{s}' contains the mailbox delimiter and cannot be sent to the renderer"
        )));
    }
    Ok(s.to_string())
}

#[cfg(test)]
#[path = "../../tests/unit/ipc/wire.rs"]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{SwatchError, SwatchResult};
use crate::ipc::wire::MaterialParams;
use crate::material::{Material, TextureSlot};
use crate::project::{MATERIALS_DIR, ProjectLayout, TEXTURES_DIR};

/// Ordered material list of one project.
#[derive(Clone, Debug)]
pub struct MaterialStore {
    layout: ProjectLayout,
    materials: Vec<Material>,
}

/// Reject names that cannot serve as a folder key.
pub fn validate_name(name: &str) -> SwatchResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SwatchError::validation("material name must not be empty"));
    }
    if trimmed != name {
        return Err(SwatchError::validation(format!(
            "material name '{name}' has leading or trailing whitespace"
        )));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', ',', '\n', '\r']) {
        return Err(SwatchError::validation(format!(
            "material name '{name}' cannot be used as a folder name"
        )));
    }
    Ok(())
}

/// `reference` moved from under `old_prefix` to under `new_prefix`, if it pointed there.
fn migrate_reference(reference: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    let reference = reference.replace('\\', "/");
    reference
        .strip_prefix(old_prefix)
        .map(|rest| format!("{new_prefix}{rest}"))
}

impl MaterialStore {
    /// An empty store.
    pub fn new(layout: ProjectLayout) -> Self {
        Self {
            layout,
            materials: Vec::new(),
        }
    }

    /// Load `materials.csv` if present, otherwise start empty.
    pub fn open(layout: ProjectLayout) -> SwatchResult<Self> {
        let mut store = Self::new(layout);
        if store.layout.store_path().exists() {
            store.load_csv()?;
        }
        Ok(store)
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.materials.iter().map(|m| m.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Material> {
        self.materials.iter_mut().find(|m| m.name == name)
    }

    /// Like [`Self::get`], failing with `Validation` for unknown names.
    pub fn require(&self, name: &str) -> SwatchResult<&Material> {
        self.get(name)
            .ok_or_else(|| SwatchError::validation(format!("unknown material '{name}'")))
    }

    pub fn require_mut(&mut self, name: &str) -> SwatchResult<&mut Material> {
        self.get_mut(name)
            .ok_or_else(|| SwatchError::validation(format!("unknown material '{name}'")))
    }

    /// Add a material with default values and return its name.
    ///
    /// Without a name, the first free `Material_<n>` (starting at the current count) is used.
    pub fn add(&mut self, name: Option<&str>) -> SwatchResult<String> {
        let name = match name {
            Some(name) => {
                validate_name(name)?;
                if self.contains(name) {
                    return Err(SwatchError::validation(format!(
                        "material '{name}' already exists"
                    )));
                }
                name.to_string()
            }
            None => {
                let mut n = self.materials.len();
                loop {
                    let candidate = format!("Material_{n}");
                    if !self.contains(&candidate) {
                        break candidate;
                    }
                    n += 1;
                }
            }
        };
        self.materials.push(Material::new(name.clone()));
        tracing::info!(material = %name, "material added");
        Ok(name)
    }

    /// Rename a material and migrate its folder.
    ///
    /// Texture references that point into the old folder are rewritten to the new one. Fails
    /// with `Validation` for unknown or duplicate names and leaves everything unchanged.
    pub fn rename(&mut self, old: &str, new: &str) -> SwatchResult<()> {
        if old == new {
            return Ok(());
        }
        validate_name(new)?;
        if self.contains(new) {
            return Err(SwatchError::validation(format!(
                "material '{new}' already exists"
            )));
        }
        self.require(old)?;

        let from = self.layout.material_dir(old);
        let to = self.layout.material_dir(new);
        if from.exists() {
            if to.exists() {
                return Err(SwatchError::validation(format!(
                    "folder '{}' already exists",
                    to.display()
                )));
            }
            fs::rename(&from, &to)
                .with_context(|| format!("rename '{}' -> '{}'", from.display(), to.display()))?;
        }

        let old_prefix = format!("{MATERIALS_DIR}/{old}/");
        let new_prefix = format!("{MATERIALS_DIR}/{new}/");
        let mat = self.require_mut(old)?;
        mat.name = new.to_string();
        for slot in TextureSlot::ALL {
            if let Some(moved) = migrate_reference(mat.texture(slot), &old_prefix, &new_prefix) {
                mat.set_texture(slot, moved);
            }
        }
        self.migrate_material_config(new, &old_prefix, &new_prefix)?;
        tracing::info!(from = %old, to = %new, "material renamed");
        Ok(())
    }

    /// Point the texture paths of a moved per-material config copy at the new folder.
    ///
    /// Only the references change; the stored values stay as they were last saved.
    fn migrate_material_config(
        &self,
        name: &str,
        old_prefix: &str,
        new_prefix: &str,
    ) -> SwatchResult<()> {
        let path = self.layout.material_config_path(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "material config unreadable");
                return Ok(());
            }
        };
        let mut params = match MaterialParams::parse(&raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "material config left as is");
                return Ok(());
            }
        };

        let mut changed = false;
        for map in [&mut params.albedo_map, &mut params.metalness_map] {
            let moved = map
                .as_deref()
                .and_then(|p| migrate_reference(&p.display().to_string(), old_prefix, new_prefix));
            if let Some(moved) = moved {
                *map = Some(PathBuf::from(moved));
                changed = true;
            }
        }
        if changed {
            let line = params.encode()?;
            fs::write(&path, line).with_context(|| format!("write '{}'", path.display()))?;
            tracing::debug!(material = %name, path = %path.display(), "material config migrated");
        }
        Ok(())
    }

    /// Copy `src` into the material's texture folder and reference it from `slot`.
    ///
    /// Returns the stored project-relative path.
    pub fn import_texture(
        &mut self,
        name: &str,
        slot: TextureSlot,
        src: &Path,
    ) -> SwatchResult<String> {
        self.require(name)?;
        let file_name = src
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SwatchError::validation(format!("'{}' has no usable file name", src.display()))
            })?
            .to_string();
        if file_name.contains([',', '\n', '\r']) {
            return Err(SwatchError::validation(format!(
                "texture file name '{file_name}' contains a delimiter character"
            )));
        }

        let dir = self.layout.material_textures_dir(name);
        fs::create_dir_all(&dir).with_context(|| format!("create '{}'", dir.display()))?;
        let dest = dir.join(&file_name);
        fs::copy(src, &dest)
            .with_context(|| format!("copy '{}' -> '{}'", src.display(), dest.display()))?;

        let relative = format!("{MATERIALS_DIR}/{name}/{TEXTURES_DIR}/{file_name}");
        self.require_mut(name)?.set_texture(slot, relative.clone());
        tracing::info!(material = %name, slot = slot.key(), path = %relative, "texture imported");
        Ok(relative)
    }

    /// Params tuple of a material, with texture references kept project-relative.
    pub fn stored_params(material: &Material) -> MaterialParams {
        let map = |s: &str| (!s.is_empty()).then(|| PathBuf::from(s));
        MaterialParams {
            albedo: material.albedo(),
            smoothness: material.smoothness,
            metalness: material.metalness,
            albedo_map: map(&material.albedo_map),
            metalness_map: map(&material.metalness_map),
        }
    }

    /// Write the per-material config copy into `materials/<name>/`.
    pub fn save_material(&self, name: &str) -> SwatchResult<PathBuf> {
        let mat = self.require(name)?;
        let dir = self.layout.material_dir(name);
        fs::create_dir_all(&dir).with_context(|| format!("create '{}'", dir.display()))?;
        let path = self.layout.material_config_path(name);
        let line = Self::stored_params(mat).encode()?;
        fs::write(&path, line).with_context(|| format!("write '{}'", path.display()))?;
        tracing::debug!(material = %name, path = %path.display(), "material config saved");
        Ok(path)
    }

    /// Apply the per-material config copy, if one exists, over the in-memory values.
    ///
    /// Returns whether a config was applied. An unreadable copy is logged and ignored.
    pub fn load_material_config(&mut self, name: &str) -> SwatchResult<bool> {
        let path = self.layout.material_config_path(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "material config unreadable");
                return Ok(false);
            }
        };
        let params = match MaterialParams::parse(&raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "material config ignored");
                return Ok(false);
            }
        };

        let mat = self.require_mut(name)?;
        mat.set_albedo(params.albedo);
        mat.set_smoothness(params.smoothness);
        mat.set_metalness(params.metalness);
        if let Some(p) = params.albedo_map {
            mat.albedo_map = p.display().to_string();
        }
        if let Some(p) = params.metalness_map {
            mat.metalness_map = p.display().to_string();
        }
        Ok(true)
    }

    /// Write every material to `materials.csv` with a header row.
    pub fn save_csv(&self) -> SwatchResult<()> {
        let path = self.layout.store_path();
        let mut writer = csv::Writer::from_path(&path)
            .map_err(|e| SwatchError::serde(format!("open '{}': {e}", path.display())))?;
        for mat in &self.materials {
            writer
                .serialize(mat)
                .map_err(|e| SwatchError::serde(format!("write '{}': {e}", path.display())))?;
        }
        writer
            .flush()
            .with_context(|| format!("flush '{}'", path.display()))?;
        tracing::info!(path = %path.display(), count = self.materials.len(), "material list saved");
        Ok(())
    }

    /// Replace the in-memory list with `materials.csv`. Legacy column names are accepted.
    pub fn load_csv(&mut self) -> SwatchResult<()> {
        let path = self.layout.store_path();
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| SwatchError::serde(format!("open '{}': {e}", path.display())))?;
        let mut materials: Vec<Material> = Vec::new();
        for (row, record) in reader.deserialize::<Material>().enumerate() {
            let mut mat = record.map_err(|e| {
                SwatchError::serde(format!("'{}' row {}: {e}", path.display(), row + 1))
            })?;
            mat.sanitize();
            if materials.iter().any(|m| m.name == mat.name) {
                tracing::warn!(material = %mat.name, "duplicate material row skipped");
                continue;
            }
            materials.push(mat);
        }
        tracing::info!(path = %path.display(), count = materials.len(), "material list loaded");
        self.materials = materials;
        Ok(())
    }

    /// Save the CSV and every per-material config copy.
    pub fn save_all(&self) -> SwatchResult<()> {
        self.save_csv()?;
        for mat in &self.materials {
            self.save_material(&mat.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/project/store.rs"]
mod tests;

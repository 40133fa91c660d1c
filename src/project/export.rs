use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::SwatchResult;
use crate::material::{Material, TextureSlot};
use crate::project::{ProjectLayout, TEXTURES_DIR};

/// Files produced by one export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportReport {
    pub snippet: PathBuf,
    pub textures: Vec<PathBuf>,
    /// Referenced textures that were not found on disk.
    pub missing: Vec<String>,
}

/// Shader property a texture slot binds to in the generated snippet.
fn shader_property(slot: TextureSlot) -> &'static str {
    match slot {
        TextureSlot::Albedo => "_MainTex",
        TextureSlot::Metalness => "_MetallicGlossMap",
        TextureSlot::Detail => "_DetailAlbedoMap",
        TextureSlot::Emissive => "_EmissionMap",
    }
}

/// Material definition snippet for a Unity Standard-shader material.
pub fn integration_snippet(material: &Material) -> String {
    let mut out = String::new();
    let [r, g, b] = material.albedo();
    // Infallible: writing into a String.
    let _ = writeln!(out, "// Generated by swatch for material '{}'.", material.name);
    let _ = writeln!(
        out,
        "Material mat = new Material(Shader.Find(\"Standard\"));"
    );
    let _ = writeln!(out, "mat.name = \"{}\";", material.name);
    let _ = writeln!(out, "mat.color = new Color({r}f, {g}f, {b}f);");
    let _ = writeln!(out, "mat.SetFloat(\"_Glossiness\", {}f);", material.smoothness);
    let _ = writeln!(out, "mat.SetFloat(\"_Metallic\", {}f);", material.metalness);
    for slot in TextureSlot::ALL {
        let Some(file) = texture_file_name(material.texture(slot)) else {
            continue;
        };
        let stem = Path::new(&file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&file)
            .to_string();
        let _ = writeln!(
            out,
            "mat.SetTexture(\"{}\", Resources.Load<Texture2D>(\"{TEXTURES_DIR}/{stem}\"));",
            shader_property(slot)
        );
        if slot == TextureSlot::Emissive {
            let _ = writeln!(out, "mat.EnableKeyword(\"_EMISSION\");");
        }
    }
    out
}

fn texture_file_name(reference: &str) -> Option<String> {
    if reference.is_empty() {
        return None;
    }
    Path::new(reference)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

/// Write `exports/<name>/<name>.cs` and copy referenced textures into `exports/<name>/textures/`.
#[tracing::instrument(level = "debug", skip(layout, material), fields(material = %material.name))]
pub fn export_material(layout: &ProjectLayout, material: &Material) -> SwatchResult<ExportReport> {
    let dir = layout.exports_dir().join(&material.name);
    let tex_dir = dir.join(TEXTURES_DIR);
    fs::create_dir_all(&tex_dir).with_context(|| format!("create '{}'", tex_dir.display()))?;

    let mut textures = Vec::new();
    let mut missing = Vec::new();
    for slot in TextureSlot::ALL {
        let reference = material.texture(slot);
        let Some(file) = texture_file_name(reference) else {
            continue;
        };
        let src = layout.resolve(reference);
        if !src.is_file() {
            tracing::warn!(slot = slot.key(), path = %src.display(), "texture missing; not exported");
            missing.push(reference.to_string());
            continue;
        }
        let dest = tex_dir.join(file);
        fs::copy(&src, &dest)
            .with_context(|| format!("copy '{}' -> '{}'", src.display(), dest.display()))?;
        textures.push(dest);
    }

    let snippet = dir.join(format!("{}.cs", material.name));
    fs::write(&snippet, integration_snippet(material))
        .with_context(|| format!("write '{}'", snippet.display()))?;
    tracing::info!(path = %snippet.display(), textures = textures.len(), "material exported");

    Ok(ExportReport {
        snippet,
        textures,
        missing,
    })
}

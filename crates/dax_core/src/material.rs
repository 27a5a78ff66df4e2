//! Material conversion.
//!
//! Only `profile_COMMON` is read: diffuse, specular and emission colors or
//! textures, plus a bump/normal map from vendor extras. Materials with the
//! same content share one entry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::collada::{ColorOrTexture, Document, ElementId, ElementKind, LinkId, NewParamValue};

pub const DEFAULT_MATERIAL_NAME: &str = "default";

/// An engine-neutral material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvertedMaterial {
    pub name: String,
    /// Texture file names.
    pub diffuse: Option<String>,
    pub specular: Option<String>,
    pub normal: Option<String>,
    pub diffuse_color: [f32; 4],
    pub specular_color: [f32; 4],
    pub emissive_color: [f32; 4],
}

impl Default for ConvertedMaterial {
    fn default() -> Self {
        Self {
            name: DEFAULT_MATERIAL_NAME.to_string(),
            diffuse: None,
            specular: None,
            normal: None,
            diffuse_color: [1.0; 4],
            specular_color: [0.0, 0.0, 0.0, 1.0],
            emissive_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Everything but the name, bit-exact.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct MaterialKey {
    textures: [Option<String>; 3],
    colors: [u32; 12],
}

impl MaterialKey {
    fn of(material: &ConvertedMaterial) -> Self {
        let mut colors = [0u32; 12];
        let all = material
            .diffuse_color
            .iter()
            .chain(&material.specular_color)
            .chain(&material.emissive_color);
        for (slot, value) in colors.iter_mut().zip(all) {
            *slot = value.to_bits();
        }
        Self {
            textures: [
                material.diffuse.clone(),
                material.specular.clone(),
                material.normal.clone(),
            ],
            colors,
        }
    }
}

/// Converted materials of one conversion, deduplicated by content.
#[derive(Clone, Debug, Default)]
pub struct MaterialCache {
    materials: Vec<ConvertedMaterial>,
    by_key: HashMap<MaterialKey, usize>,
    by_element: HashMap<ElementId, usize>,
    remove_texture_path: bool,
}

impl MaterialCache {
    pub fn new(remove_texture_path: bool) -> Self {
        Self {
            remove_texture_path,
            ..Default::default()
        }
    }

    pub fn materials(&self) -> &[ConvertedMaterial] {
        &self.materials
    }

    pub fn into_materials(self) -> Vec<ConvertedMaterial> {
        self.materials
    }

    /// Index of an equal material, inserting it if new.
    pub fn insert(&mut self, material: ConvertedMaterial) -> usize {
        let key = MaterialKey::of(&material);
        if let Some(&index) = self.by_key.get(&key) {
            return index;
        }
        let index = self.materials.len();
        self.materials.push(material);
        self.by_key.insert(key, index);
        index
    }

    pub fn default_material(&mut self) -> usize {
        self.insert(ConvertedMaterial::default())
    }

    /// Index of the material converted from a `<material>` element, falling
    /// back to the default material.
    pub fn material_for(&mut self, doc: &Document, material: Option<ElementId>) -> usize {
        let Some(material) = material else {
            return self.default_material();
        };
        if let Some(&index) = self.by_element.get(&material) {
            return index;
        }
        let index = match self.convert(doc, material) {
            Some(converted) => self.insert(converted),
            None => self.default_material(),
        };
        self.by_element.insert(material, index);
        index
    }

    fn convert(&self, doc: &Document, material: ElementId) -> Option<ConvertedMaterial> {
        let element = doc.element(material);
        let ElementKind::Material(data) = &element.kind else {
            log::warn!("Material binding targets a <{}>", element.kind.type_name());
            return None;
        };
        let Some(effect) = data.effect.and_then(|link| doc.link_target(link)) else {
            log::warn!("Material '{}' has no resolvable effect", element.label());
            return None;
        };
        let ElementKind::Effect(effect_data) = &doc.element(effect).kind else {
            return None;
        };
        let Some(technique) = effect_data.technique else {
            log::warn!(
                "Effect of material '{}' has no profile_COMMON technique",
                element.label()
            );
            return None;
        };
        let ElementKind::EffectTechnique(technique) = &doc.element(technique).kind else {
            return None;
        };

        let mut converted = ConvertedMaterial {
            name: element.label().to_string(),
            ..Default::default()
        };
        match &technique.diffuse {
            Some(ColorOrTexture::Color(c)) => converted.diffuse_color = *c,
            Some(ColorOrTexture::Texture { sampler, .. }) => converted.diffuse = self.texture_file(doc, *sampler),
            None => {}
        }
        match &technique.specular {
            Some(ColorOrTexture::Color(c)) => converted.specular_color = *c,
            Some(ColorOrTexture::Texture { sampler, .. }) => converted.specular = self.texture_file(doc, *sampler),
            None => {}
        }
        match &technique.emission {
            Some(ColorOrTexture::Color(c)) => converted.emissive_color = *c,
            Some(ColorOrTexture::Texture { .. }) => log::debug!("Emission textures are not converted"),
            None => {}
        }
        if let Some(ColorOrTexture::Texture { sampler, .. }) = &technique.bump {
            converted.normal = self.texture_file(doc, *sampler);
        }
        Some(converted)
    }

    /// Follow sampler2D -> surface -> image to a file name.
    fn texture_file(&self, doc: &Document, sampler: LinkId) -> Option<String> {
        let image = match doc.link_target(sampler) {
            Some(param) => self.image_of_param(doc, param),
            // Some exporters put the image id straight into <texture texture="...">
            None => doc.resolver.resolve_url(&doc.resolver.link(sampler).url),
        };
        let Some(image) = image else {
            log::warn!("Unresolved texture '{}'", doc.resolver.link(sampler).url);
            return None;
        };
        match &doc.element(image).kind {
            ElementKind::Image(data) => data.init_from.as_deref().map(|p| self.texture_path(p)),
            _ => None,
        }
    }

    fn image_of_param(&self, doc: &Document, param: ElementId) -> Option<ElementId> {
        match &doc.element(param).kind {
            ElementKind::Image(_) => Some(param),
            ElementKind::NewParam(p) => match &p.value {
                NewParamValue::Sampler2D { image: Some(image), .. } => doc.link_target(*image),
                NewParamValue::Sampler2D { surface: Some(surface), .. } => {
                    doc.link_target(*surface).and_then(|s| self.image_of_param(doc, s))
                }
                NewParamValue::Surface { image: Some(image) } => doc.link_target(*image),
                _ => None,
            },
            _ => None,
        }
    }

    fn texture_path(&self, path: &str) -> String {
        let path = path.strip_prefix("file://").unwrap_or(path);
        if self.remove_texture_path {
            path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
        } else {
            path.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collada::load_collada_from_string;

    const EFFECTS: &str = r##"<COLLADA>
      <library_images><image id="skin_png"><init_from>file://textures/skin.png</init_from></image></library_images>
      <library_effects>
        <effect id="fx_tex"><profile_COMMON>
          <newparam sid="surf"><surface type="2D"><init_from>skin_png</init_from></surface></newparam>
          <newparam sid="samp"><sampler2D><source>surf</source></sampler2D></newparam>
          <technique sid="common"><phong>
            <diffuse><texture texture="samp" texcoord="UV0"/></diffuse>
            <specular><color>0.5 0.5 0.5 1</color></specular>
          </phong></technique>
        </profile_COMMON></effect>
        <effect id="fx_red"><profile_COMMON><technique sid="common"><lambert>
          <diffuse><color>1 0 0 1</color></diffuse>
        </lambert></technique></profile_COMMON></effect>
      </library_effects>
      <library_materials>
        <material id="m_tex" name="Skin"><instance_effect url="#fx_tex"/></material>
        <material id="m_red" name="Red"><instance_effect url="#fx_red"/></material>
        <material id="m_red2" name="Red2"><instance_effect url="#fx_red"/></material>
      </library_materials>
    </COLLADA>"##;

    #[test]
    fn test_texture_chain() {
        let doc = load_collada_from_string(EFFECTS).unwrap();
        let mut cache = MaterialCache::new(false);
        let index = cache.material_for(&doc, doc.resolver.resolve_url("m_tex"));
        let material = &cache.materials()[index];
        assert_eq!(material.name, "Skin");
        assert_eq!(material.diffuse.as_deref(), Some("textures/skin.png"));
        assert_eq!(material.specular_color, [0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_remove_texture_path() {
        let doc = load_collada_from_string(EFFECTS).unwrap();
        let mut cache = MaterialCache::new(true);
        let index = cache.material_for(&doc, doc.resolver.resolve_url("m_tex"));
        assert_eq!(cache.materials()[index].diffuse.as_deref(), Some("skin.png"));
    }

    #[test]
    fn test_cache_by_content() {
        let doc = load_collada_from_string(EFFECTS).unwrap();
        let mut cache = MaterialCache::new(false);
        let a = cache.material_for(&doc, doc.resolver.resolve_url("m_red"));
        let b = cache.material_for(&doc, doc.resolver.resolve_url("m_red2"));
        assert_eq!(a, b);
        assert_eq!(cache.materials().len(), 1);
        assert_eq!(cache.materials()[a].diffuse_color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_default_material() {
        let doc = load_collada_from_string("<COLLADA/>").unwrap();
        let mut cache = MaterialCache::new(false);
        let a = cache.material_for(&doc, None);
        let b = cache.default_material();
        assert_eq!(a, b);
        assert_eq!(cache.materials()[a].name, DEFAULT_MATERIAL_NAME);
    }
}

//! Resource registry - name-keyed storage for GPU-backed assets
//!
//! **Ownership**: the engine owns a single [`Resources`] and lends it to the
//! render pipeline and to behaviours. Everything stored here is addressed
//! by a slotmap handle; the name maps only resolve names to handles.
//!
//! Registration never fails loudly. A duplicate name or an asset whose GPU
//! handle is zero is rejected with a warning and `None` is returned, so a
//! bad asset degrades to a skipped draw instead of an aborted frame.
//!
//! Once [`Resources::mark_started`] has been called, every successful
//! registration also queues its name; the engine drains the queue each frame
//! and forwards it to behaviours as `on_resource_loaded`.

use std::collections::HashMap;

use slotmap::{new_key_type, Key, SlotMap};

use crate::foundation::math::Vec4;
use crate::render::device::{BufferId, GraphicsDevice};
use crate::render::graphics2d::Font;
use crate::render::material::{DepthMaterial, DiffuseMaterial, Material};
use crate::render::primitives::{Mesh, MeshGenerator};
use crate::render::shader::{self, Shader};
use crate::render::texture::Texture;
use crate::render::RenderError;

new_key_type! {
    /// Handle to a registered shader
    pub struct ShaderHandle;
    /// Handle to a registered texture
    pub struct TextureHandle;
    /// Handle to a registered mesh
    pub struct MeshHandle;
    /// Handle to a registered material
    pub struct MaterialHandle;
    /// Handle to a registered font
    pub struct FontHandle;
}

/// Name of the built-in lit shader
pub const DEFAULT_SHADER: &str = "Default";
/// Name of the built-in layered depth shader
pub const DEPTH_SHADER: &str = "Depth";
/// Name of the 1x1 white texture
pub const WHITE_TEXTURE: &str = "White";
/// Name of the built-in lit material
pub const DEFAULT_MATERIAL: &str = "Default";
/// Name of the shadow pass material
pub const DEPTH_MATERIAL: &str = "Depth";
/// Name of the unit cube
pub const CUBE_MESH: &str = "Cube";

/// Handles of the built-in assets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Defaults {
    /// Lit forward shader
    pub lit_shader: ShaderHandle,
    /// Layered depth shader for the cascades
    pub depth_shader: ShaderHandle,
    /// Fallback diffuse map
    pub white_texture: TextureHandle,
    /// White lit material
    pub default_material: MaterialHandle,
    /// Depth-only material
    pub depth_material: MaterialHandle,
    /// Unit cube centered on the origin
    pub cube_mesh: MeshHandle,
}

/// A uniform buffer published under a name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedUniformBuffer {
    /// GL buffer name
    pub buffer: BufferId,
    /// Binding point
    pub binding: u32,
}

/// Slotmap arena plus a name index
struct Registry<K: Key, T> {
    kind: &'static str,
    items: SlotMap<K, (String, T)>,
    names: HashMap<String, K>,
}

impl<K: Key, T> Registry<K, T> {
    fn new(kind: &'static str) -> Self {
        Self { kind, items: SlotMap::with_key(), names: HashMap::new() }
    }

    fn contains_name(&self, name: &str) -> bool {
        if self.names.contains_key(name) {
            log::warn!("A {} named '{}' is already registered", self.kind, name);
            return true;
        }
        false
    }

    fn insert(&mut self, name: &str, value: T) -> K {
        let key = self.items.insert((name.to_string(), value));
        self.names.insert(name.to_string(), key);
        key
    }

    fn find(&self, name: &str) -> Option<K> {
        self.names.get(name).copied()
    }

    fn get(&self, key: K) -> Option<&T> {
        self.items.get(key).map(|(_, value)| value)
    }

    fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.items.get_mut(key).map(|(_, value)| value)
    }

    fn remove(&mut self, key: K) -> Option<T> {
        let (name, value) = self.items.remove(key)?;
        self.names.remove(&name);
        Some(value)
    }

    fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.names.clear();
        self.items.drain().map(|(_, (_, value))| value)
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Name-keyed registry of shaders, textures, meshes, materials, fonts and
/// uniform buffers
pub struct Resources {
    shaders: Registry<ShaderHandle, Shader>,
    textures: Registry<TextureHandle, Texture>,
    meshes: Registry<MeshHandle, Mesh>,
    materials: Registry<MaterialHandle, Box<dyn Material>>,
    fonts: Registry<FontHandle, Font>,
    uniform_buffers: HashMap<String, NamedUniformBuffer>,
    defaults: Option<Defaults>,
    started: bool,
    loaded: Vec<String>,
}

impl Default for Resources {
    fn default() -> Self {
        Self::new()
    }
}

impl Resources {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            shaders: Registry::new("shader"),
            textures: Registry::new("texture"),
            meshes: Registry::new("mesh"),
            materials: Registry::new("material"),
            fonts: Registry::new("font"),
            uniform_buffers: HashMap::new(),
            defaults: None,
            started: false,
            loaded: Vec::new(),
        }
    }

    /// Register the built-in shaders, texture, materials and cube
    ///
    /// `shadow_layers` is the number of cascade bands the depth shader
    /// writes to in one pass.
    pub fn create_defaults(
        &mut self,
        device: &mut dyn GraphicsDevice,
        shadow_layers: usize,
    ) -> Result<(), RenderError> {
        if self.defaults.is_some() {
            return Err(RenderError::InitializationFailed("built-in resources already created".to_string()));
        }
        let lit = Shader::compile(
            device,
            DEFAULT_SHADER,
            &shader::lit_vertex_source(),
            &shader::lit_fragment_source(),
        )?;
        let depth = Shader::compile_layered(
            device,
            DEPTH_SHADER,
            &shader::depth_vertex_source(),
            &shader::depth_geometry_source(shadow_layers),
            &shader::depth_fragment_source(),
        )?;
        let white = Texture::solid(device, [255, 255, 255, 255])?;

        let missing = |what: &str| RenderError::InitializationFailed(format!("built-in {} already registered", what));
        let lit_shader = self.add_shader(device, DEFAULT_SHADER, lit).ok_or_else(|| missing(DEFAULT_SHADER))?;
        let depth_shader = self.add_shader(device, DEPTH_SHADER, depth).ok_or_else(|| missing(DEPTH_SHADER))?;
        let white_texture = self
            .add_texture(device, WHITE_TEXTURE, white)
            .ok_or_else(|| missing(WHITE_TEXTURE))?;
        let default_material = self
            .add_material(DEFAULT_MATERIAL, Box::new(DiffuseMaterial::new(lit_shader, Vec4::repeat(1.0))))
            .ok_or_else(|| missing(DEFAULT_MATERIAL))?;
        let depth_material = self
            .add_material(DEPTH_MATERIAL, Box::new(DepthMaterial { shader: depth_shader }))
            .ok_or_else(|| missing(DEPTH_MATERIAL))?;
        let cube_mesh = self.add_mesh(device, CUBE_MESH, MeshGenerator::cube()).ok_or_else(|| missing(CUBE_MESH))?;

        self.defaults = Some(Defaults {
            lit_shader,
            depth_shader,
            white_texture,
            default_material,
            depth_material,
            cube_mesh,
        });
        log::info!("Built-in resources created ({} shadow layers)", shadow_layers);
        Ok(())
    }

    /// Handles of the built-in assets, once created
    pub fn defaults(&self) -> Option<Defaults> {
        self.defaults
    }

    /// Fallback diffuse map
    pub fn white_texture(&self) -> Option<&Texture> {
        self.defaults.and_then(|d| self.texture(d.white_texture))
    }

    /// Start queueing names of newly registered resources
    pub fn mark_started(&mut self) {
        self.started = true;
    }

    /// Names registered since the last call
    pub fn take_loaded(&mut self) -> Vec<String> {
        std::mem::take(&mut self.loaded)
    }

    fn notify(&mut self, name: &str) {
        if self.started {
            self.loaded.push(name.to_string());
        }
    }

    // Shaders

    /// Register a linked shader; a rejected shader's program is deleted
    pub fn add_shader(
        &mut self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        mut shader: Shader,
    ) -> Option<ShaderHandle> {
        if shader.program().is_none() {
            log::warn!("Rejected shader '{}': program handle is zero", name);
            return None;
        }
        if self.shaders.contains_name(name) {
            shader.release(device);
            return None;
        }
        let handle = self.shaders.insert(name, shader);
        self.notify(name);
        Some(handle)
    }

    /// Look a shader up by name
    pub fn find_shader(&self, name: &str) -> Option<ShaderHandle> {
        self.shaders.find(name)
    }

    /// Registered shader
    pub fn shader(&self, handle: ShaderHandle) -> Option<&Shader> {
        self.shaders.get(handle)
    }

    // Textures

    /// Register an uploaded texture; a rejected texture is deleted
    pub fn add_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        mut texture: Texture,
    ) -> Option<TextureHandle> {
        if texture.id().is_none() {
            log::warn!("Rejected texture '{}': texture handle is zero", name);
            return None;
        }
        if self.textures.contains_name(name) {
            texture.release(device);
            return None;
        }
        let handle = self.textures.insert(name, texture);
        self.notify(name);
        Some(handle)
    }

    /// Look a texture up by name
    pub fn find_texture(&self, name: &str) -> Option<TextureHandle> {
        self.textures.find(name)
    }

    /// Registered texture
    pub fn texture(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle)
    }

    // Meshes

    /// Register a mesh, uploading it first if it has no GPU buffers yet
    pub fn add_mesh(&mut self, device: &mut dyn GraphicsDevice, name: &str, mut mesh: Mesh) -> Option<MeshHandle> {
        if self.meshes.contains_name(name) {
            return None;
        }
        if mesh.buffers().is_none() {
            mesh.generate(device);
        }
        if mesh.buffers().map_or(true, |b| b.vertex_array.is_none()) {
            log::warn!("Rejected mesh '{}': vertex array handle is zero", name);
            mesh.release(device);
            return None;
        }
        let handle = self.meshes.insert(name, mesh);
        self.notify(name);
        Some(handle)
    }

    /// Look a mesh up by name
    pub fn find_mesh(&self, name: &str) -> Option<MeshHandle> {
        self.meshes.find(name)
    }

    /// Registered mesh
    pub fn mesh(&self, handle: MeshHandle) -> Option<&Mesh> {
        self.meshes.get(handle)
    }

    /// Registered mesh, for regenerating its geometry
    pub fn mesh_mut(&mut self, handle: MeshHandle) -> Option<&mut Mesh> {
        self.meshes.get_mut(handle)
    }

    /// Unregister a mesh and free its GPU buffers
    pub fn remove_mesh(&mut self, device: &mut dyn GraphicsDevice, handle: MeshHandle) -> bool {
        match self.meshes.remove(handle) {
            Some(mut mesh) => {
                mesh.release(device);
                true
            }
            None => false,
        }
    }

    // Materials

    /// Register a material
    pub fn add_material(&mut self, name: &str, material: Box<dyn Material>) -> Option<MaterialHandle> {
        if self.materials.contains_name(name) {
            return None;
        }
        let handle = self.materials.insert(name, material);
        self.notify(name);
        Some(handle)
    }

    /// Look a material up by name
    pub fn find_material(&self, name: &str) -> Option<MaterialHandle> {
        self.materials.find(name)
    }

    /// Registered material
    pub fn material(&self, handle: MaterialHandle) -> Option<&dyn Material> {
        self.materials.get(handle).map(|material| material.as_ref())
    }

    /// Registered material downcast to its concrete type
    pub fn material_mut<T: Material>(&mut self, handle: MaterialHandle) -> Option<&mut T> {
        self.materials.get_mut(handle).and_then(|material| material.as_any_mut().downcast_mut::<T>())
    }

    /// Unregister a material
    pub fn remove_material(&mut self, handle: MaterialHandle) -> bool {
        self.materials.remove(handle).is_some()
    }

    // Fonts

    /// Register a font; a rejected font's atlas is deleted
    pub fn add_font(&mut self, device: &mut dyn GraphicsDevice, name: &str, mut font: Font) -> Option<FontHandle> {
        if font.texture().id().is_none() {
            log::warn!("Rejected font '{}': atlas handle is zero", name);
            return None;
        }
        if self.fonts.contains_name(name) {
            font.release(device);
            return None;
        }
        let handle = self.fonts.insert(name, font);
        self.notify(name);
        Some(handle)
    }

    /// Look a font up by name
    pub fn find_font(&self, name: &str) -> Option<FontHandle> {
        self.fonts.find(name)
    }

    /// Registered font
    pub fn font(&self, handle: FontHandle) -> Option<&Font> {
        self.fonts.get(handle)
    }

    // Uniform buffers

    /// Publish a uniform buffer under a name; ownership stays with the caller
    pub fn add_uniform_buffer(&mut self, name: &str, buffer: BufferId, binding: u32) -> bool {
        if buffer.is_none() {
            log::warn!("Rejected uniform buffer '{}': buffer handle is zero", name);
            return false;
        }
        if self.uniform_buffers.contains_key(name) {
            log::warn!("A uniform buffer named '{}' is already registered", name);
            return false;
        }
        self.uniform_buffers.insert(name.to_string(), NamedUniformBuffer { buffer, binding });
        true
    }

    /// Look a uniform buffer up by name
    pub fn find_uniform_buffer(&self, name: &str) -> Option<NamedUniformBuffer> {
        self.uniform_buffers.get(name).copied()
    }

    /// Number of registered meshes, textures and shaders
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.meshes.len(), self.textures.len(), self.shaders.len())
    }

    /// Free every GPU object and empty the registry
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        let (meshes, textures, shaders) = self.counts();
        for mut mesh in self.meshes.drain() {
            mesh.release(device);
        }
        for mut texture in self.textures.drain() {
            texture.release(device);
        }
        for mut font in self.fonts.drain() {
            font.release(device);
        }
        for mut shader in self.shaders.drain() {
            shader.release(device);
        }
        self.materials.drain().for_each(drop);
        self.uniform_buffers.clear();
        self.defaults = None;
        log::info!("Released {} meshes, {} textures, {} shaders", meshes, textures, shaders);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::HeadlessDevice;
    use crate::render::device::ProgramId;

    fn setup() -> (HeadlessDevice, Resources) {
        let mut device = HeadlessDevice::new(64, 64);
        let mut resources = Resources::new();
        resources.create_defaults(&mut device, 5).expect("defaults");
        (device, resources)
    }

    #[test]
    fn test_defaults_registered_by_name() {
        let (_, resources) = setup();
        let defaults = resources.defaults().expect("defaults");
        assert_eq!(resources.find_shader(DEFAULT_SHADER), Some(defaults.lit_shader));
        assert_eq!(resources.find_material(DEPTH_MATERIAL), Some(defaults.depth_material));
        assert_eq!(resources.find_mesh(CUBE_MESH), Some(defaults.cube_mesh));
        assert!(resources.white_texture().is_some());
        assert!(resources.mesh(defaults.cube_mesh).and_then(|m| m.buffers()).is_some());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (mut device, mut resources) = setup();
        assert!(resources.add_mesh(&mut device, CUBE_MESH, MeshGenerator::quad()).is_none());
        assert_eq!(resources.counts().0, 1);
    }

    #[test]
    fn test_zero_handle_rejected() {
        let (mut device, mut resources) = setup();
        let shader = Shader::from_program("broken", ProgramId::NONE);
        assert!(resources.add_shader(&mut device, "broken", shader).is_none());
        assert!(!resources.add_uniform_buffer("Nothing", BufferId::NONE, 7));
        assert!(resources.find_shader("broken").is_none());
    }

    #[test]
    fn test_rejected_duplicates_free_their_gpu_objects() {
        let (mut device, mut resources) = setup();
        let live = device.live_object_count();

        let white = Texture::solid(&mut device, [255, 255, 255, 255]).expect("texture");
        assert!(resources.add_texture(&mut device, WHITE_TEXTURE, white).is_none());
        let lit = Shader::compile(
            &mut device,
            DEFAULT_SHADER,
            &shader::lit_vertex_source(),
            &shader::lit_fragment_source(),
        )
        .expect("shader");
        assert!(resources.add_shader(&mut device, DEFAULT_SHADER, lit).is_none());
        assert_eq!(device.live_object_count(), live);
        assert_eq!(resources.counts(), (1, 1, 2));

        resources.release(&mut device);
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_loaded_names_queued_after_start() {
        let (mut device, mut resources) = setup();
        assert!(resources.take_loaded().is_empty());

        resources.mark_started();
        resources.add_mesh(&mut device, "Sphere", MeshGenerator::sphere(1.0, 8, 6)).expect("sphere");
        assert_eq!(resources.take_loaded(), vec!["Sphere".to_string()]);
        assert!(resources.take_loaded().is_empty());
    }

    #[test]
    fn test_material_downcast() {
        let (_, mut resources) = setup();
        let handle = resources.defaults().expect("defaults").default_material;
        let material = resources.material_mut::<DiffuseMaterial>(handle).expect("diffuse");
        material.color = Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(resources.material_mut::<DepthMaterial>(handle).is_none());
    }

    #[test]
    fn test_release_frees_gpu_objects() {
        let (mut device, mut resources) = setup();
        assert!(device.live_object_count() > 0);
        resources.release(&mut device);
        assert_eq!(device.live_object_count(), 0);
        assert!(resources.defaults().is_none());
    }
}

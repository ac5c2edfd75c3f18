//! In-memory graphics device
//!
//! Implements the full GL state machine without a context. Every state
//! mutation and draw is appended to a command log so callers can inspect
//! exactly what a frame did. Uniform names are discovered by scanning the
//! GLSL sources for `uniform <type> <name>;` declarations.

use std::collections::HashMap;

use super::{
    BlendEquation, BlendFactor, BufferId, BufferTarget, BufferUsage, Capability, ClearFlags,
    DepthFunc, DeviceError, Face, FramebufferId, GraphicsDevice, PolygonMode, PrimitiveMode,
    ProgramId, TextureFilter, TextureFormat, TextureId, UniformLocation, UniformValue,
    VertexArrayId, VertexLayout, Viewport,
};

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// Capability enabled
    Enable(Capability),
    /// Capability disabled
    Disable(Capability),
    /// Depth function changed
    DepthFunc(DepthFunc),
    /// Depth write mask changed
    DepthMask(bool),
    /// Blend factors changed
    BlendFunc(BlendFactor, BlendFactor),
    /// Blend equation changed
    BlendEquation(BlendEquation),
    /// Culled face changed
    CullFace(Face),
    /// Polygon mode changed
    PolygonMode(PolygonMode),
    /// Viewport changed
    Viewport(Viewport),
    /// Scissor box changed
    Scissor(Viewport),
    /// Clear color changed
    ClearColor([f32; 4]),
    /// Buffers cleared
    Clear(ClearFlags),
    /// Buffer storage (re)allocated
    BufferData {
        /// Target buffer
        buffer: BufferId,
        /// New storage size in bytes
        size: usize,
    },
    /// Buffer storage partially overwritten
    BufferSubData {
        /// Target buffer
        buffer: BufferId,
        /// Byte offset
        offset: usize,
        /// Bytes written
        size: usize,
    },
    /// Uniform buffer bound to a binding point
    BindBufferBase {
        /// Binding index
        binding: u32,
        /// Bound buffer
        buffer: BufferId,
    },
    /// Vertex array bound
    BindVertexArray(VertexArrayId),
    /// Program made current
    UseProgram(ProgramId),
    /// Uniform written
    SetUniform {
        /// Program the uniform belongs to
        program: ProgramId,
        /// Uniform location
        location: UniformLocation,
        /// Written value
        value: UniformValue,
    },
    /// Texture bound to a unit
    BindTexture {
        /// Texture unit
        unit: u32,
        /// Bound texture
        texture: TextureId,
    },
    /// Framebuffer bound
    BindFramebuffer(FramebufferId),
    /// Indexed draw issued
    DrawElements {
        /// Topology
        mode: PrimitiveMode,
        /// Index count
        count: u32,
        /// Byte offset into the index buffer
        offset: usize,
        /// Program current at draw time
        program: ProgramId,
        /// Vertex array bound at draw time
        vertex_array: VertexArrayId,
        /// Framebuffer bound at draw time
        framebuffer: FramebufferId,
    },
}

#[derive(Debug, Clone)]
struct BufferState {
    target: BufferTarget,
    data: Vec<u8>,
    allocations: u32,
}

#[derive(Debug, Clone)]
struct ProgramState {
    uniforms: HashMap<String, UniformLocation>,
    values: HashMap<UniformLocation, UniformValue>,
}

#[derive(Debug, Clone, Copy)]
struct TextureState {
    width: u32,
    height: u32,
    layers: u32,
    format: TextureFormat,
}

#[derive(Debug, Clone)]
struct FixedState {
    capabilities: HashMap<Capability, bool>,
    depth_func: DepthFunc,
    depth_mask: bool,
    blend_func: (BlendFactor, BlendFactor),
    blend_equation: BlendEquation,
    cull_face: Face,
    polygon_mode: PolygonMode,
    viewport: Viewport,
    scissor: Viewport,
    clear_color: [f32; 4],
}

impl Default for FixedState {
    fn default() -> Self {
        Self {
            capabilities: HashMap::new(),
            depth_func: DepthFunc::Less,
            depth_mask: true,
            blend_func: (BlendFactor::One, BlendFactor::Zero),
            blend_equation: BlendEquation::Add,
            cull_face: Face::Back,
            polygon_mode: PolygonMode::Fill,
            viewport: Viewport::default(),
            scissor: Viewport::default(),
            clear_color: [0.0; 4],
        }
    }
}

/// Context-free [`GraphicsDevice`] that records what it is asked to do
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    state: FixedState,
    next_name: u32,
    buffers: HashMap<BufferId, BufferState>,
    vertex_arrays: HashMap<VertexArrayId, (BufferId, Option<BufferId>, VertexLayout)>,
    programs: HashMap<ProgramId, ProgramState>,
    textures: HashMap<TextureId, TextureState>,
    framebuffers: HashMap<FramebufferId, TextureId>,
    uniform_bindings: HashMap<u32, BufferId>,
    texture_units: HashMap<u32, TextureId>,
    current_program: ProgramId,
    current_vertex_array: VertexArrayId,
    current_framebuffer: FramebufferId,
    commands: Vec<DeviceCommand>,
}

impl HeadlessDevice {
    /// Create a device with a default viewport of the given size
    pub fn new(width: i32, height: i32) -> Self {
        let mut device = Self::default();
        device.state.viewport = Viewport::new(0, 0, width, height);
        device
    }

    fn next_name(&mut self) -> u32 {
        self.next_name += 1;
        self.next_name
    }

    fn record(&mut self, command: DeviceCommand) {
        log::trace!("device: {:?}", command);
        self.commands.push(command);
    }

    /// Every recorded command since the last [`clear_commands`](Self::clear_commands)
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Forget recorded commands (state is kept)
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of recorded draw calls
    pub fn draw_call_count(&self) -> usize {
        self.draws().count()
    }

    /// Number of recorded non-draw commands
    pub fn state_change_count(&self) -> usize {
        self.commands.len() - self.draw_call_count()
    }

    /// Iterate over recorded draw calls
    pub fn draws(&self) -> impl Iterator<Item = &DeviceCommand> {
        self.commands
            .iter()
            .filter(|c| matches!(c, DeviceCommand::DrawElements { .. }))
    }

    /// Current contents of a buffer
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    /// How many times a buffer's storage has been (re)allocated
    pub fn buffer_allocations(&self, buffer: BufferId) -> u32 {
        self.buffers.get(&buffer).map_or(0, |b| b.allocations)
    }

    /// Target a buffer was created for
    pub fn buffer_target(&self, buffer: BufferId) -> Option<BufferTarget> {
        self.buffers.get(&buffer).map(|b| b.target)
    }

    /// Buffer bound at a uniform binding point
    pub fn uniform_binding(&self, binding: u32) -> BufferId {
        self.uniform_bindings.get(&binding).copied().unwrap_or_default()
    }

    /// Last value written to a named uniform
    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        let state = self.programs.get(&program)?;
        let location = state.uniforms.get(name)?;
        state.values.get(location).copied()
    }

    /// Currently bound framebuffer
    pub fn current_framebuffer(&self) -> FramebufferId {
        self.current_framebuffer
    }

    /// Currently used program
    pub fn current_program(&self) -> ProgramId {
        self.current_program
    }

    /// Texture bound to a unit
    pub fn bound_texture(&self, unit: u32) -> TextureId {
        self.texture_units.get(&unit).copied().unwrap_or_default()
    }

    /// Dimensions and layer count of a texture
    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32, u32)> {
        self.textures.get(&texture).map(|t| (t.width, t.height, t.layers))
    }

    /// Number of live GL objects of every kind
    pub fn live_object_count(&self) -> usize {
        self.buffers.len()
            + self.vertex_arrays.len()
            + self.programs.len()
            + self.textures.len()
            + self.framebuffers.len()
    }

    fn compile_stage(stage: &str, source: &str) -> Result<(), DeviceError> {
        if source.trim().is_empty() {
            return Err(DeviceError::ShaderCompilation(format!("{} shader source is empty", stage)));
        }
        if !source.contains("void main") {
            return Err(DeviceError::ShaderCompilation(format!("{} shader has no entry point", stage)));
        }
        Ok(())
    }

    fn scan_uniforms(sources: &[&str]) -> Vec<String> {
        let mut names = Vec::new();
        for source in sources {
            for line in source.lines() {
                let Some(rest) = line.trim().strip_prefix("uniform ") else {
                    continue;
                };
                // Named blocks are bound through binding points, not locations
                if rest.contains('{') || !rest.contains(';') {
                    continue;
                }
                let declaration = rest.split(';').next().unwrap_or_default();
                if let Some(last) = declaration.split_whitespace().last() {
                    let name = last.split('[').next().unwrap_or(last).to_string();
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }

    fn link(&mut self, sources: &[&str]) -> ProgramId {
        let uniforms = Self::scan_uniforms(sources)
            .into_iter()
            .enumerate()
            .map(|(index, name)| (name, UniformLocation(index as i32)))
            .collect();

        let id = ProgramId(self.next_name());
        self.programs.insert(id, ProgramState { uniforms, values: HashMap::new() });
        id
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn enable(&mut self, capability: Capability) {
        self.state.capabilities.insert(capability, true);
        self.record(DeviceCommand::Enable(capability));
    }

    fn disable(&mut self, capability: Capability) {
        self.state.capabilities.insert(capability, false);
        self.record(DeviceCommand::Disable(capability));
    }

    fn is_enabled(&self, capability: Capability) -> bool {
        self.state.capabilities.get(&capability).copied().unwrap_or(false)
    }

    fn depth_func(&mut self, func: DepthFunc) {
        self.state.depth_func = func;
        self.record(DeviceCommand::DepthFunc(func));
    }

    fn current_depth_func(&self) -> DepthFunc {
        self.state.depth_func
    }

    fn depth_mask(&mut self, write: bool) {
        self.state.depth_mask = write;
        self.record(DeviceCommand::DepthMask(write));
    }

    fn current_depth_mask(&self) -> bool {
        self.state.depth_mask
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.state.blend_func = (src, dst);
        self.record(DeviceCommand::BlendFunc(src, dst));
    }

    fn current_blend_func(&self) -> (BlendFactor, BlendFactor) {
        self.state.blend_func
    }

    fn blend_equation(&mut self, equation: BlendEquation) {
        self.state.blend_equation = equation;
        self.record(DeviceCommand::BlendEquation(equation));
    }

    fn current_blend_equation(&self) -> BlendEquation {
        self.state.blend_equation
    }

    fn cull_face(&mut self, face: Face) {
        self.state.cull_face = face;
        self.record(DeviceCommand::CullFace(face));
    }

    fn current_cull_face(&self) -> Face {
        self.state.cull_face
    }

    fn polygon_mode(&mut self, mode: PolygonMode) {
        self.state.polygon_mode = mode;
        self.record(DeviceCommand::PolygonMode(mode));
    }

    fn current_polygon_mode(&self) -> PolygonMode {
        self.state.polygon_mode
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
        self.record(DeviceCommand::Viewport(viewport));
    }

    fn current_viewport(&self) -> Viewport {
        self.state.viewport
    }

    fn scissor(&mut self, rect: Viewport) {
        self.state.scissor = rect;
        self.record(DeviceCommand::Scissor(rect));
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        self.state.clear_color = color;
        self.record(DeviceCommand::ClearColor(color));
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.record(DeviceCommand::Clear(flags));
    }

    fn create_buffer(&mut self, target: BufferTarget) -> BufferId {
        let id = BufferId(self.next_name());
        self.buffers.insert(id, BufferState { target, data: Vec::new(), allocations: 0 });
        id
    }

    fn buffer_data(&mut self, buffer: BufferId, data: &[u8], _usage: BufferUsage) {
        let Some(state) = self.buffers.get_mut(&buffer) else {
            log::error!("buffer_data on unknown buffer {:?}", buffer);
            return;
        };
        state.data = data.to_vec();
        state.allocations += 1;
        self.record(DeviceCommand::BufferData { buffer, size: data.len() });
    }

    fn buffer_sub_data(&mut self, buffer: BufferId, offset: usize, data: &[u8]) {
        let Some(state) = self.buffers.get_mut(&buffer) else {
            log::error!("buffer_sub_data on unknown buffer {:?}", buffer);
            return;
        };
        let end = offset + data.len();
        if end > state.data.len() {
            log::error!(
                "buffer_sub_data out of range on {:?}: {}..{} exceeds {} bytes",
                buffer,
                offset,
                end,
                state.data.len()
            );
            return;
        }
        state.data[offset..end].copy_from_slice(data);
        self.record(DeviceCommand::BufferSubData { buffer, offset, size: data.len() });
    }

    fn bind_buffer_base(&mut self, binding: u32, buffer: BufferId) {
        self.uniform_bindings.insert(binding, buffer);
        self.record(DeviceCommand::BindBufferBase { binding, buffer });
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn create_vertex_array(
        &mut self,
        vertex_buffer: BufferId,
        index_buffer: Option<BufferId>,
        layout: &VertexLayout,
    ) -> VertexArrayId {
        let id = VertexArrayId(self.next_name());
        self.vertex_arrays.insert(id, (vertex_buffer, index_buffer, layout.clone()));
        id
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.current_vertex_array = vertex_array;
        self.record(DeviceCommand::BindVertexArray(vertex_array));
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.vertex_arrays.remove(&vertex_array);
    }

    fn create_program(&mut self, vertex_source: &str, fragment_source: &str) -> Result<ProgramId, DeviceError> {
        Self::compile_stage("vertex", vertex_source)?;
        Self::compile_stage("fragment", fragment_source)?;
        Ok(self.link(&[vertex_source, fragment_source]))
    }

    fn create_layered_program(
        &mut self,
        vertex_source: &str,
        geometry_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId, DeviceError> {
        Self::compile_stage("vertex", vertex_source)?;
        Self::compile_stage("geometry", geometry_source)?;
        Self::compile_stage("fragment", fragment_source)?;
        Ok(self.link(&[vertex_source, geometry_source, fragment_source]))
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current_program = program;
        self.record(DeviceCommand::UseProgram(program));
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs.get(&program)?.uniforms.get(name).copied()
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let program = self.current_program;
        let Some(state) = self.programs.get_mut(&program) else {
            log::warn!("set_uniform with no program bound");
            return;
        };
        state.values.insert(location, value);
        self.record(DeviceCommand::SetUniform { program, location, value });
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == program {
            self.current_program = ProgramId::NONE;
        }
    }

    fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
        pixels: Option<&[u8]>,
        _filter: TextureFilter,
    ) -> Result<TextureId, DeviceError> {
        if width == 0 || height == 0 {
            return Err(DeviceError::TextureCreation(format!("invalid size {}x{}", width, height)));
        }
        if let Some(pixels) = pixels {
            let texel = match format {
                TextureFormat::Rgba8 | TextureFormat::Depth32F => 4,
                TextureFormat::R8 => 1,
            };
            let expected = width as usize * height as usize * texel;
            if pixels.len() != expected {
                return Err(DeviceError::TextureCreation(format!(
                    "expected {} bytes of pixel data, got {}",
                    expected,
                    pixels.len()
                )));
            }
        }
        let id = TextureId(self.next_name());
        self.textures.insert(id, TextureState { width, height, layers: 1, format });
        Ok(id)
    }

    fn create_depth_texture_array(&mut self, width: u32, height: u32, layers: u32) -> Result<TextureId, DeviceError> {
        if width == 0 || height == 0 || layers == 0 {
            return Err(DeviceError::TextureCreation(format!(
                "invalid depth array {}x{}x{}",
                width, height, layers
            )));
        }
        let id = TextureId(self.next_name());
        self.textures.insert(
            id,
            TextureState { width, height, layers, format: TextureFormat::Depth32F },
        );
        Ok(id)
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureId) {
        self.texture_units.insert(unit, texture);
        self.record(DeviceCommand::BindTexture { unit, texture });
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn create_depth_framebuffer(&mut self, depth_array: TextureId) -> Result<FramebufferId, DeviceError> {
        match self.textures.get(&depth_array) {
            Some(texture) if texture.format == TextureFormat::Depth32F => {
                let id = FramebufferId(self.next_name());
                self.framebuffers.insert(id, depth_array);
                Ok(id)
            }
            Some(_) => Err(DeviceError::IncompleteFramebuffer(format!(
                "{:?} is not a depth texture",
                depth_array
            ))),
            None => Err(DeviceError::IncompleteFramebuffer(format!(
                "missing depth attachment {:?}",
                depth_array
            ))),
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.current_framebuffer = framebuffer;
        self.record(DeviceCommand::BindFramebuffer(framebuffer));
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
    }

    fn draw_elements(&mut self, mode: PrimitiveMode, count: u32, offset: usize) {
        let command = DeviceCommand::DrawElements {
            mode,
            count,
            offset,
            program: self.current_program,
            vertex_array: self.current_vertex_array,
            framebuffer: self.current_framebuffer,
        };
        self.record(command);
    }
}

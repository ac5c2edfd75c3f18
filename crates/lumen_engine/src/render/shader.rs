//! Shader programs and the built-in GLSL sources
//!
//! Every built-in shader declares the shared uniform blocks at their fixed
//! binding points (see [`crate::render::uniforms`]). Uniform writes by name
//! are silently ignored when the program has no such uniform, matching GL's
//! behaviour for location -1.

use crate::foundation::math::{utils, Mat4, Vec3, Vec4};
use crate::render::device::{GraphicsDevice, ProgramId, UniformValue};
use crate::render::RenderError;

/// Linked shader program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shader {
    name: String,
    program: ProgramId,
}

impl Shader {
    /// Compile and link a vertex/fragment pair
    pub fn compile(
        device: &mut dyn GraphicsDevice,
        name: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, RenderError> {
        let program = device
            .create_program(vertex_source, fragment_source)
            .map_err(|e| RenderError::Shader { name: name.to_string(), source: e })?;
        log::debug!("Compiled shader '{}' as {:?}", name, program);
        Ok(Self { name: name.to_string(), program })
    }

    /// Compile and link a program with a geometry stage
    pub fn compile_layered(
        device: &mut dyn GraphicsDevice,
        name: &str,
        vertex_source: &str,
        geometry_source: &str,
        fragment_source: &str,
    ) -> Result<Self, RenderError> {
        let program = device
            .create_layered_program(vertex_source, geometry_source, fragment_source)
            .map_err(|e| RenderError::Shader { name: name.to_string(), source: e })?;
        log::debug!("Compiled layered shader '{}' as {:?}", name, program);
        Ok(Self { name: name.to_string(), program })
    }

    /// Wrap an already linked program
    pub fn from_program(name: &str, program: ProgramId) -> Self {
        Self { name: name.to_string(), program }
    }

    /// Shader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// GL program
    pub fn program(&self) -> ProgramId {
        self.program
    }

    /// Make this program current
    pub fn use_program(&self, device: &mut dyn GraphicsDevice) {
        device.use_program(self.program);
    }

    /// Write a uniform by name; returns `false` when the program has no such uniform
    pub fn set(&self, device: &mut dyn GraphicsDevice, name: &str, value: UniformValue) -> bool {
        match device.uniform_location(self.program, name) {
            Some(location) => {
                device.set_uniform(location, value);
                true
            }
            None => false,
        }
    }

    /// Write an `int` / `bool` / sampler uniform
    pub fn set_int(&self, device: &mut dyn GraphicsDevice, name: &str, value: i32) -> bool {
        self.set(device, name, UniformValue::Int(value))
    }

    /// Write a `float` uniform
    pub fn set_float(&self, device: &mut dyn GraphicsDevice, name: &str, value: f32) -> bool {
        self.set(device, name, UniformValue::Float(value))
    }

    /// Write a `vec3` uniform
    pub fn set_vec3(&self, device: &mut dyn GraphicsDevice, name: &str, value: &Vec3) -> bool {
        self.set(device, name, UniformValue::Vec3([value.x, value.y, value.z]))
    }

    /// Write a `vec4` uniform
    pub fn set_vec4(&self, device: &mut dyn GraphicsDevice, name: &str, value: &Vec4) -> bool {
        self.set(device, name, UniformValue::Vec4([value.x, value.y, value.z, value.w]))
    }

    /// Write a `mat4` uniform
    pub fn set_mat4(&self, device: &mut dyn GraphicsDevice, name: &str, value: &Mat4) -> bool {
        self.set(device, name, UniformValue::Mat4(utils::mat4_to_cols(value)))
    }

    /// Delete the program
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if !self.program.is_none() {
            device.delete_program(self.program);
            self.program = ProgramId::NONE;
        }
    }
}

/// Texture unit the diffuse map is bound to
pub const DIFFUSE_TEXTURE_UNIT: u32 = 0;
/// Texture unit the shadow map array is bound to
pub const SHADOW_TEXTURE_UNIT: u32 = 1;

/// Shared block declarations prepended to the lit shader stages
const BLOCKS: &str = r#"
struct LightData {
    int active;
    int type;
    float constant;
    float linear;
    float quadratic;
    float strength;
    vec2 padding;
    vec4 position;
    vec4 direction;
    vec4 color;
    vec4 ambient;
    vec4 diffuse;
    vec4 specular;
};

layout(std140, binding = 0) uniform Lights {
    LightData lights[32];
};

layout(std140, binding = 1) uniform Camera {
    mat4 view;
    mat4 projection;
    mat4 viewProjection;
    vec4 cameraPosition;
};

layout(std140, binding = 2) uniform World {
    vec4 fogColor;
    float fogDensity;
    float fogGradient;
    int fogEnabled;
    float time;
};

layout(std140, binding = 3) uniform Shadow {
    int cascadeCount;
    float shadowBias;
    float farPlane;
    int shadowsEnabled;
    mat4 lightSpaceMatrices[16];
    vec4 cascadePlaneDistances[16];
};
"#;

/// Vertex stage of the default lit shader
pub fn lit_vertex_source() -> String {
    format!(
        r#"#version 420 core
layout(location = 0) in vec3 aPosition;
layout(location = 1) in vec3 aNormal;
layout(location = 2) in vec2 aTexCoord;
{BLOCKS}
uniform mat4 uModel;

out vec3 vWorldPosition;
out vec3 vNormal;
out vec2 vTexCoord;
out float vVisibility;

void main() {{
    vec4 world = uModel * vec4(aPosition, 1.0);
    vec4 eye = view * world;
    vWorldPosition = world.xyz;
    vNormal = mat3(transpose(inverse(uModel))) * aNormal;
    vTexCoord = aTexCoord;
    float distance = length(eye.xyz);
    vVisibility = clamp(exp(-pow(distance * fogDensity, fogGradient)), 0.0, 1.0);
    gl_Position = projection * eye;
}}
"#
    )
}

/// Fragment stage of the default lit shader
pub fn lit_fragment_source() -> String {
    format!(
        r#"#version 420 core
{BLOCKS}
in vec3 vWorldPosition;
in vec3 vNormal;
in vec2 vTexCoord;
in float vVisibility;

uniform sampler2D uTexture;
uniform sampler2DArray uShadowMap;
uniform vec4 uDiffuseColor;
uniform int uReceiveShadows;

out vec4 FragColor;

float shadowFactor(vec3 normal, vec3 lightDir) {{
    if (shadowsEnabled == 0 || uReceiveShadows == 0) {{
        return 0.0;
    }}
    float depth = abs((view * vec4(vWorldPosition, 1.0)).z);
    int layer = cascadeCount;
    for (int i = 0; i < cascadeCount; ++i) {{
        if (depth < cascadePlaneDistances[i].x) {{
            layer = i;
            break;
        }}
    }}
    vec4 lightSpace = lightSpaceMatrices[layer] * vec4(vWorldPosition, 1.0);
    vec3 projected = lightSpace.xyz / lightSpace.w * 0.5 + 0.5;
    if (projected.z > 1.0) {{
        return 0.0;
    }}
    float bias = max(shadowBias * (1.0 - dot(normal, lightDir)), shadowBias * 0.1);
    vec2 texel = 1.0 / vec2(textureSize(uShadowMap, 0));
    float shadow = 0.0;
    for (int x = -1; x <= 1; ++x) {{
        for (int y = -1; y <= 1; ++y) {{
            float closest = texture(uShadowMap, vec3(projected.xy + vec2(x, y) * texel, layer)).r;
            shadow += (projected.z - bias) > closest ? 1.0 : 0.0;
        }}
    }}
    return shadow / 9.0;
}}

void main() {{
    vec4 albedo = texture(uTexture, vTexCoord) * uDiffuseColor;
    vec3 normal = normalize(vNormal);
    vec3 viewDir = normalize(cameraPosition.xyz - vWorldPosition);
    vec3 result = vec3(0.0);

    for (int i = 0; i < 32; ++i) {{
        if (lights[i].active == 0) {{
            continue;
        }}
        vec3 lightDir;
        float attenuation = 1.0;
        if (lights[i].type == 0) {{
            lightDir = normalize(-lights[i].direction.xyz);
        }} else {{
            vec3 toLight = lights[i].position.xyz - vWorldPosition;
            float distance = length(toLight);
            lightDir = toLight / distance;
            attenuation = 1.0 / (lights[i].constant + lights[i].linear * distance
                + lights[i].quadratic * distance * distance);
        }}
        float diffuse = max(dot(normal, lightDir), 0.0);
        vec3 halfway = normalize(lightDir + viewDir);
        float specular = pow(max(dot(normal, halfway), 0.0), 32.0);
        float shadow = (i == 0 && lights[i].type == 0) ? shadowFactor(normal, lightDir) : 0.0;

        vec3 color = lights[i].color.rgb * lights[i].strength;
        vec3 ambient = lights[i].ambient.rgb * color;
        vec3 lit = (lights[i].diffuse.rgb * diffuse + lights[i].specular.rgb * specular) * color;
        result += (ambient + (1.0 - shadow) * lit) * attenuation;
    }}

    vec3 shaded = result * albedo.rgb;
    if (fogEnabled != 0) {{
        shaded = mix(fogColor.rgb, shaded, vVisibility);
    }}
    FragColor = vec4(shaded, albedo.a);
}}
"#
    )
}

/// Vertex stage of the shadow depth shader
pub fn depth_vertex_source() -> String {
    r#"#version 420 core
layout(location = 0) in vec3 aPosition;

uniform mat4 uModel;

void main() {
    gl_Position = uModel * vec4(aPosition, 1.0);
}
"#
    .to_string()
}

/// Geometry stage of the shadow depth shader, one invocation per cascade layer
pub fn depth_geometry_source(layers: usize) -> String {
    format!(
        r#"#version 420 core
layout(triangles, invocations = {layers}) in;
layout(triangle_strip, max_vertices = 3) out;
{BLOCKS}
void main() {{
    for (int i = 0; i < 3; ++i) {{
        gl_Position = lightSpaceMatrices[gl_InvocationID] * gl_in[i].gl_Position;
        gl_Layer = gl_InvocationID;
        EmitVertex();
    }}
    EndPrimitive();
}}
"#
    )
}

/// Fragment stage of the shadow depth shader
pub fn depth_fragment_source() -> String {
    r#"#version 420 core
void main() {
}
"#
    .to_string()
}

/// Vertex stage of the built-in 2D shader
pub fn ui_vertex_source() -> String {
    r#"#version 330 core
layout(location = 0) in vec2 aPosition;
layout(location = 1) in vec2 aTexCoord;
layout(location = 2) in vec4 aColor;

uniform mat4 uProjection;

out vec2 vTexCoord;
out vec4 vColor;

void main() {
    vTexCoord = aTexCoord;
    vColor = aColor;
    gl_Position = uProjection * vec4(aPosition, 0.0, 1.0);
}
"#
    .to_string()
}

/// Fragment stage of the built-in 2D shader
pub fn ui_fragment_source() -> String {
    r#"#version 330 core
in vec2 vTexCoord;
in vec4 vColor;

uniform sampler2D uTexture;
uniform float uTime;
uniform vec2 uResolution;
uniform int uIsFont;
uniform int uIsSDF;

out vec4 FragColor;

void main() {
    if (uIsFont == 1) {
        float sample = texture(uTexture, vTexCoord).r;
        if (uIsSDF == 1) {
            float width = fwidth(sample);
            float alpha = smoothstep(0.5 - width, 0.5 + width, sample);
            FragColor = vec4(vColor.rgb, vColor.a * alpha);
        } else {
            FragColor = vec4(vColor.rgb, vColor.a * sample);
        }
    } else {
        FragColor = texture(uTexture, vTexCoord) * vColor;
    }
}
"#
    .to_string()
}

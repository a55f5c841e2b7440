fn main() {
    // Re-run if this file changes (inline sources live here)
    println!("cargo:rerun-if-changed=build.rs");

    shaders::compile();
}

mod shaders {
    use std::{env, fs, path::PathBuf};

    // Matches the pipeline vertex layout:
    //   - location 0: R32G32B32_SFLOAT (pos)
    //   - location 1: R32G32B32_SFLOAT (color)
    //   - location 2: R32G32_SFLOAT    (tex coord)
    const VERT: &str = r#"
#version 450
layout(binding = 0) uniform UniformBufferObject {
    mat4 model;
    mat4 view;
    mat4 proj;
} ubo;

layout(location = 0) in vec3 inPosition;
layout(location = 1) in vec3 inColor;
layout(location = 2) in vec2 inTexCoord;

layout(location = 0) out vec3 fragColor;
layout(location = 1) out vec2 fragTexCoord;

void main() {
    gl_Position = ubo.proj * ubo.view * ubo.model * vec4(inPosition, 1.0);
    fragColor = inColor;
    fragTexCoord = inTexCoord;
}
"#;

    const FRAG: &str = r#"
#version 450
layout(binding = 1) uniform sampler2D texSampler;

layout(location = 0) in vec3 fragColor;
layout(location = 1) in vec2 fragTexCoord;

layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(fragColor, 1.0) * texture(texSampler, fragTexCoord);
}
"#;

    pub fn compile() {
        let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

        let comp = shaderc::Compiler::new().expect("shaderc compiler");
        let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
        opts.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_0 as u32,
        );
        opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

        for (src, kind, name, file) in [
            (VERT, shaderc::ShaderKind::Vertex, "shader.vert", "vert.spv"),
            (FRAG, shaderc::ShaderKind::Fragment, "shader.frag", "frag.spv"),
        ] {
            let spv = comp
                .compile_into_spirv(src, kind, name, "main", Some(&opts))
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            fs::write(out.join(file), spv.as_binary_u8())
                .unwrap_or_else(|e| panic!("write {file}: {e}"));
        }
    }
}

//! GLSL ES sources for the effects that ship with the overlay.
//!
//! Every effect draws with the same textured-quad vertex shader; only the
//! fragment stage differs. The uniforms (`u_Opacity`, `u_Time`,
//! `u_Resolution`) are fed by the draw loop, which lives outside this crate.

/// A named built-in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinShader {
    pub name: &'static str,
    pub vertex: &'static str,
    pub fragment: &'static str,
}

/// Effect used when a name is unknown.
pub const DEFAULT_SHADER: &str = "none";

pub const BUILTIN_SHADERS: [BuiltinShader; 4] = [
    BuiltinShader {
        name: "none",
        vertex: DEFAULT_VERTEX_SHADER,
        fragment: NONE_FRAGMENT_SHADER,
    },
    BuiltinShader {
        name: "crt",
        vertex: DEFAULT_VERTEX_SHADER,
        fragment: CRT_FRAGMENT_SHADER,
    },
    BuiltinShader {
        name: "scanlines",
        vertex: DEFAULT_VERTEX_SHADER,
        fragment: SCANLINES_FRAGMENT_SHADER,
    },
    BuiltinShader {
        name: "lcd",
        vertex: DEFAULT_VERTEX_SHADER,
        fragment: LCD_FRAGMENT_SHADER,
    },
];

pub fn builtin(name: &str) -> Option<&'static BuiltinShader> {
    BUILTIN_SHADERS.iter().find(|shader| shader.name == name)
}

/// Entry for `name`, or the default entry when it is not built in.
pub fn builtin_or_default(name: &str) -> &'static BuiltinShader {
    builtin(name).unwrap_or(&BUILTIN_SHADERS[0])
}

pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_SHADERS.iter().map(|shader| shader.name)
}

pub fn is_builtin(name: &str) -> bool {
    builtin(name).is_some()
}

/// Minimal always-compilable fragment shader substituted when an external
/// preset cannot be resolved. Tints the quad with a slow horizontal wave.
pub fn fallback_fragment_shader() -> &'static str {
    FALLBACK_FRAGMENT_SHADER
}

pub const DEFAULT_VERTEX_SHADER: &str = r"attribute vec4 a_Position;
attribute vec2 a_TexCoord;

uniform mat4 u_MVPMatrix;

varying vec2 v_TexCoord;

void main() {
    gl_Position = u_MVPMatrix * a_Position;
    v_TexCoord = a_TexCoord;
}
";

const NONE_FRAGMENT_SHADER: &str = r"precision mediump float;

uniform float u_Opacity;
uniform float u_Time;
uniform vec2 u_Resolution;

varying vec2 v_TexCoord;

void main() {
    vec3 color = vec3(0.0, 0.0, 0.0);
    gl_FragColor = vec4(color, 0.0);
}
";

const CRT_FRAGMENT_SHADER: &str = r"precision mediump float;

uniform float u_Opacity;
uniform float u_Time;
uniform vec2 u_Resolution;

varying vec2 v_TexCoord;

void main() {
    vec2 uv = v_TexCoord;
    vec2 dc = abs(0.5 - uv);
    dc *= dc;

    // barrel curvature
    uv.x -= 0.5; uv.x *= 1.0 + (dc.y * (0.3 * 0.5));
    uv.y -= 0.5; uv.y *= 1.0 + (dc.x * (0.4 * 0.5));
    uv += 0.5;

    float vig = pow(1.0 - dot(dc, dc), 0.5);
    float scanline = sin(uv.y * u_Resolution.y * 3.14159) * 0.04;

    // green phosphor
    vec3 col = vec3(0.2, 0.8, 0.3);
    col += scanline;
    col *= vig;

    gl_FragColor = vec4(col, u_Opacity * 0.3);
}
";

const SCANLINES_FRAGMENT_SHADER: &str = r"precision mediump float;

uniform float u_Opacity;
uniform float u_Time;
uniform vec2 u_Resolution;

varying vec2 v_TexCoord;

void main() {
    vec2 uv = v_TexCoord;

    float scanline = sin(uv.y * u_Resolution.y * 3.14159 * 2.0) * 0.5 + 0.5;
    scanline = pow(scanline, 2.0);
    float vertical = sin(uv.x * u_Resolution.x * 3.14159 * 0.5) * 0.1 + 0.9;

    vec3 color = vec3(0.0, 0.0, 0.0);
    float alpha = scanline * vertical * u_Opacity * 0.4;

    gl_FragColor = vec4(color, alpha);
}
";

const LCD_FRAGMENT_SHADER: &str = r"precision mediump float;

uniform float u_Opacity;
uniform float u_Time;
uniform vec2 u_Resolution;

varying vec2 v_TexCoord;

void main() {
    vec2 uv = v_TexCoord;

    vec2 grid = abs(fract(uv * u_Resolution / 3.0) - 0.5) / fwidth(uv * u_Resolution / 3.0);
    float line = min(grid.x, grid.y);

    // RGB subpixel stripes
    vec3 subpixel = vec3(1.0);
    float mod_x = mod(uv.x * u_Resolution.x, 3.0);
    if (mod_x < 1.0) subpixel = vec3(1.0, 0.3, 0.3);
    else if (mod_x < 2.0) subpixel = vec3(0.3, 1.0, 0.3);
    else subpixel = vec3(0.3, 0.3, 1.0);

    vec3 color = mix(vec3(0.0), subpixel * 0.2, 1.0 - min(line, 1.0));

    gl_FragColor = vec4(color, u_Opacity * 0.2);
}
";

const FALLBACK_FRAGMENT_SHADER: &str = r"#version 100
precision mediump float;

uniform float u_Opacity;
uniform float u_Time;
uniform vec2 u_Resolution;

varying vec2 v_TexCoord;

void main() {
    vec2 uv = v_TexCoord;
    vec3 color = vec3(0.5 + 0.3 * sin(u_Time + uv.x * 10.0));
    gl_FragColor = vec4(color, u_Opacity * 0.5);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_effects_in_menu_order() {
        let names: Vec<_> = builtin_names().collect();
        assert_eq!(names, ["none", "crt", "scanlines", "lcd"]);
        assert!(is_builtin("crt"));
        assert!(!is_builtin("CRT"));
    }

    #[test]
    fn every_effect_shares_the_default_vertex_shader() {
        for shader in &BUILTIN_SHADERS {
            assert_eq!(shader.vertex, DEFAULT_VERTEX_SHADER, "{}", shader.name);
            assert!(shader.fragment.contains("void main()"), "{}", shader.name);
        }
    }

    #[test]
    fn unknown_names_map_to_default_entry() {
        assert_eq!(builtin_or_default("vhs").name, DEFAULT_SHADER);
        assert_eq!(builtin_or_default("lcd").name, "lcd");
    }

    #[test]
    fn fallback_passes_validation_heuristic() {
        assert!(shadersource::validate_shader_source(fallback_fragment_shader()));
        assert!(fallback_fragment_shader().contains("u_Time"));
    }
}

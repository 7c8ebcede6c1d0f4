//! Parser for `.slangp` shader presets.
//!
//! A preset is a line-oriented `key = value` document describing a chain of
//! shader passes. The format is loosely specified and presets found in the
//! wild are frequently sloppy, so [`parse`] is total: lines it does not
//! understand are skipped one at a time and parsing carries on.
//!
//! Recognized keys:
//!
//! - `shaders` declares the pass count.
//! - `shader<N>` names the source file for pass `N`, relative to the preset.
//! - `filter_linear<N>` toggles linear filtering for pass `N`.
//! - `scale_type<N>` records the scale mode for pass `N` verbatim.
//! - `scale<N>` records the scale factor for pass `N`.
//!
//! Indices are sparse; nothing requires them to start at zero or to be
//! contiguous. A repeated key overwrites the earlier value.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::trace;

/// Scale factor recorded when a `scale<N>` value does not parse.
pub const DEFAULT_SCALE: f32 = 1.0;

/// Structured view of a preset document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPreset {
    pub shader_count: u32,
    pub shader_paths: BTreeMap<u32, String>,
    pub filter_linear: BTreeMap<u32, bool>,
    pub scale_types: BTreeMap<u32, String>,
    pub scales: BTreeMap<u32, f32>,
}

/// Per-pass settings gathered from the index tables of a [`ParsedPreset`].
#[derive(Debug, Clone, PartialEq)]
pub struct PresetPass<'a> {
    pub index: u32,
    pub path: Option<&'a str>,
    pub filter_linear: Option<bool>,
    pub scale_type: Option<ScaleType>,
    pub scale: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleType {
    Source,
    Viewport,
    Absolute,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown scale type '{0}' (expected source, viewport or absolute)")]
pub struct ScaleTypeError(String);

impl FromStr for ScaleType {
    type Err = ScaleTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(Self::Source),
            "viewport" => Ok(Self::Viewport),
            "absolute" => Ok(Self::Absolute),
            _ => Err(ScaleTypeError(value.to_string())),
        }
    }
}

impl fmt::Display for ScaleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleType::Source => f.write_str("source"),
            ScaleType::Viewport => f.write_str("viewport"),
            ScaleType::Absolute => f.write_str("absolute"),
        }
    }
}

impl ParsedPreset {
    /// Path of the pass at index 0, the one rendered when only a single pass
    /// is supported.
    pub fn first_shader_path(&self) -> Option<&str> {
        self.shader_paths.get(&0).map(String::as_str)
    }

    /// True when no pass declares a shader source.
    pub fn is_empty(&self) -> bool {
        self.shader_paths.is_empty()
    }

    /// Every index mentioned by any per-pass key, in ascending order.
    pub fn passes(&self) -> Vec<PresetPass<'_>> {
        let mut indices: Vec<u32> = self
            .shader_paths
            .keys()
            .chain(self.filter_linear.keys())
            .chain(self.scale_types.keys())
            .chain(self.scales.keys())
            .copied()
            .collect();
        indices.sort_unstable();
        indices.dedup();

        indices
            .into_iter()
            .map(|index| PresetPass {
                index,
                path: self.shader_paths.get(&index).map(String::as_str),
                filter_linear: self.filter_linear.get(&index).copied(),
                scale_type: self
                    .scale_types
                    .get(&index)
                    .and_then(|raw| raw.parse().ok()),
                scale: self.scales.get(&index).copied(),
            })
            .collect()
    }
}

/// Parses preset text. Never fails; malformed lines are ignored.
pub fn parse(content: &str) -> ParsedPreset {
    let mut preset = ParsedPreset::default();
    for (number, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if !parse_line(trimmed, &mut preset) {
            trace!(line = number + 1, text = trimmed, "skipping preset line");
        }
    }
    preset
}

/// Applies one non-comment line. Returns false when the line was ignored.
fn parse_line(line: &str, preset: &mut ParsedPreset) -> bool {
    let Some((key, value)) = line.split_once('=') else {
        return false;
    };
    let key = key.trim();
    let value = strip_quotes(value.trim());

    if key == "shaders" {
        return match value.parse::<u32>() {
            Ok(count) => {
                preset.shader_count = count;
                true
            }
            Err(_) => false,
        };
    }

    if key.starts_with("shader") && !key.contains('_') {
        return insert_indexed(&mut preset.shader_paths, key, "shader", value.to_string());
    }
    if key.starts_with("filter_linear") {
        let enabled = value.eq_ignore_ascii_case("true");
        return insert_indexed(&mut preset.filter_linear, key, "filter_linear", enabled);
    }
    if key.starts_with("scale_type") {
        return insert_indexed(&mut preset.scale_types, key, "scale_type", value.to_string());
    }
    if key.starts_with("scale") && !key.contains('_') {
        let scale = value.parse::<f32>().unwrap_or(DEFAULT_SCALE);
        return insert_indexed(&mut preset.scales, key, "scale", scale);
    }

    false
}

fn insert_indexed<T>(table: &mut BTreeMap<u32, T>, key: &str, prefix: &str, value: T) -> bool {
    match key.strip_prefix(prefix).and_then(parse_index) {
        Some(index) => {
            table.insert(index, value);
            true
        }
        None => false,
    }
}

/// Accepts plain decimal digits only; signs, spaces and empty suffixes are rejected.
fn parse_index(suffix: &str) -> Option<u32> {
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reference_document() {
        let preset = parse(
            "shaders=2\nshader0=a.slang\nfilter_linear0=true\nscale0=2.5\n#comment\nbadline",
        );
        assert_eq!(preset.shader_count, 2);
        assert_eq!(preset.shader_paths, BTreeMap::from([(0, "a.slang".to_string())]));
        assert_eq!(preset.filter_linear, BTreeMap::from([(0, true)]));
        assert_eq!(preset.scales, BTreeMap::from([(0, 2.5)]));
        assert!(preset.scale_types.is_empty());
    }

    #[test]
    fn trims_whitespace_and_strips_quotes() {
        let preset = parse("  shader1   =   \"shaders/crt-geom.slang\"  \r\nscale_type1 = \"viewport\"\n");
        assert_eq!(preset.shader_paths.get(&1).map(String::as_str), Some("shaders/crt-geom.slang"));
        assert_eq!(preset.scale_types.get(&1).map(String::as_str), Some("viewport"));
    }

    #[test]
    fn strips_only_one_pair_of_quotes() {
        let preset = parse("shader0 = \"\"a.slang\"\"");
        assert_eq!(preset.first_shader_path(), Some("\"a.slang\""));

        let lone = parse("shader0 = \"");
        assert_eq!(lone.first_shader_path(), Some("\""));
    }

    #[test]
    fn later_lines_win() {
        let preset = parse("shader0 = first.slang\nscale0 = 2\nshader0 = second.slang\nscale0 = 3");
        assert_eq!(preset.first_shader_path(), Some("second.slang"));
        assert_eq!(preset.scales.get(&0), Some(&3.0));
    }

    #[test]
    fn ignores_bad_indices_and_unknown_keys() {
        let preset = parse(
            "shader = a.slang\nshader-1 = b.slang\nshader+2 = c.slang\nshaderX = d.slang\n\
             shader_extra0 = e.slang\nalias0 = pass\nparameters = \"a;b\"\nshader3 = ok.slang",
        );
        assert_eq!(preset.shader_paths, BTreeMap::from([(3, "ok.slang".to_string())]));
    }

    #[test]
    fn unparseable_values_fall_back() {
        let preset = parse("shaders = many\nscale2 = wide\nfilter_linear2 = yes\nshaders = 4\nshaders = ?");
        assert_eq!(preset.shader_count, 4);
        assert_eq!(preset.scales.get(&2), Some(&DEFAULT_SCALE));
        assert_eq!(preset.filter_linear.get(&2), Some(&false));
    }

    #[test]
    fn scale_axis_keys_are_not_scale_factors() {
        let preset = parse("scale_x0 = 4.0\nscale_y0 = 2.0\nscale0 = 1.5");
        assert_eq!(preset.scales, BTreeMap::from([(0, 1.5)]));
    }

    #[test]
    fn sparse_indices_build_pass_views() {
        let preset = parse(
            "shader2 = b.slang\nshader7 = c.slang\nscale_type7 = absolute\nfilter_linear4 = TRUE",
        );
        let passes = preset.passes();
        let indices: Vec<u32> = passes.iter().map(|pass| pass.index).collect();
        assert_eq!(indices, vec![2, 4, 7]);
        assert_eq!(passes[1].path, None);
        assert_eq!(passes[1].filter_linear, Some(true));
        assert_eq!(passes[2].scale_type, Some(ScaleType::Absolute));
        assert_eq!(preset.first_shader_path(), None);
    }

    #[test]
    fn empty_and_comment_only_documents() {
        assert!(parse("").is_empty());
        assert!(parse("# only a comment\n\n   \n#shader0 = a.slang").is_empty());
    }

    #[test]
    fn scale_type_round_trips_display() {
        assert_eq!("Viewport".parse::<ScaleType>().unwrap(), ScaleType::Viewport);
        assert_eq!(ScaleType::Source.to_string(), "source");
        assert!("stretch".parse::<ScaleType>().is_err());
    }
}

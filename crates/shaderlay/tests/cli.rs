use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("config")).unwrap();
        fs::create_dir_all(root.path().join("cache")).unwrap();
        Self { root }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn run<I, S>(&self, args: I) -> Output
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new(env!("CARGO_BIN_EXE_shaderlay"))
            .env("SHADERLAY_CONFIG_DIR", self.path("config"))
            .env("SHADERLAY_CACHE_DIR", self.path("cache"))
            .env("RUST_LOG", "warn")
            .args(args)
            .output()
            .expect("failed to run shaderlay")
    }
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "shaderlay failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn cache_entries(dir: &Path) -> usize {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("cache"))
            .count(),
        Err(_) => 0,
    }
}

#[test]
fn build_persists_and_reuses_compiled_shader() {
    let sandbox = Sandbox::new();

    let first = stdout(&sandbox.run(["build", "crt"]));
    assert!(first.contains("built crt -> program#"), "{first}");
    assert!(first.contains("fragment=compiled"), "{first}");
    assert_eq!(cache_entries(&sandbox.path("cache/shader_cache")), 1);

    let second = stdout(&sandbox.run(["build", "crt"]));
    assert!(second.contains("fragment=cache-hit"), "{second}");

    let stats = stdout(&sandbox.run(["cache", "stats"]));
    assert!(stats.contains("persistent entries: 1"), "{stats}");

    stdout(&sandbox.run(["cache", "clear"]));
    assert_eq!(cache_entries(&sandbox.path("cache/shader_cache")), 0);
}

#[test]
fn no_persist_leaves_cache_dir_empty() {
    let sandbox = Sandbox::new();
    let output = stdout(&sandbox.run(["--no-persist", "build", "lcd"]));
    assert!(output.contains("built lcd"), "{output}");
    assert_eq!(cache_entries(&sandbox.path("cache/shader_cache")), 0);
}

#[test]
fn preset_resolves_first_pass_relative_to_preset() {
    let sandbox = Sandbox::new();
    let preset = sandbox.write(
        "library/crt/royale.slangp",
        "shaders = 2\nshader0 = \"shaders/first.slang\"\nfilter_linear0 = true\nshader1 = shaders/second.slang\n",
    );
    sandbox.write(
        "library/crt/shaders/first.slang",
        "#version 450\nvoid main() { first_pass(); }\n",
    );

    let imported = stdout(&sandbox.run([Path::new("import"), preset.as_path()]));
    assert!(imported.contains("imported royale"), "{imported}");
    assert!(imported.contains("filter_linear=true"), "{imported}");

    let preview = stdout(&sandbox.run([
        OsStr::new("--load"),
        preset.as_os_str(),
        OsStr::new("preview"),
        OsStr::new("royale"),
    ]));
    assert!(preview.contains("first_pass();"), "{preview}");
}

#[test]
fn broken_preset_falls_back_to_generated_shader() {
    let sandbox = Sandbox::new();
    let preset = sandbox.write("broken.slangp", "shaders = 1\nshader0 = missing.slang\n");

    let output = stdout(&sandbox.run([
        OsStr::new("--load"),
        preset.as_os_str(),
        OsStr::new("build"),
        OsStr::new("broken"),
    ]));
    assert!(output.contains("source=fallback"), "{output}");
}

#[test]
fn config_selects_default_shader_and_imports() {
    let sandbox = Sandbox::new();
    sandbox.write("config/shaders/glow.slang", "#version 100\nvoid main() { glow(); }\n");
    sandbox.write(
        "config/config.toml",
        "[overlay]\nshader = \"glow\"\nopacity = 3.0\nshaders = [\"shaders/glow.slang\"]\n",
    );

    let list = stdout(&sandbox.run(["list"]));
    assert!(list.contains("* glow"), "{list}");
    assert!(list.contains("scanlines"), "{list}");

    let preview = stdout(&sandbox.run(["preview"]));
    assert!(preview.contains("glow();"), "{preview}");
}

#[test]
fn unsupported_file_is_rejected() {
    let sandbox = Sandbox::new();
    let notes = sandbox.write("notes.txt", "not a shader");
    let output = sandbox.run([Path::new("import"), notes.as_path()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported shader file type"), "{stderr}");
}

#[test]
fn paths_reports_env_overrides() {
    let sandbox = Sandbox::new();
    let output = stdout(&sandbox.run(["paths"]));
    assert!(output.contains(&sandbox.path("config/config.toml").display().to_string()));
    assert!(output.contains(&sandbox.path("cache/shader_cache").display().to_string()));
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use renderer::{HeadlessBackend, RenderThread, ShaderManager};
use shadercache::{FsStore, ShaderCache};
use shadersource::{ExternalKind, FileReference};
use tracing_subscriber::EnvFilter;

use crate::cli::{CacheAction, Cli, Command, GlobalArgs};
use crate::config::Config;
use crate::paths::AppPaths;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Config plus a manager with every configured and `--load`ed shader imported.
struct Session {
    config: Config,
    manager: ShaderManager,
}

pub fn run(cli: Cli) -> Result<()> {
    let Cli { global, command } = cli;
    match command {
        Command::Paths => {
            let (paths, config_file) = resolve_paths(&global)?;
            print_paths(&paths, &config_file, global.no_persist)
        }
        Command::Import { files } => import_files(&mut open_session(&global)?, &files),
        Command::List => list_shaders(&open_session(&global)?),
        Command::Build { name } => {
            let session = open_session(&global)?;
            let name = name.unwrap_or_else(|| session.config.overlay.shader.clone());
            build_shader(session, name)
        }
        Command::Preview { name, vertex } => {
            let session = open_session(&global)?;
            let name = name.unwrap_or_else(|| session.config.overlay.shader.clone());
            preview_shader(&session, &name, vertex)
        }
        Command::Cache { action } => run_cache_action(&open_session(&global)?, action),
    }
}

fn resolve_paths(global: &GlobalArgs) -> Result<(AppPaths, PathBuf)> {
    let mut paths = AppPaths::discover()?;
    if let Some(dir) = &global.cache_dir {
        paths = paths.with_cache_dir(dir.clone());
    }
    let config_file = global
        .config
        .clone()
        .unwrap_or_else(|| paths.config_file());
    Ok((paths, config_file))
}

fn open_session(global: &GlobalArgs) -> Result<Session> {
    let (paths, config_file) = resolve_paths(global)?;
    let config = Config::load(&config_file)?;
    let overlay = &config.overlay;
    tracing::debug!(
        config = %config_file.display(),
        cache = %paths.cache_dir().display(),
        shader = %overlay.shader,
        opacity = overlay.opacity,
        performance = %overlay.performance,
        compiler = %global.compiler,
        "resolved shaderlay settings"
    );

    let cache_config = config.cache.cache_config();
    let cache = if global.no_persist {
        tracing::info!("shader cache persistence disabled (--no-persist)");
        ShaderCache::in_memory(cache_config)
    } else {
        let store = FsStore::in_dir(paths.cache_dir()).with_context(|| {
            format!("failed to open shader cache in {}", paths.cache_dir().display())
        })?;
        ShaderCache::new(store, cache_config)
    };

    let mut manager = ShaderManager::new(
        Arc::new(cache),
        global.compiler.create(),
        Box::new(HeadlessBackend::new()),
    );

    for path in &config.overlay.shaders {
        if let Err(err) = load_file(&mut manager, path) {
            tracing::warn!(path = %path.display(), error = %err, "skipping configured shader");
        }
    }
    for path in &global.load {
        load_file(&mut manager, path)?;
    }

    Ok(Session { config, manager })
}

fn load_file(manager: &mut ShaderManager, path: &Path) -> Result<String> {
    manager
        .load_external(Arc::new(FileReference::new(path)))
        .with_context(|| format!("failed to import {}", path.display()))
}

fn import_files(session: &mut Session, files: &[PathBuf]) -> Result<()> {
    for path in files {
        let name = load_file(&mut session.manager, path)?;
        let Some(shader) = session.manager.external_info(&name) else {
            continue;
        };
        match &shader.kind {
            ExternalKind::Direct { sources } => {
                let bytes: usize = sources.iter().map(String::len).sum();
                println!("imported {name:<24} shader  {} ({bytes} bytes)", path.display());
            }
            ExternalKind::Preset { content } => {
                let preset = slangp::parse(content);
                println!(
                    "imported {name:<24} preset  {} (declares {} passes)",
                    path.display(),
                    preset.shader_count
                );
                for pass in preset.passes() {
                    let scale_type = pass
                        .scale_type
                        .map(|scale_type| scale_type.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "  pass {:<3} {:<32} filter_linear={} scale_type={} scale={}",
                        pass.index,
                        pass.path.unwrap_or("-"),
                        pass.filter_linear.unwrap_or(false),
                        scale_type,
                        pass.scale.unwrap_or(slangp::DEFAULT_SCALE),
                    );
                }
            }
        }
    }
    Ok(())
}

fn list_shaders(session: &Session) -> Result<()> {
    for name in session.manager.available_shaders() {
        let kind = match session.manager.external_info(&name) {
            Some(shader) if shader.is_preset() => "preset",
            Some(_) => "external",
            None => "builtin",
        };
        let marker = if name == session.config.overlay.shader {
            "*"
        } else {
            " "
        };
        println!("{marker} {name:<24} {kind}");
    }
    Ok(())
}

fn build_shader(session: Session, name: String) -> Result<()> {
    let render = RenderThread::spawn(session.manager)?;
    let requested = name.clone();
    let built = render
        .call(move |manager| manager.create_program_info(&requested))?
        .with_context(|| format!("failed to build shader '{name}'"))?;
    let repeat = render.call({
        let name = name.clone();
        move |manager| manager.create_program(&name)
    })??;
    if repeat != built.program {
        return Err(anyhow!("program for '{name}' was rebuilt unexpectedly"));
    }
    let stats = render.call(|manager| manager.cache_stats())?;
    render.shutdown()?;

    println!(
        "built {name} -> {} (source={}, fragment={})",
        built.program, built.origin, built.compilation
    );
    println!(
        "cache: {} in memory, {} persisted",
        stats.memory_entries, stats.persistent_entries
    );
    Ok(())
}

fn preview_shader(session: &Session, name: &str, with_vertex: bool) -> Result<()> {
    let resolved = session.manager.resolve_sources(name);
    tracing::info!(
        shader = %name,
        source = %resolved.origin,
        fragment = %resolved.compilation,
        "resolved shader sources"
    );
    if with_vertex {
        println!("// vertex");
        print!("{}", resolved.vertex);
        println!("// fragment");
    }
    print!("{}", resolved.fragment);
    if !resolved.fragment.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn run_cache_action(session: &Session, action: CacheAction) -> Result<()> {
    match action {
        CacheAction::Stats => {
            let stats = session.manager.cache_stats();
            println!("memory entries:     {}", stats.memory_entries);
            println!("persistent entries: {}", stats.persistent_entries);
            println!("persistent bytes:   {}", stats.persistent_bytes);
        }
        CacheAction::Clear => {
            let before = session.manager.cache_stats();
            session.manager.clear_shader_cache();
            println!("removed {} cached shaders", before.persistent_entries);
        }
    }
    Ok(())
}

fn print_paths(paths: &AppPaths, config_file: &Path, no_persist: bool) -> Result<()> {
    println!("config dir:   {}", paths.config_dir().display());
    println!("config file:  {}", config_file.display());
    println!("cache dir:    {}", paths.cache_dir().display());
    if no_persist {
        println!("shader cache: (memory only)");
    } else {
        println!("shader cache: {}", paths.shader_cache_dir().display());
    }
    Ok(())
}

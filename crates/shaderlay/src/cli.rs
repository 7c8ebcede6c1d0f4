use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use renderer::CompilerKind;

#[derive(Parser, Debug)]
#[command(
    name = "shaderlay",
    author,
    version,
    about = "Shader overlay pipeline tools",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Cache directory; compiled shaders live in its `shader_cache/` folder.
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Config file to read instead of `<config dir>/config.toml`.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Keep compiled shaders in memory only.
    #[arg(long, global = true)]
    pub no_persist: bool,

    /// Import a shader file before running the command (repeatable).
    #[arg(long = "load", short = 'l', global = true, value_name = "FILE")]
    pub load: Vec<PathBuf>,

    /// Native compiler backend: `passthrough` or `shaderc`.
    #[arg(
        long,
        global = true,
        value_name = "COMPILER",
        value_parser = parse_compiler,
        default_value_t = CompilerKind::default()
    )]
    pub compiler: CompilerKind,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import `.slang` / `.slangp` files and describe them.
    Import {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
    /// List built-in and imported shaders.
    List,
    /// Resolve, compile and link a shader on the headless backend.
    Build {
        #[arg(value_name = "NAME")]
        name: Option<String>,
    },
    /// Print the fragment source a shader resolves to.
    Preview {
        #[arg(value_name = "NAME")]
        name: Option<String>,
        /// Print the vertex source as well.
        #[arg(long)]
        vertex: bool,
    },
    /// Inspect or clear the compiled shader cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Print resolved config and cache locations.
    Paths,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Entry counts and on-disk size.
    Stats,
    /// Delete every cached entry.
    Clear,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_compiler(value: &str) -> Result<CompilerKind, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("compiler must not be empty".to_string());
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "passthrough" | "none" => Ok(CompilerKind::Passthrough),
        "shaderc" => {
            if cfg!(feature = "shaderc") {
                Ok(CompilerKind::Shaderc)
            } else {
                Err("shaderc support is not enabled in this build".to_string())
            }
        }
        _ => Err("unknown compiler (expected passthrough or shaderc)".to_string()),
    }
}

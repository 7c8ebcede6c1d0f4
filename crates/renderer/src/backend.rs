//! Boundary to the graphics API that turns shader text into programs.
//!
//! The overlay's draw loop owns the real context; this crate only needs the
//! object lifecycle (create, link, query, delete). `HeadlessBackend` runs the
//! same lifecycle without a GPU so the pipeline can be driven from the
//! command line and from tests.
use std::collections::HashMap;
use std::fmt;

use shadercache::ShaderStage;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageHandle(u32);

impl StageHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Linked program owned by the `ShaderManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(u32);

impl ProgramHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProgramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program#{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("could not create {0} shader object")]
    CreateStage(ShaderStage),
    #[error("compile failed: {0}")]
    Compile(String),
    #[error("could not create program")]
    CreateProgram,
    #[error("link failed: {0}")]
    Link(String),
    #[error("unknown object handle {0}")]
    UnknownHandle(u32),
}

pub trait GpuBackend: Send {
    fn create_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageHandle, GpuError>;
    fn delete_stage(&mut self, stage: StageHandle);
    fn create_program(
        &mut self,
        vertex: StageHandle,
        fragment: StageHandle,
    ) -> Result<ProgramHandle, GpuError>;
    fn link(&mut self, program: ProgramHandle) -> Result<(), GpuError>;
    fn is_program(&self, program: ProgramHandle) -> bool;
    fn delete_program(&mut self, program: ProgramHandle);
}

#[derive(Debug, Clone, Copy)]
struct HeadlessProgram {
    vertex: ShaderStage,
    fragment: ShaderStage,
    linked: bool,
}

/// Software stand-in that performs structural checks only: non-empty source,
/// a `main` entry point and balanced braces.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u32,
    stages: HashMap<u32, ShaderStage>,
    programs: HashMap<u32, HeadlessProgram>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_stages(&self) -> usize {
        self.stages.len()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

fn check_structure(source: &str) -> Result<(), GpuError> {
    if source.trim().is_empty() {
        return Err(GpuError::Compile("empty source".into()));
    }
    if !source.contains("main") {
        return Err(GpuError::Compile("no main entry point".into()));
    }
    let mut depth: i64 = 0;
    for (line, text) in source.lines().enumerate() {
        for ch in text.chars() {
            match ch {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return Err(GpuError::Compile(format!(
                    "unexpected '}}' on line {}",
                    line + 1
                )));
            }
        }
    }
    if depth != 0 {
        return Err(GpuError::Compile(format!("{depth} unclosed '{{'")));
    }
    Ok(())
}

impl GpuBackend for HeadlessBackend {
    fn create_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageHandle, GpuError> {
        check_structure(source)?;
        let id = self.allocate();
        self.stages.insert(id, stage);
        trace!(%stage, id, "created stage");
        Ok(StageHandle(id))
    }

    fn delete_stage(&mut self, stage: StageHandle) {
        self.stages.remove(&stage.0);
    }

    fn create_program(
        &mut self,
        vertex: StageHandle,
        fragment: StageHandle,
    ) -> Result<ProgramHandle, GpuError> {
        let vertex = *self
            .stages
            .get(&vertex.0)
            .ok_or(GpuError::UnknownHandle(vertex.0))?;
        let fragment = *self
            .stages
            .get(&fragment.0)
            .ok_or(GpuError::UnknownHandle(fragment.0))?;
        let id = self.allocate();
        self.programs.insert(
            id,
            HeadlessProgram {
                vertex,
                fragment,
                linked: false,
            },
        );
        Ok(ProgramHandle(id))
    }

    fn link(&mut self, program: ProgramHandle) -> Result<(), GpuError> {
        let entry = self
            .programs
            .get_mut(&program.0)
            .ok_or(GpuError::UnknownHandle(program.0))?;
        if entry.vertex != ShaderStage::Vertex || entry.fragment != ShaderStage::Fragment {
            return Err(GpuError::Link(format!(
                "expected vertex + fragment, got {} + {}",
                entry.vertex, entry.fragment
            )));
        }
        entry.linked = true;
        Ok(())
    }

    fn is_program(&self, program: ProgramHandle) -> bool {
        self.programs
            .get(&program.0)
            .map(|entry| entry.linked)
            .unwrap_or(false)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "void main() { if (true) { } }";

    #[test]
    fn structural_checks() {
        assert!(check_structure(VALID).is_ok());
        assert!(check_structure("   ").is_err());
        assert!(check_structure("void entry() {}").is_err());
        assert!(check_structure("void main() {").is_err());
        assert!(check_structure("void main() }{").is_err());
    }

    #[test]
    fn program_lifecycle() {
        let mut gpu = HeadlessBackend::new();
        let vertex = gpu.create_stage(ShaderStage::Vertex, VALID).unwrap();
        let fragment = gpu.create_stage(ShaderStage::Fragment, VALID).unwrap();
        let program = gpu.create_program(vertex, fragment).unwrap();
        assert!(!gpu.is_program(program), "unlinked programs are not usable");

        gpu.link(program).unwrap();
        gpu.delete_stage(vertex);
        gpu.delete_stage(fragment);
        assert!(gpu.is_program(program));
        assert_eq!(gpu.live_stages(), 0);

        gpu.delete_program(program);
        assert!(!gpu.is_program(program));
        assert_eq!(gpu.live_programs(), 0);
    }

    #[test]
    fn link_rejects_mismatched_stages() {
        let mut gpu = HeadlessBackend::new();
        let first = gpu.create_stage(ShaderStage::Fragment, VALID).unwrap();
        let second = gpu.create_stage(ShaderStage::Fragment, VALID).unwrap();
        let program = gpu.create_program(first, second).unwrap();
        assert!(matches!(gpu.link(program), Err(GpuError::Link(_))));
    }

    #[test]
    fn unknown_stage_handles_are_rejected() {
        let mut gpu = HeadlessBackend::new();
        let vertex = gpu.create_stage(ShaderStage::Vertex, VALID).unwrap();
        assert_eq!(
            gpu.create_program(vertex, StageHandle::from_raw(99)),
            Err(GpuError::UnknownHandle(99))
        );
    }
}

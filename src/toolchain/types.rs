use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Supported compiler families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompilerType {
    /// Clang/LLVM (clang++)
    Clang,
    /// GNU Compiler Collection (g++)
    Gcc,
}

/// A discovered compiler toolchain plus the command shape for every
/// abstract recipe kind. The core never builds argv itself; it goes through
/// these methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toolchain {
    /// Compiler family
    pub compiler_type: CompilerType,

    /// Absolute path to the C++ compiler driver (also drives linking)
    pub cxx_path: PathBuf,

    /// Archiver command
    pub ar_path: PathBuf,

    /// Compiler version string
    pub version: String,
}

impl Toolchain {
    pub fn new(compiler_type: CompilerType, cxx_path: PathBuf, version: String) -> Self {
        Self {
            compiler_type,
            cxx_path,
            ar_path: PathBuf::from("ar"),
            version,
        }
    }

    fn driver(&self) -> String {
        self.cxx_path.to_string_lossy().into_owned()
    }

    pub fn compile_command(
        &self,
        source: &Path,
        object: &Path,
        include_paths: &[PathBuf],
        directives: &[String],
    ) -> Vec<String> {
        let mut cmd = vec![
            self.driver(),
            "-fdiagnostics-color=always".to_string(),
            "-fPIC".to_string(),
            "-c".to_string(),
        ];
        cmd.extend(directives.iter().cloned());
        cmd.push("-o".to_string());
        cmd.push(object.to_string_lossy().into_owned());
        cmd.push(source.to_string_lossy().into_owned());
        cmd.extend(prefixed(include_paths, "-I"));
        cmd
    }

    /// Header dependency generation: `driver -MM source -MF depfile`.
    pub fn dependency_command(
        &self,
        source: &Path,
        dependency_file: &Path,
        include_paths: &[PathBuf],
    ) -> Vec<String> {
        let mut cmd = vec![self.driver(), "-MM".to_string()];
        cmd.push(source.to_string_lossy().into_owned());
        cmd.extend(prefixed(include_paths, "-I"));
        cmd.push("-MF".to_string());
        cmd.push(dependency_file.to_string_lossy().into_owned());
        cmd
    }

    pub fn link_library_command(
        &self,
        destination: &Path,
        objects: &[PathBuf],
        library_paths: &[PathBuf],
        libraries: &[String],
    ) -> Vec<String> {
        let mut cmd = vec![self.driver(), "-shared".to_string(), "-o".to_string()];
        cmd.push(destination.to_string_lossy().into_owned());
        cmd.extend(objects.iter().map(|o| o.to_string_lossy().into_owned()));
        cmd.extend(prefixed(library_paths, "-L"));
        cmd.extend(
            library_paths
                .iter()
                .map(|p| format!("-Wl,-rpath-link={}", p.display())),
        );
        cmd.extend(libraries.iter().map(|l| format!("-l{l}")));
        cmd
    }

    pub fn link_executable_command(
        &self,
        destination: &Path,
        objects: &[PathBuf],
        library_paths: &[PathBuf],
        libraries: &[String],
    ) -> Vec<String> {
        let mut cmd = vec![self.driver(), "-o".to_string()];
        cmd.push(destination.to_string_lossy().into_owned());
        cmd.extend(objects.iter().map(|o| o.to_string_lossy().into_owned()));
        cmd.extend(prefixed(library_paths, "-L"));
        cmd.extend(libraries.iter().map(|l| format!("-l{l}")));
        cmd
    }

    pub fn link_archive_command(&self, destination: &Path, objects: &[PathBuf]) -> Vec<String> {
        let mut cmd = vec![
            self.ar_path.to_string_lossy().into_owned(),
            "rcs".to_string(),
        ];
        cmd.push(destination.to_string_lossy().into_owned());
        cmd.extend(objects.iter().map(|o| o.to_string_lossy().into_owned()));
        cmd
    }
}

fn prefixed(paths: &[PathBuf], prefix: &str) -> Vec<String> {
    paths
        .iter()
        .map(|p| format!("{prefix}{}", p.display()))
        .collect()
}

/// Toolchain discovery errors.
#[derive(Debug)]
pub enum ToolchainError {
    /// No suitable compiler found
    NotFound(String),
    /// IO error while probing
    IoError(std::io::Error),
}

impl std::fmt::Display for ToolchainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolchainError::NotFound(msg) => write!(f, "Toolchain not found: {}", msg),
            ToolchainError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ToolchainError {}

impl From<std::io::Error> for ToolchainError {
    fn from(e: std::io::Error) -> Self {
        ToolchainError::IoError(e)
    }
}

//! The build-description DSL, hosted on a Rhai engine.
//!
//! A build script is a thin imperative program: every DSL call registers
//! targets, edges and recipes in the shared [`Registry`] as a side effect,
//! and running the top-level script leaves behind the complete graph.
//! Nested `build("sub/makefile.rhai")` calls recurse with a fresh engine so
//! each script sees its own include and library path declarations.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Result, anyhow};
use rhai::{Array, Dynamic, Engine, EvalAltResult};
use walkdir::WalkDir;

use crate::model::{self, ModelError, Registry, TargetId};
use crate::recipe::{
    ArchiveArgs, CleanArgs, CompileArgs, GenerateArgs, InstallArgs, LinkArgs, Recipe, TestArgs,
};
use crate::toolchain;

pub const GROUP_COMPILE: &str = "compile";
pub const GROUP_LINK: &str = "link";
pub const GROUP_LINK_LIBRARY: &str = "link-library";
pub const GROUP_LINK_ARCHIVE: &str = "link-archive";
pub const GROUP_LINK_EXECUTABLE: &str = "link-executable";
pub const GROUP_LINK_UNITTEST: &str = "link-unittest";
pub const GROUP_TEST: &str = "test";
pub const GROUP_CLEAN: &str = "clean";
pub const GROUP_INSTALL: &str = "install";

struct HostState {
    registry: RefCell<Registry>,
    // stack of scripts being evaluated, innermost last
    scripts: RefCell<Vec<PathBuf>>,
}

impl HostState {
    fn current_script(&self) -> PathBuf {
        self.scripts.borrow().last().cloned().unwrap_or_default()
    }
}

/// Owns the registry while build scripts populate it.
pub struct ScriptHost {
    state: Rc<HostState>,
}

impl ScriptHost {
    /// Create a host with the well-known group targets already registered.
    pub fn new() -> Result<Self> {
        let mut registry = Registry::new();
        for group in [
            GROUP_COMPILE,
            GROUP_LINK,
            GROUP_LINK_LIBRARY,
            GROUP_LINK_ARCHIVE,
            GROUP_LINK_EXECUTABLE,
            GROUP_LINK_UNITTEST,
            GROUP_TEST,
            GROUP_CLEAN,
            GROUP_INSTALL,
        ] {
            registry.register(group, None, None)?;
        }
        for member in [
            GROUP_LINK_LIBRARY,
            GROUP_LINK_ARCHIVE,
            GROUP_LINK_EXECUTABLE,
            GROUP_LINK_UNITTEST,
        ] {
            let member = registry
                .get(member, None, None)
                .ok_or(ModelError::UnknownTarget(member.to_string()))?;
            let link = registry
                .get(GROUP_LINK, None, None)
                .ok_or(ModelError::UnknownTarget(GROUP_LINK.to_string()))?;
            registry.target_mut(link).add_dependency(member);
        }
        let test = registry
            .get(GROUP_TEST, None, None)
            .ok_or(ModelError::UnknownTarget(GROUP_TEST.to_string()))?;
        registry.target_mut(test).set_execute(true);
        registry.target_mut(test).set_serial(true);
        let install = registry
            .get(GROUP_INSTALL, None, None)
            .ok_or(ModelError::UnknownTarget(GROUP_INSTALL.to_string()))?;
        registry.target_mut(install).set_serial(true);

        Ok(Self {
            state: Rc::new(HostState {
                registry: RefCell::new(registry),
                scripts: RefCell::new(Vec::new()),
            }),
        })
    }

    /// Evaluate the top-level build script.
    pub fn run_file(&self, path: &Path) -> Result<()> {
        run_script(self.state.clone(), path.to_path_buf())
    }

    /// Tear down the host and hand the populated registry over.
    pub fn finish(self) -> Result<Registry> {
        let state = Rc::try_unwrap(self.state)
            .map_err(|_| anyhow!("build script evaluation still in progress"))?;
        Ok(state.registry.into_inner())
    }
}

fn run_script(state: Rc<HostState>, path: PathBuf) -> Result<()> {
    let path = model::absolute(&path);
    if !path.exists() {
        return Err(anyhow!("build script {} not found", path.display()));
    }
    state.scripts.borrow_mut().push(path.clone());
    let engine = build_engine(state.clone());
    let result = engine
        .run_file(path.clone())
        .map_err(|error| anyhow!("{}: {}", path.display(), error));
    state.scripts.borrow_mut().pop();
    result
}

fn runtime(error: impl ToString) -> Box<EvalAltResult> {
    error.to_string().into()
}

fn group(registry: &Registry, name: &str) -> Result<TargetId, Box<EvalAltResult>> {
    registry
        .get(name, None, None)
        .ok_or_else(|| runtime(ModelError::UnknownTarget(name.to_string())))
}

fn strings(values: Array) -> Result<Vec<String>, Box<EvalAltResult>> {
    values
        .into_iter()
        .map(|value| value.into_string().map_err(runtime))
        .collect()
}

fn paths(values: Array) -> Result<Vec<PathBuf>, Box<EvalAltResult>> {
    Ok(strings(values)?.into_iter().map(PathBuf::from).collect())
}

/// Resolve a target declared earlier: first by its script-relative file
/// path, then by bare name.
fn resolve(registry: &Registry, name: &str, script: &Path) -> Option<TargetId> {
    let directory = script.parent().unwrap_or(Path::new(""));
    let candidate = model::absolute(&directory.join(name));
    registry
        .get(name, Some(&candidate), None)
        .or_else(|| registry.get(name, None, None))
}

/// The build description is itself an input: targets registered by a script
/// depend on it, so editing the script invalidates its artifacts.
fn script_target(
    registry: &mut Registry,
    script: &Path,
) -> Result<TargetId, Box<EvalAltResult>> {
    registry
        .register(&script.display().to_string(), Some(script), Some(script))
        .map_err(runtime)
}

fn attach_clean(
    registry: &mut Registry,
    script: &Path,
    files: Vec<PathBuf>,
) -> Result<(), Box<EvalAltResult>> {
    let name = files
        .first()
        .map(|f| format!("clean-{}", f.display()))
        .ok_or_else(|| runtime("clean step without files"))?;
    let id = registry.register(&name, None, Some(script)).map_err(runtime)?;
    registry.target_mut(id).set_execute(true);
    registry.target_mut(id).add_recipe(Recipe::Clean(CleanArgs { files }));
    let clean = group(registry, GROUP_CLEAN)?;
    registry.target_mut(clean).add_dependency(id);
    Ok(())
}

fn compile_impl(
    state: &HostState,
    source: &str,
    directives: Vec<String>,
) -> Result<String, Box<EvalAltResult>> {
    let script = state.current_script();
    let directory = script.parent().unwrap_or(Path::new("")).to_path_buf();
    let mut registry = state.registry.borrow_mut();

    let include_paths = registry.include_paths(&script);
    let object = toolchain::object_name(source);
    let dependency_file = model::absolute(&directory.join(toolchain::dependency_name(&object)));

    let source_id = registry
        .register(source, Some(Path::new(source)), Some(&script))
        .map_err(runtime)?;
    let object_id = registry
        .register(&object, Some(Path::new(&object)), Some(&script))
        .map_err(runtime)?;
    registry.target_mut(object_id).add_dependency(source_id);
    let script_id = script_target(&mut registry, &script)?;
    registry.target_mut(object_id).add_dependency(script_id);

    // header edges from the previous run's dependency file
    if let Ok(contents) = fs::read_to_string(&dependency_file) {
        for header in parse_dependency_file(&contents) {
            let header_id = registry
                .register(&header, Some(Path::new(&header)), Some(&script))
                .map_err(runtime)?;
            registry.target_mut(object_id).add_dependency(header_id);
        }
    }

    registry.target_mut(object_id).add_recipe(Recipe::Generate(GenerateArgs {
        source: source_id,
        dependency_file: dependency_file.clone(),
        include_paths: include_paths.clone(),
    }));
    registry.target_mut(object_id).add_recipe(Recipe::Compile(CompileArgs {
        source: source_id,
        object: object_id,
        include_paths,
        directives,
    }));

    let object_file = registry
        .target(object_id)
        .filename()
        .map(Path::to_path_buf)
        .ok_or_else(|| runtime("object target without file"))?;
    attach_clean(&mut registry, &script, vec![object_file, dependency_file])?;

    let compile = group(&registry, GROUP_COMPILE)?;
    registry.target_mut(compile).add_dependency(object_id);
    Ok(object)
}

struct LinkRequest<'a> {
    name: &'a str,
    filename: String,
    objects: Array,
    libraries: Array,
    group: &'static str,
}

/// Shared plumbing for every link flavor: resolve the object and library
/// targets, wire the edges, register the clean step. Returns the
/// destination plus the resolved pieces for the caller's recipe.
fn link_impl(
    state: &HostState,
    request: LinkRequest<'_>,
) -> Result<(TargetId, Vec<TargetId>, Vec<String>, Vec<PathBuf>), Box<EvalAltResult>> {
    let script = state.current_script();
    let mut registry = state.registry.borrow_mut();
    let library_paths = registry.library_paths(&script);

    let destination = registry
        .register(request.name, Some(Path::new(&request.filename)), Some(&script))
        .map_err(runtime)?;

    let mut object_ids = Vec::new();
    for object in strings(request.objects)? {
        let id = resolve(&registry, &object, &script)
            .ok_or_else(|| runtime(ModelError::UnknownTarget(object.clone())))?;
        object_ids.push(id);
    }
    registry.target_mut(destination).add_dependencies(&object_ids);
    let script_id = script_target(&mut registry, &script)?;
    registry.target_mut(destination).add_dependency(script_id);

    // a library that resolves to a target in the graph becomes an edge;
    // anything else is assumed to be a system library
    let libraries = strings(request.libraries)?;
    for library in &libraries {
        if let Some(id) = registry.get(library, None, Some(&library_paths)) {
            registry.target_mut(destination).add_dependency(id);
        }
    }

    let destination_file = registry
        .target(destination)
        .filename()
        .map(Path::to_path_buf)
        .ok_or_else(|| runtime("link target without file"))?;
    attach_clean(&mut registry, &script, vec![destination_file])?;

    let group_id = group(&registry, request.group)?;
    registry.target_mut(group_id).add_dependency(destination);

    Ok((destination, object_ids, libraries, library_paths))
}

fn build_engine(state: Rc<HostState>) -> Engine {
    let mut engine = Engine::new();

    let host = state.clone();
    engine.register_fn(
        "compile",
        move |source: &str| -> Result<String, Box<EvalAltResult>> {
            compile_impl(&host, source, Vec::new())
        },
    );

    let host = state.clone();
    engine.register_fn(
        "compile",
        move |source: &str, directives: &str| -> Result<String, Box<EvalAltResult>> {
            let directives = directives.split_whitespace().map(str::to_string).collect();
            compile_impl(&host, source, directives)
        },
    );

    let host = state.clone();
    engine.register_fn(
        "link_library",
        move |name: &str, objects: Array, libraries: Array| -> Result<String, Box<EvalAltResult>> {
            let filename = format!("bin/{}", toolchain::library_filename(name));
            let (destination, objects, libraries, library_paths) = link_impl(
                &host,
                LinkRequest {
                    name,
                    filename,
                    objects,
                    libraries,
                    group: GROUP_LINK_LIBRARY,
                },
            )?;
            host.registry
                .borrow_mut()
                .target_mut(destination)
                .add_recipe(Recipe::LinkLibrary(LinkArgs {
                    destination,
                    objects,
                    libraries,
                    library_paths,
                }));
            Ok(name.to_string())
        },
    );

    let host = state.clone();
    engine.register_fn(
        "link_archive",
        move |name: &str, objects: Array| -> Result<String, Box<EvalAltResult>> {
            let filename = format!("bin/{}", toolchain::archive_filename(name));
            let (destination, objects, _, _) = link_impl(
                &host,
                LinkRequest {
                    name,
                    filename,
                    objects,
                    libraries: Array::new(),
                    group: GROUP_LINK_ARCHIVE,
                },
            )?;
            host.registry
                .borrow_mut()
                .target_mut(destination)
                .add_recipe(Recipe::LinkArchive(ArchiveArgs {
                    destination,
                    objects,
                }));
            Ok(name.to_string())
        },
    );

    let host = state.clone();
    engine.register_fn(
        "link_executable",
        move |name: &str, objects: Array, libraries: Array| -> Result<String, Box<EvalAltResult>> {
            let filename = format!("bin/{name}");
            let (destination, objects, libraries, library_paths) = link_impl(
                &host,
                LinkRequest {
                    name,
                    filename,
                    objects,
                    libraries,
                    group: GROUP_LINK_EXECUTABLE,
                },
            )?;
            host.registry
                .borrow_mut()
                .target_mut(destination)
                .add_recipe(Recipe::LinkExecutable(LinkArgs {
                    destination,
                    objects,
                    libraries,
                    library_paths,
                }));
            Ok(name.to_string())
        },
    );

    let host = state.clone();
    engine.register_fn(
        "unittest",
        move |name: &str, objects: Array, libraries: Array| -> Result<String, Box<EvalAltResult>> {
            let executable = format!("test-{name}");
            let filename = format!("bin/{executable}");
            // test binaries always link against the test framework
            let mut libraries = libraries;
            libraries.push(Dynamic::from("gtest"));
            libraries.push(Dynamic::from("gtest_main"));
            let (destination, objects, libraries, library_paths) = link_impl(
                &host,
                LinkRequest {
                    name: &executable,
                    filename,
                    objects,
                    libraries,
                    group: GROUP_LINK_UNITTEST,
                },
            )?;
            let script = host.current_script();
            let mut registry = host.registry.borrow_mut();
            registry
                .target_mut(destination)
                .add_recipe(Recipe::LinkExecutable(LinkArgs {
                    destination,
                    objects,
                    libraries,
                    library_paths: library_paths.clone(),
                }));

            // the run step always executes and never in parallel with
            // other tests
            let runner = registry
                .register(&format!("unittest-{name}"), None, Some(&script))
                .map_err(runtime)?;
            registry.target_mut(runner).set_execute(true);
            registry.target_mut(runner).set_serial(true);
            registry.target_mut(runner).add_dependency(destination);
            registry.target_mut(runner).add_recipe(Recipe::Test(TestArgs {
                executable: destination,
                library_paths,
            }));
            let test = group(&registry, GROUP_TEST)?;
            registry.target_mut(test).add_dependency(runner);
            Ok(executable)
        },
    );

    let host = state.clone();
    engine.register_fn(
        "install",
        move |source: &str, destination: &str| -> Result<(), Box<EvalAltResult>> {
            install_impl(&host, source, destination)
        },
    );

    let host = state.clone();
    engine.register_fn(
        "install",
        move |sources: Array, destination: &str| -> Result<(), Box<EvalAltResult>> {
            for source in strings(sources)? {
                install_impl(&host, &source, destination)?;
            }
            Ok(())
        },
    );

    let host = state.clone();
    engine.register_fn(
        "include_paths",
        move |values: Array| -> Result<(), Box<EvalAltResult>> {
            let script = host.current_script();
            host.registry
                .borrow_mut()
                .set_include_paths(&script, paths(values)?);
            Ok(())
        },
    );

    let host = state.clone();
    engine.register_fn(
        "library_paths",
        move |values: Array| -> Result<(), Box<EvalAltResult>> {
            let script = host.current_script();
            host.registry
                .borrow_mut()
                .set_library_paths(&script, paths(values)?);
            Ok(())
        },
    );

    let host = state.clone();
    engine.register_fn(
        "dependencies",
        move |target: &str, dependencies: Array| -> Result<(), Box<EvalAltResult>> {
            let script = host.current_script();
            let mut registry = host.registry.borrow_mut();
            let target_id = resolve(&registry, target, &script)
                .ok_or_else(|| runtime(ModelError::UnknownTarget(target.to_string())))?;
            for dependency in strings(dependencies)? {
                let dependency_id = resolve(&registry, &dependency, &script)
                    .ok_or_else(|| runtime(ModelError::UnknownTarget(dependency)))?;
                registry.target_mut(target_id).add_dependency(dependency_id);
            }
            Ok(())
        },
    );

    let host = state.clone();
    engine.register_fn(
        "build",
        move |file: &str| -> Result<(), Box<EvalAltResult>> {
            let script = host.current_script();
            let directory = script.parent().unwrap_or(Path::new("")).to_path_buf();
            run_script(host.clone(), directory.join(file)).map_err(runtime)
        },
    );

    let host = state.clone();
    engine.register_fn(
        "sources",
        move |directory: &str, extension: &str| -> Result<Array, Box<EvalAltResult>> {
            let script = host.current_script();
            let base = script.parent().unwrap_or(Path::new("")).to_path_buf();
            let root = base.join(directory);

            let mut found = Vec::new();
            for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&base) {
                    found.push(relative.display().to_string());
                }
            }
            found.sort();
            Ok(found.into_iter().map(Dynamic::from).collect())
        },
    );

    engine
}

fn install_impl(
    state: &HostState,
    source: &str,
    destination: &str,
) -> Result<(), Box<EvalAltResult>> {
    let script = state.current_script();
    let directory = script.parent().unwrap_or(Path::new("")).to_path_buf();
    let mut registry = state.registry.borrow_mut();

    let source_path = model::absolute(&directory.join(source));
    let destination_path = {
        let raw = Path::new(destination);
        if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            model::absolute(&directory.join(raw))
        }
    };

    let id = registry
        .register(&format!("install-{}", source_path.display()), None, Some(&script))
        .map_err(runtime)?;
    registry.target_mut(id).set_execute(true);
    registry.target_mut(id).set_serial(true);
    registry.target_mut(id).add_recipe(Recipe::Install(InstallArgs {
        source: source_path,
        destination: destination_path,
    }));
    if let Some(artifact) = resolve(&registry, source, &script) {
        registry.target_mut(id).add_dependency(artifact);
    }
    let install = group(&registry, GROUP_INSTALL)?;
    registry.target_mut(install).add_dependency(id);
    Ok(())
}

/// Extract the prerequisite list from a compiler-generated `.d` file.
pub fn parse_dependency_file(contents: &str) -> Vec<String> {
    let joined = contents.replace("\\\r\n", " ").replace("\\\n", " ");
    let Some((_, prerequisites)) = joined.split_once(':') else {
        return Vec::new();
    };
    prerequisites.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_parse_dependency_file() {
        let parsed = parse_dependency_file("obj/main.o: src/main.cpp include/a.h");
        assert_eq!(parsed, vec!["src/main.cpp", "include/a.h"]);
    }

    #[test]
    fn test_parse_dependency_file_with_continuations() {
        let parsed = parse_dependency_file("obj/main.o: src/main.cpp \\\n include/a.h \\\n include/b.h\n");
        assert_eq!(parsed, vec!["src/main.cpp", "include/a.h", "include/b.h"]);
    }

    #[test]
    fn test_parse_dependency_file_without_rule() {
        assert!(parse_dependency_file("").is_empty());
    }

    #[test]
    fn test_compile_and_link_executable() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("src/main.cpp"), "int main() {}");
        let script = dir.path().join("makefile.rhai");
        write(
            &script,
            r#"
            include_paths(["include"]);
            let object = compile("src/main.cpp");
            link_executable("app", [object], []);
            "#,
        );

        let host = ScriptHost::new().unwrap();
        host.run_file(&script).unwrap();
        let registry = host.finish().unwrap();

        let app = registry.get("app", None, None).unwrap();
        assert!(matches!(
            registry.target(app).recipes(),
            [Recipe::LinkExecutable(_)]
        ));
        assert_eq!(
            registry.target(app).filename(),
            Some(dir.path().join("bin/app").as_path())
        );

        let object = registry.get("obj/main.o", None, None).unwrap();
        assert!(matches!(
            registry.target(object).recipes(),
            [Recipe::Generate(_), Recipe::Compile(_)]
        ));
        assert!(registry.target(app).dependencies().contains(&object));

        // the clean group collects a step per artifact
        let clean = registry.get(GROUP_CLEAN, None, None).unwrap();
        assert_eq!(registry.target(clean).dependencies().len(), 2);
    }

    #[test]
    fn test_compile_reads_existing_dependency_file() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("src/main.cpp"), "int main() {}");
        write(&dir.path().join("include/a.h"), "#pragma once");
        write(
            &dir.path().join("obj/main.d"),
            "obj/main.o: src/main.cpp include/a.h\n",
        );
        let script = dir.path().join("makefile.rhai");
        write(&script, r#"compile("src/main.cpp");"#);

        let host = ScriptHost::new().unwrap();
        host.run_file(&script).unwrap();
        let registry = host.finish().unwrap();

        let object = registry.get("obj/main.o", None, None).unwrap();
        let header = registry.get("include/a.h", None, None).unwrap();
        assert!(registry.target(object).dependencies().contains(&header));
    }

    #[test]
    fn test_library_resolves_into_dependency_edge() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("src/lib.cpp"), "");
        write(&dir.path().join("src/main.cpp"), "int main() {}");
        let script = dir.path().join("makefile.rhai");
        write(
            &script,
            r#"
            library_paths(["bin"]);
            let lib_object = compile("src/lib.cpp");
            link_library("common", [lib_object], []);
            let object = compile("src/main.cpp");
            link_executable("app", [object], ["common", "pthread"]);
            "#,
        );

        let host = ScriptHost::new().unwrap();
        host.run_file(&script).unwrap();
        let registry = host.finish().unwrap();

        let app = registry.get("app", None, None).unwrap();
        let common = registry
            .get("common", None, Some(&[dir.path().join("bin")]))
            .unwrap();
        assert!(registry.target(app).dependencies().contains(&common));

        // both resolved and system libraries stay on the link line
        let [Recipe::LinkExecutable(args)] = registry.target(app).recipes() else {
            panic!("expected a link recipe");
        };
        assert_eq!(args.libraries, vec!["common", "pthread"]);
    }

    #[test]
    fn test_targets_depend_on_their_build_script() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("src/main.cpp"), "int main() {}");
        let script = dir.path().join("makefile.rhai");
        write(
            &script,
            r#"
            let object = compile("src/main.cpp");
            link_executable("app", [object], []);
            "#,
        );

        let host = ScriptHost::new().unwrap();
        host.run_file(&script).unwrap();
        let registry = host.finish().unwrap();

        let script_id = registry
            .get(&model::absolute(&script).display().to_string(), None, None)
            .unwrap();
        let object = registry.get("obj/main.o", None, None).unwrap();
        let app = registry.get("app", None, None).unwrap();
        assert!(registry.target(object).dependencies().contains(&script_id));
        assert!(registry.target(app).dependencies().contains(&script_id));
    }

    #[test]
    fn test_group_targets_carry_execution_flags() {
        let registry = ScriptHost::new().unwrap().finish().unwrap();
        let test = registry.get(GROUP_TEST, None, None).unwrap();
        assert!(registry.target(test).execute());
        assert!(registry.target(test).serial());
        let install = registry.get(GROUP_INSTALL, None, None).unwrap();
        assert!(registry.target(install).serial());
    }

    #[test]
    fn test_unittest_links_the_test_framework() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("src/check.cpp"), "int main() {}");
        let script = dir.path().join("makefile.rhai");
        write(
            &script,
            r#"
            let object = compile("src/check.cpp");
            unittest("model", [object], ["common"]);
            "#,
        );

        let host = ScriptHost::new().unwrap();
        host.run_file(&script).unwrap();
        let registry = host.finish().unwrap();

        let executable = registry.get("test-model", None, None).unwrap();
        let [Recipe::LinkExecutable(args)] = registry.target(executable).recipes() else {
            panic!("expected a link recipe");
        };
        assert_eq!(args.libraries, vec!["common", "gtest", "gtest_main"]);
    }

    #[test]
    fn test_unittest_registers_serial_runner() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("src/check.cpp"), "int main() {}");
        let script = dir.path().join("makefile.rhai");
        write(
            &script,
            r#"
            let object = compile("src/check.cpp");
            unittest("model", [object], []);
            "#,
        );

        let host = ScriptHost::new().unwrap();
        host.run_file(&script).unwrap();
        let registry = host.finish().unwrap();

        let runner = registry.get("unittest-model", None, None).unwrap();
        assert!(registry.target(runner).serial());
        assert!(registry.target(runner).execute());
        let executable = registry.get("test-model", None, None).unwrap();
        assert!(registry.target(runner).dependencies().contains(&executable));
    }

    #[test]
    fn test_install_is_serial_and_always_runs() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("makefile.rhai");
        write(&script, r#"install("bin/app", "/opt/tools");"#);

        let host = ScriptHost::new().unwrap();
        host.run_file(&script).unwrap();
        let registry = host.finish().unwrap();

        let install = registry.get(GROUP_INSTALL, None, None).unwrap();
        let steps = registry.target(install).dependencies();
        assert_eq!(steps.len(), 1);
        let step = registry.target(steps[0]);
        assert!(step.serial());
        assert!(step.execute());
        let [Recipe::Install(args)] = step.recipes() else {
            panic!("expected an install recipe");
        };
        assert_eq!(args.destination, PathBuf::from("/opt/tools"));
    }

    #[test]
    fn test_nested_build_keeps_script_attribution() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("sub/src/util.cpp"), "");
        let nested = dir.path().join("sub/makefile.rhai");
        write(&nested, r#"compile("src/util.cpp");"#);
        let script = dir.path().join("makefile.rhai");
        write(&script, r#"build("sub/makefile.rhai");"#);

        let host = ScriptHost::new().unwrap();
        host.run_file(&script).unwrap();
        let registry = host.finish().unwrap();

        let object = registry.get("obj/util.o", None, None).unwrap();
        assert_eq!(
            registry.target(object).script(),
            Some(dir.path().join("sub/makefile.rhai").as_path())
        );
        assert_eq!(
            registry.target(object).filename(),
            Some(dir.path().join("sub/obj/util.o").as_path())
        );
    }

    #[test]
    fn test_missing_nested_script_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("makefile.rhai");
        write(&script, r#"build("absent/makefile.rhai");"#);

        let host = ScriptHost::new().unwrap();
        assert!(host.run_file(&script).is_err());
    }

    #[test]
    fn test_sources_lists_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("src/a.cpp"), "");
        write(&dir.path().join("src/b.cpp"), "");
        write(&dir.path().join("src/notes.txt"), "");
        let script = dir.path().join("makefile.rhai");
        write(
            &script,
            r#"
            for source in sources("src", "cpp") {
                compile(source);
            }
            "#,
        );

        let host = ScriptHost::new().unwrap();
        host.run_file(&script).unwrap();
        let registry = host.finish().unwrap();

        assert!(registry.get("obj/a.o", None, None).is_some());
        assert!(registry.get("obj/b.o", None, None).is_some());
        assert!(registry.get("obj/notes.o", None, None).is_none());
    }

    #[test]
    fn test_dependencies_adds_edges() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("src/a.cpp"), "");
        write(&dir.path().join("src/b.cpp"), "");
        let script = dir.path().join("makefile.rhai");
        write(
            &script,
            r#"
            let a = compile("src/a.cpp");
            let b = compile("src/b.cpp");
            dependencies(a, [b]);
            "#,
        );

        let host = ScriptHost::new().unwrap();
        host.run_file(&script).unwrap();
        let registry = host.finish().unwrap();

        let a = registry.get("obj/a.o", None, None).unwrap();
        let b = registry.get("obj/b.o", None, None).unwrap();
        assert!(registry.target(a).dependencies().contains(&b));
    }

    #[test]
    fn test_unknown_dependency_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("makefile.rhai");
        write(&script, r#"dependencies("ghost", ["also-ghost"]);"#);

        let host = ScriptHost::new().unwrap();
        assert!(host.run_file(&script).is_err());
    }
}

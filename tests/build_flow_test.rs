//! End-to-end tests over the whole pipeline: script evaluation, staleness
//! analysis, plan construction and scheduling. Toolchain invocations are
//! replaced by a recording dispatcher so the tests run without a compiler.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use camake::analyze::analyze;
use camake::model::{Registry, Target};
use camake::plan::build_action_list;
use camake::recipe::Dispatch;
use camake::schedule::{self, ExecuteOptions};
use camake::script::ScriptHost;

struct Recorder {
    invoked: Mutex<Vec<String>>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            invoked: Mutex::new(Vec::new()),
        }
    }

    fn invoked(&self) -> Vec<String> {
        self.invoked.lock().unwrap().clone()
    }
}

impl Dispatch for Recorder {
    fn dispatch(&self, _registry: &Registry, target: &Target) -> anyhow::Result<()> {
        self.invoked.lock().unwrap().push(target.name().to_string());
        Ok(())
    }
}

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Let the filesystem clock advance between writes.
fn tick() {
    std::thread::sleep(Duration::from_millis(20));
}

const MAKEFILE: &str = r#"
    library_paths(["bin"]);
    let util = compile("src/util.cpp");
    link_library("common", [util], []);
    let main = compile("src/main.cpp");
    link_executable("app", [main], ["common"]);
"#;

/// Evaluate the project's makefile and run `target` through the pipeline,
/// returning the dispatched target names in invocation order.
fn run_build(project: &Path, target: &str, force: bool) -> Vec<String> {
    let host = ScriptHost::new().unwrap();
    host.run_file(&project.join("makefile.rhai")).unwrap();
    let mut registry = host.finish().unwrap();

    let root = registry.get(target, None, None).unwrap();
    analyze(&mut registry, root, force).unwrap();
    let plan = build_action_list(&registry, root);

    let recorder = Recorder::new();
    let options = ExecuteOptions {
        serial: true,
        ..Default::default()
    };
    schedule::execute(&registry, &plan, &recorder, &options).unwrap();
    recorder.invoked()
}

fn simple_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("src/util.cpp"), "int util() { return 1; }");
    write(&dir.path().join("src/main.cpp"), "int main() {}");
    write(&dir.path().join("makefile.rhai"), MAKEFILE);
    dir
}

/// Pretend the build succeeded by materializing every artifact, newest last.
fn materialize_artifacts(project: &Path) {
    tick();
    write(&project.join("obj/util.o"), "obj");
    write(&project.join("obj/main.o"), "obj");
    tick();
    write(&project.join("bin/libcommon.so"), "lib");
    tick();
    write(&project.join("bin/app"), "bin");
}

#[test]
fn test_cold_build_runs_everything_in_dependency_order() {
    let dir = simple_project();
    let invoked = run_build(dir.path(), "link", false);

    let position = |name: &str| {
        invoked
            .iter()
            .position(|n| n == name)
            .unwrap_or_else(|| panic!("{name} was not dispatched"))
    };

    assert_eq!(invoked.len(), 4);
    assert!(position("obj/util.o") < position("common"));
    assert!(position("obj/main.o") < position("app"));
    assert!(position("common") < position("app"));
}

#[test]
fn test_rebuild_with_fresh_artifacts_does_nothing() {
    let dir = simple_project();
    materialize_artifacts(dir.path());

    let invoked = run_build(dir.path(), "link", false);
    assert!(invoked.is_empty());
}

#[test]
fn test_force_rebuilds_a_fresh_project() {
    let dir = simple_project();
    materialize_artifacts(dir.path());

    let invoked = run_build(dir.path(), "link", true);
    assert_eq!(invoked.len(), 4);
}

#[test]
fn test_touched_build_script_rebuilds_its_artifacts() {
    let dir = simple_project();
    materialize_artifacts(dir.path());
    tick();
    write(&dir.path().join("makefile.rhai"), MAKEFILE);

    // the build description is an input to everything it registers
    let invoked = run_build(dir.path(), "link", false);
    assert_eq!(invoked.len(), 4);
}

#[test]
fn test_touched_source_rebuilds_its_dependents_only() {
    let dir = simple_project();
    materialize_artifacts(dir.path());
    tick();
    write(&dir.path().join("src/main.cpp"), "int main() { return 1; }");

    let invoked = run_build(dir.path(), "link", false);
    assert!(invoked.contains(&"obj/main.o".to_string()));
    assert!(invoked.contains(&"app".to_string()));
    assert!(!invoked.contains(&"obj/util.o".to_string()));
}

#[test]
fn test_touched_header_rebuilds_through_dependency_file() {
    let dir = simple_project();
    write(&dir.path().join("include/util.h"), "#pragma once");
    write(
        &dir.path().join("obj/util.d"),
        "obj/util.o: src/util.cpp include/util.h\n",
    );
    materialize_artifacts(dir.path());
    tick();
    write(&dir.path().join("include/util.h"), "#pragma once\n// changed");

    let invoked = run_build(dir.path(), "link", false);
    assert!(invoked.contains(&"obj/util.o".to_string()));
    assert!(invoked.contains(&"common".to_string()));
    assert!(!invoked.contains(&"obj/main.o".to_string()));
}

#[test]
fn test_clean_dispatches_a_step_per_artifact() {
    let dir = simple_project();
    let invoked = run_build(dir.path(), "clean", false);

    // one clean step per object plus one per linked artifact
    assert_eq!(invoked.len(), 4);
    assert!(invoked.iter().all(|name| name.starts_with("clean-")));
}

#[test]
fn test_single_object_can_be_built_directly() {
    let dir = simple_project();
    let invoked = run_build(dir.path(), "obj/main.o", false);
    assert_eq!(invoked, vec!["obj/main.o"]);
}

#[test]
fn test_unknown_target_is_not_resolved() {
    let dir = simple_project();
    let host = ScriptHost::new().unwrap();
    host.run_file(&dir.path().join("makefile.rhai")).unwrap();
    let registry = host.finish().unwrap();
    assert!(registry.get("does-not-exist", None, None).is_none());
}

#[test]
fn test_nested_scripts_build_into_one_graph() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("core/src/core.cpp"), "");
    write(
        &dir.path().join("core/makefile.rhai"),
        r#"
        let object = compile("src/core.cpp");
        link_library("core", [object], []);
        "#,
    );
    write(&dir.path().join("src/main.cpp"), "int main() {}");
    write(
        &dir.path().join("makefile.rhai"),
        r#"
        build("core/makefile.rhai");
        let object = compile("src/main.cpp");
        link_executable("app", [object], []);
        "#,
    );

    let invoked = run_build(dir.path(), "link", false);
    assert_eq!(invoked.len(), 4);
    assert!(invoked.contains(&"core".to_string()));
    assert!(invoked.contains(&"app".to_string()));
}

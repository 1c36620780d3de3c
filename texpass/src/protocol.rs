//! The three-pass LaTeX + BibTeX build, expressed as task graph wiring.
//!
//! A compiler run can only use what a previous run left on disk:
//!
//! 1. `pdflatex-A` writes the citation requests to `<main>.aux`.
//! 2. `bibtex` turns them into `<main>.bbl`.
//! 3. `pdflatex-B` (finalizer of `build-mid-step`) typesets the reference
//!    list; in-text citations still render as `[?]`.
//! 4. `pdflatex-C` (finalizer of `build`) resolves the citation labels.
//!
//! Every task is [`CachePolicy::AlwaysRun`]: whether the fixed point was
//! reached depends on files the runner cannot inspect.

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::graph::{GraphError, TaskGraph, TaskGraphBuilder};
use crate::core::task::{CachePolicy, ExitPolicy, ProcessSpec, Task};
use crate::io::config::{BuildConfig, ProjectPaths, load_config};

pub const PDFLATEX_A: &str = "pdflatex-A";
pub const PDFLATEX_B: &str = "pdflatex-B";
pub const PDFLATEX_C: &str = "pdflatex-C";
pub const BIBTEX: &str = "bibtex";
pub const MID_STEP: &str = "build-mid-step";
pub const BUILD: &str = "build";

/// One typesetting compiler pass over the main document.
pub fn compiler_pass(name: &str, cfg: &BuildConfig, paths: &ProjectPaths) -> Task {
    let spec = ProcessSpec::new(&cfg.compiler, &paths.src_dir)
        .args([
            "-file-line-error".to_string(),
            "-interaction=nonstopmode".to_string(),
            "-synctex=1".to_string(),
            "-output-format=pdf".to_string(),
            format!("-output-directory={}", paths.out_dir.display()),
            format!("-aux-directory={}", paths.auxil_dir.display()),
            cfg.main_file.clone(),
        ])
        .policy(cfg.compiler_exit.into())
        .timeout(cfg.process_timeout());
    Task::process(name, spec)
        .describe("Compiles the latex document without reusing cached files")
        .cache(CachePolicy::AlwaysRun)
}

/// Bibliography processor run against the auxiliary file of the first pass.
pub fn bibliography_pass(cfg: &BuildConfig, paths: &ProjectPaths) -> Task {
    let aux_base = paths.auxil_dir.join(&cfg.main_file);
    let spec = ProcessSpec::new(&cfg.bibliography, &paths.src_dir)
        .arg(aux_base.display().to_string())
        .policy(ExitPolicy::FailOnNonZero)
        .timeout(cfg.process_timeout());
    Task::process(BIBTEX, spec)
        .describe("Compiles the bibliography after the first pass of pdflatex")
        .depends_on(PDFLATEX_A)
        .cache(CachePolicy::AlwaysRun)
}

/// Every task of the protocol, in registration order.
pub fn protocol_tasks(cfg: &BuildConfig, root: &Path) -> Vec<Task> {
    let paths = cfg.paths(root);
    vec![
        compiler_pass(PDFLATEX_A, cfg, &paths),
        compiler_pass(PDFLATEX_B, cfg, &paths),
        compiler_pass(PDFLATEX_C, cfg, &paths),
        bibliography_pass(cfg, &paths),
        Task::lifecycle(MID_STEP)
            .describe("Runs the bibliography, then the second compiler pass")
            .depends_on(BIBTEX)
            .finalized_by(PDFLATEX_B),
        Task::lifecycle(BUILD)
            .describe("Build the document, including the bibliography and resolving references")
            .depends_on(MID_STEP)
            .finalized_by(PDFLATEX_C),
    ]
}

/// Register the protocol tasks into an existing builder.
pub fn register_protocol(
    builder: &mut TaskGraphBuilder,
    cfg: &BuildConfig,
    root: &Path,
) -> Result<(), GraphError> {
    for task in protocol_tasks(cfg, root) {
        builder.register(task)?;
    }
    Ok(())
}

/// Build the immutable task graph for a project.
pub fn protocol_graph(cfg: &BuildConfig, root: &Path) -> Result<TaskGraph, GraphError> {
    let mut builder = TaskGraph::builder();
    register_protocol(&mut builder, cfg, root)?;
    builder.build()
}

/// Load the project configuration and wire its task graph.
pub fn load_project(root: &Path, config_path: &Path) -> Result<(BuildConfig, TaskGraph)> {
    let cfg = load_config(config_path)?;
    let graph = protocol_graph(&cfg, root).context("wire build tasks")?;
    Ok((cfg, graph))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::state::TaskState;
    use crate::core::task::Action;
    use crate::execute::{ExecuteError, execute};
    use crate::io::config::CompilerExit;
    use crate::io::process::ProcessError;
    use crate::test_support::{RecordingRunner, names};

    fn root() -> PathBuf {
        PathBuf::from("/project")
    }

    fn graph() -> TaskGraph {
        protocol_graph(&BuildConfig::default(), &root()).expect("graph")
    }

    #[test]
    fn build_resolves_to_three_pass_sequence() {
        let graph = graph();
        let order = names(&graph.resolve(BUILD).expect("resolve"));
        assert_eq!(
            order,
            vec![PDFLATEX_A, BIBTEX, MID_STEP, PDFLATEX_B, BUILD, PDFLATEX_C]
        );
    }

    #[test]
    fn every_target_is_independently_runnable() {
        let graph = graph();
        for target in [PDFLATEX_A, PDFLATEX_B, PDFLATEX_C, BIBTEX, MID_STEP, BUILD] {
            graph.resolve(target).expect("resolve");
        }
        assert_eq!(
            names(&graph.resolve(BIBTEX).expect("resolve")),
            vec![PDFLATEX_A, BIBTEX]
        );
        assert_eq!(
            names(&graph.resolve(PDFLATEX_C).expect("resolve")),
            vec![PDFLATEX_C]
        );
    }

    #[test]
    fn every_task_always_runs() {
        assert!(graph().tasks().all(|task| task.cache == CachePolicy::AlwaysRun));
    }

    #[test]
    fn compiler_pass_uses_configured_layout() {
        let cfg = BuildConfig {
            main_file: "thesis".to_string(),
            ..BuildConfig::default()
        };
        let task = compiler_pass(PDFLATEX_A, &cfg, &cfg.paths(&root()));
        let Action::Process(spec) = task.action else {
            panic!("compiler pass must launch a process");
        };
        assert_eq!(spec.program, "pdflatex");
        assert_eq!(spec.workdir, PathBuf::from("/project/src"));
        assert_eq!(spec.policy, ExitPolicy::Ignore);
        assert_eq!(
            spec.args,
            vec![
                "-file-line-error",
                "-interaction=nonstopmode",
                "-synctex=1",
                "-output-format=pdf",
                "-output-directory=/project/out",
                "-aux-directory=/project/auxil",
                "thesis",
            ]
        );
    }

    #[test]
    fn build_invokes_tools_in_pass_order() {
        let graph = graph();
        let runner = RecordingRunner::new().with_exit("pdflatex", 1);

        let report = execute(&graph, BUILD, &runner).expect("build");
        assert_eq!(
            runner.programs(),
            vec!["pdflatex", "bibtex", "pdflatex", "pdflatex"]
        );
        let calls = runner.calls();
        let bibtex = &calls[1];
        assert_eq!(bibtex.args, vec!["/project/auxil/main"]);
        assert_eq!(bibtex.workdir, PathBuf::from("/project/src"));
        assert_eq!(report.ignored_exits().count(), 3);
        assert!(report.succeeded());
    }

    #[test]
    fn bibtex_failure_stops_before_later_passes() {
        let graph = graph();
        let runner = RecordingRunner::new().with_exit("bibtex", 2);

        let err = execute(&graph, BUILD, &runner).expect_err("bibtex fails");
        assert_eq!(runner.programs(), vec!["pdflatex", "bibtex"]);
        let ExecuteError::TaskFailed {
            task,
            source,
            report,
        } = err
        else {
            panic!("expected task failure");
        };
        assert_eq!(task, BIBTEX);
        assert!(matches!(
            source,
            ProcessError::Execution {
                exit_code: Some(2),
                ..
            }
        ));
        assert_eq!(
            report.task(PDFLATEX_B).expect("pass B").state,
            TaskState::Pending
        );
    }

    #[test]
    fn strict_compiler_policy_aborts_on_first_pass() {
        let cfg = BuildConfig {
            compiler_exit: CompilerExit::Fail,
            ..BuildConfig::default()
        };
        let graph = protocol_graph(&cfg, &root()).expect("graph");
        let runner = RecordingRunner::new().with_exit("pdflatex", 1);

        execute(&graph, BUILD, &runner).expect_err("strict compiler");
        assert_eq!(runner.programs(), vec!["pdflatex"]);
    }

    #[test]
    fn registering_protocol_twice_is_a_duplicate() {
        let mut builder = TaskGraph::builder();
        register_protocol(&mut builder, &BuildConfig::default(), &root()).expect("first");
        let err = register_protocol(&mut builder, &BuildConfig::default(), &root())
            .expect_err("duplicate");
        assert_eq!(
            err,
            GraphError::DuplicateTask {
                name: PDFLATEX_A.to_string()
            }
        );
    }
}

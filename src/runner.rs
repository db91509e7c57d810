//! Concrete execution over the CFG.
//!
//! The runner walks the CFG from START. At each node it takes the first
//! outgoing edge (in branch order) whose guard holds, executes the edge's
//! action, and stops at END. The node sequence it visits is the *executed
//! path* consumed by the coverage checker.

use log::{debug, warn};
use rayon::prelude::*;

use crate::cfg::Cfg;
use crate::error::RunError;
use crate::expr::Env;
use crate::stmt::{Console, ScriptedConsole};
use crate::symbolic::TestCase;
use crate::types::{path_to_string, Node, Path};

/// Limits of a concrete run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum number of edges taken before the run is aborted.
    pub max_steps: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { max_steps: 100_000 }
    }
}

impl RunConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub path: Path,
    pub env: Env,
    pub outputs: Vec<i64>,
}

/// Runs `cfg` from `env`, reading inputs from and printing to `console`.
///
/// Returns the executed path and the final environment.
pub fn run(cfg: &Cfg, mut env: Env, console: &mut dyn Console, config: &RunConfig) -> Result<(Path, Env), RunError> {
    let mut path = vec![Node::Start];
    let mut node = Node::Start;
    let mut steps = 0;

    while !node.is_end() {
        if steps >= config.max_steps {
            return Err(RunError::StepLimit(config.max_steps));
        }
        let mut taken = None;
        for edge in cfg.outgoing(node) {
            let enabled = edge.guard.eval(&env).map_err(|source| RunError::Eval { node, source })?;
            if enabled {
                taken = Some(edge);
                break;
            }
        }
        let edge = taken.ok_or(RunError::Stuck(node))?;
        edge.action
            .execute(&mut env, console)
            .map_err(|source| RunError::Eval { node, source })?;
        node = edge.dst;
        path.push(node);
        steps += 1;
    }

    debug!("executed path: {}", path_to_string(&path));
    Ok((path, env))
}

/// Runs a generated test case: its initial environment, with its input
/// stream scripted.
pub fn run_test(cfg: &Cfg, case: &TestCase, config: &RunConfig) -> Result<Execution, RunError> {
    let mut console = ScriptedConsole::new(case.inputs.iter().copied());
    let (path, env) = run(cfg, case.initial.clone(), &mut console, config)?;
    Ok(Execution {
        path,
        env,
        outputs: console.outputs().to_vec(),
    })
}

/// Runs every test case, in parallel.
pub fn run_tests(cfg: &Cfg, cases: &[TestCase], config: &RunConfig) -> Vec<Result<Execution, RunError>> {
    cases.par_iter().map(|case| run_test(cfg, case, config)).collect()
}

/// Executed paths of the cases that ran to completion.
pub fn executed_paths(cfg: &Cfg, cases: &[TestCase], config: &RunConfig) -> Vec<Path> {
    run_tests(cfg, cases, config)
        .into_iter()
        .filter_map(|result| match result {
            Ok(execution) => Some(execution.path),
            Err(e) => {
                warn!("test run failed: {}", e);
                None
            }
        })
        .collect()
}

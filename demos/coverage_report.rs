//! Test generation and coverage report for a few sample programs.
//!
//! Run with:
//! ```bash
//! cargo run --example coverage_report -- gcd --criterion decisions -k 16
//! ```

use std::time::Instant;

use clap::{Parser, ValueEnum};
use whilecov::cfg::Cfg;
use whilecov::coverage::{CoverageChecker, Criterion};
use whilecov::expr::{AExp, BExp};
use whilecov::runner::{executed_paths, RunConfig};
use whilecov::solver::{SearchSolver, SolverConfig};
use whilecov::stmt::Stmt;
use whilecov::suite::{SuiteConfig, SuiteGenerator};
use whilecov::symbolic::TestGenerator;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Program {
    /// x := 5; while (x > 0) { x := x - 1; }
    Countdown,
    /// input x; if (x < 0) { x := 0 - x; } print x;
    Abs,
    /// Euclid's algorithm by subtraction.
    Gcd,
    /// Two nested counting loops.
    Nested,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CriterionArg {
    Assignments,
    Decisions,
    KPaths,
    LoopPaths,
    DuPaths,
    Definitions,
    Uses,
    Distance,
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Structural test generation for while programs")]
struct Cli {
    /// Sample program
    #[arg(value_enum, default_value = "gcd")]
    program: Program,

    /// Coverage criterion to generate tests for
    #[arg(long, value_enum, default_value = "decisions")]
    criterion: CriterionArg,

    /// Maximum number of edges of a candidate path
    #[arg(short, default_value = "16")]
    k: usize,

    /// Maximum number of loop iterations of a candidate path
    #[arg(long, default_value = "2")]
    loops: usize,

    /// Solve sequentially instead of on the thread pool
    #[arg(long)]
    sequential: bool,

    /// Use the built-in search solver instead of the default backend
    #[arg(long)]
    search: bool,
}

fn sample(program: Program) -> Stmt {
    let x = || AExp::var("x");
    let y = || AExp::var("y");
    match program {
        Program::Countdown => Stmt::seq([
            Stmt::assign(1, "x", AExp::cst(5)),
            Stmt::while_do(
                2,
                BExp::gt(x(), AExp::cst(0)),
                Stmt::assign(3, "x", AExp::sub(x(), AExp::cst(1))),
            ),
        ]),
        Program::Abs => Stmt::seq([
            Stmt::input(1, "x"),
            Stmt::if_then(
                2,
                BExp::lt(x(), AExp::cst(0)),
                Stmt::assign(3, "x", AExp::sub(AExp::cst(0), x())),
            ),
            Stmt::print(4, x()),
        ]),
        Program::Gcd => Stmt::seq([
            Stmt::input(1, "x"),
            Stmt::input(2, "y"),
            Stmt::while_do(
                3,
                BExp::and(BExp::gt(x(), AExp::cst(0)), BExp::ne(x(), y())),
                Stmt::if_else(
                    4,
                    BExp::gt(x(), y()),
                    Stmt::assign(5, "x", AExp::sub(x(), y())),
                    Stmt::assign(6, "y", AExp::sub(y(), x())),
                ),
            ),
            Stmt::print(7, x()),
        ]),
        Program::Nested => Stmt::seq([
            Stmt::input(1, "x"),
            Stmt::while_do(
                2,
                BExp::gt(x(), AExp::cst(0)),
                Stmt::seq([
                    Stmt::assign(3, "y", x()),
                    Stmt::while_do(
                        4,
                        BExp::gt(y(), AExp::cst(0)),
                        Stmt::assign(5, "y", AExp::sub(y(), AExp::cst(1))),
                    ),
                    Stmt::assign(6, "x", AExp::sub(x(), AExp::cst(1))),
                ]),
            ),
        ]),
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let cli = Cli::parse();
    println!("cli = {:?}", cli);

    let cfg = Cfg::build(&sample(cli.program))?;
    println!("{}", cfg);

    let criterion = match cli.criterion {
        CriterionArg::Assignments => Criterion::Assignments,
        CriterionArg::Decisions => Criterion::Decisions,
        CriterionArg::KPaths => Criterion::KPaths(cli.k),
        CriterionArg::LoopPaths => Criterion::LoopPaths(cli.loops),
        CriterionArg::DuPaths => Criterion::DuPaths,
        CriterionArg::Definitions => Criterion::Definitions,
        CriterionArg::Uses => Criterion::Uses,
        CriterionArg::Distance => Criterion::Distance(cli.k),
    };

    let config = SuiteConfig::default()
        .with_k(cli.k)
        .with_loop_bound(cli.loops)
        .with_parallel(!cli.sequential);
    let time_generate = Instant::now();
    let report = if cli.search {
        let generator = TestGenerator::with_solver(&cfg, SearchSolver::new(SolverConfig::default()));
        SuiteGenerator::with_generator(generator, config).generate(criterion)?
    } else {
        SuiteGenerator::new(&cfg, config).generate(criterion)?
    };
    println!("{}", report);
    println!("generated in {:.2?}", time_generate.elapsed());

    let tests = report.tests();
    println!("tests: {}", tests.len());
    for test in &tests {
        println!("- {}", test);
    }

    let executed = executed_paths(&cfg, &tests, &RunConfig::default());
    let summary = CoverageChecker::new(&cfg).summary(&executed, cli.k, cli.loops);
    println!("{}", summary);

    Ok(())
}

//! Decision-diagram engine CLI.
//!
//! Provides the `strata` binary. Currently supports `queens`, which builds
//! the N-Queens board constraint BDD bottom-up and counts its solutions,
//! the classic exercise for an I/O-efficient diagram engine.

use std::process;

use clap::{Parser, Subcommand};

use strata_engine::bdd::{bdd_and, bdd_nodecount, bdd_or, bdd_satcount};
use strata_engine::{Bdd, BddBuilder, ExecPolicy, Level, Ptr, Result};

/// Decision-diagram engine and tools.
#[derive(Parser)]
#[command(name = "strata", about = "Decision-diagram engine and tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Count the solutions of the N-Queens puzzle.
    Queens {
        /// Board size.
        #[arg(short = 'n', long, default_value_t = 8)]
        n: u32,

        /// Memory budget in MiB.
        #[arg(short, long, default_value_t = 512)]
        memory: u64,
    },
}

/// Solution counts for small boards.
/// https://en.wikipedia.org/wiki/Eight_queens_puzzle#Counting_solutions
const EXPECTED: [u64; 13] = [0, 1, 0, 0, 2, 10, 4, 40, 92, 352, 724, 2680, 14200];

fn main() {
    tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::from_default_env(),
    ).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Queens { n, memory } => {
            let code = run_queens(n, memory);
            process::exit(code);
        }
    }
}

fn run_queens(n: u32, memory_mib: u64) -> i32 {
    if let Err(e) = strata_engine::init(memory_mib * 1024 * 1024) {
        eprintln!("error: {e}");
        return 1;
    }

    match queens_count(n) {
        Ok((count, nodes)) => {
            println!("{n}-queens: {count} solutions ({nodes} nodes)");
            match EXPECTED.get(n as usize) {
                Some(&expect) if expect != count => {
                    eprintln!("error: expected {expect} solutions");
                    1
                }
                _ => 0,
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

fn label_of_position(n: u32, row: u32, column: u32) -> Level {
    n * row + column
}

/// The constraint of a queen standing on `(row, column)`: the cell is
/// occupied and every threatened cell is empty. Built bottom-up as a single
/// chain.
fn queens_cell(n: u32, row: u32, column: u32) -> Result<Bdd> {
    let mut builder = BddBuilder::new()?;
    let mut next = Ptr::terminal(true);

    for r in (0..n).rev() {
        if r == row {
            // The queen's own row: exactly this cell.
            for c in (0..n).rev() {
                let label = label_of_position(n, r, c);
                next = if c == column {
                    builder.add_node(label, Ptr::terminal(false), next)?
                } else {
                    builder.add_node(label, next, Ptr::terminal(false))?
                };
            }
        } else {
            let diff = r.abs_diff(row);
            // Right diagonal, column, then left diagonal, kept in
            // descending label order within the row.
            if column + diff < n {
                next = builder.add_node(
                    label_of_position(n, r, column + diff),
                    next,
                    Ptr::terminal(false),
                )?;
            }
            next = builder.add_node(label_of_position(n, r, column), next, Ptr::terminal(false))?;
            if diff <= column {
                next = builder.add_node(
                    label_of_position(n, r, column - diff),
                    next,
                    Ptr::terminal(false),
                )?;
            }
        }
    }

    builder.build()
}

/// At least one queen somewhere in `row`.
fn queens_row(ep: &ExecPolicy, n: u32, row: u32) -> Result<Bdd> {
    let mut out = queens_cell(n, row, 0)?;
    for column in 1..n {
        out = bdd_or(ep, &out, &queens_cell(n, row, column)?)?;
    }
    Ok(out)
}

/// The whole board: one queen per row, none attacking another.
fn queens_board(ep: &ExecPolicy, n: u32) -> Result<Bdd> {
    if n == 1 {
        return queens_cell(1, 0, 0);
    }
    let mut out = queens_row(ep, n, 0)?;
    for row in 1..n {
        out = bdd_and(ep, &out, &queens_row(ep, n, row)?)?;
    }
    Ok(out)
}

fn queens_count(n: u32) -> Result<(u64, u64)> {
    let ep = ExecPolicy::new();
    let board = queens_board(&ep, n)?;
    let count = bdd_satcount(&board)? as u64;
    Ok((count, bdd_nodecount(&board)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_boards_match_the_table() {
        for n in 1..=5 {
            let (count, _) = queens_count(n).unwrap();
            assert_eq!(count, EXPECTED[n as usize], "board size {n}");
        }
    }
}

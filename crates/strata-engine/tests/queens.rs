//! The N-Queens scenario: board construction with the builder and the apply
//! operators, solution counting over the final diagram.

use strata_core::{ExecPolicy, Level, Ptr, Result};
use strata_engine::bdd::{bdd_and, bdd_or, bdd_satcount};
use strata_engine::{Bdd, BddBuilder};

fn label_of_position(n: u32, row: u32, column: u32) -> Level {
    n * row + column
}

fn queens_cell(n: u32, row: u32, column: u32) -> Result<Bdd> {
    let mut builder = BddBuilder::new()?;
    let mut next = Ptr::terminal(true);

    for r in (0..n).rev() {
        if r == row {
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

fn queens_board(ep: &ExecPolicy, n: u32) -> Result<Bdd> {
    if n == 1 {
        return queens_cell(1, 0, 0);
    }
    let mut board: Option<Bdd> = None;
    for row in 0..n {
        let mut row_constraint = queens_cell(n, row, 0)?;
        for column in 1..n {
            row_constraint = bdd_or(ep, &row_constraint, &queens_cell(n, row, column)?)?;
        }
        board = Some(match board {
            None => row_constraint,
            Some(b) => bdd_and(ep, &b, &row_constraint)?,
        });
    }
    Ok(board.expect("n > 0"))
}

fn solutions(n: u32) -> u64 {
    let ep = ExecPolicy::new();
    let board = queens_board(&ep, n).unwrap();
    bdd_satcount(&board).unwrap() as u64
}

#[test]
fn tiny_boards() {
    assert_eq!(solutions(1), 1);
    assert_eq!(solutions(2), 0);
    assert_eq!(solutions(3), 0);
    assert_eq!(solutions(4), 2);
    assert_eq!(solutions(5), 10);
}

#[test]
fn six_queens() {
    assert_eq!(solutions(6), 4);
}

#[test]
fn eight_queens() {
    assert_eq!(solutions(8), 92);
}

#[test]
#[ignore = "several minutes of sweeps; run with --ignored"]
fn ten_queens() {
    assert_eq!(solutions(10), 724);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expression AST: evaluation, satisfiability, display.

use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A parsed dependency expression.
///
/// `And`/`Or` are n-ary: the parser flattens chains of the same operator, so
/// `a=COMPLETED AND b=COMPLETED AND c=COMPLETED` is one `And` with three
/// children. `Display` renders the canonical source form; parsing that form
/// again yields an equal AST (round-trip modulo whitespace).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    /// `jobName=STATUS`
    Atom { job: String, status: Status },
    /// `x AND y AND ...`
    And(Vec<Expr>),
    /// `x OR y OR ...`
    Or(Vec<Expr>),
}

impl Expr {
    /// Evaluate against current job states.
    ///
    /// An atom is true iff the lookup returns exactly the required status;
    /// a job with no known state never satisfies an atom.
    pub fn eval(&self, states: &dyn Fn(&str) -> Option<Status>) -> bool {
        match self {
            Expr::Atom { job, status } => states(job) == Some(*status),
            Expr::And(terms) => terms.iter().all(|t| t.eval(states)),
            Expr::Or(terms) => terms.iter().any(|t| t.eval(states)),
        }
    }

    /// All job names referenced by atoms, deduplicated.
    pub fn jobs(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_jobs(&mut out);
        out
    }

    fn collect_jobs<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Atom { job, .. } => {
                out.insert(job.as_str());
            }
            Expr::And(terms) | Expr::Or(terms) => {
                for t in terms {
                    t.collect_jobs(out);
                }
            }
        }
    }

    /// Can this expression still become true once the given jobs are pinned
    /// to their final statuses?
    ///
    /// Jobs present in `fixed` are permanent; every other referenced job may
    /// still end in any status. Returns true iff some assignment of final
    /// statuses to the free jobs satisfies the expression. Used for cascading
    /// cancellation: a dependent whose expression is unsatisfiable under the
    /// terminal states of its upstreams can never become ready.
    ///
    /// Each free job only needs to try the statuses its own atoms mention
    /// plus one "none of these" sentinel, so the search is exact and small.
    pub fn satisfiable(&self, fixed: &BTreeMap<String, Status>) -> bool {
        let free: Vec<&str> = self
            .jobs()
            .into_iter()
            .filter(|j| !fixed.contains_key(*j))
            .collect();

        let mut assignment: BTreeMap<&str, Option<Status>> = BTreeMap::new();
        self.try_assign(&free, 0, fixed, &mut assignment)
    }

    fn try_assign<'a>(
        &'a self,
        free: &[&'a str],
        idx: usize,
        fixed: &BTreeMap<String, Status>,
        assignment: &mut BTreeMap<&'a str, Option<Status>>,
    ) -> bool {
        if idx == free.len() {
            let lookup = |job: &str| -> Option<Status> {
                fixed
                    .get(job)
                    .copied()
                    .or_else(|| assignment.get(job).copied().flatten())
            };
            return self.eval(&lookup);
        }

        let job = free[idx];
        let mut candidates: Vec<Option<Status>> =
            self.statuses_for(job).into_iter().map(Some).collect();
        // The sentinel covers "ends in a status no atom mentions".
        candidates.push(None);

        for candidate in candidates {
            assignment.insert(job, candidate);
            if self.try_assign(free, idx + 1, fixed, assignment) {
                assignment.remove(job);
                return true;
            }
        }
        assignment.remove(job);
        false
    }

    /// Statuses mentioned by atoms referencing the given job.
    fn statuses_for(&self, target: &str) -> BTreeSet<Status> {
        let mut out = BTreeSet::new();
        self.collect_statuses(target, &mut out);
        out
    }

    fn collect_statuses(&self, target: &str, out: &mut BTreeSet<Status>) {
        match self {
            Expr::Atom { job, status } => {
                if job == target {
                    out.insert(*status);
                }
            }
            Expr::And(terms) | Expr::Or(terms) => {
                for t in terms {
                    t.collect_statuses(target, out);
                }
            }
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_prec(f, 0)
    }
}

impl Expr {
    /// Render with parentheses only where precedence demands them
    /// (an `Or` nested inside an `And`).
    fn fmt_prec(&self, f: &mut std::fmt::Formatter<'_>, parent_prec: u8) -> std::fmt::Result {
        match self {
            Expr::Atom { job, status } => write!(f, "{job}={status}"),
            Expr::And(terms) => {
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" AND ")?;
                    }
                    t.fmt_prec(f, 2)?;
                }
                Ok(())
            }
            Expr::Or(terms) => {
                let need_parens = parent_prec >= 2;
                if need_parens {
                    f.write_str("(")?;
                }
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" OR ")?;
                    }
                    t.fmt_prec(f, 1)?;
                }
                if need_parens {
                    f.write_str(")")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "ast_tests.rs"]
mod tests;

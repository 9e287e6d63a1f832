//! Levenberg-Marquardt refinement of a [`BundleProblem`].

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};

use crate::bundle::BundleProblem;
use crate::error::SolveFailure;
use crate::SolverOptions;

struct LmWrapper<'p, 'a> {
    problem: &'p BundleProblem<'a>,
    params: DVector<f64>,
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, '_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.problem.residuals(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        Some(self.problem.jacobian(&self.params))
    }
}

/// Outcome of a successful refinement.
#[derive(Debug)]
pub(crate) struct LmSummary {
    /// Residual evaluations spent.
    pub evaluations: usize,
    /// `0.5 * |r|²` at the returned parameters.
    pub final_cost: f64,
    pub termination: TerminationReason,
}

/// `None` when the stop reason leaves a usable minimizer.
///
/// `NoImprovementPossible` means a tolerance is below machine precision and
/// the parameters cannot move further, so it is accepted.
fn failure_for(termination: &TerminationReason, evaluations: usize) -> Option<SolveFailure> {
    match termination {
        t if t.was_successful() => None,
        TerminationReason::NoImprovementPossible(_) => None,
        TerminationReason::LostPatience => Some(SolveFailure::NotConverged {
            iterations: evaluations,
        }),
        TerminationReason::Numerical(_) => Some(SolveFailure::NonFinite),
        other => Some(SolveFailure::OptimizerFailed {
            reason: format!("{other:?}"),
        }),
    }
}

/// Minimize `0.5 * |r(x)|²` over the bundle starting from `x0`.
pub(crate) fn refine(
    problem: &BundleProblem<'_>,
    x0: DVector<f64>,
    opts: &SolverOptions,
) -> Result<(DVector<f64>, LmSummary), SolveFailure> {
    if !x0.iter().all(|v| v.is_finite()) {
        return Err(SolveFailure::NonFinite);
    }
    log::debug!(
        "refining {} parameters over {} residuals",
        problem.num_params(),
        problem.num_residuals()
    );

    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_patience(opts.max_iters.max(1));
    let wrapper = LmWrapper {
        problem,
        params: x0,
    };

    let (wrapper, report) = lm.minimize(wrapper);
    if let Some(failure) = failure_for(&report.termination, report.number_of_evaluations) {
        log::debug!("refinement stopped: {:?}", report.termination);
        return Err(failure);
    }
    Ok((
        wrapper.params(),
        LmSummary {
            evaluations: report.number_of_evaluations,
            final_cost: report.objective_function,
            termination: report.termination,
        },
    ))
}

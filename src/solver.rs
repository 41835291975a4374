//! Outer iteration drivers
use crate::sweeper::TransportSweeper;
use crate::types::{Result, SweepError};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Convergence criteria of the power iteration
#[derive(Debug, Clone, PartialEq)]
pub struct EigenOptions {
    /// Largest change of k between outer iterations at convergence
    pub k_tolerance: f64,
    /// Largest RMS relative change of the flux at convergence
    pub flux_tolerance: f64,
    /// Maximum number of outer iterations
    pub max_outer: usize,
    /// Initial guess for k
    pub initial_k: f64,
}

impl Default for EigenOptions {
    fn default() -> Self {
        Self {
            k_tolerance: 1e-6,
            flux_tolerance: 1e-5,
            max_outer: 100,
            initial_k: 1.0,
        }
    }
}

impl EigenOptions {
    /// Set the k tolerance
    pub fn set_k_tolerance(&mut self, k_tolerance: f64) -> &mut Self {
        self.k_tolerance = k_tolerance;
        self
    }
    /// Set the flux tolerance
    pub fn set_flux_tolerance(&mut self, flux_tolerance: f64) -> &mut Self {
        self.flux_tolerance = flux_tolerance;
        self
    }
    /// Set the maximum number of outer iterations
    pub fn set_max_outer(&mut self, max_outer: usize) -> &mut Self {
        self.max_outer = max_outer;
        self
    }
    /// Set the initial guess for k
    pub fn set_initial_k(&mut self, initial_k: f64) -> &mut Self {
        self.initial_k = initial_k;
        self
    }
}

/// State of an eigenvalue solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverState {
    /// Not (yet) converged
    #[default]
    Inactive,
    /// Both tolerances met
    Converged,
}

/// Outcome of an eigenvalue solve
#[derive(Debug, Clone, PartialEq)]
pub struct EigenResult {
    /// Last estimate of k
    pub k: f64,
    /// Were both tolerances met?
    pub converged: bool,
    /// Was the solve stopped through the interrupt handle?
    pub interrupted: bool,
    /// Outer iterations performed
    pub n_outer: usize,
    /// k after every outer iteration
    pub k_history: Vec<f64>,
    /// Flux residual after every outer iteration
    pub residual_history: Vec<f64>,
}

/// RMS of the relative pointwise change between two flux fields, skipping
/// points where the new flux vanishes
pub fn flux_residual(old: &[f64], new: &[f64]) -> f64 {
    let (sum, n) = old
        .iter()
        .zip(new)
        .filter(|(_, n)| **n != 0.0)
        .fold((0.0, 0usize), |(sum, count), (o, n)| {
            let e = (n - o) / n;
            (sum + e * e, count + 1)
        });
    if n == 0 {
        0.0
    } else {
        (sum / n as f64).sqrt()
    }
}

/// Power iteration for the k-eigenvalue problem
#[derive(Debug)]
pub struct EigenSolver<S: TransportSweeper> {
    sweeper: S,
    options: EigenOptions,
    state: SolverState,
    k: f64,
    fission_source: Vec<f64>,
    interrupt: Arc<AtomicBool>,
}

impl<S: TransportSweeper> EigenSolver<S> {
    /// Create a solver, binding a fresh source to the sweeper
    pub fn new(mut sweeper: S, options: EigenOptions) -> Result<Self> {
        if !(options.initial_k.is_finite() && options.initial_k > 0.0) {
            return Err(SweepError::InvalidOption {
                option: "k0".to_string(),
                value: options.initial_k.to_string(),
                reason: "the initial k must be positive".to_string(),
            });
        }
        let source = sweeper.create_source();
        sweeper.assign_source(source)?;
        Ok(Self {
            fission_source: vec![0.0; sweeper.n_reg()],
            k: options.initial_k,
            sweeper,
            options,
            state: SolverState::Inactive,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Handle that stops the solve after the current outer iteration when set
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// The sweeper
    pub fn sweeper(&self) -> &S {
        &self.sweeper
    }

    /// The sweeper, mutably
    pub fn sweeper_mut(&mut self) -> &mut S {
        &mut self.sweeper
    }

    /// Current estimate of k
    pub fn k(&self) -> f64 {
        self.k
    }

    /// Current state
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// Options
    pub fn options(&self) -> &EigenOptions {
        &self.options
    }

    /// Fission source per region over k of the last outer iteration
    pub fn fission_source(&self) -> &[f64] {
        &self.fission_source
    }

    /// Run the power iteration.
    ///
    /// Running out of outer iterations is not an error: the result reports
    /// it and the sweeper keeps the last flux.
    pub fn solve(&mut self) -> Result<EigenResult> {
        let n_group = self.sweeper.n_group();
        self.state = SolverState::Inactive;
        self.k = self.options.initial_k;
        self.sweeper.initialize();
        self.sweeper.calc_fission_source(self.k, &mut self.fission_source);

        let mut result = EigenResult {
            k: self.k,
            converged: false,
            interrupted: false,
            n_outer: 0,
            k_history: vec![],
            residual_history: vec![],
        };
        for iouter in 0..self.options.max_outer {
            if self.interrupt.load(Ordering::Relaxed) {
                warn!("eigenvalue solve interrupted after {iouter} outer iterations");
                result.interrupted = true;
                break;
            }
            self.sweeper.store_old_flux();
            for group in 0..n_group {
                self.sweeper.update_source(group, &self.fission_source)?;
                self.sweeper.sweep(group)?;
            }

            let fission_old = self.sweeper.total_fission(true);
            let fission_new = self.sweeper.total_fission(false);
            let k_old = self.k;
            if fission_old > 0.0 {
                self.k *= fission_new / fission_old;
            }
            self.sweeper.calc_fission_source(self.k, &mut self.fission_source);
            let residual = flux_residual(
                self.sweeper.old_flux().data(),
                self.sweeper.flux().data(),
            );

            result.n_outer = iouter + 1;
            result.k_history.push(self.k);
            result.residual_history.push(residual);
            info!(
                "outer {:4}  k = {:.8}  dk = {:.3e}  flux residual = {:.3e}",
                iouter,
                self.k,
                self.k - k_old,
                residual
            );
            if (self.k - k_old).abs() < self.options.k_tolerance
                && residual < self.options.flux_tolerance
            {
                self.state = SolverState::Converged;
                break;
            }
        }

        result.k = self.k;
        result.converged = self.state == SolverState::Converged;
        if !result.converged && !result.interrupted {
            warn!(
                "eigenvalue solve did not converge in {} outer iterations, k = {:.8}",
                result.n_outer, self.k
            );
        }
        Ok(result)
    }
}

/// Sweeps with a prescribed fission source and no eigenvalue update
#[derive(Debug)]
pub struct FixedSourceSolver<S: TransportSweeper> {
    sweeper: S,
}

impl<S: TransportSweeper> FixedSourceSolver<S> {
    /// Create a solver, binding a fresh source to the sweeper
    pub fn new(mut sweeper: S) -> Result<Self> {
        let source = sweeper.create_source();
        sweeper.assign_source(source)?;
        Ok(Self { sweeper })
    }

    /// The sweeper
    pub fn sweeper(&self) -> &S {
        &self.sweeper
    }

    /// The sweeper, mutably
    pub fn sweeper_mut(&mut self) -> &mut S {
        &mut self.sweeper
    }

    /// One sweep over every group with the given fission source per region
    pub fn step(&mut self, fission_source: &[f64]) -> Result<()> {
        self.sweeper.store_old_flux();
        for group in 0..self.sweeper.n_group() {
            self.sweeper.update_source(group, fission_source)?;
            self.sweeper.sweep(group)?;
        }
        Ok(())
    }

    /// Converge a fixed-source problem; not available
    pub fn solve(&mut self) -> Result<()> {
        Err(SweepError::NotImplemented("stand-alone fixed-source iteration"))
    }
}

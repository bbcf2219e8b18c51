//! Behavioural scenarios for bound IP convergence.

mod boundip;

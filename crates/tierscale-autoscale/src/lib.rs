//! tierscale-autoscale: the decision logic of the control loop.
//!
//! Pure, clock-injected policy objects; none of them perform I/O. The
//! coordinator and the worker loops own the side effects.
//!
//! # Scaling Algorithm
//!
//! ```text
//! q = shared queue length
//! f = load factor from the estimator
//!
//! if q > num_front * front_qlen_factor * f:  provision one front worker
//! if q > num_mid   * mid_qlen_factor   * f:  provision one mid worker
//! if load level just classified High:        provision mid workers up to many_mid
//! ```
//!
//! Retirement is decided locally by each worker from its [`IdleWindow`]:
//! retire when the latest gap exceeds the idle ceiling, or when every
//! sample in a full window exceeds the consistency threshold.

pub mod estimator;
pub mod idle;
pub mod scaler;

pub use estimator::{LoadEstimator, LoadObservation};
pub use idle::{IdleThresholds, IdleWindow, RetireReason};
pub use scaler::{FleetSize, ScaleDecision, ScalePolicy, initial_fleet};

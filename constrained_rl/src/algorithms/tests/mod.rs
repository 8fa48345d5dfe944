//! Behavioural tests for the algorithms module.
//!
//! Each test pins down one property of the CPO machinery; together they
//! describe what the implementation must do.
//!
//! # Test Organization
//!
//! - `gae_tests`: Reward and cost advantage estimation
//! - `conjugate_gradient_tests`: CG convergence and caps
//! - `param_vector_tests`: Parameter flattening, loading and gradients
//! - `cpo_tests`: Dual branches, trust region and rejection
//! - `integration_tests`: End-to-end training on the point environment

pub mod conjugate_gradient_tests;
pub mod integration_tests;

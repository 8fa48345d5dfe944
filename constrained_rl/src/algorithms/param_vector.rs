//! Flat views of a module's float parameters.
//!
//! Natural-gradient methods work on θ as one vector: gradients are dotted,
//! CG solves a linear system in parameter space, and the line search moves
//! along `θ_old + s·x`. Parameters are collected with a [`ModuleMapper`] in
//! traversal order, which is deterministic for a given architecture, so a
//! vector taken from one module can be loaded into any module of the same
//! structure.
//!
//! Values are held as `f64`. Every `f32` is exactly representable in `f64`,
//! so `flatten` followed by `load_into` restores the parameters bit for bit.

use burn::module::{Module, ModuleMapper, Param};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::error::CpoError;

/// Every float parameter of a module, flattened in traversal order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterVector {
    values: Vec<f64>,
    shapes: Vec<Vec<usize>>,
}

// ============================================================================
// Mappers
// ============================================================================

/// Collects parameter values (or only shapes) without changing the module.
struct ParamExtractor {
    values: Vec<f64>,
    shapes: Vec<Vec<usize>>,
    with_values: bool,
}

impl<B: Backend> ModuleMapper<B> for ParamExtractor {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        self.shapes.push(val.dims().to_vec());
        if self.with_values {
            self.values.extend(val.into_data().iter::<f64>());
        }
        param
    }
}

/// Collects gradients for each parameter in traversal order.
struct GradExtractor<'a, B: AutodiffBackend> {
    grads: &'a B::Gradients,
    values: Vec<f64>,
    shapes: Vec<Vec<usize>>,
}

impl<B: AutodiffBackend> ModuleMapper<B> for GradExtractor<'_, B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let shape = val.dims();
        let total_size: usize = shape.iter().product();
        self.shapes.push(shape.to_vec());

        match val.grad(self.grads) {
            Some(grad) => self.values.extend(grad.into_data().iter::<f64>()),
            // Parameter did not take part in the loss
            None => self.values.extend(std::iter::repeat(0.0).take(total_size)),
        }
        param
    }
}

/// Overwrites each parameter with the next slice of a flat vector.
///
/// Shapes are checked by the caller before mapping, so every slice fits.
struct ParamLoader<'a> {
    values: &'a [f64],
    offset: usize,
}

impl<B: Backend> ModuleMapper<B> for ParamLoader<'_> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let device = val.device();
        let require_grad = val.is_require_grad();
        let shape = val.dims();
        let total_size: usize = shape.iter().product();

        let slice = &self.values[self.offset..self.offset + total_size];
        self.offset += total_size;

        let data = TensorData::new(slice.to_vec(), shape).convert::<B::FloatElem>();
        let tensor = Tensor::<B, D>::from_data(data, &device).set_require_grad(require_grad);

        // Same ID, new value
        Param::initialized(param.id.clone(), tensor)
    }
}

// ============================================================================
// ParameterVector
// ============================================================================

impl ParameterVector {
    /// Flatten every float parameter of `module`.
    pub fn flatten<B: Backend, M: Module<B>>(module: &M) -> Self {
        let mut extractor = ParamExtractor {
            values: Vec::new(),
            shapes: Vec::new(),
            with_values: true,
        };
        let _ = module.clone().map(&mut extractor);
        Self {
            values: extractor.values,
            shapes: extractor.shapes,
        }
    }

    /// Flatten the gradient of every float parameter of `module`.
    ///
    /// Parameters that received no gradient contribute zeros, so the result
    /// always lines up with [`ParameterVector::flatten`] of the same module.
    pub fn flat_grad<B: AutodiffBackend, M: Module<B>>(module: &M, grads: &B::Gradients) -> Self {
        let mut extractor = GradExtractor::<B> {
            grads,
            values: Vec::new(),
            shapes: Vec::new(),
        };
        let _ = module.clone().map(&mut extractor);
        Self {
            values: extractor.values,
            shapes: extractor.shapes,
        }
    }

    /// Same layout, different values.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self, CpoError> {
        if values.len() != self.values.len() {
            return Err(CpoError::shape(
                "parameter vector",
                self.values.len(),
                values.len(),
            ));
        }
        Ok(Self {
            values,
            shapes: self.shapes.clone(),
        })
    }

    /// Overwrite the parameters of `module` with these values.
    ///
    /// The module must have the architecture the vector was taken from. On a
    /// mismatch nothing is written.
    pub fn load_into<B: Backend, M: Module<B>>(&self, module: &mut M) -> Result<(), CpoError> {
        let mut layout = ParamExtractor {
            values: Vec::new(),
            shapes: Vec::new(),
            with_values: false,
        };
        let _ = module.clone().map(&mut layout);

        if layout.shapes.len() != self.shapes.len() {
            return Err(CpoError::shape(
                "parameter tensor count",
                self.shapes.len(),
                layout.shapes.len(),
            ));
        }
        let expected: usize = layout
            .shapes
            .iter()
            .map(|s| s.iter().product::<usize>())
            .sum();
        if expected != self.values.len() || layout.shapes != self.shapes {
            return Err(CpoError::shape(
                "parameter vector",
                expected,
                self.values.len(),
            ));
        }

        let mut loader = ParamLoader {
            values: &self.values,
            offset: 0,
        };
        *module = module.clone().map(&mut loader);
        Ok(())
    }

    /// Flat values.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Consume into the flat values.
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Per-tensor shapes in traversal order.
    pub fn shapes(&self) -> &[Vec<usize>] {
        &self.shapes
    }

    /// Total number of scalar parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether every value is finite.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

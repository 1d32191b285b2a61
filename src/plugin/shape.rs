//! Tensor descriptors and symbolic output-shape inference
//!
//! At graph-build time batch dimensions are usually unresolved, so shapes are
//! carried as [`DimExpr`] expressions. Concrete [`TensorDesc`]s appear when the
//! host finalizes the graph (max shapes) and at every enqueue (actual shapes).

use crate::error::{Error, Result};
use crate::quant::{InputLayout, PACK_FACTOR};
use numr::dtype::DType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One dimension of a shape known only symbolically at build time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DimExpr {
    Const(usize),
    /// Resolved by the host at runtime (e.g. batch or sequence length)
    Symbol(Arc<str>),
    /// `expr * factor`
    Product(Box<DimExpr>, usize),
}

impl DimExpr {
    /// A named runtime dimension.
    pub fn symbol(name: &str) -> Self {
        Self::Symbol(Arc::from(name))
    }

    /// Multiply by a constant, folding when possible.
    pub fn scaled(self, factor: usize) -> Self {
        match self {
            Self::Const(v) => Self::Const(v * factor),
            Self::Product(inner, f) => Self::Product(inner, f * factor),
            sym @ Self::Symbol(_) => Self::Product(Box::new(sym), factor),
        }
    }

    /// Value of a constant dimension, `None` when symbolic.
    pub fn as_const(&self) -> Option<usize> {
        match self {
            Self::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// Evaluate with concrete values for every symbol.
    pub fn resolve(&self, bindings: &HashMap<&str, usize>) -> Option<usize> {
        match self {
            Self::Const(v) => Some(*v),
            Self::Symbol(name) => bindings.get(name.as_ref()).copied(),
            Self::Product(inner, factor) => inner.resolve(bindings).map(|v| v * factor),
        }
    }
}

impl From<usize> for DimExpr {
    fn from(v: usize) -> Self {
        Self::Const(v)
    }
}

impl fmt::Display for DimExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(v) => write!(f, "{v}"),
            Self::Symbol(name) => write!(f, "{name}"),
            Self::Product(inner, factor) => write!(f, "{inner}*{factor}"),
        }
    }
}

/// Symbolic shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DimsExprs {
    pub dims: Vec<DimExpr>,
}

impl DimsExprs {
    /// Shape from per-dimension expressions.
    pub fn new(dims: Vec<DimExpr>) -> Self {
        Self { dims }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Evaluate every dimension, `None` if any symbol is unbound.
    pub fn resolve(&self, bindings: &HashMap<&str, usize>) -> Option<Vec<usize>> {
        self.dims.iter().map(|d| d.resolve(bindings)).collect()
    }
}

impl From<&[usize]> for DimsExprs {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.iter().copied().map(DimExpr::Const).collect())
    }
}

/// Memory layout of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TensorFormat {
    /// Row-major, densely packed
    #[default]
    Linear,
    /// Channels vectorized by 2
    Chw2,
    /// Channels vectorized by 4
    Chw4,
    /// Channels-last, vectorized by 8
    Hwc8,
    /// Channels vectorized by 32
    Chw32,
}

/// Concrete tensor descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDesc {
    pub dims: Vec<usize>,
    pub dtype: DType,
    pub format: TensorFormat,
}

impl TensorDesc {
    /// Linear-format descriptor.
    pub fn new(dims: &[usize], dtype: DType) -> Self {
        Self {
            dims: dims.to_vec(),
            dtype,
            format: TensorFormat::Linear,
        }
    }

    /// Same descriptor in another memory layout.
    pub fn with_format(mut self, format: TensorFormat) -> Self {
        self.format = format;
        self
    }

    /// Total element count.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Bytes a densely packed buffer of this tensor occupies.
    pub fn size_in_bytes(&self) -> usize {
        self.numel() * self.dtype.size_in_bytes()
    }

    /// `(rows, last)`: product of all but the last dim, and the last dim.
    pub fn flatten_2d(&self) -> Result<(usize, usize)> {
        match self.dims.split_last() {
            Some((&last, leading)) => Ok((leading.iter().product(), last)),
            None => Err(Error::config("scalar tensor where a matrix was expected")),
        }
    }
}

/// Descriptor seen at configure time: the shape range the host will use.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicTensorDesc {
    pub desc: TensorDesc,
    pub min: Vec<usize>,
    pub max: Vec<usize>,
}

impl DynamicTensorDesc {
    /// A tensor whose shape never varies.
    pub fn fixed(desc: TensorDesc) -> Self {
        Self {
            min: desc.dims.clone(),
            max: desc.dims.clone(),
            desc,
        }
    }

    /// A tensor whose shape varies between `min` and `max`.
    pub fn with_range(desc: TensorDesc, min: &[usize], max: &[usize]) -> Self {
        Self {
            desc,
            min: min.to_vec(),
            max: max.to_vec(),
        }
    }

    /// Descriptor of the largest shape in range.
    pub fn max_desc(&self) -> TensorDesc {
        TensorDesc {
            dims: self.max.clone(),
            ..self.desc.clone()
        }
    }
}

/// Output shape: activation's leading dims followed by `weight.dims[1] * 8`.
pub fn infer_output_dims(layout: &InputLayout, inputs: &[DimsExprs]) -> Result<DimsExprs> {
    if inputs.len() != layout.input_count() {
        return Err(Error::config(format!(
            "expected {} inputs, got {}",
            layout.input_count(),
            inputs.len()
        )));
    }

    let act = &inputs[layout.activations];
    let weight = &inputs[layout.weight];
    if act.rank() < 2 {
        return Err(Error::config(format!(
            "activations must be at least 2D, got rank {}",
            act.rank()
        )));
    }
    if weight.rank() != 2 {
        return Err(Error::config(format!(
            "weights must be 2D [K, N/{PACK_FACTOR}], got rank {}",
            weight.rank()
        )));
    }

    let mut dims = act.dims[..act.rank() - 1].to_vec();
    dims.push(weight.dims[1].clone().scaled(PACK_FACTOR));
    Ok(DimsExprs::new(dims))
}

/// Concrete `(M, N, K)` from actual activation and weight descriptors.
pub fn problem_size(act: &TensorDesc, weight: &TensorDesc) -> Result<(usize, usize, usize)> {
    if act.dims.len() < 2 {
        return Err(Error::config(format!(
            "activations must be at least 2D, got {:?}",
            act.dims
        )));
    }
    if weight.dims.len() != 2 {
        return Err(Error::config(format!(
            "weights must be 2D, got {:?}",
            weight.dims
        )));
    }
    let (m, k) = act.flatten_2d()?;
    let n = weight.dims[1] * PACK_FACTOR;
    Ok((m, n, k))
}

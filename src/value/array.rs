//! Multidimensional arrays.
//!
//! An [`Array`] is a shape vector plus row-major flat data. Elements are
//! themselves [`Value`]s, so arrays nest arbitrarily (ragged structures are
//! arrays of arrays with differing shapes).

use super::{Scalar, Value};
use crate::error::{BridgeError, Result};

/// Advisory element type carried on the wire as `"t"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeHint {
    /// `t = 0`
    #[default]
    Numeric,
    /// `t = 1`
    Character,
}

impl TypeHint {
    /// Wire value.
    pub fn as_u8(self) -> u8 {
        match self {
            TypeHint::Numeric => 0,
            TypeHint::Character => 1,
        }
    }

    /// Decode a wire value; anything but 1 reads as numeric.
    pub fn from_u8(t: u8) -> Self {
        if t == 1 {
            TypeHint::Character
        } else {
            TypeHint::Numeric
        }
    }
}

/// Serializable multidimensional array.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    shape: Vec<usize>,
    data: Vec<Value>,
    hint: TypeHint,
}

/// Most elements [`Array::reshape`] will produce by cycling its data.
pub const MAX_RESHAPE_ELEMENTS: usize = 16 * 1024 * 1024;

/// Number of elements an array of this shape holds.
pub fn element_count(shape: &[usize]) -> Result<usize> {
    shape.iter().try_fold(1usize, |acc, &n| {
        acc.checked_mul(n)
            .ok_or_else(|| BridgeError::TypeMismatch(format!("shape {:?} is too large", shape)))
    })
}

impl Array {
    /// Create an array; `data.len()` must equal the product of `shape`.
    pub fn new(shape: Vec<usize>, data: Vec<Value>, hint: TypeHint) -> Result<Self> {
        let expected = element_count(&shape)?;
        if data.len() != expected {
            return Err(BridgeError::TypeMismatch(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data, hint })
    }

    /// Create an array, cycling or truncating `data` to fill `shape`.
    ///
    /// Empty data can only fill an empty shape. Cycling stops at
    /// [`MAX_RESHAPE_ELEMENTS`].
    pub fn reshape(shape: Vec<usize>, data: Vec<Value>, hint: TypeHint) -> Result<Self> {
        let expected = element_count(&shape)?;
        if data.len() == expected {
            return Ok(Self { shape, data, hint });
        }
        if data.is_empty() {
            return Err(BridgeError::TypeMismatch(format!(
                "cannot fill shape {:?} from empty data",
                shape
            )));
        }
        if expected > MAX_RESHAPE_ELEMENTS {
            return Err(BridgeError::TypeMismatch(format!(
                "shape {:?} needs {} elements, more than {} can be filled from {}",
                shape,
                expected,
                MAX_RESHAPE_ELEMENTS,
                data.len()
            )));
        }
        let mut filled = Vec::new();
        filled.try_reserve_exact(expected).map_err(|_| {
            BridgeError::TypeMismatch(format!("cannot allocate {} elements", expected))
        })?;
        filled.extend(data.iter().cycle().take(expected).cloned());
        Ok(Self {
            shape,
            data: filled,
            hint,
        })
    }

    /// Rank-0 array holding one element; the hint is inferred.
    pub fn scalar(value: impl Into<Value>) -> Self {
        let data = vec![value.into()];
        let hint = Self::infer_hint(&data);
        Self {
            shape: Vec::new(),
            data,
            hint,
        }
    }

    /// Rank-1 array; the hint is inferred from the first element.
    pub fn vector(data: Vec<Value>) -> Self {
        let hint = Self::infer_hint(&data);
        Self {
            shape: vec![data.len()],
            data,
            hint,
        }
    }

    /// Character vector, one element per `char`.
    pub fn from_text(text: &str) -> Self {
        let data: Vec<Value> = text
            .chars()
            .map(|c| Value::Scalar(Scalar::Text(c.to_string())))
            .collect();
        Self {
            shape: vec![data.len()],
            data,
            hint: TypeHint::Character,
        }
    }

    /// Hint deduced from the first element: nested arrays lend theirs,
    /// text means character, anything else (or no data) numeric.
    pub fn infer_hint(data: &[Value]) -> TypeHint {
        match data.first() {
            Some(Value::Array(inner)) => inner.hint,
            Some(Value::Scalar(Scalar::Text(_))) => TypeHint::Character,
            _ => TypeHint::Numeric,
        }
    }

    /// Per-axis sizes.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of axes.
    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Flat row-major elements.
    #[inline]
    pub fn data(&self) -> &[Value] {
        &self.data
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the array holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Type hint.
    #[inline]
    pub fn hint(&self) -> TypeHint {
        self.hint
    }

    /// Override the type hint.
    pub fn set_hint(&mut self, hint: TypeHint) {
        self.hint = hint;
    }

    /// True for rank 0.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Consume into the flat data.
    pub fn into_data(self) -> Vec<Value> {
        self.data
    }

    /// True if no element is itself a container.
    pub fn is_simple(&self) -> bool {
        !self.data.iter().any(Value::is_container)
    }

    /// Row-major strides: the reverse running product of trailing axes.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.shape.len()];
        for axis in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.shape[axis + 1];
        }
        strides
    }

    /// Flat offset of a multidimensional index.
    pub fn flat_index(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.shape.len() {
            return Err(BridgeError::Index(format!(
                "rank is {}, index has {} elements",
                self.shape.len(),
                index.len()
            )));
        }
        if let Some(axis) = (0..index.len()).find(|&axis| index[axis] >= self.shape[axis]) {
            return Err(BridgeError::Index(format!(
                "index {} out of range for axis {} of length {}",
                index[axis], axis, self.shape[axis]
            )));
        }
        Ok(index
            .iter()
            .zip(self.strides())
            .map(|(i, stride)| i * stride)
            .sum())
    }

    /// Element at a multidimensional index.
    pub fn get(&self, index: &[usize]) -> Result<&Value> {
        let offset = self.flat_index(index)?;
        Ok(&self.data[offset])
    }

    /// Replace the element at a multidimensional index.
    pub fn set(&mut self, index: &[usize], value: impl Into<Value>) -> Result<()> {
        let offset = self.flat_index(index)?;
        self.data[offset] = value.into();
        Ok(())
    }

    /// Decompose along the leading axis.
    ///
    /// A rank-k array (k >= 1) yields `shape[0]` arrays of shape `shape[1..]`
    /// whose concatenated data is the original data.
    pub fn split_leading(&self) -> Result<Vec<Array>> {
        let Some((&count, rest)) = self.shape.split_first() else {
            return Err(BridgeError::Index(
                "cannot split a scalar along its leading axis".into(),
            ));
        };
        let block = element_count(rest)?;
        Ok((0..count)
            .map(|i| Array {
                shape: rest.to_vec(),
                data: self.data[i * block..(i + 1) * block].to_vec(),
                hint: self.hint,
            })
            .collect())
    }

    /// Independent deep copy.
    ///
    /// Nested arrays and plain leaves are duplicated; object references keep
    /// pointing at the same remote object.
    pub fn copy(&self) -> Array {
        self.clone()
    }
}

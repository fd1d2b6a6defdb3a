//! Runtime-typed values for querying entity state.
//!
//! Recorders bind a query once by name through `set_response`, which returns
//! a [`Response`] holding an [`Information`] of the right kind, and then
//! refresh it cheaply with `get_response` after every commit.

use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVector};
use std::fmt;

/// Discriminator for [`Information`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoKind {
    Int,
    Double,
    Id,
    Vector,
    Matrix,
    Tensor,
}

/// Dense tensor of arbitrary order, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dims: Vec<usize>,
    data: Vec<f64>,
}

impl Tensor {
    /// Zero tensor with the given dimensions.
    pub fn zeros(dims: &[usize]) -> Self {
        let len = dims.iter().product();
        Self {
            dims: dims.to_vec(),
            data: vec![0.0; len],
        }
    }

    /// Build from dimensions and row-major data.
    ///
    /// # Errors
    ///
    /// Returns error if `data.len()` is not the product of `dims`.
    pub fn from_data(dims: &[usize], data: Vec<f64>) -> Result<Self> {
        let len: usize = dims.iter().product();
        if len != data.len() {
            return Err(Error::Config(format!(
                "tensor of shape {:?} needs {} values, got {}",
                dims,
                len,
                data.len()
            )));
        }
        Ok(Self {
            dims: dims.to_vec(),
            data,
        })
    }

    /// Tensor order (number of indices).
    pub fn order(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut offset = 0;
        for (&i, &d) in index.iter().zip(&self.dims) {
            if i >= d {
                return None;
            }
            offset = offset * d + i;
        }
        Some(offset)
    }

    /// Component at a multi-index.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        self.offset(index).map(|o| self.data[o])
    }

    /// Mutable component at a multi-index.
    pub fn get_mut(&mut self, index: &[usize]) -> Option<&mut f64> {
        self.offset(index).map(move |o| &mut self.data[o])
    }
}

/// A value of exactly one kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Information {
    Int(i32),
    Double(f64),
    Id(Vec<i32>),
    Vector(DVector<f64>),
    Matrix(DMatrix<f64>),
    Tensor(Tensor),
}

impl Information {
    pub fn kind(&self) -> InfoKind {
        match self {
            Information::Int(_) => InfoKind::Int,
            Information::Double(_) => InfoKind::Double,
            Information::Id(_) => InfoKind::Id,
            Information::Vector(_) => InfoKind::Vector,
            Information::Matrix(_) => InfoKind::Matrix,
            Information::Tensor(_) => InfoKind::Tensor,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Information::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Information::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<&[i32]> {
        match self {
            Information::Id(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&DVector<f64>> {
        match self {
            Information::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&DMatrix<f64>> {
        match self {
            Information::Matrix(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Information::Tensor(v) => Some(v),
            _ => None,
        }
    }

    /// Flatten the numeric content (row-major for matrices).
    ///
    /// Used by recorders that track every component the same way.
    pub fn values(&self) -> Vec<f64> {
        match self {
            Information::Int(v) => vec![f64::from(*v)],
            Information::Double(v) => vec![*v],
            Information::Id(v) => v.iter().map(|&i| f64::from(i)).collect(),
            Information::Vector(v) => v.as_slice().to_vec(),
            Information::Matrix(m) => m.transpose().as_slice().to_vec(),
            Information::Tensor(t) => t.data.clone(),
        }
    }
}

impl fmt::Display for Information {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Information::Int(v) => writeln!(f, "{v}"),
            Information::Double(v) => writeln!(f, "{v}"),
            Information::Id(v) => {
                let parts: Vec<String> = v.iter().map(|i| i.to_string()).collect();
                writeln!(f, "{}", parts.join(" "))
            }
            Information::Vector(v) => {
                let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                writeln!(f, "{}", parts.join(" "))
            }
            Information::Matrix(m) => {
                for row in m.row_iter() {
                    let parts: Vec<String> = row.iter().map(|x| x.to_string()).collect();
                    writeln!(f, "{}", parts.join(" "))?;
                }
                Ok(())
            }
            Information::Tensor(t) => {
                let parts: Vec<String> = t.data.iter().map(|x| x.to_string()).collect();
                writeln!(f, "tensor {:?}: {}", t.dims, parts.join(" "))
            }
        }
    }
}

/// Identifies a bound query on an entity. Meaning is private to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseId(pub u32);

/// A bound query and its most recent value.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    id: ResponseId,
    info: Information,
}

impl Response {
    pub fn new(id: ResponseId, info: Information) -> Self {
        Self { id, info }
    }

    pub fn id(&self) -> ResponseId {
        self.id
    }

    pub fn kind(&self) -> InfoKind {
        self.info.kind()
    }

    pub fn info(&self) -> &Information {
        &self.info
    }

    /// Replace the carried value. The kind may not change.
    ///
    /// # Errors
    ///
    /// Returns error if `info` is of a different kind than the bound query.
    pub fn set(&mut self, info: Information) -> Result<()> {
        if info.kind() != self.info.kind() {
            return Err(Error::Parameter(format!(
                "response {:?} carries {:?}, got {:?}",
                self.id,
                self.info.kind(),
                info.kind()
            )));
        }
        self.info = info;
        Ok(())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.info.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_discriminator() {
        assert_eq!(Information::Int(3).kind(), InfoKind::Int);
        assert_eq!(Information::Double(1.0).kind(), InfoKind::Double);
        assert_eq!(Information::Id(vec![1]).kind(), InfoKind::Id);
        assert_eq!(
            Information::Vector(DVector::zeros(2)).kind(),
            InfoKind::Vector
        );
        assert_eq!(
            Information::Matrix(DMatrix::zeros(2, 2)).kind(),
            InfoKind::Matrix
        );
        assert_eq!(
            Information::Tensor(Tensor::zeros(&[2, 2, 2])).kind(),
            InfoKind::Tensor
        );
    }

    #[test]
    fn test_accessors_only_for_requested_kind() {
        let info = Information::Double(2.5);
        assert_eq!(info.as_double(), Some(2.5));
        assert!(info.as_int().is_none());
        assert!(info.as_vector().is_none());
        assert!(info.as_matrix().is_none());
    }

    #[test]
    fn test_tensor_indexing() {
        let mut t = Tensor::zeros(&[2, 3, 4]);
        assert_eq!(t.order(), 3);
        assert_eq!(t.data().len(), 24);

        *t.get_mut(&[1, 2, 3]).unwrap() = 7.0;
        assert_eq!(t.get(&[1, 2, 3]), Some(7.0));
        assert_eq!(t.data()[23], 7.0);
        assert!(t.get(&[2, 0, 0]).is_none());
        assert!(t.get(&[0, 0]).is_none());
    }

    #[test]
    fn test_tensor_shape_validation() {
        assert!(Tensor::from_data(&[2, 2], vec![1.0; 3]).is_err());
        assert!(Tensor::from_data(&[2, 2], vec![1.0; 4]).is_ok());
    }

    #[test]
    fn test_print() {
        let info = Information::Matrix(DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(info.to_string(), "1 2\n3 4\n");
        assert_eq!(Information::Id(vec![4, 5]).to_string(), "4 5\n");
    }

    #[test]
    fn test_values_row_major() {
        let info = Information::Matrix(DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(info.values(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_response_kind_is_fixed() {
        let mut response = Response::new(ResponseId(1), Information::Double(0.0));
        response.set(Information::Double(4.0)).unwrap();
        assert_eq!(response.info().as_double(), Some(4.0));
        assert!(response.set(Information::Int(1)).is_err());
        assert_eq!(response.info().as_double(), Some(4.0));
    }
}

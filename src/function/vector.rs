use crate::data::{check_size, EntityPool, ScalarData};
use crate::errors::ConcunoError;
use crate::function::FunctionOps;
use crate::schema::{Schema, TypeId};

/// Number of floats per vector, failing for anything not built from `Float`.
fn float_vector_len(schema: &Schema, vector_type: TypeId, function: &str) -> Result<usize, ConcunoError> {
    if schema.base_of(vector_type) != schema.float_type() {
        return Err(ConcunoError::TypeMismatch(format!(
            "{} only supports Float vectors, not {}",
            function,
            schema.ty(vector_type).name
        )));
    }
    Ok(schema.ty(vector_type).count)
}

/// Elementwise `a - b` over a pair of float vectors.
#[derive(Clone, Debug)]
pub struct DifferenceFunction {
    vector_type: TypeId,
    pair_type: TypeId,
    len: usize,
}

impl DifferenceFunction {
    pub fn new(schema: &mut Schema, vector_type: TypeId) -> Result<Self, ConcunoError> {
        let len = float_vector_len(schema, vector_type, "Difference")?;
        let pair_type = schema.array_type(vector_type, 2)?;
        Ok(DifferenceFunction {
            vector_type,
            pair_type,
            len,
        })
    }
}

impl FunctionOps for DifferenceFunction {
    fn name(&self) -> &str {
        "Difference"
    }

    fn type_in(&self) -> TypeId {
        self.pair_type
    }

    fn type_out(&self) -> TypeId {
        self.vector_type
    }

    fn size_in(&self) -> usize {
        2 * self.len * f64::SIZE
    }

    fn size_out(&self) -> usize {
        self.len * f64::SIZE
    }

    fn evaluate(&self, _pool: &EntityPool, input: &[u8], output: &mut [u8]) -> Result<(), ConcunoError> {
        check_size(input, self.size_in())?;
        check_size(output, self.size_out())?;
        let (a, b) = input.split_at(self.size_out());
        for ((a, b), c) in a
            .chunks_exact(f64::SIZE)
            .zip(b.chunks_exact(f64::SIZE))
            .zip(output.chunks_exact_mut(f64::SIZE))
        {
            (f64::read(a) - f64::read(b)).write(c);
        }
        Ok(())
    }
}

/// p-norm of the difference between a pair of float vectors.
#[derive(Clone, Debug)]
pub struct DistanceFunction {
    pair_type: TypeId,
    float_type: TypeId,
    len: usize,
    exponent: f64,
}

impl DistanceFunction {
    /// Any positive, finite exponent works. 1 gives Manhattan distance, 2
    /// Euclidean.
    pub fn new(schema: &mut Schema, vector_type: TypeId, exponent: f64) -> Result<Self, ConcunoError> {
        if !exponent.is_finite() || exponent <= 0.0 {
            return Err(ConcunoError::InvalidParameter(
                "exponent".to_string(),
                "a positive finite number".to_string(),
                exponent.to_string(),
            ));
        }
        let len = float_vector_len(schema, vector_type, "Distance")?;
        let pair_type = schema.array_type(vector_type, 2)?;
        Ok(DistanceFunction {
            pair_type,
            float_type: schema.float_type(),
            len,
            exponent,
        })
    }

    pub fn euclidean(schema: &mut Schema, vector_type: TypeId) -> Result<Self, ConcunoError> {
        Self::new(schema, vector_type, 2.0)
    }

    pub fn exponent(&self) -> f64 {
        self.exponent
    }
}

impl FunctionOps for DistanceFunction {
    fn name(&self) -> &str {
        "Distance"
    }

    fn type_in(&self) -> TypeId {
        self.pair_type
    }

    fn type_out(&self) -> TypeId {
        self.float_type
    }

    fn size_in(&self) -> usize {
        2 * self.len * f64::SIZE
    }

    fn size_out(&self) -> usize {
        f64::SIZE
    }

    fn evaluate(&self, _pool: &EntityPool, input: &[u8], output: &mut [u8]) -> Result<(), ConcunoError> {
        check_size(input, self.size_in())?;
        check_size(output, f64::SIZE)?;
        let (a, b) = input.split_at(self.len * f64::SIZE);
        let diffs = a
            .chunks_exact(f64::SIZE)
            .zip(b.chunks_exact(f64::SIZE))
            .map(|(a, b)| (f64::read(a) - f64::read(b)).abs());
        let distance = if self.exponent == 1.0 {
            diffs.sum::<f64>()
        } else if self.exponent == 2.0 {
            diffs.map(|d| d * d).sum::<f64>().sqrt()
        } else {
            diffs.map(|d| d.powf(self.exponent)).sum::<f64>().powf(1.0 / self.exponent)
        };
        distance.write(output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{encode_scalars, read_scalars};
    use crate::schema::ScalarKind;

    fn run(function: &dyn FunctionOps, values: &[f64]) -> Vec<f64> {
        let pool = EntityPool::new();
        let mut out = vec![0u8; function.size_out()];
        function.evaluate(&pool, &encode_scalars(values), &mut out).unwrap();
        read_scalars(ScalarKind::Float, &out, function.size_out() / 8).unwrap()
    }

    #[test]
    fn test_distance_euclidean() {
        let mut schema = Schema::new();
        let v2 = schema.array_type(schema.float_type(), 2).unwrap();
        let distance = DistanceFunction::euclidean(&mut schema, v2).unwrap();
        assert_eq!(run(&distance, &[0.0, 0.0, 3.0, 4.0]), vec![5.0]);
        assert_eq!(schema.ty(distance.type_in()).name, "Float[2][2]");
        assert_eq!(distance.type_out(), schema.float_type());
    }

    #[test]
    fn test_distance_manhattan_and_general() {
        let mut schema = Schema::new();
        let v2 = schema.array_type(schema.float_type(), 2).unwrap();
        let manhattan = DistanceFunction::new(&mut schema, v2, 1.0).unwrap();
        assert_eq!(run(&manhattan, &[1.0, -1.0, 4.0, 3.0]), vec![7.0]);
        let cubic = DistanceFunction::new(&mut schema, v2, 3.0).unwrap();
        let d = run(&cubic, &[0.0, 0.0, 1.0, 2.0])[0];
        assert!((d - 9.0_f64.powf(1.0 / 3.0)).abs() < 1e-12);
        assert!(DistanceFunction::new(&mut schema, v2, 0.0).is_err());
        assert!(DistanceFunction::new(&mut schema, v2, f64::NAN).is_err());
    }

    #[test]
    fn test_difference_antisymmetric() {
        let mut schema = Schema::new();
        let v3 = schema.array_type(schema.float_type(), 3).unwrap();
        let difference = DifferenceFunction::new(&mut schema, v3).unwrap();
        let pairs = [
            ([1.0, 2.0, 3.0], [0.5, -4.0, 3.0]),
            ([-7.25, 0.0, 1e6], [2.0, 2.0, -1e-3]),
        ];
        for (a, b) in pairs {
            let ab = run(&difference, &[a.as_slice(), b.as_slice()].concat());
            let ba = run(&difference, &[b.as_slice(), a.as_slice()].concat());
            assert_eq!(ab.len(), 3);
            for (x, y) in ab.iter().zip(ba.iter()) {
                assert_eq!(*x, -*y);
            }
        }
        assert_eq!(run(&difference, &[1.0, 2.0, 3.0, 0.5, 0.5, 0.5]), vec![0.5, 1.5, 2.5]);
    }

    #[test]
    fn test_difference_scalar_float() {
        let mut schema = Schema::new();
        let float = schema.float_type();
        let difference = DifferenceFunction::new(&mut schema, float).unwrap();
        assert_eq!(run(&difference, &[5.0, 1.0]), vec![4.0]);
    }

    #[test]
    fn test_vector_functions_require_floats() {
        let mut schema = Schema::new();
        let ints = schema.array_type(schema.int_type(), 2).unwrap();
        assert!(matches!(
            DifferenceFunction::new(&mut schema, ints),
            Err(ConcunoError::TypeMismatch(_))
        ));
        assert!(DistanceFunction::euclidean(&mut schema, ints).is_err());
    }
}

//! Typed values for passing into and returning from guest functions and hostcalls.

use bulwark_module::ValueType;

/// Typed values used for passing arguments to guest exports and hostcalls, and for returning
/// their results.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Val {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

macro_rules! impl_from_scalars {
    ( { $( $ctor:ident : $ty:ty ),* } ) => {
        $(
            impl From<$ty> for Val {
                fn from(x: $ty) -> Val {
                    Val::$ctor(x)
                }
            }
        )*
    };
}

impl_from_scalars!({
    I32: i32,
    I64: i64,
    F32: f32,
    F64: f64
});

impl Val {
    pub fn value_type(&self) -> ValueType {
        match self {
            Val::I32(_) => ValueType::I32,
            Val::I64(_) => ValueType::I64,
            Val::F32(_) => ValueType::F32,
            Val::F64(_) => ValueType::F64,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Val::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Val::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Val::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Val::F64(v) => Some(v),
            _ => None,
        }
    }
}

/// Do the values have exactly the given types, in order?
pub fn vals_match_types(vals: &[Val], types: &[ValueType]) -> bool {
    vals.len() == types.len()
        && vals
            .iter()
            .zip(types.iter())
            .all(|(v, ty)| v.value_type() == *ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_of_values() {
        let vals: Vec<Val> = vec![1i32.into(), 2i64.into(), 3.0f64.into()];
        assert!(vals_match_types(
            &vals,
            &[ValueType::I32, ValueType::I64, ValueType::F64]
        ));
        assert!(!vals_match_types(
            &vals,
            &[ValueType::I32, ValueType::I32, ValueType::F64]
        ));
        assert!(!vals_match_types(&vals, &[ValueType::I32, ValueType::I64]));
        assert!(vals_match_types(&[], &[]));
        assert_eq!(Val::from(1.5f32).as_f32(), Some(1.5));
        assert_eq!(Val::from(1.5f32).as_f64(), None);
    }
}

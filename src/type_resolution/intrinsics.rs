use crate::types::{builtin, TypeId};

/// Source-language built-in functions. Each backend maps these through its
/// own table; a missing mapping there is an `UnsupportedIntrinsic` for that
/// target only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Abs,
    Min,
    Max,
    Clamp,
    Saturate,
    Lerp,
    Dot,
    Cross,
    Normalize,
    Length,
    Sqrt,
    Rsqrt,
    Pow,
    Floor,
    Frac,
    Mul,
    Sample,
    DdxCoarse,
    DdyCoarse,
}

impl Intrinsic {
    pub fn from_name(name: &str) -> Option<Intrinsic> {
        Some(match name {
            "abs" => Intrinsic::Abs,
            "min" => Intrinsic::Min,
            "max" => Intrinsic::Max,
            "clamp" => Intrinsic::Clamp,
            "saturate" => Intrinsic::Saturate,
            "lerp" => Intrinsic::Lerp,
            "dot" => Intrinsic::Dot,
            "cross" => Intrinsic::Cross,
            "normalize" => Intrinsic::Normalize,
            "length" => Intrinsic::Length,
            "sqrt" => Intrinsic::Sqrt,
            "rsqrt" => Intrinsic::Rsqrt,
            "pow" => Intrinsic::Pow,
            "floor" => Intrinsic::Floor,
            "frac" => Intrinsic::Frac,
            "mul" => Intrinsic::Mul,
            "sample" => Intrinsic::Sample,
            "ddx_coarse" => Intrinsic::DdxCoarse,
            "ddy_coarse" => Intrinsic::DdyCoarse,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Intrinsic::Abs => "abs",
            Intrinsic::Min => "min",
            Intrinsic::Max => "max",
            Intrinsic::Clamp => "clamp",
            Intrinsic::Saturate => "saturate",
            Intrinsic::Lerp => "lerp",
            Intrinsic::Dot => "dot",
            Intrinsic::Cross => "cross",
            Intrinsic::Normalize => "normalize",
            Intrinsic::Length => "length",
            Intrinsic::Sqrt => "sqrt",
            Intrinsic::Rsqrt => "rsqrt",
            Intrinsic::Pow => "pow",
            Intrinsic::Floor => "floor",
            Intrinsic::Frac => "frac",
            Intrinsic::Mul => "mul",
            Intrinsic::Sample => "sample",
            Intrinsic::DdxCoarse => "ddx_coarse",
            Intrinsic::DdyCoarse => "ddy_coarse",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Signature {
    pub params: Vec<TypeId>,
    pub ret: TypeId,
}

impl Signature {
    fn new(params: &[TypeId], ret: TypeId) -> Self {
        Signature {
            params: params.to_vec(),
            ret,
        }
    }
}

/// All float scalar/vector shapes, the common genericity axis.
fn float_family() -> [TypeId; 4] {
    [
        builtin::FLOAT_ID,
        builtin::FVEC_ID[2],
        builtin::FVEC_ID[3],
        builtin::FVEC_ID[4],
    ]
}

fn int_family() -> [TypeId; 2] {
    [builtin::INT_ID, builtin::UINT_ID]
}

pub fn signatures(intrinsic: Intrinsic) -> Vec<Signature> {
    use builtin::*;
    let mut sigs = vec![];

    match intrinsic {
        Intrinsic::Abs | Intrinsic::Saturate | Intrinsic::Sqrt | Intrinsic::Rsqrt
        | Intrinsic::Floor | Intrinsic::Frac | Intrinsic::DdxCoarse | Intrinsic::DdyCoarse => {
            for t in float_family().iter() {
                sigs.push(Signature::new(&[*t], *t));
            }
            if intrinsic == Intrinsic::Abs {
                sigs.push(Signature::new(&[INT_ID], INT_ID));
            }
        }
        Intrinsic::Normalize => {
            for n in 2..=4 {
                sigs.push(Signature::new(&[FVEC_ID[n]], FVEC_ID[n]));
            }
        }
        Intrinsic::Length => {
            for n in 2..=4 {
                sigs.push(Signature::new(&[FVEC_ID[n]], FLOAT_ID));
            }
        }
        Intrinsic::Min | Intrinsic::Max => {
            for t in float_family().iter() {
                sigs.push(Signature::new(&[*t, *t], *t));
            }
            for t in int_family().iter() {
                sigs.push(Signature::new(&[*t, *t], *t));
            }
        }
        Intrinsic::Pow => {
            for t in float_family().iter() {
                sigs.push(Signature::new(&[*t, *t], *t));
            }
        }
        Intrinsic::Clamp | Intrinsic::Lerp => {
            for t in float_family().iter() {
                sigs.push(Signature::new(&[*t, *t, *t], *t));
            }
        }
        Intrinsic::Dot => {
            for n in 2..=4 {
                sigs.push(Signature::new(&[FVEC_ID[n], FVEC_ID[n]], FLOAT_ID));
            }
        }
        Intrinsic::Cross => {
            sigs.push(Signature::new(&[FVEC_ID[3], FVEC_ID[3]], FVEC_ID[3]));
        }
        Intrinsic::Mul => {
            let mats = [MAT2_ID, MAT3_ID, MAT4_ID];
            for (i, m) in mats.iter().enumerate() {
                let n = i + 2;
                sigs.push(Signature::new(&[*m, FVEC_ID[n]], FVEC_ID[n]));
                sigs.push(Signature::new(&[*m, *m], *m));
            }
        }
        Intrinsic::Sample => {
            sigs.push(Signature::new(
                &[TEX2D_ID, SAMPLER_ID, FVEC_ID[2]],
                FVEC_ID[4],
            ));
            sigs.push(Signature::new(
                &[TEX3D_ID, SAMPLER_ID, FVEC_ID[3]],
                FVEC_ID[4],
            ));
            sigs.push(Signature::new(
                &[TEXCUBE_ID, SAMPLER_ID, FVEC_ID[3]],
                FVEC_ID[4],
            ));
        }
    }

    sigs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        assert_eq!(Intrinsic::from_name("lerp"), Some(Intrinsic::Lerp));
        assert_eq!(Intrinsic::from_name("nonsense"), None);
    }

    #[test]
    fn mul_covers_matrix_vector_and_matrix_matrix() {
        let sigs = signatures(Intrinsic::Mul);
        assert_eq!(sigs.len(), 6);
        assert!(sigs
            .iter()
            .any(|s| s.params == vec![builtin::MAT4_ID, builtin::FVEC_ID[4]]));
    }

    #[test]
    fn sample_is_overloaded_per_texture_dimension() {
        assert_eq!(signatures(Intrinsic::Sample).len(), 3);
    }
}

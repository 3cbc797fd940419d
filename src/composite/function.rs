use super::reduction::{ReduceFn, Reduction, ValidThreshold};
use crate::chunking::ChunkPosition;
use crate::data::{DataChunk, Sample, TypedChunk};
use crate::pipeline::ChunkFunction;
use crate::{dispatch_chunk, Result};
use anyhow::anyhow;

/// Reduces the chunks of all inputs pixel by pixel.
///
/// Missing values never contribute. A pixel with fewer valid
/// values than the effective threshold is missing, as is the
/// whole output when fewer inputs than the threshold have any
/// valid value at all.
#[derive(Clone, Debug)]
pub struct CompositeFunction {
    reduction: Reduction,
    min_valid: usize,
    prototype: DataChunk,
}

impl CompositeFunction {
    pub fn new(reduction: Reduction, min_valid: usize, threshold: ValidThreshold, prototype: DataChunk) -> Self {
        CompositeFunction {
            reduction,
            min_valid: threshold.effective(min_valid, reduction),
            prototype,
        }
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    /// The number of valid values a pixel needs.
    pub fn min_valid(&self) -> usize {
        self.min_valid
    }
}

impl ChunkFunction for CompositeFunction {
    fn apply(&self, pos: &ChunkPosition, inputs: Vec<DataChunk>) -> Result<DataChunk> {
        let mut output = self.prototype.blank_copy(pos.length)?;
        dispatch_chunk!(&mut output, out => reduce_into(out, &inputs, self.reduction.reducer(), self.min_valid))?;
        Ok(output)
    }
}

fn reduce_into<T: Sample>(
    out: &mut TypedChunk<T>,
    inputs: &[DataChunk],
    reduce: ReduceFn<T>,
    min_valid: usize,
) -> Result<()> {
    let len = out.values().len();
    let mut chunks = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        let chunk = T::typed(input)
            .filter(|c| c.dims() == out.dims())
            .ok_or_else(|| {
                anyhow!(
                    "input {} is a {} chunk of size {:?}, expected {} values of size {:?}",
                    i,
                    input.data_type(),
                    input.dims(),
                    T::NAME,
                    out.dims()
                )
            })?;
        if (0..len).any(|idx| !chunk.is_missing(idx)) {
            chunks.push(chunk);
        }
    }

    if chunks.len() < min_valid {
        (0..len).for_each(|idx| out.set_missing(idx));
        return Ok(());
    }

    let mut valid = Vec::with_capacity(chunks.len());
    for idx in 0..len {
        valid.clear();
        valid.extend(chunks.iter().filter(|c| !c.is_missing(idx)).map(|c| c.values()[idx]));
        let value = if valid.len() >= min_valid { reduce(&mut valid) } else { None };
        match value {
            Some(v) => out.values_mut()[idx] = v,
            None => out.set_missing(idx),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: f32 = -999.;

    fn chunk(vals: &[f32]) -> DataChunk {
        DataChunk::from_values([1, vals.len()], vals.to_vec(), Some(M)).unwrap()
    }

    fn run(reduction: Reduction, min_valid: usize, threshold: ValidThreshold, inputs: Vec<DataChunk>) -> Vec<f32> {
        let len = inputs[0].values();
        let func = CompositeFunction::new(reduction, min_valid, threshold, DataChunk::prototype::<f32>(Some(M)));
        let out = func.apply(&ChunkPosition::new([0, 0], [1, len]), inputs).unwrap();
        out.as_typed::<f32>().unwrap().values().to_vec()
    }

    #[test]
    fn reductions_skip_missing() {
        let inputs = || vec![chunk(&[2., 1.]), chunk(&[M, 5.]), chunk(&[4., M])];
        use Reduction::*;
        for &(r, expected) in &[(Mean, 3.), (Median, 3.), (Min, 2.), (Max, 4.), (Last, 4.)] {
            let out = run(r, 2, ValidThreshold::AllOperators, inputs());
            assert_eq!(out[0], expected, "{}", r);
        }
        assert_eq!(run(Last, 1, ValidThreshold::AllOperators, inputs())[1], 5.);
    }

    #[test]
    fn min_valid_gates_pixels() {
        let inputs = || vec![chunk(&[2., 1.]), chunk(&[M, 5.]), chunk(&[4., 3.])];
        let out = run(Reduction::Mean, 3, ValidThreshold::AllOperators, inputs());
        assert_eq!(out, vec![M, 3.]);

        let out = run(Reduction::Max, 3, ValidThreshold::AllOperators, inputs());
        assert_eq!(out, vec![M, 5.]);

        let out = run(Reduction::Max, 3, ValidThreshold::ArithmeticOnly, inputs());
        assert_eq!(out, vec![4., 5.]);
        let out = run(Reduction::Median, 3, ValidThreshold::ArithmeticOnly, inputs());
        assert_eq!(out, vec![M, 3.]);
    }

    #[test]
    fn too_few_valid_inputs_is_all_missing() {
        let inputs = vec![chunk(&[1., 2.]), chunk(&[M, M]), chunk(&[M, M])];
        let out = run(Reduction::Min, 2, ValidThreshold::AllOperators, inputs);
        assert_eq!(out, vec![M, M]);
    }

    #[test]
    fn integer_mean_rounds() {
        let func = CompositeFunction::new(
            Reduction::Mean,
            1,
            ValidThreshold::AllOperators,
            DataChunk::prototype::<i16>(None),
        );
        let inputs = vec![
            DataChunk::from_values([1, 2], vec![1i16, i16::MIN], Some(i16::MIN)).unwrap(),
            DataChunk::from_values([1, 2], vec![2i16, i16::MIN], Some(i16::MIN)).unwrap(),
        ];
        let out = func.apply(&ChunkPosition::new([0, 0], [1, 2]), inputs).unwrap();
        let out = out.as_typed::<i16>().unwrap();
        assert_eq!(out.values()[0], 2);
        assert!(out.is_missing(1));
    }

    #[test]
    fn integer_result_equal_to_sentinel_reads_missing() {
        let func = CompositeFunction::new(
            Reduction::Mean,
            1,
            ValidThreshold::AllOperators,
            DataChunk::prototype::<i16>(Some(-1)),
        );
        let inputs = vec![
            DataChunk::from_values([1, 2], vec![-2i16, 4], Some(i16::MIN)).unwrap(),
            DataChunk::from_values([1, 2], vec![0i16, 6], Some(i16::MIN)).unwrap(),
        ];
        let out = func.apply(&ChunkPosition::new([0, 0], [1, 2]), inputs).unwrap();
        let out = out.as_typed::<i16>().unwrap();
        // A mean of -1 is stored as is and collides with the
        // output sentinel.
        assert_eq!(out.values(), &[-1, 5]);
        assert!(out.is_missing(0));
        assert!(!out.is_missing(1));
    }

    #[test]
    fn type_mismatch_fails() {
        let func = CompositeFunction::new(
            Reduction::Mean,
            1,
            ValidThreshold::AllOperators,
            DataChunk::prototype::<f32>(None),
        );
        let inputs = vec![DataChunk::from_values([1, 1], vec![1f64], None).unwrap()];
        assert!(func.apply(&ChunkPosition::new([0, 0], [1, 1]), inputs).is_err());
    }
}

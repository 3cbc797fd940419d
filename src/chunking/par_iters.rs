use rayon::iter::Map;
use rayon::prelude::*;
use rayon::range::Iter;

use super::*;

impl ChunkingScheme {
    /// Create an [ `IndexedParallelIterator` ] over the positions.
    pub fn par_iter(&self) -> impl IndexedParallelIterator<Item = ChunkPosition> + '_ {
        let (count, func) = self.iter_mapper();
        (0..count).into_par_iter().map(func)
    }
}

impl<'a> IntoParallelIterator for &'a ChunkingScheme {
    type Item = ChunkPosition;
    type Iter = Map<Iter<usize>, Box<dyn Fn(usize) -> ChunkPosition + Send + Sync + 'a>>;

    fn into_par_iter(self) -> Self::Iter {
        let (count, func) = self.iter_mapper();
        (0..count).into_par_iter().map(Box::new(func))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_output() {
        let scheme = ChunkingScheme::with_dims(1024, 999).with_chunk_size(100, 77).unwrap();

        let output1: Vec<_> = scheme.into_iter().collect();

        let mut output2 = vec![];
        scheme.into_par_iter().collect_into_vec(&mut output2);

        assert_eq!(output1, output2);
    }
}

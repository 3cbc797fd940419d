//! A grid being written concurrently, tile by tile.
//!
//! [`CachedGrid`] keeps one lock per storage tile. Writers of
//! disjoint chunk positions only contend when their chunks
//! share a tile, and tiles that are never written stay
//! unallocated until the grid is assembled.

use super::{Grid, GridValues};
use crate::chunking::{ChunkPosition, ChunkingScheme, COL, ROW};
use crate::data::DataChunk;
use crate::Result;
use anyhow::{anyhow, ensure, Context};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub struct CachedGrid {
    name: String,
    attributes: BTreeMap<String, String>,
    prototype: DataChunk,
    tiles: ChunkingScheme,
    slots: Vec<Mutex<Option<DataChunk>>>,
}

impl CachedGrid {
    /// A grid with values of the prototype's type, split
    /// into tiles of `tile_dims`. A prototype without a
    /// missing value gets the type's default sentinel.
    pub fn new(name: &str, dims: [usize; 2], tile_dims: [usize; 2], prototype: DataChunk) -> Self {
        let tiles = ChunkingScheme::tiled(dims, tile_dims);
        let slots = (0..tiles.total_chunks()).map(|_| Mutex::new(None)).collect();
        CachedGrid {
            name: name.into(),
            attributes: BTreeMap::new(),
            prototype: prototype.with_default_missing(),
            tiles,
            slots,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_attribute(&mut self, key: &str, value: String) {
        self.attributes.insert(key.into(), value);
    }

    pub fn dims(&self) -> [usize; 2] {
        self.tiles.dims()
    }

    pub fn prototype(&self) -> &DataChunk {
        &self.prototype
    }

    /// The tiling of the grid; writing along it never
    /// touches more than one tile per chunk.
    pub fn scheme(&self) -> &ChunkingScheme {
        &self.tiles
    }

    fn slot_index(&self, tile: &ChunkPosition) -> usize {
        let size = self.tiles.chunk_size();
        (tile.start[ROW] / size[ROW]) * self.tiles.chunk_count(COL) + tile.start[COL] / size[COL]
    }

    /// Write a chunk of values. May be called concurrently
    /// for different positions.
    pub fn write_chunk(&self, pos: &ChunkPosition, chunk: &DataChunk) -> Result<()> {
        let dims = self.dims();
        let end = pos.end();
        ensure!(
            end[ROW] <= dims[ROW] && end[COL] <= dims[COL] && chunk.dims() == pos.length,
            "chunk at {:?} of size {:?} doesn't fit grid {}",
            pos.start,
            pos.length,
            self.name
        );
        if pos.values() == 0 {
            return Ok(());
        }

        let first = self.tiles.position_for(pos.start);
        let last = self.tiles.position_for([end[ROW] - 1, end[COL] - 1]);
        let size = self.tiles.chunk_size();
        for row in (first.start[ROW]..=last.start[ROW]).step_by(size[ROW]) {
            for col in (first.start[COL]..=last.start[COL]).step_by(size[COL]) {
                let tile = self.tiles.position_for([row, col]);
                let mut slot = self.slots[self.slot_index(&tile)]
                    .lock()
                    .map_err(|_| anyhow!("tile lock poisoned in grid {}", self.name))?;
                if slot.is_none() {
                    *slot = Some(self.blank_tile(&tile)?);
                }
                if let Some(data) = slot.as_mut() {
                    data.copy_overlap(&tile, chunk, pos)
                        .with_context(|| format!("writing grid {}", self.name))?;
                }
            }
        }
        Ok(())
    }

    fn blank_tile(&self, tile: &ChunkPosition) -> Result<DataChunk> {
        let mut data = self.prototype.blank_copy(tile.length)?;
        for idx in 0..data.values() {
            data.set_missing(idx);
        }
        Ok(data)
    }

    /// Assemble the written tiles into a full grid, leaving
    /// this one empty. Tiles never written are missing.
    pub fn assemble(&self) -> Result<Grid> {
        let values = GridValues::filled_like(&self.prototype, self.dims())?;
        let mut grid = Grid::new(&self.name, self.tiles.chunk_size(), values);
        grid.attributes = self.attributes.clone();
        for (tile, slot) in self.tiles.iter().zip(self.slots.iter()) {
            let data = slot
                .lock()
                .map_err(|_| anyhow!("tile lock poisoned in grid {}", self.name))?
                .take();
            if let Some(data) = data {
                grid.write_chunk(&tile, &data)?;
            }
        }
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn concurrent_writes_assemble() {
        let proto = DataChunk::prototype::<i16>(Some(i16::MIN));
        let grid = CachedGrid::new("map", [7, 9], [4, 4], proto);

        let scheme = ChunkingScheme::new([7, 9], [3, 2]).unwrap();
        scheme
            .par_iter()
            .try_for_each(|pos| -> Result<()> {
                let vals: Vec<i16> = (0..pos.values()).map(|_| (pos.start[ROW] * 10 + pos.start[COL]) as i16).collect();
                grid.write_chunk(&pos, &DataChunk::from_values(pos.length, vals, None)?)
            })
            .unwrap();

        let grid = grid.assemble().unwrap();
        assert_eq!(grid.tile_dims, [4, 4]);
        let all = grid.read_chunk(&ChunkPosition::new([0, 0], [7, 9])).unwrap();
        let all = all.as_typed::<i16>().unwrap();
        assert_eq!(all.values()[0], 0);
        assert_eq!(all.values()[8], 8);
        assert_eq!(all.values()[6 * 9 + 8], 68);
    }

    #[test]
    fn unwritten_tiles_are_missing() {
        let grid = CachedGrid::new("sst", [4, 4], [2, 2], DataChunk::prototype::<f32>(Some(-1.)));
        let pos = ChunkPosition::new([0, 0], [2, 2]);
        grid.write_chunk(&pos, &DataChunk::from_values([2, 2], vec![1f32; 4], None).unwrap())
            .unwrap();
        let grid = grid.assemble().unwrap();
        let chunk = grid.read_chunk(&ChunkPosition::new([1, 1], [2, 2])).unwrap();
        let chunk = chunk.as_typed::<f32>().unwrap();
        assert_eq!(chunk.values(), &[1., -1., -1., -1.]);
    }
}
